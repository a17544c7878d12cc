//! Pipeline state contract

use agent_core::Error;

/// Shared state threaded through every stage of a [`Workflow`](crate::Workflow).
///
/// The workflow never inspects stage outputs itself. It hands them back to the
/// state, which decides what to keep and whether the run should stop.
pub trait PipelineState: Send {
    /// Output type shared by all stages of the pipeline
    type Output: Send;

    /// Store a successful stage output
    fn record(&mut self, stage: &str, output: Self::Output);

    /// Store a stage failure; the pipeline continues afterwards
    fn record_failure(&mut self, stage: &str, error: &Error);

    /// Whether the remaining stages must be skipped
    fn halted(&self) -> bool;
}
