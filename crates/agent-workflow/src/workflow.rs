//! Workflow definition and execution

use agent_core::{Agent, Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::state::PipelineState;

/// A stage in a workflow
pub type StageStep<S> = Arc<dyn Agent<S, Output = <S as PipelineState>::Output>>;

/// Summary of a single workflow run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowReport {
    /// Stages that returned an output, in execution order
    pub completed: Vec<String>,
    /// Stages that returned an error, in execution order
    pub failed: Vec<String>,
    /// Stage after which the state asked to halt, if any
    pub halted_at: Option<String>,
}

/// A workflow that runs stages strictly one after another.
///
/// Stage N+1 never starts before stage N has finished. A failing stage is
/// recorded into the state and the run moves on; only
/// [`PipelineState::halted`] or the optional deadline stop it early.
///
/// # Example
///
/// ```ignore
/// let workflow = Workflow::builder()
///     .add_stage(Arc::new(understander))
///     .add_stage(Arc::new(summarizer))
///     .deadline(Duration::from_secs(30))
///     .build()?;
///
/// let report = workflow.execute(&mut state).await?;
/// ```
pub struct Workflow<S: PipelineState> {
    steps: Vec<StageStep<S>>,
    deadline: Option<Duration>,
}

impl<S: PipelineState> Workflow<S> {
    /// Create a new workflow builder
    pub fn builder() -> WorkflowBuilder<S> {
        WorkflowBuilder::new()
    }

    /// Names of the stages in execution order
    pub fn stage_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Execute the workflow against `state`
    ///
    /// Returns `Error::DeadlineExceeded` when the configured deadline elapses
    /// before the last stage finishes. Stage failures are not errors here.
    pub async fn execute(&self, state: &mut S) -> Result<WorkflowReport> {
        match self.deadline {
            Some(limit) => tokio::time::timeout(limit, self.run_steps(state))
                .await
                .map_err(|_| Error::DeadlineExceeded(limit)),
            None => Ok(self.run_steps(state).await),
        }
    }

    async fn run_steps(&self, state: &mut S) -> WorkflowReport {
        let mut report = WorkflowReport::default();

        for step in &self.steps {
            let name = step.name().to_string();
            let span = info_span!("stage", stage = %name);

            let outcome = step.process(state).instrument(span).await;
            match outcome {
                Ok(output) => {
                    debug!(stage = %name, "stage completed");
                    state.record(&name, output);
                    report.completed.push(name.clone());
                }
                Err(e) => {
                    warn!(stage = %name, error = %e, "stage failed, continuing");
                    state.record_failure(&name, &e);
                    report.failed.push(name.clone());
                }
            }

            if state.halted() {
                info!(stage = %name, "pipeline halted");
                report.halted_at = Some(name);
                break;
            }
        }

        report
    }
}

/// Builder for constructing workflows
pub struct WorkflowBuilder<S: PipelineState> {
    steps: Vec<StageStep<S>>,
    deadline: Option<Duration>,
}

impl<S: PipelineState> Default for WorkflowBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: PipelineState> WorkflowBuilder<S> {
    /// Create a new workflow builder
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            deadline: None,
        }
    }

    /// Append a stage to the workflow
    pub fn add_stage(mut self, stage: StageStep<S>) -> Self {
        self.steps.push(stage);
        self
    }

    /// Bound the whole run by `deadline`
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Build the workflow
    pub fn build(self) -> Result<Workflow<S>> {
        if self.steps.is_empty() {
            return Err(Error::InitializationFailed(
                "workflow needs at least one stage".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name().to_string()) {
                return Err(Error::InitializationFailed(format!(
                    "duplicate stage name: {}",
                    step.name()
                )));
            }
        }

        Ok(Workflow {
            steps: self.steps,
            deadline: self.deadline,
        })
    }
}
