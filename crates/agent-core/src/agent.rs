//! Core Agent trait definition

use crate::Result;
use async_trait::async_trait;

/// A single stage of a pipeline.
///
/// Agents read whatever earlier stages left in the shared context, may write
/// their own fields into it, and return an output that the pipeline runner
/// records under the agent's name. Returning `Err` marks the stage as failed;
/// it does not abort the pipeline on its own.
#[async_trait]
pub trait Agent<C>: Send + Sync
where
    C: Send,
{
    /// Value produced by one invocation of this stage
    type Output: Send;

    /// Run the stage against the shared context
    async fn process(&self, context: &mut C) -> Result<Self::Output>;

    /// Get the agent's name
    fn name(&self) -> &str;
}
