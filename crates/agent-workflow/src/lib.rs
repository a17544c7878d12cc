//! Multi-stage orchestration for agent-rs
//!
//! This crate runs a fixed sequence of [`agent_core::Agent`] stages over one
//! shared, mutable pipeline state.

pub mod state;
pub mod workflow;

// Re-export for convenience
pub use state::PipelineState;
pub use workflow::{StageStep, Workflow, WorkflowBuilder, WorkflowReport};
