//! Error types for agent-core

use std::time::Duration;
use thiserror::Error;

/// Result type alias for agent-core
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for agent operations
#[derive(Error, Debug)]
pub enum Error {
    /// Generic error message
    #[error("{0}")]
    Generic(String),

    /// Agent initialization failed
    #[error("Agent initialization failed: {0}")]
    InitializationFailed(String),

    /// Agent processing failed
    #[error("Agent processing failed: {0}")]
    ProcessingFailed(String),

    /// The input handed to the pipeline is unusable
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The whole pipeline ran past its deadline
    #[error("pipeline deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),
}
