//! Error types for market query operations

use thiserror::Error;

/// Errors raised by the market query pipeline outside of data fetching
#[derive(Debug, Error)]
pub enum MarketError {
    /// The query cannot be processed at all
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The symbol table could not be loaded
    #[error("Symbol table error: {0}")]
    SymbolTable(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Malformed CSV input
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error while reading local resources
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Why a data point could not be delivered.
///
/// Pipeline stages only ever check whether a value is present; the variant is
/// kept for logging and for retry decisions in the data layer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// No data exists for the requested symbol/date
    #[error("data unavailable for {code}: {reason}")]
    Unavailable { code: String, reason: String },

    /// The provider did not answer in time
    #[error("request for {0} timed out")]
    Timeout(String),

    /// The local rate limiter rejected the call
    #[error("rate limit exceeded for {0}")]
    RateLimited(String),

    /// The provider answered with an error
    #[error("provider error: {0}")]
    Provider(String),
}

impl FetchError {
    /// Shorthand for [`FetchError::Unavailable`]
    pub fn unavailable(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            code: code.into(),
            reason: reason.into(),
        }
    }

    /// Whether another attempt could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Provider(_))
    }
}

/// Result type alias for market operations
pub type Result<T> = std::result::Result<T, MarketError>;

/// Result type alias for data-access calls
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Convert MarketError to agent_core::Error
impl From<MarketError> for agent_core::Error {
    fn from(err: MarketError) -> Self {
        match err {
            MarketError::InvalidQuery(msg) => agent_core::Error::InvalidInput(msg),
            other => agent_core::Error::ProcessingFailed(other.to_string()),
        }
    }
}

/// Convert agent_core::Error to MarketError
impl From<agent_core::Error> for MarketError {
    fn from(err: agent_core::Error) -> Self {
        MarketError::Other(err.to_string())
    }
}
