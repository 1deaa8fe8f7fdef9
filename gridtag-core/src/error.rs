use thiserror::Error;

/// Errors raised by the engine.
///
/// Every error that leaves a `DocumentProcessor` entry point has been
/// folded into `Processing`, so callers can match on one stable prefix.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Processing error: {0}")]
    Processing(String),

    #[error("missing required input: {0}")]
    MissingInput(&'static str),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Re-wrap into `Processing`, keeping the cause message.
    /// Already wrapped errors pass through untouched.
    pub fn into_processing(self) -> Self {
        match self {
            Self::Processing(_) => self,
            other => Self::Processing(other.to_string()),
        }
    }

    pub fn is_processing(&self) -> bool {
        matches!(self, Self::Processing(_))
    }
}

/// Result type alias for convenience
pub type EngineResult<T> = Result<T, EngineError>;
