use thiserror::Error;

use crate::services::validator::FormatCheck;

/// Why an input was refused by an [`InputPolicy`](crate::services::InputPolicy).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("input is shorter than {min} characters")]
    TooShort { min: usize },
    #[error("input has {actual} characters, limit is {max}")]
    TooLong { max: usize, actual: usize },
    #[error("input is not a valid {0}")]
    InvalidFormat(FormatCheck),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::TooShort { .. } => "too_short",
            ValidationError::TooLong { .. } => "too_long",
            ValidationError::InvalidFormat(_) => "invalid_format",
        }
    }
}

/// Failures reported by a generation backend.
///
/// `EmptyResponse` is a successful call that produced no text; it is kept
/// distinct from transport and status failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("backend returned status {code}: {message}")]
    Status { code: u16, message: String },
    #[error("backend returned an empty response")]
    EmptyResponse,
    #[error("no terminal event within {after_ms} ms")]
    Timeout { after_ms: u64 },
}

impl BackendError {
    pub fn reason(&self) -> &'static str {
        match self {
            BackendError::Transport(_) => "transport",
            BackendError::Status { .. } => "status",
            BackendError::EmptyResponse => "empty_response",
            BackendError::Timeout { .. } => "timeout",
        }
    }
}

/// Failures from a [`TurnStore`](crate::services::TurnStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store task failed: {0}")]
    Task(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}
