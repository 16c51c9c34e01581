// Error taxonomy shared across layers
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("host must not be empty")]
    EmptyHost,
    #[error("invalid host: {0:?}")]
    InvalidHost(String),
    #[error("port must be a number between 1 and 65535")]
    InvalidPort,
    #[error("refresh interval must be between 0.1 and 60 seconds, got {0}")]
    InvalidInterval(f64),
    #[error("command name is required")]
    EmptyCommandName,
}

/// Failures of a single network call to the device.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    #[error("request timed out")]
    Timeout,
    #[error("device unreachable: {0}")]
    Unreachable(String),
    #[error("bad response: {0}")]
    BadResponse(String),
    #[error("command rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("malformed status payload: {0}")]
pub struct ParseError(pub String);

#[derive(Debug, Error)]
#[error("{action} {path}: {source}")]
pub struct LogError {
    pub action: &'static str,
    pub path: String,
    #[source]
    pub source: std::io::Error,
}

impl LogError {
    pub fn new(action: &'static str, path: &std::path::Path, source: std::io::Error) -> Self {
        Self {
            action,
            path: path.display().to_string(),
            source,
        }
    }
}

/// Errors surfaced to the operator by engine operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("operation not allowed: {0}")]
    Precondition(String),
    #[error(transparent)]
    Io(#[from] LogError),
    #[error("no samples recorded yet")]
    EmptyHistory,
}

impl SessionError {
    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        SessionError::Precondition(message.into())
    }
}
