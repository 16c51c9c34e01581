// Command request/result domain models
use super::error::{DeviceError, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Map<String, Value>>,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            args: None,
        }
    }

    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.args = Some(args);
        self
    }

    /// Trimmed name; requests decoded from JSON bypass `new`.
    pub fn normalized(mut self) -> Self {
        let trimmed = self.name.trim();
        if trimmed.len() != self.name.len() {
            self.name = trimmed.to_string();
        }
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyCommandName);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CommandOutcome {
    Success { payload: Value },
    Failure { reason: CommandFailure },
}

/// Why a dispatched command did not succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum CommandFailure {
    Timeout,
    Unreachable(String),
    BadResponse(String),
    Rejected(String),
}

impl From<DeviceError> for CommandFailure {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::Timeout => CommandFailure::Timeout,
            DeviceError::Unreachable(msg) => CommandFailure::Unreachable(msg),
            DeviceError::BadResponse(msg) => CommandFailure::BadResponse(msg),
            DeviceError::Rejected(msg) => CommandFailure::Rejected(msg),
        }
    }
}

impl std::fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandFailure::Timeout => write!(f, "timed out"),
            CommandFailure::Unreachable(msg) => write!(f, "device unreachable: {}", msg),
            CommandFailure::BadResponse(msg) => write!(f, "bad response: {}", msg),
            CommandFailure::Rejected(msg) => write!(f, "rejected: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub request: CommandRequest,
    pub completed_at: DateTime<Utc>,
    pub latency_ms: Option<f64>,
    pub outcome: CommandOutcome,
}

impl CommandResult {
    pub fn succeeded(request: CommandRequest, payload: Value, latency_ms: f64) -> Self {
        Self {
            request,
            completed_at: Utc::now(),
            latency_ms: Some(latency_ms),
            outcome: CommandOutcome::Success { payload },
        }
    }

    pub fn failed(request: CommandRequest, reason: CommandFailure) -> Self {
        Self {
            request,
            completed_at: Utc::now(),
            latency_ms: None,
            outcome: CommandOutcome::Failure { reason },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, CommandOutcome::Success { .. })
    }
}
