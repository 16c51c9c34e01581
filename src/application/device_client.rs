// Device client trait for status polling and command dispatch
use crate::domain::command::CommandRequest;
use crate::domain::connection::ConnectionTarget;
use crate::domain::error::DeviceError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Raw status body plus the measured round-trip time
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReply {
    pub body: Value,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandReply {
    pub payload: Value,
    pub latency_ms: f64,
}

/// Stateless access to one device. Implementations must tolerate
/// concurrent `fetch_status` and `send_command` calls.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Fetch the status payload within `timeout`
    async fn fetch_status(
        &self,
        target: &ConnectionTarget,
        timeout: Duration,
    ) -> Result<StatusReply, DeviceError>;

    /// Post a command within `timeout`; an application-level failure reply
    /// is reported as `DeviceError::Rejected`
    async fn send_command(
        &self,
        target: &ConnectionTarget,
        request: &CommandRequest,
        timeout: Duration,
    ) -> Result<CommandReply, DeviceError>;
}
