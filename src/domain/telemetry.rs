// Telemetry data domain models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One immutable sample taken at a poll instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub timestamp_utc: DateTime<Utc>,
    pub mode: String,
    pub temperature: f64,
    pub voltage: f64,
    pub current: f64,
    pub uptime_seconds: u64,
    pub latency_ms: f64,
    pub faults: BTreeSet<String>,
    /// Untouched device payload
    pub raw: serde_json::Value,
}

impl TelemetryRecord {
    pub fn fault_count(&self) -> usize {
        self.faults.len()
    }
}
