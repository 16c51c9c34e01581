// Connection target and lifecycle status
use super::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const MIN_REFRESH_INTERVAL_SECONDS: f64 = 0.1;
pub const MAX_REFRESH_INTERVAL_SECONDS: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting",
            ConnectionStatus::Connected => "Connected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
    pub refresh_interval_seconds: f64,
}

impl ConnectionTarget {
    /// Build a target from operator input, trimming the host.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        refresh_interval_seconds: f64,
    ) -> Result<Self, ValidationError> {
        let target = Self {
            host: host.into().trim().to_string(),
            port,
            refresh_interval_seconds,
        };
        target.validate()?;
        Ok(target)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::EmptyHost);
        }
        if self.host.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidHost(self.host.clone()));
        }
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        let interval = self.refresh_interval_seconds;
        if !interval.is_finite()
            || !(MIN_REFRESH_INTERVAL_SECONDS..=MAX_REFRESH_INTERVAL_SECONDS).contains(&interval)
        {
            return Err(ValidationError::InvalidInterval(interval));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(self.refresh_interval_seconds)
    }

    /// Base URL of the device, bracketing IPv6 literals.
    pub fn base_url(&self) -> String {
        let host = self.host.trim();
        if host.contains(':') && !host.starts_with('[') {
            format!("http://[{}]:{}", host, self.port)
        } else {
            format!("http://{}:{}", host, self.port)
        }
    }

    /// Filesystem-friendly form, e.g. `127_0_0_1_8001`
    pub fn file_stem(&self) -> String {
        self.to_string()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_target_is_trimmed() {
        let target = ConnectionTarget::new("  127.0.0.1 ", 8001, 1.0).unwrap();
        assert_eq!(target.host, "127.0.0.1");
        assert_eq!(target.to_string(), "127.0.0.1:8001");
        assert_eq!(target.base_url(), "http://127.0.0.1:8001");
        assert_eq!(target.file_stem(), "127_0_0_1_8001");
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(ConnectionTarget::new("", 8001, 1.0), Err(ValidationError::EmptyHost));
        assert_eq!(ConnectionTarget::new("   ", 8001, 1.0), Err(ValidationError::EmptyHost));
        assert!(matches!(
            ConnectionTarget::new("dev ice", 8001, 1.0),
            Err(ValidationError::InvalidHost(_))
        ));
        assert_eq!(ConnectionTarget::new("device", 0, 1.0), Err(ValidationError::InvalidPort));
        assert!(matches!(
            ConnectionTarget::new("device", 80, 0.05),
            Err(ValidationError::InvalidInterval(_))
        ));
        assert!(matches!(
            ConnectionTarget::new("device", 80, 61.0),
            Err(ValidationError::InvalidInterval(_))
        ));
        assert!(matches!(
            ConnectionTarget::new("device", 80, f64::NAN),
            Err(ValidationError::InvalidInterval(_))
        ));
    }

    #[test]
    fn test_interval_bounds_are_inclusive() {
        assert!(ConnectionTarget::new("device", 1, 0.1).is_ok());
        assert!(ConnectionTarget::new("device", 65535, 60.0).is_ok());
    }

    #[test]
    fn test_ipv6_base_url() {
        let target = ConnectionTarget::new("::1", 8080, 1.0).unwrap();
        assert_eq!(target.base_url(), "http://[::1]:8080");
    }
}
