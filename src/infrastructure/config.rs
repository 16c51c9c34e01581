use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::connection::ConnectionTarget;
use crate::domain::error::ValidationError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub poll: PollSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceSettings {
    #[serde(default = "default_status_path")]
    pub status_path: String,
    #[serde(default = "default_command_path")]
    pub command_path: String,
    /// Connect to this target at startup
    #[serde(default)]
    pub auto_connect: Option<TargetSettings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TargetSettings {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_refresh_interval_seconds")]
    pub refresh_interval_seconds: f64,
}

impl TargetSettings {
    pub fn to_target(&self) -> Result<ConnectionTarget, ValidationError> {
        ConnectionTarget::new(self.host.clone(), self.port, self.refresh_interval_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollSettings {
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_status_path() -> String {
    "/status".to_string()
}

fn default_command_path() -> String {
    "/command".to_string()
}

fn default_refresh_interval_seconds() -> f64 {
    1.0
}

fn default_fetch_timeout_ms() -> u64 {
    1_000
}

fn default_command_timeout_ms() -> u64 {
    2_000
}

fn default_history_capacity() -> usize {
    600
}

fn default_event_capacity() -> usize {
    200
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            status_path: default_status_path(),
            command_path: default_command_path(),
            auto_connect: None,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: default_fetch_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            history_capacity: default_history_capacity(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
        }
    }
}

impl PollSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms.max(1))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms.max(1))
    }
}

/// Load `config/console.toml` (optional) overlaid with `CONSOLE__*` env vars,
/// e.g. `CONSOLE__POLL__FETCH_TIMEOUT_MS=500`.
pub fn load_console_config() -> anyhow::Result<ConsoleConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/console").required(false))
        .add_source(
            config::Environment::with_prefix("CONSOLE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let console: ConsoleConfig = settings.try_deserialize()?;
    if let Some(target) = &console.device.auto_connect {
        target.to_target()?;
    }
    Ok(console)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(text: &str) -> ConsoleConfig {
        config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let console = from_toml("");
        assert_eq!(console.server.bind, "127.0.0.1:8080");
        assert_eq!(console.device.status_path, "/status");
        assert_eq!(console.device.command_path, "/command");
        assert!(console.device.auto_connect.is_none());
        assert_eq!(console.poll.fetch_timeout(), Duration::from_secs(1));
        assert_eq!(console.poll.command_timeout(), Duration::from_secs(2));
        assert_eq!(console.poll.history_capacity, 600);
        assert_eq!(console.poll.event_capacity, 200);
        assert_eq!(console.logging.directory, PathBuf::from("logs"));
    }

    #[test]
    fn test_overrides_and_auto_connect_target() {
        let console = from_toml(
            r#"
            [poll]
            fetch_timeout_ms = 250
            history_capacity = 50

            [device.auto_connect]
            host = "127.0.0.1"
            port = 8001
            refresh_interval_seconds = 0.5
            "#,
        );
        assert_eq!(console.poll.fetch_timeout(), Duration::from_millis(250));
        assert_eq!(console.poll.history_capacity, 50);
        assert_eq!(console.poll.event_capacity, 200);

        let target = console.device.auto_connect.unwrap().to_target().unwrap();
        assert_eq!(target.to_string(), "127.0.0.1:8001");
        assert_eq!(target.refresh_interval(), Duration::from_millis(500));
    }
}
