//! Realtime client settings
//!
//! YAML file plus environment overrides. The file path comes from
//! `REALTIME_CONFIG_PATH` (see [`crate::bin_common::ConfigType`]) and
//! `REALTIME_URL` replaces the configured server url.

use realtime_link::{
    ClientConfig, ExponentialBackoff, HeartbeatConfig, OverflowPolicy, ProbeConfig, QueuePolicy,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Environment variable overriding `url`
pub const URL_ENV_VAR: &str = "REALTIME_URL";

/// Top-level settings for the realtime client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeSettings {
    /// WebSocket endpoint
    pub url: String,
    #[serde(default)]
    pub protocols: Vec<String>,
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub heartbeat: HeartbeatSettings,
    #[serde(default)]
    pub reconnect: ReconnectSettings,
    #[serde(default)]
    pub offline: OfflineSettings,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub connectivity: ConnectivitySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_heartbeat_interval_ms(),
            timeout_ms: default_heartbeat_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_base_interval_ms")]
    pub base_interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Upper bound on a single backoff delay
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_interval_ms: default_base_interval_ms(),
            max_attempts: default_max_attempts(),
            max_delay_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineSettings {
    /// JSON snapshot of undelivered notifications
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    #[serde(default = "default_offline_max_retries")]
    pub max_retries: u32,
}

impl Default for OfflineSettings {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            max_retries: default_offline_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowSetting {
    #[default]
    DropOldest,
    DropNewest,
    Reject,
}

impl From<OverflowSetting> for OverflowPolicy {
    fn from(setting: OverflowSetting) -> Self {
        match setting {
            OverflowSetting::DropOldest => OverflowPolicy::DropOldest,
            OverflowSetting::DropNewest => OverflowPolicy::DropNewest,
            OverflowSetting::Reject => OverflowPolicy::Reject,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueueSettings {
    /// Omit for an unbounded queue
    #[serde(default)]
    pub capacity: Option<usize>,
    #[serde(default)]
    pub overflow: OverflowSetting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivitySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_probe_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub timeout_secs: u64,
    /// Consecutive failed probes before reporting the host offline
    #[serde(default = "default_offline_after")]
    pub offline_after: u32,
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_probe_interval_secs(),
            timeout_secs: default_probe_timeout_secs(),
            offline_after: default_offline_after(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

fn default_base_interval_ms() -> u64 {
    1_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("data/offline_notifications.json")
}

fn default_offline_max_retries() -> u32 {
    3
}

fn default_probe_interval_secs() -> u64 {
    15
}

fn default_probe_timeout_secs() -> u64 {
    3
}

fn default_offline_after() -> u32 {
    3
}

impl RealtimeSettings {
    /// Load settings from a YAML file, applying environment overrides
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut settings: RealtimeSettings = serde_yaml::from_str(&yaml_content)?;

        if let Ok(url) = std::env::var(URL_ENV_VAR) {
            info!("Overriding realtime url from environment variable");
            settings.url = url;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from YAML text without consulting the environment
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: RealtimeSettings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::ValidationError("url must not be empty".to_string()));
        }

        if self.heartbeat.enabled {
            if self.heartbeat.interval_ms == 0 {
                return Err(ConfigError::ValidationError(
                    "heartbeat.interval_ms must be greater than 0".to_string(),
                ));
            }
            if self.heartbeat.timeout_ms == 0 {
                return Err(ConfigError::ValidationError(
                    "heartbeat.timeout_ms must be greater than 0".to_string(),
                ));
            }
        }

        if self.reconnect.base_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "reconnect.base_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.reconnect.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "reconnect.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.connectivity.enabled {
            if self.connectivity.interval_secs == 0 {
                return Err(ConfigError::ValidationError(
                    "connectivity.interval_secs must be greater than 0".to_string(),
                ));
            }
            if self.connectivity.offline_after == 0 {
                return Err(ConfigError::ValidationError(
                    "connectivity.offline_after must be at least 1".to_string(),
                ));
            }
        }

        if self.queue.capacity == Some(0) {
            return Err(ConfigError::ValidationError(
                "queue.capacity must be greater than 0 when set".to_string(),
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    pub fn heartbeat_config(&self) -> Option<HeartbeatConfig> {
        self.heartbeat.enabled.then(|| HeartbeatConfig {
            interval: Duration::from_millis(self.heartbeat.interval_ms),
            timeout: Duration::from_millis(self.heartbeat.timeout_ms),
        })
    }

    pub fn reconnect_strategy(&self) -> ExponentialBackoff {
        let strategy = ExponentialBackoff::new(
            Duration::from_millis(self.reconnect.base_interval_ms),
            Some(self.reconnect.max_attempts),
        );
        match self.reconnect.max_delay_ms {
            Some(cap) => strategy.with_max_delay(Duration::from_millis(cap)),
            None => strategy,
        }
    }

    pub fn queue_policy(&self) -> QueuePolicy {
        match self.queue.capacity {
            Some(capacity) => QueuePolicy::bounded(capacity, self.queue.overflow.into()),
            None => QueuePolicy::unbounded(),
        }
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            interval: Duration::from_secs(self.connectivity.interval_secs),
            timeout: Duration::from_secs(self.connectivity.timeout_secs),
            offline_after: self.connectivity.offline_after,
        }
    }

    /// Runtime configuration for the connection engine
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig::new(self.url.clone())
            .with_protocols(self.protocols.clone())
            .with_heartbeat(self.heartbeat_config())
            .with_reconnect_strategy(Box::new(self.reconnect_strategy()))
            .with_queue_policy(self.queue_policy())
            .with_offline_max_retries(self.offline.max_retries)
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  Url: {}", self.url);
        if !self.protocols.is_empty() {
            info!("  Protocols: {}", self.protocols.join(", "));
        }
        match self.heartbeat_config() {
            Some(hb) => info!("  Heartbeat: every {:?}, timeout {:?}", hb.interval, hb.timeout),
            None => info!("  Heartbeat: disabled"),
        }
        info!(
            "  Reconnect: base {}ms, max {} attempts",
            self.reconnect.base_interval_ms, self.reconnect.max_attempts
        );
        info!(
            "  Offline store: {} (max {} retries)",
            self.offline.storage_path.display(),
            self.offline.max_retries
        );
        info!("  Log level: {}", self.log_level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realtime_link::ReconnectionStrategy;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let settings = RealtimeSettings::from_yaml("url: wss://campus.example/realtime").unwrap();

        assert_eq!(settings.log_level, "info");
        assert_eq!(
            settings.heartbeat_config(),
            Some(HeartbeatConfig {
                interval: Duration::from_secs(30),
                timeout: Duration::from_secs(10),
            })
        );
        assert_eq!(settings.reconnect.base_interval_ms, 1000);
        assert_eq!(settings.reconnect.max_attempts, 5);
        assert_eq!(settings.offline.max_retries, 3);
        assert_eq!(settings.queue_policy(), QueuePolicy::unbounded());
        assert!(settings.connectivity.enabled);
        assert_eq!(settings.probe_config().offline_after, 3);

        let strategy = settings.reconnect_strategy();
        assert_eq!(strategy.next_delay(0), Some(Duration::from_millis(1000)));
        assert_eq!(strategy.next_delay(4), Some(Duration::from_millis(16000)));
        assert_eq!(strategy.next_delay(5), None);
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
url: ws://localhost:9000
protocols: [campus.realtime.v1]
log_level: debug
heartbeat:
  enabled: false
reconnect:
  base_interval_ms: 250
  max_attempts: 2
  max_delay_ms: 300
queue:
  capacity: 10
  overflow: reject
connectivity:
  interval_secs: 5
  timeout_secs: 1
"#;
        let settings = RealtimeSettings::from_yaml(yaml).unwrap();

        assert_eq!(settings.protocols, vec!["campus.realtime.v1".to_string()]);
        assert_eq!(settings.heartbeat_config(), None);
        assert_eq!(
            settings.queue_policy(),
            QueuePolicy::bounded(10, OverflowPolicy::Reject)
        );
        assert_eq!(settings.probe_config().interval, Duration::from_secs(5));

        let strategy = settings.reconnect_strategy();
        assert_eq!(strategy.next_delay(1), Some(Duration::from_millis(300)));
        assert_eq!(strategy.next_delay(2), None);

        let config = settings.to_client_config();
        assert_eq!(config.url(), "ws://localhost:9000");
        assert!(!config.has_heartbeat());
        assert_eq!(config.max_reconnect_attempts(), Some(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let cases = [
            "url: ws://h\nheartbeat: {interval_ms: 0}",
            "url: ws://h\nheartbeat: {timeout_ms: 0}",
            "url: ws://h\nreconnect: {base_interval_ms: 0}",
            "url: ws://h\nreconnect: {max_attempts: 0}",
            "url: ws://h\nqueue: {capacity: 0}",
            "url: ws://h\nconnectivity: {offline_after: 0}",
            "url: ws://h\nconnectivity: {interval_secs: 0}",
            "url: ws://h\nlog_level: loud",
            "url: ''",
        ];

        for yaml in cases {
            let err = RealtimeSettings::from_yaml(yaml).unwrap_err();
            assert!(matches!(err, ConfigError::ValidationError(_)), "{}: {:?}", yaml, err);
        }
    }

    #[test]
    fn test_zero_interval_allowed_when_heartbeat_disabled() {
        let yaml = "url: ws://h\nheartbeat: {enabled: false, interval_ms: 0}";
        assert!(RealtimeSettings::from_yaml(yaml).is_ok());
    }

    #[test]
    fn test_malformed_yaml() {
        let err = RealtimeSettings::from_yaml("url: [unterminated").unwrap_err();
        assert!(matches!(err, ConfigError::YamlError(_)));
    }
}
