//! Configuration structures.
//!
//! Configuration is loaded from a JSON file and/or environment variables.
//! Every section falls back to its defaults when omitted.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::errors::{Error, Result};

/// Environment variable selecting the log level.
pub const ENV_LOG_LEVEL: &str = "BACKUP_MONITOR_LOG_LEVEL";

/// Environment variable selecting the log format (`json` or anything else for text).
pub const ENV_LOG_FORMAT: &str = "BACKUP_MONITOR_LOG_FORMAT";

/// Environment variable switching malformed payload handling to `panic`.
pub const ENV_STRICT_PAYLOADS: &str = "BACKUP_MONITOR_STRICT_PAYLOADS";

/// Global configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Monitor delivery configuration.
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl Config {
    /// Parse configuration from a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Override fields from `BACKUP_MONITOR_*` environment variables.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var(ENV_LOG_FORMAT) {
            self.observability.json_logs = format.eq_ignore_ascii_case("json");
        }
        if let Ok(strict) = std::env::var(ENV_STRICT_PAYLOADS) {
            self.monitor.malformed_payload = match parse_flag(&strict) {
                Some(true) => MalformedPayloadPolicy::Panic,
                Some(false) => MalformedPayloadPolicy::Skip,
                None => {
                    return Err(Error::config(format!(
                        "{} must be a boolean, got {:?}",
                        ENV_STRICT_PAYLOADS, strict
                    )))
                }
            };
        }
        Ok(self)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// What the monitor does with a notification whose payload is missing a
/// required key or carries a value of the wrong type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPayloadPolicy {
    /// Log a warning, drop the notification, keep running.
    #[default]
    Skip,
    /// Treat the notification as a broken contract and panic on the delivering thread.
    Panic,
}

/// Monitor delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Handling of malformed payloads.
    pub malformed_payload: MalformedPayloadPolicy,

    /// Serialize observer callbacks behind a single dispatch lock. Needed when
    /// the observer is not safe to call from several bus threads at once.
    /// The lock is reentrant: an observer posting a backup notification on the
    /// same bus from inside its callback is delivered on that thread, not blocked.
    pub serialize_delivery: bool,

    /// Observer callbacks slower than this are logged at warn level.
    #[serde(with = "humantime_serde")]
    pub slow_delivery_threshold: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            malformed_payload: MalformedPayloadPolicy::Skip,
            serialize_delivery: false,
            slow_delivery_threshold: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.observability.log_level, "info");
        assert!(!config.observability.json_logs);
        assert_eq!(config.monitor.malformed_payload, MalformedPayloadPolicy::Skip);
        assert!(!config.monitor.serialize_delivery);
        assert_eq!(
            config.monitor.slow_delivery_threshold,
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::from_json_str(
            r#"{"monitor": {"malformed_payload": "panic", "slow_delivery_threshold": "2s"}}"#,
        )
        .unwrap();

        assert_eq!(config.monitor.malformed_payload, MalformedPayloadPolicy::Panic);
        assert_eq!(config.monitor.slow_delivery_threshold, Duration::from_secs(2));
        assert!(!config.monitor.serialize_delivery);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let result = Config::from_json_str(r#"{"monitor": {"malformed_payload": "ignore"}}"#);
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"observability": {{"log_level": "debug", "json_logs": true}}}}"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.observability.log_level, "debug");
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::from_file(dir.path().join("absent.json"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" on "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
