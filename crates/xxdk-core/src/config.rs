//! Configuration types for the worker bindings
//!
//! Defaults match what the browser host needs out of the box; `from_env`
//! lets native tools and tests override individual values.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, XxdkError};

/// Environment variable overriding the default call timeout (humantime, e.g. `30s`)
pub const ENV_RESPONSE_TIMEOUT: &str = "XXDK_RESPONSE_TIMEOUT";
/// Environment variable overriding the Worker start-up timeout
pub const ENV_INIT_TIMEOUT: &str = "XXDK_INIT_TIMEOUT";
/// Environment variable selecting the wire format (`json` or `cbor`)
pub const ENV_WIRE_FORMAT: &str = "XXDK_WIRE_FORMAT";
/// Environment variable with the tracing filter directive
pub const ENV_LOG_LEVEL: &str = "XXDK_LOG_LEVEL";
/// Environment variable with the log file worker buffer size in bytes
pub const ENV_LOG_FILE_MAX_SIZE: &str = "XXDK_LOG_FILE_MAX_SIZE";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Worker channel configuration
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Defaults with any environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides in place
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(value) = env_var(ENV_RESPONSE_TIMEOUT) {
            self.worker.response_timeout_ms = parse_duration_ms(ENV_RESPONSE_TIMEOUT, &value)?;
        }
        if let Some(value) = env_var(ENV_INIT_TIMEOUT) {
            self.worker.initial_connection_timeout_ms =
                parse_duration_ms(ENV_INIT_TIMEOUT, &value)?;
        }
        if let Some(value) = env_var(ENV_WIRE_FORMAT) {
            self.worker.wire_format = value.parse()?;
        }
        if let Some(value) = env_var(ENV_LOG_LEVEL) {
            self.logging.level = value;
        }
        if let Some(value) = env_var(ENV_LOG_FILE_MAX_SIZE) {
            self.logging.log_file_max_size = value.parse().map_err(|e| {
                XxdkError::InvalidConfig(format!("{}: {}", ENV_LOG_FILE_MAX_SIZE, e))
            })?;
        }
        Ok(())
    }

    /// Reject values the workers cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.worker.response_timeout_ms == 0 {
            return Err(XxdkError::InvalidConfig(
                "response timeout must be greater than zero".into(),
            ));
        }
        if self.worker.initial_connection_timeout_ms == 0 {
            return Err(XxdkError::InvalidConfig(
                "initial connection timeout must be greater than zero".into(),
            ));
        }
        if self.logging.log_file_max_size == 0 {
            return Err(XxdkError::InvalidConfig(
                "log file size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Frame encoding used on the worker channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// JSON text frames (structured-clone friendly strings)
    #[default]
    Json,
    /// CBOR binary frames, posted with a transfer list
    Cbor,
}

impl std::str::FromStr for WireFormat {
    type Err = XxdkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(WireFormat::Json),
            "cbor" | "binary" => Ok(WireFormat::Cbor),
            other => Err(XxdkError::InvalidConfig(format!(
                "unknown wire format: {}",
                other
            ))),
        }
    }
}

/// Worker channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Default timeout for a single call in milliseconds
    pub response_timeout_ms: u64,
    /// How long to wait for a Worker to report Ready, in milliseconds
    pub initial_connection_timeout_ms: u64,
    /// Frame encoding for outbound envelopes
    pub wire_format: WireFormat,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 30_000,
            initial_connection_timeout_ms: 90_000,
            wire_format: WireFormat::Json,
        }
    }
}

impl WorkerConfig {
    /// Configuration with short timeouts for tests
    pub fn local_test() -> Self {
        Self {
            response_timeout_ms: 2_000,
            initial_connection_timeout_ms: 2_000,
            wire_format: WireFormat::Json,
        }
    }

    /// Get the call timeout as a Duration
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Get the Worker start-up timeout as a Duration
    pub fn initial_connection_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_connection_timeout_ms)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Prefix applied to every key written to browser key/value storage
    pub key_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            key_prefix: "xxdkWasmStorage/".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Tracing filter directive, e.g. `info` or `xxdk_worker=debug`
    pub level: String,
    /// Capacity of the log file worker's circular buffer in bytes
    pub log_file_max_size: usize,
    /// Emit ANSI colours (native only)
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file_max_size: 5 * 1024 * 1024, // 5 MB
            ansi: true,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_duration_ms(name: &str, value: &str) -> Result<u64> {
    humantime::parse_duration(value.trim())
        .map(|d| d.as_millis() as u64)
        .map_err(|e| XxdkError::InvalidConfig(format!("{}: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.worker.response_timeout(), Duration::from_secs(30));
        assert_eq!(
            config.worker.initial_connection_timeout(),
            Duration::from_secs(90)
        );
        assert_eq!(config.worker.wire_format, WireFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration_ms("X", "1m 30s").unwrap(), 90_000);
        assert_eq!(parse_duration_ms("X", "250ms").unwrap(), 250);
        assert!(parse_duration_ms("X", "soon").is_err());
    }

    #[test]
    fn test_wire_format_from_str() {
        assert_eq!("JSON".parse::<WireFormat>().unwrap(), WireFormat::Json);
        assert_eq!("cbor".parse::<WireFormat>().unwrap(), WireFormat::Cbor);
        assert!("xml".parse::<WireFormat>().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.worker.response_timeout_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(XxdkError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_partial_config_deserializes() {
        let config: Config =
            serde_json::from_str(r#"{"worker":{"response_timeout_ms":5,"initial_connection_timeout_ms":6,"wire_format":"cbor"}}"#)
                .unwrap();
        assert_eq!(config.worker.wire_format, WireFormat::Cbor);
        assert_eq!(config.logging.level, "info");
    }
}
