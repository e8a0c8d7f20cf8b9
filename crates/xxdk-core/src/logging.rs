//! Tracing subscriber setup shared by the native tools and the wasm crate.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{Result, XxdkError};

/// Build the filter for a logging configuration.
///
/// `RUST_LOG` wins over the configured level when it is set.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .map_err(|e| XxdkError::InvalidConfig(format!("log level {}: {}", config.level, e)))
}

/// Install a global `fmt` subscriber.
///
/// Returns an error if the filter is invalid. A subscriber that is already
/// installed is left in place.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_target(true)
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig::default();
        assert!(init_tracing(&config).is_ok());
        assert!(init_tracing(&config).is_ok());
    }
}
