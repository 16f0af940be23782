//! # Structured Logging
//!
//! Tracing subscriber initialization for hosts that do not bring their
//! own. Log level comes from `RUST_LOG` when set, otherwise from the
//! config default; output is plain text or JSON.

use serde::{Deserialize, Serialize};
use tracing::warn;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry,
};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Initialize the global tracing subscriber
///
/// Safe to call more than once; later calls log a warning instead of
/// failing, so test binaries can initialize freely.
pub fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let already_initialized = match config.format {
        LogFormat::Text => Registry::default()
            .with(filter)
            .with(fmt::layer())
            .try_init()
            .is_err(),
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
            .is_err(),
    };

    if already_initialized {
        warn!("Tracing subscriber already initialized, skipping initialization");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_does_not_panic() {
        let config = LoggingConfig::default();
        init_logging(&config);
        init_logging(&config);
    }

    #[test]
    fn format_parses_from_config() {
        let config: LoggingConfig =
            serde_yaml::from_str("level: debug\nformat: json\n").unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "debug");
    }
}
