//! Logging setup for the relay daemon
//!
//! Provides consistent logging setup with support for:
//! - Text, JSON, and pretty-printed output
//! - Environment variable configuration
//!
//! `RUST_LOG` wins over `RELAYCAST_LOG_LEVEL` when both are set.
//!
//! # Examples
//!
//! ```no_run
//! use librelaycast::logging::{LogFormat, LoggingConfig};
//!
//! // Initialize with JSON format
//! LoggingConfig::new(LogFormat::Json, "info".to_string()).init();
//!
//! // Or use default settings (respects env vars)
//! librelaycast::logging::init_default();
//! ```

use std::str::FromStr;

pub const LOG_FORMAT_VAR: &str = "RELAYCAST_LOG_FORMAT";
pub const LOG_LEVEL_VAR: &str = "RELAYCAST_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text output (no colors, for piping)
    Text,
    /// Machine-parseable JSON (one JSON object per line)
    Json,
    /// Pretty-printed with colors (for development)
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

/// Configuration for logging initialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: String) -> Self {
        Self { format, level }
    }

    /// Read format and level from the environment, falling back to text/info.
    ///
    /// An unknown format is reported on stderr and replaced by text.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let format = match lookup(LOG_FORMAT_VAR) {
            Some(raw) => raw.parse().unwrap_or_else(|e: String| {
                eprintln!("Warning: {}", e);
                LogFormat::Text
            }),
            None => LogFormat::Text,
        };
        let level = lookup(LOG_LEVEL_VAR)
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());
        Self::new(format, level)
    }

    /// Install the global subscriber. Call once, at startup.
    ///
    /// # Panics
    ///
    /// Panics if the logging subscriber has already been initialized
    pub fn init(&self) {
        use tracing_subscriber::EnvFilter;

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.format {
            LogFormat::Json => {
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .flatten_event(true)
                    .with_target(true)
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::fmt()
                    .pretty()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true)
                    .init();
            }
            LogFormat::Text => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_level(true)
                    .init();
            }
        }
    }
}

/// Initialize logging from `RELAYCAST_LOG_FORMAT` and `RELAYCAST_LOG_LEVEL`.
///
/// ```bash
/// export RELAYCAST_LOG_FORMAT=json
/// export RELAYCAST_LOG_LEVEL=debug
/// relay-send
/// ```
pub fn init_default() {
    LoggingConfig::from_lookup(|key| std::env::var(key).ok()).init();
}
