//! Subscriber setup for applications.
//!
//! The library only emits `tracing` events, and each valve operation runs in a
//! span carrying the valve name. Binaries install a subscriber here from the
//! `[application]` section of the configuration. `RUST_LOG` wins over
//! `log_level` when set.
//!
//! # Example
//! ```no_run
//! use mxii_valve::{config::ValveConfig, logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ValveConfig::load()?;
//! logging::init_from_config(&config)?;
//! # Ok(())
//! # }
//! ```

use crate::config::ValveConfig;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Multi-line, colored; for a terminal.
    Pretty,
    /// One line per event, no colors.
    Compact,
    /// One JSON object per event.
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(OutputFormat::Pretty),
            "compact" => Ok(OutputFormat::Compact),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!(
                "Invalid log format '{}'. Must be one of: pretty, compact, json",
                s
            )),
        }
    }
}

/// Parse log level string into tracing Level
pub fn parse_log_level(level: &str) -> Result<Level, String> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(format!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        )),
    }
}

fn log_settings(config: &ValveConfig) -> Result<(Level, OutputFormat), String> {
    let level = parse_log_level(&config.application.log_level)?;
    let format = config.application.log_format.parse::<OutputFormat>()?;
    Ok((level, format))
}

/// Install the global subscriber described by `[application]`.
///
/// Calling this again after a subscriber is installed is a no-op.
pub fn init_from_config(config: &ValveConfig) -> Result<(), String> {
    let (level, format) = log_settings(config)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let layer = match format {
        OutputFormat::Pretty => fmt::layer().pretty().with_filter(filter).boxed(),
        OutputFormat::Compact => fmt::layer()
            .compact()
            .with_ansi(false)
            .with_filter(filter)
            .boxed(),
        OutputFormat::Json => fmt::layer().json().with_filter(filter).boxed(),
    };

    match tracing_subscriber::registry().with(layer).try_init() {
        Ok(()) => Ok(()),
        Err(e) if e.to_string().contains("already been set") => Ok(()),
        Err(e) => Err(format!("Failed to initialize tracing: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("trace"), Ok(Level::TRACE));
        assert_eq!(parse_log_level("WARN"), Ok(Level::WARN));
        assert!(parse_log_level("verbose").is_err());
    }

    #[test]
    fn test_log_settings_follow_application_section() {
        let mut config = ValveConfig::default();
        assert_eq!(
            log_settings(&config),
            Ok((Level::INFO, OutputFormat::Pretty))
        );

        config.application.log_level = "debug".to_string();
        config.application.log_format = "JSON".to_string();
        assert_eq!(log_settings(&config), Ok((Level::DEBUG, OutputFormat::Json)));

        config.application.log_format = "xml".to_string();
        assert!(log_settings(&config).is_err());
    }
}
