//! Configuration System using Figment
//!
//! This module provides strongly-typed configuration loading for the valve driver.
//! Configuration is loaded from:
//! 1. config/mxii.toml file (base configuration)
//! 2. Environment variables (prefixed with MXII_, sections split by `__`)
//!
//! Every field has a default matching the valve's factory settings, so an empty
//! or missing file yields a usable configuration.
//!
//! # Example
//! ```no_run
//! use mxii_valve::config::ValveConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // MXII_SERIAL__PORT=/dev/ttyUSB1 overrides [serial] port
//! let config = ValveConfig::load()?;
//! config.validate()?;
//! println!("Valve: {} ({} ports)", config.valve.name, config.valve.ports);
//! # Ok(())
//! # }
//! ```

use crate::error::{ValveError, ValveResult};
use crate::hardware::mxii::{RetryPolicy, ValveSettings, DEFAULT_SETTLE};
use crate::hardware::protocol::MAX_PORTS;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/mxii.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValveConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Valve hardware settings
    #[serde(default)]
    pub valve: ValveSection,
    /// Serial link settings
    #[serde(default)]
    pub serial: SerialConfig,
    /// Retry bounds for the protocol loops
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Valve configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValveSection {
    /// Name shown in log output
    #[serde(default)]
    pub name: String,
    /// Number of ports (1-15)
    #[serde(default = "default_ports")]
    pub ports: u8,
    /// Delay after every write and read, in milliseconds
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

/// Serial link configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path, e.g. /dev/ttyUSB0 or COM3
    #[serde(default = "default_port")]
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Write timeout in milliseconds
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,
}

/// Retry bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Position probes allowed while a move is in progress
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    /// Change commands allowed before a move is abandoned
    #[serde(default = "default_max_move_attempts")]
    pub max_move_attempts: u32,
    /// Extra reads while waiting for a reply to arrive
    #[serde(default = "default_max_empty_reads")]
    pub max_empty_reads: u32,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_ports() -> u8 {
    10
}

fn default_settle_ms() -> u64 {
    50
}

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    19_200
}

fn default_read_timeout() -> u64 {
    2000
}

fn default_write_timeout() -> u64 {
    5000
}

fn default_max_polls() -> u32 {
    RetryPolicy::default().max_polls
}

fn default_max_move_attempts() -> u32 {
    RetryPolicy::default().max_move_attempts
}

fn default_max_empty_reads() -> u32 {
    RetryPolicy::default().max_empty_reads
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for ValveSection {
    fn default() -> Self {
        Self {
            name: String::new(),
            ports: default_ports(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout(),
            write_timeout_ms: default_write_timeout(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_polls: default_max_polls(),
            max_move_attempts: default_max_move_attempts(),
            max_empty_reads: default_max_empty_reads(),
        }
    }
}

impl ValveConfig {
    /// Load configuration from config/mxii.toml and environment variables
    ///
    /// Environment variables can override configuration with prefix MXII_
    /// Example: MXII_APPLICATION__LOG_LEVEL=debug
    pub fn load() -> ValveResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> ValveResult<Self> {
        Self::figment(path).extract().map_err(ValveError::from)
    }

    fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("MXII_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> ValveResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(ValveError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(ValveError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.valve.ports == 0 || self.valve.ports > MAX_PORTS {
            return Err(ValveError::Configuration(format!(
                "Invalid ports {}. Must be 1-{}",
                self.valve.ports, MAX_PORTS
            )));
        }

        // The valve needs this long to process each exchange; only simulator
        // tests may go below it, through `ValveSettings::with_settle`.
        if u128::from(self.valve.settle_ms) < DEFAULT_SETTLE.as_millis() {
            return Err(ValveError::Configuration(format!(
                "Invalid settle_ms {}. The valve needs at least {} ms",
                self.valve.settle_ms,
                DEFAULT_SETTLE.as_millis()
            )));
        }

        if self.serial.port.trim().is_empty() {
            return Err(ValveError::Configuration(
                "Serial port path must not be empty".to_string(),
            ));
        }

        if self.serial.baud_rate == 0 {
            return Err(ValveError::Configuration(
                "Baud rate must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_polls == 0 || self.retry.max_move_attempts == 0 {
            return Err(ValveError::Configuration(
                "max_polls and max_move_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Driver settings derived from this configuration
    pub fn settings(&self) -> ValveSettings {
        ValveSettings::new(self.valve.name.clone(), self.valve.ports)
            .with_settle(Duration::from_millis(self.valve.settle_ms))
            .with_retry(RetryPolicy {
                max_polls: self.retry.max_polls,
                max_move_attempts: self.retry.max_move_attempts,
                max_empty_reads: self.retry.max_empty_reads,
            })
    }
}

#[cfg(feature = "instrument_serial")]
impl SerialConfig {
    /// Serial transport builder for this link
    pub fn builder(&self) -> crate::hardware::transport::SerialTransportBuilder {
        crate::hardware::transport::SerialTransportBuilder::new(self.port.clone())
            .with_baud_rate(self.baud_rate)
            .with_read_timeout(Duration::from_millis(self.read_timeout_ms))
            .with_write_timeout(Duration::from_millis(self.write_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    // Figment's Jail serializes tests that touch files or MXII_* variables.

    #[test]
    fn test_defaults_match_factory_settings() {
        let config = ValveConfig::default();
        assert_eq!(config.valve.ports, 10);
        assert_eq!(config.serial.baud_rate, 19_200);
        assert_eq!(config.serial.read_timeout_ms, 2000);
        assert_eq!(config.serial.write_timeout_ms, 5000);
        assert!(config.validate().is_ok());

        let settings = config.settings();
        assert_eq!(settings.settle, Duration::from_millis(50));
        assert_eq!(settings.retry, RetryPolicy::default());
    }

    #[test]
    fn test_load_from_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "valve.toml",
                r#"
                [application]
                log_level = "debug"

                [valve]
                name = "buffer select"
                ports = 6

                [serial]
                port = "/dev/ttyUSB3"

                [retry]
                max_move_attempts = 2
                "#,
            )?;

            let config = ValveConfig::load_from("valve.toml").unwrap();
            assert_eq!(config.application.log_level, "debug");
            assert_eq!(config.application.log_format, "pretty");
            assert_eq!(config.valve.name, "buffer select");
            assert_eq!(config.valve.ports, 6);
            assert_eq!(config.valve.settle_ms, 50);
            assert_eq!(config.serial.port, "/dev/ttyUSB3");
            assert_eq!(config.retry.max_move_attempts, 2);
            assert_eq!(config.retry.max_polls, 600);

            let settings = config.settings();
            assert_eq!(settings.name, "buffer select");
            assert_eq!(settings.port_count, 6);
            assert_eq!(settings.retry.max_move_attempts, 2);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "mxii.toml",
                r#"
                [valve]
                ports = 10

                [serial]
                port = "/dev/ttyUSB0"
                "#,
            )?;
            jail.set_env("MXII_VALVE__PORTS", "4");
            jail.set_env("MXII_SERIAL__PORT", "/dev/ttyACM1");

            let config = ValveConfig::load_from("mxii.toml").unwrap();
            assert_eq!(config.valve.ports, 4);
            assert_eq!(config.serial.port, "/dev/ttyACM1");
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        Jail::expect_with(|_jail| {
            let config = ValveConfig::load_from("absent.toml").unwrap();
            assert_eq!(config, ValveConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        Jail::expect_with(|jail| {
            jail.create_file("bad.toml", "[valve]\nports = \"ten\"")?;
            assert!(matches!(
                ValveConfig::load_from("bad.toml"),
                Err(ValveError::Config(_))
            ));
            Ok(())
        });
    }

    #[test]
    fn test_settle_below_device_latency_rejected() {
        for settle_ms in [0, 49] {
            let mut config = ValveConfig::default();
            config.valve.settle_ms = settle_ms;
            assert!(
                matches!(
                    config.validate(),
                    Err(ValveError::Configuration(msg)) if msg.contains("settle_ms")
                ),
                "settle_ms = {} accepted",
                settle_ms
            );
        }
    }

    #[test]
    fn test_settle_from_environment_is_validated() {
        Jail::expect_with(|jail| {
            jail.set_env("MXII_VALVE__SETTLE_MS", "0");
            let config = ValveConfig::load_from("absent.toml").unwrap();
            assert_eq!(config.valve.settle_ms, 0);
            assert!(config.validate().is_err());
            Ok(())
        });
    }

    #[test]
    fn test_config_validation() {
        let mut config = ValveConfig::default();
        config.valve.ports = 16;
        assert!(config.validate().is_err());

        let mut config = ValveConfig::default();
        config.valve.ports = 0;
        assert!(config.validate().is_err());

        let mut config = ValveConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = ValveConfig::default();
        config.application.log_format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = ValveConfig::default();
        config.retry.max_move_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ValveConfig::default();
        config.valve.settle_ms = 80;
        assert!(config.validate().is_ok());

        let mut config = ValveConfig::default();
        config.serial.port = " ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ValveError::Configuration(msg)) if msg.contains("Serial port")
        ));
    }
}
