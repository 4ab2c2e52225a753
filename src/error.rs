//! Error types for the valve driver.
//!
//! This module defines `ValveError`, the single error type returned by every
//! fallible operation in the library. Using the `thiserror` crate, each variant
//! carries the diagnostic payload needed to tell a wiring problem from a
//! firmware mismatch.
//!
//! ## Error Hierarchy
//!
//! - **`InvalidPort`**: The requested port is outside `1..=port_count`. Raised before
//!   any byte is written to the device.
//! - **`InvalidPortCount`**: The valve was configured with a port count the one-digit
//!   protocol cannot address.
//! - **`Protocol`**: The device answered with bytes that do not fit the current protocol
//!   state. Carries the raw bytes. Never retried.
//! - **`Transport`**: Timeout or I/O failure from the transport, propagated unchanged.
//! - **`SerialOpen`**: The serial port could not be opened.
//! - **`GaveUp`**: A polling or move loop ran out of its attempt budget.
//! - **`Config`** / **`Configuration`**: Configuration parse or validation failures.
//!
//! By using `#[from]`, `ValveError` can be created from the underlying error types
//! with the `?` operator.

use std::fmt;
use thiserror::Error;

/// Convenience alias for results using the valve error type.
pub type ValveResult<T> = std::result::Result<T, ValveError>;

/// Which bounded loop gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Busy-polling for readiness after a change command.
    Polling,
    /// Re-issuing the change command until the position is confirmed.
    Moving,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Polling => "polling",
            Stage::Moving => "moving",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum ValveError {
    #[error("Invalid port number: {requested} (valve has ports 1-{port_count})")]
    InvalidPort { requested: u8, port_count: u8 },

    #[error("Invalid port count: {0} (supported range is 1-15)")]
    InvalidPortCount(u8),

    #[error("Protocol error: expected {expected}, valve sent \"{}\"", escape_bytes(.response))]
    Protocol {
        expected: &'static str,
        response: Vec<u8>,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Failed to open serial port {path}: {source}")]
    SerialOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    #[error("Gave up {stage} after {attempts} attempts")]
    GaveUp { stage: Stage, attempts: u32 },

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl ValveError {
    /// Raw device bytes attached to a protocol error, if any.
    pub fn response_bytes(&self) -> Option<&[u8]> {
        match self {
            ValveError::Protocol { response, .. } => Some(response),
            _ => None,
        }
    }
}

impl From<figment::Error> for ValveError {
    fn from(err: figment::Error) -> Self {
        ValveError::Config(Box::new(err))
    }
}

/// Render raw device bytes the way they appear on a terminal, e.g. `0A\r`.
pub(crate) fn escape_bytes(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}
