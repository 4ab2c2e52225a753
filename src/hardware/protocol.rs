//! MX Series II ASCII protocol
//!
//! Reference: MX Series II Driver Development Package
//!
//! Protocol Overview:
//! - Commands: ASCII, terminated by carriage return
//!   - `S\r`: read current valve position
//!   - `P0{X}\r`: move to port X, where X is one uppercase hex digit (1-F)
//! - Responses:
//!   - `0{X}\r`: current position, X is one ASCII hex digit
//!   - `\r`: ready / command acknowledged
//!   - `*` or `**`: busy (valve still rotating)
//!
//! The port number travels in a single hex digit, so valves with 16 or more
//! ports cannot be addressed.

use crate::error::{ValveError, ValveResult};
use std::fmt;

/// Largest port number the one-digit encoding can carry.
pub const MAX_PORTS: u8 = 15;

const CR: u8 = b'\r';

/// A validated valve port, `1..=port_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Port(u8);

impl Port {
    /// Validate `value` against the valve's port count.
    ///
    /// # Errors
    /// Returns `ValveError::InvalidPort` if `value` is 0 or above `port_count`.
    pub fn new(value: u8, port_count: u8) -> ValveResult<Self> {
        if value == 0 || value > port_count || value > MAX_PORTS {
            return Err(ValveError::InvalidPort {
                requested: value,
                port_count,
            });
        }
        Ok(Self(value))
    }

    /// Port number as sent on the wire.
    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commands understood by the valve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `S`: report the current position.
    ReadPosition,
    /// `P0X`: rotate to the given port.
    ChangePosition(Port),
}

/// Build the wire message for a command.
pub fn encode(command: &Command) -> Vec<u8> {
    match command {
        Command::ReadPosition => b"S\r".to_vec(),
        // Leading "0" is the high digit of the port; always zero below 16 ports.
        Command::ChangePosition(port) => format!("P0{:X}\r", port.value()).into_bytes(),
    }
}

/// A decoded valve response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceResponse {
    /// Position report. Raw nibble, not yet checked against the port count.
    CurrentPort(u8),
    /// Bare carriage return.
    Ready,
    /// `*` or `**`.
    Busy,
    /// Anything else, including an empty read.
    Malformed(Vec<u8>),
}

impl fmt::Display for DeviceResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceResponse::CurrentPort(port) => write!(f, "current port {}", port),
            DeviceResponse::Ready => f.write_str("ready"),
            DeviceResponse::Busy => f.write_str("busy"),
            DeviceResponse::Malformed(raw) => write!(f, "malformed \"{}\"", raw.escape_ascii()),
        }
    }
}

/// Decode raw response bytes.
///
/// Rules are checked in order: the fixed 3-byte position frame, then the
/// single CR, then the busy markers. Nothing else is guessed at.
pub fn decode(raw: &[u8]) -> DeviceResponse {
    match raw {
        // Valve answers in hex: 'A' is port 10.
        [b'0', digit, CR] => match char::from(*digit).to_digit(16) {
            Some(port) => DeviceResponse::CurrentPort(port as u8),
            None => DeviceResponse::Malformed(raw.to_vec()),
        },
        [CR] => DeviceResponse::Ready,
        b"*" | b"**" => DeviceResponse::Busy,
        _ => DeviceResponse::Malformed(raw.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX_DIGITS: &[u8; 15] = b"123456789ABCDEF";

    fn port(value: u8) -> Port {
        Port::new(value, MAX_PORTS).unwrap()
    }

    #[test]
    fn test_encode_read_position() {
        assert_eq!(encode(&Command::ReadPosition), b"S\r");
    }

    #[test]
    fn test_encode_change_position_all_ports() {
        for (value, digit) in (1..=MAX_PORTS).zip(HEX_DIGITS) {
            assert_eq!(
                encode(&Command::ChangePosition(port(value))),
                [b'P', b'0', *digit, b'\r']
            );
        }
        assert_eq!(encode(&Command::ChangePosition(port(10))), b"P0A\r");
        assert_eq!(encode(&Command::ChangePosition(port(15))), b"P0F\r");
    }

    #[test]
    fn test_decode_position_frames() {
        for (value, digit) in (1..=MAX_PORTS).zip(HEX_DIGITS) {
            assert_eq!(
                decode(&[b'0', *digit, b'\r']),
                DeviceResponse::CurrentPort(value)
            );
        }
        // Lower-case digits are still hex.
        assert_eq!(decode(b"0a\r"), DeviceResponse::CurrentPort(10));
    }

    #[test]
    fn test_decode_status_bytes() {
        assert_eq!(decode(b"\r"), DeviceResponse::Ready);
        assert_eq!(decode(b"*"), DeviceResponse::Busy);
        assert_eq!(decode(b"**"), DeviceResponse::Busy);
    }

    #[test]
    fn test_decode_malformed() {
        for raw in [
            &b""[..],
            b"Z\r",
            b"***",
            b"0G\r",
            b"1A\r",
            b"0A",
            b"\r\r",
            b"03\r\r",
        ] {
            assert_eq!(decode(raw), DeviceResponse::Malformed(raw.to_vec()));
        }
    }

    #[test]
    fn test_port_validation() {
        assert!(Port::new(1, 10).is_ok());
        assert!(Port::new(10, 10).is_ok());
        assert!(matches!(
            Port::new(0, 10),
            Err(ValveError::InvalidPort {
                requested: 0,
                port_count: 10
            })
        ));
        assert!(Port::new(11, 10).is_err());
        assert!(Port::new(16, 16).is_err());
        assert_eq!(port(15).to_string(), "15");
    }

    #[test]
    fn test_response_display() {
        assert_eq!(DeviceResponse::CurrentPort(7).to_string(), "current port 7");
        assert_eq!(
            DeviceResponse::Malformed(b"Z\r".to_vec()).to_string(),
            "malformed \"Z\\r\""
        );
    }
}
