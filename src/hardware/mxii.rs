//! Rheodyne/IDEX MX Series II Selector Valve Driver
//!
//! Reference: MX Series II Driver Development Package
//!
//! Protocol Overview:
//! - Format: single-letter ASCII commands terminated by `\r`
//! - Encoding: port numbers as one uppercase hex digit (1-F)
//! - Timing: half-duplex request-response with ~50ms processing latency
//!   after every write and read
//!
//! A port change is not trusted until the valve reports the new position:
//! `move_to` sends the change command, busy-polls with position queries until
//! the valve answers with a port, re-reads the position, and re-issues the
//! change on mismatch.
//!
//! # Example Usage
//!
//! ```no_run
//! use mxii_valve::config::ValveConfig;
//! use mxii_valve::hardware::mxii::MxiiValve;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ValveConfig::load()?;
//! let mut valve = MxiiValve::from_config(&config)?;
//!
//! let report = valve.move_to(4)?;
//! println!("Valve at port {} after {} change commands", report.port, report.change_commands);
//! # Ok(())
//! # }
//! ```

use super::protocol::{self, Command, DeviceResponse, Port, MAX_PORTS};
use super::transport::Transport;
use crate::error::{Stage, ValveError, ValveResult};
use std::time::Duration;
use tracing::{debug, info, instrument, trace, warn};

/// Processing latency the valve needs after every write and read.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(50);

/// Bounds on the protocol's retry loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Position probes allowed while waiting for a move to finish.
    pub max_polls: u32,
    /// Change commands allowed before giving up on a move.
    pub max_move_attempts: u32,
    /// Extra reads allowed while a reply has not arrived yet.
    pub max_empty_reads: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_polls: 600,
            max_move_attempts: 5,
            max_empty_reads: 20,
        }
    }
}

/// Static settings of one valve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValveSettings {
    /// Name used in log output.
    pub name: String,
    /// Number of ports on the valve (1-15).
    pub port_count: u8,
    /// Delay after each write and read.
    pub settle: Duration,
    /// Retry bounds.
    pub retry: RetryPolicy,
}

impl ValveSettings {
    /// Settings for a valve with `port_count` ports and default timing.
    pub fn new(name: impl Into<String>, port_count: u8) -> Self {
        Self {
            name: name.into(),
            port_count,
            settle: DEFAULT_SETTLE,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the settle delay.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Override the retry bounds.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for ValveSettings {
    fn default() -> Self {
        Self::new("", 10)
    }
}

/// Outcome of a successful [`MxiiValve::move_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct MoveReport {
    /// Port the valve confirmed.
    pub port: Port,
    /// Change commands sent; 0 when the valve was already in place.
    pub change_commands: u32,
    /// Position probes sent while waiting for the valve to settle.
    pub polls: u32,
}

/// Driver for one MX Series II valve.
///
/// Owns its transport exclusively; there is no way to get the transport back
/// out, so nothing else can interleave bytes with a running transaction.
pub struct MxiiValve<T: Transport> {
    transport: T,
    settings: ValveSettings,
}

#[cfg(feature = "instrument_serial")]
impl MxiiValve<super::transport::SerialTransport> {
    /// Open the serial port named in the configuration and build a driver.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or the port cannot be opened.
    pub fn from_config(config: &crate::config::ValveConfig) -> ValveResult<Self> {
        config.validate()?;
        let transport = config.serial.builder().open()?;
        Self::new(transport, config.settings())
    }
}

#[cfg(not(feature = "instrument_serial"))]
impl MxiiValve<Box<dyn Transport>> {
    /// Serial support is compiled out; always fails.
    pub fn from_config(_config: &crate::config::ValveConfig) -> ValveResult<Self> {
        Err(ValveError::SerialFeatureDisabled)
    }
}

impl<T: Transport> MxiiValve<T> {
    /// Take ownership of `transport` and build a driver.
    ///
    /// # Errors
    /// Returns `ValveError::InvalidPortCount` if the port count is 0 or above 15.
    pub fn new(transport: T, settings: ValveSettings) -> ValveResult<Self> {
        if settings.port_count == 0 || settings.port_count > MAX_PORTS {
            return Err(ValveError::InvalidPortCount(settings.port_count));
        }
        Ok(Self {
            transport,
            settings,
        })
    }

    /// Valve name used in log output.
    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Number of ports on the valve.
    pub fn port_count(&self) -> u8 {
        self.settings.port_count
    }

    /// Current settings.
    pub fn settings(&self) -> &ValveSettings {
        &self.settings
    }

    fn settle(&self) {
        if !self.settings.settle.is_zero() {
            std::thread::sleep(self.settings.settle);
        }
    }

    /// One write-then-read exchange.
    ///
    /// Stale bytes are drained first; the valve emits status bytes on its own
    /// between commands. Returns an empty vector if no reply showed up within
    /// the empty-read budget.
    fn transact(&mut self, command: &Command) -> ValveResult<Vec<u8>> {
        let stale = self.transport.read_available()?;
        if !stale.is_empty() {
            trace!(
                valve = %self.settings.name,
                count = stale.len(),
                bytes = %stale.escape_ascii(),
                "Discarded stale bytes"
            );
        }

        let message = protocol::encode(command);
        self.transport.write(&message)?;
        self.settle();

        let mut response = self.transport.read_available()?;
        let mut extra_reads = 0;
        while response.is_empty() && extra_reads < self.settings.retry.max_empty_reads {
            self.settle();
            response = self.transport.read_available()?;
            extra_reads += 1;
        }
        if !response.is_empty() {
            self.settle();
        }

        trace!(
            valve = %self.settings.name,
            sent = %message.escape_ascii(),
            received = %response.escape_ascii(),
            extra_reads,
            "Transaction complete"
        );
        Ok(response)
    }

    /// Read the port the valve currently sits at.
    ///
    /// # Errors
    /// Returns `ValveError::Protocol` if the valve answers with anything other
    /// than a position frame for a port in `1..=port_count`.
    #[instrument(skip(self), fields(valve = %self.settings.name))]
    pub fn query_current_port(&mut self) -> ValveResult<Port> {
        let raw = self.transact(&Command::ReadPosition)?;
        match protocol::decode(&raw) {
            DeviceResponse::CurrentPort(value) => Port::new(value, self.settings.port_count)
                .map_err(|_| ValveError::Protocol {
                    expected: "a port within the valve's range",
                    response: raw,
                }),
            other => {
                debug!(response = %other, "Position query got a non-position reply");
                Err(ValveError::Protocol {
                    expected: "current port",
                    response: raw,
                })
            }
        }
    }

    /// Busy-poll with position queries until the valve answers with a port.
    ///
    /// The port in that answer is not checked; callers re-read the position.
    /// Returns the number of probes sent.
    ///
    /// # Errors
    /// Returns `ValveError::Protocol` on a malformed reply, or
    /// `ValveError::GaveUp` once `max_polls` probes went unanswered.
    #[instrument(skip(self), fields(valve = %self.settings.name))]
    pub fn wait_until_ready(&mut self) -> ValveResult<u32> {
        let max_polls = self.settings.retry.max_polls;
        for probe in 1..=max_polls {
            let raw = self.transact(&Command::ReadPosition)?;
            match protocol::decode(&raw) {
                DeviceResponse::CurrentPort(_) => {
                    debug!(probes = probe, "Valve ready");
                    return Ok(probe);
                }
                // TODO: confirm the "*"/"**" busy markers against a valve mid-rotation
                DeviceResponse::Busy | DeviceResponse::Ready => {
                    trace!(probe, "Valve still moving");
                }
                DeviceResponse::Malformed(bytes) if bytes.is_empty() => {
                    trace!(probe, "No reply yet");
                }
                DeviceResponse::Malformed(bytes) => {
                    return Err(ValveError::Protocol {
                        expected: "busy marker or current port",
                        response: bytes,
                    });
                }
            }
        }

        warn!(max_polls, "Valve never reported ready");
        Err(ValveError::GaveUp {
            stage: Stage::Polling,
            attempts: max_polls,
        })
    }

    /// Move to `target` and confirm arrival.
    ///
    /// Returns immediately without sending a change command if the valve is
    /// already at `target`.
    ///
    /// # Errors
    /// - `ValveError::InvalidPort` if `target` is outside `1..=port_count`;
    ///   nothing is sent to the valve in that case
    /// - `ValveError::Protocol` / `ValveError::Transport` from the exchanges
    /// - `ValveError::GaveUp` after `max_move_attempts` unconfirmed moves
    #[instrument(skip(self), fields(valve = %self.settings.name))]
    pub fn move_to(&mut self, target: u8) -> ValveResult<MoveReport> {
        let target = Port::new(target, self.settings.port_count)?;

        let current = self.query_current_port()?;
        if current == target {
            info!(port = %target, "Valve already in position");
            return Ok(MoveReport {
                port: target,
                change_commands: 0,
                polls: 0,
            });
        }

        let max_attempts = self.settings.retry.max_move_attempts;
        let mut polls = 0;
        for attempt in 1..=max_attempts {
            debug!(from = %current, to = %target, attempt, "Issuing port change");
            // Reply to the change itself is just an acknowledgement.
            let _ = self.transact(&Command::ChangePosition(target))?;
            polls += self.wait_until_ready()?;

            let reached = self.query_current_port()?;
            if reached == target {
                info!(port = %target, attempts = attempt, "Valve moved");
                return Ok(MoveReport {
                    port: target,
                    change_commands: attempt,
                    polls,
                });
            }
            warn!(expected = %target, actual = %reached, attempt, "Valve stopped at wrong port");
        }

        Err(ValveError::GaveUp {
            stage: Stage::Moving,
            attempts: max_attempts,
        })
    }
}

impl<T: Transport> std::fmt::Debug for MxiiValve<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MxiiValve")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
