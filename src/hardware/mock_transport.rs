//! Simulated MXII valve for testing the protocol without hardware
//!
//! This module provides `SimulatedValve`, which implements [`Transport`], and a
//! corresponding `SimulatorHandle` to script and inspect the simulated device
//! from within tests. Both halves share one state, so a test keeps the handle
//! while the valve driver takes exclusive ownership of the transport.
//!
//! # Behavior
//!
//! - `S\r` answers with the current position frame (`0{X}\r`).
//! - `P0{X}\r` answers with a bare `\r`, then starts a move. Position probes
//!   during the move are answered from the move script (e.g. `*`, `**`, `\r`),
//!   and once the script is exhausted the valve lands on the target port.
//! - Replies queued with [`SimulatorHandle::queue_reply`] take priority over the
//!   simulated behavior, which is how tests feed malformed frames.
//!
//! # Example
//!
//! ```
//! use mxii_valve::hardware::mock_transport::SimulatedValve;
//! use mxii_valve::hardware::transport::Transport;
//!
//! let (mut valve, handle) = SimulatedValve::new(10, 3);
//! valve.write(b"S\r").unwrap();
//! assert_eq!(valve.read_available().unwrap(), b"03\r");
//! assert_eq!(handle.writes(), vec![b"S\r".to_vec()]);
//! ```

use super::transport::Transport;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

#[derive(Debug, Default)]
struct SimState {
    position: u8,
    port_count: u8,
    /// Bytes emitted by the device and not yet read.
    outbox: VecDeque<u8>,
    /// Every message written by the driver, in order.
    writes: Vec<Vec<u8>>,
    /// Replies that override the simulated behavior, one per write.
    queued_replies: VecDeque<Vec<u8>>,
    /// Probe replies served while a move is in progress.
    move_script: Vec<Vec<u8>>,
    in_transit: VecDeque<Vec<u8>>,
    pending_target: Option<u8>,
    /// Valve acknowledges moves but never leaves its position.
    jammed: bool,
    /// Empty reads to serve after each write before the reply shows up.
    reply_delay: u32,
    delay_remaining: u32,
    fail_writes: Option<io::ErrorKind>,
}

impl SimState {
    fn respond(&mut self, message: &[u8]) {
        if let Some(reply) = self.queued_replies.pop_front() {
            self.outbox.extend(reply);
            return;
        }

        match message {
            b"S\r" => {
                if let Some(reply) = self.in_transit.pop_front() {
                    self.outbox.extend(reply);
                    return;
                }
                if let Some(target) = self.pending_target.take() {
                    if !self.jammed {
                        self.position = target;
                    }
                }
                self.outbox.extend(position_frame(self.position));
            }
            [b'P', b'0', digit, b'\r'] => {
                let target = char::from(*digit)
                    .to_digit(16)
                    .map(|d| d as u8)
                    .filter(|d| (1..=self.port_count).contains(d));
                self.outbox.push_back(b'\r');
                if let Some(target) = target {
                    self.pending_target = Some(target);
                    self.in_transit = self.move_script.iter().cloned().collect();
                }
            }
            // Unknown commands are ignored by the firmware.
            _ => {}
        }
    }
}

fn position_frame(port: u8) -> Vec<u8> {
    format!("0{:X}\r", port).into_bytes()
}

/// The transport side of the simulator, handed to the valve driver.
#[derive(Debug)]
pub struct SimulatedValve {
    state: Arc<Mutex<SimState>>,
}

/// The test side of the simulator.
#[derive(Debug, Clone)]
pub struct SimulatorHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedValve {
    /// Create a connected simulator pair for a valve with `port_count` ports
    /// currently sitting at `position`.
    pub fn new(port_count: u8, position: u8) -> (SimulatedValve, SimulatorHandle) {
        let state = Arc::new(Mutex::new(SimState {
            position,
            port_count,
            ..SimState::default()
        }));
        (
            SimulatedValve {
                state: Arc::clone(&state),
            },
            SimulatorHandle { state },
        )
    }
}

impl Transport for SimulatedValve {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        if let Some(kind) = state.fail_writes {
            return Err(io::Error::new(kind, "simulated write failure"));
        }
        state.writes.push(bytes.to_vec());
        state.delay_remaining = state.reply_delay;
        state.respond(bytes);
        Ok(())
    }

    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        let mut state = self.state.lock();
        if state.delay_remaining > 0 {
            state.delay_remaining -= 1;
            return Ok(Vec::new());
        }
        Ok(state.outbox.drain(..).collect())
    }
}

impl SimulatorHandle {
    /// Current simulated valve position.
    pub fn position(&self) -> u8 {
        self.state.lock().position
    }

    /// Every message the driver wrote, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().writes.clone()
    }

    /// Number of `P0X` change commands the driver wrote.
    pub fn change_commands(&self) -> usize {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|w| w.first() == Some(&b'P'))
            .count()
    }

    /// Number of `S` position queries the driver wrote.
    pub fn position_queries(&self) -> usize {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|w| w.as_slice() == b"S\r")
            .count()
    }

    /// Replies served to position probes after every change command.
    pub fn set_move_script<I, B>(&self, replies: I)
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        self.state.lock().move_script = replies.into_iter().map(|r| r.as_ref().to_vec()).collect();
    }

    /// Queue a reply that answers the next write regardless of its content.
    pub fn queue_reply(&self, reply: impl AsRef<[u8]>) {
        self.state
            .lock()
            .queued_replies
            .push_back(reply.as_ref().to_vec());
    }

    /// Push unsolicited bytes into the receive buffer.
    pub fn inject_stale(&self, bytes: impl AsRef<[u8]>) {
        self.state.lock().outbox.extend(bytes.as_ref());
    }

    /// Keep acknowledging moves without ever changing position.
    pub fn set_jammed(&self, jammed: bool) {
        self.state.lock().jammed = jammed;
    }

    /// Serve `reads` empty reads after each write before the reply appears.
    pub fn set_reply_delay(&self, reads: u32) {
        self.state.lock().reply_delay = reads;
    }

    /// Fail every subsequent write with the given error kind.
    pub fn fail_writes(&self, kind: io::ErrorKind) {
        self.state.lock().fail_writes = Some(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_query() {
        let (mut valve, handle) = SimulatedValve::new(10, 10);
        valve.write(b"S\r").unwrap();
        assert_eq!(valve.read_available().unwrap(), b"0A\r");
        assert!(valve.read_available().unwrap().is_empty());
        assert_eq!(handle.position_queries(), 1);
    }

    #[test]
    fn test_move_runs_script_then_lands() {
        let (mut valve, handle) = SimulatedValve::new(10, 3);
        handle.set_move_script([&b"*"[..], b"**"]);

        valve.write(b"P07\r").unwrap();
        assert_eq!(valve.read_available().unwrap(), b"\r");

        let mut replies = Vec::new();
        for _ in 0..3 {
            valve.write(b"S\r").unwrap();
            replies.push(valve.read_available().unwrap());
        }
        assert_eq!(replies, vec![b"*".to_vec(), b"**".to_vec(), b"07\r".to_vec()]);
        assert_eq!(handle.position(), 7);
        assert_eq!(handle.change_commands(), 1);
    }

    #[test]
    fn test_jammed_valve_stays_put() {
        let (mut valve, handle) = SimulatedValve::new(10, 3);
        handle.set_jammed(true);
        valve.write(b"P07\r").unwrap();
        valve.write(b"S\r").unwrap();
        assert_eq!(valve.read_available().unwrap(), b"\r03\r");
        assert_eq!(handle.position(), 3);
    }

    #[test]
    fn test_reply_delay_and_queued_reply() {
        let (mut valve, handle) = SimulatedValve::new(10, 3);
        handle.set_reply_delay(2);
        handle.queue_reply(b"Z\r");

        valve.write(b"S\r").unwrap();
        assert!(valve.read_available().unwrap().is_empty());
        assert!(valve.read_available().unwrap().is_empty());
        assert_eq!(valve.read_available().unwrap(), b"Z\r");
    }

    #[test]
    fn test_write_failure() {
        let (mut valve, handle) = SimulatedValve::new(10, 3);
        handle.fail_writes(io::ErrorKind::TimedOut);
        let err = valve.write(b"S\r").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(handle.writes().is_empty());
    }
}
