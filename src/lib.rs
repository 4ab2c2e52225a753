//! # MXII Valve Driver
//!
//! This crate drives Rheodyne/IDEX MX Series II rotary selector valves over a
//! serial link using the vendor ASCII protocol. The one operation that matters
//! is moving the valve to a numbered port and confirming arrival; everything
//! else exists to make that operation reliable and observable.
//!
//! ## Crate Structure
//!
//! - **`hardware`**: The protocol codec (`protocol`), the byte transport
//!   (`transport`), the valve driver state machine (`mxii`), and a simulated
//!   valve for tests (`mock_transport`).
//! - **`config`**: Figment-based loading and validation of `config/mxii.toml`.
//! - **`error`**: The `ValveError` enum used by every fallible operation.
//! - **`logging`**: Installs a `tracing-subscriber` for applications.
//!
//! ## Example
//!
//! ```
//! use mxii_valve::hardware::mock_transport::SimulatedValve;
//! use mxii_valve::hardware::mxii::{MxiiValve, ValveSettings};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), mxii_valve::ValveError> {
//! let (transport, device) = SimulatedValve::new(10, 3);
//! let settings = ValveSettings::new("demo", 10).with_settle(Duration::ZERO);
//! let mut valve = MxiiValve::new(transport, settings)?;
//!
//! let report = valve.move_to(7)?;
//! assert_eq!(report.port.value(), 7);
//! assert_eq!(device.position(), 7);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod hardware;
pub mod logging;

pub use error::{Stage, ValveError, ValveResult};
pub use hardware::mxii::{MoveReport, MxiiValve, RetryPolicy, ValveSettings};
pub use hardware::protocol::{Command, DeviceResponse, Port, MAX_PORTS};
pub use hardware::transport::Transport;
