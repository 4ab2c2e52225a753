//! Valve hardware: wire protocol, transport, and driver.

pub mod mock_transport;
pub mod mxii;
pub mod protocol;
pub mod transport;
