//! Byte-stream transport for the valve.
//!
//! The protocol layer only needs two things from the link: write a whole
//! message, and take whatever the device has buffered so far. Keeping that
//! behind the [`Transport`] trait lets the same protocol code drive a real
//! serial port or the in-memory simulator in tests.
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "instrument_serial")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use mxii_valve::hardware::transport::{SerialTransportBuilder, Transport};
//!
//! let mut port = SerialTransportBuilder::new("/dev/ttyUSB0").open()?;
//! port.write(b"S\r")?;
//! let response = port.read_available()?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "instrument_serial"))]
//! # fn main() {}
//! ```

use std::io;

/// Raw byte transport to a single device.
///
/// Implementations must not add framing of their own: bytes written go to
/// the device verbatim, and `read_available` returns bytes as received.
pub trait Transport: Send {
    /// Write the whole message, failing on timeout.
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Return every byte currently buffered from the device without waiting.
    ///
    /// An empty vector means nothing has arrived yet; it is not an error.
    fn read_available(&mut self) -> io::Result<Vec<u8>>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }

    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        (**self).read_available()
    }
}

#[cfg(feature = "instrument_serial")]
pub use serial::{SerialTransport, SerialTransportBuilder};

#[cfg(feature = "instrument_serial")]
mod serial {
    use super::Transport;
    use crate::error::{ValveError, ValveResult};
    use serialport::{ClearBuffer, SerialPort};
    use std::io::{self, Read, Write};
    use std::time::Duration;
    use tracing::trace;

    /// Builder for a [`SerialTransport`].
    ///
    /// Defaults match the MXII factory settings:
    /// * baud rate: 19200
    /// * read timeout: 2 seconds
    /// * write timeout: 5 seconds
    /// * 8N1, no flow control
    #[derive(Debug, Clone)]
    pub struct SerialTransportBuilder {
        path: String,
        baud_rate: u32,
        read_timeout: Duration,
        write_timeout: Duration,
    }

    impl SerialTransportBuilder {
        /// Factory baud rate of the MXII valve.
        pub const DEFAULT_BAUD_RATE: u32 = 19_200;

        /// Start a builder for the given device path (`/dev/ttyUSB0`, `COM3`).
        pub fn new(path: impl Into<String>) -> Self {
            Self {
                path: path.into(),
                baud_rate: Self::DEFAULT_BAUD_RATE,
                read_timeout: Duration::from_secs(2),
                write_timeout: Duration::from_secs(5),
            }
        }

        /// Set the baud rate.
        pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
            self.baud_rate = baud_rate;
            self
        }

        /// Set the read timeout.
        pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
            self.read_timeout = timeout;
            self
        }

        /// Set the write timeout.
        pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
            self.write_timeout = timeout;
            self
        }

        /// Open the port.
        ///
        /// # Errors
        /// Returns `ValveError::SerialOpen` if the device cannot be opened.
        pub fn open(self) -> ValveResult<SerialTransport> {
            let open_error = |err: serialport::Error| ValveError::SerialOpen {
                path: self.path.clone(),
                source: err.into(),
            };

            let port = serialport::new(&self.path, self.baud_rate)
                .data_bits(serialport::DataBits::Eight)
                .parity(serialport::Parity::None)
                .stop_bits(serialport::StopBits::One)
                .flow_control(serialport::FlowControl::None)
                .timeout(self.read_timeout)
                .open()
                .map_err(open_error)?;

            // Anything sitting in the OS buffer predates this session.
            port.clear(ClearBuffer::All).map_err(open_error)?;

            Ok(SerialTransport {
                port,
                path: self.path,
                read_timeout: self.read_timeout,
                write_timeout: self.write_timeout,
            })
        }
    }

    /// Serial port transport backed by the `serialport` crate.
    pub struct SerialTransport {
        port: Box<dyn SerialPort>,
        path: String,
        read_timeout: Duration,
        write_timeout: Duration,
    }

    impl SerialTransport {
        /// Device path this transport was opened on.
        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl std::fmt::Debug for SerialTransport {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("SerialTransport")
                .field("path", &self.path)
                .field("read_timeout", &self.read_timeout)
                .field("write_timeout", &self.write_timeout)
                .finish()
        }
    }

    impl Transport for SerialTransport {
        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            trace!(path = %self.path, bytes = %bytes.escape_ascii(), "serial write");

            // serialport has one timeout for both directions.
            self.port.set_timeout(self.write_timeout)?;
            let result = self.port.write_all(bytes).and_then(|()| self.port.flush());
            self.port.set_timeout(self.read_timeout)?;
            result
        }

        fn read_available(&mut self) -> io::Result<Vec<u8>> {
            let pending = self.port.bytes_to_read()? as usize;
            let mut buf = vec![0u8; pending];
            if pending > 0 {
                self.port.read_exact(&mut buf)?;
                trace!(path = %self.path, bytes = %buf.escape_ascii(), "serial read");
            }
            Ok(buf)
        }
    }
}
