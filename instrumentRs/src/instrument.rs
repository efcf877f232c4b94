//! This module provides the general implementation of the [`InstrumentInterface`] trait and the
//! error type that all interfaces and drivers return.
//!
//! [`Instrument`] can be built from any type that implements [`std::io::Read`] and
//! [`std::io::Write`], such as [`std::net::TcpStream`] or a boxed [`serialport::SerialPort`].

use std::time::Duration;

use thiserror::Error;

use crate::InstrumentInterface;

/// A general instrument interface that can be built with any port that implements
/// [`std::io::Read`] and [`std::io::Write`].
///
/// # Example
///
/// ```no_run
/// use std::{net::TcpStream, time::Duration};
///
/// use instrumentrs::Instrument;
///
/// let bridge = TcpStream::connect("192.168.10.1:4001").unwrap();
/// let interface = Instrument::new(bridge, Duration::from_secs(3));
/// ```
pub struct Instrument<P: std::io::Read + std::io::Write> {
    port: P,
    terminator: String,
    timeout: Duration,
    input_clear: Option<fn(&mut P) -> Result<(), InstrumentError>>,
}

impl<P: std::io::Read + std::io::Write> Instrument<P> {
    /// Create a new [`Instrument`] from a port and the timeout for reading replies.
    ///
    /// The terminator is `"\n"` until changed with `set_terminator`.
    pub fn new(port: P, timeout: Duration) -> Self {
        Self {
            port,
            terminator: "\n".to_string(),
            timeout,
            input_clear: None,
        }
    }

    /// Set the function that discards pending input of the port.
    ///
    /// It is called by [`InstrumentInterface::clear_input`], i.e., before every query. Without
    /// it, clearing the input does nothing.
    pub fn with_input_clear(
        mut self,
        input_clear: fn(&mut P) -> Result<(), InstrumentError>,
    ) -> Self {
        self.input_clear = Some(input_clear);
        self
    }

    /// Set the timeout for reading replies.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }
}

impl<P: std::io::Read + std::io::Write> InstrumentInterface for Instrument<P> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError> {
        self.port.read_exact(buf)?;
        Ok(())
    }

    fn get_terminator(&self) -> &str {
        self.terminator.as_str()
    }

    fn set_terminator(&mut self, terminator: &str) {
        self.terminator = terminator.to_string();
    }

    fn get_timeout(&self) -> Duration {
        self.timeout
    }

    fn clear_input(&mut self) -> Result<(), InstrumentError> {
        match self.input_clear {
            Some(input_clear) => input_clear(&mut self.port),
            None => Ok(()),
        }
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }
}

/// The error enum for all interfaces and instruments.
///
/// Every driver operation returns either its result or an `InstrumentError`. The variants group
/// into the following kinds:
///
/// - connecting: [`DeviceNotFound`](InstrumentError::DeviceNotFound),
///   [`NotIdentified`](InstrumentError::NotIdentified), and the transport specific
///   `Serialport` / `Usb` errors,
/// - communication: [`Timeout`](InstrumentError::Timeout),
///   [`TimeoutQuery`](InstrumentError::TimeoutQuery),
///   [`NotAcknowledged`](InstrumentError::NotAcknowledged), [`Io`](InstrumentError::Io), and
///   [`Closed`](InstrumentError::Closed),
/// - parsing: [`ResponseParseError`](InstrumentError::ResponseParseError),
/// - invalid arguments: [`IntValueOutOfRange`](InstrumentError::IntValueOutOfRange),
///   [`FloatValueOutOfRange`](InstrumentError::FloatValueOutOfRange),
///   [`ChannelIndexOutOfRange`](InstrumentError::ChannelIndexOutOfRange), and
///   [`InvalidArgument`](InstrumentError::InvalidArgument).
///
/// Argument errors are always detected before anything is written to the instrument.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InstrumentError {
    /// The channel requested is out of range. The error contains the channel requested and the
    /// number of channels of the instrument.
    #[error(
        "Channel with index {idx} is out of range. Number of channels available: {nof_channels}"
    )]
    ChannelIndexOutOfRange {
        /// Index of the channel that is out of range.
        idx: usize,
        /// Total number of channels.
        nof_channels: usize,
    },
    /// The driver was closed and cannot talk to the instrument anymore.
    #[error("The connection to the instrument was closed.")]
    Closed,
    /// No device matching the given address could be found.
    #[error("No matching device found: {0}")]
    DeviceNotFound(String),
    /// A given float value is out of the specified range.
    #[error("Float value {value} is out of range. Allowed range is [{min}, {max}]")]
    FloatValueOutOfRange {
        /// The value that is out of range.
        value: f64,
        /// The minimum value that is allowed.
        min: f64,
        /// The maximum value that is allowed.
        max: f64,
    },
    /// A given integer value is out of the specified range.
    #[error("Integer value {value} is out of range. Allowed range is [{min}, {max}]")]
    IntValueOutOfRange {
        /// The value that is out of range.
        value: i64,
        /// The minimum value that is allowed.
        min: i64,
        /// The maximum value that is allowed.
        max: i64,
    },
    /// Error when an invalid argument is passed to a function. The message is intended for the
    /// user.
    #[error("{0}")]
    InvalidArgument(String),
    /// Error when reading from/writing to an interface. See [`std::io::Error`] for more details.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The instrument did not acknowledge the command that was sent. The response received is
    /// returned in the error as a String.
    #[error("Instrument did not acknowledge the command sent, but responded with: {0}")]
    NotAcknowledged(String),
    /// The device answered the identification query, but not as the expected instrument, or it
    /// did not answer at all.
    #[error("Device did not identify as {expected}. Response was: {response}")]
    NotIdentified {
        /// The identification the driver expected.
        expected: String,
        /// What the device responded, or why it did not.
        response: String,
    },
    /// Instrument response could not be parsed because it was unexpected by the driver. This error
    /// contains the response that was received from the instrument.
    #[error("Response from instrument could not be parsed. Response was: {0}")]
    ResponseParseError(String),
    #[cfg(feature = "serial")]
    /// Serial port errors can occur when opening a serial interface. See the [`serialport::Error`]
    /// documentation for more information.
    #[error(transparent)]
    Serialport(#[from] serialport::Error),
    /// Timeout occurred while waiting for a response from the instrument. The error contains the
    /// timeout that was exceeded.
    #[error(
        "Timeout occured while waiting for a response from the instrument. Timeout was set to {0:?}."
    )]
    Timeout(Duration),
    /// Timeout occurred while waiting for a response to a query. The error contains the query
    /// that was sent and the timeout that was exceeded.
    #[error(
        "Timeout occured while waiting for a response to query: {query}. Timeout was set to {timeout:?}."
    )]
    TimeoutQuery {
        /// The query that timed out.
        query: String,
        /// The timeout that was set.
        timeout: Duration,
    },
    #[cfg(feature = "usb")]
    /// USB errors while opening or talking to a device. See the [`rusb::Error`] documentation for
    /// more information.
    #[error(transparent)]
    Usb(#[from] rusb::Error),
}
