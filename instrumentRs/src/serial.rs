//! This module provides the blocking serial port interface using the [`serialport`] crate.

use std::time::Duration;

use serialport::{ClearBuffer, SerialPort, SerialPortBuilder};

use crate::{Instrument, InstrumentError};

/// Shortcuts to open a serial port as an [`Instrument`].
///
/// The read timeout of the serial port is also used as the timeout for reading a full reply.
#[derive(Debug)]
pub struct SerialInterface {}

impl SerialInterface {
    /// Open a serial port with 8N1 framing and a timeout of three seconds.
    ///
    /// # Arguments
    /// * `port` - The name of the serial port, e.g., `"/dev/ttyUSB0"` or `"COM4"`.
    /// * `baud` - The baud rate.
    pub fn simple(
        port: &str,
        baud: u32,
    ) -> Result<Instrument<Box<dyn SerialPort>>, InstrumentError> {
        let spb = serialport::new(port, baud).timeout(Duration::from_secs(3));
        Self::full(spb)
    }

    /// Open a fully configured serial port.
    ///
    /// The input buffer of the port is cleared before every query.
    ///
    /// # Arguments
    /// * `spb` - A [`SerialPortBuilder`] to configure the serial port. See the
    ///   [`serialport::new`] function for more details.
    pub fn full(
        spb: SerialPortBuilder,
    ) -> Result<Instrument<Box<dyn SerialPort>>, InstrumentError> {
        let port = spb.open()?;
        let timeout = port.timeout();
        log::info!(
            "Opened serial port {} with timeout {timeout:?}",
            port.name().unwrap_or_default()
        );
        Ok(Instrument::new(port, timeout).with_input_clear(clear_input_buffer))
    }
}

/// Discard everything the operating system has received on the port but not handed out yet.
fn clear_input_buffer(port: &mut Box<dyn SerialPort>) -> Result<(), InstrumentError> {
    port.clear(ClearBuffer::Input)?;
    Ok(())
}
