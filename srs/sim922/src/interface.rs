//! Provide a serial interface for the SIM900 mainframe that hosts the SIM922.

use std::time::Duration;

use instrumentrs::{Instrument, InstrumentError, SerialInterface};
use serialport::SerialPort;

/// Default baud rate of the SIM900 mainframe.
pub const DEFAULT_BAUD_RATE: u32 = 57600;

/// A SerialInterface for the SIM900 mainframe.
///
/// Builds an InstrumentRs SerialInterface with 8 data bits, no parity, one stop bit, and no flow
/// control, as the SIM900 expects it.
#[derive(Debug)]
pub struct SerialInterfaceSim922 {}

impl SerialInterfaceSim922 {
    /// Try to create an Instrument interface at the default baud rate of 57600.
    ///
    /// The timeout is set to 3 seconds.
    ///
    /// Arguments:
    /// * `port` - The name of the serial port, e.g., `"/dev/ttyUSB0"` or `"COM4"`.
    pub fn simple(port: &str) -> Result<Instrument<Box<dyn SerialPort>>, InstrumentError> {
        Self::with_baud_rate(port, DEFAULT_BAUD_RATE)
    }

    /// Try to create an Instrument interface at a given baud rate.
    ///
    /// Arguments:
    /// * `port` - The name of the serial port.
    /// * `baud` - The baud rate the SIM900 is configured for, e.g., 9600.
    pub fn with_baud_rate(
        port: &str,
        baud: u32,
    ) -> Result<Instrument<Box<dyn SerialPort>>, InstrumentError> {
        let timeout = Duration::from_secs(3);
        let port = serialport::new(port, baud)
            .timeout(timeout)
            .parity(serialport::Parity::None)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None);
        SerialInterface::full(port)
    }
}
