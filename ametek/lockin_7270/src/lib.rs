//! A rust driver for the AMETEK (Signal Recovery) 7270 DSP lock-in amplifier.
//!
//! The driver reads the front panel outputs (X, Y, magnitude, phase), sets and queries the
//! integer coded amplifier settings, controls the internal oscillator, and gives access to the
//! curve buffer for fast sampling.
//!
//! Commands are written without terminator. Every reply, also the one to a command that sets a
//! value, consists of the ASCII payload, a NUL byte, the status byte, and the overload byte. The
//! driver checks the status byte of every reply and returns
//! [`InstrumentError::NotAcknowledged`] if the instrument flagged the command as invalid or its
//! parameter as out of range.
//!
//! # Example
//!
//! ```no_run
//! use ametek_7270::{LockIn7270, UsbInterfaceLockIn};
//!
//! // Open the first 7270 that is connected via USB.
//! let interface = UsbInterfaceLockIn::simple().expect("No 7270 connected");
//! let mut lockin = LockIn7270::try_new(interface).unwrap();
//!
//! // Apply the default setup and read the magnitude.
//! lockin.setup_default().unwrap();
//! println!("Magnitude: {}", lockin.get_magnitude().unwrap());
//! ```

#![warn(missing_docs)]

mod curve;
mod interface;
mod settings;

pub use curve::{
    Curve, CurveAcquisitionState, CurveBufferConfig, CurveMode, CurveStatus, MAX_CURVE_LENGTH,
};
pub use interface::{PRODUCT_ID, UsbInterfaceLockIn, VENDOR_ID};
pub use settings::{DEFAULT_SETUP, Setting, sensitivity_volts, time_constant};

use std::{
    fmt::Display,
    sync::{Arc, Mutex},
    time::Duration,
};

use instrumentrs::{InstrumentError, InstrumentInterface};
use measurements::{Angle, Frequency, Voltage};

/// Reply to the `ID` command.
const IDENTIFICATION: &str = "7270";

/// Maximum frequency of the internal oscillator in Hz.
const MAX_OSCILLATOR_FREQUENCY: f64 = 250e3;

/// Status byte: invalid command.
const STATUS_INVALID_COMMAND: u8 = 1 << 1;
/// Status byte: command parameter out of range.
const STATUS_PARAMETER_ERROR: u8 = 1 << 2;
/// Status byte: output overload.
const STATUS_OVERLOAD: u8 = 1 << 4;

/// Front panel outputs that can be read as a floating point value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measurand {
    /// In-phase component in volts.
    X,
    /// Quadrature component in volts.
    Y,
    /// Magnitude in volts.
    Magnitude,
    /// Phase in degrees.
    Phase,
}

impl Measurand {
    /// Floating point query command of this output.
    fn command(&self) -> &'static str {
        match self {
            Measurand::X => "X.",
            Measurand::Y => "Y.",
            Measurand::Magnitude => "MAG.",
            Measurand::Phase => "PHA.",
        }
    }
}

impl Display for Measurand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Measurand::X => write!(f, "X"),
            Measurand::Y => write!(f, "Y"),
            Measurand::Magnitude => write!(f, "Magnitude"),
            Measurand::Phase => write!(f, "Phase"),
        }
    }
}

/// A rust driver for the LockIn7270.
///
/// The interface is owned by the driver and released when the driver (and all its clones) are
/// dropped, or when [`LockIn7270::close`] is called. See the top-level documentation for an
/// example.
pub struct LockIn7270<T: InstrumentInterface> {
    interface: Arc<Mutex<Option<T>>>,
}

impl<T: InstrumentInterface> LockIn7270<T> {
    /// Create a new LockIn7270 instance with the given instrument interface.
    ///
    /// The instrument is asked to identify itself. If it does not answer, or does not answer as a
    /// 7270, [`InstrumentError::NotIdentified`] is returned.
    ///
    /// # Arguments
    /// * `interface` - An instrument interface that implements the [`InstrumentInterface`] trait.
    pub fn try_new(interface: T) -> Result<Self, InstrumentError> {
        let mut intf = interface;
        intf.set_terminator("\0");
        let mut instrument = LockIn7270 {
            interface: Arc::new(Mutex::new(Some(intf))),
        };

        match instrument.get_name() {
            Ok(id) if id == IDENTIFICATION => {
                log::info!("Connected to 7270 lock-in amplifier");
                Ok(instrument)
            }
            Ok(id) => Err(InstrumentError::NotIdentified {
                expected: IDENTIFICATION.to_string(),
                response: id,
            }),
            Err(err) => Err(InstrumentError::NotIdentified {
                expected: IDENTIFICATION.to_string(),
                response: err.to_string(),
            }),
        }
    }

    /// Query the model number of the instrument, `"7270"`.
    pub fn get_name(&mut self) -> Result<String, InstrumentError> {
        self.query("ID")
    }

    /// Query the firmware version of the instrument.
    pub fn get_firmware_version(&mut self) -> Result<String, InstrumentError> {
        self.query("VER")
    }

    /// Set an integer coded setting.
    ///
    /// The value is checked against [`Setting::legal_values`] before anything is sent. Out of
    /// range values return an [`InstrumentError::IntValueOutOfRange`].
    ///
    /// # Arguments
    /// * `setting` - The setting to change.
    /// * `value` - The new code of the setting.
    pub fn set_setting(&mut self, setting: Setting, value: u8) -> Result<(), InstrumentError> {
        setting.validate(value)?;
        self.sendcmd(&format!("{} {value}", setting.mnemonic()))
    }

    /// Query the current code of an integer coded setting.
    pub fn get_setting(&mut self, setting: Setting) -> Result<u8, InstrumentError> {
        let resp = self.query(setting.mnemonic())?;
        resp.parse().map_err(|_| InstrumentError::ResponseParseError(resp))
    }

    /// Apply a list of settings in order and finish with an automatic sensitivity search.
    ///
    /// All values are validated before the first command is sent.
    pub fn setup(&mut self, settings: &[(Setting, u8)]) -> Result<(), InstrumentError> {
        for (setting, value) in settings {
            setting.validate(*value)?;
        }
        for (setting, value) in settings {
            self.set_setting(*setting, *value)?;
        }
        self.auto_sensitivity()
    }

    /// Apply the [`DEFAULT_SETUP`], followed by an automatic sensitivity search.
    pub fn setup_default(&mut self) -> Result<(), InstrumentError> {
        self.setup(&DEFAULT_SETUP)
    }

    /// Run an automatic sensitivity search (`AS`).
    pub fn auto_sensitivity(&mut self) -> Result<(), InstrumentError> {
        self.sendcmd("AS")
    }

    /// Run an automatic phase adjustment (`AQN`), such that Y becomes zero.
    pub fn auto_phase(&mut self) -> Result<(), InstrumentError> {
        self.sendcmd("AQN")
    }

    /// Get the full-scale sensitivity.
    pub fn get_sensitivity(&mut self) -> Result<Voltage, InstrumentError> {
        let code = self.get_setting(Setting::Sensitivity)?;
        sensitivity_volts(code)
            .map(Voltage::from_volts)
            .ok_or_else(|| InstrumentError::ResponseParseError(code.to_string()))
    }

    /// Get the output filter time constant.
    pub fn get_time_constant(&mut self) -> Result<Duration, InstrumentError> {
        let code = self.get_setting(Setting::TimeConstant)?;
        time_constant(code).ok_or_else(|| InstrumentError::ResponseParseError(code.to_string()))
    }

    /// Get the frequency of the internal oscillator.
    pub fn get_oscillator_frequency(&mut self) -> Result<Frequency, InstrumentError> {
        let hz = self.query_float("OF.")?;
        Ok(Frequency::from_hertz(hz))
    }

    /// Set the frequency of the internal oscillator.
    ///
    /// # Arguments
    /// * `frequency` - New frequency, between 0 Hz and 250 kHz.
    pub fn set_oscillator_frequency(
        &mut self,
        frequency: Frequency,
    ) -> Result<(), InstrumentError> {
        let hz = frequency.as_hertz();
        if !(0.0..=MAX_OSCILLATOR_FREQUENCY).contains(&hz) {
            return Err(InstrumentError::FloatValueOutOfRange {
                value: hz,
                min: 0.0,
                max: MAX_OSCILLATOR_FREQUENCY,
            });
        }
        self.sendcmd(&format!("OF. {hz}"))
    }

    /// Get the frequency of the reference the amplifier is locked to.
    pub fn get_reference_frequency(&mut self) -> Result<Frequency, InstrumentError> {
        let hz = self.query_float("FRQ.")?;
        Ok(Frequency::from_hertz(hz))
    }

    /// Read a front panel output as a floating point value in volts, or degrees for the phase.
    pub fn read_value(&mut self, measurand: Measurand) -> Result<f64, InstrumentError> {
        self.query_float(measurand.command())
    }

    /// Read the in-phase component X.
    pub fn get_x(&mut self) -> Result<Voltage, InstrumentError> {
        Ok(Voltage::from_volts(self.read_value(Measurand::X)?))
    }

    /// Read the quadrature component Y.
    pub fn get_y(&mut self) -> Result<Voltage, InstrumentError> {
        Ok(Voltage::from_volts(self.read_value(Measurand::Y)?))
    }

    /// Read X and Y from the same sample.
    pub fn get_xy(&mut self) -> Result<(Voltage, Voltage), InstrumentError> {
        let resp = self.query("XY.")?;
        let parts = split_check_resp(&resp, 2)?;
        let x = parse_float(parts[0], &resp)?;
        let y = parse_float(parts[1], &resp)?;
        Ok((Voltage::from_volts(x), Voltage::from_volts(y)))
    }

    /// Read the magnitude.
    pub fn get_magnitude(&mut self) -> Result<Voltage, InstrumentError> {
        Ok(Voltage::from_volts(self.read_value(Measurand::Magnitude)?))
    }

    /// Read the phase.
    pub fn get_phase(&mut self) -> Result<Angle, InstrumentError> {
        Ok(Angle::from_degrees(self.read_value(Measurand::Phase)?))
    }

    /// Clear the curve buffer and configure it for a new acquisition.
    ///
    /// The configuration is validated before anything is sent. Start the acquisition with
    /// [`LockIn7270::start_curve_acquisition`].
    pub fn setup_curve_buffer(
        &mut self,
        config: &CurveBufferConfig,
    ) -> Result<(), InstrumentError> {
        for cmd in config.to_commands()? {
            self.sendcmd(&cmd)?;
        }
        Ok(())
    }

    /// Start filling the curve buffer (`TD`).
    pub fn start_curve_acquisition(&mut self) -> Result<(), InstrumentError> {
        self.sendcmd("TD")
    }

    /// Stop filling the curve buffer (`HC`).
    pub fn halt_curve_acquisition(&mut self) -> Result<(), InstrumentError> {
        self.sendcmd("HC")
    }

    /// Get the state of the curve acquisition and the number of stored points.
    pub fn get_curve_status(&mut self) -> Result<CurveStatus, InstrumentError> {
        let resp = self.query("M")?;
        CurveStatus::from_cmd_str(&resp)
    }

    /// Read all stored points of one curve as raw values.
    ///
    /// The number of stored points is queried first, then the curve is dumped as a binary block.
    /// Use [`Curve::scale`] to convert the raw values into physical units.
    pub fn read_curve(&mut self, curve: Curve) -> Result<Vec<i16>, InstrumentError> {
        let points = self.get_curve_status()?.points;
        let block_len = points
            .checked_mul(2)
            .ok_or_else(|| InstrumentError::ResponseParseError(format!("{points} points")))?;
        let cmd = format!("DCB {}", curve.bit());

        let mut guard = self.interface.lock().expect("Mutex should not be poisoned");
        let intf = guard.as_mut().ok_or(InstrumentError::Closed)?;
        log::debug!("7270 <- {cmd}, expecting {points} points");
        intf.clear_input()?;
        intf.write(&cmd)?;
        let mut block = vec![0u8; block_len];
        intf.read_exact(&mut block).map_err(|err| timeout_to_query(err, &cmd))?;
        let trailer = read_reply(intf, &cmd)?;
        if !trailer.is_empty() {
            return Err(InstrumentError::ResponseParseError(trailer));
        }
        Ok(curve::decode_block(&block))
    }

    /// Close the connection to the instrument.
    ///
    /// This releases the interface. Every later call on this driver or any of its clones returns
    /// [`InstrumentError::Closed`]. Closing more than once has no effect.
    pub fn close(&mut self) {
        let mut guard = self.interface.lock().expect("Mutex should not be poisoned");
        if guard.take().is_some() {
            log::info!("Closed connection to 7270 lock-in amplifier");
        }
    }

    /// Send a command that does not return a payload.
    fn sendcmd(&mut self, cmd: &str) -> Result<(), InstrumentError> {
        let resp = self.query(cmd)?;
        if !resp.is_empty() {
            log::warn!("Unexpected reply to {cmd}: {resp}");
        }
        Ok(())
    }

    /// Send a command and return the payload of the reply.
    fn query(&mut self, cmd: &str) -> Result<String, InstrumentError> {
        let mut guard = self.interface.lock().expect("Mutex should not be poisoned");
        let intf = guard.as_mut().ok_or(InstrumentError::Closed)?;
        log::debug!("7270 <- {cmd}");
        intf.clear_input()?;
        intf.write(cmd)?;
        read_reply(intf, cmd)
    }

    /// Query a floating point value.
    fn query_float(&mut self, cmd: &str) -> Result<f64, InstrumentError> {
        let resp = self.query(cmd)?;
        parse_float(&resp, &resp)
    }
}

impl<T: InstrumentInterface> Clone for LockIn7270<T> {
    fn clone(&self) -> Self {
        Self {
            interface: self.interface.clone(),
        }
    }
}

/// Read the payload up to the NUL byte, then the status and the overload byte.
fn read_reply<T: InstrumentInterface>(intf: &mut T, cmd: &str) -> Result<String, InstrumentError> {
    let resp = intf
        .read_until_terminator()
        .map_err(|err| timeout_to_query(err, cmd))?;
    let mut status = [0u8; 2];
    intf.read_exact(&mut status).map_err(|err| timeout_to_query(err, cmd))?;
    log::debug!("7270 -> {resp:?}, status {:#04x}, overload {:#04x}", status[0], status[1]);

    if status[0] & (STATUS_INVALID_COMMAND | STATUS_PARAMETER_ERROR) != 0 {
        return Err(InstrumentError::NotAcknowledged(format!(
            "{cmd} (status byte {:#04x})",
            status[0]
        )));
    }
    if status[0] & STATUS_OVERLOAD != 0 {
        log::warn!("7270 output overload (overload byte {:#04x})", status[1]);
    }
    Ok(resp)
}

/// Attach the command to a timeout.
fn timeout_to_query(err: InstrumentError, cmd: &str) -> InstrumentError {
    match err {
        InstrumentError::Timeout(timeout) => InstrumentError::TimeoutQuery {
            query: cmd.to_string(),
            timeout,
        },
        err => err,
    }
}

/// Parse a float from a part of a response.
fn parse_float(val: &str, resp: &str) -> Result<f64, InstrumentError> {
    val.trim()
        .parse::<f64>()
        .map_err(|_| InstrumentError::ResponseParseError(resp.to_string()))
}

/// Split a string slice into its parts by commas, check if of correct length, and return the parts
/// as a vector.
fn split_check_resp(resp: &str, exp_len: usize) -> Result<Vec<&str>, InstrumentError> {
    let parts = resp.split(',').collect::<Vec<&str>>();
    if parts.len() != exp_len {
        return Err(InstrumentError::ResponseParseError(resp.to_string()));
    }
    Ok(parts)
}
