//! A rust driver for the SRS SIM922 diode temperature monitor.
//!
//! The SIM922 is a module in a SIM900 mainframe. The host talks to the mainframe, which passes
//! traffic through to the module in a given slot after a `CONN` command, until it receives the
//! escape string. The driver opens this link on creation and hands it back to the mainframe on
//! [`Sim922::close`].
//!
//! The SIM922 reads up to four silicon diodes. Temperatures are calculated by the module from
//! its built-in or user curve; with a [`DiodeCalibration`] they can also be calculated on the
//! host from the diode voltage.
//!
//! # Example
//!
//! ```no_run
//! use srs_sim922::{SerialInterfaceSim922, Sim922};
//!
//! let serial_inst =
//!     SerialInterfaceSim922::simple("/dev/ttyUSB0").expect("Failed to open serial port");
//!
//! // The SIM922 sits in slot 4 of the mainframe.
//! let mut inst = Sim922::try_new(serial_inst).unwrap();
//!
//! let mut ch1 = inst.get_channel(1).unwrap();
//! println!("Temperature: {:?}", ch1.get_temperature());
//! println!("Diode voltage: {:?}", ch1.get_voltage());
//!
//! inst.close().unwrap();
//! ```

#![warn(missing_docs)]

mod calibration;
mod interface;

pub use calibration::{DiodeCalibration, DiodeModel};
pub use interface::{DEFAULT_BAUD_RATE, SerialInterfaceSim922};

use std::{
    fmt::Display,
    sync::{Arc, Mutex},
};

use instrumentrs::{InstrumentError, InstrumentInterface};
use measurements::{Temperature, Voltage};

/// Slot of the SIM922 in the mainframe if not specified otherwise.
pub const DEFAULT_MODULE: u8 = 4;

/// Escape string that ends the pass-through link if not specified otherwise.
pub const DEFAULT_ESCAPE: &str = "xxyyzz";

/// Number of diode channels.
pub const NUM_CHANNELS: usize = 4;

/// Mainframe slots that can hold a module.
const MODULES: std::ops::RangeInclusive<u8> = 1..=8;

/// Substring of the identification reply of a SIM922.
const IDENTIFICATION: &str = "SIM922";

/// Curve that a channel uses to convert voltage into temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveType {
    /// Built-in standard diode curve.
    Standard,
    /// User curve loaded into the module.
    User,
}

impl CurveType {
    fn from_cmd_str(resp: &str) -> Result<Self, InstrumentError> {
        match resp.trim() {
            "0" | "STAN" => Ok(CurveType::Standard),
            "1" | "USER" => Ok(CurveType::User),
            _ => Err(InstrumentError::ResponseParseError(resp.to_string())),
        }
    }
}

impl Display for CurveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CurveType::Standard => write!(f, "0"),
            CurveType::User => write!(f, "1"),
        }
    }
}

/// State of the diode excitation current of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Excitation {
    /// Excitation current off.
    Off,
    /// Excitation current on.
    On,
}

impl Excitation {
    fn from_cmd_str(resp: &str) -> Result<Self, InstrumentError> {
        match resp.trim() {
            "0" | "OFF" => Ok(Excitation::Off),
            "1" | "ON" => Ok(Excitation::On),
            _ => Err(InstrumentError::ResponseParseError(resp.to_string())),
        }
    }
}

impl Display for Excitation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Excitation::Off => write!(f, "0"),
            Excitation::On => write!(f, "1"),
        }
    }
}

/// A rust driver for the Sim922.
///
/// See the top-level documentation for an example on how to use this driver.
pub struct Sim922<T: InstrumentInterface> {
    interface: Arc<Mutex<Option<T>>>,
    escape: String,
}

impl<T: InstrumentInterface> Sim922<T> {
    /// Create a new Sim922 instance for the module in the default slot 4 of the mainframe.
    ///
    /// # Arguments
    /// * `interface` - An instrument interface that implements the [`InstrumentInterface`] trait.
    pub fn try_new(interface: T) -> Result<Self, InstrumentError> {
        Self::try_new_with(interface, DEFAULT_MODULE, DEFAULT_ESCAPE)
    }

    /// Create a new Sim922 instance for the module in a given slot of the mainframe.
    ///
    /// The pass-through link to the module is opened and the module is asked to identify itself.
    /// If it does not answer as a SIM922, the link is closed again and
    /// [`InstrumentError::NotIdentified`] is returned.
    ///
    /// # Arguments
    /// * `interface` - An instrument interface that implements the [`InstrumentInterface`] trait.
    /// * `module` - Slot of the SIM922 in the mainframe, 1 to 8.
    /// * `escape` - String that ends the pass-through link. Must not be empty or contain quotes.
    pub fn try_new_with(interface: T, module: u8, escape: &str) -> Result<Self, InstrumentError> {
        if !MODULES.contains(&module) {
            return Err(InstrumentError::IntValueOutOfRange {
                value: module.into(),
                min: (*MODULES.start()).into(),
                max: (*MODULES.end()).into(),
            });
        }
        if escape.is_empty() || escape.contains('"') || escape.contains(char::is_whitespace) {
            return Err(InstrumentError::InvalidArgument(format!(
                "Invalid escape string {escape:?}"
            )));
        }

        let mut intf = interface;
        intf.set_terminator("\r\n");
        intf.sendcmd(&format!("CONN {module},\"{escape}\""))?;

        let mut instrument = Sim922 {
            interface: Arc::new(Mutex::new(Some(intf))),
            escape: escape.to_string(),
        };

        let id = instrument.get_name();
        match id {
            Ok(id) if id.contains(IDENTIFICATION) => {
                log::info!("Connected to SIM922 in slot {module}: {id}");
                Ok(instrument)
            }
            other => {
                if let Err(err) = instrument.close() {
                    log::warn!("Failed to release the link to slot {module}: {err}");
                }
                Err(InstrumentError::NotIdentified {
                    expected: IDENTIFICATION.to_string(),
                    response: match other {
                        Ok(id) => id,
                        Err(err) => err.to_string(),
                    },
                })
            }
        }
    }

    /// Get a new channel with a given number.
    ///
    /// Channels are numbered 1 to 4, as on the front panel.
    pub fn get_channel(&mut self, num: usize) -> Result<Channel<T>, InstrumentError> {
        if !(1..=NUM_CHANNELS).contains(&num) {
            return Err(InstrumentError::ChannelIndexOutOfRange {
                idx: num,
                nof_channels: NUM_CHANNELS,
            });
        }
        Ok(Channel::new(num, Arc::clone(&self.interface)))
    }

    /// Read the temperature of a channel.
    ///
    /// Shortcut for getting the channel and calling [`Channel::get_temperature`].
    pub fn read_channel(&mut self, num: usize) -> Result<Temperature, InstrumentError> {
        self.get_channel(num)?.get_temperature()
    }

    /// Read the temperatures of all four channels at once.
    pub fn get_all_temperatures(&mut self) -> Result<[Temperature; NUM_CHANNELS], InstrumentError> {
        let resp = query(&self.interface, "TVAL? 0")?;
        let parts = resp.split(',').collect::<Vec<&str>>();
        if parts.len() != NUM_CHANNELS {
            return Err(InstrumentError::ResponseParseError(resp));
        }
        let mut temps = [Temperature::from_kelvin(0.0); NUM_CHANNELS];
        for (temp, part) in temps.iter_mut().zip(parts) {
            *temp = Temperature::from_kelvin(parse_float(part, &resp)?);
        }
        Ok(temps)
    }

    /// Query the identification string of the module.
    ///
    /// Returns a comma-separated string of manufacturer, model, serial number, and firmware
    /// version.
    pub fn get_name(&mut self) -> Result<String, InstrumentError> {
        query(&self.interface, "*IDN?")
    }

    /// Close the pass-through link to the module.
    ///
    /// The escape string is sent once, which hands the serial link back to the mainframe, and the
    /// interface is released. Every later call on this driver, its clones, or its channels
    /// returns [`InstrumentError::Closed`]. Closing more than once has no effect.
    pub fn close(&mut self) -> Result<(), InstrumentError> {
        let intf = self
            .interface
            .lock()
            .expect("Mutex should not be poisoned")
            .take();
        match intf {
            Some(mut intf) => {
                intf.sendcmd(&self.escape)?;
                log::info!("Closed link to SIM922");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl<T: InstrumentInterface> Clone for Sim922<T> {
    fn clone(&self) -> Self {
        Self {
            interface: self.interface.clone(),
            escape: self.escape.clone(),
        }
    }
}

/// Channel structure representing a single diode input of the Sim922.
///
/// **This structure can only be created through the [`Sim922`] struct.**
pub struct Channel<T: InstrumentInterface> {
    num: usize,
    interface: Arc<Mutex<Option<T>>>,
}

impl<T: InstrumentInterface> Channel<T> {
    fn new(num: usize, interface: Arc<Mutex<Option<T>>>) -> Self {
        Channel { num, interface }
    }

    /// Number of this channel, 1 to 4.
    pub fn number(&self) -> usize {
        self.num
    }

    /// Get the temperature as calculated by the module from the curve of this channel.
    pub fn get_temperature(&mut self) -> Result<Temperature, InstrumentError> {
        let resp = self.query("TVAL?")?;
        Ok(Temperature::from_kelvin(parse_float(&resp, &resp)?))
    }

    /// Get the diode voltage.
    pub fn get_voltage(&mut self) -> Result<Voltage, InstrumentError> {
        let resp = self.query("VOLT?")?;
        Ok(Voltage::from_volts(parse_float(&resp, &resp)?))
    }

    /// Get the temperature from the diode voltage with a calibration curve on the host.
    pub fn get_calibrated_temperature(
        &mut self,
        calibration: &DiodeCalibration,
    ) -> Result<Temperature, InstrumentError> {
        let voltage = self.get_voltage()?;
        calibration.temperature(voltage)
    }

    /// Get the curve type that the module uses for this channel.
    pub fn get_curve_type(&mut self) -> Result<CurveType, InstrumentError> {
        let resp = self.query("CURV?")?;
        CurveType::from_cmd_str(&resp)
    }

    /// Set the curve type that the module uses for this channel.
    pub fn set_curve_type(&mut self, curve: CurveType) -> Result<(), InstrumentError> {
        self.sendcmd(&format!("CURV {},{curve}", self.num))
    }

    /// Get the state of the excitation current.
    pub fn get_excitation(&mut self) -> Result<Excitation, InstrumentError> {
        let resp = self.query("EXON?")?;
        Excitation::from_cmd_str(&resp)
    }

    /// Turn the excitation current on or off.
    pub fn set_excitation(&mut self, state: Excitation) -> Result<(), InstrumentError> {
        self.sendcmd(&format!("EXON {},{state}", self.num))
    }

    /// Send a full command.
    fn sendcmd(&mut self, cmd: &str) -> Result<(), InstrumentError> {
        let mut guard = self.interface.lock().expect("Mutex should not be poisoned");
        let intf = guard.as_mut().ok_or(InstrumentError::Closed)?;
        intf.sendcmd(cmd)
    }

    /// Query with the channel number appended to the command.
    fn query(&mut self, cmd: &str) -> Result<String, InstrumentError> {
        query(&self.interface, &format!("{cmd} {}", self.num))
    }
}

impl<T: InstrumentInterface> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            num: self.num,
            interface: self.interface.clone(),
        }
    }
}

/// Query through a shared interface, unless it has been closed.
fn query<T: InstrumentInterface>(
    interface: &Arc<Mutex<Option<T>>>,
    cmd: &str,
) -> Result<String, InstrumentError> {
    let mut guard = interface.lock().expect("Mutex should not be poisoned");
    let intf = guard.as_mut().ok_or(InstrumentError::Closed)?;
    intf.query(cmd)
}

/// Parse a float from a part of a response.
fn parse_float(val: &str, resp: &str) -> Result<f64, InstrumentError> {
    val.trim()
        .parse::<f64>()
        .map_err(|_| InstrumentError::ResponseParseError(resp.to_string()))
}
