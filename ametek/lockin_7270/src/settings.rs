//! Integer coded amplifier settings and their lookup tables.

use std::{fmt::Display, ops::RangeInclusive, time::Duration};

use instrumentrs::InstrumentError;

/// Full-scale sensitivity in volts for the voltage input modes, indexed by `SEN` code - 1.
const SENSITIVITY_VOLTS: [f64; 27] = [
    2e-9, 5e-9, 10e-9, 20e-9, 50e-9, 100e-9, 200e-9, 500e-9, 1e-6, 2e-6, 5e-6, 10e-6, 20e-6,
    50e-6, 100e-6, 200e-6, 500e-6, 1e-3, 2e-3, 5e-3, 10e-3, 20e-3, 50e-3, 100e-3, 200e-3, 500e-3,
    1.0,
];

/// Time constants in microseconds, indexed by `TC` code.
const TIME_CONSTANT_MICROS: [u64; 31] = [
    10,
    20,
    50,
    100,
    200,
    500,
    1_000,
    2_000,
    5_000,
    10_000,
    20_000,
    50_000,
    100_000,
    200_000,
    500_000,
    1_000_000,
    2_000_000,
    5_000_000,
    10_000_000,
    20_000_000,
    50_000_000,
    100_000_000,
    200_000_000,
    500_000_000,
    1_000_000_000,
    2_000_000_000,
    5_000_000_000,
    10_000_000_000,
    20_000_000_000,
    50_000_000_000,
    100_000_000_000,
];

/// Settings of the 7270 that take an integer code.
///
/// The legal codes of every setting form a closed range, see [`Setting::legal_values`]. Codes
/// are checked against this range before anything is sent to the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Setting {
    /// Full-scale sensitivity (`SEN`), see [`sensitivity_volts`] for the code table.
    Sensitivity,
    /// Output filter time constant (`TC`), see [`time_constant`] for the code table.
    TimeConstant,
    /// Reference mode (`REFMODE`): 0 single, 1 dual harmonic, 2 dual reference.
    ReferenceMode,
    /// Voltage input mode (`VMODE`): 0 grounded, 1 A, 2 -B, 3 A-B differential.
    InputMode,
    /// Reference channel source (`IE`): 0 internal, 1 external rear TTL, 2 external front.
    ReferenceSource,
    /// Input coupling (`DCCOUPLE`): 0 AC, 1 DC.
    Coupling,
    /// Input connector shell (`FLOAT`): 0 ground, 1 float.
    FloatingGround,
    /// Input device (`FET`): 0 bipolar, 1 FET.
    InputDevice,
}

impl Setting {
    /// All settings, in the order they are listed in the manual.
    pub const ALL: [Setting; 8] = [
        Setting::Sensitivity,
        Setting::TimeConstant,
        Setting::ReferenceMode,
        Setting::InputMode,
        Setting::ReferenceSource,
        Setting::Coupling,
        Setting::FloatingGround,
        Setting::InputDevice,
    ];

    /// The command mnemonic of this setting.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Setting::Sensitivity => "SEN",
            Setting::TimeConstant => "TC",
            Setting::ReferenceMode => "REFMODE",
            Setting::InputMode => "VMODE",
            Setting::ReferenceSource => "IE",
            Setting::Coupling => "DCCOUPLE",
            Setting::FloatingGround => "FLOAT",
            Setting::InputDevice => "FET",
        }
    }

    /// The codes that the instrument accepts for this setting.
    pub fn legal_values(&self) -> RangeInclusive<u8> {
        match self {
            Setting::Sensitivity => 1..=27,
            Setting::TimeConstant => 0..=30,
            Setting::ReferenceMode => 0..=2,
            Setting::InputMode => 0..=3,
            Setting::ReferenceSource => 0..=2,
            Setting::Coupling | Setting::FloatingGround | Setting::InputDevice => 0..=1,
        }
    }

    /// Check a code against the legal values of this setting.
    pub(crate) fn validate(&self, value: u8) -> Result<(), InstrumentError> {
        let legal = self.legal_values();
        if legal.contains(&value) {
            Ok(())
        } else {
            Err(InstrumentError::IntValueOutOfRange {
                value: value.into(),
                min: (*legal.start()).into(),
                max: (*legal.end()).into(),
            })
        }
    }
}

impl Display for Setting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Setting::Sensitivity => "Sensitivity",
            Setting::TimeConstant => "Time constant",
            Setting::ReferenceMode => "Reference mode",
            Setting::InputMode => "Input mode",
            Setting::ReferenceSource => "Reference source",
            Setting::Coupling => "Coupling",
            Setting::FloatingGround => "Floating ground",
            Setting::InputDevice => "Input device",
        };
        write!(f, "{name}")
    }
}

/// The setup that is applied by [`crate::LockIn7270::setup_default`].
///
/// Single internal reference, A-B differential input, AC coupled with floating ground, 100 ms
/// time constant, bipolar input device.
pub const DEFAULT_SETUP: [(Setting, u8); 7] = [
    (Setting::ReferenceMode, 0),
    (Setting::InputMode, 3),
    (Setting::ReferenceSource, 0),
    (Setting::Coupling, 0),
    (Setting::FloatingGround, 1),
    (Setting::TimeConstant, 12),
    (Setting::InputDevice, 0),
];

/// Full-scale sensitivity in volts for a `SEN` code.
///
/// Returns `None` for codes outside of `1..=27`.
pub fn sensitivity_volts(code: u8) -> Option<f64> {
    let idx = usize::from(code).checked_sub(1)?;
    SENSITIVITY_VOLTS.get(idx).copied()
}

/// Time constant for a `TC` code.
///
/// Returns `None` for codes outside of `0..=30`.
pub fn time_constant(code: u8) -> Option<Duration> {
    TIME_CONSTANT_MICROS
        .get(usize::from(code))
        .map(|micros| Duration::from_micros(*micros))
}
