//! Curve buffer of the 7270, used for sampling faster than front panel queries allow.
//!
//! The instrument stores up to 100 000 points per curve at a fixed storage interval. Curves are
//! read back as a binary block of big-endian 16 bit integers, one per stored point.

use std::{fmt::Display, time::Duration};

use instrumentrs::InstrumentError;

use crate::settings::sensitivity_volts;

/// Raw value that corresponds to the full-scale sensitivity in X, Y, magnitude, and noise curves.
const FULL_SCALE: f64 = 10_000.0;

/// Raw phase values are stored in hundredths of a degree.
const PHASE_PER_DEGREE: f64 = 100.0;

/// Maximum number of points the curve buffer can hold.
pub const MAX_CURVE_LENGTH: usize = 100_000;

/// Curves that can be stored in the curve buffer.
///
/// The discriminant is the bit of the curve in the `CBD` mask, which is also the argument of the
/// `DCB` dump command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Curve {
    /// X output in %FS.
    X = 0,
    /// Y output in %FS.
    Y = 1,
    /// Magnitude in %FS.
    Magnitude = 2,
    /// Phase in 1/100 degree.
    Phase = 3,
    /// Sensitivity code, see [`crate::settings::sensitivity_volts`].
    Sensitivity = 4,
    /// Noise in %FS.
    Noise = 5,
}

impl Curve {
    /// Bit of this curve in the `CBD` mask.
    pub fn bit(&self) -> u8 {
        *self as u8
    }

    /// Convert raw curve points into physical values.
    ///
    /// X, Y, magnitude, and noise are returned in volts, for which the sensitivity curve that was
    /// recorded alongside is required, point by point. Phase is returned in degrees and
    /// sensitivity in volts full-scale; for both the `sensitivity` argument is ignored.
    ///
    /// # Arguments
    /// * `raw` - Raw points of this curve as returned by [`crate::LockIn7270::read_curve`].
    /// * `sensitivity` - Raw points of the [`Curve::Sensitivity`] curve of the same acquisition.
    pub fn scale(&self, raw: &[i16], sensitivity: &[i16]) -> Result<Vec<f64>, InstrumentError> {
        match self {
            Curve::Phase => Ok(raw
                .iter()
                .map(|val| f64::from(*val) / PHASE_PER_DEGREE)
                .collect()),
            Curve::Sensitivity => raw.iter().map(|code| full_scale_volts(*code)).collect(),
            Curve::X | Curve::Y | Curve::Magnitude | Curve::Noise => {
                if raw.len() != sensitivity.len() {
                    return Err(InstrumentError::InvalidArgument(format!(
                        "{self} curve has {} points, but sensitivity curve has {}",
                        raw.len(),
                        sensitivity.len()
                    )));
                }
                raw.iter()
                    .zip(sensitivity)
                    .map(|(val, code)| -> Result<f64, InstrumentError> {
                        Ok(f64::from(*val) / FULL_SCALE * full_scale_volts(*code)?)
                    })
                    .collect()
            }
        }
    }
}

impl Display for Curve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Curve::X => write!(f, "X"),
            Curve::Y => write!(f, "Y"),
            Curve::Magnitude => write!(f, "Magnitude"),
            Curve::Phase => write!(f, "Phase"),
            Curve::Sensitivity => write!(f, "Sensitivity"),
            Curve::Noise => write!(f, "Noise"),
        }
    }
}

/// Look up a sensitivity code that was stored in a curve.
fn full_scale_volts(code: i16) -> Result<f64, InstrumentError> {
    u8::try_from(code)
        .ok()
        .and_then(sensitivity_volts)
        .ok_or_else(|| InstrumentError::ResponseParseError(format!("sensitivity code {code}")))
}

/// Acquisition mode of the curve buffer (`CMODE`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CurveMode {
    /// Standard mode, any combination of curves.
    #[default]
    Standard = 0,
    /// Fast mode, only X, Y, and magnitude/phase related curves at short storage intervals.
    Fast = 1,
}

/// Configuration of the curve buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurveBufferConfig {
    /// Curves to store.
    pub curves: Vec<Curve>,
    /// Number of points to store per curve, at most [`MAX_CURVE_LENGTH`].
    pub length: usize,
    /// Time between two stored points, with microsecond resolution.
    pub storage_interval: Duration,
    /// Acquisition mode.
    pub mode: CurveMode,
}

impl Default for CurveBufferConfig {
    /// X, Y, phase, sensitivity, and noise, 100 000 points every 10 ms.
    fn default() -> Self {
        CurveBufferConfig {
            curves: vec![
                Curve::X,
                Curve::Y,
                Curve::Phase,
                Curve::Sensitivity,
                Curve::Noise,
            ],
            length: MAX_CURVE_LENGTH,
            storage_interval: Duration::from_millis(10),
            mode: CurveMode::Standard,
        }
    }
}

impl CurveBufferConfig {
    /// The `CBD` mask for the selected curves.
    pub(crate) fn mask(&self) -> u16 {
        self.curves
            .iter()
            .fold(0, |mask, curve| mask | (1 << curve.bit()))
    }

    /// Validate the configuration and return the commands to send, in order.
    pub(crate) fn to_commands(&self) -> Result<Vec<String>, InstrumentError> {
        if self.curves.is_empty() {
            return Err(InstrumentError::InvalidArgument(
                "At least one curve must be selected.".to_string(),
            ));
        }
        if self.length == 0 || self.length > MAX_CURVE_LENGTH {
            return Err(InstrumentError::IntValueOutOfRange {
                value: i64::try_from(self.length).unwrap_or(i64::MAX),
                min: 1,
                max: MAX_CURVE_LENGTH as i64,
            });
        }
        let interval_us = self.storage_interval.as_micros();
        if interval_us == 0 || interval_us > 1_000_000_000 {
            return Err(InstrumentError::IntValueOutOfRange {
                value: i64::try_from(interval_us).unwrap_or(i64::MAX),
                min: 1,
                max: 1_000_000_000,
            });
        }
        Ok(vec![
            "NC".to_string(),
            format!("CMODE {}", self.mode as u8),
            format!("CBD {}", self.mask()),
            format!("LEN {}", self.length),
            format!("STR {interval_us}"),
        ])
    }
}

/// State of the curve acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveAcquisitionState {
    /// No curve activity.
    Idle,
    /// Acquisition in progress.
    Running,
    /// Acquisition halted before the buffer was filled.
    Halted,
}

/// Status of the curve buffer as reported by the `M` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurveStatus {
    /// State of the acquisition.
    pub state: CurveAcquisitionState,
    /// Number of sweeps acquired.
    pub sweeps: u32,
    /// Number of points stored per curve.
    pub points: usize,
}

impl CurveStatus {
    /// Parse the reply to `M`: state, sweeps, status byte, and points, separated by commas.
    pub(crate) fn from_cmd_str(resp: &str) -> Result<Self, InstrumentError> {
        let err = || InstrumentError::ResponseParseError(resp.to_string());
        let parts: Vec<&str> = resp.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(err());
        }
        let state = match parts[0] {
            "0" => CurveAcquisitionState::Idle,
            "1" | "2" => CurveAcquisitionState::Running,
            "5" | "6" => CurveAcquisitionState::Halted,
            _ => return Err(err()),
        };
        let sweeps = parts[1].parse().map_err(|_| err())?;
        let points = parts[3].parse().map_err(|_| err())?;
        if points > MAX_CURVE_LENGTH {
            return Err(err());
        }
        Ok(CurveStatus {
            state,
            sweeps,
            points,
        })
    }
}

/// Decode a binary curve block of big-endian 16 bit integers.
pub(crate) fn decode_block(block: &[u8]) -> Vec<i16> {
    block
        .chunks_exact(2)
        .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    /// The default configuration stores the same curves as `CBD 59`.
    #[rstest]
    fn test_default_mask() {
        assert_eq!(CurveBufferConfig::default().mask(), 59);
    }

    #[rstest]
    fn test_to_commands() {
        let config = CurveBufferConfig {
            curves: vec![Curve::Magnitude, Curve::Sensitivity],
            length: 1000,
            storage_interval: Duration::from_millis(5),
            mode: CurveMode::Fast,
        };
        assert_eq!(
            config.to_commands().unwrap(),
            vec!["NC", "CMODE 1", "CBD 20", "LEN 1000", "STR 5000"]
        );
    }

    #[rstest]
    #[case(CurveBufferConfig { curves: vec![], ..Default::default() })]
    #[case(CurveBufferConfig { length: 0, ..Default::default() })]
    #[case(CurveBufferConfig { length: MAX_CURVE_LENGTH + 1, ..Default::default() })]
    #[case(CurveBufferConfig { storage_interval: Duration::from_nanos(10), ..Default::default() })]
    fn test_to_commands_invalid(#[case] config: CurveBufferConfig) {
        assert!(config.to_commands().is_err());
    }

    #[rstest]
    fn test_decode_block() {
        assert_eq!(
            decode_block(&[0x27, 0x10, 0xd8, 0xf0, 0x00, 0x12]),
            vec![10000, -10000, 18]
        );
    }

    #[rstest]
    #[case("0,0,0,0", CurveAcquisitionState::Idle, 0, 0)]
    #[case("1,3,129,250", CurveAcquisitionState::Running, 3, 250)]
    #[case("5, 1, 1, 42", CurveAcquisitionState::Halted, 1, 42)]
    fn test_curve_status(
        #[case] resp: &str,
        #[case] state: CurveAcquisitionState,
        #[case] sweeps: u32,
        #[case] points: usize,
    ) {
        let status = CurveStatus::from_cmd_str(resp).unwrap();
        assert_eq!(status.state, state);
        assert_eq!(status.sweeps, sweeps);
        assert_eq!(status.points, points);
    }

    #[rstest]
    #[case("1,2,3")]
    #[case("9,0,0,0")]
    #[case("1,x,0,0")]
    #[case("0,1,1,100001")]
    #[case("0,1,1,9223372036854775808")]
    fn test_curve_status_invalid(#[case] resp: &str) {
        assert!(CurveStatus::from_cmd_str(resp).is_err());
    }

    /// Full-scale raw values scale to the sensitivity of the point.
    #[rstest]
    fn test_scale_voltage() {
        // 10 mV (code 21) and 1 V (code 27) full-scale
        let volts = Curve::X.scale(&[10000, -5000], &[21, 27]).unwrap();
        assert!((volts[0] - 10e-3).abs() < 1e-12);
        assert!((volts[1] + 0.5).abs() < 1e-12);
    }

    #[rstest]
    fn test_scale_phase_and_sensitivity() {
        assert_eq!(Curve::Phase.scale(&[18000, -4550], &[]).unwrap(), vec![180.0, -45.5]);
        assert_eq!(Curve::Sensitivity.scale(&[27], &[]).unwrap(), vec![1.0]);
    }

    #[rstest]
    fn test_scale_invalid() {
        assert!(Curve::Y.scale(&[1, 2], &[21]).is_err());
        assert!(Curve::Noise.scale(&[1], &[0]).is_err());
        assert!(Curve::Sensitivity.scale(&[-1], &[]).is_err());
    }
}
