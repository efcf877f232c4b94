//! Calibration curves for silicon thermodiodes.
//!
//! The forward voltage of a silicon diode at constant current drops almost linearly with
//! temperature. Two models are supported, both fitted through two reference points, e.g., room
//! temperature and liquid nitrogen:
//!
//! - linear: `V = c1 - c2 * T`
//! - log-corrected: `V = d1 - d2 * T - 0.405 * ln(T)`
//!
//! Voltages are in millivolts and temperatures in kelvin.

use instrumentrs::InstrumentError;
use measurements::{Temperature, Voltage};

/// Coefficient of the logarithmic term of the log-corrected model in mV.
const LOG_COEFFICIENT: f64 = 0.405;

/// Convergence limit of the temperature inversion in kelvin.
const NEWTON_TOLERANCE: f64 = 1e-9;

const NEWTON_MAX_ITERATIONS: usize = 100;

/// Model of a diode calibration curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiodeModel {
    /// `V = offset - slope * T`
    Linear,
    /// `V = offset - slope * T - 0.405 * ln(T)`
    LogCorrected,
}

/// Calibration curve of a silicon thermodiode.
///
/// # Example
///
/// ```
/// use measurements::{Temperature, Voltage};
/// use srs_sim922::DiodeCalibration;
///
/// // Reference points at room temperature and in liquid nitrogen, in (K, mV).
/// let cal = DiodeCalibration::two_point((297.6, 435.9), (77.0, 992.0)).unwrap();
/// let temp = cal.temperature(Voltage::from_volts(0.992)).unwrap();
/// assert!((temp.as_kelvin() - 77.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiodeCalibration {
    model: DiodeModel,
    offset: f64,
    slope: f64,
}

impl DiodeCalibration {
    /// Linear calibration of the transdiode in the liquid nitrogen reservoir.
    pub const LN2_TRANSDIODE: DiodeCalibration = DiodeCalibration {
        model: DiodeModel::Linear,
        offset: 1186.10562,
        slope: 2.5208,
    };

    /// Create a calibration from known coefficients.
    ///
    /// Arguments:
    /// * `model` - The model of the curve.
    /// * `offset` - Offset in mV.
    /// * `slope` - Slope in mV/K, must be positive.
    pub fn new(model: DiodeModel, offset: f64, slope: f64) -> Result<Self, InstrumentError> {
        if !(slope.is_finite() && slope > 0.0) || !offset.is_finite() {
            return Err(InstrumentError::InvalidArgument(format!(
                "Diode calibration needs a finite offset and a positive slope, \
                 got {offset} mV and {slope} mV/K"
            )));
        }
        Ok(DiodeCalibration {
            model,
            offset,
            slope,
        })
    }

    /// Fit the linear model through two reference points.
    ///
    /// Arguments:
    /// * `first` - Temperature in K and voltage in mV of the first reference point.
    /// * `second` - Temperature in K and voltage in mV of the second reference point.
    pub fn two_point(first: (f64, f64), second: (f64, f64)) -> Result<Self, InstrumentError> {
        Self::fit(DiodeModel::Linear, first, second)
    }

    /// Fit the log-corrected model through two reference points.
    ///
    /// Both temperatures must be positive. Arguments as for [`DiodeCalibration::two_point`].
    pub fn three_point(first: (f64, f64), second: (f64, f64)) -> Result<Self, InstrumentError> {
        Self::fit(DiodeModel::LogCorrected, first, second)
    }

    /// Model of this calibration.
    pub fn model(&self) -> DiodeModel {
        self.model
    }

    /// Offset of the curve in mV.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Slope of the curve in mV/K.
    pub fn slope(&self) -> f64 {
        self.slope
    }

    /// Diode voltage at the given temperature.
    pub fn voltage(&self, temperature: Temperature) -> Voltage {
        Voltage::from_volts(self.millivolts(temperature.as_kelvin()) / 1000.0)
    }

    /// Temperature at the given diode voltage.
    ///
    /// Returns an [`InstrumentError::FloatValueOutOfRange`] if the voltage corresponds to no
    /// positive temperature.
    pub fn temperature(&self, voltage: Voltage) -> Result<Temperature, InstrumentError> {
        let mv = voltage.as_volts() * 1000.0;
        let kelvin = match self.model {
            DiodeModel::Linear => (self.offset - mv) / self.slope,
            DiodeModel::LogCorrected => self.invert_log_corrected(mv),
        };
        if !(kelvin.is_finite() && kelvin > 0.0) {
            return Err(InstrumentError::FloatValueOutOfRange {
                value: mv,
                min: f64::NEG_INFINITY,
                max: self.offset,
            });
        }
        Ok(Temperature::from_kelvin(kelvin))
    }

    fn fit(
        model: DiodeModel,
        first: (f64, f64),
        second: (f64, f64),
    ) -> Result<Self, InstrumentError> {
        let (t1, v1) = first;
        let (t2, v2) = second;
        if t1 == t2 {
            return Err(InstrumentError::InvalidArgument(format!(
                "Reference points must be at different temperatures, both are at {t1} K"
            )));
        }
        if model == DiodeModel::LogCorrected && (t1 <= 0.0 || t2 <= 0.0) {
            return Err(InstrumentError::InvalidArgument(format!(
                "Reference temperatures must be positive, got {t1} K and {t2} K"
            )));
        }
        // Move the logarithmic term to the voltage side, the rest is a straight line.
        let corr = |t: f64| match model {
            DiodeModel::Linear => 0.0,
            DiodeModel::LogCorrected => LOG_COEFFICIENT * t.ln(),
        };
        let w1 = v1 + corr(t1);
        let w2 = v2 + corr(t2);
        let slope = (w1 - w2) / (t2 - t1);
        let offset = w1 + slope * t1;
        Self::new(model, offset, slope)
    }

    fn millivolts(&self, kelvin: f64) -> f64 {
        let linear = self.offset - self.slope * kelvin;
        match self.model {
            DiodeModel::Linear => linear,
            DiodeModel::LogCorrected => linear - LOG_COEFFICIENT * kelvin.ln(),
        }
    }

    /// Newton iteration for the log-corrected model.
    ///
    /// The curve is strictly decreasing and convex for positive temperatures, so the root is
    /// unique and after the first step the iteration approaches it from below.
    fn invert_log_corrected(&self, mv: f64) -> f64 {
        let mut kelvin = ((self.offset - mv) / self.slope).max(1.0);
        for _ in 0..NEWTON_MAX_ITERATIONS {
            let residual = self.millivolts(kelvin) - mv;
            let derivative = -self.slope - LOG_COEFFICIENT / kelvin;
            let mut next = kelvin - residual / derivative;
            if next <= 0.0 {
                next = kelvin / 2.0;
            }
            if (next - kelvin).abs() < NEWTON_TOLERANCE {
                return next;
            }
            kelvin = next;
        }
        log::warn!("Diode temperature did not converge for {mv} mV");
        kelvin
    }
}
