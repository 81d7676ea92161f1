//! Scale and offset calculation
//!
//! Given a series of `(measured, true)` pairs taken with a known original
//! scale, the board's gain error is estimated as the mean of the slopes
//! between consecutive pairs. Samples are used in the order they were taken;
//! the estimate is not a least-squares fit and reordering the series can
//! change it.
//!
//! The two firmware families define current scale in opposite directions:
//!
//! - ArduPilot stores amps per volt, so the corrected scale is `orig / coeff`
//!   and the zero offset in volts is `offset / scale`.
//! - iNav stores volts per amp, so the corrected scale is `orig * coeff` and
//!   the zero offset in volts is `offset * scale`. Its native units are
//!   0.1 mV fixed-point integers.

use fc_hardware::{FirmwareTarget, NATIVE_UNITS_PER_VOLT};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalculatorError {
    #[error("need at least 2 samples to calculate scale, got {0}")]
    TooFewSamples(usize),

    #[error("measured and true series differ in length ({measured} vs {true_values})")]
    LengthMismatch { measured: usize, true_values: usize },

    #[error("original scale must be a positive number, got {0}")]
    InvalidOriginalScale(f64),
}

/// One averaged board reading paired with the operator's reference value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSample {
    pub measured: f64,
    pub true_value: f64,
}

impl CalibrationSample {
    pub fn new(measured: f64, true_value: f64) -> Self {
        Self {
            measured,
            true_value,
        }
    }
}

/// Unit labels for each field of a [`CalibrationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultUnits {
    pub scale: &'static str,
    pub offset: &'static str,
    pub voltage_offset: &'static str,
    pub native_scale: &'static str,
    pub native_voltage_offset: &'static str,
}

const ARDUPILOT_UNITS: ResultUnits = ResultUnits {
    scale: "A/V",
    offset: "A",
    voltage_offset: "V",
    native_scale: "A/V",
    native_voltage_offset: "V",
};

const INAV_UNITS: ResultUnits = ResultUnits {
    scale: "V/A",
    offset: "A",
    voltage_offset: "V",
    native_scale: "0.1 mV/A",
    native_voltage_offset: "0.1 mV",
};

/// Calibration derived from one sample series. Immutable once computed.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    target: FirmwareTarget,
    coefficient: f64,
    scale: f64,
    offset: f64,
    voltage_offset: f64,
    native_scale: f64,
    native_voltage_offset: f64,
}

impl CalibrationResult {
    pub fn target(&self) -> FirmwareTarget {
        self.target
    }

    /// Mean slope of measured over true values.
    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }

    /// Corrected scale in physical units.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Mean residual after gain correction, in amps.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Offset expressed as sensor output voltage.
    pub fn voltage_offset(&self) -> f64 {
        self.voltage_offset
    }

    /// Scale as written to the board.
    pub fn native_scale(&self) -> f64 {
        self.native_scale
    }

    /// Voltage offset as written to the board.
    pub fn native_voltage_offset(&self) -> f64 {
        self.native_voltage_offset
    }

    pub fn units(&self) -> ResultUnits {
        match self.target {
            FirmwareTarget::ArduPilot => ARDUPILOT_UNITS,
            FirmwareTarget::Inav => INAV_UNITS,
        }
    }

    /// Whether the board-facing values are safe to write.
    pub fn is_finite(&self) -> bool {
        self.scale.is_finite()
            && self.offset.is_finite()
            && self.native_scale.is_finite()
            && self.native_voltage_offset.is_finite()
    }

    /// Human-readable summary, physical values to 4 decimals and fixed-point
    /// native values as integers.
    pub fn report_lines(&self) -> Vec<String> {
        let units = self.units();
        let mut lines = vec![
            format!("Scale:          {:.4} {}", self.scale, units.scale),
            format!("Offset:         {:.4} {}", self.offset, units.offset),
            format!(
                "Voltage offset: {:.4} {}",
                self.voltage_offset, units.voltage_offset
            ),
        ];

        if self.target == FirmwareTarget::Inav {
            lines.push(format!(
                "Native scale:          {:.0} ({})",
                self.native_scale, units.native_scale
            ));
            lines.push(format!(
                "Native voltage offset: {:.0} ({})",
                self.native_voltage_offset, units.native_voltage_offset
            ));
        }

        lines
    }
}

/// Current sensor calibration engine for one firmware family.
#[derive(Debug, Clone, Copy)]
pub struct ScaleOffsetCalculator {
    target: FirmwareTarget,
    original_scale: f64,
}

impl ScaleOffsetCalculator {
    /// `original_scale` is the scale the board used while the samples were
    /// taken, in physical units.
    pub fn new(target: FirmwareTarget, original_scale: f64) -> Result<Self, CalculatorError> {
        if !(original_scale.is_finite() && original_scale > 0.0) {
            return Err(CalculatorError::InvalidOriginalScale(original_scale));
        }
        Ok(Self {
            target,
            original_scale,
        })
    }

    pub fn calculate(
        &self,
        samples: &[CalibrationSample],
    ) -> Result<CalibrationResult, CalculatorError> {
        let measured: Vec<f64> = samples.iter().map(|s| s.measured).collect();
        let true_values: Vec<f64> = samples.iter().map(|s| s.true_value).collect();
        self.calculate_series(&measured, &true_values)
    }

    /// Degenerate series (repeated true values) are not rejected here; they
    /// produce non-finite results that callers must check with
    /// [`CalibrationResult::is_finite`].
    pub fn calculate_series(
        &self,
        measured: &[f64],
        true_values: &[f64],
    ) -> Result<CalibrationResult, CalculatorError> {
        if measured.len() != true_values.len() {
            return Err(CalculatorError::LengthMismatch {
                measured: measured.len(),
                true_values: true_values.len(),
            });
        }
        if measured.len() < 2 {
            return Err(CalculatorError::TooFewSamples(measured.len()));
        }

        let slopes: Vec<f64> = measured
            .windows(2)
            .zip(true_values.windows(2))
            .map(|(m, t)| (m[1] - m[0]) / (t[1] - t[0]))
            .collect();
        let coefficient = mean(&slopes);

        let residuals: Vec<f64> = measured
            .iter()
            .zip(true_values)
            .map(|(m, t)| m / coefficient - t)
            .collect();
        let offset = mean(&residuals);

        let (scale, voltage_offset) = match self.target {
            FirmwareTarget::ArduPilot => {
                let scale = self.original_scale / coefficient;
                (scale, offset / scale)
            }
            FirmwareTarget::Inav => {
                let scale = self.original_scale * coefficient;
                (scale, offset * scale)
            }
        };

        let (native_scale, native_voltage_offset) = match self.target {
            FirmwareTarget::ArduPilot => (scale, voltage_offset),
            FirmwareTarget::Inav => (
                to_fixed_point(scale),
                to_fixed_point(voltage_offset),
            ),
        };

        Ok(CalibrationResult {
            target: self.target,
            coefficient,
            scale,
            offset,
            voltage_offset,
            native_scale,
            native_voltage_offset,
        })
    }
}

/// Corrected voltage scale from a single reading taken at `measurement_scale`.
///
/// Returns a non-finite value when `measured` is zero.
pub fn voltage_scale(measurement_scale: f64, true_value: f64, measured: f64) -> f64 {
    measurement_scale * true_value / measured
}

fn to_fixed_point(physical: f64) -> f64 {
    (physical * NATIVE_UNITS_PER_VOLT).round()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn samples(pairs: &[(f64, f64)]) -> Vec<CalibrationSample> {
        pairs
            .iter()
            .map(|&(m, t)| CalibrationSample::new(m, t))
            .collect()
    }

    #[test]
    fn test_ardupilot_two_points() {
        let calc = ScaleOffsetCalculator::new(FirmwareTarget::ArduPilot, 100.0).unwrap();
        let result = calc.calculate(&samples(&[(1.0, 0.5), (3.0, 1.5)])).unwrap();

        assert_relative_eq!(result.coefficient(), 2.0);
        assert_relative_eq!(result.scale(), 50.0);
        assert_abs_diff_eq!(result.offset(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result.voltage_offset(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_linear_series_recovers_gain_and_offset() {
        let k = 2.5;
        let c = 0.3;
        let truth = [1.0, 2.0, 4.0, 7.0];
        let measured: Vec<f64> = truth.iter().map(|t| k * t + c).collect();

        let calc = ScaleOffsetCalculator::new(FirmwareTarget::ArduPilot, 100.0).unwrap();
        let result = calc.calculate_series(&measured, &truth).unwrap();

        assert_relative_eq!(result.coefficient(), k, epsilon = 1e-12);
        assert_relative_eq!(result.offset(), c / k, epsilon = 1e-12);
        assert_relative_eq!(result.scale(), 40.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mean_of_slopes_depends_on_order() {
        let calc = ScaleOffsetCalculator::new(FirmwareTarget::ArduPilot, 1.0).unwrap();

        let ordered = calc
            .calculate_series(&[1.0, 4.0, 9.0], &[1.0, 2.0, 3.0])
            .unwrap();
        let shuffled = calc
            .calculate_series(&[1.0, 9.0, 4.0], &[1.0, 3.0, 2.0])
            .unwrap();

        assert_relative_eq!(ordered.coefficient(), 4.0);
        assert_relative_eq!(shuffled.coefficient(), 4.5);
    }

    #[test]
    fn test_ardupilot_native_is_physical() {
        let calc = ScaleOffsetCalculator::new(FirmwareTarget::ArduPilot, 100.0).unwrap();
        let result = calc.calculate(&samples(&[(2.5, 1.0), (4.5, 2.0)])).unwrap();

        assert_relative_eq!(result.scale(), 50.0);
        assert_relative_eq!(result.voltage_offset(), 0.005, epsilon = 1e-12);
        assert_eq!(result.native_scale(), result.scale());
        assert_eq!(result.native_voltage_offset(), result.voltage_offset());
    }

    #[test]
    fn test_inav_fixed_point() {
        let calc = ScaleOffsetCalculator::new(FirmwareTarget::Inav, 0.04).unwrap();
        let result = calc.calculate(&samples(&[(2.5, 1.0), (4.5, 2.0)])).unwrap();

        assert_relative_eq!(result.coefficient(), 2.0);
        assert_relative_eq!(result.scale(), 0.08, epsilon = 1e-12);
        assert_relative_eq!(result.offset(), 0.25, epsilon = 1e-12);
        assert_relative_eq!(result.voltage_offset(), 0.02, epsilon = 1e-12);
        assert_eq!(result.native_scale(), 800.0);
        assert_eq!(result.native_voltage_offset(), 200.0);
    }

    #[test]
    fn test_inav_native_rounds_to_nearest() {
        assert_eq!(to_fixed_point(0.03996), 400.0);
        assert_eq!(to_fixed_point(0.04004), 400.0);
        assert_eq!(to_fixed_point(-0.00126), -13.0);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert_eq!(
            ScaleOffsetCalculator::new(FirmwareTarget::Inav, 0.0).unwrap_err(),
            CalculatorError::InvalidOriginalScale(0.0)
        );
        assert!(ScaleOffsetCalculator::new(FirmwareTarget::Inav, -1.0).is_err());

        let calc = ScaleOffsetCalculator::new(FirmwareTarget::ArduPilot, 100.0).unwrap();
        assert_eq!(
            calc.calculate(&samples(&[(1.0, 0.5)])).unwrap_err(),
            CalculatorError::TooFewSamples(1)
        );
        assert_eq!(
            calc.calculate_series(&[1.0, 2.0, 3.0], &[1.0, 2.0]).unwrap_err(),
            CalculatorError::LengthMismatch {
                measured: 3,
                true_values: 2
            }
        );
    }

    #[test]
    fn test_repeated_true_values_not_finite() {
        let calc = ScaleOffsetCalculator::new(FirmwareTarget::ArduPilot, 100.0).unwrap();
        let result = calc.calculate(&samples(&[(1.0, 2.0), (1.2, 2.0)])).unwrap();
        assert!(!result.is_finite());
    }

    #[test]
    fn test_voltage_scale() {
        assert_abs_diff_eq!(voltage_scale(20.0, 12.0, 11.5), 20.8696, epsilon = 1e-4);
        assert!(!voltage_scale(20.0, 12.0, 0.0).is_finite());
    }

    #[test]
    fn test_report_rounding() {
        let calc = ScaleOffsetCalculator::new(FirmwareTarget::Inav, 0.04).unwrap();
        let result = calc.calculate(&samples(&[(2.5, 1.0), (4.5, 2.0)])).unwrap();
        let lines = result.report_lines();

        assert_eq!(lines.len(), 5);
        assert!(lines[0].ends_with("0.0800 V/A"));
        assert!(lines[3].ends_with("800 (0.1 mV/A)"));
        assert!(lines[4].ends_with("200 (0.1 mV)"));

        let calc = ScaleOffsetCalculator::new(FirmwareTarget::ArduPilot, 100.0).unwrap();
        let result = calc.calculate(&samples(&[(1.0, 0.5), (3.0, 1.5)])).unwrap();
        let lines = result.report_lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("50.0000 A/V"));
    }
}
