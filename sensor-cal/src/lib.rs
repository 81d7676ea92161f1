//! Voltage and current sensor calibration
//!
//! A calibration pairs raw readings averaged over an acquisition window with
//! ground-truth values typed in by the operator, then derives a corrected
//! scale and offset for the board.
//!
//! - [`ScaleOffsetCalculator`]: the numeric engine, no I/O
//! - [`SampleAcquirer`]: time-boxed, cancellable averaging of raw readings
//! - [`CurrentCalibrationSession`] / [`VoltageCalibrationSession`]: the
//!   interactive workflows, which always leave the board either calibrated or
//!   restored to its previous values
//! - [`Operator`]: the terminal boundary, with a `rustyline` implementation
//!   and a scripted one for tests

pub mod acquirer;
pub mod calculator;
pub mod cancel;
pub mod config;
pub mod operator;
pub mod session;

pub use acquirer::{AcquireError, Acquisition, AcquisitionProgress, SampleAcquirer};
pub use calculator::{
    voltage_scale, CalculatorError, CalibrationResult, CalibrationSample, ResultUnits,
    ScaleOffsetCalculator,
};
pub use cancel::CancelToken;
pub use config::{CalibrationConfig, ConfigError};
pub use operator::{Operator, OperatorError, PromptResult};
pub use session::{
    enable_sensor, CalibrationError, CalibrationOutcome, CurrentCalibrationSession,
    SessionResult, VoltageCalibration, VoltageCalibrationSession,
};
