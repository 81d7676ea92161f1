//! Interactive calibration workflows
//!
//! A session owns the board for its whole run. The board's stored calibration
//! is backed up before anything is changed, and every ending other than an
//! accepted write puts the backup back.

mod current;
mod voltage;

pub use current::CurrentCalibrationSession;
pub use voltage::{VoltageCalibration, VoltageCalibrationSession};

use fc_hardware::{FirmwareError, FirmwareInterface, RawOffsetScale, SensorChannel};
use strum::Display;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    CalculatorError, CalibrationSample, CancelToken, Operator, OperatorError, PromptResult,
};

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("{0} sensing is not enabled on the board")]
    SensorNotEnabled(SensorChannel),

    #[error("at least 2 measurements are required, got {0}")]
    TooFewMeasurements(usize),

    #[error("calculated calibration is not finite (scale {scale}, offset {offset})")]
    InvalidResults { scale: f64, offset: f64 },

    #[error(transparent)]
    Firmware(#[from] FirmwareError),

    #[error(transparent)]
    Calculator(#[from] CalculatorError),

    #[error("operator prompt failed: {0}")]
    Operator(#[from] OperatorError),
}

/// How a session ended when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationOutcome<R> {
    /// The operator accepted the result and it is stored on the board.
    Written(R),
    /// The operator declined the result; the previous calibration is back.
    Discarded(R),
    /// The operator cancelled; the previous calibration is back.
    AbortedByOperator,
}

impl<R> CalibrationOutcome<R> {
    pub fn is_written(&self) -> bool {
        matches!(self, CalibrationOutcome::Written(_))
    }

    pub fn result(&self) -> Option<&R> {
        match self {
            CalibrationOutcome::Written(r) | CalibrationOutcome::Discarded(r) => Some(r),
            CalibrationOutcome::AbortedByOperator => None,
        }
    }
}

pub type SessionResult<R> = Result<CalibrationOutcome<R>, CalibrationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
enum Stage {
    CheckPrecondition,
    PrepareBoard,
    Gathering,
    ConfirmTooFew,
    Computing,
    SanityCheck,
    ReportAndWriteback,
}

/// Operator access that honours a pending Ctrl-C before every prompt.
struct Prompter<'a, O: Operator + ?Sized> {
    operator: &'a mut O,
    cancel: CancelToken,
}

impl<'a, O: Operator + ?Sized> Prompter<'a, O> {
    fn new(operator: &'a mut O, cancel: CancelToken) -> Self {
        Self { operator, cancel }
    }

    fn display(&mut self, line: &str) {
        self.operator.display(line);
    }

    fn confirm(&mut self, question: &str, default: bool) -> PromptResult<bool> {
        if self.cancel.take() {
            return Err(OperatorError::Cancelled);
        }
        self.operator.confirm(question, default)
    }

    fn read_number(&mut self, prompt: &str) -> PromptResult<f64> {
        if self.cancel.take() {
            return Err(OperatorError::Cancelled);
        }
        self.operator.read_number(prompt)
    }
}

/// Make sure `channel` is measured by the board, enabling it if needed.
///
/// Returns whether the sensor is ready for calibration. When enabling
/// requires a reboot the operator is asked first; declining leaves the
/// change pending and returns `false`.
pub fn enable_sensor<B, O>(
    board: &mut B,
    channel: SensorChannel,
    operator: &mut O,
) -> Result<bool, CalibrationError>
where
    B: FirmwareInterface + ?Sized,
    O: Operator + ?Sized,
{
    if board.is_channel_enabled(channel)? {
        return Ok(true);
    }

    operator.display(&format!("{channel} sensing is disabled, enabling it"));
    board.enable_channel(channel)?;

    if board.needs_reboot() {
        match operator.confirm("The board must reboot for this to take effect. Reboot now?", true) {
            Ok(true) => board.reboot()?,
            Ok(false) | Err(OperatorError::Cancelled) => {
                operator.display("Reboot the board before calibrating");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(board.is_channel_enabled(channel)?)
}

/// Put the backed-up calibration back and commit it.
fn restore<B>(
    board: &mut B,
    channel: SensorChannel,
    backup: RawOffsetScale,
) -> Result<(), FirmwareError>
where
    B: FirmwareInterface + ?Sized,
{
    info!(
        "Restoring previous {channel} calibration (offset={}, scale={})",
        backup.offset, backup.scale
    );
    board.set_offset_and_scale(channel, backup)?;
    board.persist()
}

/// Restore the backup unless the session ended with an accepted write.
fn conclude<B, R>(
    board: &mut B,
    channel: SensorChannel,
    backup: RawOffsetScale,
    outcome: SessionResult<R>,
) -> SessionResult<R>
where
    B: FirmwareInterface + ?Sized,
{
    if matches!(outcome, Ok(CalibrationOutcome::Written(_))) {
        return outcome;
    }

    match &outcome {
        Ok(CalibrationOutcome::Discarded(_)) => debug!("{channel} result discarded"),
        Ok(_) => info!("{channel} calibration aborted"),
        Err(e) => warn!("{channel} calibration failed: {e}"),
    }

    restore(board, channel, backup)?;
    outcome
}

/// Table of the samples gathered so far, one line per sample.
fn sample_table(samples: &[CalibrationSample], unit: &str) -> Vec<String> {
    let mut lines = vec![format!(
        "{:>3}  {:>14}  {:>14}",
        "#",
        format!("Measured ({unit})"),
        format!("True ({unit})")
    )];
    lines.extend(samples.iter().enumerate().map(|(i, s)| {
        format!("{:>3}  {:>14.4}  {:>14.4}", i + 1, s.measured, s.true_value)
    }));
    lines
}
