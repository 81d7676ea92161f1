//! Single-point voltage sensor calibration

use fc_hardware::{FirmwareInterface, FirmwareTarget, RawOffsetScale, SensorChannel};
use tracing::{debug, info};

use super::{conclude, CalibrationError, CalibrationOutcome, Prompter, SessionResult, Stage};
use crate::{voltage_scale, AcquireError, Operator, OperatorError, SampleAcquirer};

const CHANNEL: SensorChannel = SensorChannel::Voltage;

/// Voltage scale derived from one reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageCalibration {
    pub target: FirmwareTarget,
    pub measured: f64,
    pub true_value: f64,
    /// Corrected scale in the board's own representation
    pub scale: f64,
    /// `scale` as written; rounded on iNav
    pub native_scale: f64,
}

impl VoltageCalibration {
    fn new(target: FirmwareTarget, measurement_scale: f64, measured: f64, true_value: f64) -> Self {
        let scale = voltage_scale(measurement_scale, true_value, measured);
        let native_scale = match target {
            FirmwareTarget::ArduPilot => scale,
            FirmwareTarget::Inav => scale.round(),
        };
        Self {
            target,
            measured,
            true_value,
            scale,
            native_scale,
        }
    }

    pub fn report_lines(&self) -> Vec<String> {
        let scale = match self.target {
            FirmwareTarget::ArduPilot => format!("Voltage scale: {:.4}", self.scale),
            FirmwareTarget::Inav => format!("Voltage scale: {:.0}", self.native_scale),
        };
        vec![
            format!("Measured:      {:.4} V", self.measured),
            format!("Actual:        {:.4} V", self.true_value),
            scale,
        ]
    }
}

/// Calibrates the voltage divider scale from one measured/true pair.
pub struct VoltageCalibrationSession<'a, B, O>
where
    B: FirmwareInterface + ?Sized,
    O: Operator + ?Sized,
{
    board: &'a mut B,
    prompter: Prompter<'a, O>,
    acquirer: SampleAcquirer,
    stage: Stage,
}

impl<'a, B, O> VoltageCalibrationSession<'a, B, O>
where
    B: FirmwareInterface + ?Sized,
    O: Operator + ?Sized,
{
    pub fn new(board: &'a mut B, operator: &'a mut O, acquirer: SampleAcquirer) -> Self {
        let cancel = acquirer.cancel_token().clone();
        Self {
            board,
            prompter: Prompter::new(operator, cancel),
            acquirer,
            stage: Stage::CheckPrecondition,
        }
    }

    /// Run the workflow to completion. Any ending other than
    /// [`CalibrationOutcome::Written`] leaves the previous scale restored.
    pub fn run(mut self) -> SessionResult<VoltageCalibration> {
        self.enter(Stage::CheckPrecondition);
        if !self.board.is_channel_enabled(CHANNEL)? {
            return Err(CalibrationError::SensorNotEnabled(CHANNEL));
        }

        self.enter(Stage::PrepareBoard);
        let backup = self.board.offset_and_scale(CHANNEL)?;
        info!("Backed up voltage scale {}", backup.scale);

        let outcome = self.calibrate();
        conclude(&mut *self.board, CHANNEL, backup, outcome)
    }

    fn enter(&mut self, stage: Stage) {
        debug!("Voltage calibration: {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    fn calibrate(&mut self) -> SessionResult<VoltageCalibration> {
        self.board.prepare_calibration(CHANNEL)?;

        self.enter(Stage::Gathering);
        match self
            .prompter
            .confirm("Connect the battery. Start sampling?", true)
        {
            Ok(true) => {}
            Ok(false) | Err(OperatorError::Cancelled) => {
                return Ok(CalibrationOutcome::AbortedByOperator)
            }
            Err(e) => return Err(e.into()),
        }

        let operator = &mut *self.prompter.operator;
        let acquired = self.acquirer.acquire(&mut *self.board, CHANNEL, |p| {
            operator.progress(&format!(
                "Sampling voltage: {:.1}s, {} samples, mean {:.4} V",
                p.elapsed.as_secs_f64(),
                p.samples,
                p.mean
            ))
        });
        self.prompter.operator.finish_progress();

        let measured = match acquired {
            Ok(acquisition) => acquisition.mean,
            Err(AcquireError::Aborted) => return Ok(CalibrationOutcome::AbortedByOperator),
            Err(AcquireError::Firmware(e)) => return Err(e.into()),
        };
        self.prompter
            .display(&format!("Measured voltage: {measured:.4} V"));

        let true_value = match self.prompter.read_number("Actual voltage (V)") {
            Ok(value) => value,
            Err(OperatorError::Cancelled) => return Ok(CalibrationOutcome::AbortedByOperator),
            Err(e) => return Err(e.into()),
        };

        self.enter(Stage::Computing);
        let calibration = VoltageCalibration::new(
            self.board.target(),
            self.board.measurement_scale(CHANNEL),
            measured,
            true_value,
        );

        self.enter(Stage::SanityCheck);
        if !calibration.native_scale.is_finite() {
            return Err(CalibrationError::InvalidResults {
                scale: calibration.scale,
                offset: 0.0,
            });
        }

        self.enter(Stage::ReportAndWriteback);
        self.report_and_write(calibration)
    }

    fn report_and_write(
        &mut self,
        calibration: VoltageCalibration,
    ) -> SessionResult<VoltageCalibration> {
        self.prompter.display("New voltage calibration:");
        for line in calibration.report_lines() {
            self.prompter.display(&line);
        }

        match self.prompter.confirm("Write calibration to the board?", false) {
            Ok(true) => {}
            Ok(false) => return Ok(CalibrationOutcome::Discarded(calibration)),
            Err(OperatorError::Cancelled) => return Ok(CalibrationOutcome::AbortedByOperator),
            Err(e) => return Err(e.into()),
        }

        self.board
            .set_offset_and_scale(CHANNEL, RawOffsetScale::new(0.0, calibration.native_scale))?;
        self.board.persist()?;
        info!("Wrote voltage scale {}", calibration.native_scale);
        self.prompter.display("Calibration written");

        Ok(CalibrationOutcome::Written(calibration))
    }
}
