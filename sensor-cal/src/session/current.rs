//! Multi-point current sensor calibration

use fc_hardware::{FirmwareInterface, RawOffsetScale, SensorChannel};
use tracing::{debug, info};

use super::{
    conclude, sample_table, CalibrationError, CalibrationOutcome, Prompter, SessionResult, Stage,
};
use crate::{
    AcquireError, CalibrationResult, CalibrationSample, Operator, OperatorError,
    SampleAcquirer, ScaleOffsetCalculator,
};

const CHANNEL: SensorChannel = SensorChannel::Current;

/// Whether the gather loop produced a usable series.
enum Gathered {
    Enough,
    Aborted,
}

/// Calibrates the current sensor from two or more `(measured, true)` pairs
/// taken at different loads.
pub struct CurrentCalibrationSession<'a, B, O>
where
    B: FirmwareInterface + ?Sized,
    O: Operator + ?Sized,
{
    board: &'a mut B,
    prompter: Prompter<'a, O>,
    acquirer: SampleAcquirer,
    samples: Vec<CalibrationSample>,
    stage: Stage,
}

impl<'a, B, O> CurrentCalibrationSession<'a, B, O>
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
            samples: Vec::new(),
            stage: Stage::CheckPrecondition,
        }
    }

    /// Run the workflow to completion.
    ///
    /// Unless the outcome is [`CalibrationOutcome::Written`], the board's
    /// previous calibration has been restored when this returns, including on
    /// errors raised after the backup was taken.
    pub fn run(mut self) -> SessionResult<CalibrationResult> {
        self.enter(Stage::CheckPrecondition);
        if !self.board.is_channel_enabled(CHANNEL)? {
            return Err(CalibrationError::SensorNotEnabled(CHANNEL));
        }

        self.enter(Stage::PrepareBoard);
        let backup = self.board.offset_and_scale(CHANNEL)?;
        info!(
            "Backed up current calibration (offset={}, scale={})",
            backup.offset, backup.scale
        );

        let outcome = self.calibrate();
        conclude(&mut *self.board, CHANNEL, backup, outcome)
    }

    fn enter(&mut self, stage: Stage) {
        debug!("Current calibration: {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    fn calibrate(&mut self) -> SessionResult<CalibrationResult> {
        self.board.prepare_calibration(CHANNEL)?;

        if let Gathered::Aborted = self.gather()? {
            return Ok(CalibrationOutcome::AbortedByOperator);
        }

        self.enter(Stage::Computing);
        let original_scale = self.board.measurement_scale(CHANNEL);
        let result = ScaleOffsetCalculator::new(self.board.target(), original_scale)?
            .calculate(&self.samples)?;

        self.enter(Stage::SanityCheck);
        if !result.is_finite() {
            return Err(CalibrationError::InvalidResults {
                scale: result.scale(),
                offset: result.offset(),
            });
        }

        self.enter(Stage::ReportAndWriteback);
        self.report_and_write(result)
    }

    /// Collect samples until the operator stops with at least two, or gives
    /// up.
    fn gather(&mut self) -> Result<Gathered, CalibrationError> {
        loop {
            self.enter(Stage::Gathering);
            self.collect_samples()?;

            let count = self.samples.len();
            if count >= 2 {
                return Ok(Gathered::Enough);
            }

            self.enter(Stage::ConfirmTooFew);
            let question = format!(
                "Only {count} measurement(s) taken, at least 2 are needed. Abort calibration?"
            );
            let answer = self.prompter.confirm(&question, false);
            // Ctrl-C while the prompt was open wins over its answer
            if self.prompter.cancel.take() {
                return Ok(Gathered::Aborted);
            }
            match answer {
                Ok(true) => return Err(CalibrationError::TooFewMeasurements(count)),
                Ok(false) => continue,
                Err(OperatorError::Cancelled) => return Ok(Gathered::Aborted),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Acquire/pair cycles until the operator stops at one of the prompts.
    fn collect_samples(&mut self) -> Result<(), CalibrationError> {
        loop {
            match self
                .prompter
                .confirm("Apply a known load. Start sampling?", true)
            {
                Ok(true) => {}
                Ok(false) | Err(OperatorError::Cancelled) => return Ok(()),
                Err(e) => return Err(e.into()),
            }

            let operator = &mut *self.prompter.operator;
            let acquired = self.acquirer.acquire(&mut *self.board, CHANNEL, |p| {
                operator.progress(&format!(
                    "Sampling current: {:.1}s, {} samples, mean {:.4} A",
                    p.elapsed.as_secs_f64(),
                    p.samples,
                    p.mean
                ))
            });
            self.prompter.operator.finish_progress();

            let measured = match acquired {
                Ok(acquisition) => acquisition.mean,
                Err(AcquireError::Aborted) => {
                    self.prompter.display("Sampling cancelled, measurement restarted");
                    continue;
                }
                Err(AcquireError::Firmware(e)) => return Err(e.into()),
            };
            self.prompter
                .display(&format!("Measured current: {measured:.4} A"));

            let true_value = match self.prompter.read_number("Actual current (A)") {
                Ok(value) => value,
                Err(OperatorError::Cancelled) => {
                    self.prompter.display("Measurement discarded");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            self.samples.push(CalibrationSample::new(measured, true_value));
            info!(
                "Current sample {}: measured {measured:.4} A, true {true_value:.4} A",
                self.samples.len()
            );
            for line in sample_table(&self.samples, "A") {
                self.prompter.display(&line);
            }
        }
    }

    fn report_and_write(&mut self, result: CalibrationResult) -> SessionResult<CalibrationResult> {
        self.prompter.display("New current calibration:");
        for line in result.report_lines() {
            self.prompter.display(&line);
        }

        match self.prompter.confirm("Write calibration to the board?", false) {
            Ok(true) => {}
            Ok(false) => return Ok(CalibrationOutcome::Discarded(result)),
            Err(OperatorError::Cancelled) => return Ok(CalibrationOutcome::AbortedByOperator),
            Err(e) => return Err(e.into()),
        }

        let values = RawOffsetScale::new(result.native_voltage_offset(), result.native_scale());
        self.board.set_offset_and_scale(CHANNEL, values)?;
        self.board.persist()?;
        info!(
            "Wrote current calibration (offset={}, scale={})",
            values.offset, values.scale
        );
        self.prompter.display("Calibration written");

        Ok(CalibrationOutcome::Written(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquirer::tests::stepping_clock;
    use crate::operator::{Reply, ScriptedOperator};
    use crate::CancelToken;
    use approx::assert_relative_eq;
    use fc_hardware::{ArduPilotBoard, InavBoard};
    use fc_link::mock::{MockMavlink, MockMsp, MspCall};
    use fc_link::{feature, variant, BatteryConfig, CurrentSensorConfig, ProtocolError};
    use std::time::Duration;

    fn ardupilot(monitor: f32) -> ArduPilotBoard<MockMavlink> {
        let link = MockMavlink::new()
            .with_param("BATT_MONITOR", monitor)
            .with_param("BATT_VOLT_MULT", 10.1)
            .with_param("BATT_AMP_PERVLT", 17.0)
            .with_param("BATT_AMP_OFFSET", 0.25);
        ArduPilotBoard::new(link)
    }

    /// ArduPilot board whose successive single-sample acquisitions read
    /// `amps` in order.
    fn ardupilot_reading(amps: &[f64]) -> ArduPilotBoard<MockMavlink> {
        let mut board = ardupilot(4.0);
        for &a in amps {
            board
                .link_mut()
                .push_sys_status(12_000, (a * 100.0).round() as i16);
        }
        board
    }

    fn instant_acquirer() -> SampleAcquirer {
        SampleAcquirer::new(Duration::ZERO, CancelToken::new())
    }

    fn assert_backup_restored(board: &ArduPilotBoard<MockMavlink>) {
        assert_eq!(board.link().param("BATT_AMP_PERVLT"), Some(17.0));
        assert_eq!(board.link().param("BATT_AMP_OFFSET"), Some(0.25));
    }

    #[test]
    fn test_sensor_not_enabled() {
        let mut board = ardupilot(3.0);
        let mut op = ScriptedOperator::new(Vec::new());

        let err = CurrentCalibrationSession::new(&mut board, &mut op, instant_acquirer())
            .run()
            .unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::SensorNotEnabled(SensorChannel::Current)
        ));
        assert_backup_restored(&board);
    }

    #[test]
    fn test_two_points_written() {
        let mut board = ardupilot_reading(&[1.0, 3.0]);
        let mut op = ScriptedOperator::new([
            Reply::Yes,
            Reply::Number(0.5),
            Reply::Default,
            Reply::Number(1.5),
            Reply::No,
            Reply::Yes,
        ]);

        let outcome = CurrentCalibrationSession::new(&mut board, &mut op, instant_acquirer())
            .run()
            .unwrap();

        let result = match outcome {
            CalibrationOutcome::Written(result) => result,
            other => panic!("expected write, got {other:?}"),
        };
        assert_relative_eq!(result.scale(), 50.0);
        assert_eq!(board.link().param("BATT_AMP_PERVLT"), Some(50.0));
        assert_eq!(board.link().param("BATT_AMP_OFFSET"), Some(0.0));
        assert_eq!(op.remaining(), 0);
        assert!(op.displayed("50.0000 A/V"));
    }

    #[test]
    fn test_discard_restores() {
        let mut board = ardupilot_reading(&[1.0, 3.0]);
        let mut op = ScriptedOperator::new([
            Reply::Yes,
            Reply::Number(0.5),
            Reply::Yes,
            Reply::Number(1.5),
            Reply::No,
            Reply::No,
        ]);

        let outcome = CurrentCalibrationSession::new(&mut board, &mut op, instant_acquirer())
            .run()
            .unwrap();

        assert!(matches!(outcome, CalibrationOutcome::Discarded(_)));
        assert_backup_restored(&board);
    }

    #[test]
    fn test_too_few_then_abort() {
        let mut board = ardupilot_reading(&[1.0]);
        let mut op = ScriptedOperator::new([Reply::Yes, Reply::Number(0.5), Reply::No, Reply::Yes]);

        let err = CurrentCalibrationSession::new(&mut board, &mut op, instant_acquirer())
            .run()
            .unwrap_err();

        assert!(matches!(err, CalibrationError::TooFewMeasurements(1)));
        assert_backup_restored(&board);
    }

    #[test]
    fn test_too_few_then_resume() {
        let mut board = ardupilot_reading(&[1.0, 3.0]);
        let mut op = ScriptedOperator::new([
            Reply::Yes,
            Reply::Number(0.5),
            Reply::No,
            Reply::No,
            Reply::Yes,
            Reply::Number(1.5),
            Reply::No,
            Reply::Yes,
        ]);

        let outcome = CurrentCalibrationSession::new(&mut board, &mut op, instant_acquirer())
            .run()
            .unwrap();

        assert!(outcome.is_written());
        assert_eq!(board.link().param("BATT_AMP_PERVLT"), Some(50.0));
    }

    #[test]
    fn test_cancel_in_too_few_prompt_aborts() {
        let mut board = ardupilot(4.0);
        let mut op = ScriptedOperator::new([Reply::Cancel, Reply::Cancel]);

        let outcome = CurrentCalibrationSession::new(&mut board, &mut op, instant_acquirer())
            .run()
            .unwrap();

        assert_eq!(outcome, CalibrationOutcome::AbortedByOperator);
        assert_backup_restored(&board);
    }

    #[test]
    fn test_cancel_at_true_value_discards_measurement() {
        let mut board = ardupilot_reading(&[1.0, 3.0]);
        let mut op = ScriptedOperator::new([
            Reply::Yes,
            Reply::Number(0.5),
            Reply::Yes,
            Reply::Cancel,
            Reply::Yes,
        ]);

        let err = CurrentCalibrationSession::new(&mut board, &mut op, instant_acquirer())
            .run()
            .unwrap_err();

        assert!(matches!(err, CalibrationError::TooFewMeasurements(1)));
        assert!(op.displayed("Measurement discarded"));
    }

    #[test]
    fn test_cancel_during_sampling_restarts_cycle() {
        let mut board = ardupilot(4.0);
        for amps in [100, 100, 100, 300] {
            board.link_mut().push_sys_status(12_000, amps);
        }

        let cancel = CancelToken::new();
        let hook_cancel = cancel.clone();
        board.link_mut().set_sample_hook(Box::new(move |n| {
            if n == 1 {
                hook_cancel.cancel();
            }
        }));
        let acquirer = SampleAcquirer::new(Duration::from_millis(200), cancel)
            .with_clock(stepping_clock(Duration::from_millis(100)));

        let mut op = ScriptedOperator::new([
            Reply::Yes,
            // first acquisition cancelled, cycle restarts
            Reply::Yes,
            Reply::Number(0.5),
            Reply::Yes,
            Reply::Number(1.5),
            Reply::No,
            Reply::Yes,
        ]);

        let outcome = CurrentCalibrationSession::new(&mut board, &mut op, acquirer)
            .run()
            .unwrap();

        assert!(op.displayed("Sampling cancelled"));
        let result = outcome.result().unwrap();
        assert_relative_eq!(result.scale(), 50.0);
    }

    #[test]
    fn test_cancel_on_last_sample_restarts_cycle() {
        let mut board = ardupilot_reading(&[1.0, 3.0, 5.0]);
        let cancel = CancelToken::new();
        let hook_cancel = cancel.clone();
        board.link_mut().set_sample_hook(Box::new(move |n| {
            if n == 3 {
                hook_cancel.cancel();
            }
        }));
        // One sample per window
        let acquirer = SampleAcquirer::new(Duration::from_millis(100), cancel)
            .with_clock(stepping_clock(Duration::from_millis(100)));

        let mut op = ScriptedOperator::new([
            Reply::Yes,
            Reply::Number(0.5),
            Reply::Yes,
            Reply::Number(1.5),
            Reply::Yes,
            // third acquisition cancelled on its only sample
            Reply::No,
            Reply::Yes,
        ]);

        let outcome = CurrentCalibrationSession::new(&mut board, &mut op, acquirer)
            .run()
            .unwrap();

        assert!(op.displayed("Sampling cancelled"));
        assert!(!op.displayed("Measurement discarded"));
        assert_eq!(
            op.prompts().iter().filter(|p| p.starts_with("Actual current")).count(),
            2
        );
        assert!(outcome.is_written());
        assert_relative_eq!(outcome.result().unwrap().scale(), 50.0);
        assert_eq!(op.remaining(), 0);
    }

    #[test]
    fn test_interrupt_during_too_few_prompt_aborts() {
        let mut board = ardupilot_reading(&[1.0]);
        let cancel = CancelToken::new();
        let acquirer = SampleAcquirer::new(Duration::ZERO, cancel.clone());
        // Answer "no, keep going" but Ctrl-C lands while the prompt is open
        let mut op = ScriptedOperator::new([Reply::Yes, Reply::Number(0.5), Reply::No, Reply::No])
            .interrupt_at("Abort calibration?", cancel.clone());

        let outcome = CurrentCalibrationSession::new(&mut board, &mut op, acquirer)
            .run()
            .unwrap();

        assert_eq!(outcome, CalibrationOutcome::AbortedByOperator);
        assert_eq!(op.remaining(), 0);
        assert!(!cancel.is_cancelled());
        assert_backup_restored(&board);
    }

    #[test]
    fn test_restore_failure_replaces_original_error() {
        let mut board = ardupilot_reading(&[1.0, 1.2]);
        let lock = board.link().param_lock();
        board.link_mut().set_sample_hook(Box::new(move |_| lock.set(true)));
        let mut op = ScriptedOperator::new([
            Reply::Yes,
            Reply::Number(2.0),
            Reply::Yes,
            Reply::Number(2.0),
            Reply::No,
        ]);

        let err = CurrentCalibrationSession::new(&mut board, &mut op, instant_acquirer())
            .run()
            .unwrap_err();

        // InvalidResults is logged, the failed restore is returned
        match err {
            CalibrationError::Firmware(e) => {
                assert!(matches!(e.protocol(), Some(ProtocolError::Rejected(_))))
            }
            other => panic!("expected the restore error, got {other:?}"),
        }
        assert_eq!(board.link().param("BATT_AMP_PERVLT"), Some(100.0));
    }

    #[test]
    fn test_identical_true_values_invalid() {
        let mut board = ardupilot_reading(&[1.0, 1.2]);
        let mut op = ScriptedOperator::new([
            Reply::Yes,
            Reply::Number(2.0),
            Reply::Yes,
            Reply::Number(2.0),
            Reply::No,
        ]);

        let err = CurrentCalibrationSession::new(&mut board, &mut op, instant_acquirer())
            .run()
            .unwrap_err();

        assert!(matches!(err, CalibrationError::InvalidResults { .. }));
        assert_backup_restored(&board);
    }

    #[test]
    fn test_cancel_at_write_prompt_restores() {
        let mut board = ardupilot_reading(&[1.0, 3.0]);
        let mut op = ScriptedOperator::new([
            Reply::Yes,
            Reply::Number(0.5),
            Reply::Yes,
            Reply::Number(1.5),
            Reply::No,
            Reply::Cancel,
        ]);

        let outcome = CurrentCalibrationSession::new(&mut board, &mut op, instant_acquirer())
            .run()
            .unwrap();

        assert_eq!(outcome, CalibrationOutcome::AbortedByOperator);
        assert_backup_restored(&board);
    }

    #[test]
    fn test_inav_writes_fixed_point() {
        let stock = BatteryConfig {
            current: CurrentSensorConfig {
                offset: 50,
                scale: 375,
                sensor_type: 1,
            },
            ..BatteryConfig::default()
        };
        let mut msp = MockMsp::new(variant::INAV)
            .with_features(feature::CURRENT_METER)
            .with_battery_config(stock);
        msp.push_analog(12.0, 2.5);
        msp.push_analog(12.0, 4.5);
        let log = msp.call_log();
        let mut board = InavBoard::new(msp);

        let mut op = ScriptedOperator::new([
            Reply::Yes,
            Reply::Number(1.0),
            Reply::Yes,
            Reply::Number(2.0),
            Reply::No,
            Reply::Yes,
        ]);
        let outcome = CurrentCalibrationSession::new(&mut board, &mut op, instant_acquirer())
            .run()
            .unwrap();

        assert!(outcome.is_written());
        assert_eq!(board.link().battery().current.scale, 800);
        assert_eq!(board.link().battery().current.offset, 200);
        assert_eq!(log.borrow().last(), Some(&MspCall::EepromWrite));
        assert!(op.displayed("800 (0.1 mV/A)"));
    }
}
