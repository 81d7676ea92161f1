//! Full calibration runs against scripted flight controllers.

use std::time::Duration;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use fc_hardware::{
    AutodetectConfig, Board, FirmwareAutodetector, FirmwareInterface, FirmwareTarget,
    SensorChannel,
};
use fc_link::mock::{MockConnector, MockMavlink, MockMsp, MspCall};
use fc_link::{feature, variant, BatteryConfig, CurrentSensorConfig, VoltageSensorConfig};
use sensor_cal::operator::{Reply, ScriptedOperator};
use sensor_cal::{
    enable_sensor, voltage_scale, CalibrationConfig, CalibrationError, CalibrationOutcome,
    CancelToken, CurrentCalibrationSession, SampleAcquirer, VoltageCalibrationSession,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

fn quick_detector() -> FirmwareAutodetector {
    FirmwareAutodetector::new(AutodetectConfig {
        reboot_pause_secs: 0.0,
        heartbeat_timeout_secs: 0.1,
        ..AutodetectConfig::default()
    })
}

fn instant_acquirer() -> SampleAcquirer {
    SampleAcquirer::new(Duration::ZERO, CancelToken::new())
}

fn inav_stock() -> BatteryConfig {
    BatteryConfig {
        voltage: VoltageSensorConfig {
            scale: 1100,
            cells: 4,
            ..VoltageSensorConfig::default()
        },
        current: CurrentSensorConfig {
            offset: -40,
            scale: 385,
            sensor_type: 1,
        },
        capacity: 2200,
        ..BatteryConfig::default()
    }
}

#[test]
fn ardupilot_current_calibration_after_autodetect() {
    init_tracing();

    let mut mavlink = MockMavlink::new()
        .with_param("BATT_MONITOR", 4.0)
        .with_param("BATT_VOLT_MULT", 10.1)
        .with_param("BATT_AMP_PERVLT", 17.0)
        .with_param("BATT_AMP_OFFSET", 0.0);
    mavlink.push_sys_status(12_000, 100);
    mavlink.push_sys_status(12_000, 300);

    let mut connector = MockConnector::new(MockMsp::new(variant::ARDUPILOT), mavlink);
    let mut board = quick_detector().detect(&mut connector).unwrap();
    assert_eq!(board.target(), FirmwareTarget::ArduPilot);
    assert_relative_eq!(board.measurement_scale(SensorChannel::Current), 100.0);

    let mut op = ScriptedOperator::new([
        Reply::Yes,
        Reply::Number(0.5),
        Reply::Yes,
        Reply::Number(1.5),
        Reply::No,
        Reply::Yes,
    ]);
    let outcome = CurrentCalibrationSession::new(&mut board, &mut op, instant_acquirer())
        .run()
        .unwrap();

    let result = outcome.result().unwrap();
    assert!(outcome.is_written());
    assert_relative_eq!(result.coefficient(), 2.0);
    assert_relative_eq!(result.scale(), 50.0);
    assert_abs_diff_eq!(result.offset(), 0.0);
    assert_abs_diff_eq!(result.voltage_offset(), 0.0);

    let Board::ArduPilot(ardupilot) = &board else {
        panic!("expected an ArduPilot board");
    };
    assert_eq!(ardupilot.link().param("BATT_AMP_PERVLT"), Some(50.0));
    assert_eq!(ardupilot.link().param("BATT_AMP_OFFSET"), Some(0.0));
}

#[test]
fn voltage_scale_from_single_reading() {
    assert_abs_diff_eq!(voltage_scale(20.0, 12.0, 11.5), 20.8696, epsilon = 1e-4);
}

#[test]
fn inav_voltage_calibration_after_autodetect() {
    init_tracing();

    let mut msp = MockMsp::new(variant::INAV)
        .with_features(feature::VBAT)
        .with_battery_config(inav_stock());
    msp.push_analog(11.5, 0.0);

    let mut connector = MockConnector::new(msp, MockMavlink::silent());
    let mut board = quick_detector().detect(&mut connector).unwrap();
    assert_eq!(connector.opened(), &["msp"]);

    let mut op = ScriptedOperator::new([Reply::Yes, Reply::Number(12.0), Reply::Yes]);
    let outcome = VoltageCalibrationSession::new(&mut board, &mut op, instant_acquirer())
        .run()
        .unwrap();

    assert!(outcome.is_written());
    let Board::Inav(inav) = &board else {
        panic!("expected an iNav board");
    };
    let mut expected = inav_stock();
    expected.voltage.scale = 1148;
    assert_eq!(*inav.link().battery(), expected);
}

#[test]
fn cancel_in_too_few_prompt_restores_inav_block() {
    init_tracing();

    let mut msp = MockMsp::new(variant::INAV)
        .with_features(feature::VBAT | feature::CURRENT_METER)
        .with_battery_config(inav_stock());
    msp.push_analog(12.0, 2.5);
    let log = msp.call_log();
    let mut board: Board<MockMavlink, MockMsp> =
        Board::Inav(fc_hardware::InavBoard::new(msp));

    let mut op = ScriptedOperator::new([
        Reply::Yes,
        Reply::Number(1.0),
        Reply::No,
        Reply::Cancel,
    ]);
    let outcome = CurrentCalibrationSession::new(&mut board, &mut op, instant_acquirer())
        .run()
        .unwrap();

    assert_eq!(outcome, CalibrationOutcome::AbortedByOperator);
    let Board::Inav(inav) = &board else {
        panic!("expected an iNav board");
    };
    assert_eq!(*inav.link().battery(), inav_stock());
    assert_eq!(log.borrow().last(), Some(&MspCall::EepromWrite));
}

#[test]
fn inav_current_enable_then_calibrate() {
    init_tracing();

    let mut msp = MockMsp::new(variant::INAV)
        .with_features(feature::VBAT)
        .with_battery_config(inav_stock());
    msp.push_analog(12.0, 2.5);
    msp.push_analog(12.0, 4.5);
    let log = msp.call_log();

    let mut connector = MockConnector::new(msp, MockMavlink::silent());
    let mut board = quick_detector().detect(&mut connector).unwrap();

    let mut op = ScriptedOperator::new([
        // reboot after enabling
        Reply::Yes,
        Reply::Yes,
        Reply::Number(1.0),
        Reply::Yes,
        Reply::Number(2.0),
        Reply::No,
        Reply::Yes,
    ]);

    let err = CurrentCalibrationSession::new(&mut board, &mut op, instant_acquirer())
        .run()
        .unwrap_err();
    assert!(matches!(
        err,
        CalibrationError::SensorNotEnabled(SensorChannel::Current)
    ));

    assert!(enable_sensor(&mut board, SensorChannel::Current, &mut op).unwrap());
    assert!(log.borrow().contains(&MspCall::Reboot));

    let outcome = CurrentCalibrationSession::new(&mut board, &mut op, instant_acquirer())
        .run()
        .unwrap();
    let result = outcome.result().unwrap();
    assert_eq!(result.native_scale(), 800.0);
    assert_eq!(result.native_voltage_offset(), 200.0);
    assert_eq!(op.remaining(), 0);

    let Board::Inav(inav) = &board else {
        panic!("expected an iNav board");
    };
    assert_eq!(inav.link().battery().current.scale, 800);
    assert_eq!(inav.link().battery().current.offset, 200);
    assert_eq!(inav.link().battery().capacity, 2200);
}

#[test]
fn unsupported_firmware_stops_before_session() {
    init_tracing();

    let mut connector = MockConnector::new(MockMsp::new(variant::BETAFLIGHT), MockMavlink::new());
    let err = match quick_detector().detect(&mut connector) {
        Ok(_) => panic!("Betaflight must not be accepted"),
        Err(err) => err,
    };
    assert!(err.to_string().contains("BTFL"));
}

#[test]
fn config_drives_acquirer_and_detector() {
    let config = CalibrationConfig {
        acquisition_window_secs: 0.0,
        telemetry_rate_hz: 4.0,
        autodetect: AutodetectConfig {
            reboot_pause_secs: 0.0,
            ..AutodetectConfig::default()
        },
    };

    let acquirer = config.acquirer(CancelToken::new()).unwrap();
    assert_eq!(acquirer.window(), Duration::ZERO);
    assert_eq!(config.autodetector().config().reboot_pause_secs, 0.0);
}
