//! ArduPilot battery monitor driver
//!
//! ArduPilot keeps the analog battery monitor calibration in independent
//! scalar parameters:
//!
//! - `BATT_MONITOR`: sensing mode (0 off, 3 voltage only, 4 voltage and current)
//! - `BATT_VOLT_MULT`: voltage divider multiplier (V/V)
//! - `BATT_AMP_PERVLT`: current sensor scale (A/V)
//! - `BATT_AMP_OFFSET`: current sensor zero offset (V)
//!
//! Parameter writes are persisted by the autopilot immediately. Live readings
//! come from `SYS_STATUS`, which has to be requested at a fixed rate before
//! the first wait and again after every reboot.

use std::time::Duration;

use fc_link::{autopilot, message_id, MavlinkLink, CURRENT_UNKNOWN};
use tracing::{debug, info};

use crate::{
    FirmwareError, FirmwareInterface, FirmwareResult, FirmwareTarget, RawOffsetScale,
    SensorChannel,
};

/// `SYS_STATUS` stream rate requested before sampling.
pub const DEFAULT_TELEMETRY_RATE_HZ: f32 = 10.0;

/// How long to wait for the first heartbeat after a reboot.
const REBOOT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(15);

/// `BATT_AMP_PERVLT` used while sampling raw current (A/V).
const CURRENT_MEASUREMENT_SCALE: f64 = 100.0;

/// `BATT_VOLT_MULT` used while sampling raw voltage.
const VOLTAGE_MEASUREMENT_SCALE: f64 = 10.0;

mod param {
    pub const MONITOR: &str = "BATT_MONITOR";
    pub const VOLT_MULT: &str = "BATT_VOLT_MULT";
    pub const AMP_PERVLT: &str = "BATT_AMP_PERVLT";
    pub const AMP_OFFSET: &str = "BATT_AMP_OFFSET";
}

/// `BATT_MONITOR` modes relevant to analog sensing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryMonitor {
    Disabled,
    AnalogVoltage,
    AnalogVoltageCurrent,
    /// Any other monitor backend (SMBus, ESC telemetry, ...)
    Other(u8),
}

impl BatteryMonitor {
    pub fn from_value(value: u8) -> Self {
        match value {
            0 => BatteryMonitor::Disabled,
            3 => BatteryMonitor::AnalogVoltage,
            4 => BatteryMonitor::AnalogVoltageCurrent,
            other => BatteryMonitor::Other(other),
        }
    }

    fn from_param(value: f32) -> Self {
        Self::from_value(value.round().clamp(0.0, u8::MAX as f32) as u8)
    }

    pub fn value(self) -> u8 {
        match self {
            BatteryMonitor::Disabled => 0,
            BatteryMonitor::AnalogVoltage => 3,
            BatteryMonitor::AnalogVoltageCurrent => 4,
            BatteryMonitor::Other(value) => value,
        }
    }

    /// Whether this mode samples `channel` through the analog pins.
    pub fn measures(self, channel: SensorChannel) -> bool {
        match channel {
            SensorChannel::Voltage => matches!(
                self,
                BatteryMonitor::AnalogVoltage | BatteryMonitor::AnalogVoltageCurrent
            ),
            SensorChannel::Current => self == BatteryMonitor::AnalogVoltageCurrent,
        }
    }

    /// Mode to switch to so that `channel` is measured, if reachable from `self`.
    fn enabling(self, channel: SensorChannel) -> Option<Self> {
        match (channel, self) {
            (SensorChannel::Current, BatteryMonitor::Disabled | BatteryMonitor::AnalogVoltage) => {
                Some(BatteryMonitor::AnalogVoltageCurrent)
            }
            (SensorChannel::Voltage, BatteryMonitor::Disabled) => {
                Some(BatteryMonitor::AnalogVoltage)
            }
            _ => None,
        }
    }
}

/// Battery sensor driver for ArduPilot over MAVLink.
pub struct ArduPilotBoard<L: MavlinkLink> {
    link: L,
    telemetry_rate_hz: f32,
    stream_configured: bool,
    needs_reboot: bool,
}

impl<L: MavlinkLink> ArduPilotBoard<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            telemetry_rate_hz: DEFAULT_TELEMETRY_RATE_HZ,
            stream_configured: false,
            needs_reboot: false,
        }
    }

    pub fn with_telemetry_rate(mut self, rate_hz: f32) -> Self {
        self.telemetry_rate_hz = rate_hz;
        self
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Current `BATT_MONITOR` mode.
    pub fn monitor(&mut self) -> FirmwareResult<BatteryMonitor> {
        let value = self.link.param_get(param::MONITOR)?;
        Ok(BatteryMonitor::from_param(value))
    }

    fn get(&mut self, name: &str) -> FirmwareResult<f64> {
        Ok(self.link.param_get(name)? as f64)
    }

    fn set(&mut self, name: &str, value: f64) -> FirmwareResult<()> {
        debug!("Setting {name} = {value}");
        self.link.param_set(name, value as f32)?;
        Ok(())
    }

    /// Request the SYS_STATUS stream once per boot.
    fn ensure_stream(&mut self) -> FirmwareResult<()> {
        if !self.stream_configured {
            info!(
                "Requesting SYS_STATUS at {:.1} Hz",
                self.telemetry_rate_hz
            );
            self.link
                .set_message_interval(message_id::SYS_STATUS, self.telemetry_rate_hz)?;
            self.stream_configured = true;
        }
        Ok(())
    }
}

impl<L: MavlinkLink> FirmwareInterface for ArduPilotBoard<L> {
    fn target(&self) -> FirmwareTarget {
        FirmwareTarget::ArduPilot
    }

    fn is_channel_enabled(&mut self, channel: SensorChannel) -> FirmwareResult<bool> {
        Ok(self.monitor()?.measures(channel))
    }

    fn enable_channel(&mut self, channel: SensorChannel) -> FirmwareResult<()> {
        let mode = self.monitor()?;
        if mode.measures(channel) {
            debug!("{channel} sensing already enabled (BATT_MONITOR={})", mode.value());
            return Ok(());
        }

        let next = mode
            .enabling(channel)
            .ok_or(FirmwareError::IllegalMonitorState {
                channel,
                mode: mode.value(),
            })?;

        info!(
            "Enabling {channel} sensing: BATT_MONITOR {} -> {}",
            mode.value(),
            next.value()
        );
        self.set(param::MONITOR, next.value() as f64)?;
        self.needs_reboot = true;
        Ok(())
    }

    fn needs_reboot(&self) -> bool {
        self.needs_reboot
    }

    fn reboot(&mut self) -> FirmwareResult<()> {
        info!("Rebooting autopilot...");
        self.link.reboot()?;
        self.stream_configured = false;

        let heartbeat = self.link.wait_heartbeat(REBOOT_HEARTBEAT_TIMEOUT)?;
        if heartbeat.autopilot != autopilot::ARDUPILOTMEGA {
            return Err(FirmwareError::UnsupportedFirmware(format!(
                "MAV_AUTOPILOT {} after reboot",
                heartbeat.autopilot
            )));
        }

        self.needs_reboot = false;
        info!("Autopilot is back");
        Ok(())
    }

    fn prepare_calibration(&mut self, channel: SensorChannel) -> FirmwareResult<()> {
        let scale = self.measurement_scale(channel);
        self.set_offset_and_scale(channel, RawOffsetScale::new(0.0, scale))
    }

    fn sample_raw(&mut self, channel: SensorChannel) -> FirmwareResult<f64> {
        self.ensure_stream()?;
        let status = self.link.wait_sys_status()?;

        match channel {
            SensorChannel::Voltage => Ok(status.voltage_mv as f64 / 1000.0),
            SensorChannel::Current if status.current_ca == CURRENT_UNKNOWN => {
                Err(FirmwareError::TelemetryUnavailable(channel))
            }
            SensorChannel::Current => Ok(status.current_ca as f64 / 100.0),
        }
    }

    fn offset_and_scale(&mut self, channel: SensorChannel) -> FirmwareResult<RawOffsetScale> {
        match channel {
            SensorChannel::Voltage => Ok(RawOffsetScale::new(0.0, self.get(param::VOLT_MULT)?)),
            SensorChannel::Current => Ok(RawOffsetScale::new(
                self.get(param::AMP_OFFSET)?,
                self.get(param::AMP_PERVLT)?,
            )),
        }
    }

    fn set_offset_and_scale(
        &mut self,
        channel: SensorChannel,
        values: RawOffsetScale,
    ) -> FirmwareResult<()> {
        match channel {
            // No voltage offset parameter exists
            SensorChannel::Voltage => self.set(param::VOLT_MULT, values.scale),
            SensorChannel::Current => {
                self.set(param::AMP_OFFSET, values.offset)?;
                self.set(param::AMP_PERVLT, values.scale)
            }
        }
    }

    fn measurement_scale(&self, channel: SensorChannel) -> f64 {
        match channel {
            SensorChannel::Voltage => VOLTAGE_MEASUREMENT_SCALE,
            SensorChannel::Current => CURRENT_MEASUREMENT_SCALE,
        }
    }

    fn persist(&mut self) -> FirmwareResult<()> {
        // PARAM_SET is stored by the autopilot as soon as it is acknowledged
        Ok(())
    }
}
