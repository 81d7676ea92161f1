//! iNav battery sensor driver
//!
//! iNav stores both sensor calibrations in one composite block
//! (`MSP2_INAV_BATTERY_CONFIG`). The protocol has no partial writes, so every
//! change is a read-modify-write of the whole block. Values are fixed-point
//! integers:
//!
//! - voltage scale: unitless ADC multiplier
//! - current scale: 0.1 mV/A
//! - current offset: 0.1 mV
//!
//! Sensors are switched on through feature flags, which take effect after an
//! EEPROM write and a reboot.

use std::time::Duration;

use fc_link::{feature, variant, BatteryConfig, MspLink};
use tracing::{debug, info, warn};

use crate::{
    FirmwareError, FirmwareInterface, FirmwareResult, FirmwareTarget, RawOffsetScale,
    SensorChannel,
};

/// Fixed-point steps per volt (0.1 mV resolution).
pub const NATIVE_UNITS_PER_VOLT: f64 = 10_000.0;

/// Current sensor scale used while sampling raw current (V/A).
const CURRENT_MEASUREMENT_SCALE: f64 = 0.04;

/// Voltage scale used while sampling raw voltage (native).
const VOLTAGE_MEASUREMENT_SCALE: f64 = 1100.0;

const REBOOT_POLL_ATTEMPTS: usize = 30;
const REBOOT_POLL_INTERVAL: Duration = Duration::from_millis(500);

fn feature_flag(channel: SensorChannel) -> u32 {
    match channel {
        SensorChannel::Voltage => feature::VBAT,
        SensorChannel::Current => feature::CURRENT_METER,
    }
}

/// Round `value` into the integer type of a config block field.
fn to_native<T: TryFrom<i64>>(field: &'static str, value: f64) -> FirmwareResult<T> {
    let rounded = value.round();
    if !rounded.is_finite() {
        return Err(FirmwareError::ValueOutOfRange { field, value });
    }
    T::try_from(rounded as i64).map_err(|_| FirmwareError::ValueOutOfRange { field, value })
}

/// Battery sensor driver for iNav over MSP.
pub struct InavBoard<L: MspLink> {
    link: L,
    needs_reboot: bool,
}

impl<L: MspLink> InavBoard<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            needs_reboot: false,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Read the battery config block, apply `edit`, and write it back whole.
    fn modify_battery_config<F>(&mut self, edit: F) -> FirmwareResult<()>
    where
        F: FnOnce(&mut BatteryConfig) -> FirmwareResult<()>,
    {
        let mut config = self.link.battery_config()?;
        edit(&mut config)?;
        self.link.set_battery_config(&config)?;
        Ok(())
    }
}

impl<L: MspLink> FirmwareInterface for InavBoard<L> {
    fn target(&self) -> FirmwareTarget {
        FirmwareTarget::Inav
    }

    fn is_channel_enabled(&mut self, channel: SensorChannel) -> FirmwareResult<bool> {
        Ok(self.link.features()? & feature_flag(channel) != 0)
    }

    fn enable_channel(&mut self, channel: SensorChannel) -> FirmwareResult<()> {
        let mask = self.link.features()?;
        let flag = feature_flag(channel);
        if mask & flag != 0 {
            debug!("{channel} feature already enabled");
            return Ok(());
        }

        info!("Enabling {channel} feature (mask 0x{mask:08X} -> 0x{:08X})", mask | flag);
        self.link.set_features(mask | flag)?;
        self.link.eeprom_write()?;
        self.needs_reboot = true;
        Ok(())
    }

    fn needs_reboot(&self) -> bool {
        self.needs_reboot
    }

    fn reboot(&mut self) -> FirmwareResult<()> {
        info!("Rebooting flight controller...");
        self.link.reboot()?;

        for attempt in 1..=REBOOT_POLL_ATTEMPTS {
            match self.link.fc_variant() {
                Ok(id) if id == variant::INAV => {
                    self.needs_reboot = false;
                    info!("Flight controller is back");
                    return Ok(());
                }
                Ok(id) => {
                    return Err(FirmwareError::UnsupportedFirmware(
                        String::from_utf8_lossy(&id).into_owned(),
                    ));
                }
                Err(err) if err.is_transient() => {
                    debug!("Waiting for flight controller (attempt {attempt}): {err}");
                    std::thread::sleep(REBOOT_POLL_INTERVAL);
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!("Flight controller did not come back after reboot");
        Err(fc_link::ProtocolError::Timeout("MSP_FC_VARIANT after reboot").into())
    }

    fn prepare_calibration(&mut self, channel: SensorChannel) -> FirmwareResult<()> {
        let scale = match channel {
            SensorChannel::Voltage => VOLTAGE_MEASUREMENT_SCALE,
            SensorChannel::Current => CURRENT_MEASUREMENT_SCALE * NATIVE_UNITS_PER_VOLT,
        };
        self.set_offset_and_scale(channel, RawOffsetScale::new(0.0, scale))
    }

    fn sample_raw(&mut self, channel: SensorChannel) -> FirmwareResult<f64> {
        let reading = self.link.analog()?;
        Ok(match channel {
            SensorChannel::Voltage => reading.voltage,
            SensorChannel::Current => reading.current,
        })
    }

    fn offset_and_scale(&mut self, channel: SensorChannel) -> FirmwareResult<RawOffsetScale> {
        let config = self.link.battery_config()?;
        Ok(match channel {
            SensorChannel::Voltage => RawOffsetScale::new(0.0, config.voltage.scale as f64),
            SensorChannel::Current => RawOffsetScale::new(
                config.current.offset as f64,
                config.current.scale as f64,
            ),
        })
    }

    fn set_offset_and_scale(
        &mut self,
        channel: SensorChannel,
        values: RawOffsetScale,
    ) -> FirmwareResult<()> {
        debug!(
            "Writing {channel} offset={} scale={} to battery config",
            values.offset, values.scale
        );
        self.modify_battery_config(|config| {
            match channel {
                SensorChannel::Voltage => {
                    config.voltage.scale = to_native("voltage scale", values.scale)?;
                }
                SensorChannel::Current => {
                    config.current.offset = to_native("current offset", values.offset)?;
                    config.current.scale = to_native("current scale", values.scale)?;
                }
            }
            Ok(())
        })
    }

    fn measurement_scale(&self, channel: SensorChannel) -> f64 {
        match channel {
            SensorChannel::Voltage => VOLTAGE_MEASUREMENT_SCALE,
            SensorChannel::Current => CURRENT_MEASUREMENT_SCALE,
        }
    }

    fn persist(&mut self) -> FirmwareResult<()> {
        info!("Saving configuration to EEPROM");
        self.link.eeprom_write()?;
        Ok(())
    }
}
