//! MSP client boundary (iNav-style boards)

use crate::ProtocolResult;

/// `MSP_FC_VARIANT` identifiers
pub mod variant {
    pub const INAV: [u8; 4] = *b"INAV";
    pub const ARDUPILOT: [u8; 4] = *b"ARDU";
    pub const BETAFLIGHT: [u8; 4] = *b"BTFL";
}

/// Feature flag bits of `MSP_FEATURE` / `MSP_SET_FEATURE`
pub mod feature {
    pub const VBAT: u32 = 1 << 1;
    pub const CURRENT_METER: u32 = 1 << 11;
}

/// Voltage part of the battery config block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoltageSensorConfig {
    /// ADC-to-voltage scale (native, unitless)
    pub scale: u16,
    pub source: u8,
    pub cells: u8,
    /// Per-cell thresholds in 0.01 V
    pub cell_detect: u16,
    pub cell_min: u16,
    pub cell_max: u16,
    pub cell_warning: u16,
}

/// Current part of the battery config block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CurrentSensorConfig {
    /// Sensor zero offset, 0.1 mV
    pub offset: i16,
    /// Sensor scale, 0.1 mV/A
    pub scale: i16,
    pub sensor_type: u8,
}

/// `MSP2_INAV_BATTERY_CONFIG` payload.
///
/// The firmware only accepts this block as a whole: every write must carry
/// all fields, including the ones the caller did not mean to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatteryConfig {
    pub voltage: VoltageSensorConfig,
    pub current: CurrentSensorConfig,
    /// Battery capacity and alarm thresholds, in `capacity_unit`
    pub capacity: u32,
    pub capacity_warning: u32,
    pub capacity_critical: u32,
    pub capacity_unit: u8,
}

/// `MSP2_INAV_ANALOG` battery fields, already converted to SI units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogReading {
    /// Battery voltage in volts
    pub voltage: f64,
    /// Battery current in amps
    pub current: f64,
}

/// Blocking MSP client bound to one flight controller.
pub trait MspLink {
    /// Query `MSP_FC_VARIANT`.
    fn fc_variant(&mut self) -> ProtocolResult<[u8; 4]>;

    fn battery_config(&mut self) -> ProtocolResult<BatteryConfig>;

    fn set_battery_config(&mut self, config: &BatteryConfig) -> ProtocolResult<()>;

    /// Enabled feature bitmask
    fn features(&mut self) -> ProtocolResult<u32>;

    fn set_features(&mut self, mask: u32) -> ProtocolResult<()>;

    /// Request one fresh analog reading.
    fn analog(&mut self) -> ProtocolResult<AnalogReading>;

    /// Commit the running configuration to EEPROM.
    fn eeprom_write(&mut self) -> ProtocolResult<()>;

    /// Send `MSP_REBOOT`. Returns once the command is acknowledged.
    fn reboot(&mut self) -> ProtocolResult<()>;
}

impl<L: MspLink + ?Sized> MspLink for Box<L> {
    fn fc_variant(&mut self) -> ProtocolResult<[u8; 4]> {
        (**self).fc_variant()
    }

    fn battery_config(&mut self) -> ProtocolResult<BatteryConfig> {
        (**self).battery_config()
    }

    fn set_battery_config(&mut self, config: &BatteryConfig) -> ProtocolResult<()> {
        (**self).set_battery_config(config)
    }

    fn features(&mut self) -> ProtocolResult<u32> {
        (**self).features()
    }

    fn set_features(&mut self, mask: u32) -> ProtocolResult<()> {
        (**self).set_features(mask)
    }

    fn analog(&mut self) -> ProtocolResult<AnalogReading> {
        (**self).analog()
    }

    fn eeprom_write(&mut self) -> ProtocolResult<()> {
        (**self).eeprom_write()
    }

    fn reboot(&mut self) -> ProtocolResult<()> {
        (**self).reboot()
    }
}
