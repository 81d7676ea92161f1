//! Firmware-independent battery sensor capability set

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::FirmwareResult;

/// Firmware family running on the flight controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
pub enum FirmwareTarget {
    #[strum(to_string = "ArduPilot")]
    ArduPilot,
    #[strum(to_string = "iNav")]
    Inav,
}

/// Battery sensor being calibrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum SensorChannel {
    Voltage,
    Current,
}

/// Offset and scale as stored on the board, in the firmware's native units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawOffsetScale {
    pub offset: f64,
    pub scale: f64,
}

impl RawOffsetScale {
    pub fn new(offset: f64, scale: f64) -> Self {
        Self { offset, scale }
    }
}

/// Battery sensor access on a connected flight controller.
///
/// Protocol failures are returned as [`FirmwareError::Protocol`](crate::FirmwareError::Protocol)
/// without retries; callers decide whether to retry or abort.
pub trait FirmwareInterface {
    /// Firmware family behind this interface.
    fn target(&self) -> FirmwareTarget;

    /// Whether the board currently measures `channel`.
    fn is_channel_enabled(&mut self, channel: SensorChannel) -> FirmwareResult<bool>;

    /// Turn on sensing for `channel`.
    ///
    /// May leave [`needs_reboot`](Self::needs_reboot) set; the board must be
    /// rebooted before the sensor can be calibrated.
    fn enable_channel(&mut self, channel: SensorChannel) -> FirmwareResult<()>;

    /// Whether a configuration change is waiting for a reboot.
    fn needs_reboot(&self) -> bool;

    /// Reboot the board and resume the connection.
    fn reboot(&mut self) -> FirmwareResult<()>;

    /// Reset the stored offset to zero and the scale to the
    /// [`measurement_scale`](Self::measurement_scale), so subsequent samples
    /// are raw and not shaped by a previous calibration.
    fn prepare_calibration(&mut self, channel: SensorChannel) -> FirmwareResult<()>;

    /// One instantaneous reading (volts or amps). May block until the next
    /// telemetry update. Never averages.
    fn sample_raw(&mut self, channel: SensorChannel) -> FirmwareResult<f64>;

    /// Stored calibration for `channel`, native units.
    fn offset_and_scale(&mut self, channel: SensorChannel) -> FirmwareResult<RawOffsetScale>;

    /// Overwrite the stored calibration for `channel`, native units.
    fn set_offset_and_scale(
        &mut self,
        channel: SensorChannel,
        values: RawOffsetScale,
    ) -> FirmwareResult<()>;

    /// Fixed conversion constant used while sampling raw values, expressed in
    /// the physical units the calculator works in. Always positive.
    fn measurement_scale(&self, channel: SensorChannel) -> f64;

    /// Commit pending configuration to non-volatile storage.
    fn persist(&mut self) -> FirmwareResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_display_names() {
        assert_eq!(SensorChannel::Voltage.to_string(), "voltage");
        assert_eq!(SensorChannel::Current.to_string(), "current");
        assert_eq!(FirmwareTarget::ArduPilot.to_string(), "ArduPilot");
        assert_eq!(FirmwareTarget::Inav.to_string(), "iNav");
    }

    #[test]
    fn test_channel_iteration_order() {
        let channels: Vec<_> = SensorChannel::iter().collect();
        assert_eq!(channels, vec![SensorChannel::Voltage, SensorChannel::Current]);
    }

    #[test]
    fn test_target_serde_names() {
        let json = serde_json::to_string(&FirmwareTarget::Inav).unwrap();
        assert_eq!(json, "\"Inav\"");
        let back: FirmwareTarget = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FirmwareTarget::Inav);
    }
}
