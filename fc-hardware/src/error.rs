use fc_link::ProtocolError;
use thiserror::Error;

use crate::SensorChannel;

#[derive(Error, Debug)]
pub enum FirmwareError {
    /// Passed through from the protocol client untouched
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("cannot enable {channel} sensing from BATT_MONITOR={mode}")]
    IllegalMonitorState { channel: SensorChannel, mode: u8 },

    #[error("flight controller reports no {0} telemetry")]
    TelemetryUnavailable(SensorChannel),

    #[error("{field} value {value} does not fit the firmware's native range")]
    ValueOutOfRange { field: &'static str, value: f64 },

    #[error("unsupported flight controller firmware: {0}")]
    UnsupportedFirmware(String),

    #[error("firmware autodetection failed: no supported protocol answered")]
    AutodetectFailed,
}

impl FirmwareError {
    /// The underlying protocol error, if this is one.
    pub fn protocol(&self) -> Option<&ProtocolError> {
        match self {
            FirmwareError::Protocol(err) => Some(err),
            _ => None,
        }
    }
}

pub type FirmwareResult<T> = Result<T, FirmwareError>;
