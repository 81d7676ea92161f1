//! Flight-controller battery sensor drivers
//!
//! Exposes one capability set, [`FirmwareInterface`], over two structurally
//! different firmware families:
//!
//! - [`ArduPilotBoard`]: MAVLink parameters (`BATT_*`) and the `SYS_STATUS`
//!   telemetry stream.
//! - [`InavBoard`]: MSP feature flags and the composite battery config block.
//!
//! [`FirmwareAutodetector`] probes an unknown serial connection and returns the
//! matching driver wrapped in the closed [`Board`] enum.

mod ardupilot;
mod autodetect;
mod board;
mod error;
mod inav;
mod interface;

pub use ardupilot::{ArduPilotBoard, BatteryMonitor, DEFAULT_TELEMETRY_RATE_HZ};
pub use autodetect::{AutodetectConfig, FirmwareAutodetector};
pub use board::Board;
pub use error::{FirmwareError, FirmwareResult};
pub use inav::{InavBoard, NATIVE_UNITS_PER_VOLT};
pub use interface::{FirmwareInterface, FirmwareTarget, RawOffsetScale, SensorChannel};
