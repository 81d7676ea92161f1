//! Flight-controller protocol boundary
//!
//! This crate describes the two serial protocols spoken by the supported
//! flight controllers at the level the calibration tooling needs them:
//!
//! - **MAVLink** ([`MavlinkLink`]): parameter get/set, message-rate
//!   subscription, blocking wait for `SYS_STATUS`, reboot.
//! - **MSP** ([`MspLink`]): firmware variant query, battery config block,
//!   feature flags, analog readings, EEPROM write, reboot.
//!
//! Framing, checksums and the serial transport live in the protocol
//! implementations behind these traits. Every call fails with a
//! [`ProtocolError`] whose kind (not message text) tells callers whether the
//! failure is transient.

mod connector;
mod error;
mod mavlink;
pub mod mock;
mod msp;

pub use connector::Connector;
pub use error::{ProtocolError, ProtocolResult};
pub use mavlink::{autopilot, message_id, Heartbeat, MavlinkLink, SysStatus, CURRENT_UNKNOWN};
pub use msp::{
    feature, variant, AnalogReading, BatteryConfig, CurrentSensorConfig, MspLink,
    VoltageSensorConfig,
};
