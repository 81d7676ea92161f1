//! MAVLink client boundary (ArduPilot-style boards)

use std::time::Duration;

use crate::ProtocolResult;

/// MAVLink message ids used by the calibration tooling
pub mod message_id {
    pub const HEARTBEAT: u32 = 0;
    pub const SYS_STATUS: u32 = 1;
}

/// `MAV_AUTOPILOT` values reported in HEARTBEAT
pub mod autopilot {
    pub const GENERIC: u8 = 0;
    pub const ARDUPILOTMEGA: u8 = 3;
    pub const PX4: u8 = 12;
}

/// `current_battery` value meaning the autopilot does not measure current
pub const CURRENT_UNKNOWN: i16 = -1;

/// Decoded HEARTBEAT fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    /// `MAV_AUTOPILOT` of the sender
    pub autopilot: u8,
    /// `MAV_TYPE` of the sender
    pub vehicle_type: u8,
    pub system_id: u8,
    pub component_id: u8,
}

/// Battery fields of SYS_STATUS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysStatus {
    /// Battery voltage in millivolts
    pub voltage_mv: u16,
    /// Battery current in centiamps, [`CURRENT_UNKNOWN`] if not measured
    pub current_ca: i16,
}

/// Blocking MAVLink client bound to one autopilot.
pub trait MavlinkLink {
    /// Wait for the next HEARTBEAT from the autopilot.
    fn wait_heartbeat(&mut self, timeout: Duration) -> ProtocolResult<Heartbeat>;

    /// Read a parameter (PARAM_REQUEST_READ / PARAM_VALUE).
    fn param_get(&mut self, name: &str) -> ProtocolResult<f32>;

    /// Write a parameter and wait for the echoed PARAM_VALUE.
    fn param_set(&mut self, name: &str, value: f32) -> ProtocolResult<()>;

    /// Ask the autopilot to stream a message at a fixed rate
    /// (MAV_CMD_SET_MESSAGE_INTERVAL).
    fn set_message_interval(&mut self, message_id: u32, rate_hz: f32) -> ProtocolResult<()>;

    /// Block until the next SYS_STATUS arrives.
    fn wait_sys_status(&mut self) -> ProtocolResult<SysStatus>;

    /// Send MAV_CMD_PREFLIGHT_REBOOT_SHUTDOWN. Returns once the command is
    /// acknowledged; the link is silent until the autopilot is back up.
    fn reboot(&mut self) -> ProtocolResult<()>;
}

impl<L: MavlinkLink + ?Sized> MavlinkLink for Box<L> {
    fn wait_heartbeat(&mut self, timeout: Duration) -> ProtocolResult<Heartbeat> {
        (**self).wait_heartbeat(timeout)
    }

    fn param_get(&mut self, name: &str) -> ProtocolResult<f32> {
        (**self).param_get(name)
    }

    fn param_set(&mut self, name: &str, value: f32) -> ProtocolResult<()> {
        (**self).param_set(name, value)
    }

    fn set_message_interval(&mut self, message_id: u32, rate_hz: f32) -> ProtocolResult<()> {
        (**self).set_message_interval(message_id, rate_hz)
    }

    fn wait_sys_status(&mut self) -> ProtocolResult<SysStatus> {
        (**self).wait_sys_status()
    }

    fn reboot(&mut self) -> ProtocolResult<()> {
        (**self).reboot()
    }
}
