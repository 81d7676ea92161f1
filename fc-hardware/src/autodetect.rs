//! Firmware autodetection on an unknown serial connection
//!
//! MSP is tried first because iNav answers it directly. ArduPilot also speaks
//! MSP (identity `ARDU`), but only the MAVLink side exposes the battery
//! parameters, so it is rebooted out of the MSP session and probed again over
//! MAVLink.

use std::time::Duration;

use fc_link::{autopilot, variant, Connector, MavlinkLink, MspLink};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    ArduPilotBoard, Board, FirmwareError, FirmwareResult, InavBoard, DEFAULT_TELEMETRY_RATE_HZ,
};

fn default_msp_attempts() -> u32 {
    4
}

fn default_reboot_pause_secs() -> f64 {
    2.0
}

fn default_heartbeat_timeout_secs() -> f64 {
    5.0
}

/// Tunables for [`FirmwareAutodetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutodetectConfig {
    /// `FC_VARIANT` attempts before giving up on MSP
    #[serde(default = "default_msp_attempts")]
    pub msp_attempts: u32,

    /// Pause after rebooting an ArduPilot board out of MSP
    #[serde(default = "default_reboot_pause_secs")]
    pub reboot_pause_secs: f64,

    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: f64,
}

impl Default for AutodetectConfig {
    fn default() -> Self {
        Self {
            msp_attempts: default_msp_attempts(),
            reboot_pause_secs: default_reboot_pause_secs(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
        }
    }
}

/// Negative and NaN values clamp to zero, overflow saturates.
fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

impl AutodetectConfig {
    fn reboot_pause(&self) -> Duration {
        seconds(self.reboot_pause_secs)
    }

    fn heartbeat_timeout(&self) -> Duration {
        seconds(self.heartbeat_timeout_secs)
    }
}

/// Outcome of the MSP handshake.
enum MspProbe<P> {
    Inav(P),
    /// ArduPilot answered and was rebooted; the MSP client is gone.
    ArduPilotRebooted,
    Silent,
}

/// Decides which firmware family is on the other end of a connection.
#[derive(Debug, Clone)]
pub struct FirmwareAutodetector {
    config: AutodetectConfig,
    telemetry_rate_hz: f32,
}

impl FirmwareAutodetector {
    pub fn new(config: AutodetectConfig) -> Self {
        Self {
            config,
            telemetry_rate_hz: DEFAULT_TELEMETRY_RATE_HZ,
        }
    }

    /// `SYS_STATUS` rate handed to a detected ArduPilot board.
    pub fn with_telemetry_rate(mut self, rate_hz: f32) -> Self {
        self.telemetry_rate_hz = rate_hz;
        self
    }

    pub fn config(&self) -> &AutodetectConfig {
        &self.config
    }

    /// Probe the connection and return the matching board driver.
    pub fn detect<C: Connector>(
        &self,
        connector: &mut C,
    ) -> FirmwareResult<Board<C::Mavlink, C::Msp>> {
        match self.probe_msp(connector)? {
            MspProbe::Inav(link) => {
                info!("Detected iNav over MSP");
                return Ok(Board::Inav(InavBoard::new(link)));
            }
            MspProbe::ArduPilotRebooted => {
                info!("ArduPilot answered MSP, switching to MAVLink");
            }
            MspProbe::Silent => {
                info!("No MSP response, trying MAVLink");
            }
        }

        self.probe_mavlink(connector)
    }

    fn probe_msp<C: Connector>(&self, connector: &mut C) -> FirmwareResult<MspProbe<C::Msp>> {
        let mut link = connector.open_msp()?;
        let attempts = self.config.msp_attempts.max(1);

        for attempt in 1..=attempts {
            match link.fc_variant() {
                Ok(id) if id == variant::INAV => return Ok(MspProbe::Inav(link)),
                Ok(id) if id == variant::ARDUPILOT => {
                    // Reboot without resuming; the MSP session is abandoned
                    if let Err(err) = link.reboot() {
                        warn!("Reboot request to ArduPilot failed: {err}");
                    }
                    drop(link);
                    std::thread::sleep(self.config.reboot_pause());
                    return Ok(MspProbe::ArduPilotRebooted);
                }
                Ok(id) => {
                    let name = String::from_utf8_lossy(&id).into_owned();
                    warn!("Flight controller reports unsupported firmware {name:?}");
                    return Err(FirmwareError::UnsupportedFirmware(name));
                }
                Err(err) if err.is_transient() => {
                    debug!("MSP identity attempt {attempt}/{attempts} failed: {err}");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(MspProbe::Silent)
    }

    fn probe_mavlink<C: Connector>(
        &self,
        connector: &mut C,
    ) -> FirmwareResult<Board<C::Mavlink, C::Msp>> {
        let mut link = connector.open_mavlink()?;

        match link.wait_heartbeat(self.config.heartbeat_timeout()) {
            Ok(heartbeat) if heartbeat.autopilot == autopilot::ARDUPILOTMEGA => {
                info!(
                    "Detected ArduPilot (system {}, component {})",
                    heartbeat.system_id, heartbeat.component_id
                );
                let board = ArduPilotBoard::new(link).with_telemetry_rate(self.telemetry_rate_hz);
                Ok(Board::ArduPilot(board))
            }
            Ok(heartbeat) => Err(FirmwareError::UnsupportedFirmware(format!(
                "MAV_AUTOPILOT {}",
                heartbeat.autopilot
            ))),
            Err(err) if err.is_transient() => {
                warn!("No MAVLink heartbeat: {err}");
                Err(FirmwareError::AutodetectFailed)
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl Default for FirmwareAutodetector {
    fn default() -> Self {
        Self::new(AutodetectConfig::default())
    }
}
