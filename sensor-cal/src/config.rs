//! Calibration settings
//!
//! Stored as JSON, by default in `~/.fc_sensor_cal/config.json`. Every field
//! has a default, so a partial or missing file is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use fc_hardware::{AutodetectConfig, FirmwareAutodetector, DEFAULT_TELEMETRY_RATE_HZ};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{CancelToken, SampleAcquirer};

const CONFIG_DIR: &str = ".fc_sensor_cal";
const CONFIG_FILE: &str = "config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("HOME not set, cannot locate config directory")]
    NoHome,

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

fn default_acquisition_window_secs() -> f64 {
    5.0
}

fn default_telemetry_rate_hz() -> f32 {
    DEFAULT_TELEMETRY_RATE_HZ
}

fn seconds(field: &str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        ConfigError::Invalid(format!(
            "{field} must be a non-negative number of seconds, got {secs}"
        ))
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// How long each averaged sample is acquired for
    #[serde(default = "default_acquisition_window_secs")]
    pub acquisition_window_secs: f64,

    /// `SYS_STATUS` rate requested from ArduPilot boards
    #[serde(default = "default_telemetry_rate_hz")]
    pub telemetry_rate_hz: f32,

    #[serde(default)]
    pub autodetect: AutodetectConfig,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            acquisition_window_secs: default_acquisition_window_secs(),
            telemetry_rate_hz: default_telemetry_rate_hz(),
            autodetect: AutodetectConfig::default(),
        }
    }
}

impl CalibrationConfig {
    /// `~/.fc_sensor_cal/config.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = std::env::var_os("HOME").ok_or(ConfigError::NoHome)?;
        Ok(PathBuf::from(home).join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }

    /// Creates the parent directory if needed.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.acquisition_window()?;
        seconds("autodetect.reboot_pause_secs", self.autodetect.reboot_pause_secs)?;
        seconds(
            "autodetect.heartbeat_timeout_secs",
            self.autodetect.heartbeat_timeout_secs,
        )?;
        if !(self.telemetry_rate_hz.is_finite() && self.telemetry_rate_hz > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "telemetry_rate_hz must be positive, got {}",
                self.telemetry_rate_hz
            )));
        }
        if self.autodetect.msp_attempts == 0 {
            return Err(ConfigError::Invalid(
                "autodetect.msp_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn acquisition_window(&self) -> Result<Duration, ConfigError> {
        seconds("acquisition_window_secs", self.acquisition_window_secs)
    }

    pub fn acquirer(&self, cancel: CancelToken) -> Result<SampleAcquirer, ConfigError> {
        Ok(SampleAcquirer::new(self.acquisition_window()?, cancel))
    }

    pub fn autodetector(&self) -> FirmwareAutodetector {
        FirmwareAutodetector::new(self.autodetect.clone()).with_telemetry_rate(self.telemetry_rate_hz)
    }
}
