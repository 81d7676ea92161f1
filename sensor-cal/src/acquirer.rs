//! Time-boxed averaging of raw sensor readings

use std::time::{Duration, Instant};

use fc_hardware::{FirmwareError, FirmwareInterface, SensorChannel};
use thiserror::Error;
use tracing::{debug, info};

use crate::CancelToken;

#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("acquisition aborted by operator")]
    Aborted,

    #[error(transparent)]
    Firmware(#[from] FirmwareError),
}

/// Running state reported after every sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcquisitionProgress {
    pub elapsed: Duration,
    pub samples: usize,
    pub mean: f64,
}

/// Mean of one completed acquisition window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acquisition {
    pub mean: f64,
    pub samples: usize,
    pub elapsed: Duration,
}

pub type Clock = Box<dyn FnMut() -> Instant>;

/// Pulls raw readings from a board until the window has elapsed.
pub struct SampleAcquirer {
    window: Duration,
    cancel: CancelToken,
    clock: Clock,
}

impl SampleAcquirer {
    pub fn new(window: Duration, cancel: CancelToken) -> Self {
        Self {
            window,
            cancel,
            clock: Box::new(Instant::now),
        }
    }

    /// Replace the wall clock, e.g. with a simulated one in tests.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Average raw readings of `channel` over the acquisition window.
    ///
    /// At least one sample is always taken. The cancel token is consumed
    /// before and after every sample, so a cancel that arrives while the
    /// last sample is pending still aborts; everything gathered is discarded.
    pub fn acquire<B, P>(
        &mut self,
        board: &mut B,
        channel: SensorChannel,
        mut progress: P,
    ) -> Result<Acquisition, AcquireError>
    where
        B: FirmwareInterface + ?Sized,
        P: FnMut(&AcquisitionProgress),
    {
        debug!("Acquiring {channel} for {:?}", self.window);
        let start = (self.clock)();
        let mut sum = 0.0;
        let mut samples = 0usize;

        loop {
            if self.cancel.take() {
                info!("Acquisition cancelled after {samples} samples");
                return Err(AcquireError::Aborted);
            }

            sum += board.sample_raw(channel)?;
            samples += 1;
            if self.cancel.take() {
                info!("Acquisition cancelled during sample {samples}");
                return Err(AcquireError::Aborted);
            }

            let elapsed = (self.clock)().saturating_duration_since(start);
            let mean = sum / samples as f64;
            progress(&AcquisitionProgress {
                elapsed,
                samples,
                mean,
            });

            if elapsed >= self.window {
                debug!("Acquired {samples} {channel} samples, mean {mean:.4}");
                return Ok(Acquisition {
                    mean,
                    samples,
                    elapsed,
                });
            }
        }
    }
}
