//! Operator cancellation
//!
//! Ctrl-C never unwinds the workflow. The interrupt handler only sets a flag;
//! the acquirer and the session poll and consume it at each blocking
//! boundary, so a single interrupt cancels exactly one wait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the current wait.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Consume a pending cancellation. Returns true at most once per
    /// [`cancel`](Self::cancel).
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Set this token on every Ctrl-C for the rest of the process.
    ///
    /// The signal is awaited on a dedicated thread running a current-thread
    /// tokio runtime, so callers stay fully synchronous.
    pub fn install_ctrl_c_handler(&self) -> std::io::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let token = self.clone();

        thread::Builder::new()
            .name("ctrl-c".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    loop {
                        match tokio::signal::ctrl_c().await {
                            Ok(()) => {
                                debug!("Ctrl-C received");
                                token.cancel();
                            }
                            Err(e) => {
                                warn!("Failed to listen for Ctrl-C: {e}");
                                break;
                            }
                        }
                    }
                });
            })?;

        Ok(())
    }
}
