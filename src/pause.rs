//! Process-wide pause barrier.
//!
//! Every worker checks the gate once per buffer. When paused, workers
//! block inside [`PauseGate::wait_while_paused`] until resumed, but stay
//! preemptible: the wait races the worker's cancellation token so a
//! paused worker can still be cancelled promptly.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{DownloadError, Result};

#[derive(Debug)]
pub struct PauseGate {
    tx: watch::Sender<bool>,
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseGate {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn pause(&self) {
        self.tx.send_replace(true);
    }

    pub fn resume(&self) {
        self.tx.send_replace(false);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.tx.borrow()
    }

    /// Block while the gate is paused.
    ///
    /// Returns `Err(Cancelled)` if the token fires first, so a paused
    /// worker never waits out a cancellation.
    pub async fn wait_while_paused(&self, cancel: &CancellationToken) -> Result<()> {
        let mut rx = self.tx.subscribe();

        while *rx.borrow_and_update() {
            tokio::select! {
                () = cancel.cancelled() => return Err(DownloadError::Cancelled),
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}
