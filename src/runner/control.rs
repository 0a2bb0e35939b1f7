use crate::error::RunError;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Pause and stop signals for one run.
///
/// Both are checked only at step boundaries; an in-flight browser action is
/// never interrupted.
#[derive(Debug)]
pub struct RunControl {
    paused: watch::Sender<bool>,
    cancel: CancellationToken,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused,
            cancel: CancellationToken::new(),
        }
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait out a pause; fails once stop has been requested
    pub async fn checkpoint(&self) -> Result<(), RunError> {
        let mut paused = self.paused.subscribe();
        loop {
            if self.cancel.is_cancelled() {
                return Err(RunError::UserCancelled);
            }
            if !*paused.borrow_and_update() {
                return Ok(());
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(RunError::UserCancelled),
                changed = paused.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Sleep that ends early on stop
    pub async fn sleep(&self, duration: Duration) -> Result<(), RunError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(RunError::UserCancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
