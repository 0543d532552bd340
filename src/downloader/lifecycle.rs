//! Shutdown coordination.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::error::{Error, Result};

use super::DownloadManager;

impl DownloadManager {
    /// Stop accepting downloads, cancel running ones and wait for them
    ///
    /// Sequence:
    /// 1. New start/restart/resume calls fail with [`Error::ShuttingDown`]
    /// 2. Every active task is asked to cancel at its next chunk boundary
    /// 3. Wait up to `timeout` for those tasks to record their final state
    ///
    /// Cancelled tasks keep their data and can be resumed by a later manager.
    /// Returns [`Error::Timeout`] if some task was still running when the
    /// timeout elapsed. The executor is left running either way.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        tracing::info!("initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);

        let running: Vec<_> = self.active.lock().await.values().cloned().collect();
        tracing::debug!(active_count = running.len(), "cancelling active downloads");
        for task in &running {
            tracing::debug!(task_id = %task.id(), "signalling cancellation");
            task.cancel(true);
        }

        let all_finished = futures::future::join_all(running.iter().map(|task| task.wait()));
        match tokio::time::timeout(timeout, all_finished).await {
            Ok(_) => {
                tracing::info!("shutdown complete");
                Ok(())
            }
            Err(_) => {
                let still_active = self.active.lock().await.len();
                tracing::warn!(
                    still_active,
                    "timeout waiting for downloads to stop, proceeding with shutdown"
                );
                Err(Error::Timeout)
            }
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shutting_down(&self) -> bool {
        !self.accepting_new.load(Ordering::SeqCst)
    }
}
