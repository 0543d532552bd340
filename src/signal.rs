//! One-shot completion signal

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::{Error, Result};

/// A flag that goes from unset to set exactly once and wakes every waiter
///
/// Clones share the same flag. Once set it stays set.
#[derive(Clone, Debug)]
pub struct CompletionSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl CompletionSignal {
    /// Create an unset signal
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Set the flag and release all current and future waiters
    ///
    /// Setting an already set signal does nothing.
    pub fn signal(&self) {
        self.tx.send_if_modified(|set| !std::mem::replace(set, true));
    }

    /// Whether the flag is set
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the flag is set
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|set| *set).await;
    }

    /// Wait until the flag is set or `timeout` elapses
    ///
    /// Returns immediately if already set, whatever the timeout. Fails with
    /// [`Error::Timeout`] otherwise.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        if self.is_set() {
            return Ok(());
        }
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| Error::Timeout)
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}
