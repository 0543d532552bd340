//! Download manager, split into focused submodules.
//!
//! - [`control`] - Starting, restarting, resuming and inspecting tasks
//! - [`lifecycle`] - Shutdown coordination
//! - [`task`] - The per-download handle returned to callers
//! - [`strategy`] - Fresh / restarted / resumed task behavior
//! - [`run`] - The chunked copy loop each task runs

mod control;
mod lifecycle;
mod run;
mod strategy;
mod task;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use task::DownloadTask;

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{Mutex, broadcast};

use crate::config::Config;
use crate::error::Result;
use crate::fetcher::{ByteSource, HttpFetcher};
use crate::store::{EntryStore, FileStore};
use crate::types::{ProgressInfo, TaskId};

/// Tasks currently running, keyed by id
pub(crate) type ActiveTasks = Arc<Mutex<HashMap<TaskId, DownloadTask>>>;

/// Resumable download manager (cloneable - all fields are Arc-wrapped)
///
/// Each download keeps a progress record in the task store and its bytes in
/// the data store, both under the task's id. Records outlive the process, so
/// a later manager over the same stores can list, restart or resume them.
#[derive(Clone)]
pub struct DownloadManager {
    pub(crate) task_store: Arc<dyn EntryStore>,
    pub(crate) data_store: Arc<dyn EntryStore>,
    pub(crate) source: Arc<RwLock<Arc<dyn ByteSource>>>,
    pub(crate) executor: Handle,
    pub(crate) config: Arc<Config>,
    pub(crate) event_tx: broadcast::Sender<ProgressInfo>,
    pub(crate) active: ActiveTasks,
    /// Cleared during shutdown
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl DownloadManager {
    /// Create a manager with file-backed stores under the configured
    /// directories, running tasks on the current tokio runtime
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// ```no_run
    /// use resumable_dl::{Config, DownloadManager};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let manager = DownloadManager::new(Config::default()).await?;
    ///
    ///     for id in manager.get_task_ids().await? {
    ///         println!("{id}: {:?}", manager.get_task_state(&id).await?);
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let task_store = FileStore::open(&config.persistence.task_dir).await?;
        let data_store = FileStore::open(&config.persistence.data_dir).await?;

        tracing::info!(
            task_dir = %task_store.dir().display(),
            data_dir = %data_store.dir().display(),
            "download manager opened"
        );

        Self::with_stores(
            Arc::new(task_store),
            Arc::new(data_store),
            Handle::current(),
            config,
        )
    }

    /// Create a manager over caller-supplied stores and executor
    ///
    /// The manager never shuts `executor` down; it must outlive the manager.
    pub fn with_stores(
        task_store: Arc<dyn EntryStore>,
        data_store: Arc<dyn EntryStore>,
        executor: Handle,
        config: Config,
    ) -> Result<Self> {
        config.validate()?;
        let fetcher: Arc<dyn ByteSource> = Arc::new(HttpFetcher::new(&config.download)?);
        let (event_tx, _rx) = broadcast::channel(config.download.event_buffer);

        Ok(Self {
            task_store,
            data_store,
            source: Arc::new(RwLock::new(fetcher)),
            executor,
            config: Arc::new(config),
            event_tx,
            active: Arc::new(Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Replace the byte source, builder style
    pub fn with_fetcher(self, source: Arc<dyn ByteSource>) -> Self {
        self.set_fetcher(source);
        self
    }

    /// Replace the byte source used by tasks launched from now on
    ///
    /// Tasks already running keep the source they started with.
    pub fn set_fetcher(&self, source: Arc<dyn ByteSource>) {
        *self.source.write().unwrap_or_else(PoisonError::into_inner) = source;
    }

    /// The byte source new tasks will read from
    pub fn fetcher(&self) -> Arc<dyn ByteSource> {
        Arc::clone(&self.source.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Subscribe to the progress of every task
    ///
    /// Each subscriber receives every state transition of every task, in
    /// addition to per-task listeners. A subscriber that falls more than
    /// `event_buffer` events behind receives `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressInfo> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Bytes read from the source per chunk
    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size()
    }
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("config", &self.config)
            .field("accepting_new", &self.accepting_new)
            .finish_non_exhaustive()
    }
}
