//! Handle to a single running (or finished) download.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::record;
use crate::signal::CompletionSignal;
use crate::store::{EntryReader, EntryStore};
use crate::types::{ProgressInfo, ProgressListener, TaskId, TaskState};

/// Future-like handle to one download
///
/// Clones refer to the same download. The handle stays usable after the
/// download has finished and been removed from the manager's active set.
///
/// ```no_run
/// # use resumable_dl::{DownloadManager, Config};
/// # async fn example(manager: DownloadManager) -> resumable_dl::Result<()> {
/// use tokio::io::AsyncReadExt;
///
/// let task = manager.start_download("http://example.com/file.bin", None).await?;
/// let mut body = task.get().await?;
/// let mut bytes = Vec::new();
/// body.read_to_end(&mut bytes).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DownloadTask {
    shared: Arc<TaskShared>,
}

struct TaskShared {
    progress: Mutex<ProgressInfo>,
    listener: Option<ProgressListener>,
    cancel_token: CancellationToken,
    cancel_requested: AtomicBool,
    completed: AtomicBool,
    failure: OnceLock<Arc<Error>>,
    /// Data entry opened when the download completed; taken by the first `get`
    result: Mutex<Option<EntryReader>>,
    finished: CompletionSignal,
    events: broadcast::Sender<ProgressInfo>,
}

impl DownloadTask {
    pub(crate) fn new(
        id: TaskId,
        url: String,
        initial_bytes: u64,
        listener: Option<ProgressListener>,
        events: broadcast::Sender<ProgressInfo>,
    ) -> Self {
        Self {
            shared: Arc::new(TaskShared {
                progress: Mutex::new(ProgressInfo::new(
                    id,
                    url,
                    TaskState::Starting,
                    initial_bytes,
                )),
                listener,
                cancel_token: CancellationToken::new(),
                cancel_requested: AtomicBool::new(false),
                completed: AtomicBool::new(false),
                failure: OnceLock::new(),
                result: Mutex::new(None),
                finished: CompletionSignal::new(),
                events,
            }),
        }
    }

    fn progress_lock(&self) -> MutexGuard<'_, ProgressInfo> {
        self.shared
            .progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The task's id, shared by its progress record and its data entry
    pub fn id(&self) -> TaskId {
        self.progress_lock().task_id.clone()
    }

    /// The URL being downloaded
    pub fn url(&self) -> String {
        self.progress_lock().url.clone()
    }

    /// State after the most recent transition
    pub fn state(&self) -> TaskState {
        self.progress_lock().state
    }

    /// Bytes in the data entry, including bytes kept from earlier runs
    pub fn downloaded_bytes(&self) -> u64 {
        self.progress_lock().downloaded_bytes
    }

    /// Snapshot of the current progress
    pub fn progress(&self) -> ProgressInfo {
        self.progress_lock().clone()
    }

    /// Ask the download to stop at the next chunk boundary
    ///
    /// Returns false without doing anything when `force` is false. Otherwise
    /// returns true if the download had not completed yet. A download that is
    /// already past its last chunk may still finish as `Done`.
    pub fn cancel(&self, force: bool) -> bool {
        if !force {
            return false;
        }
        if self.shared.completed.load(Ordering::SeqCst) {
            return false;
        }
        self.shared.cancel_requested.store(true, Ordering::SeqCst);
        self.shared.cancel_token.cancel();
        true
    }

    /// Whether cancellation was requested before the download completed
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel_requested.load(Ordering::SeqCst)
    }

    /// Whether the download has stopped running, whatever the outcome
    pub fn is_done(&self) -> bool {
        self.shared.finished.is_set()
    }

    /// Wait until the download stops running
    pub async fn wait(&self) {
        self.shared.finished.wait().await;
    }

    /// Wait for the download and take its data
    ///
    /// The data is the entry as it was when the download completed; later
    /// restarts or removals of the same task do not affect it. Only the first
    /// call among all clones of the handle receives it, later calls fail with
    /// [`Error::ResultTaken`]. Fails with [`Error::Cancelled`] if the download
    /// was cancelled and with [`Error::Execution`] carrying the cause if it
    /// failed.
    pub async fn get(&self) -> Result<EntryReader> {
        self.shared.finished.wait().await;
        self.outcome()
    }

    /// Like [`get`](Self::get), but gives up with [`Error::Timeout`] after
    /// `timeout`
    ///
    /// Timing out does not stop the download.
    pub async fn get_timeout(&self, timeout: Duration) -> Result<EntryReader> {
        self.shared.finished.wait_timeout(timeout).await?;
        self.outcome()
    }

    fn outcome(&self) -> Result<EntryReader> {
        match self.state() {
            TaskState::Cancelled => Err(Error::Cancelled),
            TaskState::Error => {
                let cause = self.shared.failure.get().cloned().unwrap_or_else(|| {
                    Arc::new(Error::Io(std::io::Error::other(
                        "download failed without a recorded cause",
                    )))
                });
                Err(Error::Execution(cause))
            }
            _ => self
                .shared
                .result
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .ok_or_else(|| Error::ResultTaken(self.id())),
        }
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.shared.cancel_token
    }

    pub(crate) fn add_bytes(&self, n: u64) {
        self.progress_lock().downloaded_bytes += n;
    }

    /// Keep `result` for `get` and refuse cancellation from now on
    pub(crate) fn mark_completed(&self, result: EntryReader) {
        *self
            .shared
            .result
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(result);
        self.shared.completed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn record_failure(&self, error: Error) -> Arc<Error> {
        let error = Arc::new(error);
        // first failure wins
        let _ = self.shared.failure.set(Arc::clone(&error));
        error
    }

    pub(crate) fn finish(&self) {
        self.shared.finished.signal();
    }

    /// Move to `state`, persist the new snapshot, then notify the listener
    /// and subscribers
    ///
    /// Nobody is notified if the record could not be written.
    pub(crate) async fn transition(
        &self,
        task_store: &dyn EntryStore,
        state: TaskState,
    ) -> Result<ProgressInfo> {
        let snapshot = self.enter(state);
        record::save(task_store, &snapshot).await?;
        tracing::debug!(
            task_id = %snapshot.task_id,
            state = %snapshot.state,
            downloaded_bytes = snapshot.downloaded_bytes,
            "task state changed"
        );
        self.notify(&snapshot);
        Ok(snapshot)
    }

    /// Move to `Error`; a failure to persist is logged, not returned
    pub(crate) async fn transition_to_error(&self, task_store: &dyn EntryStore) -> ProgressInfo {
        let snapshot = self.enter(TaskState::Error);
        if let Err(e) = record::save(task_store, &snapshot).await {
            tracing::warn!(
                task_id = %snapshot.task_id,
                error = %e,
                "failed to persist error state"
            );
        }
        self.notify(&snapshot);
        snapshot
    }

    fn enter(&self, state: TaskState) -> ProgressInfo {
        let mut progress = self.progress_lock();
        progress.state = state;
        progress.clone()
    }

    fn notify(&self, snapshot: &ProgressInfo) {
        // no subscribers is fine
        self.shared.events.send(snapshot.clone()).ok();

        let Some(listener) = &self.shared.listener else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| listener(snapshot))).is_err() {
            tracing::warn!(
                task_id = %snapshot.task_id,
                state = %snapshot.state,
                "progress listener panicked"
            );
        }
    }
}

impl std::fmt::Debug for DownloadTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let progress = self.progress();
        f.debug_struct("DownloadTask")
            .field("id", &progress.task_id)
            .field("url", &progress.url)
            .field("state", &progress.state)
            .field("downloaded_bytes", &progress.downloaded_bytes)
            .field("done", &self.is_done())
            .finish()
    }
}
