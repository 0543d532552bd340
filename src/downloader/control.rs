//! Download control: start, restart, resume, inspect and remove tasks.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::error::{Error, Result};
use crate::record;
use crate::store::EntryReader;
use crate::types::{ProgressInfo, ProgressListener, TaskId, TaskState};

use super::run::{TaskContext, run_download_task};
use super::strategy::{TaskStrategy, fresh_task_id};
use super::{DownloadManager, DownloadTask};

impl DownloadManager {
    /// Start downloading `url` as a new task
    ///
    /// The returned handle is already running. `listener` is called on every
    /// state transition of this task, starting with `Starting`.
    pub async fn start_download(
        &self,
        url: &str,
        listener: Option<ProgressListener>,
    ) -> Result<DownloadTask> {
        let id = fresh_task_id(url);
        self.launch(id, url.to_string(), TaskStrategy::Fresh, listener)
            .await
    }

    /// Download an existing task again from byte zero, discarding its data
    ///
    /// Fails with [`Error::TaskActive`] if the task is running and with
    /// [`Error::NotFound`] if it has no record; neither touches storage.
    pub async fn restart_download(
        &self,
        task_id: &TaskId,
        listener: Option<ProgressListener>,
    ) -> Result<DownloadTask> {
        let info = self.load_inactive(task_id, "restart").await?;
        self.launch(info.task_id, info.url, TaskStrategy::Restarted, listener)
            .await
    }

    /// Continue an existing task from the bytes it already has
    ///
    /// The server is asked for the remaining bytes only; the data entry is
    /// appended to. If the data entry holds a different number of bytes than
    /// the record says, the data entry wins.
    pub async fn resume_download(
        &self,
        task_id: &TaskId,
        listener: Option<ProgressListener>,
    ) -> Result<DownloadTask> {
        let info = self.load_inactive(task_id, "resume").await?;

        let offset = match self.data_store.size(task_id.as_str()).await? {
            Some(stored) if stored != info.downloaded_bytes => {
                tracing::warn!(
                    task_id = %task_id,
                    recorded = info.downloaded_bytes,
                    stored,
                    "record and data entry disagree, resuming from stored size"
                );
                stored
            }
            _ => info.downloaded_bytes,
        };

        self.launch(
            info.task_id,
            info.url,
            TaskStrategy::Resumed { offset },
            listener,
        )
        .await
    }

    /// Ids of every task with a record, running or not
    pub async fn get_task_ids(&self) -> Result<Vec<TaskId>> {
        let mut ids: Vec<TaskId> = self
            .task_store
            .list_names()
            .await?
            .into_iter()
            .map(TaskId::from)
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Current state of a task
    ///
    /// A running task reports its live state. Otherwise the recorded state is
    /// returned, with `Starting` and `InProgress` reported as `Pending`.
    pub async fn get_task_state(&self, task_id: &TaskId) -> Result<TaskState> {
        Ok(self.get_progress(task_id).await?.state)
    }

    /// Current progress of a task, under the same rules as
    /// [`get_task_state`](Self::get_task_state)
    pub async fn get_progress(&self, task_id: &TaskId) -> Result<ProgressInfo> {
        if let Some(task) = self.active.lock().await.get(task_id) {
            return Ok(task.progress());
        }
        let info = record::load(self.task_store.as_ref(), task_id)
            .await?
            .ok_or_else(|| Error::NotFound(task_id.clone()))?;
        Ok(info.at_rest())
    }

    /// Whether the task is currently running
    pub async fn is_active(&self, task_id: &TaskId) -> bool {
        self.active.lock().await.contains_key(task_id)
    }

    /// Open the bytes downloaded so far for a task, or `None` if it has no data
    pub async fn open_data(&self, task_id: &TaskId) -> Result<Option<EntryReader>> {
        self.data_store.read(task_id.as_str()).await
    }

    /// Delete a task's data and record
    ///
    /// Fails with [`Error::TaskActive`] if the task is running. Removing an
    /// unknown id is not an error.
    pub async fn remove_download(&self, task_id: &TaskId) -> Result<()> {
        let active = self.active.lock().await;
        if active.contains_key(task_id) {
            return Err(Error::TaskActive {
                id: task_id.clone(),
                operation: "remove".to_string(),
            });
        }

        // data before record, so a data entry never exists without its record
        self.data_store.delete(task_id.as_str()).await?;
        self.task_store.delete(task_id.as_str()).await?;
        drop(active);

        tracing::info!(task_id = %task_id, "download removed");
        Ok(())
    }

    /// Read the record of a task that must not be running
    async fn load_inactive(&self, task_id: &TaskId, operation: &str) -> Result<ProgressInfo> {
        if self.is_active(task_id).await {
            return Err(Error::TaskActive {
                id: task_id.clone(),
                operation: operation.to_string(),
            });
        }
        record::load(self.task_store.as_ref(), task_id)
            .await?
            .ok_or_else(|| Error::NotFound(task_id.clone()))
    }

    /// Register, announce and spawn a task
    ///
    /// The "already running?" check and the registration happen under one
    /// lock, so two launches of one id cannot both succeed.
    async fn launch(
        &self,
        id: TaskId,
        url: String,
        strategy: TaskStrategy,
        listener: Option<ProgressListener>,
    ) -> Result<DownloadTask> {
        let task = DownloadTask::new(
            id.clone(),
            url,
            strategy.offset(),
            listener,
            self.event_tx.clone(),
        );

        {
            let mut active = self.active.lock().await;
            if !self.accepting_new.load(Ordering::SeqCst) {
                return Err(Error::ShuttingDown);
            }
            if active.contains_key(&id) {
                return Err(Error::TaskActive {
                    id,
                    operation: strategy.name().to_string(),
                });
            }
            active.insert(id.clone(), task.clone());
        }

        if let Err(e) = task
            .transition(self.task_store.as_ref(), TaskState::Starting)
            .await
        {
            self.active.lock().await.remove(&id);
            tracing::error!(task_id = %id, error = %e, "failed to record task start");
            return Err(e);
        }

        tracing::info!(
            task_id = %id,
            url = %task.url(),
            strategy = strategy.name(),
            offset = strategy.offset(),
            "download started"
        );

        let ctx = TaskContext {
            task: task.clone(),
            strategy,
            task_store: Arc::clone(&self.task_store),
            data_store: Arc::clone(&self.data_store),
            source: self.fetcher(),
            config: Arc::clone(&self.config),
            active: Arc::clone(&self.active),
        };
        self.executor.spawn(run_download_task(ctx));

        Ok(task)
    }
}
