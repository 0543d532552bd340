//! Core types for resumable-dl

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Unique identifier for a download task
///
/// The id doubles as the entry name in both the task store and the data
/// store, so it stays the same across restarts and resumes of one download.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create a TaskId from any string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the id, returning the inner string
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for TaskId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TaskId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a download task
///
/// A running task moves `Starting -> InProgress* -> {Done | Cancelled | Error}`.
/// `Pending` is never written by a running task: it is how a persisted
/// `Starting`/`InProgress` record is reported once nothing is driving it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Interrupted mid-flight; can be restarted or resumed
    Pending,
    /// Storage and source are being opened
    Starting,
    /// At least one chunk has been written
    InProgress,
    /// All bytes were written and the data entry is readable
    Done,
    /// Stopped at a chunk boundary on request
    Cancelled,
    /// Failed with a transport or storage error
    Error,
}

impl TaskState {
    /// True for states a task never leaves
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::Cancelled | TaskState::Error)
    }

    /// Map a persisted state to what callers see when the task is not running
    pub fn at_rest(self) -> Self {
        match self {
            TaskState::Starting | TaskState::InProgress => TaskState::Pending,
            other => other,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskState::Pending => "pending",
            TaskState::Starting => "starting",
            TaskState::InProgress => "in_progress",
            TaskState::Done => "done",
            TaskState::Cancelled => "cancelled",
            TaskState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Snapshot of one task's progress
///
/// Handed to listeners, broadcast to subscribers and persisted after every
/// state transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressInfo {
    /// The task this snapshot belongs to
    pub task_id: TaskId,
    /// Source URL
    pub url: String,
    /// State at the time of the snapshot
    pub state: TaskState,
    /// Bytes present in the data entry, including bytes from earlier runs
    pub downloaded_bytes: u64,
}

impl ProgressInfo {
    /// Snapshot with the given state and byte count
    pub fn new(
        task_id: TaskId,
        url: impl Into<String>,
        state: TaskState,
        downloaded_bytes: u64,
    ) -> Self {
        Self {
            task_id,
            url: url.into(),
            state,
            downloaded_bytes,
        }
    }

    /// Same snapshot with `Starting`/`InProgress` reported as `Pending`
    pub fn at_rest(mut self) -> Self {
        self.state = self.state.at_rest();
        self
    }
}

/// Callback invoked synchronously on every state transition of one task
pub type ProgressListener = Arc<dyn Fn(&ProgressInfo) + Send + Sync>;
