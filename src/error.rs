//! Error types for resumable-dl
//!
//! Errors fall into four families, exposed through [`Error::category`]:
//! - transport failures (HTTP status, connection, timeouts)
//! - storage failures (entry store I/O, duplicate names, corrupt records)
//! - precondition failures (restarting a running task, unknown ids, shutdown)
//! - cancellation, which is a terminal outcome rather than a failure

use std::sync::Arc;
use thiserror::Error;

use crate::types::TaskId;

/// Result type alias for resumable-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for resumable-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "chunk_size")
        key: Option<String>,
    },

    /// The server answered with a status other than 200 or 206
    #[error("HTTP server responded with error {status} for {url}")]
    Transport {
        /// The requested URL
        url: String,
        /// The HTTP status code returned by the server
        status: u16,
    },

    /// Network error (connect failure, timeout, protocol error)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The URL could not be parsed or is not an HTTP(S) URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Entry store error
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Persisted progress record error
    #[error("progress record error: {0}")]
    Record(#[from] RecordError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The task is currently running and cannot be restarted, resumed or removed
    #[error("cannot {operation} task {id}: task is currently active")]
    TaskActive {
        /// The task that is active
        id: TaskId,
        /// The operation that was attempted (e.g., "restart", "resume")
        operation: String,
    },

    /// No task record exists for the given id
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// The finished download's data was already handed out by an earlier `get`
    #[error("result of task {0} was already taken")]
    ResultTaken(TaskId),

    /// The download was cancelled before it completed
    #[error("download was cancelled")]
    Cancelled,

    /// Waiting for a result took longer than the allowed time
    #[error("timed out waiting for completion")]
    Timeout,

    /// The download failed; the original cause is attached
    #[error("download failed: {0}")]
    Execution(#[source] Arc<Error>),
}

/// Entry store errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// An entry with this name already exists
    #[error("entry {name} already exists")]
    AlreadyExists {
        /// The entry name that is already taken
        name: String,
    },

    /// No entry with this name exists
    #[error("entry {name} not found")]
    NotFound {
        /// The entry name that was looked up
        name: String,
    },

    /// The name cannot be used as an entry name
    #[error("invalid entry name {name:?}")]
    InvalidName {
        /// The rejected entry name
        name: String,
    },

    /// The store directory path exists but is not a directory
    #[error("{path} is not a directory")]
    NotADirectory {
        /// The offending path
        path: std::path::PathBuf,
    },
}

/// Persisted progress record errors
#[derive(Debug, Error)]
pub enum RecordError {
    /// The record was written by an unknown format version
    #[error("unsupported record version {found} (supported: {supported})")]
    UnsupportedVersion {
        /// The version found in the record
        found: u32,
        /// The version this build understands
        supported: u32,
    },

    /// The record could not be decoded
    #[error("malformed record for {name}: {reason}")]
    Malformed {
        /// The entry name the record was read from
        name: String,
        /// Why decoding failed
        reason: String,
    },
}

/// Coarse error family, used by callers deciding how to react to a failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Non-2xx/206 responses, connection or timeout failures
    Transport,
    /// Entry store and record failures
    Storage,
    /// The operation is not allowed in the current state
    Precondition,
    /// The download was cancelled
    Cancelled,
    /// Everything else (configuration, waiting timeouts)
    Other,
}

impl Error {
    /// Classify this error into its family
    ///
    /// [`Error::Execution`] is classified by the cause it wraps.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Transport { .. } | Error::Network(_) | Error::InvalidUrl(_) => {
                ErrorCategory::Transport
            }
            Error::Storage(_) | Error::Record(_) | Error::Io(_) | Error::Serialization(_) => {
                ErrorCategory::Storage
            }
            Error::TaskActive { .. }
            | Error::NotFound(_)
            | Error::ShuttingDown
            | Error::ResultTaken(_) => ErrorCategory::Precondition,
            Error::Cancelled => ErrorCategory::Cancelled,
            Error::Execution(cause) => cause.category(),
            Error::Config { .. } | Error::Timeout => ErrorCategory::Other,
        }
    }

    /// Returns true if this error represents a cancelled download
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns the HTTP status code carried by a transport error, if any
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::Transport { status, .. } => Some(*status),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            Error::Execution(cause) => cause.http_status(),
            _ => None,
        }
    }
}
