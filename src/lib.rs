//! # resumable-dl
//!
//! Resumable, cancellable HTTP downloads that survive process restarts.
//!
//! Every download is a task with a stable id. While it runs, the task streams
//! the remote resource into a data entry one chunk at a time and rewrites a
//! small progress record after every chunk. Both live in pluggable
//! [`EntryStore`]s, so a later process can list old tasks, resume them from
//! the bytes already on disk, or restart them from scratch.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use resumable_dl::{Config, DownloadManager, ProgressInfo};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = DownloadManager::new(Config::default()).await?;
//!
//!     let task = manager
//!         .start_download(
//!             "https://example.com/big.iso",
//!             Some(Arc::new(|p: &ProgressInfo| {
//!                 println!("{} {} {}", p.task_id, p.state, p.downloaded_bytes);
//!             })),
//!         )
//!         .await?;
//!
//!     // Later, possibly in another process:
//!     // manager.resume_download(&task.id(), None).await?;
//!     let _data = task.get().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Download manager and task handles
pub mod downloader;
/// Error types
pub mod error;
/// Byte sources (HTTP range requests)
pub mod fetcher;
/// Versioned progress records
pub mod record;
/// Retry logic with exponential backoff
pub mod retry;
/// One-shot completion signal
pub mod signal;
/// Named blob storage for records and downloaded bytes
pub mod store;
/// Core types
pub mod types;

use std::time::Duration;

// Re-export commonly used types
pub use config::Config;
pub use downloader::{DownloadManager, DownloadTask};
pub use error::{Error, ErrorCategory, RecordError, Result, StorageError};
pub use fetcher::{ByteSource, FetchStream, HttpFetcher};
pub use signal::CompletionSignal;
pub use store::{EntryReader, EntryStore, EntryWriter, FileStore, MemoryStore};
pub use types::{ProgressInfo, ProgressListener, TaskId, TaskState};

/// How long [`run_with_shutdown`] waits for running downloads to stop
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Run until a termination signal arrives, then shut the manager down
///
/// Waits for SIGTERM or SIGINT on Unix and Ctrl+C elsewhere, then calls
/// [`DownloadManager::shutdown`] with [`DEFAULT_SHUTDOWN_TIMEOUT`].
/// Interrupted downloads are recorded as cancelled and can be resumed later.
///
/// # Example
///
/// ```no_run
/// use resumable_dl::{Config, DownloadManager, TaskState, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let manager = DownloadManager::new(Config::default()).await?;
///     for id in manager.get_task_ids().await? {
///         let state = manager.get_task_state(&id).await?;
///         if matches!(state, TaskState::Pending | TaskState::Cancelled) {
///             manager.resume_download(&id, None).await?;
///         }
///     }
///
///     run_with_shutdown(manager).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(manager: DownloadManager) -> Result<()> {
    wait_for_signal().await;
    manager.shutdown(DEFAULT_SHUTDOWN_TIMEOUT).await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // registration can fail in restricted environments
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "could not register every signal handler");
            only.recv().await;
            tracing::info!("received termination signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "could not register signal handlers, using ctrl_c");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C"),
        Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl+C"),
    }
}
