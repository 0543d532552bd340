use super::test_helpers::*;
use super::*;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, mpsc};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::error::Error;
use crate::record;
use crate::signal::CompletionSignal;
use crate::store::{EntryStore, MemoryStore};
use crate::types::{ProgressListener, TaskState};


/// Upper bound for any single download in these tests
const FINISH_TIMEOUT: Duration = Duration::from_secs(30);

async fn wait_finished(task: &DownloadTask) {
    tokio::time::timeout(FINISH_TIMEOUT, task.wait())
        .await
        .expect("download did not finish in time");
}

/// Wait for a download that is expected to fail and return why it failed
async fn expect_failure(task: &DownloadTask) -> Error {
    match task.get().await {
        Ok(_) => panic!("download {} should have failed", task.id()),
        Err(e) => e,
    }
}

fn states(seen: &Mutex<Vec<ProgressInfo>>) -> Vec<TaskState> {
    seen.lock().unwrap().iter().map(|p| p.state).collect()
}

/// Listener that fires the returned signal on the first `InProgress` snapshot
fn first_progress_listener() -> (ProgressListener, CompletionSignal) {
    let signal = CompletionSignal::new();
    let fire = signal.clone();
    let listener: ProgressListener = Arc::new(move |info: &ProgressInfo| {
        if info.state == TaskState::InProgress {
            fire.signal();
        }
    });
    (listener, signal)
}

/// Put a record and `data` into the stores as if an earlier run stopped there
async fn seed_task(
    task_store: &MemoryStore,
    data_store: &MemoryStore,
    id: &TaskId,
    url: &str,
    state: TaskState,
    recorded_bytes: u64,
    data: &[u8],
) {
    let info = ProgressInfo::new(id.clone(), url, state, recorded_bytes);
    record::save(task_store, &info).await.unwrap();

    let mut writer = data_store.create(id.as_str()).await.unwrap();
    writer.write_all(data).await.unwrap();
    writer.shutdown().await.unwrap();
}

/// Listener that parks the task inside its first `InProgress` callback
///
/// The returned signal fires once the task is parked; sending on the channel
/// lets it continue. Needs a multi-threaded runtime, since the parked task
/// blocks its worker thread.
fn gated_listener() -> (ProgressListener, CompletionSignal, mpsc::Sender<()>) {
    let reached = CompletionSignal::new();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);
    let first = AtomicBool::new(true);
    let fire = reached.clone();
    let listener: ProgressListener = Arc::new(move |info: &ProgressInfo| {
        if info.state == TaskState::InProgress && first.swap(false, Ordering::SeqCst) {
            fire.signal();
            let _ = release_rx.lock().unwrap().recv();
        }
    });
    (listener, reached, release_tx)
}
