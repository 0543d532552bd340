//! Managers over temporary directories and a range-aware mock server

use resumable_dl::config::{PersistenceConfig, RetryConfig};
use resumable_dl::{
    Config, DownloadManager, DownloadTask, EntryReader, ProgressInfo, ProgressListener,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Size of the body served at `/file.bin`
pub const BODY_LEN: usize = 300_000;

/// Deterministic body: byte `i` is `i % 251`
pub fn body() -> Vec<u8> {
    (0..BODY_LEN).map(|i| (i % 251) as u8).collect()
}

/// Answers `Range: bytes=a-` with 206 and the tail of the body
struct RangeResponder(Arc<Vec<u8>>);

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let start = request
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("bytes="))
            .and_then(|v| v.trim_end_matches('-').parse::<usize>().ok());
        let len = self.0.len();

        match start {
            Some(start) if start >= len => ResponseTemplate::new(416),
            Some(start) => ResponseTemplate::new(206)
                .insert_header("content-range", format!("bytes {start}-{}/{len}", len - 1))
                .set_body_bytes(self.0[start..].to_vec()),
            None => ResponseTemplate::new(200).set_body_bytes(self.0.as_ref().clone()),
        }
    }
}

/// Mock server serving [`body`] at `/file.bin`
pub async fn start_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(RangeResponder(Arc::new(body())))
        .mount(&server)
        .await;
    server
}

/// Config storing everything under `root`, with small chunks and no retries
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.download.chunk_size = 16 * 1024;
    config.retry = RetryConfig {
        max_attempts: 0,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(10),
        backoff_multiplier: 1.0,
        jitter: false,
    };
    config.persistence = PersistenceConfig {
        task_dir: root.join("tasks"),
        data_dir: root.join("data"),
    };
    config
}

/// File-backed manager rooted at `root`
pub async fn open_manager(root: &Path) -> DownloadManager {
    DownloadManager::new(test_config(root))
        .await
        .expect("failed to open manager")
}

/// Listener that records every snapshot it sees
pub fn recording_listener() -> (ProgressListener, Arc<Mutex<Vec<ProgressInfo>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener: ProgressListener = Arc::new(move |info: &ProgressInfo| {
        sink.lock().unwrap().push(info.clone());
    });
    (listener, seen)
}

pub async fn read_all(mut reader: EntryReader) -> Vec<u8> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await.unwrap();
    buf
}

/// Wait for a task to finish, failing the test after `timeout`
pub async fn wait_finished(task: &DownloadTask, timeout: Duration) {
    tokio::time::timeout(timeout, task.wait())
        .await
        .expect("download did not finish in time");
}
