//! Shared test helpers: managers over in-memory stores, a range-aware HTTP
//! responder, and byte sources and stores with controllable failure modes.

use async_trait::async_trait;
use std::io;
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};
use tokio::runtime::Handle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use crate::config::{Config, RetryConfig};
use crate::downloader::DownloadManager;
use crate::error::Result;
use crate::fetcher::{ByteSource, FetchStream};
use crate::store::{EntryReader, EntryStore, EntryWriter, MemoryStore};
use crate::types::{ProgressInfo, ProgressListener};

/// Size of the body served by [`body_server`]
pub(crate) const TEST_BODY_LEN: usize = 0x100000;

/// Deterministic body: byte `i` is `i as u8`
pub(crate) fn test_body() -> Vec<u8> {
    (0..TEST_BODY_LEN).map(|i| i as u8).collect()
}

/// Serves a fixed body, answering `Range: bytes=a-[b]` with 206
pub(crate) struct RangeResponder {
    body: Arc<Vec<u8>>,
    honour_range: bool,
}

impl RangeResponder {
    pub(crate) fn new(body: Vec<u8>) -> Self {
        Self {
            body: Arc::new(body),
            honour_range: true,
        }
    }

    /// Always answer 200 with the whole body
    pub(crate) fn ignoring_range(body: Vec<u8>) -> Self {
        Self {
            body: Arc::new(body),
            honour_range: false,
        }
    }
}

fn parse_range(value: &str) -> Option<(usize, Option<usize>)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start = start.parse().ok()?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse().ok()?)
    };
    Some((start, end))
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let len = self.body.len();
        let range = request
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_range);

        match range {
            Some((start, end)) if self.honour_range => {
                if start >= len {
                    return ResponseTemplate::new(416);
                }
                let end = end.map_or(len - 1, |e| e.min(len - 1));
                ResponseTemplate::new(206)
                    .insert_header("content-range", format!("bytes {start}-{end}/{len}"))
                    .set_body_bytes(self.body[start..=end].to_vec())
            }
            _ => ResponseTemplate::new(200).set_body_bytes(self.body.as_ref().clone()),
        }
    }
}

/// Mock server with `/file.bin` (1 MiB, range-aware) and `/missing` (404)
pub(crate) async fn body_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(RangeResponder::new(test_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    server
}

/// Default config with retries short enough for tests
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.retry = RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config
}

/// Manager over fresh in-memory stores; the stores are returned for inspection
pub(crate) fn create_test_manager() -> (DownloadManager, MemoryStore, MemoryStore) {
    create_test_manager_with(test_config())
}

pub(crate) fn create_test_manager_with(
    config: Config,
) -> (DownloadManager, MemoryStore, MemoryStore) {
    let task_store = MemoryStore::new();
    let data_store = MemoryStore::new();
    let manager = DownloadManager::with_stores(
        Arc::new(task_store.clone()),
        Arc::new(data_store.clone()),
        Handle::current(),
        config,
    )
    .unwrap();
    (manager, task_store, data_store)
}

/// Listener that records every snapshot it sees
pub(crate) fn recording_listener() -> (ProgressListener, Arc<Mutex<Vec<ProgressInfo>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener: ProgressListener = Arc::new(move |info: &ProgressInfo| {
        sink.lock().unwrap().push(info.clone());
    });
    (listener, seen)
}

pub(crate) async fn read_all(mut reader: EntryReader) -> Vec<u8> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await.unwrap();
    buf
}

/// Reader that yields `prefix` and then never makes progress again
struct StallAfter {
    prefix: Vec<u8>,
    pos: usize,
}

impl AsyncRead for StallAfter {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.pos >= self.prefix.len() {
            return Poll::Pending;
        }
        let end = (self.pos + buf.remaining()).min(self.prefix.len());
        let chunk = self.prefix[self.pos..end].to_vec();
        buf.put_slice(&chunk);
        self.pos = end;
        Poll::Ready(Ok(()))
    }
}

/// Byte source whose streams deliver `prefix_len` bytes and then hang
pub(crate) struct StallingSource {
    pub(crate) prefix_len: usize,
}

#[async_trait]
impl ByteSource for StallingSource {
    async fn fetch(&self, _url: &str, _offset: u64, _count: u64) -> Result<FetchStream> {
        Ok(FetchStream {
            reader: Box::pin(StallAfter {
                prefix: vec![7u8; self.prefix_len],
                pos: 0,
            }),
            content_length: None,
            partial: false,
        })
    }
}

/// Reader that yields `data` and then fails as if the peer reset the connection
struct BreakAfter {
    data: Vec<u8>,
    pos: usize,
}

impl AsyncRead for BreakAfter {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.pos >= self.data.len() {
            return Poll::Ready(Err(io::ErrorKind::ConnectionReset.into()));
        }
        let end = (self.pos + buf.remaining()).min(self.data.len());
        let chunk = self.data[self.pos..end].to_vec();
        buf.put_slice(&chunk);
        self.pos = end;
        Poll::Ready(Ok(()))
    }
}

/// Byte source whose streams deliver the first `good_len` bytes of
/// [`test_body`] and then break
pub(crate) struct BreakingSource {
    pub(crate) good_len: usize,
}

#[async_trait]
impl ByteSource for BreakingSource {
    async fn fetch(&self, _url: &str, _offset: u64, _count: u64) -> Result<FetchStream> {
        Ok(FetchStream {
            reader: Box::pin(BreakAfter {
                data: test_body()[..self.good_len].to_vec(),
                pos: 0,
            }),
            content_length: Some(TEST_BODY_LEN as u64),
            partial: false,
        })
    }
}

/// Writer that accepts `limit` bytes and then fails every write
struct LimitedWriter {
    inner: EntryWriter,
    remaining: usize,
}

impl AsyncWrite for LimitedWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.len() > self.remaining {
            return Poll::Ready(Err(io::Error::other("no space left in entry")));
        }
        let written = std::task::ready!(self.inner.as_mut().poll_write(cx, buf))?;
        self.remaining -= written;
        Poll::Ready(Ok(written))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner.as_mut().poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner.as_mut().poll_shutdown(cx)
    }
}

/// [`MemoryStore`] with injectable faults
///
/// Writers accept at most `write_limit` bytes each, if set. Once `broken` is
/// set, `create` fails.
#[derive(Clone, Default)]
pub(crate) struct FaultyStore {
    pub(crate) inner: MemoryStore,
    pub(crate) write_limit: Option<usize>,
    pub(crate) broken: Arc<AtomicBool>,
}

impl FaultyStore {
    fn limit(&self, writer: EntryWriter) -> EntryWriter {
        match self.write_limit {
            Some(limit) => Box::pin(LimitedWriter {
                inner: writer,
                remaining: limit,
            }),
            None => writer,
        }
    }
}

#[async_trait]
impl EntryStore for FaultyStore {
    async fn create(&self, name: &str) -> Result<EntryWriter> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(io::Error::other("store is broken").into());
        }
        Ok(self.limit(self.inner.create(name).await?))
    }

    async fn read(&self, name: &str) -> Result<Option<EntryReader>> {
        self.inner.read(name).await
    }

    async fn append(&self, name: &str) -> Result<Option<EntryWriter>> {
        Ok(self.inner.append(name).await?.map(|w| self.limit(w)))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.inner.delete(name).await
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        self.inner.exists(name).await
    }

    async fn list_names(&self) -> Result<HashSet<String>> {
        self.inner.list_names().await
    }

    async fn size(&self, name: &str) -> Result<Option<u64>> {
        self.inner.size(name).await
    }
}

/// Manager over the given stores with [`test_config`]
pub(crate) fn create_manager_over(
    task_store: Arc<dyn EntryStore>,
    data_store: Arc<dyn EntryStore>,
) -> DownloadManager {
    DownloadManager::with_stores(task_store, data_store, Handle::current(), test_config())
        .unwrap()
}
