//! Byte-range HTTP fetching
//!
//! [`ByteSource`] is the seam the download tasks read through; [`HttpFetcher`]
//! is the `reqwest` implementation. A request for `offset = 0, count = 0`
//! asks for the whole resource, anything else carries a `Range` header.

use async_trait::async_trait;
use std::io;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_stream::StreamExt;
use tokio_util::io::StreamReader;

use crate::config::DownloadConfig;
use crate::error::{Error, Result};

/// Response body of a fetch, readable as a byte stream
pub struct FetchStream {
    /// The body; a stall longer than the read timeout yields `ErrorKind::TimedOut`
    pub reader: Pin<Box<dyn AsyncRead + Send>>,
    /// Declared body length, `None` for chunked responses
    pub content_length: Option<u64>,
    /// True if the server answered `206 Partial Content`
    pub partial: bool,
}

impl std::fmt::Debug for FetchStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchStream")
            .field("content_length", &self.content_length)
            .field("partial", &self.partial)
            .finish_non_exhaustive()
    }
}

/// Source of downloadable bytes
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Open a stream over `count` bytes of `url` starting at `offset`
    ///
    /// `count = 0` means "to the end". Implementations must not retry.
    async fn fetch(&self, url: &str, offset: u64, count: u64) -> Result<FetchStream>;

    /// Open a stream over the whole resource
    async fn download(&self, url: &str) -> Result<FetchStream> {
        self.fetch(url, 0, 0).await
    }

    /// Open a stream from `offset` to the end of the resource
    async fn download_with_offset(&self, url: &str, offset: u64) -> Result<FetchStream> {
        self.fetch(url, offset, 0).await
    }
}

/// `Range` header value for a request, or `None` when the whole resource is wanted
pub fn range_header(offset: u64, count: u64) -> Option<String> {
    match (offset, count) {
        (0, 0) => None,
        (offset, 0) => Some(format!("bytes={offset}-")),
        // end position saturates at u64::MAX
        (offset, count) => Some(format!("bytes={offset}-{}", offset.saturating_add(count - 1))),
    }
}

/// [`ByteSource`] over HTTP(S) using `reqwest`
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    read_timeout: Duration,
}

impl HttpFetcher {
    /// Build a fetcher with the configured User-Agent and timeouts
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            client,
            read_timeout: config.read_timeout,
        })
    }
}

fn parse_url(url: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(Error::InvalidUrl(format!(
            "{url}: unsupported scheme {scheme}"
        ))),
    }
}

#[async_trait]
impl ByteSource for HttpFetcher {
    async fn fetch(&self, url: &str, offset: u64, count: u64) -> Result<FetchStream> {
        let parsed = parse_url(url)?;

        let mut request = self.client.get(parsed);
        if let Some(range) = range_header(offset, count) {
            request = request.header(reqwest::header::RANGE, range);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        if status != 200 && status != 206 {
            return Err(Error::Transport {
                url: url.to_string(),
                status,
            });
        }

        let content_length = response.content_length();
        tracing::debug!(url, offset, count, status, ?content_length, "opened source stream");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(io::Error::other))
            .timeout(self.read_timeout)
            .map(|item| match item {
                Ok(chunk) => chunk,
                Err(_elapsed) => Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out")),
            });

        Ok(FetchStream {
            reader: Box::pin(StreamReader::new(body)),
            content_length,
            partial: status == 206,
        })
    }
}
