//! Byte sources with controllable behavior

use async_trait::async_trait;
use resumable_dl::{
    ByteSource, CompletionSignal, FetchStream, ProgressInfo, ProgressListener, Result, TaskState,
};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Reader that yields `data` and then never makes progress again
struct Stall {
    data: Vec<u8>,
    pos: usize,
}

impl AsyncRead for Stall {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.pos >= self.data.len() {
            return Poll::Pending;
        }
        let end = (self.pos + buf.remaining()).min(self.data.len());
        let chunk = self.data[self.pos..end].to_vec();
        buf.put_slice(&chunk);
        self.pos = end;
        Poll::Ready(Ok(()))
    }
}

/// Serves `len` bytes of `body` starting at the requested offset, then hangs
pub struct StallingSource {
    pub body: Vec<u8>,
    pub len: usize,
}

#[async_trait]
impl ByteSource for StallingSource {
    async fn fetch(&self, _url: &str, offset: u64, _count: u64) -> Result<FetchStream> {
        let start = offset as usize;
        let end = (start + self.len).min(self.body.len());
        Ok(FetchStream {
            reader: Box::pin(Stall {
                data: self.body[start..end].to_vec(),
                pos: 0,
            }),
            content_length: None,
            partial: offset > 0,
        })
    }
}

/// Listener firing the returned signal on the first `InProgress` snapshot
pub fn first_progress_listener() -> (ProgressListener, CompletionSignal) {
    let signal = CompletionSignal::new();
    let fire = signal.clone();
    let listener: ProgressListener = Arc::new(move |info: &ProgressInfo| {
        if info.state == TaskState::InProgress {
            fire.signal();
        }
    });
    (listener, signal)
}
