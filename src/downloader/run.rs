//! Task run loop: stream the source into the data entry one chunk at a time.

use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::config::Config;
use crate::error::{Result, StorageError};
use crate::fetcher::ByteSource;
use crate::retry::download_with_retry;
use crate::store::{EntryStore, EntryWriter};
use crate::types::{TaskId, TaskState};

use super::ActiveTasks;
use super::strategy::TaskStrategy;
use super::task::DownloadTask;

/// Everything a running task needs, captured when it was launched
pub(crate) struct TaskContext {
    pub(crate) task: DownloadTask,
    pub(crate) strategy: TaskStrategy,
    pub(crate) task_store: Arc<dyn EntryStore>,
    pub(crate) data_store: Arc<dyn EntryStore>,
    pub(crate) source: Arc<dyn ByteSource>,
    pub(crate) config: Arc<Config>,
    pub(crate) active: ActiveTasks,
}

enum Finish {
    Done,
    Cancelled,
}

enum Pumped {
    Eof,
    Cancelled,
}

/// Run one download to its end state
///
/// Phases:
/// 1. Open the data entry and the source stream
/// 2. Copy chunks, persisting progress after each one
/// 3. Close the data entry and record `Done`, `Cancelled` or `Error`
/// 4. Leave the active set and release waiters
pub(crate) async fn run_download_task(ctx: TaskContext) {
    let id = ctx.task.id();

    match drive(&ctx, &id).await {
        Ok(Finish::Done) => {
            tracing::info!(
                task_id = %id,
                downloaded_bytes = ctx.task.downloaded_bytes(),
                "download complete"
            );
        }
        Ok(Finish::Cancelled) => {
            tracing::info!(
                task_id = %id,
                downloaded_bytes = ctx.task.downloaded_bytes(),
                "download cancelled"
            );
        }
        Err(e) => {
            tracing::error!(task_id = %id, error = %e, "download failed");
            ctx.task.record_failure(e);
            ctx.task.transition_to_error(ctx.task_store.as_ref()).await;
        }
    }

    ctx.active.lock().await.remove(&id);
    ctx.task.finish();
}

async fn drive(ctx: &TaskContext, id: &TaskId) -> Result<Finish> {
    let mut sink = ctx.strategy.open_sink(ctx.data_store.as_ref(), id).await?;

    match pump(ctx, id, &mut sink).await {
        Ok(Pumped::Eof) => {
            sink.shutdown().await?;
            drop(sink);

            let result = ctx
                .data_store
                .read(id.as_str())
                .await?
                .ok_or_else(|| StorageError::NotFound {
                    name: id.to_string(),
                })?;
            ctx.task.mark_completed(result);
            ctx.task
                .transition(ctx.task_store.as_ref(), TaskState::Done)
                .await?;
            Ok(Finish::Done)
        }
        Ok(Pumped::Cancelled) => {
            // bytes written so far stay in the data entry
            close_quietly(id, &mut sink).await;
            ctx.task
                .transition(ctx.task_store.as_ref(), TaskState::Cancelled)
                .await?;
            Ok(Finish::Cancelled)
        }
        Err(e) => {
            close_quietly(id, &mut sink).await;
            Err(e)
        }
    }
}

async fn pump(ctx: &TaskContext, id: &TaskId, sink: &mut EntryWriter) -> Result<Pumped> {
    let token = ctx.task.cancel_token().clone();
    let url = ctx.task.url();
    let offset = ctx.strategy.offset();
    let source = &ctx.source;

    let open = download_with_retry(&ctx.config.retry, || source.fetch(&url, offset, 0));
    let mut stream = tokio::select! {
        biased;
        _ = token.cancelled() => return Ok(Pumped::Cancelled),
        opened = open => opened?,
    };

    if offset > 0 && !stream.partial {
        tracing::warn!(
            task_id = %id,
            offset,
            "server ignored range request, skipping bytes already stored"
        );
        let mut stored_prefix = (&mut stream.reader).take(offset);
        let mut discard = tokio::io::sink();
        let skipped = tokio::io::copy(&mut stored_prefix, &mut discard).await?;
        if skipped < offset {
            let msg = format!("resource ended after {skipped} of {offset} already stored bytes");
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, msg).into());
        }
    }

    let mut buf = vec![0u8; ctx.config.download.chunk_size];
    loop {
        let n = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(Pumped::Cancelled),
            read = read_chunk(&mut stream.reader, &mut buf) => read?,
        };
        if n == 0 {
            return Ok(Pumped::Eof);
        }
        if token.is_cancelled() {
            return Ok(Pumped::Cancelled);
        }

        sink.write_all(&buf[..n]).await?;
        ctx.task.add_bytes(n as u64);
        ctx.task
            .transition(ctx.task_store.as_ref(), TaskState::InProgress)
            .await?;
    }
}

/// Fill `buf` until it is full or the reader is exhausted
async fn read_chunk<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

async fn close_quietly(id: &TaskId, sink: &mut EntryWriter) {
    if let Err(e) = sink.shutdown().await {
        tracing::warn!(task_id = %id, error = %e, "failed to close data entry");
    }
}
