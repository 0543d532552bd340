//! In-memory entry store

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

use super::{EntryReader, EntryStore, EntryWriter};
use crate::error::{Result, StorageError};

type Buffer = Arc<Mutex<Vec<u8>>>;

/// Non-persistent [`EntryStore`] backed by a map of byte buffers
///
/// Writers append straight into the shared buffer, so a reader opened after a
/// write sees it without waiting for the writer to be shut down. Cloning the
/// store shares its contents.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Buffer>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Buffer>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn buffer(&self, name: &str) -> Option<Buffer> {
        self.entries().get(name).cloned()
    }
}

fn lock(buffer: &Buffer) -> MutexGuard<'_, Vec<u8>> {
    buffer.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn create(&self, name: &str) -> Result<EntryWriter> {
        let mut entries = self.entries();
        if entries.contains_key(name) {
            return Err(StorageError::AlreadyExists {
                name: name.to_string(),
            }
            .into());
        }
        let buffer = Buffer::default();
        entries.insert(name.to_string(), Arc::clone(&buffer));
        Ok(Box::pin(MemoryWriter { buffer }))
    }

    async fn read(&self, name: &str) -> Result<Option<EntryReader>> {
        Ok(self.buffer(name).map(|buffer| {
            let snapshot = lock(&buffer).clone();
            Box::pin(Cursor::new(snapshot)) as EntryReader
        }))
    }

    async fn append(&self, name: &str) -> Result<Option<EntryWriter>> {
        Ok(self
            .buffer(name)
            .map(|buffer| Box::pin(MemoryWriter { buffer }) as EntryWriter))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.entries().remove(name);
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.entries().contains_key(name))
    }

    async fn list_names(&self) -> Result<HashSet<String>> {
        Ok(self.entries().keys().cloned().collect())
    }

    async fn size(&self, name: &str) -> Result<Option<u64>> {
        Ok(self.buffer(name).map(|buffer| lock(&buffer).len() as u64))
    }
}

/// Writer that extends a shared buffer in place
struct MemoryWriter {
    buffer: Buffer,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        lock(&self.buffer).extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
