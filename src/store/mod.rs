//! Named byte-entry storage
//!
//! A download keeps two entries under its [`TaskId`](crate::TaskId): a small
//! progress record in the task store and the raw payload in the data store.
//! Both stores implement [`EntryStore`]; [`MemoryStore`] keeps entries in
//! memory and [`FileStore`] maps each entry to one file in a directory.

use async_trait::async_trait;
use std::collections::HashSet;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Readable stream over an entry's content at the time it was opened
pub type EntryReader = Pin<Box<dyn AsyncRead + Send>>;

/// Writable stream into an entry
///
/// Callers must `shutdown()` the writer to be sure every byte reached the store.
pub type EntryWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Keyed storage of byte entries
///
/// Implementations must be safe to share between many concurrently running
/// downloads.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Create a new, empty entry and return a writer for it
    ///
    /// Fails with [`StorageError::AlreadyExists`](crate::StorageError::AlreadyExists)
    /// if the name is taken.
    async fn create(&self, name: &str) -> Result<EntryWriter>;

    /// Open a reader over the full current content, or `None` if absent
    async fn read(&self, name: &str) -> Result<Option<EntryReader>>;

    /// Open a writer positioned at the end of the content, or `None` if absent
    async fn append(&self, name: &str) -> Result<Option<EntryWriter>>;

    /// Remove the entry; removing an absent entry is not an error
    async fn delete(&self, name: &str) -> Result<()>;

    /// Whether an entry with this name exists
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Names of all entries
    async fn list_names(&self) -> Result<HashSet<String>>;

    /// Current length of the entry in bytes, or `None` if absent
    async fn size(&self, name: &str) -> Result<Option<u64>>;
}
