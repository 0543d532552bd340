//! Directory-backed entry store

use async_trait::async_trait;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};

use super::{EntryReader, EntryStore, EntryWriter};
use crate::error::{Result, StorageError};

/// [`EntryStore`] that keeps each entry in its own file
///
/// The file name is the entry name, so names are restricted to a single path
/// component.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    ///
    /// Fails with [`StorageError::NotADirectory`] if `dir` exists but is not a
    /// directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        match fs::metadata(&dir).await {
            Ok(meta) if !meta.is_dir() => {
                return Err(StorageError::NotADirectory { path: dir }.into());
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(&dir).await?;
                tracing::debug!(dir = %dir.display(), "created entry store directory");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Self { dir })
    }

    /// Directory holding the entries
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(name))
    }
}

fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(StorageError::InvalidName {
            name: name.to_string(),
        }
        .into());
    }
    Ok(())
}

#[async_trait]
impl EntryStore for FileStore {
    async fn create(&self, name: &str) -> Result<EntryWriter> {
        let path = self.path(name)?;
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => Ok(Box::pin(file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(StorageError::AlreadyExists {
                name: name.to_string(),
            }
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, name: &str) -> Result<Option<EntryReader>> {
        let path = self.path(name)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(Some(Box::pin(file))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn append(&self, name: &str) -> Result<Option<EntryWriter>> {
        let path = self.path(name)?;
        match OpenOptions::new().append(true).open(&path).await {
            Ok(file) => Ok(Some(Box::pin(file))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.path(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.path(name)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn list_names(&self) -> Result<HashSet<String>> {
        let mut names = HashSet::new();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => {
                    names.insert(name);
                }
                Err(raw) => {
                    tracing::warn!(file = ?raw, "skipping entry with non UTF-8 name");
                }
            }
        }
        Ok(names)
    }

    async fn size(&self, name: &str) -> Result<Option<u64>> {
        let path = self.path(name)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
