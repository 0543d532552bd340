//! How a task obtains its id, its data sink and its source offset.
//!
//! A fresh download gets a new id and a new data entry. A restart reuses an
//! existing id but rewrites the data entry from byte zero. A resume reuses the
//! id, appends to the data entry and asks the server for the remaining bytes.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, StorageError};
use crate::store::{EntryStore, EntryWriter};
use crate::types::TaskId;

/// Basename used when the URL path has no usable last segment
const FALLBACK_NAME: &str = "download";

/// Upper bound on the URL-derived part of a task id
const MAX_NAME_LEN: usize = 96;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// How a task relates to storage left behind by earlier runs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TaskStrategy {
    /// New id, new data entry, whole resource
    Fresh,
    /// Existing id, data entry recreated, whole resource
    Restarted,
    /// Existing id, data entry appended to, resource from `offset`
    Resumed {
        /// Bytes already present in the data entry
        offset: u64,
    },
}

impl TaskStrategy {
    /// Operation name used in logs and precondition errors
    pub(crate) fn name(&self) -> &'static str {
        match self {
            TaskStrategy::Fresh => "start",
            TaskStrategy::Restarted => "restart",
            TaskStrategy::Resumed { .. } => "resume",
        }
    }

    /// Byte offset the source stream starts at; also the initial progress count
    pub(crate) fn offset(&self) -> u64 {
        match self {
            TaskStrategy::Resumed { offset } => *offset,
            TaskStrategy::Fresh | TaskStrategy::Restarted => 0,
        }
    }

    /// Open the data entry this task writes into
    pub(crate) async fn open_sink(
        &self,
        store: &dyn EntryStore,
        id: &TaskId,
    ) -> Result<EntryWriter> {
        let name = id.as_str();
        match self {
            TaskStrategy::Fresh => store.create(name).await,
            TaskStrategy::Restarted => {
                store.delete(name).await?;
                store.create(name).await
            }
            TaskStrategy::Resumed { .. } => store.append(name).await?.ok_or_else(|| {
                StorageError::NotFound {
                    name: name.to_string(),
                }
                .into()
            }),
        }
    }
}

/// Generate a new, process-unique task id for `url`
///
/// The id is `<unix-nanos>-<sequence>-<basename>`, where the basename is the
/// last path segment of the URL reduced to characters that are safe in a file
/// name.
pub(crate) fn fresh_task_id(url: &str) -> TaskId {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    TaskId::new(format!("{nanos}-{seq}-{}", url_basename(url)))
}

fn url_basename(url: &str) -> String {
    let segment = url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string))
        })
        .unwrap_or_default();

    let sanitized: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        FALLBACK_NAME.to_string()
    } else {
        sanitized
    }
}
