//! Persisted progress records
//!
//! Each task store entry holds one JSON document:
//!
//! ```json
//! {"version":1,"task_id":"1700000000000000000-0-file.bin","url":"http://host/file.bin","state":"in_progress","downloaded_bytes":65536}
//! ```
//!
//! Unknown fields are ignored so newer writers can add fields. A record with
//! any other `version` is rejected rather than guessed at.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{RecordError, Result};
use crate::store::EntryStore;
use crate::types::{ProgressInfo, TaskId, TaskState};

/// Record format version written by this build
pub const RECORD_VERSION: u32 = 1;

#[derive(Serialize)]
struct RecordRef<'a> {
    version: u32,
    task_id: &'a TaskId,
    url: &'a str,
    state: TaskState,
    downloaded_bytes: u64,
}

#[derive(Deserialize)]
struct RecordV1 {
    task_id: TaskId,
    url: String,
    state: TaskState,
    downloaded_bytes: u64,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

/// Encode a snapshot as a record
pub fn encode(info: &ProgressInfo) -> Result<Vec<u8>> {
    let record = RecordRef {
        version: RECORD_VERSION,
        task_id: &info.task_id,
        url: &info.url,
        state: info.state,
        downloaded_bytes: info.downloaded_bytes,
    };
    Ok(serde_json::to_vec(&record)?)
}

/// Decode a record read from the entry `name`
pub fn decode(name: &str, bytes: &[u8]) -> Result<ProgressInfo> {
    let malformed = |e: serde_json::Error| RecordError::Malformed {
        name: name.to_string(),
        reason: e.to_string(),
    };

    let header: VersionHeader = serde_json::from_slice(bytes).map_err(malformed)?;
    if header.version != RECORD_VERSION {
        return Err(RecordError::UnsupportedVersion {
            found: header.version,
            supported: RECORD_VERSION,
        }
        .into());
    }

    let record: RecordV1 = serde_json::from_slice(bytes).map_err(malformed)?;
    Ok(ProgressInfo {
        task_id: record.task_id,
        url: record.url,
        state: record.state,
        downloaded_bytes: record.downloaded_bytes,
    })
}

/// Replace the record for `info.task_id` in `store`
///
/// The previous record is deleted before the new one is created.
pub async fn save(store: &dyn EntryStore, info: &ProgressInfo) -> Result<()> {
    let bytes = encode(info)?;
    let name = info.task_id.as_str();

    store.delete(name).await?;
    let mut writer = store.create(name).await?;
    writer.write_all(&bytes).await?;
    writer.shutdown().await?;
    Ok(())
}

/// Load the record for `id`, or `None` if the store has none
pub async fn load(store: &dyn EntryStore, id: &TaskId) -> Result<Option<ProgressInfo>> {
    let Some(mut reader) = store.read(id.as_str()).await? else {
        return Ok(None);
    };
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).await?;
    decode(id.as_str(), &bytes).map(Some)
}
