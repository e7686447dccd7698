//! Helpers for quarantining failed entries and working the operator DLQ.
//!
//! Two artifacts on purpose: `events:dead_letter_queue` is the transport
//! (bounded, consumed once by the monitor) and `dlq:persistent_failures` is
//! the operator surface (unbounded list, human workflow). [`DlqSink`] feeds
//! the former; the monitor moves entries into the latter, where the admin
//! API and CLI reprocess or discard them.
//!
//! ```no_run
//! use std::sync::Arc;
//! use vox_dlq::DlqSink;
//! use vox_stream::{FailureSink, MemoryStreamStore, StreamEntry};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let store = Arc::new(MemoryStreamStore::new());
//! let sink = DlqSink::new(store, "transcription-worker");
//! let entry = StreamEntry::new("1-0", Default::default());
//! sink.quarantine(&entry, "download failed after 4 attempts").await?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use vox_core::{DEAD_LETTER_STREAM, DLQ_PERSISTENT_LIST};
use vox_stream::{FailureSink, SharedStreamStore, StreamEntry, StreamStore};

/// Fields the sink adds to a quarantined envelope.
pub const ERROR_SERVICE_FIELD: &str = "error_service";
pub const ERROR_TIMESTAMP_FIELD: &str = "error_timestamp";
pub const ERROR_DETAILS_FIELD: &str = "error_details";

/// Publishes terminally-failed entries onto the shared dead-letter stream,
/// augmented with the failing service, a unix-seconds timestamp and the
/// error message.
pub struct DlqSink {
    store: SharedStreamStore,
    service: String,
}

impl DlqSink {
    pub fn new(store: SharedStreamStore, service: impl Into<String>) -> Self {
        Self {
            store,
            service: service.into(),
        }
    }
}

#[async_trait]
impl FailureSink for DlqSink {
    async fn quarantine(&self, entry: &StreamEntry, details: &str) -> Result<()> {
        let mut fields = entry.fields.clone();
        fields.insert(ERROR_SERVICE_FIELD.into(), self.service.clone());
        fields.insert(
            ERROR_TIMESTAMP_FIELD.into(),
            time::OffsetDateTime::now_utc().unix_timestamp().to_string(),
        );
        fields.insert(ERROR_DETAILS_FIELD.into(), details.to_string());

        let dlq_id = self
            .store
            .publish(DEAD_LETTER_STREAM, &fields)
            .await
            .with_context(|| format!("publish DLQ entry for '{}'", entry.id))?;
        info!(
            service = %self.service,
            entry_id = %entry.id,
            dlq_id = %dlq_id,
            "dlq entry published"
        );
        Ok(())
    }
}

/// One operator-visible failure, serialized as a single JSON string on the
/// persistent list. `data` keeps the full envelope so reprocessing restores
/// the original fields byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentEntry {
    pub message_id: String,
    pub data: BTreeMap<String, String>,
}

impl PersistentEntry {
    pub fn from_stream_entry(entry: &StreamEntry) -> Self {
        Self {
            message_id: entry.id.clone(),
            data: entry.fields.clone(),
        }
    }

    /// Canonical serialization; equality on the list is string equality, so
    /// every writer must go through this.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("serialize persistent DLQ entry")
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("parse persistent DLQ entry")
    }
}

/// Appends a failure to the operator list.
pub async fn persist(store: &SharedStreamStore, entry: &PersistentEntry) -> Result<()> {
    store
        .list_push(DLQ_PERSISTENT_LIST, &entry.to_json()?)
        .await
        .context("push persistent DLQ entry")
}

/// Reads the whole operator list, newest first. Entries that fail to parse
/// are skipped rather than failing the listing.
pub async fn list(store: &SharedStreamStore) -> Result<Vec<PersistentEntry>> {
    let raw = store
        .list_range(DLQ_PERSISTENT_LIST)
        .await
        .context("read persistent DLQ list")?;
    Ok(raw
        .iter()
        .filter_map(|value| PersistentEntry::from_json(value).ok())
        .collect())
}

/// Removes exactly one entry equal to `entry`. Returns `false` when no equal
/// entry was on the list (already handled by another operator).
pub async fn discard(store: &SharedStreamStore, entry: &PersistentEntry) -> Result<bool> {
    let removed = store
        .list_remove(DLQ_PERSISTENT_LIST, &entry.to_json()?)
        .await
        .context("remove persistent DLQ entry")?;
    Ok(removed > 0)
}

/// Re-enqueues the entry's original envelope onto `target_stream`, then
/// removes the entry from the list. Returns `false` when the entry was no
/// longer on the list; the envelope is still re-enqueued in that case, which
/// keeps reprocessing at-least-once like the rest of the pipeline.
pub async fn reprocess(
    store: &SharedStreamStore,
    entry: &PersistentEntry,
    target_stream: &str,
) -> Result<bool> {
    store
        .publish(target_stream, &entry.data)
        .await
        .with_context(|| format!("re-enqueue DLQ entry onto '{target_stream}'"))?;
    discard(store, entry).await
}
