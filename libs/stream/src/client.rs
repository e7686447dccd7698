use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::{StreamEntry, StreamError};

pub type SharedStreamStore = Arc<dyn StreamStore>;

/// Everything the pipeline needs from the shared fast store: append-only
/// streams with consumer groups, the durable operator-facing list, and
/// sliding-window counters for ingress rate limiting.
///
/// All payloads are flat string maps; richer values travel as a single
/// JSON-encoded field.
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Creates the consumer group at stream position 0, creating the stream
    /// if needed. Succeeds idempotently when the group already exists.
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), StreamError>;

    /// Appends an entry and returns its server-assigned id. Streams are
    /// trimmed approximately to [`vox_core::STREAM_MAXLEN`].
    async fn publish(
        &self,
        stream: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<String, StreamError>;

    /// Block-reads up to `count` entries not yet delivered to this group
    /// (`>`), waiting at most `block` before returning an empty batch.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, StreamError>;

    /// Acknowledges a delivered entry. Re-acking is a no-op.
    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<(), StreamError>;

    /// Left-pushes a value onto a durable list.
    async fn list_push(&self, list: &str, value: &str) -> Result<(), StreamError>;

    /// Reads the whole list in list order (newest first).
    async fn list_range(&self, list: &str) -> Result<Vec<String>, StreamError>;

    /// Removes at most one entry equal to `value`; returns how many were
    /// removed (0 or 1).
    async fn list_remove(&self, list: &str, value: &str) -> Result<usize, StreamError>;

    /// Increments a windowed counter, arming the expiry on first increment,
    /// and returns the count inside the current window.
    async fn counter_incr(&self, key: &str, window: Duration) -> Result<u64, StreamError>;

    /// Liveness probe for the deep health check.
    async fn ping(&self) -> Result<(), StreamError>;
}
