//! In-memory [`StreamStore`] with the same delivery semantics as the Redis
//! implementation, so workers and handlers can be exercised in tests without
//! a broker.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::{StreamEntry, StreamError, StreamStore};

#[derive(Default)]
struct GroupState {
    next_index: usize,
    pending: BTreeMap<String, StreamEntry>,
}

#[derive(Default)]
struct Inner {
    streams: HashMap<String, Vec<StreamEntry>>,
    groups: HashMap<(String, String), GroupState>,
    lists: HashMap<String, VecDeque<String>>,
    counters: HashMap<String, (u64, Instant)>,
    next_id: u64,
}

#[derive(Clone, Default)]
pub struct MemoryStreamStore {
    inner: Arc<Mutex<Inner>>,
    wakeup: Arc<Notify>,
}

impl MemoryStreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries ever appended to `stream`, in order. Test support.
    pub async fn entries(&self, stream: &str) -> Vec<StreamEntry> {
        let inner = self.inner.lock().await;
        inner.streams.get(stream).cloned().unwrap_or_default()
    }

    /// Ids delivered to `group` but not yet acknowledged. Test support.
    pub async fn pending(&self, stream: &str, group: &str) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner
            .groups
            .get(&(stream.to_string(), group.to_string()))
            .map(|g| g.pending.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StreamStore for MemoryStreamStore {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), StreamError> {
        let mut inner = self.inner.lock().await;
        inner.streams.entry(stream.to_string()).or_default();
        inner
            .groups
            .entry((stream.to_string(), group.to_string()))
            .or_default();
        Ok(())
    }

    async fn publish(
        &self,
        stream: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<String, StreamError> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let id = format!("{}-0", inner.next_id);
        inner
            .streams
            .entry(stream.to_string())
            .or_default()
            .push(StreamEntry::new(id.clone(), fields.clone()));
        drop(inner);
        self.wakeup.notify_waiters();
        Ok(id)
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, StreamError> {
        let _ = consumer;
        let deadline = Instant::now() + block;
        loop {
            {
                let mut inner = self.inner.lock().await;
                let entries = inner
                    .streams
                    .get(stream)
                    .cloned()
                    .unwrap_or_default();
                let state = inner
                    .groups
                    .get_mut(&(stream.to_string(), group.to_string()))
                    .ok_or_else(|| {
                        StreamError::Command(format!("NOGROUP no such group '{group}' on '{stream}'"))
                    })?;
                if state.next_index < entries.len() {
                    let end = (state.next_index + count.max(1)).min(entries.len());
                    let batch: Vec<StreamEntry> = entries[state.next_index..end].to_vec();
                    state.next_index = end;
                    for entry in &batch {
                        state.pending.insert(entry.id.clone(), entry.clone());
                    }
                    return Ok(batch);
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            let _ = tokio::time::timeout(deadline - now, self.wakeup.notified()).await;
        }
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<(), StreamError> {
        let mut inner = self.inner.lock().await;
        if let Some(state) = inner
            .groups
            .get_mut(&(stream.to_string(), group.to_string()))
        {
            state.pending.remove(id);
        }
        Ok(())
    }

    async fn list_push(&self, list: &str, value: &str) -> Result<(), StreamError> {
        let mut inner = self.inner.lock().await;
        inner
            .lists
            .entry(list.to_string())
            .or_default()
            .push_front(value.to_string());
        Ok(())
    }

    async fn list_range(&self, list: &str) -> Result<Vec<String>, StreamError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .lists
            .get(list)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_remove(&self, list: &str, value: &str) -> Result<usize, StreamError> {
        let mut inner = self.inner.lock().await;
        if let Some(entries) = inner.lists.get_mut(list) {
            if let Some(pos) = entries.iter().position(|v| v == value) {
                entries.remove(pos);
                return Ok(1);
            }
        }
        Ok(0)
    }

    async fn counter_incr(&self, key: &str, window: Duration) -> Result<u64, StreamError> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let slot = inner
            .counters
            .entry(key.to_string())
            .or_insert((0, now + window));
        if now >= slot.1 {
            *slot = (0, now + window);
        }
        slot.0 += 1;
        Ok(slot.0)
    }

    async fn ping(&self) -> Result<(), StreamError> {
        Ok(())
    }
}
