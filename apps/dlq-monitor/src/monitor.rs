use async_trait::async_trait;
use tracing::error;

use vox_core::DEAD_LETTER_STREAM;
use vox_dlq::{ERROR_SERVICE_FIELD, PersistentEntry, persist};
use vox_stream::{HandlerError, SharedStreamStore, StageHandler, StreamEntry};

/// Moves each dead-lettered entry onto the persistent failure list and
/// leaves a loud log line for alerting. Acking happens in the runner once
/// the entry is safely on the list.
pub struct MonitorHandler {
    store: SharedStreamStore,
}

impl MonitorHandler {
    pub fn new(store: SharedStreamStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StageHandler for MonitorHandler {
    async fn handle(&self, entry: &StreamEntry) -> Result<(), HandlerError> {
        let persistent = PersistentEntry::from_stream_entry(entry);
        persist(&self.store, &persistent)
            .await
            .map_err(HandlerError::transient)?;

        error!(
            alert = "DeadLetterQueueMessagePersisted",
            stream = DEAD_LETTER_STREAM,
            message_id = %entry.id,
            service_name = entry.get(ERROR_SERVICE_FIELD).unwrap_or("unknown"),
            "failed message persisted for operator review"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use vox_core::{DLQ_MONITOR_GROUP, DLQ_PERSISTENT_LIST};
    use vox_dlq::DlqSink;
    use vox_retry::RetryPolicy;
    use vox_stream::{
        Healthbeat, MemoryStreamStore, StageConfig, StageRunner, StreamStore,
    };

    fn failed_fields() -> BTreeMap<String, String> {
        [
            ("userId", "u1"),
            ("body", "x"),
            ("error_service", "transcription-worker"),
            ("error_timestamp", "1700000000"),
            ("error_details", "download failed"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[tokio::test]
    async fn persists_message_id_and_data_as_json() {
        let store = MemoryStreamStore::new();
        let handler = MonitorHandler::new(Arc::new(store.clone()));

        let entry = StreamEntry::new("42-0", failed_fields());
        handler.handle(&entry).await.unwrap();

        let raw = store.list_range(DLQ_PERSISTENT_LIST).await.unwrap();
        assert_eq!(raw.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(&raw[0]).unwrap();
        assert_eq!(parsed["message_id"], "42-0");
        assert_eq!(parsed["data"]["userId"], "u1");
        assert_eq!(parsed["data"]["error_service"], "transcription-worker");
    }

    #[tokio::test]
    async fn monitor_stage_drains_the_dead_letter_stream() {
        let store = MemoryStreamStore::new();
        let shared: SharedStreamStore = Arc::new(store.clone());
        let handler = Arc::new(MonitorHandler::new(shared.clone()));
        let dlq = Arc::new(DlqSink::new(shared.clone(), "dlq-monitor"));
        let beat_dir = tempfile::tempdir().unwrap();

        let mut config =
            StageConfig::new("dlq-monitor", DEAD_LETTER_STREAM, DLQ_MONITOR_GROUP).batch(10);
        config.block = Duration::from_millis(20);
        let runner = StageRunner::new(
            shared,
            handler,
            dlq,
            RetryPolicy::default(),
            Healthbeat::new(beat_dir.path().join("beat")),
            config,
        );

        let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
        let run = tokio::spawn(async move { runner.run(stop_rx).await });

        store
            .publish(DEAD_LETTER_STREAM, &failed_fields())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(
            store.list_range(DLQ_PERSISTENT_LIST).await.unwrap().len(),
            1
        );
        assert!(
            store
                .pending(DEAD_LETTER_STREAM, DLQ_MONITOR_GROUP)
                .await
                .is_empty()
        );

        stop_tx.send(true).unwrap();
        run.await.unwrap().unwrap();
    }
}
