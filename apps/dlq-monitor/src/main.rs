//! DLQ monitor: drains `events:dead_letter_queue` into the durable
//! `dlq:persistent_failures` list, where the admin API and CLI let an
//! operator reprocess or discard each failure.

mod monitor;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;

use vox_core::{DEAD_LETTER_STREAM, DLQ_MONITOR_GROUP, Settings};
use vox_dlq::DlqSink;
use vox_retry::RetryPolicy;
use vox_stream::{Healthbeat, RedisStreamStore, SharedStreamStore, StageConfig, StageRunner};

use monitor::MonitorHandler;

const SERVICE: &str = "dlq-monitor";

#[tokio::main]
async fn main() -> Result<()> {
    vox_telemetry::install(SERVICE)?;
    let settings = Settings::from_env()?;

    let store: SharedStreamStore = Arc::new(RedisStreamStore::connect(&settings.redis_url).await?);
    let handler = Arc::new(MonitorHandler::new(store.clone()));
    // The monitor's own terminal failures loop back onto the stream it
    // consumes.
    let dlq = Arc::new(DlqSink::new(store.clone(), SERVICE));
    let runner = StageRunner::new(
        store,
        handler,
        dlq,
        RetryPolicy::default(),
        Healthbeat::new(&settings.healthbeat_file),
        StageConfig::new(SERVICE, DEAD_LETTER_STREAM, DLQ_MONITOR_GROUP).batch(10),
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown signal received");
        stop_tx.send(true).ok();
    });

    runner.run(stop_rx).await
}
