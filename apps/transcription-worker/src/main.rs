//! Transcription worker: consumes `events:new_message`, transcribes voice
//! notes fetched from the blob store, and republishes every message onto
//! `events:transcribed_message` with a plain-text body.

mod audio;
mod worker;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;

use vox_core::{NEW_MESSAGE_STREAM, Settings, TRANSCRIPTION_GROUP};
use vox_dlq::DlqSink;
use vox_models::WhisperHttpTranscriber;
use vox_retry::RetryPolicy;
use vox_storage::S3BlobStore;
use vox_stream::{Healthbeat, RedisStreamStore, SharedStreamStore, StageConfig, StageRunner};

use worker::TranscriptionHandler;

const SERVICE: &str = "transcription-worker";

#[tokio::main]
async fn main() -> Result<()> {
    vox_telemetry::install(SERVICE)?;
    let settings = Settings::from_env()?;

    let store: SharedStreamStore = Arc::new(RedisStreamStore::connect(&settings.redis_url).await?);
    let blob = Arc::new(S3BlobStore::new(&settings.blob)?);
    // ASR of a full-length voice note can legitimately take minutes.
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;
    let asr = Arc::new(WhisperHttpTranscriber::new(http, settings.asr.clone()));

    let handler = Arc::new(TranscriptionHandler::new(
        store.clone(),
        blob,
        asr,
        settings.asr.language.clone(),
    ));
    let dlq = Arc::new(DlqSink::new(store.clone(), SERVICE));
    let runner = StageRunner::new(
        store,
        handler,
        dlq,
        RetryPolicy::default(),
        Healthbeat::new(&settings.healthbeat_file),
        StageConfig::new(SERVICE, NEW_MESSAGE_STREAM, TRANSCRIPTION_GROUP),
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown signal received");
        stop_tx.send(true).ok();
    });

    runner.run(stop_rx).await
}
