//! Embedding worker: consumes `events:new_document`, extracts and chunks the
//! document text, embeds the chunks in one batch and stores the vectors.

mod chunk;
mod extract;
mod worker;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;

use vox_core::{EMBEDDING_GROUP, NEW_DOCUMENT_STREAM, Settings};
use vox_db::RestDatabase;
use vox_dlq::DlqSink;
use vox_models::{EMBEDDING_DIM, OpenAiEmbeddings};
use vox_retry::RetryPolicy;
use vox_storage::S3BlobStore;
use vox_stream::{Healthbeat, RedisStreamStore, SharedStreamStore, StageConfig, StageRunner};

use worker::EmbeddingHandler;

const SERVICE: &str = "embedding-worker";

#[tokio::main]
async fn main() -> Result<()> {
    vox_telemetry::install(SERVICE)?;
    let settings = Settings::from_env()?;

    let store: SharedStreamStore = Arc::new(RedisStreamStore::connect(&settings.redis_url).await?);
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()?;
    let db = Arc::new(RestDatabase::new(&settings.db, http.clone(), EMBEDDING_DIM));
    let blob = Arc::new(S3BlobStore::new(&settings.blob)?);
    let embeddings = Arc::new(OpenAiEmbeddings::new(http, &settings.models.openai_api_key));

    let handler = Arc::new(EmbeddingHandler::new(db, blob, embeddings));
    let dlq = Arc::new(DlqSink::new(store.clone(), SERVICE));
    let runner = StageRunner::new(
        store,
        handler,
        dlq,
        RetryPolicy::default(),
        Healthbeat::new(&settings.healthbeat_file),
        StageConfig::new(SERVICE, NEW_DOCUMENT_STREAM, EMBEDDING_GROUP),
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown signal received");
        stop_tx.send(true).ok();
    });

    runner.run(stop_rx).await
}
