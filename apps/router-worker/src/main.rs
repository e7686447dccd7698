//! Router worker: consumes `events:transcribed_message`, resolves the user's
//! agent and history, runs the task router (RAG included), and publishes the
//! reply onto `events:message_out`.

mod worker;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;

use vox_core::{ROUTER_GROUP, Settings, TRANSCRIBED_MESSAGE_STREAM};
use vox_db::RestDatabase;
use vox_dlq::DlqSink;
use vox_models::{DeepSeekModel, EMBEDDING_DIM, GeminiChat, OpenAiEmbeddings};
use vox_retry::RetryPolicy;
use vox_router::{ProcessMessage, RagConfig, TaskRouter};
use vox_stream::{Healthbeat, RedisStreamStore, SharedStreamStore, StageConfig, StageRunner};

use worker::ReplyHandler;

const SERVICE: &str = "router-worker";

#[tokio::main]
async fn main() -> Result<()> {
    vox_telemetry::install(SERVICE)?;
    let settings = Settings::from_env()?;

    let store: SharedStreamStore = Arc::new(RedisStreamStore::connect(&settings.redis_url).await?);
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()?;
    let db = Arc::new(RestDatabase::new(&settings.db, http.clone(), EMBEDDING_DIM));

    let router = TaskRouter::new(
        Arc::new(DeepSeekModel::reasoner(
            http.clone(),
            &settings.models.deepseek_api_key,
        )),
        Arc::new(DeepSeekModel::extractor(
            http.clone(),
            &settings.models.deepseek_api_key,
        )),
        Arc::new(GeminiChat::new(
            http.clone(),
            &settings.models.google_api_key,
        )),
        Arc::new(OpenAiEmbeddings::new(http, &settings.models.openai_api_key)),
        db.clone(),
        RagConfig::default(),
    );
    let process = Arc::new(ProcessMessage::new(router, db));

    let handler = Arc::new(ReplyHandler::new(store.clone(), process));
    let dlq = Arc::new(DlqSink::new(store.clone(), SERVICE));
    let runner = StageRunner::new(
        store,
        handler,
        dlq,
        RetryPolicy::default(),
        Healthbeat::new(&settings.healthbeat_file),
        StageConfig::new(SERVICE, TRANSCRIBED_MESSAGE_STREAM, ROUTER_GROUP),
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown signal received");
        stop_tx.send(true).ok();
    });

    runner.run(stop_rx).await
}
