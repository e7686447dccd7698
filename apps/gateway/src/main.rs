//! Voxflow gateway: the public HTTP surface. Accepts WhatsApp webhook
//! ingress, knowledge uploads and agent configuration, serves the admin DLQ
//! workflow, and exposes liveness probes. Everything asynchronous happens on
//! the streams; this process only validates, persists and enqueues.

mod auth;
mod error;
mod rate;
mod routes;
mod state;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use anyhow::{Context, Result};

use state::AppState;
use vox_core::Settings;
use vox_db::RestDatabase;
use vox_models::EMBEDDING_DIM;
use vox_storage::S3BlobStore;
use vox_stream::RedisStreamStore;

const SERVICE: &str = "gateway";

#[tokio::main]
async fn main() -> Result<()> {
    vox_telemetry::install(SERVICE)?;
    let settings = Settings::from_env()?;

    let store = Arc::new(RedisStreamStore::connect(&settings.redis_url).await?);
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;
    let db = Arc::new(RestDatabase::new(&settings.db, http, EMBEDDING_DIM));
    let blob = Arc::new(S3BlobStore::new(&settings.blob)?);

    let bind_addr = settings.bind_addr.clone();
    let state = AppState::new(settings, store, db, blob);
    let app = routes::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "gateway listening");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
