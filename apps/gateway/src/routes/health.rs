use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use crate::state::AppState;
use vox_db::Database;
use vox_stream::StreamStore;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Probes the broker and the database; 503 when either is unreachable.
pub async fn deep_health(State(state): State<AppState>) -> impl IntoResponse {
    let redis_ok = state.store.ping().await.is_ok();
    let database_ok = state.db.ping().await.is_ok();

    if redis_ok && database_ok {
        (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "redis": true,
                "database": true,
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "redis": redis_ok,
                "database": database_ok,
            })),
        )
    }
}
