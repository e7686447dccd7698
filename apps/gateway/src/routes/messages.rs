use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{Value, json};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;
use vox_core::{MessageEnvelope, NEW_MESSAGE_STREAM};
use vox_db::Database;
use vox_retry::RetryPolicy;
use vox_stream::StreamStore;

fn string_field(payload: &Value, key: &str) -> String {
    payload
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Message ingress from the WhatsApp bridge. Validates, burns one message
/// credit, then enqueues. A failed publish returns 500 without restoring the
/// credit.
pub async fn ingest(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = string_field(&payload, "userId");
    if user_id.is_empty() {
        return Err(ApiError::bad_request("Missing 'userId' in payload"));
    }

    let allowed = state
        .db
        .decrement_credit(&user_id)
        .await
        .map_err(|err| ApiError::internal("Failed to check message quota", err))?;
    if !allowed {
        return Err(ApiError::too_many_requests("Message credits exhausted"));
    }

    let envelope = MessageEnvelope {
        user_id: user_id.clone(),
        chat_id: string_field(&payload, "chatId"),
        timestamp: string_field(&payload, "timestamp"),
        body: string_field(&payload, "body"),
        media_key: string_field(&payload, "mediaKey"),
        transcribed: false,
    };

    let fields = envelope.to_fields();
    RetryPolicy::publish()
        .run("publish-new-message", || {
            state.store.publish(NEW_MESSAGE_STREAM, &fields)
        })
        .await
        .map_err(|err| ApiError::internal("Failed to process message", err))?;

    info!(user_id = %user_id, "message accepted");
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))))
}
