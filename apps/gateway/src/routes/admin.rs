use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::info;

use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::state::AppState;
use vox_core::NEW_MESSAGE_STREAM;
use vox_dlq::PersistentEntry;

pub async fn list_dlq(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<impl IntoResponse, ApiError> {
    let entries = vox_dlq::list(&state.store)
        .await
        .map_err(|err| ApiError::internal("Failed to retrieve DLQ messages", err))?;
    Ok(Json(entries))
}

/// Re-enqueues the quarantined envelope onto the primary input stream and
/// drops the entry from the operator list.
pub async fn reprocess_entry(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(entry): Json<PersistentEntry>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = vox_dlq::reprocess(&state.store, &entry, NEW_MESSAGE_STREAM)
        .await
        .map_err(|err| ApiError::internal("Failed to reprocess message", err))?;
    if !removed {
        return Err(ApiError::not_found(
            "Message not found in DLQ list. It might have been reprocessed already.",
        ));
    }

    info!(
        admin = %admin.0.user_id,
        message_id = %entry.message_id,
        "DLQ entry re-queued"
    );
    Ok(Json(json!({
        "status": "ok",
        "detail": "Message re-queued for processing."
    })))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(entry): Json<PersistentEntry>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = vox_dlq::discard(&state.store, &entry)
        .await
        .map_err(|err| ApiError::internal("Failed to delete message", err))?;
    if !removed {
        return Err(ApiError::not_found("Message not found in DLQ list."));
    }

    info!(
        admin = %admin.0.user_id,
        message_id = %entry.message_id,
        "DLQ entry discarded"
    );
    Ok(Json(json!({
        "status": "ok",
        "detail": "Message deleted from DLQ."
    })))
}
