use axum::Json;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use vox_core::{DocumentEvent, NEW_DOCUMENT_STREAM};
use vox_db::{Database, NewDocument};
use vox_storage::BlobStore;
use vox_stream::StreamStore;

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const ALLOWED_CONTENT_TYPES: [&str; 3] = ["application/pdf", "text/plain", "text/markdown"];

pub async fn list_documents(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let documents = state
        .db
        .documents_for_user(&user.user_id)
        .await
        .map_err(|err| ApiError::internal("Failed to list documents", err))?;
    Ok(Json(documents))
}

struct Upload {
    file_name: String,
    content_type: String,
    data: Vec<u8>,
}

async fn read_upload(multipart: &mut Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::bad_request("Malformed multipart body"))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .unwrap_or("upload")
            .to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|_| ApiError::bad_request("File too large."))?;
        return Ok(Upload {
            file_name,
            content_type,
            data: data.to_vec(),
        });
    }
    Err(ApiError::bad_request("Missing 'file' field"))
}

/// Knowledge upload: store the blob, create the document row, enqueue the
/// embedding job. The two later steps compensate on failure so a 500 never
/// leaves an orphaned blob or row behind (best effort).
pub async fn upload(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let upload = read_upload(&mut multipart).await?;

    if !ALLOWED_CONTENT_TYPES.contains(&upload.content_type.as_str()) {
        return Err(ApiError::bad_request("Unsupported file type."));
    }
    if upload.content_type == "application/pdf" && !state.settings.knowledge_pdf_enabled {
        return Err(ApiError::new(
            StatusCode::NOT_IMPLEMENTED,
            "PDF ingestion is disabled on this deployment.",
        ));
    }
    if upload.data.len() > MAX_UPLOAD_BYTES {
        return Err(ApiError::bad_request("File too large."));
    }

    let agent = state
        .db
        .agent_for_user(&user.user_id)
        .await
        .map_err(|err| ApiError::internal("Failed to resolve agent", err))?
        .ok_or_else(|| {
            ApiError::not_found(
                "No active agent found for this user. Please configure an agent first.",
            )
        })?;

    let storage_path = format!("{}/{}-{}", user.user_id, Uuid::new_v4(), upload.file_name);
    state
        .blob
        .put(&storage_path, upload.data.into())
        .await
        .map_err(|err| ApiError::internal("Failed to upload file to storage.", err))?;

    let document = match state
        .db
        .create_document(&NewDocument {
            user_id: user.user_id.clone(),
            agent_id: agent.id.clone(),
            file_name: upload.file_name.clone(),
            storage_path: storage_path.clone(),
        })
        .await
    {
        Ok(document) => document,
        Err(err) => {
            if let Err(cleanup) = state.blob.delete(&storage_path).await {
                error!(error = %cleanup, "failed to delete blob after database failure");
            }
            return Err(ApiError::internal(
                "Failed to create document record in database.",
                err,
            ));
        }
    };

    let event = DocumentEvent {
        document_id: document.id.clone(),
        user_id: user.user_id.clone(),
        storage_path: storage_path.clone(),
        text: String::new(),
    };
    if let Err(err) = state.store.publish(NEW_DOCUMENT_STREAM, &event.to_fields()).await {
        if let Err(cleanup) = state.blob.delete(&storage_path).await {
            error!(error = %cleanup, "failed to delete blob after publish failure");
        }
        if let Err(cleanup) = state.db.delete_document(&document.id).await {
            error!(error = %cleanup, "failed to delete document row after publish failure");
        }
        return Err(ApiError::internal(
            "Failed to queue document for processing.",
            err,
        ));
    }

    info!(user_id = %user.user_id, document_id = %document.id, "document queued for embedding");
    Ok(Json(json!({
        "status": "ok",
        "message": "File uploaded and queued for processing.",
        "document_id": document.id,
    })))
}
