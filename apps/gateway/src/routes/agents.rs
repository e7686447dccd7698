use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use vox_db::{AgentStatus, Database, NewAgent};

pub async fn upsert_agent(
    State(state): State<AppState>,
    user: AuthUser,
    Json(config): Json<NewAgent>,
) -> Result<impl IntoResponse, ApiError> {
    let agent = state
        .db
        .upsert_agent(&user.user_id, &config)
        .await
        .map_err(|err| ApiError::internal("Failed to save agent configuration.", err))?;
    Ok((StatusCode::CREATED, Json(agent)))
}

pub async fn my_agent(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let agent = state
        .db
        .agent_for_user(&user.user_id)
        .await
        .map_err(|err| ApiError::internal("Failed to load agent", err))?
        .ok_or_else(|| ApiError::not_found("Agent configuration not found for this user."))?;
    Ok(Json(agent))
}

pub async fn list_agents(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let agents = state
        .db
        .agents_for_user(&user.user_id)
        .await
        .map_err(|err| ApiError::internal("Failed to list agents", err))?;
    Ok(Json(agents))
}

pub async fn activate_agent(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let agent = state
        .db
        .agent_for_user(&user.user_id)
        .await
        .map_err(|err| ApiError::internal("Failed to load agent", err))?
        .ok_or_else(|| ApiError::not_found("Agent not found"))?;

    let updated = state
        .db
        .set_agent_status(&agent.id, AgentStatus::Active)
        .await
        .map_err(|err| ApiError::internal("Failed to update agent status", err))?;
    if !updated {
        return Err(ApiError::internal(
            "Failed to update agent status",
            "agent row vanished during activation",
        ));
    }

    Ok(Json(json!({ "status": "ok", "agent_id": agent.id })))
}
