//! Sliding-window rate limiting in the shared fast store, keyed by
//! `(user, source ip)` so replicas enforce one combined limit. The store
//! failing open keeps the API available when the limiter backend is down.

use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::auth::lenient_user_key;
use crate::error::ApiError;
use crate::state::AppState;
use vox_stream::StreamStore;

const WINDOW: Duration = Duration::from_secs(60);

pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let user = lenient_user_key(request.headers(), &state.settings.db.jwt_secret);
    let ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .unwrap_or("unknown")
        .trim()
        .to_string();

    let key = format!("rate_limit:{user}:{ip}");
    match state.store.counter_incr(&key, WINDOW).await {
        Ok(count) if count > u64::from(state.settings.api_rate_limit) => {
            ApiError::too_many_requests("Rate limit exceeded").into_response()
        }
        Ok(_) => next.run(request).await,
        Err(err) => {
            warn!(error = %err, "rate limiter unavailable, allowing request");
            next.run(request).await
        }
    }
}
