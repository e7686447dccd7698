pub mod admin;
pub mod agents;
pub mod health;
pub mod knowledge;
pub mod messages;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::{delete, get, post};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::rate;
use crate::state::AppState;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|origin| origin == "*") {
        layer.allow_origin(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(parsed))
    }
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/messages/whatsapp", post(messages::ingest))
        .route("/knowledge/upload", post(knowledge::upload))
        .route("/knowledge/documents", get(knowledge::list_documents))
        .route(
            "/agents/me",
            post(agents::upsert_agent).get(agents::my_agent),
        )
        .route("/agents", get(agents::list_agents))
        .route("/agent/activate", post(agents::activate_agent))
        .route("/admin/dlq", get(admin::list_dlq))
        .route("/admin/dlq/reprocess", post(admin::reprocess_entry))
        .route("/admin/dlq/item", delete(admin::delete_entry))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate::rate_limit,
        ))
        .layer(DefaultBodyLimit::max(knowledge::MAX_UPLOAD_BYTES + 64 * 1024));

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health::health))
        .route("/health/deep", get(health::deep_health))
        .layer(cors_layer(&state.settings.frontend_origins))
        .with_state(state)
}
