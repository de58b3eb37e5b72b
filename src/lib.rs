pub mod api;
pub mod auth;
pub mod config;
pub mod lifecycle;
pub mod repository;

use std::sync::Arc;

use axum::{http::StatusCode, response::Json, routing::get, Router};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use auth::AuthService;
use lifecycle::LifecycleService;

pub struct AppState {
    pub lifecycle: LifecycleService,
    pub auth: AuthService,
}

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "helpdesk"
    })))
}

/// Assemble the full application router: health endpoint, API routes,
/// request tracing.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(api::api_router(state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
