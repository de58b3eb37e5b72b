//! REST API surface.
//!
//! The router splits into a public part (register, login) and a protected
//! part behind the bearer-token middleware. Authentication resolves the
//! token to an `Actor` and stashes it in request extensions; handlers
//! never see tokens, only actors.

pub mod handlers;
pub mod types;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use handlers::{bearer_token, ApiError};

use crate::AppState;

/// Resolve the bearer token to an `Actor` and pass it along in request
/// extensions. Applied to every route that needs an authenticated caller.
async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers()).ok_or(ApiError::MissingToken)?;
    let actor = state.auth.authenticate(token).await?;
    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}

/// Assemble the `/api` routes.
pub fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let protected = Router::new()
        .route("/api/users/logout", post(handlers::logout))
        .route(
            "/api/requests",
            get(handlers::list_requests).post(handlers::create_request),
        )
        .route(
            "/api/requests/:id",
            get(handlers::get_request)
                .patch(handlers::edit_request)
                .delete(handlers::delete_request),
        )
        .route("/api/requests/:id/approve", post(handlers::approve))
        .route("/api/requests/:id/decline", post(handlers::decline))
        .route(
            "/api/requests/:id/start-processing",
            post(handlers::start_processing),
        )
        .route(
            "/api/requests/:id/complete-processing",
            post(handlers::complete_processing),
        )
        .route(
            "/api/requests/:id/resend-review",
            post(handlers::resend_review),
        )
        .route(
            "/api/requests/:id/declined-reason",
            get(handlers::declined_reason),
        )
        .route(
            "/api/requests/:id/comments",
            get(handlers::list_comments).post(handlers::add_comment),
        )
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    Router::new()
        .route("/api/users/register", post(handlers::register))
        .route("/api/users/login", post(handlers::login))
        .merge(protected)
}
