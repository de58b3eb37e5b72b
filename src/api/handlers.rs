//! HTTP handlers for the help-desk API.
//!
//! Handlers stay thin: decode the request, call the lifecycle or auth
//! service, and map the typed failure onto an HTTP status. The mapping
//! follows the original surface: authorization failures are 403, state
//! mismatches are 400, missing records are 404, integrity and storage
//! failures are 500 and never leak detail to the caller.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use super::types::{
    CommentBody, CreateRequestBody, DeclineBody, EditRequestBody, ListRequestsQuery, LoginBody,
    LoginResponse, RegisterBody,
};
use crate::auth::AuthError;
use crate::lifecycle::state::RequestId;
use crate::lifecycle::transition::LifecycleError;
use crate::lifecycle::Actor;
use crate::repository::RequestFilter;
use crate::AppState;

/// Typed failures of the HTTP surface.
#[derive(Debug)]
pub enum ApiError {
    Lifecycle(LifecycleError),
    Auth(AuthError),
    /// No usable `Authorization: Bearer <token>` header.
    MissingToken,
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        Self::Lifecycle(err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Lifecycle(err) => match &err {
                LifecycleError::NotAuthorized => {
                    error_body(StatusCode::FORBIDDEN, &err.to_string())
                }
                LifecycleError::InvalidTransition { .. } => {
                    error_body(StatusCode::BAD_REQUEST, &err.to_string())
                }
                LifecycleError::NotFound => error_body(StatusCode::NOT_FOUND, &err.to_string()),
                LifecycleError::RequestNotOpenForComments { .. } => {
                    error_body(StatusCode::FORBIDDEN, &err.to_string())
                }
                LifecycleError::Repository(inner) => {
                    error!("repository failure: {inner}");
                    error_body(StatusCode::INTERNAL_SERVER_ERROR, "internal storage error")
                }
            },
            Self::Auth(err) => match &err {
                AuthError::InvalidToken | AuthError::TokenExpired => {
                    error_body(StatusCode::UNAUTHORIZED, &err.to_string())
                }
                AuthError::InvalidCredentials => {
                    error_body(StatusCode::UNAUTHORIZED, &err.to_string())
                }
                AuthError::UsernameTaken => error_body(StatusCode::BAD_REQUEST, &err.to_string()),
                AuthError::Repository(inner) => {
                    error!("repository failure: {inner}");
                    error_body(StatusCode::INTERNAL_SERVER_ERROR, "internal storage error")
                }
            },
            Self::MissingToken => error_body(
                StatusCode::UNAUTHORIZED,
                "missing Authorization header, expected: Bearer <token>",
            ),
        }
    }
}

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

// =============================================================================
// Users
// =============================================================================

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = state.auth.register(&body.username, &body.password).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": actor.id, "username": actor.username })),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginBody>,
) -> Result<Json<LoginResponse>, ApiError> {
    let token = state.auth.login(&body.username, &body.password).await?;
    Ok(Json(LoginResponse { token }))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = bearer_token(&headers).ok_or(ApiError::MissingToken)?;
    state.auth.logout(token).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Requests
// =============================================================================

pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ListRequestsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let requests = state
        .lifecycle
        .list_requests(
            &actor,
            RequestFilter {
                status: query.status,
                priority: query.priority,
                requester: None,
            },
        )
        .await?;
    Ok(Json(requests))
}

pub async fn create_request(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<CreateRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .lifecycle
        .create_request(&actor, body.subject, body.text, body.priority)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn get_request(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state.lifecycle.get_request(&actor, RequestId(id)).await?;
    Ok(Json(request))
}

pub async fn edit_request(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(body): Json<EditRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .lifecycle
        .edit_request(&actor, RequestId(id), body.text, body.priority)
        .await?;
    Ok(Json(request))
}

pub async fn delete_request(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.lifecycle.delete_request(&actor, RequestId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Transitions
// =============================================================================

pub async fn approve(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state.lifecycle.approve(&actor, RequestId(id)).await?;
    Ok(Json(request))
}

pub async fn decline(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(body): Json<DeclineBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .lifecycle
        .decline(&actor, RequestId(id), &body.comment)
        .await?;
    Ok(Json(request))
}

pub async fn start_processing(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .lifecycle
        .start_processing(&actor, RequestId(id))
        .await?;
    Ok(Json(request))
}

pub async fn complete_processing(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .lifecycle
        .complete_processing(&actor, RequestId(id))
        .await?;
    Ok(Json(request))
}

pub async fn resend_review(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .lifecycle
        .request_restoration(&actor, RequestId(id))
        .await?;
    Ok(Json(request))
}

pub async fn declined_reason(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let reason = state
        .lifecycle
        .declined_reason(&actor, RequestId(id))
        .await?;
    Ok(Json(reason))
}

// =============================================================================
// Comments
// =============================================================================

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let comments = state.lifecycle.list_comments(&actor, RequestId(id)).await?;
    Ok(Json(comments))
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(body): Json<CommentBody>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state
        .lifecycle
        .add_comment(&actor, RequestId(id), body.message)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::state::Status;
    use crate::lifecycle::Transition;
    use crate::repository::RepositoryError;

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(header::AUTHORIZATION, "Basic abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn lifecycle_errors_map_to_expected_statuses() {
        let cases = [
            (
                ApiError::from(LifecycleError::NotAuthorized),
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::from(LifecycleError::InvalidTransition {
                    operation: Transition::Approve,
                    current: Status::Completed,
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(LifecycleError::NotFound),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(LifecycleError::RequestNotOpenForComments {
                    current: Status::Active,
                }),
                StatusCode::FORBIDDEN,
            ),
            (ApiError::MissingToken, StatusCode::UNAUTHORIZED),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn repository_failures_are_500_and_leak_no_detail() {
        let err = ApiError::from(LifecycleError::Repository(RepositoryError::storage(
            "get request",
            "disk I/O error",
        )));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "internal storage error");
    }

    #[test]
    fn auth_errors_map_to_expected_statuses() {
        let cases = [
            (
                ApiError::from(AuthError::InvalidToken),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::from(AuthError::TokenExpired),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::from(AuthError::InvalidCredentials),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::from(AuthError::UsernameTaken),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
