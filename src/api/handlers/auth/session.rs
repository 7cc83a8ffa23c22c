//! Endpoints that act on the caller's own sessions.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::instrument;

use super::{
    types::{ErrorResponse, SessionsResponse},
    utils::{extract_bearer_token, require_auth},
};
use crate::auth::{AuthContext, AuthService};

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Access token is valid", body = AuthContext),
        (status = 401, description = "Missing, invalid, revoked or expired token", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn session(headers: HeaderMap, auth: Extension<Arc<AuthService>>) -> Response {
    match require_auth(&headers, &auth).await {
        Ok(context) => (StatusCode::OK, Json(context)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/sessions",
    responses(
        (status = 200, description = "Live session ids of the caller, oldest first", body = SessionsResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn sessions(headers: HeaderMap, auth: Extension<Arc<AuthService>>) -> Response {
    let context = match require_auth(&headers, &auth).await {
        Ok(context) => context,
        Err(err) => return err.into_response(),
    };
    match auth.get_active_sessions(context.user_id).await {
        Ok(sessions) => (StatusCode::OK, Json(SessionsResponse { sessions })).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session ended and token revoked"),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn logout(headers: HeaderMap, auth: Extension<Arc<AuthService>>) -> Response {
    let context = match require_auth(&headers, &auth).await {
        Ok(context) => context,
        Err(err) => return err.into_response(),
    };
    match auth
        .logout(&context.session_id, extract_bearer_token(&headers))
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout-all",
    responses(
        (status = 204, description = "Every session of the caller ended"),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn logout_all(headers: HeaderMap, auth: Extension<Arc<AuthService>>) -> Response {
    let context = match require_auth(&headers, &auth).await {
        Ok(context) => context,
        Err(err) => return err.into_response(),
    };
    match auth.logout_all(context.user_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}
