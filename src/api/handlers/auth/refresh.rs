use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::instrument;

use super::{
    error::error_response,
    types::{ErrorResponse, RefreshRequest, TokenResponse},
    utils::session_meta,
};
use crate::auth::AuthService;

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Refresh token consumed, new pair issued", body = TokenResponse),
        (status = 400, description = "Missing payload", body = ErrorResponse),
        (status = 401, description = "Invalid, expired or already used refresh token", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn refresh(
    headers: HeaderMap,
    auth: Extension<Arc<AuthService>>,
    payload: Option<Json<RefreshRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Missing payload");
    };

    match auth
        .refresh(request.refresh_token.trim(), &session_meta(&headers))
        .await
    {
        Ok(pair) => (StatusCode::OK, Json(TokenResponse::from(pair))).into_response(),
        Err(err) => err.into_response(),
    }
}
