//! Operator escape hatch for locked accounts.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{error::error_response, types::ErrorResponse, utils::require_auth};
use crate::auth::AuthService;

#[utoipa::path(
    post,
    path = "/v1/auth/accounts/{account_id}/unlock",
    params(
        ("account_id" = Uuid, Path, description = "Account to unlock")
    ),
    responses(
        (status = 204, description = "Lockout cleared"),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Caller is not a super admin", body = ErrorResponse),
        (status = 404, description = "Unknown account", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip(headers, auth))]
pub async fn unlock_account(
    headers: HeaderMap,
    auth: Extension<Arc<AuthService>>,
    Path(account_id): Path<Uuid>,
) -> Response {
    let context = match require_auth(&headers, &auth).await {
        Ok(context) => context,
        Err(err) => return err.into_response(),
    };
    if !context.is_super_admin {
        return error_response(StatusCode::FORBIDDEN, "Forbidden");
    }

    match auth.unlock_account(account_id).await {
        Ok(true) => {
            info!(operator = %context.user_id, account_id = %account_id, "account unlocked");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Account not found"),
        Err(err) => err.into_response(),
    }
}
