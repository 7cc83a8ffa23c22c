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
    types::{AccountSummary, ErrorResponse, LoginRequest, LoginResponse, TokenResponse},
    utils::{session_meta, valid_email},
};
use crate::auth::AuthService;

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credentials accepted, new session pair issued", body = LoginResponse),
        (status = 400, description = "Missing payload or malformed email", body = ErrorResponse),
        (status = 401, description = "Invalid credentials or account locked", body = ErrorResponse),
        (status = 500, description = "Store or database failure", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    headers: HeaderMap,
    auth: Extension<Arc<AuthService>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Missing payload");
    };
    if !valid_email(&request.email) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid email");
    }

    match auth
        .login(&request.email, &request.password, &session_meta(&headers))
        .await
    {
        Ok(outcome) => {
            let response = LoginResponse {
                user: AccountSummary::from(&outcome.account),
                tokens: TokenResponse::from(outcome.tokens),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{EMAIL, PASSWORD, fixture};
    use crate::auth::AccountStore;
    use anyhow::{Context, Result};
    use axum::body::to_bytes;
    use axum::http::HeaderValue;

    fn request(email: &str, password: &str) -> Option<Json<LoginRequest>> {
        Some(Json(LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }))
    }

    async fn json(response: Response) -> Result<serde_json::Value> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[tokio::test]
    async fn login_returns_tokens_and_account() -> Result<()> {
        let fixture = fixture(false).await?;
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("rentgate-tests"));

        let response = login(
            headers,
            Extension(fixture.handles.auth.clone()),
            request("A@X.com", PASSWORD),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await?;
        assert_eq!(body["user"]["email"], EMAIL);
        assert_eq!(body["token_type"], "Bearer");
        let session_id = body["session_id"].as_str().context("missing session_id")?;

        let sessions = fixture
            .handles
            .auth
            .get_active_sessions(fixture.account.id)
            .await?;
        assert!(sessions.iter().any(|id| id == session_id));
        Ok(())
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_are_indistinguishable() -> Result<()> {
        let fixture = fixture(false).await?;
        let auth = Extension(fixture.handles.auth.clone());

        let wrong = login(HeaderMap::new(), auth.clone(), request(EMAIL, "nope")).await;
        let unknown = login(HeaderMap::new(), auth, request("b@x.com", PASSWORD)).await;
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(wrong).await?, json(unknown).await?);

        let stored = fixture.accounts.find_by_id(fixture.account.id).await?;
        assert_eq!(stored.map(|account| account.login_attempts), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_requests_are_bad_requests() -> Result<()> {
        let fixture = fixture(false).await?;
        let auth = Extension(fixture.handles.auth.clone());

        let missing = login(HeaderMap::new(), auth.clone(), None).await;
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let invalid = login(HeaderMap::new(), auth, request("not-an-email", PASSWORD)).await;
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
