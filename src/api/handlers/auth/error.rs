//! HTTP mapping for [`AuthError`].

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use super::types::ErrorResponse;
use crate::auth::AuthError;

pub(super) fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if self.is_fatal() {
            error!("auth request failed: {self}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &self.public_message());
        }

        debug!("auth request rejected: {self}");
        let mut headers = HeaderMap::new();
        if let Self::AccountLocked { remaining_minutes } = &self
            && let Ok(value) = HeaderValue::from_str(&(remaining_minutes * 60).to_string())
        {
            headers.insert(RETRY_AFTER, value);
        }
        (
            headers,
            error_response(StatusCode::UNAUTHORIZED, &self.public_message()),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenInvalidReason;
    use crate::store::StoreError;
    use anyhow::Result;
    use axum::body::to_bytes;

    async fn body(response: Response) -> Result<serde_json::Value> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[tokio::test]
    async fn rejections_are_unauthorized_with_generic_text() -> Result<()> {
        let inactive = AuthError::AccountInactive.into_response();
        assert_eq!(inactive.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body(inactive).await?["error"], "Invalid credentials");

        let token = AuthError::TokenInvalid(TokenInvalidReason::Expired).into_response();
        assert_eq!(token.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn lockout_sets_retry_after() -> Result<()> {
        let response = AuthError::AccountLocked {
            remaining_minutes: 5,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(RETRY_AFTER).and_then(|v| v.to_str().ok()),
            Some("300")
        );
        assert_eq!(
            body(response).await?["error"],
            "Account locked, try again in 5 minutes"
        );
        Ok(())
    }

    #[tokio::test]
    async fn store_failures_hide_details() -> Result<()> {
        let response =
            AuthError::Store(StoreError::Connection("refused".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(response).await?["error"], "Internal server error");
        Ok(())
    }
}
