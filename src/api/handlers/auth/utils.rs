//! Header parsing shared by the auth handlers.

use axum::http::{
    HeaderMap,
    header::{AUTHORIZATION, USER_AGENT},
};
use regex::Regex;

use crate::auth::{AuthContext, AuthError, AuthService, SessionMeta, TokenInvalidReason};

const BEARER_PREFIX: &str = "Bearer ";
const MAX_USER_AGENT_LEN: usize = 256;

/// Basic email format check.
pub(super) fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email.trim()))
}

/// The token from `Authorization: Bearer <token>`, if present and non-empty.
pub(super) fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let prefix = value.get(..BEARER_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(BEARER_PREFIX) {
        return None;
    }
    Some(value[BEARER_PREFIX.len()..].trim()).filter(|token| !token.is_empty())
}

/// Client IP from common proxy headers.
pub(super) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(super) fn session_meta(headers: &HeaderMap) -> SessionMeta {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.chars().take(MAX_USER_AGENT_LEN).collect());
    SessionMeta {
        client_ip: extract_client_ip(headers),
        user_agent,
    }
}

/// Resolve the bearer token into the caller's context.
///
/// A missing header is reported like an unparsable token.
pub(super) async fn require_auth(
    headers: &HeaderMap,
    auth: &AuthService,
) -> Result<AuthContext, AuthError> {
    let token = extract_bearer_token(headers)
        .ok_or(AuthError::TokenInvalid(TokenInvalidReason::Malformed))?;
    auth.authenticate(token).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@x.com"));
        assert!(valid_email(" Name.Surname@Example.co "));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn bearer_token_is_extracted_case_insensitively() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn client_ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("10.0.0.9"));

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn session_meta_reads_user_agent() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8.0"));
        let meta = session_meta(&headers);
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(meta.client_ip, None);
    }
}
