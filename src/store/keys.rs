//! Key namespaces shared by every store backend.

use base64ct::{Base64UrlUnpadded, Encoding};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const ACCESS_SESSION_PREFIX: &str = "session:access:";
pub const REFRESH_SESSION_PREFIX: &str = "session:refresh:";
pub const USER_SESSIONS_PREFIX: &str = "user:sessions:";
pub const BLACKLIST_PREFIX: &str = "token:blacklist:";

#[must_use]
pub fn access_session(session_id: &str) -> String {
    format!("{ACCESS_SESSION_PREFIX}{session_id}")
}

#[must_use]
pub fn refresh_session(session_id: &str) -> String {
    format!("{REFRESH_SESSION_PREFIX}{session_id}")
}

#[must_use]
pub fn user_sessions(user_id: Uuid) -> String {
    format!("{USER_SESSIONS_PREFIX}{user_id}")
}

/// Denylist key for a bearer token.
///
/// Only the SHA-256 digest is used so raw tokens never reach the store.
#[must_use]
pub fn blacklist(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!(
        "{BLACKLIST_PREFIX}{}",
        Base64UrlUnpadded::encode_string(&digest)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_keys_use_namespaces() {
        assert_eq!(access_session("abc"), "session:access:abc");
        assert_eq!(refresh_session("abc"), "session:refresh:abc");
        assert_eq!(
            user_sessions(Uuid::nil()),
            "user:sessions:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn blacklist_key_hides_raw_token() {
        let key = blacklist("header.claims.signature");
        assert!(key.starts_with(BLACKLIST_PREFIX));
        assert!(!key.contains("header.claims.signature"));
        assert_eq!(key, blacklist("header.claims.signature"));
        assert_ne!(key, blacklist("header.claims.other"));
    }
}
