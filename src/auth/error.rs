//! Error taxonomy for the auth core.
//!
//! Every fallible operation returns [`AuthResult`], so call sites match on the
//! variant instead of inspecting messages.

use std::fmt;
use thiserror::Error;

use crate::store::StoreError;

/// Why a bearer token was rejected before any session lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenInvalidReason {
    /// Bad structure, bad signature or undecodable claims.
    Malformed,
    Expired,
    /// Signed with the other token kind's secret, or carrying the other `type` claim.
    WrongType,
}

impl TokenInvalidReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Expired => "expired",
            Self::WrongType => "wrong-type",
        }
    }
}

impl fmt::Display for TokenInvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    // Rendered like InvalidCredentials so account state cannot be probed.
    #[error("Invalid credentials")]
    AccountInactive,
    #[error("Account locked, try again in {remaining_minutes} minutes")]
    AccountLocked { remaining_minutes: i64 },
    #[error("Invalid token ({0})")]
    TokenInvalid(TokenInvalidReason),
    #[error("Token revoked")]
    TokenRevoked,
    #[error("Session expired")]
    SessionExpired,
    #[error("Session not found")]
    SessionNotFound,
    #[error("Original session not found")]
    OriginalSessionNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("account store error: {0:#}")]
    Accounts(#[source] anyhow::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Infrastructure failures; everything else is a caller-facing rejection.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Accounts(_) | Self::Internal(_))
    }

    /// Message safe to return to the caller.
    #[must_use]
    pub fn public_message(&self) -> String {
        if self.is_fatal() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn inactive_and_invalid_credentials_render_identically() {
        assert_eq!(
            AuthError::InvalidCredentials.public_message(),
            AuthError::AccountInactive.public_message()
        );
    }

    #[test]
    fn lockout_message_discloses_only_minutes() {
        let err = AuthError::AccountLocked {
            remaining_minutes: 5,
        };
        assert_eq!(err.public_message(), "Account locked, try again in 5 minutes");
    }

    #[test]
    fn fatal_errors_are_masked() {
        let err = AuthError::Store(StoreError::Timeout(Duration::from_secs(2)));
        assert!(err.is_fatal());
        assert_eq!(err.public_message(), "Internal server error");

        let err = AuthError::Accounts(anyhow::anyhow!("connection refused"));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("connection refused"));

        assert!(!AuthError::TokenRevoked.is_fatal());
    }

    #[test]
    fn token_reasons_render_kebab_case() {
        assert_eq!(
            AuthError::TokenInvalid(TokenInvalidReason::WrongType).to_string(),
            "Invalid token (wrong-type)"
        );
        assert_eq!(TokenInvalidReason::Expired.to_string(), "expired");
    }
}
