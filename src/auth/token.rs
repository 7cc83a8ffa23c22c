//! HS256 bearer tokens for access and refresh sessions.
//!
//! Access and refresh tokens are signed with different secrets. A refresh token
//! presented as an access token (or the reverse) therefore fails signature
//! checks with the expected key; it is reported as `wrong-type` when the other
//! key verifies it.
//!
//! Expiry is checked against the injected clock instead of the system time.

use anyhow::{Result, bail};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::error::{AuthError, AuthResult, TokenInvalidReason};
use super::session::{AccessSession, RefreshSession};
use super::state::AuthConfig;
use crate::clock::Clock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub sub: Uuid,
    pub company_id: Option<Uuid>,
    // Refresh tokens carry no profile claims.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub is_super_admin: bool,
    pub session_id: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

pub struct TokenCodec {
    access: KeyPair,
    refresh: KeyPair,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// # Errors
    /// Returns an error if a secret is empty or both secrets are equal.
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let access = config.access_secret().expose_secret().as_bytes();
        let refresh = config.refresh_secret().expose_secret().as_bytes();
        if access.is_empty() || refresh.is_empty() {
            bail!("token secrets must not be empty");
        }
        if access == refresh {
            bail!("access and refresh token secrets must differ");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        Ok(Self {
            access: KeyPair::from_secret(access),
            refresh: KeyPair::from_secret(refresh),
            validation,
            clock,
        })
    }

    fn keys(&self, token_type: TokenType) -> &KeyPair {
        match token_type {
            TokenType::Access => &self.access,
            TokenType::Refresh => &self.refresh,
        }
    }

    /// # Errors
    /// Returns [`AuthError::Internal`] if signing fails.
    pub fn sign_access(&self, session: &AccessSession) -> AuthResult<String> {
        let claims = Claims {
            sub: session.user_id,
            company_id: session.company_id,
            email: Some(session.email.clone()),
            role: Some(session.role.clone()),
            is_super_admin: session.is_super_admin,
            session_id: session.session_id.clone(),
            token_type: TokenType::Access,
            iat: session.created_at.timestamp(),
            exp: session.expires_at.timestamp(),
        };
        self.sign(&claims)
    }

    /// # Errors
    /// Returns [`AuthError::Internal`] if signing fails.
    pub fn sign_refresh(&self, session: &RefreshSession) -> AuthResult<String> {
        let claims = Claims {
            sub: session.user_id,
            company_id: session.company_id,
            email: None,
            role: None,
            is_super_admin: false,
            session_id: session.session_id.clone(),
            token_type: TokenType::Refresh,
            iat: session.created_at.timestamp(),
            exp: session.expires_at.timestamp(),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> AuthResult<String> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.keys(claims.token_type).encoding,
        )
        .map_err(|err| AuthError::Internal(format!("failed to sign token: {err}")))
    }

    /// Verify signature, type and expiry.
    ///
    /// # Errors
    /// Returns [`AuthError::TokenInvalid`] with the reason for rejection.
    pub fn verify(&self, token: &str, expected: TokenType) -> AuthResult<Claims> {
        let claims = match decode::<Claims>(token, &self.keys(expected).decoding, &self.validation)
        {
            Ok(data) => data.claims,
            Err(err) => return Err(self.classify(token, expected, err.kind())),
        };

        if claims.token_type != expected {
            return Err(invalid(TokenInvalidReason::WrongType));
        }
        if self.clock.now().timestamp() >= claims.exp {
            return Err(invalid(TokenInvalidReason::Expired));
        }
        Ok(claims)
    }

    fn classify(&self, token: &str, expected: TokenType, kind: &ErrorKind) -> AuthError {
        let other = match expected {
            TokenType::Access => TokenType::Refresh,
            TokenType::Refresh => TokenType::Access,
        };
        if matches!(kind, ErrorKind::InvalidSignature)
            && decode::<Claims>(token, &self.keys(other).decoding, &self.validation).is_ok()
        {
            invalid(TokenInvalidReason::WrongType)
        } else {
            invalid(TokenInvalidReason::Malformed)
        }
    }
}

const fn invalid(reason: TokenInvalidReason) -> AuthError {
    AuthError::TokenInvalid(reason)
}
