//! Top-level auth operations.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::account::{Account, AccountStore};
use super::brute_force::BruteForceGuard;
use super::credentials::CredentialVerifier;
use super::error::{AuthError, AuthResult, TokenInvalidReason};
use super::password::{HashWorkerPool, PasswordHasher};
use super::principal::AuthContext;
use super::revocation::RevocationList;
use super::session::{AccessSession, RefreshSession, SessionIdentity, SessionMeta, SessionStore};
use super::state::AuthConfig;
use super::token::{TokenCodec, TokenType};
use crate::clock::Clock;
use crate::store::TtlStore;

/// Signed tokens for one access/refresh pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct LoginOutcome {
    pub account: Account,
    pub tokens: TokenPair,
}

/// Shared handles the service is built from.
#[derive(Clone, Debug)]
pub struct AuthDeps {
    pub store: Arc<dyn TtlStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug)]
pub struct AuthService {
    verifier: CredentialVerifier,
    guard: Arc<BruteForceGuard>,
    sessions: SessionStore,
    tokens: TokenCodec,
    revocations: RevocationList,
}

impl AuthService {
    /// # Errors
    /// Returns an error if the token secrets are unusable or the hasher fails.
    pub fn new(config: &AuthConfig, deps: AuthDeps) -> Result<Self> {
        let guard = Arc::new(BruteForceGuard::new(
            deps.accounts.clone(),
            deps.clock.clone(),
            config.lockout_policy().clone(),
        ));
        let pool = HashWorkerPool::new(deps.hasher, config.hash_workers());
        let verifier = CredentialVerifier::new(deps.accounts, guard.clone(), pool)?;

        Ok(Self {
            verifier,
            guard,
            sessions: SessionStore::new(deps.store.clone(), deps.clock.clone(), config),
            tokens: TokenCodec::new(config, deps.clock)?,
            revocations: RevocationList::new(deps.store, config.revocation_ttl()),
        })
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[must_use]
    pub fn revocations(&self) -> &RevocationList {
        &self.revocations
    }

    /// Verify credentials and open a new session pair.
    ///
    /// # Errors
    /// Any credential, lockout or store error.
    #[instrument(skip(self, email, password, meta))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        meta: &SessionMeta,
    ) -> AuthResult<LoginOutcome> {
        let account = self.verifier.verify(email, password).await?;

        let access = self
            .sessions
            .create_access(&SessionIdentity::from(&account), meta)
            .await?;
        let refresh = self
            .sessions
            .create_refresh(account.id, account.company_id, &access.session_id, meta)
            .await?;
        let tokens = self.issue(&access, &refresh)?;

        info!(user_id = %account.id, "login succeeded");
        Ok(LoginOutcome { account, tokens })
    }

    /// Exchange a refresh token for a new pair. The old refresh token stops working.
    ///
    /// # Errors
    /// Token, session or store errors.
    #[instrument(skip(self, refresh_token, meta))]
    pub async fn refresh(&self, refresh_token: &str, meta: &SessionMeta) -> AuthResult<TokenPair> {
        let claims = self.tokens.verify(refresh_token, TokenType::Refresh)?;
        let (access, refresh) = self.sessions.rotate(&claims.session_id, meta).await?;
        self.issue(&access, &refresh)
    }

    /// End one session. When the bearer token is given it is denylisted too.
    ///
    /// The refresh session minted with this access session is destroyed as well.
    ///
    /// # Errors
    /// Store errors.
    #[instrument(skip(self, access_token))]
    pub async fn logout(&self, session_id: &str, access_token: Option<&str>) -> AuthResult<()> {
        if let Some(session) = self.sessions.get_access(session_id).await? {
            for refresh_id in self
                .sessions
                .refresh_ids_for_access(session.user_id, session_id)
                .await?
            {
                self.sessions.destroy_refresh(&refresh_id).await?;
            }
        }
        self.sessions.destroy_access(session_id).await?;
        if let Some(token) = access_token {
            self.revocations.add(token).await?;
        }
        Ok(())
    }

    /// # Errors
    /// Store errors.
    #[instrument(skip(self))]
    pub async fn logout_all(&self, user_id: Uuid) -> AuthResult<()> {
        self.sessions.destroy_all_for_user(user_id).await?;
        info!(user_id = %user_id, "all sessions destroyed");
        Ok(())
    }

    /// Resolve a bearer access token to its live session.
    ///
    /// # Errors
    /// [`AuthError::TokenRevoked`], [`AuthError::TokenInvalid`] or
    /// [`AuthError::SessionExpired`].
    pub async fn validate(&self, access_token: &str) -> AuthResult<AccessSession> {
        if self.revocations.is_revoked(access_token).await? {
            return Err(AuthError::TokenRevoked);
        }
        let claims = self.tokens.verify(access_token, TokenType::Access)?;
        let session = self.sessions.validate_access(&claims.session_id).await?;
        if session.user_id != claims.sub {
            return Err(AuthError::TokenInvalid(TokenInvalidReason::Malformed));
        }
        Ok(session)
    }

    /// # Errors
    /// Same as [`AuthService::validate`].
    pub async fn authenticate(&self, access_token: &str) -> AuthResult<AuthContext> {
        self.validate(access_token).await.map(AuthContext::from)
    }

    /// # Errors
    /// Store errors.
    pub async fn get_active_sessions(&self, user_id: Uuid) -> AuthResult<Vec<String>> {
        self.sessions.active_sessions(user_id).await
    }

    /// Clear an account's lockout. Returns `false` for unknown accounts.
    ///
    /// # Errors
    /// Account store errors.
    pub async fn unlock_account(&self, account_id: Uuid) -> AuthResult<bool> {
        self.guard.manual_unlock(account_id).await
    }

    fn issue(&self, access: &AccessSession, refresh: &RefreshSession) -> AuthResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.tokens.sign_access(access)?,
            refresh_token: self.tokens.sign_refresh(refresh)?,
            session_id: access.session_id.clone(),
            access_expires_at: access.expires_at,
            refresh_expires_at: refresh.expires_at,
        })
    }
}
