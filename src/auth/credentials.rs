//! Password check combined with lockout bookkeeping.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::account::{Account, AccountStatus, AccountStore};
use super::brute_force::BruteForceGuard;
use super::error::{AuthError, AuthResult};
use super::password::HashWorkerPool;
use super::utils::{normalize_email, random_token};

#[derive(Debug)]
pub struct CredentialVerifier {
    accounts: Arc<dyn AccountStore>,
    guard: Arc<BruteForceGuard>,
    pool: HashWorkerPool,
    // Compared against when the email is unknown so the miss costs a full hash.
    dummy_hash: String,
}

impl CredentialVerifier {
    /// # Errors
    /// Returns an error if the placeholder hash cannot be computed.
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        guard: Arc<BruteForceGuard>,
        pool: HashWorkerPool,
    ) -> Result<Self> {
        let secret = random_token(32)?;
        let dummy_hash = pool
            .hasher()
            .hash(&secret)
            .context("failed to compute placeholder password hash")?;
        Ok(Self {
            accounts,
            guard,
            pool,
            dummy_hash,
        })
    }

    /// Resolve `email`/`password` to an active, unlocked account.
    ///
    /// # Errors
    /// - [`AuthError::InvalidCredentials`] for unknown emails and wrong passwords.
    /// - [`AuthError::AccountInactive`] for accounts that are not active.
    /// - [`AuthError::AccountLocked`] while a lockout is in effect.
    #[instrument(skip(self, email, password))]
    pub async fn verify(&self, email: &str, password: &str) -> AuthResult<Account> {
        let email = normalize_email(email);
        let Some(mut account) = self
            .accounts
            .find_by_email(&email)
            .await
            .map_err(AuthError::Accounts)?
        else {
            self.compare(password, &self.dummy_hash).await?;
            debug!("login for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if account.status != AccountStatus::Active {
            self.compare(password, &self.dummy_hash).await?;
            debug!(
                account_id = %account.id,
                status = account.status.as_str(),
                "login for inactive account"
            );
            return Err(AuthError::AccountInactive);
        }

        self.guard.check_locked(&mut account).await?;

        if !self.compare(password, &account.password_hash).await? {
            self.guard.record_failure(&mut account).await?;
            return Err(AuthError::InvalidCredentials);
        }

        self.guard.record_success(&mut account).await?;
        Ok(account)
    }

    async fn compare(&self, password: &str, hash: &str) -> AuthResult<bool> {
        self.pool
            .compare(password, hash)
            .await
            .map_err(|err| AuthError::Internal(format!("{err:#}")))
    }
}
