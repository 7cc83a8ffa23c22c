//! Account records and the store contract the auth core depends on.
//!
//! Accounts are owned by the platform database. The auth core only reads them
//! and writes back the three lockout fields.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::RwLock;
use utoipa::ToSchema;
use uuid::Uuid;

use super::utils::normalize_email;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Inactive,
    Suspended,
    Pending,
}

impl AccountStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Suspended => "SUSPENDED",
            Self::Pending => "PENDING",
        }
    }
}

impl FromStr for AccountStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "INACTIVE" => Ok(Self::Inactive),
            "SUSPENDED" => Ok(Self::Suspended),
            "PENDING" => Ok(Self::Pending),
            other => Err(anyhow!("unknown account status: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub company_id: Option<Uuid>,
    pub email: String,
    /// PHC string produced by the password hasher.
    pub password_hash: String,
    pub role: String,
    pub is_super_admin: bool,
    pub status: AccountStatus,
    pub login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_failed_login: Option<DateTime<Utc>>,
}

impl Account {
    /// Active account with a clean lockout record.
    #[must_use]
    pub fn new(email: &str, password_hash: String, role: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id: None,
            email: normalize_email(email),
            password_hash,
            role: role.to_string(),
            is_super_admin: false,
            status: AccountStatus::Active,
            login_attempts: 0,
            locked_until: None,
            last_failed_login: None,
        }
    }

    #[must_use]
    pub fn with_company_id(mut self, company_id: Uuid) -> Self {
        self.company_id = Some(company_id);
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: AccountStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_super_admin(mut self, is_super_admin: bool) -> Self {
        self.is_super_admin = is_super_admin;
        self
    }

    pub(crate) fn clear_lockout(&mut self) {
        self.login_attempts = 0;
        self.locked_until = None;
        self.last_failed_login = None;
    }
}

/// Lockout fields after a failed login was counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FailedLogin {
    pub attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait AccountStore: Send + Sync + std::fmt::Debug {
    /// Look up by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>>;

    /// Persist the lockout fields (`login_attempts`, `locked_until`,
    /// `last_failed_login`) of an existing account.
    async fn save(&self, account: &Account) -> Result<()>;

    /// Count one failed login as a single atomic update.
    ///
    /// The counter restarts at 1 when the previous failure happened before
    /// `decay_cutoff`, `last_failed_login` becomes `now` and a lock that ran
    /// out by `now` is dropped. Returns `None` for unknown accounts.
    async fn record_failed_login(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        decay_cutoff: DateTime<Utc>,
    ) -> Result<Option<FailedLogin>>;

    /// Set `locked_until` to `until` unless a later lock is already stored.
    async fn extend_lockout(&self, id: Uuid, until: DateTime<Utc>) -> Result<()>;

    /// Clear the lockout fields only if the stored lock ran out by `now`.
    async fn clear_expired_lockout(&self, id: Uuid, now: DateTime<Utc>) -> Result<()>;

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// In-process account store for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<Uuid, Account>>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, account: Account) {
        self.accounts.write().await.insert(account.id, account);
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|account| account.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn save(&self, account: &Account) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let stored = accounts
            .get_mut(&account.id)
            .ok_or_else(|| anyhow!("account {} not found", account.id))?;
        stored.login_attempts = account.login_attempts;
        stored.locked_until = account.locked_until;
        stored.last_failed_login = account.last_failed_login;
        Ok(())
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        decay_cutoff: DateTime<Utc>,
    ) -> Result<Option<FailedLogin>> {
        let mut accounts = self.accounts.write().await;
        let Some(stored) = accounts.get_mut(&id) else {
            return Ok(None);
        };
        if stored.last_failed_login.is_some_and(|last| last < decay_cutoff) {
            stored.login_attempts = 0;
        }
        stored.login_attempts = stored.login_attempts.saturating_add(1);
        stored.last_failed_login = Some(now);
        if stored.locked_until.is_some_and(|until| until <= now) {
            stored.locked_until = None;
        }
        Ok(Some(FailedLogin {
            attempts: stored.login_attempts,
            locked_until: stored.locked_until,
        }))
    }

    async fn extend_lockout(&self, id: Uuid, until: DateTime<Utc>) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let stored = accounts
            .get_mut(&id)
            .ok_or_else(|| anyhow!("account {id} not found"))?;
        stored.locked_until = stored.locked_until.max(Some(until));
        Ok(())
    }

    async fn clear_expired_lockout(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        if let Some(stored) = accounts.get_mut(&id)
            && stored.locked_until.is_some_and(|until| until <= now)
        {
            stored.clear_lockout();
        }
        Ok(())
    }
}
