//! Progressive account lockout.
//!
//! Failures are counted on the account record itself. The counter decays when
//! the previous failure is older than the decay window, and the lock duration
//! is chosen from the highest tier the counter reaches:
//!
//! | failures | lock |
//! |---|---|
//! | 3 | 5 minutes |
//! | 5 | 15 minutes |
//! | 10 | 1 hour |
//! | 20 | 1 day |
//!
//! Locks expire lazily when the account is next checked.

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::account::{Account, AccountStore};
use super::error::{AuthError, AuthResult};
use crate::clock::Clock;

const DEFAULT_DECAY_MINUTES: i64 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockoutTier {
    pub attempts: i32,
    pub duration: Duration,
}

impl LockoutTier {
    #[must_use]
    pub fn minutes(attempts: i32, minutes: i64) -> Self {
        Self {
            attempts,
            duration: Duration::minutes(minutes),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockoutPolicy {
    tiers: Vec<LockoutTier>,
    decay: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::new(
            vec![
                LockoutTier::minutes(3, 5),
                LockoutTier::minutes(5, 15),
                LockoutTier::minutes(10, 60),
                LockoutTier::minutes(20, 24 * 60),
            ],
            Duration::minutes(DEFAULT_DECAY_MINUTES),
        )
    }
}

impl LockoutPolicy {
    #[must_use]
    pub fn new(mut tiers: Vec<LockoutTier>, decay: Duration) -> Self {
        tiers.sort_by_key(|tier| tier.attempts);
        Self { tiers, decay }
    }

    /// Lock duration for `attempts` consecutive failures, if any tier applies.
    #[must_use]
    pub fn lockout_for(&self, attempts: i32) -> Option<Duration> {
        self.tiers
            .iter()
            .rev()
            .find(|tier| attempts >= tier.attempts)
            .map(|tier| tier.duration)
    }

    #[must_use]
    pub const fn decay(&self) -> Duration {
        self.decay
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked { until: DateTime<Utc> },
}

/// Lock state of `account` at `now`, without side effects.
#[must_use]
pub fn lockout_state(account: &Account, now: DateTime<Utc>) -> LockState {
    match account.locked_until {
        Some(until) if until > now => LockState::Locked { until },
        _ => LockState::Unlocked,
    }
}

/// Whole minutes left on a lock, rounded up.
#[must_use]
pub fn remaining_minutes(until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (until - now).num_seconds().max(0);
    (seconds + 59) / 60
}

#[derive(Debug)]
pub struct BruteForceGuard {
    accounts: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    policy: LockoutPolicy,
}

impl BruteForceGuard {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        clock: Arc<dyn Clock>,
        policy: LockoutPolicy,
    ) -> Self {
        Self {
            accounts,
            clock,
            policy,
        }
    }

    /// Count a failed password check and lock the account when a tier is reached.
    ///
    /// The counter is incremented by the account store in one step, so
    /// concurrent failures for the same account are all counted. `account` is
    /// refreshed with the stored values.
    ///
    /// # Errors
    /// Returns [`AuthError::Accounts`] if the account cannot be persisted.
    pub async fn record_failure(&self, account: &mut Account) -> AuthResult<()> {
        let now = self.clock.now();
        let failed = self
            .accounts
            .record_failed_login(account.id, now, now - self.policy.decay())
            .await
            .map_err(AuthError::Accounts)?
            .ok_or_else(|| AuthError::Accounts(anyhow!("account {} not found", account.id)))?;

        account.login_attempts = failed.attempts;
        account.last_failed_login = Some(now);
        account.locked_until = failed.locked_until;

        if let Some(duration) = self.policy.lockout_for(failed.attempts) {
            let until = now + duration;
            self.accounts
                .extend_lockout(account.id, until)
                .await
                .map_err(AuthError::Accounts)?;
            account.locked_until = account.locked_until.max(Some(until));
            warn!(
                account_id = %account.id,
                attempts = failed.attempts,
                locked_until = %until,
                "account locked after failed logins"
            );
        }
        Ok(())
    }

    /// # Errors
    /// Returns [`AuthError::Accounts`] if the account cannot be persisted.
    pub async fn record_success(&self, account: &mut Account) -> AuthResult<()> {
        if account.login_attempts == 0
            && account.locked_until.is_none()
            && account.last_failed_login.is_none()
        {
            return Ok(());
        }
        account.clear_lockout();
        self.persist(account).await
    }

    /// Reject locked accounts; clear locks that have run out.
    ///
    /// # Errors
    /// Returns [`AuthError::AccountLocked`] while the lock is active.
    pub async fn check_locked(&self, account: &mut Account) -> AuthResult<()> {
        let now = self.clock.now();
        match lockout_state(account, now) {
            LockState::Locked { until } => Err(AuthError::AccountLocked {
                remaining_minutes: remaining_minutes(until, now),
            }),
            LockState::Unlocked if account.locked_until.is_some() => {
                account.clear_lockout();
                self.accounts
                    .clear_expired_lockout(account.id, now)
                    .await
                    .map_err(AuthError::Accounts)
            }
            LockState::Unlocked => Ok(()),
        }
    }

    /// Administrative unlock. Returns `false` when the account does not exist.
    ///
    /// # Errors
    /// Returns [`AuthError::Accounts`] if the account store fails.
    pub async fn manual_unlock(&self, account_id: Uuid) -> AuthResult<bool> {
        let Some(mut account) = self
            .accounts
            .find_by_id(account_id)
            .await
            .map_err(AuthError::Accounts)?
        else {
            return Ok(false);
        };
        account.clear_lockout();
        self.persist(&account).await?;
        info!(account_id = %account_id, "account unlocked manually");
        Ok(true)
    }

    async fn persist(&self, account: &Account) -> AuthResult<()> {
        self.accounts.save(account).await.map_err(AuthError::Accounts)
    }
}
