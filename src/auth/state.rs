//! Auth configuration.

use secrecy::SecretString;
use std::time::Duration;

use super::brute_force::LockoutPolicy;

const DEFAULT_ACCESS_TTL_SECONDS: u64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_MAX_SESSIONS: usize = 5;
const DEFAULT_HASH_WORKERS: usize = 4;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    access_secret: SecretString,
    refresh_secret: SecretString,
    access_ttl_seconds: u64,
    refresh_ttl_seconds: u64,
    max_sessions: usize,
    hash_workers: usize,
    lockout: LockoutPolicy,
}

impl AuthConfig {
    #[must_use]
    pub fn new(access_secret: SecretString, refresh_secret: SecretString) -> Self {
        Self {
            access_secret,
            refresh_secret,
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            max_sessions: DEFAULT_MAX_SESSIONS,
            hash_workers: DEFAULT_HASH_WORKERS,
            lockout: LockoutPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: u64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: u64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    /// Sessions kept per user and kind. At least one is always kept.
    #[must_use]
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    #[must_use]
    pub fn with_hash_workers(mut self, workers: usize) -> Self {
        self.hash_workers = workers;
        self
    }

    #[must_use]
    pub fn with_lockout_policy(mut self, policy: LockoutPolicy) -> Self {
        self.lockout = policy;
        self
    }

    pub(crate) fn access_secret(&self) -> &SecretString {
        &self.access_secret
    }

    pub(crate) fn refresh_secret(&self) -> &SecretString {
        &self.refresh_secret
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_ttl_seconds)
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl_seconds)
    }

    /// Denylist entries live as long as a freshly minted access token.
    #[must_use]
    pub fn revocation_ttl(&self) -> Duration {
        self.access_ttl()
    }

    #[must_use]
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    #[must_use]
    pub fn hash_workers(&self) -> usize {
        self.hash_workers
    }

    #[must_use]
    pub fn lockout_policy(&self) -> &LockoutPolicy {
        &self.lockout
    }
}
