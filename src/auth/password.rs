//! Adaptive password hashing and the bounded pool that runs it.
//!
//! Argon2id is CPU and memory heavy, so comparisons never run on the async
//! executor. [`HashWorkerPool`] moves them onto tokio's blocking threads and
//! caps how many run at once.

use anyhow::{Context, Result, anyhow};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{self, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
};
use rand::{RngCore, rngs::OsRng};
use std::sync::Arc;
use tokio::sync::Semaphore;

const SALT_BYTES: usize = 16;

pub trait PasswordHasher: Send + Sync + std::fmt::Debug {
    /// Hash `password` into a self-describing PHC string.
    ///
    /// # Errors
    /// Returns an error if the parameters are invalid or hashing fails.
    fn hash(&self, password: &str) -> Result<String>;

    /// `Ok(false)` on mismatch; `Err` only when `hash` cannot be parsed.
    ///
    /// # Errors
    /// Returns an error if the stored hash is not a valid PHC string.
    fn compare(&self, password: &str, hash: &str) -> Result<bool>;
}

/// Argon2id cost settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordPolicy {
    /// Memory cost in KiB.
    pub memory_cost: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        // OWASP baseline for Argon2id.
        Self {
            memory_cost: 19 * 1024,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl PasswordPolicy {
    #[must_use]
    pub const fn with_memory_cost(mut self, kib: u32) -> Self {
        self.memory_cost = kib;
        self
    }

    #[must_use]
    pub const fn with_time_cost(mut self, iterations: u32) -> Self {
        self.time_cost = iterations;
        self
    }

    #[must_use]
    pub const fn with_parallelism(mut self, lanes: u32) -> Self {
        self.parallelism = lanes;
        self
    }

    fn params(&self) -> Result<Params> {
        Params::new(self.memory_cost, self.time_cost, self.parallelism, None)
            .map_err(|err| anyhow!("invalid argon2 parameters: {err}"))
    }
}

#[derive(Debug)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    /// # Errors
    /// Returns an error if the policy is outside argon2's accepted ranges.
    pub fn new(policy: &PasswordPolicy) -> Result<Self> {
        Ok(Self {
            params: policy.params()?,
        })
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String> {
        let mut salt = [0u8; SALT_BYTES];
        OsRng
            .try_fill_bytes(&mut salt)
            .context("failed to generate password salt")?;
        let salt =
            SaltString::encode_b64(&salt).map_err(|err| anyhow!("failed to encode salt: {err}"))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone());
        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|err| anyhow!("failed to hash password: {err}"))?;
        Ok(hash.to_string())
    }

    fn compare(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed =
            PasswordHash::new(hash).map_err(|err| anyhow!("invalid password hash: {err}"))?;
        // Cost parameters are read from the PHC string itself.
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(err) => Err(anyhow!("failed to verify password: {err}")),
        }
    }
}

/// Runs hasher calls on blocking threads, at most `workers` at a time.
#[derive(Clone, Debug)]
pub struct HashWorkerPool {
    hasher: Arc<dyn PasswordHasher>,
    permits: Arc<Semaphore>,
}

impl HashWorkerPool {
    #[must_use]
    pub fn new(hasher: Arc<dyn PasswordHasher>, workers: usize) -> Self {
        Self {
            hasher,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// # Errors
    /// Returns an error if the hash is unparsable or the worker panicked.
    pub async fn compare(&self, password: &str, hash: &str) -> Result<bool> {
        let password = password.to_owned();
        let hash = hash.to_owned();
        self.run(move |hasher| hasher.compare(&password, &hash))
            .await
    }

    /// # Errors
    /// Returns an error if hashing fails or the worker panicked.
    pub async fn hash(&self, password: &str) -> Result<String> {
        let password = password.to_owned();
        self.run(move |hasher| hasher.hash(&password)).await
    }

    async fn run<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn PasswordHasher) -> Result<T> + Send + 'static,
    {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .context("hash worker pool closed")?;
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || job(hasher.as_ref()))
            .await
            .context("hash worker panicked")?
    }

    pub(crate) fn hasher(&self) -> &dyn PasswordHasher {
        self.hasher.as_ref()
    }
}

#[cfg(test)]
pub(crate) fn test_hasher() -> Arc<dyn PasswordHasher> {
    let policy = PasswordPolicy::default()
        .with_memory_cost(1024)
        .with_time_cost(1);
    match Argon2Hasher::new(&policy) {
        Ok(hasher) => Arc::new(hasher),
        Err(err) => panic!("test argon2 policy must be valid: {err}"),
    }
}
