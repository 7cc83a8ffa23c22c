//! TTL key/value store used for sessions, the session index and the denylist.
//!
//! Two implementations ship with the crate:
//! - [`MemoryStore`]: a single-process map with lazy expiry, used by tests and
//!   single-instance deployments.
//! - [`RedisStore`]: shared by every service instance; each command runs under
//!   an explicit per-call timeout.
//!
//! The only multi-step mutation, [`TtlStore::push_capped`], must be applied
//! atomically by the backend so that concurrent logins for the same user never
//! lose index entries.

pub mod keys;
mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::{RedisConfig, RedisStore};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),
    #[error("store command timed out after {0:?}")]
    Timeout(Duration),
    #[error("store configuration error: {0}")]
    Configuration(String),
    #[error("record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Bounded append to a list of grouped members.
///
/// Members are grouped by a string prefix (for example `access:`). After the
/// append, while the group holds more than `max` members the oldest member of
/// that group is removed and reported back to the caller.
#[derive(Clone, Copy, Debug)]
pub struct CappedPush<'a> {
    pub group_prefix: &'a str,
    pub max: usize,
    pub ttl: Duration,
}

/// Members of the `prefix` group beyond the newest `max`, oldest first.
///
/// `members` is the list in insertion order. This is the eviction rule both
/// backends apply in [`TtlStore::push_capped`].
#[must_use]
pub fn group_overflow<'a, I>(members: I, prefix: &str, max: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let grouped: Vec<&str> = members
        .into_iter()
        .filter(|member| member.starts_with(prefix))
        .collect();
    let excess = grouped.len().saturating_sub(max);
    grouped[..excess].iter().map(|member| (*member).to_string()).collect()
}

#[async_trait]
pub trait TtlStore: Send + Sync + std::fmt::Debug {
    /// Write `value` under `key`, replacing any previous value, expiring after `ttl`.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Read and delete `key` in one step; at most one caller observes the value.
    async fn take(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Delete `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    async fn delete_many(&self, keys: &[String]) -> StoreResult<()>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Append `member` to the list at `key` and evict the oldest members of the
    /// same group beyond `cap.max`, as one atomic operation.
    ///
    /// Returns the evicted members, oldest first. The list key's TTL is reset
    /// to `cap.ttl`.
    async fn push_capped(
        &self,
        key: &str,
        member: &str,
        cap: CappedPush<'_>,
    ) -> StoreResult<Vec<String>>;

    /// Remove every occurrence of `member` from the list at `key`.
    async fn list_remove(&self, key: &str, member: &str) -> StoreResult<()>;

    /// List members, oldest first. A missing key is an empty list.
    async fn list_members(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Cheap liveness probe used by the health endpoint.
    async fn ping(&self) -> StoreResult<()>;
}
