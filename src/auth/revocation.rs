//! Token denylist.

use std::sync::Arc;
use std::time::Duration;

use super::error::AuthResult;
use crate::store::{TtlStore, keys};

const REVOKED_MARKER: &[u8] = b"1";

#[derive(Debug)]
pub struct RevocationList {
    store: Arc<dyn TtlStore>,
    ttl: Duration,
}

impl RevocationList {
    /// Every entry expires after `ttl`, regardless of the token's own expiry.
    #[must_use]
    pub fn new(store: Arc<dyn TtlStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// # Errors
    /// Returns an error if the store is unavailable.
    pub async fn add(&self, token: &str) -> AuthResult<()> {
        self.store
            .set(&keys::blacklist(token), REVOKED_MARKER, self.ttl)
            .await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the store is unavailable.
    pub async fn is_revoked(&self, token: &str) -> AuthResult<bool> {
        Ok(self.store.exists(&keys::blacklist(token)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use anyhow::Result;

    #[tokio::test]
    async fn revoked_tokens_expire_after_ttl() -> Result<()> {
        let clock = ManualClock::default();
        let store = Arc::new(MemoryStore::new(Arc::new(clock.clone())));
        let revocations = RevocationList::new(store, Duration::from_secs(900));

        assert!(!revocations.is_revoked("token").await?);
        revocations.add("token").await?;
        assert!(revocations.is_revoked("token").await?);
        assert!(!revocations.is_revoked("other").await?);

        clock.advance(chrono::Duration::seconds(900));
        assert!(!revocations.is_revoked("token").await?);
        Ok(())
    }
}
