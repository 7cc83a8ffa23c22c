use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{CappedPush, StoreError, StoreResult, TtlStore, group_overflow};
use crate::clock::{Clock, SystemClock};

#[derive(Debug)]
enum Value {
    Bytes(Vec<u8>),
    List(VecDeque<String>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: DateTime<Utc>,
}

/// In-process TTL store.
///
/// Expiry is evaluated against the injected clock on every access, and expired
/// entries are purged whenever a key is written. All operations, including
/// [`TtlStore::push_capped`], run under one lock and are therefore atomic.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn expiry(&self, ttl: Duration) -> StoreResult<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|err| StoreError::Internal(format!("invalid ttl: {err}")))?;
        Ok(self.clock.now() + ttl)
    }

    /// Number of live keys; handy for asserting that nothing leaked.
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        entries.values().filter(|entry| entry.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Internal(format!("WRONGTYPE operation against key {key}"))
}

#[async_trait]
impl TtlStore for MemoryStore {
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        let expires_at = self.expiry(ttl)?;
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Bytes(value.to_vec()),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => match &entry.value {
                Value::Bytes(bytes) => Ok(Some(bytes.clone())),
                Value::List(_) => Err(wrong_type(key)),
            },
            _ => Ok(None),
        }
    }

    async fn take(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        match entries.remove(key) {
            Some(Entry {
                value: Value::Bytes(bytes),
                expires_at,
            }) if expires_at > now => Ok(Some(bytes)),
            Some(entry @ Entry {
                value: Value::List(_),
                ..
            }) => {
                entries.insert(key.to_string(), entry);
                Err(wrong_type(key))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        Ok(entries.get(key).is_some_and(|entry| entry.expires_at > now))
    }

    async fn push_capped(
        &self,
        key: &str,
        member: &str,
        cap: CappedPush<'_>,
    ) -> StoreResult<Vec<String>> {
        let expires_at = self.expiry(cap.ttl)?;
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.expires_at > now);

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::List(VecDeque::new()),
            expires_at,
        });
        let Value::List(list) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        list.push_back(member.to_string());

        let evicted = group_overflow(list.iter().map(String::as_str), cap.group_prefix, cap.max);
        for item in &evicted {
            if let Some(position) = list.iter().position(|existing| existing == item) {
                list.remove(position);
            }
        }
        entry.expires_at = expires_at;

        Ok(evicted)
    }

    async fn list_remove(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(key) {
            let Value::List(list) = &mut entry.value else {
                return Err(wrong_type(key));
            };
            list.retain(|item| item != member);
        }
        Ok(())
    }

    async fn list_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => match &entry.value {
                Value::List(list) => Ok(list.iter().cloned().collect()),
                Value::Bytes(_) => Err(wrong_type(key)),
            },
            _ => Ok(Vec::new()),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use anyhow::Result;

    fn store() -> (MemoryStore, ManualClock) {
        let clock = ManualClock::default();
        (MemoryStore::new(Arc::new(clock.clone())), clock)
    }

    fn cap(prefix: &str, max: usize) -> CappedPush<'_> {
        CappedPush {
            group_prefix: prefix,
            max,
            ttl: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn values_expire_with_the_clock() -> Result<()> {
        let (store, clock) = store();
        store.set("k", b"v", Duration::from_secs(10)).await?;
        assert_eq!(store.get("k").await?, Some(b"v".to_vec()));

        clock.advance(chrono::Duration::seconds(10));
        assert_eq!(store.get("k").await?, None);
        assert!(!store.exists("k").await?);
        Ok(())
    }

    #[tokio::test]
    async fn take_returns_value_once() -> Result<()> {
        let (store, _clock) = store();
        store.set("k", b"v", Duration::from_secs(10)).await?;
        assert_eq!(store.take("k").await?, Some(b"v".to_vec()));
        assert_eq!(store.take("k").await?, None);
        assert_eq!(store.get("k").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn delete_is_idempotent() -> Result<()> {
        let (store, _clock) = store();
        store.set("k", b"v", Duration::from_secs(10)).await?;
        store.delete("k").await?;
        store.delete("k").await?;
        assert!(store.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn push_capped_evicts_oldest_of_the_same_group() -> Result<()> {
        let (store, _clock) = store();
        for id in ["a:1", "b:1", "a:2", "a:3"] {
            let prefix = &id[..2];
            let evicted = store.push_capped("list", id, cap(prefix, 2)).await?;
            if id == "a:3" {
                assert_eq!(evicted, vec!["a:1".to_string()]);
            } else {
                assert!(evicted.is_empty());
            }
        }
        assert_eq!(store.list_members("list").await?, vec!["b:1", "a:2", "a:3"]);
        Ok(())
    }

    #[tokio::test]
    async fn list_remove_and_missing_lists() -> Result<()> {
        let (store, _clock) = store();
        assert!(store.list_members("missing").await?.is_empty());
        store.push_capped("list", "a:1", cap("a:", 5)).await?;
        store.push_capped("list", "a:2", cap("a:", 5)).await?;
        store.list_remove("list", "a:1").await?;
        assert_eq!(store.list_members("list").await?, vec!["a:2"]);
        Ok(())
    }

    #[tokio::test]
    async fn list_operations_reject_scalar_keys() -> Result<()> {
        let (store, _clock) = store();
        store.set("scalar", b"1", Duration::from_secs(10)).await?;
        assert!(store.list_members("scalar").await.is_err());
        assert!(store.push_capped("scalar", "a:1", cap("a:", 1)).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn rejected_push_keeps_the_scalar_ttl() -> Result<()> {
        let (store, clock) = store();
        store.set("scalar", b"1", Duration::from_secs(10)).await?;
        // `cap` asks for a 60 second TTL.
        assert!(store.push_capped("scalar", "a:1", cap("a:", 1)).await.is_err());

        clock.advance(chrono::Duration::seconds(10));
        assert!(!store.exists("scalar").await?);
        Ok(())
    }
}
