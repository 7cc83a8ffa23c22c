//! Access and refresh session records in the TTL store.
//!
//! Records are JSON documents keyed by an opaque 256-bit session id. Validity
//! is decided by the record alone; the per-user index only drives eviction and
//! listing.
//!
//! ## Caps
//!
//! Every new session is appended to the owner's index with one atomic
//! [`TtlStore::push_capped`] call. When a kind exceeds `max_sessions`, the
//! oldest entries of that kind are evicted and their records deleted.
//!
//! ## Rotation
//!
//! A refresh session is consumed with [`TtlStore::take`], so concurrent
//! rotations of the same refresh token cannot both succeed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::account::Account;
use super::error::{AuthError, AuthResult};
use super::session_kind::SessionKind;
use super::state::AuthConfig;
use super::utils::generate_session_id;
use crate::clock::Clock;
use crate::store::{CappedPush, TtlStore, keys};

/// Request metadata recorded on new sessions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Identity copied onto access sessions and into access tokens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: Uuid,
    pub company_id: Option<Uuid>,
    pub email: String,
    pub role: String,
    pub is_super_admin: bool,
}

impl From<&Account> for SessionIdentity {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.id,
            company_id: account.company_id,
            email: account.email.clone(),
            role: account.role.clone(),
            is_super_admin: account.is_super_admin,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessSession {
    pub session_id: String,
    pub user_id: Uuid,
    pub company_id: Option<Uuid>,
    pub email: String,
    pub role: String,
    pub is_super_admin: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(flatten)]
    pub meta: SessionMeta,
}

impl AccessSession {
    #[must_use]
    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity {
            user_id: self.user_id,
            company_id: self.company_id,
            email: self.email.clone(),
            role: self.role.clone(),
            is_super_admin: self.is_super_admin,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSession {
    pub session_id: String,
    pub user_id: Uuid,
    pub company_id: Option<Uuid>,
    /// Access session minted alongside this refresh session.
    pub access_token_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(flatten)]
    pub meta: SessionMeta,
}

#[derive(Debug)]
pub struct SessionStore {
    store: Arc<dyn TtlStore>,
    clock: Arc<dyn Clock>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    max_sessions: usize,
}

impl SessionStore {
    #[must_use]
    pub fn new(store: Arc<dyn TtlStore>, clock: Arc<dyn Clock>, config: &AuthConfig) -> Self {
        Self {
            store,
            clock,
            access_ttl: config.access_ttl(),
            refresh_ttl: config.refresh_ttl(),
            max_sessions: config.max_sessions(),
        }
    }

    /// # Errors
    /// Returns an error if the store is unavailable.
    #[instrument(skip(self, identity, meta), fields(user_id = %identity.user_id))]
    pub async fn create_access(
        &self,
        identity: &SessionIdentity,
        meta: &SessionMeta,
    ) -> AuthResult<AccessSession> {
        let now = self.clock.now();
        let session = AccessSession {
            session_id: new_session_id()?,
            user_id: identity.user_id,
            company_id: identity.company_id,
            email: identity.email.clone(),
            role: identity.role.clone(),
            is_super_admin: identity.is_super_admin,
            created_at: now,
            expires_at: now + chrono_ttl(self.access_ttl)?,
            meta: meta.clone(),
        };
        self.put(
            &keys::access_session(&session.session_id),
            &session,
            self.access_ttl,
        )
        .await?;
        self.index_add(session.user_id, &session.session_id, SessionKind::Access)
            .await?;
        Ok(session)
    }

    /// # Errors
    /// Returns an error if the store is unavailable.
    #[instrument(skip(self, access_session_id, meta), fields(user_id = %user_id))]
    pub async fn create_refresh(
        &self,
        user_id: Uuid,
        company_id: Option<Uuid>,
        access_session_id: &str,
        meta: &SessionMeta,
    ) -> AuthResult<RefreshSession> {
        let now = self.clock.now();
        let session = RefreshSession {
            session_id: new_session_id()?,
            user_id,
            company_id,
            access_token_id: access_session_id.to_string(),
            created_at: now,
            expires_at: now + chrono_ttl(self.refresh_ttl)?,
            meta: meta.clone(),
        };
        self.put(
            &keys::refresh_session(&session.session_id),
            &session,
            self.refresh_ttl,
        )
        .await?;
        self.index_add(user_id, &session.session_id, SessionKind::Refresh)
            .await?;
        Ok(session)
    }

    /// # Errors
    /// Returns an error if the store is unavailable or the record is corrupt.
    pub async fn get_access(&self, session_id: &str) -> AuthResult<Option<AccessSession>> {
        self.load(&keys::access_session(session_id)).await
    }

    /// # Errors
    /// Returns an error if the store is unavailable or the record is corrupt.
    pub async fn get_refresh(&self, session_id: &str) -> AuthResult<Option<RefreshSession>> {
        self.load(&keys::refresh_session(session_id)).await
    }

    /// # Errors
    /// Returns [`AuthError::SessionExpired`] if the session is missing or past expiry.
    pub async fn validate_access(&self, session_id: &str) -> AuthResult<AccessSession> {
        match self.get_access(session_id).await? {
            Some(session) if session.expires_at > self.clock.now() => Ok(session),
            Some(session) => {
                self.destroy_record(SessionKind::Access, session_id, Some(session.user_id))
                    .await?;
                Err(AuthError::SessionExpired)
            }
            None => Err(AuthError::SessionExpired),
        }
    }

    /// # Errors
    /// Returns [`AuthError::SessionExpired`] if the session is missing or past expiry.
    pub async fn validate_refresh(&self, session_id: &str) -> AuthResult<RefreshSession> {
        match self.get_refresh(session_id).await? {
            Some(session) if session.expires_at > self.clock.now() => Ok(session),
            Some(session) => {
                self.destroy_record(SessionKind::Refresh, session_id, Some(session.user_id))
                    .await?;
                Err(AuthError::SessionExpired)
            }
            None => Err(AuthError::SessionExpired),
        }
    }

    /// Delete an access session and drop it from its owner's index.
    ///
    /// # Errors
    /// Returns an error if the store is unavailable.
    pub async fn destroy_access(&self, session_id: &str) -> AuthResult<()> {
        let owner = self.get_access(session_id).await?.map(|s| s.user_id);
        self.destroy_record(SessionKind::Access, session_id, owner)
            .await
    }

    /// # Errors
    /// Returns an error if the store is unavailable.
    pub async fn destroy_refresh(&self, session_id: &str) -> AuthResult<()> {
        let owner = self.get_refresh(session_id).await?.map(|s| s.user_id);
        self.destroy_record(SessionKind::Refresh, session_id, owner)
            .await
    }

    /// Destroy every indexed session of `user_id`, then the index itself.
    ///
    /// # Errors
    /// Returns an error if the store is unavailable.
    #[instrument(skip(self))]
    pub async fn destroy_all_for_user(&self, user_id: Uuid) -> AuthResult<()> {
        let index_key = keys::user_sessions(user_id);
        let record_keys: Vec<String> = self
            .store
            .list_members(&index_key)
            .await?
            .iter()
            .filter_map(|entry| SessionKind::parse_index_entry(entry))
            .map(|(kind, id)| kind.record_key(id))
            .collect();
        debug!(sessions = record_keys.len(), "destroying all sessions");
        self.store.delete_many(&record_keys).await?;
        self.store.delete(&index_key).await?;
        Ok(())
    }

    /// Consume a refresh session and mint a new access/refresh pair.
    ///
    /// The new access session copies its identity from the original access
    /// session, which therefore must still exist.
    ///
    /// # Errors
    /// - [`AuthError::SessionNotFound`] if the refresh session is gone or already used.
    /// - [`AuthError::SessionExpired`] if it is past expiry.
    /// - [`AuthError::OriginalSessionNotFound`] if its access session is gone.
    #[instrument(skip(self, old_refresh_id, meta))]
    pub async fn rotate(
        &self,
        old_refresh_id: &str,
        meta: &SessionMeta,
    ) -> AuthResult<(AccessSession, RefreshSession)> {
        let key = keys::refresh_session(old_refresh_id);
        let Some(bytes) = self.store.take(&key).await? else {
            return Err(AuthError::SessionNotFound);
        };
        let refresh: RefreshSession =
            serde_json::from_slice(&bytes).map_err(crate::store::StoreError::from)?;
        self.unindex(refresh.user_id, SessionKind::Refresh, old_refresh_id)
            .await?;

        if refresh.expires_at <= self.clock.now() {
            return Err(AuthError::SessionExpired);
        }

        let Some(original) = self.get_access(&refresh.access_token_id).await? else {
            return Err(AuthError::OriginalSessionNotFound);
        };
        self.destroy_record(
            SessionKind::Access,
            &original.session_id,
            Some(original.user_id),
        )
        .await?;

        let access = self.create_access(&original.identity(), meta).await?;
        let refresh = self
            .create_refresh(access.user_id, access.company_id, &access.session_id, meta)
            .await?;
        debug!(user_id = %access.user_id, "refresh session rotated");
        Ok((access, refresh))
    }

    /// Append a session to its owner's index and evict the oldest of the same
    /// kind beyond `max_sessions`.
    ///
    /// # Errors
    /// Returns an error if the store is unavailable.
    pub async fn index_add(
        &self,
        user_id: Uuid,
        session_id: &str,
        kind: SessionKind,
    ) -> AuthResult<()> {
        let evicted = self
            .store
            .push_capped(
                &keys::user_sessions(user_id),
                &kind.index_entry(session_id),
                CappedPush {
                    group_prefix: kind.index_prefix(),
                    max: self.max_sessions,
                    ttl: self.refresh_ttl,
                },
            )
            .await?;
        if evicted.is_empty() {
            return Ok(());
        }

        let record_keys: Vec<String> = evicted
            .iter()
            .filter_map(|entry| SessionKind::parse_index_entry(entry))
            .map(|(kind, id)| kind.record_key(id))
            .collect();
        debug!(
            user_id = %user_id,
            evicted = record_keys.len(),
            "session cap reached, evicting oldest"
        );
        self.store.delete_many(&record_keys).await?;
        Ok(())
    }

    /// Ids of the user's access sessions that still resolve, oldest first.
    ///
    /// # Errors
    /// Returns an error if the store is unavailable.
    pub async fn active_sessions(&self, user_id: Uuid) -> AuthResult<Vec<String>> {
        let entries = self
            .store
            .list_members(&keys::user_sessions(user_id))
            .await?;
        let mut active = Vec::new();
        for entry in &entries {
            if let Some((SessionKind::Access, id)) = SessionKind::parse_index_entry(entry)
                && self.store.exists(&keys::access_session(id)).await?
            {
                active.push(id.to_string());
            }
        }
        Ok(active)
    }

    /// Refresh sessions of `user_id` that were minted with `access_session_id`.
    pub(crate) async fn refresh_ids_for_access(
        &self,
        user_id: Uuid,
        access_session_id: &str,
    ) -> AuthResult<Vec<String>> {
        let entries = self
            .store
            .list_members(&keys::user_sessions(user_id))
            .await?;
        let mut paired = Vec::new();
        for entry in &entries {
            if let Some((SessionKind::Refresh, id)) = SessionKind::parse_index_entry(entry)
                && let Some(refresh) = self.get_refresh(id).await?
                && refresh.access_token_id == access_session_id
            {
                paired.push(refresh.session_id);
            }
        }
        Ok(paired)
    }

    async fn destroy_record(
        &self,
        kind: SessionKind,
        session_id: &str,
        owner: Option<Uuid>,
    ) -> AuthResult<()> {
        self.store.delete(&kind.record_key(session_id)).await?;
        if let Some(user_id) = owner {
            self.unindex(user_id, kind, session_id).await?;
        }
        Ok(())
    }

    async fn unindex(&self, user_id: Uuid, kind: SessionKind, session_id: &str) -> AuthResult<()> {
        self.store
            .list_remove(&keys::user_sessions(user_id), &kind.index_entry(session_id))
            .await?;
        Ok(())
    }

    async fn put<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) -> AuthResult<()> {
        let bytes = serde_json::to_vec(value).map_err(crate::store::StoreError::from)?;
        self.store.set(key, &bytes, ttl).await?;
        Ok(())
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> AuthResult<Option<T>> {
        let Some(bytes) = self.store.get(key).await? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&bytes).map_err(crate::store::StoreError::from)?;
        Ok(Some(value))
    }
}

fn new_session_id() -> AuthResult<String> {
    generate_session_id().map_err(|err| AuthError::Internal(format!("{err:#}")))
}

fn chrono_ttl(ttl: Duration) -> AuthResult<chrono::Duration> {
    chrono::Duration::from_std(ttl).map_err(|err| AuthError::Internal(format!("invalid ttl: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use anyhow::Result;
    use secrecy::SecretString;

    struct Fixture {
        sessions: SessionStore,
        store: Arc<MemoryStore>,
        clock: ManualClock,
    }

    fn fixture(max_sessions: usize) -> Fixture {
        let clock = ManualClock::default();
        let store = Arc::new(MemoryStore::new(Arc::new(clock.clone())));
        let config = AuthConfig::new(SecretString::from("a"), SecretString::from("r"))
            .with_max_sessions(max_sessions);
        let sessions = SessionStore::new(store.clone(), Arc::new(clock.clone()), &config);
        Fixture {
            sessions,
            store,
            clock,
        }
    }

    fn identity() -> SessionIdentity {
        SessionIdentity {
            user_id: Uuid::new_v4(),
            company_id: Some(Uuid::new_v4()),
            email: "a@x.com".to_string(),
            role: "manager".to_string(),
            is_super_admin: false,
        }
    }

    async fn pair(
        sessions: &SessionStore,
        identity: &SessionIdentity,
    ) -> AuthResult<(AccessSession, RefreshSession)> {
        let meta = SessionMeta::default();
        let access = sessions.create_access(identity, &meta).await?;
        let refresh = sessions
            .create_refresh(identity.user_id, identity.company_id, &access.session_id, &meta)
            .await?;
        Ok((access, refresh))
    }

    #[tokio::test]
    async fn zero_cap_still_keeps_the_newest_session() -> Result<()> {
        let fx = fixture(0);
        let identity = identity();
        let (first, _) = pair(&fx.sessions, &identity).await?;
        let (second, _) = pair(&fx.sessions, &identity).await?;

        assert!(fx.sessions.get_access(&first.session_id).await?.is_none());
        fx.sessions.validate_access(&second.session_id).await?;
        assert_eq!(
            fx.sessions.active_sessions(identity.user_id).await?,
            vec![second.session_id]
        );
        Ok(())
    }

    #[tokio::test]
    async fn access_session_round_trips_with_metadata() -> Result<()> {
        let fx = fixture(5);
        let meta = SessionMeta {
            client_ip: Some("10.0.0.1".to_string()),
            user_agent: Some("curl/8".to_string()),
        };
        let created = fx.sessions.create_access(&identity(), &meta).await?;
        assert_eq!(
            created.expires_at - created.created_at,
            chrono::Duration::minutes(15)
        );

        let loaded = fx.sessions.validate_access(&created.session_id).await?;
        assert_eq!(loaded, created);
        Ok(())
    }

    #[tokio::test]
    async fn expired_access_session_is_rejected_and_removed() -> Result<()> {
        let fx = fixture(5);
        let id = identity();
        let (access, _refresh) = pair(&fx.sessions, &id).await?;

        fx.clock.advance(chrono::Duration::minutes(15));
        assert!(matches!(
            fx.sessions.validate_access(&access.session_id).await,
            Err(AuthError::SessionExpired)
        ));
        assert!(fx.sessions.active_sessions(id.user_id).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn sixth_access_session_evicts_the_oldest() -> Result<()> {
        let fx = fixture(5);
        let id = identity();
        let mut created = Vec::new();
        for _ in 0..6 {
            let (access, _refresh) = pair(&fx.sessions, &id).await?;
            created.push(access.session_id);
        }

        assert!(matches!(
            fx.sessions.validate_access(&created[0]).await,
            Err(AuthError::SessionExpired)
        ));
        for session_id in &created[1..] {
            fx.sessions.validate_access(session_id).await?;
        }
        assert_eq!(fx.sessions.active_sessions(id.user_id).await?, created[1..]);
        Ok(())
    }

    #[tokio::test]
    async fn rotation_is_single_use() -> Result<()> {
        let fx = fixture(5);
        let id = identity();
        let (access, refresh) = pair(&fx.sessions, &id).await?;

        let (new_access, new_refresh) = fx
            .sessions
            .rotate(&refresh.session_id, &SessionMeta::default())
            .await?;
        assert_ne!(new_access.session_id, access.session_id);
        assert_ne!(new_refresh.session_id, refresh.session_id);
        assert_eq!(new_refresh.access_token_id, new_access.session_id);
        assert_eq!(new_access.identity(), id);
        assert!(fx.sessions.get_access(&access.session_id).await?.is_none());

        assert!(matches!(
            fx.sessions
                .rotate(&refresh.session_id, &SessionMeta::default())
                .await,
            Err(AuthError::SessionNotFound)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn rotation_requires_the_original_access_session() -> Result<()> {
        let fx = fixture(5);
        let (access, refresh) = pair(&fx.sessions, &identity()).await?;
        fx.sessions.destroy_access(&access.session_id).await?;

        assert!(matches!(
            fx.sessions
                .rotate(&refresh.session_id, &SessionMeta::default())
                .await,
            Err(AuthError::OriginalSessionNotFound)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn destroy_all_for_user_clears_records_and_index() -> Result<()> {
        let fx = fixture(5);
        let id = identity();
        let other = identity();
        pair(&fx.sessions, &id).await?;
        pair(&fx.sessions, &id).await?;
        let (kept, _) = pair(&fx.sessions, &other).await?;

        fx.sessions.destroy_all_for_user(id.user_id).await?;

        assert!(fx.sessions.active_sessions(id.user_id).await?.is_empty());
        assert!(!fx.store.exists(&keys::user_sessions(id.user_id)).await?);
        // Other user's access + refresh records and index remain.
        assert_eq!(fx.store.len().await, 3);
        fx.sessions.validate_access(&kept.session_id).await?;
        Ok(())
    }

    #[tokio::test]
    async fn paired_refresh_sessions_are_found_by_access_id() -> Result<()> {
        let fx = fixture(5);
        let id = identity();
        let (access, refresh) = pair(&fx.sessions, &id).await?;
        pair(&fx.sessions, &id).await?;

        let paired = fx
            .sessions
            .refresh_ids_for_access(id.user_id, &access.session_id)
            .await?;
        assert_eq!(paired, vec![refresh.session_id]);
        Ok(())
    }
}
