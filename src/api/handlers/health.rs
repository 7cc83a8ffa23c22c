//! Health probe for the session store and the account database.

use crate::{GIT_COMMIT_HASH, auth::AccountStore, store::TtlStore};
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{Duration, timeout};
use tracing::{debug, error, warn};
use utoipa::ToSchema;

const HEALTH_PROBE_TIMEOUT_SECONDS: u64 = 2;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
    store: String,
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "Store and database are reachable", body = Health),
        (status = 503, description = "Store or database is unreachable", body = Health)
    ),
    tag = "health",
)]
/// Probe the TTL store and the account database.
///
/// `OPTIONS` gets the same status and `X-App` header with an empty body.
pub async fn health(
    method: Method,
    store: Extension<Arc<dyn TtlStore>>,
    accounts: Extension<Arc<dyn AccountStore>>,
) -> impl IntoResponse {
    let (store_healthy, db_healthy) = tokio::join!(
        probe_store(store.0.as_ref()),
        probe_database(accounts.0.as_ref())
    );

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: status_label(db_healthy),
        store: status_label(store_healthy),
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app_header_value);
            headers
        })
        .unwrap_or_else(|err| {
            debug!("Failed to parse X-App header: {}", err);
            HeaderMap::new()
        });

    if store_healthy && db_healthy {
        (StatusCode::OK, headers, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}

fn status_label(healthy: bool) -> String {
    let label = if healthy { "ok" } else { "error" };
    label.to_string()
}

async fn probe_store(store: &dyn TtlStore) -> bool {
    match timeout(Duration::from_secs(HEALTH_PROBE_TIMEOUT_SECONDS), store.ping()).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            error!("Failed to ping session store: {}", err);
            false
        }
        Err(_) => {
            warn!("Session store health check timed out");
            false
        }
    }
}

async fn probe_database(accounts: &dyn AccountStore) -> bool {
    match timeout(
        Duration::from_secs(HEALTH_PROBE_TIMEOUT_SECONDS),
        accounts.ping(),
    )
    .await
    {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            error!("Failed to ping account database: {:#}", err);
            false
        }
        Err(_) => {
            warn!("Database health check timed out");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryAccountStore;
    use crate::clock::SystemClock;
    use crate::store::{CappedPush, MemoryStore, StoreError, StoreResult};
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::to_bytes;

    #[derive(Debug)]
    struct DownStore;

    #[async_trait]
    impl TtlStore for DownStore {
        async fn set(&self, _: &str, _: &[u8], _: std::time::Duration) -> StoreResult<()> {
            Err(down())
        }
        async fn get(&self, _: &str) -> StoreResult<Option<Vec<u8>>> {
            Err(down())
        }
        async fn take(&self, _: &str) -> StoreResult<Option<Vec<u8>>> {
            Err(down())
        }
        async fn delete(&self, _: &str) -> StoreResult<()> {
            Err(down())
        }
        async fn delete_many(&self, _: &[String]) -> StoreResult<()> {
            Err(down())
        }
        async fn exists(&self, _: &str) -> StoreResult<bool> {
            Err(down())
        }
        async fn push_capped(
            &self,
            _: &str,
            _: &str,
            _: CappedPush<'_>,
        ) -> StoreResult<Vec<String>> {
            Err(down())
        }
        async fn list_remove(&self, _: &str, _: &str) -> StoreResult<()> {
            Err(down())
        }
        async fn list_members(&self, _: &str) -> StoreResult<Vec<String>> {
            Err(down())
        }
        async fn ping(&self) -> StoreResult<()> {
            Err(down())
        }
    }

    fn down() -> StoreError {
        StoreError::Connection("connection refused".to_string())
    }

    fn accounts() -> Extension<Arc<dyn AccountStore>> {
        let accounts: Arc<dyn AccountStore> = Arc::new(MemoryAccountStore::new());
        Extension(accounts)
    }

    #[tokio::test]
    async fn healthy_backends_report_ok() -> Result<()> {
        let store: Arc<dyn TtlStore> = Arc::new(MemoryStore::new(Arc::new(SystemClock)));
        let response = health(Method::GET, Extension(store), accounts())
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let x_app = response
            .headers()
            .get("X-App")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(x_app.starts_with(&format!(
            "{}:{}:",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )));

        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body: Health = serde_json::from_slice(&bytes)?;
        assert_eq!(body.database, "ok");
        assert_eq!(body.store, "ok");
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_store_is_unavailable() -> Result<()> {
        let store: Arc<dyn TtlStore> = Arc::new(DownStore);
        let response = health(Method::GET, Extension(store), accounts())
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body: Health = serde_json::from_slice(&bytes)?;
        assert_eq!(body.store, "error");
        assert_eq!(body.database, "ok");
        Ok(())
    }

    #[tokio::test]
    async fn options_returns_empty_body() -> Result<()> {
        let store: Arc<dyn TtlStore> = Arc::new(MemoryStore::new(Arc::new(SystemClock)));
        let response = health(Method::OPTIONS, Extension(store), accounts())
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        assert!(bytes.is_empty());
        Ok(())
    }
}
