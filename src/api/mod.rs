//! HTTP adapter over [`AuthService`](crate::auth::AuthService).

use crate::{
    auth::{AccountStore, AuthService},
    store::TtlStore,
};
use anyhow::Result;
use axum::{
    Extension, Router,
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    routing::options,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared handles injected into every request.
#[derive(Clone, Debug)]
pub struct AppHandles {
    pub auth: Arc<AuthService>,
    pub store: Arc<dyn TtlStore>,
    pub accounts: Arc<dyn AccountStore>,
}

/// Build the application router with request-id and tracing layers.
#[must_use]
pub fn app(handles: AppHandles) -> Router {
    let (router, _openapi) = openapi::api_router().split_for_parts();

    router
        .route("/health", options(handlers::health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID_HEADER),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID_HEADER,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(handles.auth))
                .layer(Extension(handles.store))
                .layer(Extension(handles.accounts)),
        )
}

/// Serve `app` on all interfaces until Ctrl-C.
///
/// # Errors
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(port: u16, app: Router) -> Result<()> {
    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = request.uri().path(),
        request_id
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::AppHandles;
    use crate::auth::{
        Account, AuthConfig, AuthDeps, AuthService, MemoryAccountStore, PasswordHasher,
        test_hasher,
    };
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use anyhow::Result;
    use secrecy::SecretString;
    use std::sync::Arc;

    pub(crate) const EMAIL: &str = "a@x.com";
    pub(crate) const PASSWORD: &str = "Secret1!";

    pub(crate) struct Fixture {
        pub(crate) handles: AppHandles,
        pub(crate) accounts: Arc<MemoryAccountStore>,
        pub(crate) account: Account,
    }

    pub(crate) async fn fixture(super_admin: bool) -> Result<Fixture> {
        let clock = ManualClock::default();
        let hasher = test_hasher();
        let account = Account::new(EMAIL, hasher.hash(PASSWORD)?, "manager")
            .with_super_admin(super_admin);
        let accounts = Arc::new(MemoryAccountStore::new());
        accounts.insert(account.clone()).await;
        let store = Arc::new(MemoryStore::new(Arc::new(clock.clone())));

        let config = AuthConfig::new(
            SecretString::from("access-secret"),
            SecretString::from("refresh-secret"),
        );
        let auth = AuthService::new(
            &config,
            AuthDeps {
                store: store.clone(),
                accounts: accounts.clone(),
                hasher,
                clock: Arc::new(clock.clone()),
            },
        )?;

        Ok(Fixture {
            handles: AppHandles {
                auth: Arc::new(auth),
                store,
                accounts: accounts.clone(),
            },
            accounts,
            account,
        })
    }
}
