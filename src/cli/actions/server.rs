use crate::{
    api::{self, AppHandles},
    auth::{
        AccountStore, Argon2Hasher, AuthDeps, AuthService, PasswordPolicy, PgAccountStore,
    },
    cli::commands::{auth, store},
    clock::{Clock, SystemClock},
    store::{MemoryStore, RedisStore, TtlStore},
};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub auth: auth::Options,
    pub store: store::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database or store is unreachable, the auth
/// configuration is unusable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;
    let accounts: Arc<dyn AccountStore> = Arc::new(PgAccountStore::new(pool));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store: Arc<dyn TtlStore> = if let Some(config) = args.store.redis_config() {
        Arc::new(
            RedisStore::connect(config)
                .await
                .context("Failed to connect to Redis")?,
        )
    } else {
        warn!("No Redis URL configured, sessions are kept in process memory");
        Arc::new(MemoryStore::new(clock.clone()))
    };

    let hasher = Arc::new(Argon2Hasher::new(&PasswordPolicy::default())?);
    let config = args.auth.into_config();
    let service = AuthService::new(
        &config,
        AuthDeps {
            store: store.clone(),
            accounts: accounts.clone(),
            hasher,
            clock,
        },
    )
    .context("Failed to initialise auth service")?;

    let app = api::app(AppHandles {
        auth: Arc::new(service),
        store,
        accounts,
    });

    api::serve(args.port, app).await
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_url(&args.dsn)),
        (
            "store",
            args.store
                .redis_url
                .as_deref()
                .map_or_else(|| "memory".to_string(), redact_url),
        ),
        ("store_key_prefix", args.store.key_prefix.clone()),
        (
            "store_timeout_ms",
            args.store.command_timeout.as_millis().to_string(),
        ),
        ("access_ttl_seconds", args.auth.access_ttl_seconds.to_string()),
        (
            "refresh_ttl_seconds",
            args.auth.refresh_ttl_seconds.to_string(),
        ),
        ("max_sessions", args.auth.max_sessions.to_string()),
        ("hash_workers", args.auth.hash_workers.to_string()),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-url".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
