//! Session store selection.

use anyhow::{Result, anyhow, bail};
use clap::{Arg, ArgMatches, Command};
use std::time::Duration;
use url::Url;

use crate::store::RedisConfig;

pub const ARG_REDIS_URL: &str = "redis-url";
pub const ARG_KEY_PREFIX: &str = "store-key-prefix";
pub const ARG_STORE_TIMEOUT_MS: &str = "store-timeout-ms";

#[derive(Debug, Clone)]
pub struct Options {
    /// `None` selects the in-process store.
    pub redis_url: Option<String>,
    pub key_prefix: String,
    pub command_timeout: Duration,
}

impl Options {
    /// Parse store arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the Redis URL is not a `redis://` or `rediss://` URL.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let redis_url = matches
            .get_one::<String>(ARG_REDIS_URL)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        if let Some(url) = &redis_url {
            let parsed =
                Url::parse(url).map_err(|err| anyhow!("invalid --{ARG_REDIS_URL}: {err}"))?;
            if !matches!(parsed.scheme(), "redis" | "rediss") {
                bail!("invalid --{ARG_REDIS_URL}: unsupported scheme {}", parsed.scheme());
            }
        }

        let key_prefix = matches
            .get_one::<String>(ARG_KEY_PREFIX)
            .map(|v| v.trim().trim_end_matches(':').to_string())
            .unwrap_or_default();
        let timeout_ms = matches
            .get_one::<u64>(ARG_STORE_TIMEOUT_MS)
            .copied()
            .ok_or_else(|| anyhow!("missing required argument: --{ARG_STORE_TIMEOUT_MS}"))?;

        Ok(Self {
            redis_url,
            key_prefix,
            command_timeout: Duration::from_millis(timeout_ms),
        })
    }

    #[must_use]
    pub fn redis_config(&self) -> Option<RedisConfig> {
        self.redis_url.as_ref().map(|url| {
            RedisConfig::new(url.clone())
                .with_key_prefix(self.key_prefix.clone())
                .with_command_timeout(self.command_timeout)
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_REDIS_URL)
                .long(ARG_REDIS_URL)
                .help("Redis URL for sessions and revocations; in-process store when unset")
                .env("RENTGATE_REDIS_URL")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_KEY_PREFIX)
                .long(ARG_KEY_PREFIX)
                .help("Namespace prepended to every store key")
                .env("RENTGATE_STORE_KEY_PREFIX")
                .default_value("rentgate"),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT_MS)
                .long(ARG_STORE_TIMEOUT_MS)
                .help("Per-command store timeout in milliseconds")
                .env("RENTGATE_STORE_TIMEOUT_MS")
                .default_value("2000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
