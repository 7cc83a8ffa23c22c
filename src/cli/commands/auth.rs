//! Token secrets, session lifetimes and hashing capacity.

use anyhow::{Result, anyhow, bail};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::auth::AuthConfig;

pub const ARG_ACCESS_TOKEN_SECRET: &str = "access-token-secret";
pub const ARG_REFRESH_TOKEN_SECRET: &str = "refresh-token-secret";
pub const ARG_ACCESS_TTL_SECONDS: &str = "access-ttl-seconds";
pub const ARG_REFRESH_TTL_SECONDS: &str = "refresh-ttl-seconds";
pub const ARG_MAX_SESSIONS: &str = "max-sessions";
pub const ARG_HASH_WORKERS: &str = "hash-workers";

#[derive(Debug)]
pub struct Options {
    pub access_secret: SecretString,
    pub refresh_secret: SecretString,
    pub access_ttl_seconds: u64,
    pub refresh_ttl_seconds: u64,
    pub max_sessions: usize,
    pub hash_workers: usize,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a token secret is missing or empty, or a count is zero.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let read_secret = |id: &str| -> Result<SecretString> {
            matches
                .get_one::<String>(id)
                .filter(|v| !v.trim().is_empty())
                .map(|v| SecretString::from(v.clone()))
                .ok_or_else(|| anyhow!("missing required argument: --{id}"))
        };
        let read_u64 = |id: &str| -> Result<u64> {
            matches
                .get_one::<u64>(id)
                .copied()
                .ok_or_else(|| anyhow!("missing required argument: --{id}"))
        };
        let read_count = |id: &str| -> Result<usize> {
            match matches.get_one::<usize>(id).copied() {
                Some(0) => bail!("--{id} must be at least 1"),
                Some(value) => Ok(value),
                None => bail!("missing required argument: --{id}"),
            }
        };

        Ok(Self {
            access_secret: read_secret(ARG_ACCESS_TOKEN_SECRET)?,
            refresh_secret: read_secret(ARG_REFRESH_TOKEN_SECRET)?,
            access_ttl_seconds: read_u64(ARG_ACCESS_TTL_SECONDS)?,
            refresh_ttl_seconds: read_u64(ARG_REFRESH_TTL_SECONDS)?,
            max_sessions: read_count(ARG_MAX_SESSIONS)?,
            hash_workers: read_count(ARG_HASH_WORKERS)?,
        })
    }

    /// Build the runtime auth configuration. Consumes the secrets.
    #[must_use]
    pub fn into_config(self) -> AuthConfig {
        AuthConfig::new(self.access_secret, self.refresh_secret)
            .with_access_ttl_seconds(self.access_ttl_seconds)
            .with_refresh_ttl_seconds(self.refresh_ttl_seconds)
            .with_max_sessions(self.max_sessions)
            .with_hash_workers(self.hash_workers)
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_secret_args(command);
    with_session_args(command)
}

fn with_secret_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_SECRET)
                .long(ARG_ACCESS_TOKEN_SECRET)
                .help("HS256 secret for access tokens")
                .env("RENTGATE_ACCESS_TOKEN_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_SECRET)
                .long(ARG_REFRESH_TOKEN_SECRET)
                .help("HS256 secret for refresh tokens, must differ from the access secret")
                .env("RENTGATE_REFRESH_TOKEN_SECRET")
                .hide_env_values(true),
        )
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TTL_SECONDS)
                .long(ARG_ACCESS_TTL_SECONDS)
                .help("Access session and token lifetime in seconds")
                .env("RENTGATE_ACCESS_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TTL_SECONDS)
                .long(ARG_REFRESH_TTL_SECONDS)
                .help("Refresh session and token lifetime in seconds")
                .env("RENTGATE_REFRESH_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_MAX_SESSIONS)
                .long(ARG_MAX_SESSIONS)
                .help("Maximum concurrent sessions of each kind per user")
                .env("RENTGATE_MAX_SESSIONS")
                .default_value("5")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_HASH_WORKERS)
                .long(ARG_HASH_WORKERS)
                .help("Maximum concurrent password hash comparisons")
                .env("RENTGATE_HASH_WORKERS")
                .default_value("4")
                .value_parser(clap::value_parser!(usize)),
        )
}
