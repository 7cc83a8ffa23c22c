//! Map validated CLI arguments to an [`Action`].

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_DSN, ARG_PORT, auth, store};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth = auth::Options::parse(matches)?;
    let store = store::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        auth,
        store,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DSN: &str = "postgres://rentgate@localhost:5432/rentgate";

    #[test]
    fn server_action_from_env() {
        temp_env::with_vars(
            [
                ("RENTGATE_DSN", Some(DSN)),
                ("RENTGATE_PORT", Some("8443")),
                ("RENTGATE_ACCESS_TOKEN_SECRET", Some("access")),
                ("RENTGATE_REFRESH_TOKEN_SECRET", Some("refresh")),
                ("RENTGATE_REDIS_URL", None),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["rentgate"]);
                let action = handler(&matches);
                assert!(action.is_ok());
                if let Ok(Action::Server(args)) = action {
                    assert_eq!(args.port, 8443);
                    assert_eq!(args.dsn, DSN);
                    assert!(args.store.redis_url.is_none());
                }
            },
        );
    }

    #[test]
    fn access_token_secret_required() {
        temp_env::with_vars(
            [
                ("RENTGATE_DSN", Some(DSN)),
                ("RENTGATE_ACCESS_TOKEN_SECRET", None),
                ("RENTGATE_REFRESH_TOKEN_SECRET", Some("refresh")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["rentgate"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(
                        err.to_string()
                            .contains("missing required argument: --access-token-secret")
                    );
                }
            },
        );
    }
}
