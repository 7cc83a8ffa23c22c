//! # Rentgate (authentication and session lifecycle)
//!
//! `rentgate` is the authentication core of the property management platform.
//! It verifies credentials, enforces progressive brute-force lockout, issues and
//! verifies JWT bearer tokens, and keeps access/refresh sessions in a TTL store.
//!
//! ## Sessions
//!
//! Every login mints an access session (15 minutes) and a refresh session
//! (7 days). Both live in the TTL store keyed by an unguessable session id, and
//! the signed tokens only carry that id plus identity claims.
//!
//! - **Rotation:** a refresh token is usable exactly once; using it destroys the
//!   old pair and returns a brand-new one.
//! - **Caps:** a user holds at most `max_sessions` sessions of each kind. The
//!   oldest is evicted (FIFO) when a new one is created, atomically in the store.
//! - **Revocation:** logout may denylist the presented access token so it stops
//!   validating before its natural expiry.
//!
//! ## Lockout
//!
//! Failed logins are counted on the account record. Three failures lock the
//! account for 5 minutes, five for 15, ten for an hour and twenty for a day.
//! Locks expire lazily on the next attempt; there is no background sweeper.
//!
//! All credential failures except lockout return the same generic message so
//! callers cannot probe which emails are registered.

pub mod api;
pub mod auth;
pub mod cli;
pub mod clock;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
