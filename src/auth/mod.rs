//! Authentication core: credentials, lockout, tokens and sessions.
//!
//! [`AuthService`] is the entry point. It is assembled from injected handles
//! ([`AuthDeps`]) and never reaches for globals:
//!
//! - login: [`CredentialVerifier`] (account store, lockout guard, hash pool),
//!   then a new access/refresh pair in [`SessionStore`], then signed tokens.
//! - bearer request: [`RevocationList`], then [`TokenCodec::verify`], then
//!   [`SessionStore::validate_access`].
//! - refresh: [`TokenCodec::verify`] then [`SessionStore::rotate`].
//!
//! ## Defaults
//!
//! - Access sessions live 15 minutes, refresh sessions 7 days.
//! - At most 5 sessions of each kind per user; the oldest is evicted.
//! - Denylist entries live as long as an access token.
//! - Password comparisons run on at most 4 blocking threads.

mod account;
mod brute_force;
mod credentials;
mod error;
mod password;
mod principal;
mod revocation;
mod service;
mod session;
mod session_kind;
mod state;
mod storage;
mod token;
mod utils;

pub use account::{Account, AccountStatus, AccountStore, FailedLogin, MemoryAccountStore};
pub use brute_force::{
    BruteForceGuard, LockState, LockoutPolicy, LockoutTier, lockout_state, remaining_minutes,
};
pub use credentials::CredentialVerifier;
pub use error::{AuthError, AuthResult, TokenInvalidReason};
pub use password::{Argon2Hasher, HashWorkerPool, PasswordHasher, PasswordPolicy};
pub use principal::AuthContext;
pub use revocation::RevocationList;
pub use service::{AuthDeps, AuthService, LoginOutcome, TokenPair};
pub use session::{AccessSession, RefreshSession, SessionIdentity, SessionMeta, SessionStore};
pub use session_kind::SessionKind;
pub use state::AuthConfig;
pub use storage::PgAccountStore;
pub use token::{Claims, TokenCodec, TokenType};

#[cfg(test)]
pub(crate) use password::test_hasher;
