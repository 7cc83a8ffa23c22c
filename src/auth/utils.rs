//! Small helpers shared by the auth components.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{RngCore, rngs::OsRng};

const SESSION_ID_BYTES: usize = 32;

/// Normalize an email for lookups.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Create a new opaque session identifier (256 bits, base64url).
pub(crate) fn generate_session_id() -> Result<String> {
    random_token(SESSION_ID_BYTES).context("failed to generate session id")
}

/// Random base64url string built from `len` bytes of OS entropy.
pub(crate) fn random_token(len: usize) -> Result<String> {
    let mut bytes = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to read OS randomness")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}
