//! Request/response types for auth endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{Account, TokenPair};

const BEARER: &str = "Bearer";

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub session_id: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: BEARER.to_string(),
            session_id: pair.session_id,
            access_expires_at: pair.access_expires_at,
            refresh_expires_at: pair.refresh_expires_at,
        }
    }
}

/// Public view of the logged-in account. Never carries the password hash or
/// lockout counters.
#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct AccountSummary {
    pub id: Uuid,
    pub company_id: Option<Uuid>,
    pub email: String,
    pub role: String,
    pub is_super_admin: bool,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            company_id: account.company_id,
            email: account.email.clone(),
            role: account.role.clone(),
            is_super_admin: account.is_super_admin,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub user: AccountSummary,
    #[serde(flatten)]
    pub tokens: TokenResponse,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionsResponse {
    pub sessions: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}
