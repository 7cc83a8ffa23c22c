//! Bearer-token auth endpoints.
//!
//! Login and refresh return a token pair in the body. Every other endpoint
//! reads `Authorization: Bearer <access token>` and resolves it through
//! [`AuthService::authenticate`](crate::auth::AuthService::authenticate).
//! Rejections are 401 with a generic message; store or database failures
//! are 500.

pub mod admin;
pub mod login;
pub mod refresh;
pub mod session;
pub mod types;

mod error;
mod utils;
