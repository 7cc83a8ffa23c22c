//! Authenticated request context.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::session::AccessSession;

/// Caller identity resolved from a validated access token.
///
/// Built once per request and passed explicitly to whatever needs it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    pub user_id: Uuid,
    pub company_id: Option<Uuid>,
    pub email: String,
    pub role: String,
    pub is_super_admin: bool,
    pub session_id: String,
}

impl AuthContext {
    /// Whether the caller may act on resources of `company_id`.
    #[must_use]
    pub fn can_access_company(&self, company_id: Uuid) -> bool {
        self.is_super_admin || self.company_id == Some(company_id)
    }
}

impl From<AccessSession> for AuthContext {
    fn from(session: AccessSession) -> Self {
        Self {
            user_id: session.user_id,
            company_id: session.company_id,
            email: session.email,
            role: session.role,
            is_super_admin: session.is_super_admin,
            session_id: session.session_id,
        }
    }
}
