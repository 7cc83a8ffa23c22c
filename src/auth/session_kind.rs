//! Session kinds and their per-user index entries.
//!
//! The per-user index is a single list whose entries carry the kind as a prefix
//! (`access:<id>`, `refresh:<id>`), so each kind can be capped on its own.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::store::keys;

const ACCESS_ENTRY_PREFIX: &str = "access:";
const REFRESH_ENTRY_PREFIX: &str = "refresh:";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Access,
    Refresh,
}

impl SessionKind {
    #[must_use]
    pub const fn index_prefix(self) -> &'static str {
        match self {
            Self::Access => ACCESS_ENTRY_PREFIX,
            Self::Refresh => REFRESH_ENTRY_PREFIX,
        }
    }

    #[must_use]
    pub fn index_entry(self, session_id: &str) -> String {
        format!("{}{session_id}", self.index_prefix())
    }

    /// Split an index entry back into kind and session id.
    #[must_use]
    pub fn parse_index_entry(entry: &str) -> Option<(Self, &str)> {
        [Self::Access, Self::Refresh].into_iter().find_map(|kind| {
            entry
                .strip_prefix(kind.index_prefix())
                .filter(|id| !id.is_empty())
                .map(|id| (kind, id))
        })
    }

    /// Store key holding the session record.
    #[must_use]
    pub fn record_key(self, session_id: &str) -> String {
        match self {
            Self::Access => keys::access_session(session_id),
            Self::Refresh => keys::refresh_session(session_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SessionKind;

    #[test]
    fn index_entries_round_trip_through_parse() {
        let entry = SessionKind::Refresh.index_entry("abc");
        assert_eq!(entry, "refresh:abc");
        assert_eq!(
            SessionKind::parse_index_entry(&entry),
            Some((SessionKind::Refresh, "abc"))
        );
        assert_eq!(
            SessionKind::parse_index_entry("access:xyz"),
            Some((SessionKind::Access, "xyz"))
        );
    }

    #[test]
    fn unknown_or_empty_entries_are_ignored() {
        assert_eq!(SessionKind::parse_index_entry("legacy-id"), None);
        assert_eq!(SessionKind::parse_index_entry("access:"), None);
    }

    #[test]
    fn record_keys_follow_store_namespaces() {
        assert_eq!(SessionKind::Access.record_key("a"), "session:access:a");
        assert_eq!(SessionKind::Refresh.record_key("r"), "session:refresh:r");
    }
}
