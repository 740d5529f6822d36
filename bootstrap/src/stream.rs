//! Stream identity: which aggregate kind an event belongs to.
//!
//! Mirrors the newtype discipline of `composable_rust_core::stream` (a `StreamId`
//! you can't confuse with an arbitrary string), but the bootstrap domain needs a
//! closed, named set of aggregate kinds rather than a free-form stream id alone,
//! since `stream_type` is itself a column the event store and projection router
//! dispatch on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The aggregate kind a stream belongs to.
///
/// Every projection family and every `emit_domain_event` call is scoped to one
/// of these. The set is closed: adding a new stream type means adding a new
/// variant here, a new projection handler, and a new entry in the event
/// catalog, all at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    /// Organization aggregate (provider, provider partner, or platform owner).
    Organization,
    /// Contact entity (name + email, independent of any organization).
    Contact,
    /// Postal address entity.
    Address,
    /// Phone number entity.
    Phone,
    /// A junction linking two entities (or an entity to an organization).
    Junction,
    /// A platform user synced from the identity provider.
    User,
    /// An RBAC role.
    Role,
    /// An RBAC permission.
    Permission,
    /// An admin invitation.
    Invitation,
    /// A bootstrap workflow queue row.
    WorkflowQueue,
    /// A schedule template.
    Schedule,
    /// A cross-tenant access grant.
    AccessGrant,
    /// An impersonation session.
    Impersonation,
}

impl StreamType {
    /// The lowercase name stored in the `stream_type` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Contact => "contact",
            Self::Address => "address",
            Self::Phone => "phone",
            Self::Junction => "junction",
            Self::User => "user",
            Self::Role => "role",
            Self::Permission => "permission",
            Self::Invitation => "invitation",
            Self::WorkflowQueue => "workflow_queue",
            Self::Schedule => "schedule",
            Self::AccessGrant => "access_grant",
            Self::Impersonation => "impersonation",
        }
    }

    /// Parse a `stream_type` column value back into a `StreamType`.
    ///
    /// # Errors
    ///
    /// Returns the original string if it doesn't match a known stream type.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "organization" => Ok(Self::Organization),
            "contact" => Ok(Self::Contact),
            "address" => Ok(Self::Address),
            "phone" => Ok(Self::Phone),
            "junction" => Ok(Self::Junction),
            "user" => Ok(Self::User),
            "role" => Ok(Self::Role),
            "permission" => Ok(Self::Permission),
            "invitation" => Ok(Self::Invitation),
            "workflow_queue" => Ok(Self::WorkflowQueue),
            "schedule" => Ok(Self::Schedule),
            "access_grant" => Ok(Self::AccessGrant),
            "impersonation" => Ok(Self::Impersonation),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_all_variants() {
        let all = [
            StreamType::Organization,
            StreamType::Contact,
            StreamType::Address,
            StreamType::Phone,
            StreamType::Junction,
            StreamType::User,
            StreamType::Role,
            StreamType::Permission,
            StreamType::Invitation,
            StreamType::WorkflowQueue,
            StreamType::Schedule,
            StreamType::AccessGrant,
            StreamType::Impersonation,
        ];
        for st in all {
            assert_eq!(StreamType::parse(st.as_str()), Ok(st));
        }
    }

    #[test]
    fn parse_unknown_is_err() {
        assert!(StreamType::parse("not_a_stream_type").is_err());
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(StreamType::Organization.to_string(), "organization");
    }
}
