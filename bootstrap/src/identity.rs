//! Tenant isolation and platform-privilege checks (`SPEC_FULL.md` §5, §6.4).
//!
//! `Claims` is grounded on `composable_rust_auth::state::UserId`'s newtype-pair
//! pattern, not on auth's login/session flows — this crate only needs to read
//! an already-authenticated caller's identity, not perform authentication.

use uuid::Uuid;

/// The authenticated caller's identity and scope, as decoded from a validated
/// bearer token upstream of this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    /// The caller's platform user id.
    pub user_id: Uuid,
    /// The organization the caller is currently scoped to.
    pub organization_id: Uuid,
    /// Permission strings granted to the caller within `organization_id`
    /// (e.g. `"organization.admin"`, `"invitation.create"`).
    pub permissions: Vec<String>,
    /// `true` for platform super-admins, who bypass organization-scoped
    /// permission checks entirely (§6.4's platform-super-admin carve-out).
    pub is_platform_admin: bool,
}

impl Claims {
    /// `true` if the caller is a platform super-admin.
    #[must_use]
    pub const fn has_platform_privilege(&self) -> bool {
        self.is_platform_admin
    }

    /// `true` if the caller may act as an organization admin within
    /// `organization_id` — either a platform super-admin, or a caller scoped
    /// to that exact organization holding `"organization.admin"`.
    #[must_use]
    pub fn has_org_admin_permission(&self, organization_id: Uuid) -> bool {
        self.has_platform_privilege()
            || (self.organization_id == organization_id
                && self.permissions.iter().any(|p| p == "organization.admin"))
    }

    /// `true` if the caller holds `permission` scoped to `organization_id`.
    ///
    /// Junction-table double-scoped isolation means holding `permission`
    /// anywhere is not enough: the caller's active `organization_id` must
    /// match the resource's organization too, unless they're a platform
    /// super-admin.
    #[must_use]
    pub fn has_permission_at_scope(&self, permission: &str, organization_id: Uuid) -> bool {
        self.has_platform_privilege()
            || (self.organization_id == organization_id
                && self.permissions.iter().any(|p| p == permission))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(organization_id: Uuid, permissions: &[&str], is_platform_admin: bool) -> Claims {
        Claims {
            user_id: Uuid::new_v4(),
            organization_id,
            permissions: permissions.iter().map(|s| (*s).to_string()).collect(),
            is_platform_admin,
        }
    }

    #[test]
    fn platform_admin_bypasses_org_scope() {
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();
        let claims = claims(org_a, &[], true);

        assert!(claims.has_permission_at_scope("anything", org_b));
        assert!(claims.has_org_admin_permission(org_b));
    }

    #[test]
    fn permission_does_not_cross_organization_boundary() {
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();
        let claims = claims(org_a, &["organization.admin"], false);

        assert!(claims.has_org_admin_permission(org_a));
        assert!(!claims.has_org_admin_permission(org_b));
        assert!(!claims.has_permission_at_scope("organization.admin", org_b));
    }
}
