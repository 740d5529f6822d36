//! The authoritative, closed event type catalog (`SPEC_FULL.md` §6.2, §6.3).
//!
//! Each family is a plain `&'static str` constant rather than a derive-macro'd
//! enum: the projection router dispatches on the string read back from the
//! `event_type` column, so the compile-time exhaustiveness this crate relies on
//! comes from the `match` arms in `projection::*` having no wildcard, not from a
//! Rust-level tagged union the database would need to mirror.

/// Organization lifecycle event types.
pub mod organization {
    /// A new organization was created.
    pub const CREATED: &str = "organization.created";
    /// Bootstrap finished successfully and the organization is live.
    pub const ACTIVATED: &str = "organization.activated";
    /// The organization was deactivated (reversible).
    pub const DEACTIVATED: &str = "organization.deactivated";
    /// The organization was deleted (soft delete, irreversible in this workflow).
    pub const DELETED: &str = "organization.deleted";
    /// A DNS record was created for the organization's subdomain.
    pub const DNS_CONFIGURED: &str = "organization.dns.configured";
    /// The DNS record was confirmed to resolve.
    pub const DNS_VERIFIED: &str = "organization.dns.verified";
    /// DNS configuration failed terminally.
    pub const DNS_FAILED: &str = "organization.dns.failed";
    /// The DNS record was removed (compensation).
    pub const DNS_REMOVED: &str = "organization.dns.removed";
    /// A bootstrap workflow run was requested for this organization.
    pub const BOOTSTRAP_INITIATED: &str = "organization.bootstrap.initiated";
    /// The bootstrap workflow run completed (success or terminal failure).
    pub const BOOTSTRAP_COMPLETED: &str = "organization.bootstrap.completed";
}

/// Contact entity event types (identical shape for address/phone, see [`address`], [`phone`]).
pub mod contact {
    /// A contact was created.
    pub const CREATED: &str = "contact.created";
    /// A contact's fields were updated.
    pub const UPDATED: &str = "contact.updated";
    /// A contact was soft-deleted.
    pub const DELETED: &str = "contact.deleted";
    /// A contact was linked to a platform user.
    pub const USER_LINKED: &str = "contact.user.linked";
    /// A contact was unlinked from a platform user.
    pub const USER_UNLINKED: &str = "contact.user.unlinked";
}

/// Address entity event types.
pub mod address {
    /// An address was created.
    pub const CREATED: &str = "address.created";
    /// An address's fields were updated.
    pub const UPDATED: &str = "address.updated";
    /// An address was soft-deleted.
    pub const DELETED: &str = "address.deleted";
}

/// Phone entity event types.
pub mod phone {
    /// A phone number was created.
    pub const CREATED: &str = "phone.created";
    /// A phone number's fields were updated.
    pub const UPDATED: &str = "phone.updated";
    /// A phone number was soft-deleted.
    pub const DELETED: &str = "phone.deleted";
}

/// Junction (entity-to-entity / entity-to-organization link) event types.
pub mod junction {
    /// An organization was linked to a contact.
    pub const ORG_CONTACT_LINKED: &str = "organization.contact.linked";
    /// An organization was unlinked from a contact.
    pub const ORG_CONTACT_UNLINKED: &str = "organization.contact.unlinked";
    /// An organization was linked to an address.
    pub const ORG_ADDRESS_LINKED: &str = "organization.address.linked";
    /// An organization was unlinked from an address.
    pub const ORG_ADDRESS_UNLINKED: &str = "organization.address.unlinked";
    /// An organization was linked to a phone.
    pub const ORG_PHONE_LINKED: &str = "organization.phone.linked";
    /// An organization was unlinked from a phone.
    pub const ORG_PHONE_UNLINKED: &str = "organization.phone.unlinked";
    /// A contact was linked to an address.
    pub const CONTACT_ADDRESS_LINKED: &str = "contact.address.linked";
    /// A contact was unlinked from an address.
    pub const CONTACT_ADDRESS_UNLINKED: &str = "contact.address.unlinked";
    /// A contact was linked to a phone.
    pub const CONTACT_PHONE_LINKED: &str = "contact.phone.linked";
    /// A contact was unlinked from a phone.
    pub const CONTACT_PHONE_UNLINKED: &str = "contact.phone.unlinked";
    /// A phone was linked to an address.
    pub const PHONE_ADDRESS_LINKED: &str = "phone.address.linked";
    /// A phone was unlinked from an address.
    pub const PHONE_ADDRESS_UNLINKED: &str = "phone.address.unlinked";
}

/// Invitation event types.
pub mod invitation {
    /// An admin invitation was issued.
    pub const CREATED: &str = "invitation.created";
    /// The invitation email was delivered.
    pub const EMAIL_SENT: &str = "invitation.email.sent";
    /// The invitation email failed to deliver.
    pub const EMAIL_FAILED: &str = "invitation.email.failed";
    /// The invitation was revoked (compensation, or explicit admin action).
    pub const REVOKED: &str = "invitation.revoked";
    /// The invitation was accepted and the invitee became a user.
    pub const ACCEPTED: &str = "invitation.accepted";
}

/// User and RBAC event types.
pub mod user {
    /// A platform user record was created.
    pub const CREATED: &str = "user.created";
    /// A user's profile was refreshed from the identity provider.
    pub const SYNCED_FROM_AUTH: &str = "user.synced_from_auth";
    /// A user was deactivated.
    pub const DEACTIVATED: &str = "user.deactivated";
    /// A previously deactivated user was reactivated.
    pub const REACTIVATED: &str = "user.reactivated";
    /// A user switched their active organization.
    pub const ORGANIZATION_SWITCHED: &str = "user.organization_switched";
    /// A role was assigned to a user.
    pub const ROLE_ASSIGNED: &str = "user.role.assigned";
    /// A role was removed from a user.
    pub const ROLE_REMOVED: &str = "user.role.removed";
    /// A role was revoked from a user (administrative action, distinct from removal).
    pub const ROLE_REVOKED: &str = "user.role.revoked";
}

/// RBAC role/permission event types.
pub mod rbac {
    /// A role was created.
    pub const ROLE_CREATED: &str = "role.created";
    /// A role was updated.
    pub const ROLE_UPDATED: &str = "role.updated";
    /// A role was deleted.
    pub const ROLE_DELETED: &str = "role.deleted";
    /// A permission was defined.
    pub const PERMISSION_DEFINED: &str = "permission.defined";
}

/// Schedule template event types.
pub mod schedule {
    /// A schedule template was created.
    pub const CREATED: &str = "schedule.created";
    /// A schedule template was updated.
    pub const UPDATED: &str = "schedule.updated";
    /// A schedule template was deactivated.
    pub const DEACTIVATED: &str = "schedule.deactivated";
    /// A schedule template was reactivated.
    pub const REACTIVATED: &str = "schedule.reactivated";
    /// A schedule template was deleted.
    pub const DELETED: &str = "schedule.deleted";
    /// A user was assigned to a schedule template.
    pub const USER_ASSIGNED: &str = "schedule.user_assigned";
    /// A user was unassigned from a schedule template.
    pub const USER_UNASSIGNED: &str = "schedule.user_unassigned";
}

/// Cross-tenant access grant event types.
pub mod access_grant {
    /// An access grant was created.
    pub const CREATED: &str = "access_grant.created";
    /// An access grant was revoked.
    pub const REVOKED: &str = "access_grant.revoked";
    /// An access grant expired.
    pub const EXPIRED: &str = "access_grant.expired";
    /// An access grant was suspended.
    pub const SUSPENDED: &str = "access_grant.suspended";
    /// A suspended access grant was reactivated.
    pub const REACTIVATED: &str = "access_grant.reactivated";
}

/// Job queue row event types (`SPEC_FULL.md` §4.3).
pub mod workflow_queue {
    /// A workflow run was enqueued.
    pub const ENQUEUED: &str = "workflow_queue.enqueued";
    /// A worker claimed the row.
    pub const CLAIMED: &str = "workflow_queue.claimed";
    /// The claimed worker released the row back to pending without finishing
    /// (e.g. on graceful shutdown).
    pub const RELEASED: &str = "workflow_queue.released";
    /// The workflow run completed successfully.
    pub const COMPLETED: &str = "workflow_queue.completed";
    /// The workflow run failed terminally (compensation ran or was exhausted).
    pub const FAILED: &str = "workflow_queue.failed";
    /// The workflow run was cancelled before it started.
    pub const CANCELLED: &str = "workflow_queue.cancelled";
}

/// Impersonation session event types.
pub mod impersonation {
    /// An impersonation session started.
    pub const STARTED: &str = "impersonation.started";
    /// An impersonation session was renewed.
    pub const RENEWED: &str = "impersonation.renewed";
    /// An impersonation session ended.
    pub const ENDED: &str = "impersonation.ended";
}

/// Event types whose projection failure must be raised back to the caller of
/// `emit_domain_event` rather than merely recorded on the row (`SPEC_FULL.md` §6.3).
pub const CRITICAL_EVENT_TYPES: &[&str] = &[
    user::CREATED,
    user::ROLE_ASSIGNED,
    user::ROLE_REMOVED,
    invitation::ACCEPTED,
    invitation::CREATED,
    organization::CREATED,
    organization::BOOTSTRAP_COMPLETED,
];

/// `true` if `event_type` is in [`CRITICAL_EVENT_TYPES`].
#[must_use]
pub fn is_critical(event_type: &str) -> bool {
    CRITICAL_EVENT_TYPES.contains(&event_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_events_match_spec_list() {
        assert!(is_critical(organization::CREATED));
        assert!(is_critical(organization::BOOTSTRAP_COMPLETED));
        assert!(is_critical(user::CREATED));
        assert!(is_critical(user::ROLE_ASSIGNED));
        assert!(is_critical(user::ROLE_REMOVED));
        assert!(is_critical(invitation::ACCEPTED));
        assert!(is_critical(invitation::CREATED));
    }

    #[test]
    fn non_critical_event_is_not_critical() {
        assert!(!is_critical(schedule::USER_ASSIGNED));
        assert!(!is_critical(address::UPDATED));
    }
}
