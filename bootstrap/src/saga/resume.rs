//! Reconstructing in-flight saga state from the event log after a crash
//! (§4.3 step 2, S5 "retry after crash").
//!
//! The saga keeps no checkpoint of its own — a worker that dies mid-run loses
//! `BootstrapState` along with the process. Recovery works backwards from
//! what does survive: the `organizations` read-model row for the request's
//! `slug`, plus the org-junction events linking it to each section's
//! contact/address/phone (the `section` tag on each org-junction payload is
//! what lets this module tell General Info's entities apart from Billing's or
//! Provider Admin's). From those this module rebuilds enough of
//! `BootstrapState` that a resumed run can dispatch [`BootstrapAction::Resume`]
//! instead of re-running `create_organization`/`create_entities` against a
//! slug that's already claimed.
//!
//! Invitations generated before a crash are not replayed into `state` here:
//! `generate_invitations` has no dedup against existing rows, so a resume
//! that restarts at `GeneratingInvitations` may emit a second round of
//! invitations for the same admin emails. P9's no-duplicate guarantee is
//! scoped to the organization/contact/address/phone/junction rows this
//! module does reconstruct; invitations sit outside it.

use std::collections::HashMap;

use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::catalog;
use crate::error::EventStoreError;
use crate::providers::DnsRecord;

use super::activities::{SECTION_BILLING, SECTION_GENERAL, SECTION_PROVIDER_ADMIN};
use super::{BootstrapState, BootstrapStep, SectionEntities};

/// Look up the organization already bootstrapped for `slug`, if any, from the
/// read model rather than scanning the event log for it.
///
/// # Errors
///
/// Propagates any query failure.
pub async fn find_organization_id(pool: &PgPool, slug: &str) -> Result<Option<Uuid>, sqlx::Error> {
    let row = sqlx::query("SELECT id FROM organizations WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.get::<Uuid, _>("id")))
}

#[derive(Default, Clone, Copy)]
struct PartialEntities {
    contact_id: Option<Uuid>,
    address_id: Option<Uuid>,
    phone_id: Option<Uuid>,
}

impl PartialEntities {
    fn complete(self) -> Option<SectionEntities> {
        Some(SectionEntities {
            contact_id: self.contact_id?,
            address_id: self.address_id?,
            phone_id: self.phone_id?,
        })
    }
}

/// Replay the org-junction events linking `organization_id` to its entities,
/// oldest first (so a later `*.unlinked` from a partially-run compensation
/// correctly overrides an earlier `*.linked`), grouped by the `section` tag
/// each org-junction payload carries.
async fn linked_entities(
    pool: &PgPool,
    organization_id: Uuid,
) -> Result<HashMap<String, PartialEntities>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT event_type, event_data FROM events
         WHERE stream_type = 'junction' AND stream_id LIKE $1
         ORDER BY sequence_number ASC",
    )
    .bind(format!("{organization_id}:%"))
    .fetch_all(pool)
    .await?;

    let mut sections: HashMap<String, PartialEntities> = HashMap::new();
    for row in rows {
        let event_type: String = row.get("event_type");
        let data: serde_json::Value = row.get("event_data");
        let right_id = data
            .get("right_id")
            .and_then(serde_json::Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok());
        let Some(section) = data.get("section").and_then(serde_json::Value::as_str) else {
            continue;
        };
        let entry = sections.entry(section.to_string()).or_default();

        match event_type.as_str() {
            t if t == catalog::junction::ORG_CONTACT_LINKED => entry.contact_id = right_id,
            t if t == catalog::junction::ORG_CONTACT_UNLINKED => entry.contact_id = None,
            t if t == catalog::junction::ORG_ADDRESS_LINKED => entry.address_id = right_id,
            t if t == catalog::junction::ORG_ADDRESS_UNLINKED => entry.address_id = None,
            t if t == catalog::junction::ORG_PHONE_LINKED => entry.phone_id = right_id,
            t if t == catalog::junction::ORG_PHONE_UNLINKED => entry.phone_id = None,
            _ => {}
        }
    }
    Ok(sections)
}

struct OrganizationRow {
    status: String,
    dns_record_id: Option<String>,
    dns_verified_at: Option<chrono::DateTime<chrono::Utc>>,
}

async fn organization_row(pool: &PgPool, organization_id: Uuid) -> Result<OrganizationRow, sqlx::Error> {
    let row = sqlx::query(
        "SELECT status, dns_record_id, dns_verified_at FROM organizations WHERE id = $1",
    )
    .bind(organization_id)
    .fetch_one(pool)
    .await?;

    Ok(OrganizationRow {
        status: row.get("status"),
        dns_record_id: row.get("dns_record_id"),
        dns_verified_at: row.get("dns_verified_at"),
    })
}

/// Rebuild `state` in place to reflect the forward progress already
/// committed for `organization_id`, so the reducer can resume from
/// `state.step` via [`super::BootstrapAction::Resume`] instead of restarting
/// the whole run.
///
/// # Errors
///
/// [`EventStoreError::Database`] if the read model can't be queried.
pub async fn reconstruct_state(
    pool: &PgPool,
    organization_id: Uuid,
    state: &mut BootstrapState,
) -> Result<(), EventStoreError> {
    state.organization_id = Some(organization_id);

    let org = organization_row(pool, organization_id)
        .await
        .map_err(EventStoreError::Database)?;
    let sections = linked_entities(pool, organization_id)
        .await
        .map_err(EventStoreError::Database)?;

    state.general_entities = sections.get(SECTION_GENERAL).copied().and_then(PartialEntities::complete);
    state.billing_entities = sections.get(SECTION_BILLING).copied().and_then(PartialEntities::complete);
    state.provider_admin_entities = sections
        .get(SECTION_PROVIDER_ADMIN)
        .copied()
        .and_then(PartialEntities::complete);

    if let Some(provider_record_id) = org.dns_record_id {
        state.dns_record = Some(DnsRecord {
            provider_record_id,
            fqdn: state
                .request
                .subdomain
                .clone()
                .map(|s| format!("{s}.example-platform.test"))
                .unwrap_or_default(),
        });
    }

    state.step = if org.status == "active" {
        BootstrapStep::Completed
    } else if matches!(org.status.as_str(), "deactivated" | "deleted" | "bootstrap_failed") {
        // Compensation already ran to some extent; restarting the backward
        // walk from the top is safe (see the `Resume` reducer arm).
        BootstrapStep::Compensating
    } else if state.general_entities.is_none() {
        BootstrapStep::CreatingEntities
    } else if !state.request.requires_subdomain() || org.dns_verified_at.is_some() {
        BootstrapStep::GeneratingInvitations
    } else if org.dns_record_id.is_some() {
        BootstrapStep::VerifyingDns
    } else {
        BootstrapStep::ConfiguringDns
    };

    Ok(())
}
