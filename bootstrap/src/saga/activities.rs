//! Forward activities for the bootstrap saga.
//!
//! Each activity clones the `Arc`-held dependencies and any state it needs
//! out of `&BootstrapState`/`&BootstrapEnvironment` before moving them into a
//! `'static` boxed future — `Effect::Future`'s signature
//! (`Pin<Box<dyn Future<Output = Option<Action>> + Send>>`) carries no
//! lifetime, so nothing can borrow from the reducer call.

use std::sync::Arc;

use composable_rust_core::effect::Effect;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::EventStoreError;
use crate::event::EventMetadata;
use crate::store::EventStore;
use crate::{catalog, stream::StreamType};

use super::{BootstrapAction, BootstrapEnvironment, BootstrapState};

/// Which organization kind a bootstrap run provisions (§3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationType {
    /// A healthcare provider organization.
    Provider,
    /// An organization partnered with the platform rather than a provider itself.
    ProviderPartner,
    /// The platform operator's own organization.
    PlatformOwner,
}

/// Further categorizes a [`OrganizationType::ProviderPartner`] (§3.2, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartnerType {
    /// A value-added reseller, which gets its own customer-facing subdomain.
    Var,
    /// A stakeholder/family partner, which does not.
    Family,
}

/// One fully-connected contact/address/phone group: a person, their address
/// and their phone number, as a unit (§4.4 step 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactGroup {
    /// Contact's given name.
    pub contact_first_name: String,
    /// Contact's family name.
    pub contact_last_name: String,
    /// Contact's email.
    pub contact_email: String,
    /// Address line 1.
    pub address_line1: String,
    /// Address city.
    pub address_city: String,
    /// Address state/province.
    pub address_state: String,
    /// Address postal code.
    pub address_postal_code: String,
    /// Address country.
    pub address_country: String,
    /// Phone number.
    pub phone_number: String,
}

/// A Billing or Provider Admin section. Either carries its own
/// [`ContactGroup`], or shares General Info's entities by junction link
/// rather than duplicating them (`shared_from_general`, §4.4 step 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactGroupSection {
    /// When `true`, this section links to General Info's contact, address
    /// and phone instead of creating its own.
    pub shared_from_general: bool,
    /// Required when `shared_from_general` is `false`.
    #[serde(default)]
    pub contact_group: Option<ContactGroup>,
}

/// One admin invitee and the role their invitation should carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminInvite {
    /// The invitee's email address.
    pub email: String,
    /// The role name the invitation grants on acceptance (e.g. `provider_admin`).
    pub role: String,
}

/// The contact, address and phone ids created for one section, whether freshly
/// created or shared from General Info.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionEntities {
    /// The section's contact id.
    pub contact_id: Uuid,
    /// The section's address id.
    pub address_id: Uuid,
    /// The section's phone id.
    pub phone_id: Uuid,
}

pub(super) const SECTION_GENERAL: &str = "general";
pub(super) const SECTION_BILLING: &str = "billing";
pub(super) const SECTION_PROVIDER_ADMIN: &str = "provider_admin";

/// The inputs a bootstrap run is started with. Deserialized straight out of a
/// `workflow_queue.payload` column by the worker that claims the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapRequest {
    /// Display name for the organization.
    pub organization_name: String,
    /// URL-safe slug, also the basis for the derived workflow id.
    pub slug: String,
    /// Desired subdomain (often equal to `slug`). Only meaningful when
    /// [`BootstrapRequest::requires_subdomain`] is `true`; otherwise ignored
    /// and DNS provisioning is skipped entirely (S3).
    pub subdomain: Option<String>,
    /// The organization's kind.
    pub org_type: OrganizationType,
    /// Required when `org_type` is [`OrganizationType::ProviderPartner`], `None` otherwise.
    pub partner_type: Option<PartnerType>,
    /// The General Info contact group — always created fresh.
    pub general: ContactGroup,
    /// The Billing contact group or a share of General Info's.
    pub billing: ContactGroupSection,
    /// The Provider Admin contact group or a share of General Info's.
    pub provider_admin: ContactGroupSection,
    /// Admin invitees and the role each invitation should carry.
    pub admin_invites: Vec<AdminInvite>,
    /// The platform user who requested this bootstrap run.
    pub requested_by: Uuid,
}

impl BootstrapRequest {
    /// The subdomain rule (§4.4, normative): a subdomain is required, and DNS
    /// activities run, if and only if this is a `provider` organization, or a
    /// `provider_partner` whose `partner_type` is `var`. Every other
    /// combination (platform owner, non-VAR partners) skips DNS entirely.
    #[must_use]
    pub fn requires_subdomain(&self) -> bool {
        matches!(self.org_type, OrganizationType::Provider)
            || (self.org_type == OrganizationType::ProviderPartner
                && self.partner_type == Some(PartnerType::Var))
    }
}

fn activity_failed(activity: &'static str, reason: impl std::fmt::Display) -> BootstrapAction {
    BootstrapAction::StepFailed {
        error: format!("{activity}: {reason}"),
    }
}

/// `organization.created` (§4.4 step 1, subdomain collision is a terminal
/// failure here since `slug`/`subdomain` uniqueness is enforced by the
/// `organizations` table).
pub fn create_organization(
    state: &BootstrapState,
    env: &BootstrapEnvironment,
) -> Effect<BootstrapAction> {
    let event_store = env.event_store.clone();
    let request = state.request.clone();
    let correlation_id = state.correlation_id;
    let organization_id = Uuid::new_v4();

    Effect::Future(Box::pin(async move {
        let metadata = EventMetadata::new(Some(request.requested_by))
            .with_correlation_id(correlation_id)
            .with_reason("organization bootstrap requested");

        let result = event_store
            .emit_domain_event(
                organization_id.to_string(),
                StreamType::Organization,
                catalog::organization::CREATED.to_string(),
                json!({
                    "name": request.organization_name,
                    "slug": request.slug,
                    "subdomain": request.subdomain,
                    "type": request.org_type,
                    "partner_type": request.partner_type,
                    // No parent-organization input exists yet in this
                    // workflow, so every bootstrapped organization is its own
                    // root node; nesting a partner under a parent provider's
                    // path is future work.
                    "hierarchy_path": request.slug.clone(),
                }),
                metadata,
            )
            .await;

        Some(match result {
            Ok(_) => BootstrapAction::OrganizationCreated { organization_id },
            Err(e) => activity_failed("create_organization", e),
        })
    }))
}

async fn create_contact_group(
    event_store: &Arc<dyn EventStore>,
    ids: SectionEntities,
    group: &ContactGroup,
    metadata: EventMetadata,
) -> Result<(), EventStoreError> {
    event_store
        .emit_domain_event(
            ids.contact_id.to_string(),
            StreamType::Contact,
            catalog::contact::CREATED.to_string(),
            json!({
                "first_name": group.contact_first_name,
                "last_name": group.contact_last_name,
                "email": group.contact_email,
            }),
            metadata.clone(),
        )
        .await?;

    event_store
        .emit_domain_event(
            ids.address_id.to_string(),
            StreamType::Address,
            catalog::address::CREATED.to_string(),
            json!({
                "line1": group.address_line1,
                "line2": null,
                "city": group.address_city,
                "state": group.address_state,
                "postal_code": group.address_postal_code,
                "country": group.address_country,
            }),
            metadata.clone(),
        )
        .await?;

    event_store
        .emit_domain_event(
            ids.phone_id.to_string(),
            StreamType::Phone,
            catalog::phone::CREATED.to_string(),
            json!({
                "number": group.phone_number,
                "extension": null,
                "kind": "primary",
            }),
            metadata,
        )
        .await?;

    Ok(())
}

/// Resolve a section's entities: shared sections reuse General Info's ids
/// (no duplicate rows, §4.4 step 1); non-shared sections get their own.
async fn section_entities(
    event_store: &Arc<dyn EventStore>,
    section: &ContactGroupSection,
    general: SectionEntities,
    metadata: impl Fn() -> EventMetadata,
) -> Result<SectionEntities, EventStoreError> {
    if section.shared_from_general {
        return Ok(general);
    }

    let ids = SectionEntities {
        contact_id: Uuid::new_v4(),
        address_id: Uuid::new_v4(),
        phone_id: Uuid::new_v4(),
    };
    #[allow(clippy::expect_used)] // a non-shared section is only ever constructed with its own contact group
    let group = section
        .contact_group
        .as_ref()
        .expect("non-shared section must carry its own contact group");
    create_contact_group(event_store, ids, group, metadata()).await?;
    Ok(ids)
}

/// Emits the org-junctions and the pairwise contact↔address/contact↔phone/
/// phone↔address junctions that make `ids` a fully-connected "contact group"
/// for `section` (§4.4 step 1). Emitted even when `ids` was shared from
/// General Info: the junction rows themselves still record which section
/// referenced the entities, and the idempotent `ON CONFLICT DO NOTHING` on
/// the junction tables collapses a shared section's rows onto General Info's.
async fn link_contact_group(
    event_store: &Arc<dyn EventStore>,
    organization_id: Uuid,
    section: &'static str,
    ids: SectionEntities,
    metadata: impl Fn() -> EventMetadata,
) -> Result<(), EventStoreError> {
    let org_junctions = [
        (catalog::junction::ORG_CONTACT_LINKED, ids.contact_id),
        (catalog::junction::ORG_ADDRESS_LINKED, ids.address_id),
        (catalog::junction::ORG_PHONE_LINKED, ids.phone_id),
    ];
    for (event_type, right_id) in org_junctions {
        event_store
            .emit_domain_event(
                format!("{organization_id}:{right_id}"),
                StreamType::Junction,
                event_type.to_string(),
                json!({ "left_id": organization_id, "right_id": right_id, "section": section }),
                metadata(),
            )
            .await?;
    }

    let pairwise_junctions = [
        (catalog::junction::CONTACT_ADDRESS_LINKED, ids.contact_id, ids.address_id),
        (catalog::junction::CONTACT_PHONE_LINKED, ids.contact_id, ids.phone_id),
        (catalog::junction::PHONE_ADDRESS_LINKED, ids.phone_id, ids.address_id),
    ];
    for (event_type, left_id, right_id) in pairwise_junctions {
        event_store
            .emit_domain_event(
                format!("{left_id}:{right_id}"),
                StreamType::Junction,
                event_type.to_string(),
                json!({ "left_id": left_id, "right_id": right_id }),
                metadata(),
            )
            .await?;
    }

    Ok(())
}

/// Creates and fully links General Info, Billing and Provider Admin's
/// contact/address/phone entities (§4.4 step 1).
pub fn create_entities(
    state: &BootstrapState,
    env: &BootstrapEnvironment,
) -> Effect<BootstrapAction> {
    let event_store = env.event_store.clone();
    let request = state.request.clone();
    let correlation_id = state.correlation_id;
    #[allow(clippy::expect_used)] // reducer never calls this activity before OrganizationCreated
    let organization_id = state.organization_id.expect("organization must exist");

    Effect::Future(Box::pin(async move {
        let metadata = || {
            EventMetadata::new(Some(request.requested_by)).with_correlation_id(correlation_id)
        };

        let general = SectionEntities {
            contact_id: Uuid::new_v4(),
            address_id: Uuid::new_v4(),
            phone_id: Uuid::new_v4(),
        };
        if let Err(e) =
            create_contact_group(&event_store, general, &request.general, metadata()).await
        {
            return Some(activity_failed("create_entities", e));
        }

        let billing =
            match section_entities(&event_store, &request.billing, general, metadata).await {
                Ok(ids) => ids,
                Err(e) => return Some(activity_failed("create_entities", e)),
            };

        let provider_admin = match section_entities(
            &event_store,
            &request.provider_admin,
            general,
            metadata,
        )
        .await
        {
            Ok(ids) => ids,
            Err(e) => return Some(activity_failed("create_entities", e)),
        };

        for (section, ids) in [
            (SECTION_GENERAL, general),
            (SECTION_BILLING, billing),
            (SECTION_PROVIDER_ADMIN, provider_admin),
        ] {
            if let Err(e) =
                link_contact_group(&event_store, organization_id, section, ids, metadata).await
            {
                return Some(activity_failed("create_entities", e));
            }
        }

        Some(BootstrapAction::EntitiesCreated {
            general,
            billing,
            provider_admin,
        })
    }))
}

/// Configures the organization's subdomain (§4.4 step 3). The reducer only
/// dispatches this activity when [`BootstrapRequest::requires_subdomain`] is
/// `true` (S3 skips straight to invitation generation otherwise).
pub fn configure_dns(state: &BootstrapState, env: &BootstrapEnvironment) -> Effect<BootstrapAction> {
    let event_store = env.event_store.clone();
    let dns_provider = env.dns_provider.clone();
    let correlation_id = state.correlation_id;
    #[allow(clippy::expect_used)] // reducer never calls this activity before OrganizationCreated
    let organization_id = state.organization_id.expect("organization must exist");
    #[allow(clippy::expect_used)] // reducer only dispatches configure_dns when requires_subdomain() is true
    let subdomain = state
        .request
        .subdomain
        .clone()
        .expect("configure_dns dispatched without a requested subdomain");
    let requested_by = state.request.requested_by;

    Effect::Future(Box::pin(async move {
        let record = match dns_provider.configure(&subdomain).await {
            Ok(record) => record,
            Err(e) => return Some(activity_failed("configure_dns", e)),
        };

        let metadata = EventMetadata::new(Some(requested_by)).with_correlation_id(correlation_id);
        let result = event_store
            .emit_domain_event(
                organization_id.to_string(),
                StreamType::Organization,
                catalog::organization::DNS_CONFIGURED.to_string(),
                json!({ "provider_record_id": record.provider_record_id }),
                metadata,
            )
            .await;

        Some(match result {
            Ok(_) => BootstrapAction::DnsConfigured { record },
            Err(e) => activity_failed("configure_dns", e),
        })
    }))
}

/// Confirms the subdomain resolves (§4.4 step 4); a not-yet-resolved result is
/// transient and handled by [`super::BootstrapReducer`]'s retry-with-backoff
/// loop, not by this activity itself.
pub fn verify_dns(state: &BootstrapState, env: &BootstrapEnvironment) -> Effect<BootstrapAction> {
    Effect::Future(Box::pin(verify_dns_future(
        clone_verify_inputs(state, env),
    )))
}

struct VerifyInputs {
    event_store: std::sync::Arc<dyn crate::store::EventStore>,
    dns_provider: std::sync::Arc<dyn crate::providers::DnsProvider>,
    organization_id: Uuid,
    record: crate::providers::DnsRecord,
    correlation_id: Uuid,
    requested_by: Uuid,
}

fn clone_verify_inputs(state: &BootstrapState, env: &BootstrapEnvironment) -> VerifyInputs {
    VerifyInputs {
        event_store: env.event_store.clone(),
        dns_provider: env.dns_provider.clone(),
        #[allow(clippy::expect_used)] // reducer never verifies before configuring
        organization_id: state.organization_id.expect("organization must exist"),
        #[allow(clippy::expect_used)] // reducer never verifies before configuring
        record: state.dns_record.clone().expect("dns record must exist"),
        correlation_id: state.correlation_id,
        requested_by: state.request.requested_by,
    }
}

async fn verify_dns_future(inputs: VerifyInputs) -> Option<BootstrapAction> {
    match inputs.dns_provider.verify(&inputs.record).await {
        Ok(()) => {
            let metadata = EventMetadata::new(Some(inputs.requested_by))
                .with_correlation_id(inputs.correlation_id);
            let result = inputs
                .event_store
                .emit_domain_event(
                    inputs.organization_id.to_string(),
                    StreamType::Organization,
                    catalog::organization::DNS_VERIFIED.to_string(),
                    json!({}),
                    metadata,
                )
                .await;

            Some(match result {
                Ok(_) => BootstrapAction::DnsVerified,
                Err(e) => activity_failed("verify_dns", e),
            })
        }
        Err(e) if e.is_retryable() => Some(BootstrapAction::DnsVerificationPending),
        Err(e) => Some(activity_failed("verify_dns", e)),
    }
}

/// Generates a pending invitation per requested admin invitee, carrying the
/// role their invitation grants on acceptance (§4.4 step 5).
pub fn generate_invitations(
    state: &BootstrapState,
    env: &BootstrapEnvironment,
) -> Effect<BootstrapAction> {
    let event_store = env.event_store.clone();
    #[allow(clippy::expect_used)] // reducer never invites before organization exists
    let organization_id = state.organization_id.expect("organization must exist");
    let correlation_id = state.correlation_id;
    let requested_by = state.request.requested_by;
    let admin_invites = state.request.admin_invites.clone();
    let invitation_ttl = env.config.invitation_ttl;

    Effect::Future(Box::pin(async move {
        let mut invitations = Vec::with_capacity(admin_invites.len());

        for invite in admin_invites {
            let invitation_id = Uuid::new_v4();
            let token = Uuid::new_v4().to_string();
            let expires_at = chrono::Utc::now() + invitation_ttl;

            let metadata = EventMetadata::new(Some(requested_by)).with_correlation_id(correlation_id);
            let result = event_store
                .emit_domain_event(
                    invitation_id.to_string(),
                    StreamType::Invitation,
                    catalog::invitation::CREATED.to_string(),
                    json!({
                        "organization_id": organization_id,
                        "email": invite.email,
                        "role_name": invite.role,
                        "token": token,
                        "expires_at": expires_at,
                    }),
                    metadata,
                )
                .await;

            if let Err(e) = result {
                return Some(activity_failed("generate_invitations", e));
            }

            invitations.push((invitation_id, invite.email));
        }

        Some(BootstrapAction::InvitationsGenerated { invitations })
    }))
}

/// Emails each generated invitation. A delivery failure for one invitee is
/// recorded as a non-critical `invitation.email.failed` event and does not
/// fail the saga (§6.3): the organization still activates, and failed
/// invitations can be resent later through the ordinary invitation API.
pub fn send_invitation_emails(
    state: &BootstrapState,
    env: &BootstrapEnvironment,
) -> Effect<BootstrapAction> {
    let event_store = env.event_store.clone();
    let email_provider = env.email_provider.clone();
    let correlation_id = state.correlation_id;
    let requested_by = state.request.requested_by;
    let organization_name = state.request.organization_name.clone();
    let base_url = env.config.base_url.clone();
    let invitations = state.invitations.clone();
    let invitation_ttl = env.config.invitation_ttl;

    Effect::Future(Box::pin(async move {
        for (invitation_id, email) in invitations {
            let outcome = email_provider
                .send_invitation(crate::providers::InvitationEmail {
                    to: email,
                    organization_name: organization_name.clone(),
                    accept_url: format!("{base_url}/invitations/accept?token={invitation_id}"),
                    expires_at: chrono::Utc::now() + invitation_ttl,
                })
                .await;

            let metadata = EventMetadata::new(Some(requested_by)).with_correlation_id(correlation_id);
            let (event_type, payload): (&'static str, serde_json::Value) = match outcome {
                Ok(()) => (catalog::invitation::EMAIL_SENT, json!({})),
                Err(e) => (catalog::invitation::EMAIL_FAILED, json!({ "reason": e.to_string() })),
            };

            // Non-critical: recorded on the event row regardless of outcome,
            // never returned to the saga as a failure.
            let _ = event_store
                .emit_domain_event(
                    invitation_id.to_string(),
                    StreamType::Invitation,
                    event_type.to_string(),
                    payload,
                    metadata,
                )
                .await;
        }

        Some(BootstrapAction::InvitationEmailsSent)
    }))
}

/// Marks the organization active (§4.4 step 6, the saga's last step): emits
/// `organization.activated` (flipping `is_active`/`status` live) and then
/// `organization.bootstrap.completed` (closing out the workflow run itself).
pub fn activate_organization(
    state: &BootstrapState,
    env: &BootstrapEnvironment,
) -> Effect<BootstrapAction> {
    let event_store = env.event_store.clone();
    #[allow(clippy::expect_used)] // reducer never activates before organization exists
    let organization_id = state.organization_id.expect("organization must exist");
    let correlation_id = state.correlation_id;
    let requested_by = state.request.requested_by;

    Effect::Future(Box::pin(async move {
        let activated_metadata = EventMetadata::new(Some(requested_by))
            .with_correlation_id(correlation_id)
            .with_reason("bootstrap workflow completed successfully");

        if let Err(e) = event_store
            .emit_domain_event(
                organization_id.to_string(),
                StreamType::Organization,
                catalog::organization::ACTIVATED.to_string(),
                json!({}),
                activated_metadata,
            )
            .await
        {
            return Some(activity_failed("activate_organization", e));
        }

        let completed_metadata = EventMetadata::new(Some(requested_by))
            .with_correlation_id(correlation_id)
            .with_reason("bootstrap workflow completed successfully");

        let result = event_store
            .emit_domain_event(
                organization_id.to_string(),
                StreamType::Organization,
                catalog::organization::BOOTSTRAP_COMPLETED.to_string(),
                json!({}),
                completed_metadata,
            )
            .await;

        Some(match result {
            Ok(_) => BootstrapAction::OrganizationActivated,
            Err(e) => activity_failed("activate_organization", e),
        })
    }))
}
