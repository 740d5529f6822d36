//! Compensating activities, run in reverse step order after a terminal
//! forward failure (§4.4, §5). Each compensation is best-effort: a step that
//! was never reached has nothing to undo, so `next_compensation` skips
//! straight past it.

use composable_rust_core::effect::Effect;
use serde_json::json;
use uuid::Uuid;

use crate::catalog;
use crate::event::EventMetadata;
use crate::stream::StreamType;

use super::{BootstrapAction, BootstrapEnvironment, BootstrapState, BootstrapStep};

/// Steps visited in forward order; compensation walks this list backwards
/// from wherever the saga got to.
const FORWARD_ORDER: &[BootstrapStep] = &[
    BootstrapStep::CreatingOrganization,
    BootstrapStep::CreatingEntities,
    BootstrapStep::ConfiguringDns,
    BootstrapStep::VerifyingDns,
    BootstrapStep::GeneratingInvitations,
    BootstrapStep::SendingInvitations,
    BootstrapStep::Activating,
];

fn last_reached_index(failed_step: BootstrapStep) -> usize {
    FORWARD_ORDER
        .iter()
        .position(|s| *s == failed_step)
        .unwrap_or(FORWARD_ORDER.len() - 1)
}

/// Dispatch the compensation for whatever step the saga most recently
/// completed, based on `state.step` at the moment `StepFailed` was raised.
pub fn next_compensation(
    state: &BootstrapState,
    env: &BootstrapEnvironment,
) -> Effect<BootstrapAction> {
    dispatch_compensation_at(state, env, last_reached_index(state.step))
}

/// After one compensation step finishes, move to the next one further back,
/// or finish the run as failed once everything has been unwound.
pub fn after_compensation(
    state: &mut BootstrapState,
    env: &BootstrapEnvironment,
    completed_step: BootstrapStep,
) -> Effect<BootstrapAction> {
    let index = FORWARD_ORDER
        .iter()
        .position(|s| *s == completed_step)
        .unwrap_or(0);

    if index == 0 {
        state.step = BootstrapStep::Failed;
        return Effect::None;
    }

    dispatch_compensation_at(state, env, index - 1)
}

fn dispatch_compensation_at(
    state: &BootstrapState,
    env: &BootstrapEnvironment,
    index: usize,
) -> Effect<BootstrapAction> {
    match FORWARD_ORDER[index] {
        BootstrapStep::SendingInvitations | BootstrapStep::Activating => {
            revoke_invitations(state, env)
        }
        BootstrapStep::GeneratingInvitations => revoke_invitations(state, env),
        BootstrapStep::VerifyingDns | BootstrapStep::ConfiguringDns => remove_dns(state, env),
        BootstrapStep::CreatingEntities => delete_entities(state, env),
        BootstrapStep::CreatingOrganization => deactivate_organization(state, env),
        BootstrapStep::NotStarted | BootstrapStep::Completed | BootstrapStep::Compensating | BootstrapStep::Failed => {
            Effect::None
        }
    }
}

fn revoke_invitations(state: &BootstrapState, env: &BootstrapEnvironment) -> Effect<BootstrapAction> {
    let event_store = env.event_store.clone();
    let invitations = state.invitations.clone();
    let correlation_id = state.correlation_id;
    let requested_by = state.request.requested_by;

    Effect::Future(Box::pin(async move {
        for (invitation_id, _email) in invitations {
            let metadata = EventMetadata::new(Some(requested_by))
                .with_correlation_id(correlation_id)
                .with_reason("bootstrap run failed, unwinding issued invitations");
            if let Err(e) = event_store
                .emit_domain_event(
                    invitation_id.to_string(),
                    StreamType::Invitation,
                    catalog::invitation::REVOKED.to_string(),
                    json!({}),
                    metadata,
                )
                .await
            {
                return Some(BootstrapAction::CompensationFailed {
                    step: BootstrapStep::GeneratingInvitations,
                    error: e.to_string(),
                });
            }
        }

        Some(BootstrapAction::CompensationStepCompleted {
            step: BootstrapStep::GeneratingInvitations,
        })
    }))
}

fn remove_dns(state: &BootstrapState, env: &BootstrapEnvironment) -> Effect<BootstrapAction> {
    let Some(record) = state.dns_record.clone() else {
        return Effect::Future(Box::pin(async move {
            Some(BootstrapAction::CompensationStepCompleted {
                step: BootstrapStep::ConfiguringDns,
            })
        }));
    };

    let event_store = env.event_store.clone();
    let dns_provider = env.dns_provider.clone();
    #[allow(clippy::expect_used)] // remove_dns only dispatches once DNS was configured
    let organization_id = state.organization_id.expect("organization must exist");
    let correlation_id = state.correlation_id;
    let requested_by = state.request.requested_by;

    Effect::Future(Box::pin(async move {
        if let Err(e) = dns_provider.remove(&record).await {
            return Some(BootstrapAction::CompensationFailed {
                step: BootstrapStep::ConfiguringDns,
                error: e.to_string(),
            });
        }

        let metadata = EventMetadata::new(Some(requested_by))
            .with_correlation_id(correlation_id)
            .with_reason("bootstrap run failed, removing subdomain");
        if let Err(e) = event_store
            .emit_domain_event(
                organization_id.to_string(),
                StreamType::Organization,
                catalog::organization::DNS_REMOVED.to_string(),
                json!({}),
                metadata,
            )
            .await
        {
            return Some(BootstrapAction::CompensationFailed {
                step: BootstrapStep::ConfiguringDns,
                error: e.to_string(),
            });
        }

        Some(BootstrapAction::CompensationStepCompleted {
            step: BootstrapStep::ConfiguringDns,
        })
    }))
}

/// Undoes General Info, Billing and Provider Admin's contact groups: unlinks
/// every pairwise and org-junction touching a section's entities, then
/// deletes each distinct entity exactly once — a section shared from General
/// Info contributes no entities of its own here, since its ids already
/// appear in `general`.
fn delete_entities(state: &BootstrapState, env: &BootstrapEnvironment) -> Effect<BootstrapAction> {
    let event_store = env.event_store.clone();
    let correlation_id = state.correlation_id;
    let requested_by = state.request.requested_by;
    let organization_id = state.organization_id;

    let mut seen = std::collections::HashSet::new();
    let distinct_sections: Vec<super::SectionEntities> = [
        state.general_entities,
        state.billing_entities,
        state.provider_admin_entities,
    ]
    .into_iter()
    .flatten()
    .filter(|ids| seen.insert(ids.contact_id))
    .collect();

    Effect::Future(Box::pin(async move {
        for ids in distinct_sections {
            let metadata = || {
                EventMetadata::new(Some(requested_by))
                    .with_correlation_id(correlation_id)
                    .with_reason("bootstrap run failed, unwinding contact group")
            };

            // Every junction unlink must be recorded before the entity itself
            // is deleted (P12): a reader of the log should never see a
            // `*.deleted` entity still referenced by a live junction row.
            if let Some(organization_id) = organization_id {
                let org_junctions = [
                    (catalog::junction::ORG_CONTACT_UNLINKED, ids.contact_id),
                    (catalog::junction::ORG_ADDRESS_UNLINKED, ids.address_id),
                    (catalog::junction::ORG_PHONE_UNLINKED, ids.phone_id),
                ];
                for (event_type, right_id) in org_junctions {
                    if let Err(e) = event_store
                        .emit_domain_event(
                            format!("{organization_id}:{right_id}"),
                            StreamType::Junction,
                            event_type.to_string(),
                            json!({ "left_id": organization_id, "right_id": right_id }),
                            metadata(),
                        )
                        .await
                    {
                        return Some(BootstrapAction::CompensationFailed {
                            step: BootstrapStep::CreatingEntities,
                            error: e.to_string(),
                        });
                    }
                }
            }

            let pairwise_junctions = [
                (catalog::junction::CONTACT_ADDRESS_UNLINKED, ids.contact_id, ids.address_id),
                (catalog::junction::CONTACT_PHONE_UNLINKED, ids.contact_id, ids.phone_id),
                (catalog::junction::PHONE_ADDRESS_UNLINKED, ids.phone_id, ids.address_id),
            ];
            for (event_type, left_id, right_id) in pairwise_junctions {
                if let Err(e) = event_store
                    .emit_domain_event(
                        format!("{left_id}:{right_id}"),
                        StreamType::Junction,
                        event_type.to_string(),
                        json!({ "left_id": left_id, "right_id": right_id }),
                        metadata(),
                    )
                    .await
                {
                    return Some(BootstrapAction::CompensationFailed {
                        step: BootstrapStep::CreatingEntities,
                        error: e.to_string(),
                    });
                }
            }

            let entities: [(Uuid, StreamType, &'static str); 3] = [
                (ids.contact_id, StreamType::Contact, catalog::contact::DELETED),
                (ids.address_id, StreamType::Address, catalog::address::DELETED),
                (ids.phone_id, StreamType::Phone, catalog::phone::DELETED),
            ];
            for (id, stream_type, delete_event_type) in entities {
                if let Err(e) = event_store
                    .emit_domain_event(id.to_string(), stream_type, delete_event_type.to_string(), json!({}), metadata())
                    .await
                {
                    return Some(BootstrapAction::CompensationFailed {
                        step: BootstrapStep::CreatingEntities,
                        error: e.to_string(),
                    });
                }
            }
        }

        Some(BootstrapAction::CompensationStepCompleted {
            step: BootstrapStep::CreatingEntities,
        })
    }))
}

fn deactivate_organization(
    state: &BootstrapState,
    env: &BootstrapEnvironment,
) -> Effect<BootstrapAction> {
    // A failure in `create_organization` itself lands here too (compensation
    // always walks down to this step), with no organization ever created.
    let Some(organization_id) = state.organization_id else {
        return Effect::Future(Box::pin(async move {
            Some(BootstrapAction::CompensationStepCompleted {
                step: BootstrapStep::CreatingOrganization,
            })
        }));
    };

    let event_store = env.event_store.clone();
    let correlation_id = state.correlation_id;
    let requested_by = state.request.requested_by;

    Effect::Future(Box::pin(async move {
        let metadata = EventMetadata::new(Some(requested_by))
            .with_correlation_id(correlation_id)
            .with_reason("bootstrap run failed terminally, deactivating partially-created organization");

        let result = event_store
            .emit_domain_event(
                organization_id.to_string(),
                StreamType::Organization,
                catalog::organization::DEACTIVATED.to_string(),
                json!({}),
                metadata,
            )
            .await;

        Some(match result {
            Ok(_) => BootstrapAction::CompensationStepCompleted {
                step: BootstrapStep::CreatingOrganization,
            },
            Err(e) => BootstrapAction::CompensationFailed {
                step: BootstrapStep::CreatingOrganization,
                error: e.to_string(),
            },
        })
    }))
}
