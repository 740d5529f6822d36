//! The RPC surface, realized as an Axum HTTP API (`SPEC_FULL.md` §6.1).
//!
//! Handlers are thin: extract `Claims`, check authorization, call either
//! `EventStore::emit_domain_event` directly or `JobQueue::enqueue` for the
//! bootstrap run itself, and serialize `{success, entity_id, event_id}`.
//! Handlers never call external providers — those only run inside saga
//! activities (`crate::saga::activities`), per the functional-core/imperative-
//! shell split `composable_rust_web` documents.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    routing::{get, post},
    Json, Router,
};
use composable_rust_web::AppError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::catalog;
use crate::event::EventMetadata;
use crate::identity::Claims;
use crate::queue::{derive_workflow_id, JobQueue, QueueRow};
use crate::saga::{AdminInvite, ContactGroup, ContactGroupSection, OrganizationType, PartnerType};
use crate::store::EventStore;
use crate::stream::StreamType;

/// Shared state for every bootstrap HTTP handler.
#[derive(Clone)]
pub struct AppState {
    /// The event store every write RPC funnels through.
    pub event_store: Arc<dyn EventStore>,
    /// The job queue the bootstrap-run endpoint enqueues onto.
    pub queue: Arc<JobQueue>,
}

impl AppState {
    /// Build a new application state.
    #[must_use]
    pub const fn new(event_store: Arc<dyn EventStore>, queue: Arc<JobQueue>) -> Self {
        Self { event_store, queue }
    }
}

/// The envelope every write RPC returns (§6.1).
#[derive(Debug, Clone, Serialize)]
pub struct WriteResponse {
    /// Always `true`; failures are reported as HTTP errors instead.
    pub success: bool,
    /// The id of the entity the RPC created or acted on.
    pub entity_id: Uuid,
    /// The id of the event this RPC emitted.
    pub event_id: Uuid,
}

impl WriteResponse {
    const fn new(entity_id: Uuid, event_id: Uuid) -> Self {
        Self {
            success: true,
            entity_id,
            event_id,
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Claims
where
    S: Send + Sync,
{
    type Rejection = AppError;

    /// Decode claims from the `X-Bootstrap-Claims` header, a JSON blob placed
    /// there by the reverse proxy after it has already verified the caller's
    /// bearer token — this crate only trusts an already-verified identity
    /// (§6.4's "opaque identity oracle" framing), it never checks a signature.
    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("X-Bootstrap-Claims")
            .ok_or_else(|| AppError::unauthorized("missing identity claims"))?
            .to_str()
            .map_err(|_| AppError::unauthorized("identity claims header is not valid UTF-8"))?;

        serde_json::from_str(raw)
            .map_err(|e| AppError::unauthorized(format!("malformed identity claims: {e}")))
    }
}

/// Build the bootstrap HTTP router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/organizations/bootstrap", post(start_bootstrap))
        .route("/organizations/bootstrap/:workflow_id", get(get_bootstrap_status))
        .route("/contacts", post(create_contact))
        .route("/schedules", post(create_schedule_template))
        .route("/schedules/:id/deactivate", post(deactivate_schedule_template))
        .route("/events/processing-stats", get(get_event_processing_stats))
        .with_state(state)
}

/// `POST /organizations/bootstrap` — enqueue a new organization bootstrap run.
///
/// Mirrors `crate::saga::BootstrapRequest` field-for-field (minus
/// `requested_by`, which this handler fills in from the caller's claims
/// rather than trusting the request body) since the queue payload this
/// builds is deserialized straight into that type by the worker.
#[derive(Debug, Clone, Deserialize)]
pub struct StartBootstrapRequest {
    /// Display name for the organization.
    pub organization_name: String,
    /// URL-safe slug, also the basis for the derived workflow id.
    pub slug: String,
    /// Desired subdomain. Only consulted when `org_type`/`partner_type`
    /// require one (§4.4's subdomain rule); ignored otherwise.
    pub subdomain: Option<String>,
    /// The organization's kind.
    pub org_type: OrganizationType,
    /// Required when `org_type` is `provider_partner`.
    pub partner_type: Option<PartnerType>,
    /// The General Info contact group.
    pub general: ContactGroup,
    /// The Billing contact group, or a share of General Info's.
    pub billing: ContactGroupSection,
    /// The Provider Admin contact group, or a share of General Info's.
    pub provider_admin: ContactGroupSection,
    /// Admin invitees and the role each invitation should carry.
    pub admin_invites: Vec<AdminInvite>,
}

/// Response for a freshly enqueued (or already-existing) bootstrap run.
#[derive(Debug, Clone, Serialize)]
pub struct StartBootstrapResponse {
    /// The derived, stable workflow id for this organization slug.
    pub workflow_id: String,
    /// Current queue position.
    pub status: &'static str,
}

async fn start_bootstrap(
    State(state): State<AppState>,
    claims: Claims,
    Json(request): Json<StartBootstrapRequest>,
) -> Result<(StatusCode, Json<StartBootstrapResponse>), AppError> {
    if !claims.has_platform_privilege() {
        return Err(AppError::forbidden(
            "only platform super-admins may bootstrap a new organization",
        ));
    }

    let payload = json!({
        "organization_name": request.organization_name,
        "slug": request.slug,
        "subdomain": request.subdomain,
        "org_type": request.org_type,
        "partner_type": request.partner_type,
        "general": request.general,
        "billing": request.billing,
        "provider_admin": request.provider_admin,
        "admin_invites": request.admin_invites,
        "requested_by": claims.user_id,
    });

    let row = state
        .queue
        .enqueue(&request.slug, payload)
        .await
        .map_err(|e| AppError::internal(format!("failed to enqueue bootstrap run: {e}")))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StartBootstrapResponse {
            workflow_id: row.workflow_id,
            status: row.status.as_str(),
        }),
    ))
}

/// Response describing one bootstrap run's queue status.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapStatusResponse {
    /// The queue row id.
    pub id: Uuid,
    /// The derived workflow id.
    pub workflow_id: String,
    /// Current queue position.
    pub status: &'static str,
    /// How many times a worker has claimed this row.
    pub attempt_count: i32,
}

impl From<QueueRow> for BootstrapStatusResponse {
    fn from(row: QueueRow) -> Self {
        Self {
            id: row.id,
            workflow_id: row.workflow_id,
            status: row.status.as_str(),
            attempt_count: row.attempt_count,
        }
    }
}

async fn get_bootstrap_status(
    State(state): State<AppState>,
    claims: Claims,
    Path(workflow_id): Path<String>,
) -> Result<Json<BootstrapStatusResponse>, AppError> {
    if !claims.has_platform_privilege() {
        return Err(AppError::forbidden(
            "only platform super-admins may inspect bootstrap runs",
        ));
    }

    state
        .queue
        .find_by_workflow_id(&workflow_id)
        .await
        .map_err(|e| AppError::internal(format!("failed to look up bootstrap run: {e}")))?
        .map(|r| Json(r.into()))
        .ok_or_else(|| AppError::not_found("bootstrap run", &workflow_id))
}

/// `POST /contacts` — create a standalone contact not tied to any bootstrap run.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateContactRequest {
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Email address.
    pub email: String,
}

async fn create_contact(
    State(state): State<AppState>,
    claims: Claims,
    Json(request): Json<CreateContactRequest>,
) -> Result<(StatusCode, Json<WriteResponse>), AppError> {
    if !claims.has_org_admin_permission(claims.organization_id) {
        return Err(AppError::forbidden(
            "organization.admin permission required to create a contact",
        ));
    }

    let contact_id = Uuid::new_v4();
    let metadata = EventMetadata::new(Some(claims.user_id));

    let event_id = state
        .event_store
        .emit_domain_event(
            contact_id.to_string(),
            StreamType::Contact,
            catalog::contact::CREATED.to_string(),
            json!({
                "first_name": request.first_name,
                "last_name": request.last_name,
                "email": request.email,
            }),
            metadata,
        )
        .await
        .map_err(|e| AppError::internal(format!("failed to create contact: {e}")))?;

    Ok((
        StatusCode::CREATED,
        Json(WriteResponse::new(contact_id, event_id)),
    ))
}

/// `POST /schedules` — create a schedule template.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateScheduleTemplateRequest {
    /// Display name for the template.
    pub name: String,
    /// Arbitrary structured schedule rules (hours, recurrence, etc.).
    pub rules: serde_json::Value,
}

async fn create_schedule_template(
    State(state): State<AppState>,
    claims: Claims,
    Json(request): Json<CreateScheduleTemplateRequest>,
) -> Result<(StatusCode, Json<WriteResponse>), AppError> {
    if !claims.has_permission_at_scope("schedule.create", claims.organization_id) {
        return Err(AppError::forbidden(
            "schedule.create permission required at this organization",
        ));
    }

    let schedule_id = Uuid::new_v4();
    let metadata = EventMetadata::new(Some(claims.user_id));

    let event_id = state
        .event_store
        .emit_domain_event(
            schedule_id.to_string(),
            StreamType::Schedule,
            catalog::schedule::CREATED.to_string(),
            json!({
                "organization_id": claims.organization_id,
                "name": request.name,
                "rules": request.rules,
            }),
            metadata,
        )
        .await
        .map_err(|e| AppError::internal(format!("failed to create schedule template: {e}")))?;

    Ok((
        StatusCode::CREATED,
        Json(WriteResponse::new(schedule_id, event_id)),
    ))
}

async fn deactivate_schedule_template(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<Uuid>,
) -> Result<Json<WriteResponse>, AppError> {
    if !claims.has_permission_at_scope("schedule.deactivate", claims.organization_id) {
        return Err(AppError::forbidden(
            "schedule.deactivate permission required at this organization",
        ));
    }

    let metadata = EventMetadata::new(Some(claims.user_id))
        .with_reason("deactivated through the schedule management API");

    let event_id = state
        .event_store
        .emit_domain_event(
            id.to_string(),
            StreamType::Schedule,
            catalog::schedule::DEACTIVATED.to_string(),
            json!({}),
            metadata,
        )
        .await
        .map_err(|e| AppError::internal(format!("failed to deactivate schedule template: {e}")))?;

    Ok(Json(WriteResponse::new(id, event_id)))
}

/// `GET /events/processing-stats` — operator dashboard summary, platform-admin only.
async fn get_event_processing_stats(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<crate::store::EventProcessingStats>, AppError> {
    if !claims.has_platform_privilege() {
        return Err(AppError::forbidden(
            "only platform super-admins may view processing stats",
        ));
    }

    let stats = state
        .event_store
        .get_event_processing_stats()
        .await
        .map_err(|e| AppError::internal(format!("failed to load processing stats: {e}")))?;

    Ok(Json(stats))
}

/// Derive the workflow id a bootstrap request for `slug` would use, for
/// callers that want to poll status before the row necessarily exists.
#[must_use]
pub fn workflow_id_for_slug(slug: &str) -> String {
    derive_workflow_id(slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_id_for_slug_matches_queue_derivation() {
        assert_eq!(
            workflow_id_for_slug("acme-health"),
            derive_workflow_id("acme-health")
        );
    }
}
