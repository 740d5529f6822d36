//! Synchronous, in-transaction projection dispatch (`SPEC_FULL.md` §4.2).
//!
//! `composable_rust_core::projection` models projections as an async CQRS layer
//! reading from a *separate* store than the event log, rebuilt from a checkpoint
//! position. That doesn't fit here: `SPEC_FULL.md` requires projections to be
//! applied inside the same transaction as the event insert, so a crash can never
//! leave an event committed with its projection unapplied or vice versa (I1-I4).
//! So this module is its own design, grounded on `composable_rust_core::event_store`'s
//! dyn-compatible `Pin<Box<dyn Future>>` shape rather than on `core::projection`'s
//! `impl Future` trait.

pub mod access_grant;
pub mod entities;
pub mod impersonation;
pub mod invitation;
pub mod organization;
pub mod rbac;
pub mod schedule;
pub mod workflow_queue;

use std::future::Future;
use std::pin::Pin;

use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::error::ProjectionError;
use crate::event::{EventMetadata, EventType, StoredEvent};
use crate::stream::StreamType;

/// Every projection table, in an order `TRUNCATE ... CASCADE` can apply in one
/// statement regardless of foreign key direction (`RESTART IDENTITY CASCADE`
/// ignores ordering, but listing them keeps the statement self-documenting).
const PROJECTION_TABLES: &[&str] = &[
    "organization_contacts",
    "organization_addresses",
    "organization_phones",
    "contact_addresses",
    "contact_phones",
    "phone_addresses",
    "user_role_assignments",
    "schedule_user_assignments",
    "impersonation_sessions",
    "access_grants",
    "schedules",
    "invitations",
    "workflow_queue",
    "permissions",
    "roles",
    "users",
    "contacts",
    "addresses",
    "phones",
    "organizations",
];

/// One family's projection handler, dispatched by `stream_type`.
///
/// Implementations run entirely inside the caller's transaction: a handler
/// that needs to touch more than one table does so with plain `sqlx::query`
/// calls against the same `&mut Transaction`, no nested commits.
pub trait StreamProjection: Send + Sync {
    /// The stream type this handler owns. The router panics at startup (via
    /// [`ProjectionRouter::new`]'s duplicate check) if two handlers claim the
    /// same stream type, since that would make dispatch ambiguous.
    fn stream_type(&self) -> StreamType;

    /// Apply one event to the read-model tables for this family.
    ///
    /// # Errors
    ///
    /// [`ProjectionError::UnhandledEventType`] if `event.event_type` isn't one
    /// this handler recognizes (no wildcard fallthrough, per §4.2: an unmatched
    /// event type is a bug, not a no-op), [`ProjectionError::MalformedPayload`]
    /// if `event.event_data` doesn't match the expected shape,
    /// [`ProjectionError::InvariantViolated`] if applying the event would break
    /// a read-model invariant, [`ProjectionError::Database`] on query failure.
    fn apply<'a>(
        &'a self,
        tx: &'a mut Transaction<'_, Postgres>,
        event: &'a StoredEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + 'a>>;
}

/// Dispatches a [`StoredEvent`] to the one [`StreamProjection`] registered for
/// its `stream_type`.
pub struct ProjectionRouter {
    handlers: Vec<Box<dyn StreamProjection>>,
}

impl ProjectionRouter {
    /// Build the router with every family handler wired in.
    ///
    /// # Panics
    ///
    /// Panics if two handlers claim the same [`StreamType`] — an ambiguous
    /// router is a programming error, not a runtime condition to recover from.
    #[must_use]
    pub fn new() -> Self {
        let handlers: Vec<Box<dyn StreamProjection>> = vec![
            Box::new(organization::OrganizationProjection),
            Box::new(entities::ContactProjection),
            Box::new(entities::AddressProjection),
            Box::new(entities::PhoneProjection),
            Box::new(entities::JunctionProjection),
            Box::new(invitation::InvitationProjection),
            Box::new(rbac::UserProjection),
            Box::new(rbac::RoleProjection),
            Box::new(rbac::PermissionProjection),
            Box::new(access_grant::AccessGrantProjection),
            Box::new(schedule::ScheduleProjection),
            Box::new(workflow_queue::WorkflowQueueProjection),
            Box::new(impersonation::ImpersonationProjection),
        ];

        let mut seen = std::collections::HashSet::new();
        for h in &handlers {
            assert!(
                seen.insert(h.stream_type()),
                "duplicate projection handler registered for stream type {:?}",
                h.stream_type()
            );
        }

        Self { handlers }
    }

    /// Apply `event` using the handler registered for `event.stream_type`.
    ///
    /// # Errors
    ///
    /// [`ProjectionError::UnhandledEventType`] if no handler is registered for
    /// the stream type at all (distinct from a registered handler rejecting an
    /// unrecognized event type within its own family), plus whatever the
    /// matched handler itself returns.
    pub async fn dispatch(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &StoredEvent,
    ) -> Result<(), ProjectionError> {
        let handler = self
            .handlers
            .iter()
            .find(|h| h.stream_type() == event.stream_type)
            .ok_or_else(|| ProjectionError::UnhandledEventType {
                stream_type: event.stream_type,
                event_type: event.event_type.as_str().to_string(),
            })?;

        handler.apply(tx, event).await
    }

    /// Rebuild every projection table from scratch by truncating them all and
    /// replaying the entire event log in `sequence_number` order (`SPEC_FULL.md`
    /// §4.2). Runs as one transaction: a crash partway through leaves the old
    /// (truncated-but-not-yet-replayed) state rolled back rather than half-rebuilt.
    ///
    /// # Errors
    ///
    /// [`ProjectionError::Database`] on truncation or event-log read failure,
    /// plus whatever `dispatch` returns while replaying.
    pub async fn rebuild_all(&self, pool: &PgPool) -> Result<(), ProjectionError> {
        let mut tx = pool.begin().await.map_err(ProjectionError::Database)?;

        let truncate_sql = format!(
            "TRUNCATE TABLE {} RESTART IDENTITY CASCADE",
            PROJECTION_TABLES.join(", ")
        );
        sqlx::query(&truncate_sql)
            .execute(&mut *tx)
            .await
            .map_err(ProjectionError::Database)?;

        let rows = sqlx::query(
            "SELECT id, sequence_number, stream_id, stream_type, stream_version, event_type,
                    event_data, event_metadata, created_at, processed_at, processing_error, retry_count
             FROM events ORDER BY sequence_number ASC",
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(ProjectionError::Database)?;

        for row in rows {
            let event = row_to_stored_event(row)?;
            self.dispatch(&mut tx, &event).await?;
        }

        tx.commit().await.map_err(ProjectionError::Database)?;
        Ok(())
    }
}

fn row_to_stored_event(row: sqlx::postgres::PgRow) -> Result<StoredEvent, ProjectionError> {
    let stream_type_str: String = row.try_get("stream_type").map_err(ProjectionError::Database)?;
    let stream_type = StreamType::parse(&stream_type_str).map_err(|_| {
        ProjectionError::Database(sqlx::Error::Decode(
            format!("unknown stream_type {stream_type_str:?} in events table").into(),
        ))
    })?;

    let event_type_str: String = row.try_get("event_type").map_err(ProjectionError::Database)?;
    let event_type = EventType::new(event_type_str).map_err(|e| {
        ProjectionError::Database(sqlx::Error::Decode(e.to_string().into()))
    })?;

    let metadata_json: serde_json::Value =
        row.try_get("event_metadata").map_err(ProjectionError::Database)?;
    let event_metadata: EventMetadata = serde_json::from_value(metadata_json)
        .map_err(|e| ProjectionError::Database(sqlx::Error::Decode(e.to_string().into())))?;

    Ok(StoredEvent {
        id: row.try_get("id").map_err(ProjectionError::Database)?,
        sequence_number: row.try_get("sequence_number").map_err(ProjectionError::Database)?,
        stream_id: row.try_get("stream_id").map_err(ProjectionError::Database)?,
        stream_type,
        stream_version: row.try_get("stream_version").map_err(ProjectionError::Database)?,
        event_type,
        event_data: row.try_get("event_data").map_err(ProjectionError::Database)?,
        event_metadata,
        created_at: row.try_get("created_at").map_err(ProjectionError::Database)?,
        processed_at: row.try_get("processed_at").map_err(ProjectionError::Database)?,
        processing_error: row.try_get("processing_error").map_err(ProjectionError::Database)?,
        retry_count: row.try_get("retry_count").map_err(ProjectionError::Database)?,
    })
}

impl Default for ProjectionRouter {
    fn default() -> Self {
        Self::new()
    }
}
