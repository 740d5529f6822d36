//! Schedule template read-model projection.

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use sqlx::{Postgres, Transaction};

use crate::catalog::schedule as events;
use crate::error::ProjectionError;
use crate::event::StoredEvent;
use crate::stream::StreamType;

use super::StreamProjection;

/// Handles `schedule.*` events, including user assignment against
/// `schedule_user_assignments`.
pub struct ScheduleProjection;

#[derive(Deserialize)]
struct Created {
    organization_id: uuid::Uuid,
    name: String,
}

#[derive(Deserialize)]
struct Updated {
    name: String,
}

#[derive(Deserialize)]
struct UserAssignment {
    user_id: uuid::Uuid,
}

fn malformed(event_type: &str, err: serde_json::Error) -> ProjectionError {
    ProjectionError::MalformedPayload {
        event_type: event_type.to_string(),
        reason: err.to_string(),
    }
}

impl StreamProjection for ScheduleProjection {
    fn stream_type(&self) -> StreamType {
        StreamType::Schedule
    }

    fn apply<'a>(
        &'a self,
        tx: &'a mut Transaction<'_, Postgres>,
        event: &'a StoredEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + 'a>> {
        Box::pin(async move {
            let event_type = event.event_type.as_str();
            match event_type {
                t if t == events::CREATED => {
                    let p: Created = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "INSERT INTO schedules (id, organization_id, name, status, created_at, updated_at)
                         VALUES ($1, $2, $3, 'active', $4, $4)",
                    )
                    .bind(&event.stream_id)
                    .bind(p.organization_id)
                    .bind(p.name)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::UPDATED => {
                    let p: Updated = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query("UPDATE schedules SET name = $2, updated_at = $3 WHERE id = $1")
                        .bind(&event.stream_id)
                        .bind(p.name)
                        .bind(event.created_at)
                        .execute(&mut **tx)
                        .await
                        .map_err(ProjectionError::Database)?;
                }
                t if t == events::DEACTIVATED => {
                    sqlx::query(
                        "UPDATE schedules SET status = 'inactive', updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::REACTIVATED => {
                    sqlx::query(
                        "UPDATE schedules SET status = 'active', updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::DELETED => {
                    sqlx::query("UPDATE schedules SET status = 'deleted', updated_at = $2 WHERE id = $1")
                        .bind(&event.stream_id)
                        .bind(event.created_at)
                        .execute(&mut **tx)
                        .await
                        .map_err(ProjectionError::Database)?;
                }
                t if t == events::USER_ASSIGNED => {
                    let p: UserAssignment = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "INSERT INTO schedule_user_assignments (schedule_id, user_id, created_at)
                         VALUES ($1, $2, $3)
                         ON CONFLICT DO NOTHING",
                    )
                    .bind(&event.stream_id)
                    .bind(p.user_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::USER_UNASSIGNED => {
                    let p: UserAssignment = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "DELETE FROM schedule_user_assignments WHERE schedule_id = $1 AND user_id = $2",
                    )
                    .bind(&event.stream_id)
                    .bind(p.user_id)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                other => {
                    return Err(ProjectionError::UnhandledEventType {
                        stream_type: StreamType::Schedule,
                        event_type: other.to_string(),
                    });
                }
            }
            Ok(())
        })
    }
}
