//! Job queue read-model projection, backing the `workflow_queue` table that
//! workers poll (`SPEC_FULL.md` §4.3).
//!
//! The authoritative claim itself is an atomic conditional `UPDATE` issued
//! directly by [`crate::queue`] against this same table, not replayed from
//! events — this projection only keeps the table consistent with the event
//! log for audit and dashboard purposes (P11).

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use sqlx::{Postgres, Transaction};

use crate::catalog::workflow_queue as events;
use crate::error::ProjectionError;
use crate::event::StoredEvent;
use crate::stream::StreamType;

use super::StreamProjection;

/// Handles `workflow_queue.*` events.
pub struct WorkflowQueueProjection;

#[derive(Deserialize)]
struct Enqueued {
    workflow_id: String,
    organization_slug: String,
    payload: serde_json::Value,
}

#[derive(Deserialize)]
struct Claimed {
    worker_id: String,
}

#[derive(Deserialize)]
struct Failed {
    reason: String,
}

fn malformed(event_type: &str, err: serde_json::Error) -> ProjectionError {
    ProjectionError::MalformedPayload {
        event_type: event_type.to_string(),
        reason: err.to_string(),
    }
}

impl StreamProjection for WorkflowQueueProjection {
    fn stream_type(&self) -> StreamType {
        StreamType::WorkflowQueue
    }

    fn apply<'a>(
        &'a self,
        tx: &'a mut Transaction<'_, Postgres>,
        event: &'a StoredEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + 'a>> {
        Box::pin(async move {
            let event_type = event.event_type.as_str();
            match event_type {
                t if t == events::ENQUEUED => {
                    let p: Enqueued = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "INSERT INTO workflow_queue
                            (id, workflow_id, organization_slug, status, payload, attempt_count, created_at, updated_at)
                         VALUES ($1, $2, $3, 'pending', $4, 0, $5, $5)
                         ON CONFLICT (workflow_id) DO NOTHING",
                    )
                    .bind(&event.stream_id)
                    .bind(p.workflow_id)
                    .bind(p.organization_slug)
                    .bind(p.payload)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::CLAIMED => {
                    let p: Claimed = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "UPDATE workflow_queue SET status = 'processing', claimed_by = $2,
                            claimed_at = $3, attempt_count = attempt_count + 1, updated_at = $3
                         WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(p.worker_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::RELEASED => {
                    sqlx::query(
                        "UPDATE workflow_queue SET status = 'pending', claimed_by = NULL,
                            claimed_at = NULL, updated_at = $2
                         WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::COMPLETED => {
                    sqlx::query(
                        "UPDATE workflow_queue SET status = 'completed', updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::FAILED => {
                    let p: Failed = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "UPDATE workflow_queue SET status = 'failed', last_error = $2, updated_at = $3 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(p.reason)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::CANCELLED => {
                    sqlx::query(
                        "UPDATE workflow_queue SET status = 'cancelled', updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                other => {
                    return Err(ProjectionError::UnhandledEventType {
                        stream_type: StreamType::WorkflowQueue,
                        event_type: other.to_string(),
                    });
                }
            }
            Ok(())
        })
    }
}
