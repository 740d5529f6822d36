//! Impersonation session read-model projection.

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use sqlx::{Postgres, Transaction};

use crate::catalog::impersonation as events;
use crate::error::ProjectionError;
use crate::event::StoredEvent;
use crate::stream::StreamType;

use super::StreamProjection;

/// Handles `impersonation.*` events.
pub struct ImpersonationProjection;

#[derive(Deserialize)]
struct Started {
    impersonator_user_id: uuid::Uuid,
    target_user_id: uuid::Uuid,
    organization_id: uuid::Uuid,
    reason: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Deserialize)]
struct Renewed {
    expires_at: chrono::DateTime<chrono::Utc>,
}

fn malformed(event_type: &str, err: serde_json::Error) -> ProjectionError {
    ProjectionError::MalformedPayload {
        event_type: event_type.to_string(),
        reason: err.to_string(),
    }
}

impl StreamProjection for ImpersonationProjection {
    fn stream_type(&self) -> StreamType {
        StreamType::Impersonation
    }

    fn apply<'a>(
        &'a self,
        tx: &'a mut Transaction<'_, Postgres>,
        event: &'a StoredEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + 'a>> {
        Box::pin(async move {
            let event_type = event.event_type.as_str();
            match event_type {
                t if t == events::STARTED => {
                    let p: Started = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "INSERT INTO impersonation_sessions
                            (id, impersonator_user_id, target_user_id, organization_id, reason, expires_at, created_at, updated_at)
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $7)",
                    )
                    .bind(&event.stream_id)
                    .bind(p.impersonator_user_id)
                    .bind(p.target_user_id)
                    .bind(p.organization_id)
                    .bind(p.reason)
                    .bind(p.expires_at)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::RENEWED => {
                    let p: Renewed = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "UPDATE impersonation_sessions SET expires_at = $2, updated_at = $3 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(p.expires_at)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::ENDED => {
                    sqlx::query(
                        "UPDATE impersonation_sessions SET ended_at = $2, updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                other => {
                    return Err(ProjectionError::UnhandledEventType {
                        stream_type: StreamType::Impersonation,
                        event_type: other.to_string(),
                    });
                }
            }
            Ok(())
        })
    }
}
