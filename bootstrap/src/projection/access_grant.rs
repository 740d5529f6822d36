//! Cross-tenant access grant read-model projection.

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use sqlx::{Postgres, Transaction};

use crate::catalog::access_grant as events;
use crate::error::ProjectionError;
use crate::event::StoredEvent;
use crate::stream::StreamType;

use super::StreamProjection;

/// Handles `access_grant.*` events.
pub struct AccessGrantProjection;

#[derive(Deserialize)]
struct Created {
    grantor_organization_id: uuid::Uuid,
    grantee_user_id: uuid::Uuid,
    scope: String,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn malformed(event_type: &str, err: serde_json::Error) -> ProjectionError {
    ProjectionError::MalformedPayload {
        event_type: event_type.to_string(),
        reason: err.to_string(),
    }
}

impl StreamProjection for AccessGrantProjection {
    fn stream_type(&self) -> StreamType {
        StreamType::AccessGrant
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
                        "INSERT INTO access_grants
                            (id, grantor_organization_id, grantee_user_id, scope, status, expires_at, created_at, updated_at)
                         VALUES ($1, $2, $3, $4, 'active', $5, $6, $6)",
                    )
                    .bind(&event.stream_id)
                    .bind(p.grantor_organization_id)
                    .bind(p.grantee_user_id)
                    .bind(p.scope)
                    .bind(p.expires_at)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::REVOKED => {
                    sqlx::query(
                        "UPDATE access_grants SET status = 'revoked', updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::EXPIRED => {
                    sqlx::query(
                        "UPDATE access_grants SET status = 'expired', updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::SUSPENDED => {
                    sqlx::query(
                        "UPDATE access_grants SET status = 'suspended', updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::REACTIVATED => {
                    sqlx::query(
                        "UPDATE access_grants SET status = 'active', updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                other => {
                    return Err(ProjectionError::UnhandledEventType {
                        stream_type: StreamType::AccessGrant,
                        event_type: other.to_string(),
                    });
                }
            }
            Ok(())
        })
    }
}
