//! Invitation read-model projection.

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use sqlx::{Postgres, Transaction};

use crate::catalog::invitation as events;
use crate::error::ProjectionError;
use crate::event::StoredEvent;
use crate::stream::StreamType;

use super::StreamProjection;

/// Handles `invitation.*` events.
pub struct InvitationProjection;

#[derive(Deserialize)]
struct Created {
    organization_id: uuid::Uuid,
    email: String,
    role_name: String,
    token: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

fn malformed(event_type: &str, err: serde_json::Error) -> ProjectionError {
    ProjectionError::MalformedPayload {
        event_type: event_type.to_string(),
        reason: err.to_string(),
    }
}

impl StreamProjection for InvitationProjection {
    fn stream_type(&self) -> StreamType {
        StreamType::Invitation
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
                        "INSERT INTO invitations
                            (id, organization_id, email, role_name, token, status, expires_at, created_at, updated_at)
                         VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, $7)",
                    )
                    .bind(&event.stream_id)
                    .bind(p.organization_id)
                    .bind(p.email)
                    .bind(p.role_name)
                    .bind(p.token)
                    .bind(p.expires_at)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::EMAIL_SENT => {
                    sqlx::query(
                        "UPDATE invitations SET email_sent_at = $2, updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::EMAIL_FAILED => {
                    sqlx::query(
                        "UPDATE invitations SET status = 'email_failed', updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::REVOKED => {
                    sqlx::query(
                        "UPDATE invitations SET status = 'revoked', revoked_at = $2, updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::ACCEPTED => {
                    sqlx::query(
                        "UPDATE invitations SET status = 'accepted', accepted_at = $2, updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                other => {
                    return Err(ProjectionError::UnhandledEventType {
                        stream_type: StreamType::Invitation,
                        event_type: other.to_string(),
                    });
                }
            }
            Ok(())
        })
    }
}
