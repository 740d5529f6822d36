//! Organization read-model projection.

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use sqlx::{Postgres, Transaction};

use crate::catalog::organization as events;
use crate::error::ProjectionError;
use crate::event::StoredEvent;
use crate::stream::StreamType;

use super::StreamProjection;

/// Handles `organization.*` events against the `organizations` table.
pub struct OrganizationProjection;

#[derive(Deserialize)]
struct Created {
    name: String,
    slug: String,
    subdomain: Option<String>,
    #[serde(rename = "type")]
    org_type: String,
    partner_type: Option<String>,
    hierarchy_path: String,
}

#[derive(Deserialize)]
struct DnsConfigured {
    provider_record_id: String,
}

fn malformed(event_type: &str, err: serde_json::Error) -> ProjectionError {
    ProjectionError::MalformedPayload {
        event_type: event_type.to_string(),
        reason: err.to_string(),
    }
}

impl StreamProjection for OrganizationProjection {
    fn stream_type(&self) -> StreamType {
        StreamType::Organization
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
                    let payload: Created = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "INSERT INTO organizations
                            (id, name, slug, subdomain, type, partner_type, hierarchy_path, status, created_at, updated_at)
                         VALUES ($1, $2, $3, $4, $5, $6, $7, 'bootstrapping', $8, $8)",
                    )
                    .bind(&event.stream_id)
                    .bind(payload.name)
                    .bind(payload.slug)
                    .bind(payload.subdomain)
                    .bind(payload.org_type)
                    .bind(payload.partner_type)
                    .bind(payload.hierarchy_path)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::BOOTSTRAP_INITIATED => {
                    sqlx::query(
                        "UPDATE organizations SET status = 'bootstrapping', updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::DNS_CONFIGURED => {
                    let payload: DnsConfigured = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "UPDATE organizations SET dns_record_id = $2, updated_at = $3 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(payload.provider_record_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::DNS_VERIFIED => {
                    sqlx::query(
                        "UPDATE organizations SET dns_verified_at = $2, updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::DNS_FAILED => {
                    sqlx::query(
                        "UPDATE organizations SET status = 'bootstrap_failed', updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::DNS_REMOVED => {
                    sqlx::query(
                        "UPDATE organizations SET dns_record_id = NULL, dns_verified_at = NULL, updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::BOOTSTRAP_COMPLETED => {
                    sqlx::query(
                        "UPDATE organizations SET status = 'active', updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::ACTIVATED => {
                    sqlx::query(
                        "UPDATE organizations SET status = 'active', deactivated_at = NULL, updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::DEACTIVATED => {
                    sqlx::query(
                        "UPDATE organizations SET status = 'deactivated', deactivated_at = $2, updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::DELETED => {
                    sqlx::query(
                        "UPDATE organizations SET status = 'deleted', deleted_at = $2, updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                other => {
                    return Err(ProjectionError::UnhandledEventType {
                        stream_type: StreamType::Organization,
                        event_type: other.to_string(),
                    });
                }
            }
            Ok(())
        })
    }
}
