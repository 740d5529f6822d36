//! User, role and permission read-model projections.

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use sqlx::{Postgres, Transaction};

use crate::catalog::{rbac as role_events, user as events};
use crate::error::ProjectionError;
use crate::event::StoredEvent;
use crate::stream::StreamType;

use super::StreamProjection;

fn malformed(event_type: &str, err: serde_json::Error) -> ProjectionError {
    ProjectionError::MalformedPayload {
        event_type: event_type.to_string(),
        reason: err.to_string(),
    }
}

/// Handles `user.*` events, including role assignment/removal against the
/// junction table `user_role_assignments`.
pub struct UserProjection;

#[derive(Deserialize)]
struct UserCreated {
    organization_id: uuid::Uuid,
    email: String,
    display_name: String,
}

#[derive(Deserialize)]
struct RoleAssignment {
    role_id: uuid::Uuid,
    organization_id: uuid::Uuid,
}

#[derive(Deserialize)]
struct OrgSwitch {
    organization_id: uuid::Uuid,
}

impl StreamProjection for UserProjection {
    fn stream_type(&self) -> StreamType {
        StreamType::User
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
                    let p: UserCreated = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "INSERT INTO users (id, organization_id, email, display_name, status, created_at, updated_at)
                         VALUES ($1, $2, $3, $4, 'active', $5, $5)",
                    )
                    .bind(&event.stream_id)
                    .bind(p.organization_id)
                    .bind(p.email)
                    .bind(p.display_name)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::SYNCED_FROM_AUTH => {
                    sqlx::query("UPDATE users SET updated_at = $2 WHERE id = $1")
                        .bind(&event.stream_id)
                        .bind(event.created_at)
                        .execute(&mut **tx)
                        .await
                        .map_err(ProjectionError::Database)?;
                }
                t if t == events::DEACTIVATED => {
                    sqlx::query(
                        "UPDATE users SET status = 'deactivated', deactivated_at = $2, updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::REACTIVATED => {
                    sqlx::query(
                        "UPDATE users SET status = 'active', deactivated_at = NULL, updated_at = $2 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::ORGANIZATION_SWITCHED => {
                    let p: OrgSwitch = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "UPDATE users SET active_organization_id = $2, updated_at = $3 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(p.organization_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::ROLE_ASSIGNED => {
                    let p: RoleAssignment = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "INSERT INTO user_role_assignments (user_id, role_id, organization_id, created_at)
                         VALUES ($1, $2, $3, $4)
                         ON CONFLICT DO NOTHING",
                    )
                    .bind(&event.stream_id)
                    .bind(p.role_id)
                    .bind(p.organization_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == events::ROLE_REMOVED || t == events::ROLE_REVOKED => {
                    let p: RoleAssignment = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "DELETE FROM user_role_assignments
                         WHERE user_id = $1 AND role_id = $2 AND organization_id = $3",
                    )
                    .bind(&event.stream_id)
                    .bind(p.role_id)
                    .bind(p.organization_id)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                other => {
                    return Err(ProjectionError::UnhandledEventType {
                        stream_type: StreamType::User,
                        event_type: other.to_string(),
                    });
                }
            }
            Ok(())
        })
    }
}

/// Handles `role.*` events.
pub struct RoleProjection;

#[derive(Deserialize)]
struct RoleFields {
    organization_id: uuid::Uuid,
    name: String,
}

impl StreamProjection for RoleProjection {
    fn stream_type(&self) -> StreamType {
        StreamType::Role
    }

    fn apply<'a>(
        &'a self,
        tx: &'a mut Transaction<'_, Postgres>,
        event: &'a StoredEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + 'a>> {
        Box::pin(async move {
            let event_type = event.event_type.as_str();
            match event_type {
                t if t == role_events::ROLE_CREATED => {
                    let p: RoleFields = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "INSERT INTO roles (id, organization_id, name, created_at, updated_at)
                         VALUES ($1, $2, $3, $4, $4)",
                    )
                    .bind(&event.stream_id)
                    .bind(p.organization_id)
                    .bind(p.name)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == role_events::ROLE_UPDATED => {
                    let p: RoleFields = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query("UPDATE roles SET name = $2, updated_at = $3 WHERE id = $1")
                        .bind(&event.stream_id)
                        .bind(p.name)
                        .bind(event.created_at)
                        .execute(&mut **tx)
                        .await
                        .map_err(ProjectionError::Database)?;
                }
                t if t == role_events::ROLE_DELETED => {
                    sqlx::query("DELETE FROM roles WHERE id = $1")
                        .bind(&event.stream_id)
                        .execute(&mut **tx)
                        .await
                        .map_err(ProjectionError::Database)?;
                }
                other => {
                    return Err(ProjectionError::UnhandledEventType {
                        stream_type: StreamType::Role,
                        event_type: other.to_string(),
                    });
                }
            }
            Ok(())
        })
    }
}

/// Handles `permission.defined` events.
pub struct PermissionProjection;

#[derive(Deserialize)]
struct PermissionDefined {
    name: String,
    description: String,
}

impl StreamProjection for PermissionProjection {
    fn stream_type(&self) -> StreamType {
        StreamType::Permission
    }

    fn apply<'a>(
        &'a self,
        tx: &'a mut Transaction<'_, Postgres>,
        event: &'a StoredEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + 'a>> {
        Box::pin(async move {
            let event_type = event.event_type.as_str();
            match event_type {
                t if t == role_events::PERMISSION_DEFINED => {
                    let p: PermissionDefined = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "INSERT INTO permissions (id, name, description, created_at)
                         VALUES ($1, $2, $3, $4)
                         ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, description = EXCLUDED.description",
                    )
                    .bind(&event.stream_id)
                    .bind(p.name)
                    .bind(p.description)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                other => {
                    return Err(ProjectionError::UnhandledEventType {
                        stream_type: StreamType::Permission,
                        event_type: other.to_string(),
                    });
                }
            }
            Ok(())
        })
    }
}
