//! Postgres-backed [`EventStore`], grounded on
//! `composable_rust_postgres::dead_letter_queue::DeadLetterQueue`'s style: raw
//! `sqlx::query`/`query_as` with explicit `.bind()` chains, `tracing` for
//! structured logs and `metrics::counter!`/`histogram!` for operational signal.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::catalog::is_critical;
use crate::error::EventStoreError;
use crate::event::{EventMetadata, EventType, StoredEvent};
use crate::projection::ProjectionRouter;
use crate::stream::StreamType;

use super::{EventProcessingStats, EventStore};

/// The production [`EventStore`]: Postgres-backed, dispatching projections
/// synchronously inside the same transaction as the insert.
pub struct PostgresEventStore {
    pool: PgPool,
    router: ProjectionRouter,
}

impl PostgresEventStore {
    /// Wrap a connection pool with the default projection router.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            router: ProjectionRouter::new(),
        }
    }

    fn row_to_stored_event(row: sqlx::postgres::PgRow) -> Result<StoredEvent, EventStoreError> {
        let stream_type_str: String = row.try_get("stream_type").map_err(EventStoreError::Database)?;
        let stream_type = StreamType::parse(&stream_type_str).map_err(|_| {
            EventStoreError::Database(sqlx::Error::Decode(
                format!("unknown stream_type {stream_type_str:?} in events table").into(),
            ))
        })?;

        let event_type_str: String = row.try_get("event_type").map_err(EventStoreError::Database)?;
        let event_type = EventType::new(event_type_str)?;

        let metadata_json: Value = row.try_get("event_metadata").map_err(EventStoreError::Database)?;
        let event_metadata: EventMetadata =
            serde_json::from_value(metadata_json).map_err(|e| {
                EventStoreError::Database(sqlx::Error::Decode(e.to_string().into()))
            })?;

        Ok(StoredEvent {
            id: row.try_get("id").map_err(EventStoreError::Database)?,
            sequence_number: row.try_get("sequence_number").map_err(EventStoreError::Database)?,
            stream_id: row.try_get("stream_id").map_err(EventStoreError::Database)?,
            stream_type,
            stream_version: row.try_get("stream_version").map_err(EventStoreError::Database)?,
            event_type,
            event_data: row.try_get("event_data").map_err(EventStoreError::Database)?,
            event_metadata,
            created_at: row.try_get("created_at").map_err(EventStoreError::Database)?,
            processed_at: row.try_get("processed_at").map_err(EventStoreError::Database)?,
            processing_error: row.try_get("processing_error").map_err(EventStoreError::Database)?,
            retry_count: row.try_get("retry_count").map_err(EventStoreError::Database)?,
        })
    }
}

impl EventStore for PostgresEventStore {
    fn emit_domain_event(
        &self,
        stream_id: String,
        stream_type: StreamType,
        event_type: String,
        event_data: Value,
        event_metadata: EventMetadata,
    ) -> Pin<Box<dyn Future<Output = Result<Uuid, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let event_type = EventType::new(event_type)?;
            let metadata_json = serde_json::to_value(&event_metadata).map_err(|e| {
                EventStoreError::Database(sqlx::Error::Encode(e.to_string().into()))
            })?;

            let mut tx = self.pool.begin().await.map_err(EventStoreError::Database)?;

            // Advisory lock on the stream so concurrent appenders serialize
            // their version allocation rather than racing the UNIQUE constraint.
            let lock_key = stream_lock_key(&stream_id, stream_type);
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(lock_key)
                .execute(&mut *tx)
                .await
                .map_err(EventStoreError::Database)?;

            let current_version: Option<i64> = sqlx::query_scalar(
                "SELECT MAX(stream_version) FROM events WHERE stream_id = $1 AND stream_type = $2",
            )
            .bind(&stream_id)
            .bind(stream_type.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(EventStoreError::Database)?;

            let next_version = current_version.unwrap_or(0) + 1;

            let row = sqlx::query(
                "INSERT INTO events
                    (stream_id, stream_type, stream_version, event_type, event_data, event_metadata, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, now())
                 RETURNING id, sequence_number, stream_id, stream_type, stream_version, event_type,
                           event_data, event_metadata, created_at, processed_at, processing_error, retry_count",
            )
            .bind(&stream_id)
            .bind(stream_type.as_str())
            .bind(next_version)
            .bind(event_type.as_str())
            .bind(&event_data)
            .bind(&metadata_json)
            .fetch_one(&mut *tx)
            .await
            .map_err(EventStoreError::Database)?;

            let stored = Self::row_to_stored_event(row)?;
            let event_id = stored.id;

            metrics::counter!("bootstrap.events.appended", "event_type" => event_type.as_str().to_string())
                .increment(1);

            // The dispatch below runs under its own savepoint (I4): a
            // non-critical handler that writes several rows and then fails
            // must not leave those partial writes sitting in `tx` alongside
            // the `processing_error` update — only the event insert above
            // (already part of `tx` before the savepoint opens) is meant to
            // survive a handler failure.
            sqlx::query("SAVEPOINT projection_dispatch")
                .execute(&mut *tx)
                .await
                .map_err(EventStoreError::Database)?;

            match self.router.dispatch(&mut tx, &stored).await {
                Ok(()) => {
                    sqlx::query("RELEASE SAVEPOINT projection_dispatch")
                        .execute(&mut *tx)
                        .await
                        .map_err(EventStoreError::Database)?;
                    sqlx::query("UPDATE events SET processed_at = now() WHERE id = $1")
                        .bind(event_id)
                        .execute(&mut *tx)
                        .await
                        .map_err(EventStoreError::Database)?;
                }
                Err(projection_err) => {
                    if is_critical(event_type.as_str()) {
                        tracing::error!(
                            event_id = %event_id,
                            event_type = event_type.as_str(),
                            stream_id = %stream_id,
                            error = %projection_err,
                            "critical event projection failed, rolling back"
                        );
                        tx.rollback().await.map_err(EventStoreError::Database)?;
                        return Err(EventStoreError::CriticalProjectionFailed {
                            event_type: event_type.as_str().to_string(),
                            stream_id,
                            source: projection_err,
                        });
                    }

                    tracing::warn!(
                        event_id = %event_id,
                        event_type = event_type.as_str(),
                        stream_id = %stream_id,
                        error = %projection_err,
                        "non-critical event projection failed, recording on row"
                    );
                    metrics::counter!("bootstrap.events.projection_failed", "event_type" => event_type.as_str().to_string())
                        .increment(1);
                    sqlx::query("ROLLBACK TO SAVEPOINT projection_dispatch")
                        .execute(&mut *tx)
                        .await
                        .map_err(EventStoreError::Database)?;
                    sqlx::query(
                        "UPDATE events SET processing_error = $2, retry_count = retry_count + 1 WHERE id = $1",
                    )
                    .bind(event_id)
                    .bind(projection_err.to_string())
                    .execute(&mut *tx)
                    .await
                    .map_err(EventStoreError::Database)?;
                }
            }

            tx.commit().await.map_err(EventStoreError::Database)?;

            Ok(event_id)
        })
    }

    fn get_failed_events(
        &self,
        limit: i64,
        event_type: Option<String>,
        stream_type: Option<StreamType>,
        since: Option<DateTime<Utc>>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredEvent>, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, sequence_number, stream_id, stream_type, stream_version, event_type,
                        event_data, event_metadata, created_at, processed_at, processing_error, retry_count
                 FROM events
                 WHERE processing_error IS NOT NULL
                   AND ($1::text IS NULL OR event_type = $1)
                   AND ($2::text IS NULL OR stream_type = $2)
                   AND ($3::timestamptz IS NULL OR created_at >= $3)
                 ORDER BY created_at DESC
                 LIMIT $4",
            )
            .bind(event_type)
            .bind(stream_type.map(StreamType::as_str))
            .bind(since)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(EventStoreError::Database)?;

            rows.into_iter().map(Self::row_to_stored_event).collect()
        })
    }

    fn retry_failed_event(
        &self,
        event_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<StoredEvent, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(EventStoreError::Database)?;

            let row = sqlx::query(
                "SELECT id, sequence_number, stream_id, stream_type, stream_version, event_type,
                        event_data, event_metadata, created_at, processed_at, processing_error, retry_count
                 FROM events WHERE id = $1 FOR UPDATE",
            )
            .bind(event_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(EventStoreError::Database)?
            .ok_or(EventStoreError::EventNotFound(event_id))?;

            let stored = Self::row_to_stored_event(row)?;

            sqlx::query("SAVEPOINT projection_dispatch")
                .execute(&mut *tx)
                .await
                .map_err(EventStoreError::Database)?;

            match self.router.dispatch(&mut tx, &stored).await {
                Ok(()) => {
                    sqlx::query("RELEASE SAVEPOINT projection_dispatch")
                        .execute(&mut *tx)
                        .await
                        .map_err(EventStoreError::Database)?;
                    sqlx::query(
                        "UPDATE events SET processed_at = now(), processing_error = NULL WHERE id = $1",
                    )
                    .bind(event_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(EventStoreError::Database)?;
                }
                Err(projection_err) => {
                    // A critical event's handler writes are rolled back here
                    // too (the savepoint, not the commit below, undoes them);
                    // the whole retry then fails since the outer `tx` still
                    // carries the `processing_error` update to commit.
                    sqlx::query("ROLLBACK TO SAVEPOINT projection_dispatch")
                        .execute(&mut *tx)
                        .await
                        .map_err(EventStoreError::Database)?;
                    sqlx::query(
                        "UPDATE events SET processing_error = $2, retry_count = retry_count + 1 WHERE id = $1",
                    )
                    .bind(event_id)
                    .bind(projection_err.to_string())
                    .execute(&mut *tx)
                    .await
                    .map_err(EventStoreError::Database)?;

                    if is_critical(stored.event_type.as_str()) {
                        tx.commit().await.map_err(EventStoreError::Database)?;
                        return Err(EventStoreError::CriticalProjectionFailed {
                            event_type: stored.event_type.as_str().to_string(),
                            stream_id: stored.stream_id,
                            source: projection_err,
                        });
                    }
                }
            }

            tx.commit().await.map_err(EventStoreError::Database)?;

            let row = sqlx::query(
                "SELECT id, sequence_number, stream_id, stream_type, stream_version, event_type,
                        event_data, event_metadata, created_at, processed_at, processing_error, retry_count
                 FROM events WHERE id = $1",
            )
            .bind(event_id)
            .fetch_one(&self.pool)
            .await
            .map_err(EventStoreError::Database)?;

            Self::row_to_stored_event(row)
        })
    }

    fn get_event_processing_stats(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<EventProcessingStats, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let total_events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
                .fetch_one(&self.pool)
                .await
                .map_err(EventStoreError::Database)?;

            let total_failed: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE processing_error IS NOT NULL")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(EventStoreError::Database)?;

            let failed_last_24h: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM events WHERE processing_error IS NOT NULL AND created_at >= now() - interval '24 hours'",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(EventStoreError::Database)?;

            let top_failing_rows = sqlx::query(
                "SELECT event_type, COUNT(*) as failures FROM events
                 WHERE processing_error IS NOT NULL
                 GROUP BY event_type ORDER BY failures DESC LIMIT 5",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(EventStoreError::Database)?;

            let top_failing_event_types = top_failing_rows
                .into_iter()
                .map(|row| -> Result<(String, i64), EventStoreError> {
                    Ok((
                        row.try_get("event_type").map_err(EventStoreError::Database)?,
                        row.try_get("failures").map_err(EventStoreError::Database)?,
                    ))
                })
                .collect::<Result<Vec<_>, _>>()?;

            let recent_failure_rows = sqlx::query(
                "SELECT id, sequence_number, stream_id, stream_type, stream_version, event_type,
                        event_data, event_metadata, created_at, processed_at, processing_error, retry_count
                 FROM events WHERE processing_error IS NOT NULL
                 ORDER BY created_at DESC LIMIT 10",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(EventStoreError::Database)?;

            let recent_failures = recent_failure_rows
                .into_iter()
                .map(Self::row_to_stored_event)
                .collect::<Result<Vec<_>, _>>()?;

            Ok(EventProcessingStats {
                total_events,
                total_failed,
                failed_last_24h,
                top_failing_event_types,
                recent_failures,
            })
        })
    }

    fn load_stream(
        &self,
        stream_id: String,
        stream_type: StreamType,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredEvent>, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, sequence_number, stream_id, stream_type, stream_version, event_type,
                        event_data, event_metadata, created_at, processed_at, processing_error, retry_count
                 FROM events WHERE stream_id = $1 AND stream_type = $2
                 ORDER BY stream_version ASC",
            )
            .bind(stream_id)
            .bind(stream_type.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(EventStoreError::Database)?;

            rows.into_iter().map(Self::row_to_stored_event).collect()
        })
    }
}

/// Derive a stable `pg_advisory_xact_lock` key for a stream from its id and
/// type, so appends to unrelated streams never contend on the same lock.
fn stream_lock_key(stream_id: &str, stream_type: StreamType) -> i64 {
    let hash = blake3::hash(format!("{stream_type}:{stream_id}").as_bytes());
    #[allow(clippy::expect_used)] // blake3 output is always 32 bytes
    let bytes: [u8; 8] = hash.as_bytes()[..8].try_into().expect("hash is 32 bytes");
    i64::from_le_bytes(bytes)
}
