//! The job queue and worker claim protocol (`SPEC_FULL.md` §4.3).
//!
//! Claims are an atomic conditional `UPDATE ... WHERE status = 'pending'
//! RETURNING *`, the same compare-and-swap-via-SQL shape
//! `composable_rust_postgres::dead_letter_queue::DeadLetterQueue::update_status`
//! uses for its own state transitions. Realtime wakeup is layered on top via
//! Postgres `LISTEN/NOTIFY`, wrapped in the shape of
//! `composable_rust_core::event_bus::EventBus::subscribe`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::QueueError;

/// A workflow run's current position in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    /// Enqueued, not yet claimed.
    Pending,
    /// Claimed by a worker and in flight.
    Processing,
    /// Finished successfully.
    Completed,
    /// Finished with a terminal failure.
    Failed,
    /// Cancelled before a worker claimed it.
    Cancelled,
}

impl QueueStatus {
    /// The column representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// One row of the job queue.
#[derive(Debug, Clone)]
pub struct QueueRow {
    /// Row id, also the bootstrap saga's stream id.
    pub id: Uuid,
    /// Stable, derived workflow identity: `blake3("bootstrap:{slug}")`.
    pub workflow_id: String,
    /// The organization slug this run bootstraps.
    pub organization_slug: String,
    /// Current queue position.
    pub status: QueueStatus,
    /// The request payload the saga was started with.
    pub payload: Value,
    /// The worker that currently holds the claim, if any.
    pub claimed_by: Option<String>,
    /// When the row was claimed, if it has been.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Number of times a worker has claimed this row.
    pub attempt_count: i32,
    /// When the row was enqueued.
    pub created_at: DateTime<Utc>,
}

/// Derive the stable workflow id for a bootstrap run from its organization
/// slug, so re-submitting the same bootstrap request never starts a second
/// concurrent run (§4.3, §4.4 idempotency).
#[must_use]
pub fn derive_workflow_id(slug: &str) -> String {
    blake3::hash(format!("bootstrap:{slug}").as_bytes()).to_hex().to_string()
}

/// The job queue, backed by the `workflow_queue` table.
pub struct JobQueue {
    pool: PgPool,
}

impl JobQueue {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_queue_row(row: sqlx::postgres::PgRow) -> Result<QueueRow, QueueError> {
        let status_str: String = row.try_get("status").map_err(QueueError::Database)?;
        let status = QueueStatus::parse(&status_str).ok_or_else(|| {
            QueueError::Database(sqlx::Error::Decode(
                format!("unknown queue status {status_str:?}").into(),
            ))
        })?;

        Ok(QueueRow {
            id: row.try_get("id").map_err(QueueError::Database)?,
            workflow_id: row.try_get("workflow_id").map_err(QueueError::Database)?,
            organization_slug: row.try_get("organization_slug").map_err(QueueError::Database)?,
            status,
            payload: row.try_get("payload").map_err(QueueError::Database)?,
            claimed_by: row.try_get("claimed_by").map_err(QueueError::Database)?,
            claimed_at: row.try_get("claimed_at").map_err(QueueError::Database)?,
            attempt_count: row.try_get("attempt_count").map_err(QueueError::Database)?,
            created_at: row.try_get("created_at").map_err(QueueError::Database)?,
        })
    }

    /// Enqueue a bootstrap run for `organization_slug`, or return the existing
    /// row unchanged if one is already pending/processing/completed for the
    /// same derived workflow id (§4.3, §4.4 duplicate-start prevention).
    ///
    /// # Errors
    ///
    /// [`QueueError::Database`] on query failure.
    pub async fn enqueue(
        &self,
        organization_slug: &str,
        payload: Value,
    ) -> Result<QueueRow, QueueError> {
        let workflow_id = derive_workflow_id(organization_slug);

        if let Some(existing) = self.find_by_workflow_id(&workflow_id).await? {
            tracing::info!(workflow_id = %workflow_id, "bootstrap already queued, skipping duplicate enqueue");
            return Ok(existing);
        }

        let row = sqlx::query(
            "INSERT INTO workflow_queue (id, workflow_id, organization_slug, status, payload, attempt_count, created_at, updated_at)
             VALUES (gen_random_uuid(), $1, $2, 'pending', $3, 0, now(), now())
             ON CONFLICT (workflow_id) DO UPDATE SET workflow_id = EXCLUDED.workflow_id
             RETURNING id, workflow_id, organization_slug, status, payload, claimed_by, claimed_at, attempt_count, created_at",
        )
        .bind(&workflow_id)
        .bind(organization_slug)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(QueueError::Database)?;

        metrics::counter!("bootstrap.queue.enqueued").increment(1);
        Self::row_to_queue_row(row)
    }

    /// Fetch a row by its derived workflow id, regardless of status.
    ///
    /// # Errors
    ///
    /// [`QueueError::Database`] on query failure.
    pub async fn find_by_workflow_id(&self, workflow_id: &str) -> Result<Option<QueueRow>, QueueError> {
        let row = sqlx::query(
            "SELECT id, workflow_id, organization_slug, status, payload, claimed_by, claimed_at, attempt_count, created_at
             FROM workflow_queue WHERE workflow_id = $1",
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(QueueError::Database)?;

        row.map(Self::row_to_queue_row).transpose()
    }

    /// Atomically claim the oldest pending row for `worker_id`, if any exists
    /// (§4.3 step 2): `UPDATE ... WHERE status = 'pending' RETURNING *`, so two
    /// workers racing the same row never both win.
    ///
    /// # Errors
    ///
    /// [`QueueError::Database`] on query failure.
    pub async fn claim_next(&self, worker_id: &str) -> Result<Option<QueueRow>, QueueError> {
        let row = sqlx::query(
            "UPDATE workflow_queue
             SET status = 'processing', claimed_by = $1, claimed_at = now(),
                 attempt_count = attempt_count + 1, updated_at = now()
             WHERE id = (
                 SELECT id FROM workflow_queue
                 WHERE status = 'pending'
                 ORDER BY created_at ASC
                 FOR UPDATE SKIP LOCKED
                 LIMIT 1
             )
             RETURNING id, workflow_id, organization_slug, status, payload, claimed_by, claimed_at, attempt_count, created_at",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(QueueError::Database)?;

        match row {
            Some(row) => {
                let claimed = Self::row_to_queue_row(row)?;
                tracing::info!(worker_id, workflow_id = %claimed.workflow_id, "claimed workflow run");
                metrics::counter!("bootstrap.queue.claimed").increment(1);
                Ok(Some(claimed))
            }
            None => Ok(None),
        }
    }

    /// Mark a row this worker claimed as completed.
    ///
    /// # Errors
    ///
    /// [`QueueError::RowNotFound`] if `id` doesn't exist,
    /// [`QueueError::AlreadyClaimed`] if `claimed_by` doesn't match `worker_id`
    /// (the claim changed hands, e.g. after a reconciliation sweep),
    /// [`QueueError::Database`] on query failure.
    pub async fn mark_completed(&self, id: Uuid, worker_id: &str) -> Result<(), QueueError> {
        self.finish(id, worker_id, "completed", None).await
    }

    /// Mark a row this worker claimed as terminally failed.
    ///
    /// # Errors
    ///
    /// Same as [`JobQueue::mark_completed`].
    pub async fn mark_failed(&self, id: Uuid, worker_id: &str, reason: &str) -> Result<(), QueueError> {
        self.finish(id, worker_id, "failed", Some(reason)).await
    }

    async fn finish(
        &self,
        id: Uuid,
        worker_id: &str,
        status: &str,
        error: Option<&str>,
    ) -> Result<(), QueueError> {
        let result = sqlx::query(
            "UPDATE workflow_queue SET status = $3, last_error = $4, updated_at = now()
             WHERE id = $1 AND claimed_by = $2",
        )
        .bind(id)
        .bind(worker_id)
        .bind(status)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(QueueError::Database)?;

        if result.rows_affected() == 0 {
            return Err(self.resolve_finish_conflict(id).await);
        }

        Ok(())
    }

    async fn resolve_finish_conflict(&self, id: Uuid) -> QueueError {
        match self.get(id).await {
            Ok(Some(_)) => QueueError::AlreadyClaimed(id),
            Ok(None) => QueueError::RowNotFound(id),
            Err(e) => e,
        }
    }

    /// Release a claimed row back to pending, e.g. on graceful worker shutdown
    /// (§4.3 reconciliation).
    ///
    /// # Errors
    ///
    /// [`QueueError::Database`] on query failure.
    pub async fn release(&self, id: Uuid, worker_id: &str) -> Result<(), QueueError> {
        sqlx::query(
            "UPDATE workflow_queue SET status = 'pending', claimed_by = NULL, claimed_at = NULL, updated_at = now()
             WHERE id = $1 AND claimed_by = $2",
        )
        .bind(id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(QueueError::Database)?;

        Ok(())
    }

    /// Requeue every row still marked `processing`, used once at worker
    /// startup before polling begins: this process has no in-memory record of
    /// owning any of them, so whatever worker held them crashed before
    /// finishing (§4.3 reconciliation).
    ///
    /// # Errors
    ///
    /// [`QueueError::Database`] on query failure.
    pub async fn reclaim_orphaned(&self) -> Result<Vec<QueueRow>, QueueError> {
        let rows = sqlx::query(
            "UPDATE workflow_queue
             SET status = 'pending', claimed_by = NULL, claimed_at = NULL, updated_at = now()
             WHERE status = 'processing'
             RETURNING id, workflow_id, organization_slug, status, payload, claimed_by, claimed_at, attempt_count, created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(QueueError::Database)?;

        let reclaimed: Vec<QueueRow> = rows.into_iter().map(Self::row_to_queue_row).collect::<Result<_, _>>()?;
        for row in &reclaimed {
            tracing::warn!(workflow_id = %row.workflow_id, "reclaimed orphaned processing row at startup");
        }
        Ok(reclaimed)
    }

    /// Return every row currently claimed by a worker, used at startup to
    /// reconcile `processing` rows whose worker process no longer exists
    /// (§4.3: a `HashMap<WorkflowId, JoinHandle>` tracks in-process ownership,
    /// so any `processing` row not in that map on startup is a crash orphan).
    ///
    /// # Errors
    ///
    /// [`QueueError::Database`] on query failure.
    pub async fn list_processing(&self) -> Result<Vec<QueueRow>, QueueError> {
        let rows = sqlx::query(
            "SELECT id, workflow_id, organization_slug, status, payload, claimed_by, claimed_at, attempt_count, created_at
             FROM workflow_queue WHERE status = 'processing'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(QueueError::Database)?;

        rows.into_iter().map(Self::row_to_queue_row).collect()
    }

    /// Fetch one row by id.
    ///
    /// # Errors
    ///
    /// [`QueueError::Database`] on query failure.
    pub async fn get(&self, id: Uuid) -> Result<Option<QueueRow>, QueueError> {
        let row = sqlx::query(
            "SELECT id, workflow_id, organization_slug, status, payload, claimed_by, claimed_at, attempt_count, created_at
             FROM workflow_queue WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(QueueError::Database)?;

        row.map(Self::row_to_queue_row).transpose()
    }

    /// Cancel a pending row before any worker claims it.
    ///
    /// # Errors
    ///
    /// [`QueueError::RowNotFound`] if `id` doesn't exist or is no longer
    /// pending, [`QueueError::Database`] on query failure.
    pub async fn cancel(&self, id: Uuid) -> Result<(), QueueError> {
        let result = sqlx::query(
            "UPDATE workflow_queue SET status = 'cancelled', updated_at = now() WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(QueueError::Database)?;

        if result.rows_affected() == 0 {
            return Err(QueueError::RowNotFound(id));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_workflow_id_is_deterministic_per_slug() {
        assert_eq!(derive_workflow_id("acme-health"), derive_workflow_id("acme-health"));
        assert_ne!(derive_workflow_id("acme-health"), derive_workflow_id("other-clinic"));
    }

    #[test]
    fn queue_status_roundtrips() {
        for s in [
            QueueStatus::Pending,
            QueueStatus::Processing,
            QueueStatus::Completed,
            QueueStatus::Failed,
            QueueStatus::Cancelled,
        ] {
            assert_eq!(QueueStatus::parse(s.as_str()), Some(s));
        }
    }
}
