//! Per-layer error taxonomy (`SPEC_FULL.md` §7).
//!
//! One `thiserror` enum per layer, grounded on the shape of
//! `composable_rust_core::event_store::EventStoreError` and
//! `composable_rust_core::projection::ProjectionError`: a variant per failure mode
//! rather than a single generic "internal error" string, so callers can match on
//! what actually happened.

use crate::event::InvalidEventType;
use crate::stream::StreamType;
use thiserror::Error;

/// Errors from the event store (§4.1, §7).
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The `expected_version` passed to `append_events`/`emit_domain_event` didn't
    /// match the stream's current version (I2).
    #[error("concurrency conflict on stream {stream_id} ({stream_type}): expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The stream that was contended.
        stream_id: String,
        /// The stream's aggregate kind.
        stream_type: StreamType,
        /// The version the caller expected.
        expected: i64,
        /// The version actually found.
        actual: i64,
    },

    /// The `event_type` string failed the dotted-lowercase format check (I3).
    #[error(transparent)]
    InvalidEventType(#[from] InvalidEventType),

    /// A projection handler failed while processing a critical event type (§6.3);
    /// the event itself is still durably persisted.
    #[error("projection failed for critical event {event_type} on {stream_id}: {source}")]
    CriticalProjectionFailed {
        /// The event type that failed projection.
        event_type: String,
        /// The stream the event belongs to.
        stream_id: String,
        /// The underlying projection error.
        #[source]
        source: ProjectionError,
    },

    /// The requested event id doesn't exist.
    #[error("event not found: {0}")]
    EventNotFound(uuid::Uuid),

    /// A database-level failure (connection, query, constraint violation not
    /// otherwise modeled above).
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

/// Errors from the projection router (§4.2, §7).
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// No handler is registered for this `(stream_type, event_type)` pair —
    /// raised explicitly rather than silently dropping the event, per §4.2.
    #[error("no projection handler registered for event type {event_type} on stream type {stream_type}")]
    UnhandledEventType {
        /// The stream type that had no handler.
        stream_type: StreamType,
        /// The unhandled event type.
        event_type: String,
    },

    /// The event payload didn't deserialize into the shape the handler expected.
    #[error("malformed payload for {event_type}: {reason}")]
    MalformedPayload {
        /// The event type whose payload was malformed.
        event_type: String,
        /// Why deserialization failed.
        reason: String,
    },

    /// An invariant the handler is responsible for enforcing was violated
    /// (e.g. P8's RBAC scope constraint).
    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    /// A database-level failure while applying the projection.
    #[error("database error applying projection: {0}")]
    Database(#[source] sqlx::Error),
}

/// Errors from the job queue (§4.3, §7).
#[derive(Debug, Error)]
pub enum QueueError {
    /// The row was claimed by another worker before this worker's conditional
    /// update landed (§4.3 step 2) — not a bug, just a lost race.
    #[error("queue row {0} already claimed by another worker")]
    AlreadyClaimed(uuid::Uuid),

    /// The requested queue row doesn't exist.
    #[error("queue row not found: {0}")]
    RowNotFound(uuid::Uuid),

    /// A database-level failure.
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

/// Errors an activity can signal, carrying retryability as a type-level fact
/// per variant rather than a boolean flag (§7).
#[derive(Debug, Error)]
pub enum ActivityError {
    /// A transient failure (timeout, 5xx, network fault) — the workflow runtime
    /// should retry with backoff up to the schedule-to-close deadline.
    #[error("transient failure in {activity}: {reason}")]
    Transient {
        /// The activity that failed.
        activity: &'static str,
        /// Why it failed.
        reason: String,
    },

    /// A failure no retry can fix (duplicate slug, vendor-rejected input,
    /// policy violation) — triggers compensation immediately.
    #[error("terminal failure in {activity}: {reason}")]
    Terminal {
        /// The activity that failed.
        activity: &'static str,
        /// Why it failed terminally.
        reason: String,
    },

    /// The activity's schedule-to-close deadline elapsed before it succeeded.
    #[error("activity {activity} exceeded its schedule-to-close deadline")]
    DeadlineExceeded {
        /// The activity that timed out.
        activity: &'static str,
    },

    /// An underlying event store failure.
    #[error(transparent)]
    EventStore(#[from] EventStoreError),
}

impl ActivityError {
    /// Whether the runtime should retry this activity rather than compensate.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Errors from the saga/workflow runtime itself (§4.4, §5, §7).
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A forward activity failed terminally and compensation is required.
    #[error("activity failed, compensating: {0}")]
    ActivityFailed(#[source] ActivityError),

    /// A compensation activity itself failed; the workflow cannot make further
    /// progress and requires operator intervention. The event log still
    /// records everything attempted.
    #[error("compensation failed during {step}: {reason}")]
    CompensationFailed {
        /// The compensation step that failed.
        step: &'static str,
        /// Why it failed.
        reason: String,
    },

    /// The workflow was cancelled before completion.
    #[error("workflow cancelled")]
    Cancelled,
}
