//! The event store abstraction (`SPEC_FULL.md` §4.1).
//!
//! Dyn-compatible via explicit `Pin<Box<dyn Future>>` returns, mirroring
//! `composable_rust_core::event_store::EventStore`'s documented rationale: this
//! trait is held behind `Arc<dyn EventStore>` and shared between the RPC layer,
//! the projection router and workflow activities.

pub mod in_memory;
pub mod postgres;

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::EventStoreError;
use crate::event::{EventMetadata, StoredEvent};
use crate::stream::StreamType;

/// Summary statistics for operator dashboards (§4.1 `get_event_processing_stats`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct EventProcessingStats {
    /// Total events ever inserted.
    pub total_events: i64,
    /// Events currently unprocessed with a recorded error.
    pub total_failed: i64,
    /// Events that failed within the last 24 hours.
    pub failed_last_24h: i64,
    /// The event types with the most unresolved failures, most first.
    pub top_failing_event_types: Vec<(String, i64)>,
    /// The ten most recent failures, most recent first.
    pub recent_failures: Vec<StoredEvent>,
}

/// The event store: an append-only, per-stream-versioned log with a
/// processing-error channel for projection failures.
///
/// # Errors
///
/// See each method's documentation.
pub trait EventStore: Send + Sync {
    /// Append one domain event to `stream_id`/`stream_type`, assigning the next
    /// `stream_version` atomically, then invoke the projection router for it
    /// inside the same transaction (§4.1, §4.2, §5).
    ///
    /// For event types in [`crate::catalog::CRITICAL_EVENT_TYPES`], a
    /// projection failure is returned as
    /// [`EventStoreError::CriticalProjectionFailed`]; for all other event
    /// types, the failure is recorded on the row (`processing_error`) and
    /// this call still returns `Ok`.
    ///
    /// # Errors
    ///
    /// - [`EventStoreError::InvalidEventType`] if `event_type` is malformed.
    /// - [`EventStoreError::CriticalProjectionFailed`] per the rule above.
    /// - [`EventStoreError::Database`] on connection/query failure.
    fn emit_domain_event(
        &self,
        stream_id: String,
        stream_type: StreamType,
        event_type: String,
        event_data: Value,
        event_metadata: EventMetadata,
    ) -> Pin<Box<dyn Future<Output = Result<Uuid, EventStoreError>> + Send + '_>>;

    /// List events whose last projection attempt failed, most recent first,
    /// optionally filtered (§4.1).
    ///
    /// # Errors
    ///
    /// [`EventStoreError::Database`] on query failure.
    fn get_failed_events(
        &self,
        limit: i64,
        event_type: Option<String>,
        stream_type: Option<StreamType>,
        since: Option<DateTime<Utc>>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredEvent>, EventStoreError>> + Send + '_>>;

    /// Clear `processed_at`/`processing_error` on one event, which re-fires its
    /// projection handler (§4.1).
    ///
    /// # Errors
    ///
    /// [`EventStoreError::EventNotFound`] if `event_id` doesn't exist,
    /// [`EventStoreError::Database`] on query failure.
    fn retry_failed_event(
        &self,
        event_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<StoredEvent, EventStoreError>> + Send + '_>>;

    /// Summary counts for operator dashboards (§4.1).
    ///
    /// # Errors
    ///
    /// [`EventStoreError::Database`] on query failure.
    fn get_event_processing_stats(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<EventProcessingStats, EventStoreError>> + Send + '_>>;

    /// Load every event for one stream, oldest first (used by activities that
    /// need to check existing state, e.g. the idempotency check in
    /// `create_organization`).
    ///
    /// # Errors
    ///
    /// [`EventStoreError::Database`] on query failure.
    fn load_stream(
        &self,
        stream_id: String,
        stream_type: StreamType,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredEvent>, EventStoreError>> + Send + '_>>;
}
