//! The domain event: the atomic unit of state change (`SPEC_FULL.md` §3.1).
//!
//! Grounded on `composable_rust_core::event::SerializedEvent` (the `Display` impl
//! and constructor-pair style) and `composable_rust_core::event_store::EventStoreError`
//! (one variant per failure mode), but the payload is JSON rather than bincode and
//! `event_type` is a runtime-validated string rather than a `&'static str` baked
//! into an enum, since the catalog is dispatched on a column value read back out
//! of Postgres, not reconstructed from a Rust type tag.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stream::StreamType;

#[allow(clippy::expect_used)] // pattern is a compile-time literal, never fails
static EVENT_TYPE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_]+(\.[a-z_]+)+$").expect("static pattern is valid"));

/// Error returned when an `event_type` string fails the dotted-lowercase format check (I3).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("invalid event type {0:?}: must match ^[a-z_]+(\\.[a-z_]+)+$")]
pub struct InvalidEventType(pub String);

/// A validated, dotted, lowercase event type name (e.g. `organization.activated`).
///
/// Validated at construction so that every `StoredEvent` ever built in-process
/// already satisfies invariant I3; the database also enforces the same regex as
/// a `CHECK` constraint, since the column is the authoritative record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventType(String);

impl EventType {
    /// Validate and wrap an event type string.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidEventType`] if `s` doesn't match `^[a-z_]+(\.[a-z_]+)+$`.
    pub fn new(s: impl Into<String>) -> Result<Self, InvalidEventType> {
        let s = s.into();
        if EVENT_TYPE_PATTERN.is_match(&s) {
            Ok(Self(s))
        } else {
            Err(InvalidEventType(s))
        }
    }

    /// Borrow the event type as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EventType {
    type Error = InvalidEventType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.0
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Context carried alongside every event: who did it, why, and how to correlate it.
///
/// `reason` is required (and must be at least 10 characters) for the
/// business-meaningful subset of event types named in `SPEC_FULL.md` §3.1;
/// enforcement lives in [`crate::store::EventStore::emit_domain_event`], not here,
/// since this struct is shared by every event regardless of that requirement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// The principal who caused this event, if any (system-initiated events have none).
    pub user_id: Option<Uuid>,
    /// Correlates events emitted as part of the same logical operation or saga run.
    pub correlation_id: Uuid,
    /// Human-readable justification, required for the critical-event subset.
    pub reason: Option<String>,
    /// Caller-supplied key used to suppress duplicate emission on retry.
    pub idempotency_key: Option<String>,
}

impl EventMetadata {
    /// Build metadata with a fresh correlation id and no reason or idempotency key.
    #[must_use]
    pub fn new(user_id: Option<Uuid>) -> Self {
        Self {
            user_id,
            correlation_id: Uuid::new_v4(),
            reason: None,
            idempotency_key: None,
        }
    }

    /// Attach a correlation id instead of generating a fresh one (used when a
    /// workflow run threads one correlation id through every activity it performs).
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Attach a reason string.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach an idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// A persisted event row, as read back from the event store.
///
/// Fields after `event_metadata` are maintained by the projection engine, never
/// by the emitting caller (I1: append-only except for these three columns).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Unique identifier for this event.
    pub id: Uuid,
    /// Global insertion order, assigned by the database (`BIGSERIAL`).
    pub sequence_number: i64,
    /// The aggregate instance this event belongs to.
    pub stream_id: String,
    /// The aggregate kind.
    pub stream_type: StreamType,
    /// 1-based, per-`(stream_id, stream_type)` monotonic version (I2).
    pub stream_version: i64,
    /// The dotted event type name.
    pub event_type: EventType,
    /// The event payload.
    pub event_data: serde_json::Value,
    /// Context: actor, correlation, reason, idempotency key.
    pub event_metadata: EventMetadata,
    /// When this row was inserted.
    pub created_at: DateTime<Utc>,
    /// When the projection handler last succeeded for this row, if ever.
    pub processed_at: Option<DateTime<Utc>>,
    /// The last projection failure's message, if the handler has never succeeded.
    pub processing_error: Option<String>,
    /// Number of times this row's projection has been (re)attempted.
    pub retry_count: i32,
}

impl StoredEvent {
    /// `true` once the projection handler has recorded success (I4).
    #[must_use]
    pub const fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_accepts_dotted_lowercase() {
        assert!(EventType::new("organization.activated").is_ok());
        assert!(EventType::new("user.role.assigned").is_ok());
    }

    #[test]
    fn event_type_rejects_malformed() {
        assert!(EventType::new("OrganizationActivated").is_err());
        assert!(EventType::new("organization").is_err());
        assert!(EventType::new("organization.Activated").is_err());
        assert!(EventType::new("").is_err());
    }

    #[test]
    fn event_type_display_roundtrips() {
        let et = EventType::new("organization.created").unwrap();
        assert_eq!(et.to_string(), "organization.created");
        let back: String = et.into();
        assert_eq!(back, "organization.created");
    }

    #[test]
    fn metadata_builder_sets_fields() {
        let correlation_id = Uuid::new_v4();
        let meta = EventMetadata::new(None)
            .with_correlation_id(correlation_id)
            .with_reason("manual correction by support")
            .with_idempotency_key("bootstrap:test-provider-001");

        assert_eq!(meta.correlation_id, correlation_id);
        assert_eq!(meta.reason.as_deref(), Some("manual correction by support"));
        assert_eq!(
            meta.idempotency_key.as_deref(),
            Some("bootstrap:test-provider-001")
        );
    }
}
