//! A non-persistent [`EventStore`] for saga and reducer tests (`SPEC_FULL.md` §8).
//!
//! `PostgresEventStore` dispatches every append through [`crate::projection::ProjectionRouter`]
//! inside the same `sqlx::Transaction`; there's no connection here to hand those
//! handlers, so this store skips projection dispatch entirely. Tests built on it
//! assert against the event log itself — stream versions, event types, the shape
//! of a saga's compensation trace — not against projection tables. Tests that need
//! the latter run against `PostgresEventStore` behind `testcontainers` instead.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::EventStoreError;
use crate::event::{EventMetadata, EventType, StoredEvent};
use crate::stream::StreamType;

use super::{EventProcessingStats, EventStore};

/// An in-process event log behind a `Mutex<Vec<_>>`, grounded on
/// `composable_rust_testing::mocks::InMemoryEventStore`'s role in this stack
/// (fast, deterministic, no external service), but shaped around this crate's
/// own `stream_version`/`sequence_number`/`EventType` rather than `core::event_store`'s
/// `SerializedEvent`/`Version`.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<StoredEvent>>,
}

impl InMemoryEventStore {
    /// Build an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every event currently in the log, in `sequence_number` order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (a prior panic while holding
    /// the lock), which never happens in this store's own code paths.
    #[must_use]
    #[allow(clippy::unwrap_used)] // poisoning here would mean a prior panic in this file, not caller error
    pub fn all_events(&self) -> Vec<StoredEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventStore for InMemoryEventStore {
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

            #[allow(clippy::unwrap_used)] // see all_events
            let mut events = self.events.lock().unwrap();

            let next_version = events
                .iter()
                .filter(|e| e.stream_id == stream_id && e.stream_type == stream_type)
                .map(|e| e.stream_version)
                .max()
                .unwrap_or(0)
                + 1;

            let stored = StoredEvent {
                id: Uuid::new_v4(),
                sequence_number: events.len() as i64 + 1,
                stream_id,
                stream_type,
                stream_version: next_version,
                event_type,
                event_data,
                event_metadata,
                created_at: Utc::now(),
                processed_at: Some(Utc::now()),
                processing_error: None,
                retry_count: 0,
            };

            let event_id = stored.id;
            events.push(stored);
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
            #[allow(clippy::unwrap_used)] // see all_events
            let events = self.events.lock().unwrap();

            let mut failed: Vec<StoredEvent> = events
                .iter()
                .filter(|e| e.processing_error.is_some())
                .filter(|e| event_type.as_deref().is_none_or(|t| e.event_type.as_str() == t))
                .filter(|e| stream_type.is_none_or(|t| e.stream_type == t))
                .filter(|e| since.is_none_or(|s| e.created_at >= s))
                .cloned()
                .collect();

            failed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            failed.truncate(limit.max(0) as usize);
            Ok(failed)
        })
    }

    fn retry_failed_event(
        &self,
        event_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<StoredEvent, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            #[allow(clippy::unwrap_used)] // see all_events
            let mut events = self.events.lock().unwrap();

            let event = events
                .iter_mut()
                .find(|e| e.id == event_id)
                .ok_or(EventStoreError::EventNotFound(event_id))?;

            event.processed_at = Some(Utc::now());
            event.processing_error = None;
            Ok(event.clone())
        })
    }

    fn get_event_processing_stats(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<EventProcessingStats, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            #[allow(clippy::unwrap_used)] // see all_events
            let events = self.events.lock().unwrap();

            let total_events = events.len() as i64;
            let failed: Vec<&StoredEvent> =
                events.iter().filter(|e| e.processing_error.is_some()).collect();
            let total_failed = failed.len() as i64;
            let day_ago = Utc::now() - chrono::Duration::hours(24);
            let failed_last_24h = failed.iter().filter(|e| e.created_at >= day_ago).count() as i64;

            let mut counts: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
            for e in &failed {
                *counts.entry(e.event_type.as_str().to_string()).or_insert(0) += 1;
            }
            let mut top_failing_event_types: Vec<(String, i64)> = counts.into_iter().collect();
            top_failing_event_types.sort_by(|a, b| b.1.cmp(&a.1));
            top_failing_event_types.truncate(5);

            let mut recent_failures: Vec<StoredEvent> = failed.into_iter().cloned().collect();
            recent_failures.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            recent_failures.truncate(10);

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
            #[allow(clippy::unwrap_used)] // see all_events
            let events = self.events.lock().unwrap();

            let mut stream: Vec<StoredEvent> = events
                .iter()
                .filter(|e| e.stream_id == stream_id && e.stream_type == stream_type)
                .cloned()
                .collect();
            stream.sort_by_key(|e| e.stream_version);
            Ok(stream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_versions_are_monotonic_with_no_gaps() {
        let store = InMemoryEventStore::new();
        for i in 0..3 {
            store
                .emit_domain_event(
                    "org-1".to_string(),
                    StreamType::Organization,
                    "organization.created".to_string(),
                    serde_json::json!({ "seq": i }),
                    EventMetadata::new(None),
                )
                .await
                .unwrap();
        }

        let stream = store
            .load_stream("org-1".to_string(), StreamType::Organization)
            .await
            .unwrap();

        let versions: Vec<i64> = stream.iter().map(|e| e.stream_version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn streams_are_isolated_by_id_and_type() {
        let store = InMemoryEventStore::new();
        store
            .emit_domain_event(
                "org-1".to_string(),
                StreamType::Organization,
                "organization.created".to_string(),
                serde_json::json!({}),
                EventMetadata::new(None),
            )
            .await
            .unwrap();
        store
            .emit_domain_event(
                "org-2".to_string(),
                StreamType::Organization,
                "organization.created".to_string(),
                serde_json::json!({}),
                EventMetadata::new(None),
            )
            .await
            .unwrap();

        let org1 = store
            .load_stream("org-1".to_string(), StreamType::Organization)
            .await
            .unwrap();
        assert_eq!(org1.len(), 1);
        assert_eq!(org1[0].stream_version, 1);
    }

    #[tokio::test]
    async fn rejects_malformed_event_type() {
        let store = InMemoryEventStore::new();
        let result = store
            .emit_domain_event(
                "org-1".to_string(),
                StreamType::Organization,
                "NotDotted".to_string(),
                serde_json::json!({}),
                EventMetadata::new(None),
            )
            .await;
        assert!(matches!(result, Err(EventStoreError::InvalidEventType(_))));
    }
}
