//! Event store port - the append-only log with snapshots.
//!
//! Appending an event is the linearization point of the whole system: an
//! effect whose result never became a persisted event is considered not to
//! have happened. Reads are ordered by the assigned index.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::{Event, SessionState, StoredEvent};

/// Error type for event store operations.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("Failed to append event: {0}")]
    AppendError(String),

    #[error("Failed to query events: {0}")]
    QueryError(String),

    #[error("Failed to persist snapshot: {0}")]
    SnapshotError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Event log is corrupt: {0}")]
    Corrupt(String),
}

/// A materialized state bound to the log position it incorporates.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: SessionState,
    pub at_event_index: i64,
}

/// Trait for event persistence implementations.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an event and return its assigned monotonic index.
    async fn append_event(&self, event: &Event) -> Result<i64, EventStoreError>;

    /// Fetch events ordered by index ascending, bounded inclusively.
    async fn get_events(
        &self,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Persist a snapshot of the state as of the given event index.
    async fn create_snapshot(
        &self,
        state: &SessionState,
        at_event_index: i64,
    ) -> Result<(), EventStoreError>;

    /// The snapshot with the highest event index, if any.
    async fn latest_snapshot(&self) -> Result<Option<Snapshot>, EventStoreError>;

    /// Total number of events in the log.
    async fn count(&self) -> Result<u64, EventStoreError>;

    /// Crash-resume hints, keyed by opaque strings.
    async fn get_metadata(&self, key: &str) -> Result<Option<String>, EventStoreError>;

    async fn set_metadata(&self, key: &str, value: &str) -> Result<(), EventStoreError>;

    /// Fetch a single event by index.
    async fn get_event(&self, index: i64) -> Result<Option<StoredEvent>, EventStoreError> {
        let events = self.get_events(Some(index), Some(index)).await?;
        Ok(events.into_iter().next())
    }
}

/// In-memory event store for unit tests.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: tokio::sync::RwLock<InMemoryInner>,
}

#[derive(Debug, Default)]
struct InMemoryInner {
    events: Vec<Event>,
    snapshots: Vec<Snapshot>,
    metadata: std::collections::HashMap<String, String>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_event(&self, event: &Event) -> Result<i64, EventStoreError> {
        let mut inner = self.inner.write().await;
        inner.events.push(event.clone());
        Ok(inner.events.len() as i64)
    }

    async fn get_events(
        &self,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self.inner.read().await;
        let result = inner
            .events
            .iter()
            .enumerate()
            .map(|(i, event)| StoredEvent {
                index: i as i64 + 1,
                event: event.clone(),
            })
            .filter(|stored| {
                from.is_none_or(|f| stored.index >= f) && to.is_none_or(|t| stored.index <= t)
            })
            .collect();
        Ok(result)
    }

    async fn create_snapshot(
        &self,
        state: &SessionState,
        at_event_index: i64,
    ) -> Result<(), EventStoreError> {
        let mut inner = self.inner.write().await;
        inner.snapshots.push(Snapshot {
            state: state.clone(),
            at_event_index,
        });
        Ok(())
    }

    async fn latest_snapshot(&self) -> Result<Option<Snapshot>, EventStoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .snapshots
            .iter()
            .max_by_key(|s| s.at_event_index)
            .cloned())
    }

    async fn count(&self) -> Result<u64, EventStoreError> {
        let inner = self.inner.read().await;
        Ok(inner.events.len() as u64)
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<String>, EventStoreError> {
        let inner = self.inner.read().await;
        Ok(inner.metadata.get(key).cloned())
    }

    async fn set_metadata(&self, key: &str, value: &str) -> Result<(), EventStoreError> {
        let mut inner = self.inner.write().await;
        inner.metadata.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
