use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use ledgerflow_core::{AggregateId, ExpectedVersion};
use ledgerflow_events::{Event, EventEnvelope, encode_event};

/// An event ready to be appended to a stream (no version assigned yet).
///
/// Built from a typed domain event with [`UncommittedEvent::from_typed`]; the
/// store assigns the version during append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub aggregate_id: AggregateId,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl UncommittedEvent {
    pub fn from_typed<E>(aggregate_id: AggregateId, event: &E) -> Result<Self, EventStoreError>
    where
        E: Event + Serialize,
    {
        let payload = encode_event(event)
            .map_err(|e| EventStoreError::InvalidAppend(format!("payload serialization failed: {e}")))?;

        Ok(Self {
            aggregate_id,
            event_type: event.event_type().to_string(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// A persisted event.
///
/// `version` is the 1-based position in the aggregate stream; `position` is
/// the 1-based position in the store-wide append order. Neither ever changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub aggregate_id: AggregateId,
    pub version: u64,
    pub position: u64,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl StoredEvent {
    /// Copy into the wire envelope published on the channel.
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            self.aggregate_id,
            self.version,
            self.event_type.clone(),
            self.payload.clone(),
            self.occurred_at,
        )
    }
}

/// Event store operation error.
///
/// Infrastructure errors (storage, concurrency) as opposed to domain errors.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed for {aggregate_id}: expected {expected}, found {actual}")]
    Concurrency {
        aggregate_id: AggregateId,
        expected: u64,
        actual: u64,
    },

    #[error("no events for aggregate {0}")]
    NotFound(AggregateId),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("event store unavailable: {0}")]
    Unavailable(String),
}

/// Lazy, store-wide scan in global append order.
///
/// Each item is fetched when the iterator advances, so the full log is never
/// materialized. Dropping the iterator and calling `scan_all` again restarts
/// from the first event.
pub type EventScan<'a> = Box<dyn Iterator<Item = Result<StoredEvent, EventStoreError>> + Send + 'a>;

/// Append-only event store.
///
/// ## Append semantics
///
/// `append()`:
/// - rejects an empty batch with [`EventStoreError::InvalidAppend`]
/// - requires every event in the batch to target the same aggregate
/// - checks the expected version against the stream's current maximum
/// - assigns versions `current + 1 ..= current + n`
/// - persists the batch atomically: readers see all of it or none of it
///
/// Two writers that load the same version race on `append`; exactly one wins,
/// the other gets [`EventStoreError::Concurrency`].
///
/// ## Load semantics
///
/// `load()` returns the stream in ascending version order, or
/// [`EventStoreError::NotFound`] when the stream has no events.
pub trait EventStore: Send + Sync {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    fn load(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError>;

    fn scan_all(&self) -> EventScan<'_>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load(aggregate_id)
    }

    fn scan_all(&self) -> EventScan<'_> {
        (**self).scan_all()
    }
}
