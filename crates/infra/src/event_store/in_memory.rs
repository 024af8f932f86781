use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use ledgerflow_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventScan, EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Default)]
struct Log {
    /// Every event in global append order.
    events: Vec<StoredEvent>,
    /// Per-stream indexes into `events`, ascending by version.
    streams: HashMap<AggregateId, Vec<usize>>,
}

impl Log {
    fn current_version(&self, aggregate_id: &AggregateId) -> u64 {
        self.streams
            .get(aggregate_id)
            .and_then(|idx| idx.last())
            .map(|&i| self.events[i].version)
            .unwrap_or(0)
    }
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    log: RwLock<Log>,
    unavailable: AtomicBool,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every operation fails with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Total number of events across all streams.
    pub fn len(&self) -> usize {
        self.log.read().map(|log| log.events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self) -> Result<(), EventStoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EventStoreError::Unavailable("event store offline".to_string()));
        }
        Ok(())
    }

    fn event_at(&self, index: usize) -> Result<Option<StoredEvent>, EventStoreError> {
        self.ensure_available()?;
        let log = self.log.read().map_err(|_| poisoned())?;
        Ok(log.events.get(index).cloned())
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.ensure_available()?;

        let Some(first) = events.first() else {
            return Err(EventStoreError::InvalidAppend("empty batch".to_string()));
        };
        let aggregate_id = first.aggregate_id;

        if let Some(idx) = events.iter().position(|e| e.aggregate_id != aggregate_id) {
            return Err(EventStoreError::InvalidAppend(format!(
                "batch contains multiple aggregate_ids (index {idx})"
            )));
        }

        let mut log = self.log.write().map_err(|_| poisoned())?;

        let current = log.current_version(&aggregate_id);
        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency {
                aggregate_id,
                expected: expected_version.value(),
                actual: current,
            });
        }

        let mut committed = Vec::with_capacity(events.len());
        for (offset, e) in events.into_iter().enumerate() {
            let index = log.events.len();
            let stored = StoredEvent {
                aggregate_id,
                version: current + 1 + offset as u64,
                position: index as u64 + 1,
                event_type: e.event_type,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            log.events.push(stored.clone());
            log.streams.entry(aggregate_id).or_default().push(index);
            committed.push(stored);
        }

        debug!(
            aggregate_id = %aggregate_id,
            from_version = current + 1,
            count = committed.len(),
            "events appended"
        );
        Ok(committed)
    }

    fn load(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.ensure_available()?;
        let log = self.log.read().map_err(|_| poisoned())?;

        match log.streams.get(&aggregate_id) {
            Some(indexes) if !indexes.is_empty() => {
                Ok(indexes.iter().map(|&i| log.events[i].clone()).collect())
            }
            _ => Err(EventStoreError::NotFound(aggregate_id)),
        }
    }

    fn scan_all(&self) -> EventScan<'_> {
        Box::new(Scan {
            store: self,
            next: 0,
            done: false,
        })
    }
}

/// Cursor over the global log; takes the read lock once per event.
struct Scan<'a> {
    store: &'a InMemoryEventStore,
    next: usize,
    done: bool,
}

impl Iterator for Scan<'_> {
    type Item = Result<StoredEvent, EventStoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.store.event_at(self.next) {
            Ok(Some(event)) => {
                self.next += 1;
                Some(Ok(event))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

fn poisoned() -> EventStoreError {
    EventStoreError::Unavailable("lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn uncommitted(aggregate_id: AggregateId, n: u64) -> UncommittedEvent {
        UncommittedEvent {
            aggregate_id,
            event_type: "FundsDeposited".to_string(),
            occurred_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            payload: json!({ "amount": n }),
        }
    }

    #[test]
    fn append_assigns_contiguous_versions() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        let first = store
            .append(vec![uncommitted(id, 1), uncommitted(id, 2)], ExpectedVersion::NoStream)
            .unwrap();
        assert_eq!(first.iter().map(|e| e.version).collect::<Vec<_>>(), vec![1, 2]);

        let second = store
            .append(vec![uncommitted(id, 3)], ExpectedVersion::Exact(2))
            .unwrap();
        assert_eq!(second[0].version, 3);

        let loaded = store.load(id).unwrap();
        assert_eq!(loaded.iter().map(|e| e.version).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn stale_expected_version_is_rejected_and_nothing_is_written() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store.append(vec![uncommitted(id, 1)], ExpectedVersion::NoStream).unwrap();

        let err = store
            .append(vec![uncommitted(id, 2)], ExpectedVersion::NoStream)
            .unwrap_err();
        assert!(matches!(
            err,
            EventStoreError::Concurrency { expected: 0, actual: 1, .. }
        ));
        assert_eq!(store.load(id).unwrap().len(), 1);
    }

    #[test]
    fn mixed_aggregate_batch_is_invalid() {
        let store = InMemoryEventStore::new();
        let err = store
            .append(
                vec![uncommitted(AggregateId::new(), 1), uncommitted(AggregateId::new(), 2)],
                ExpectedVersion::NoStream,
            )
            .unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn empty_batch_is_invalid_even_with_a_stale_expectation() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store.append(vec![uncommitted(id, 1)], ExpectedVersion::NoStream).unwrap();

        let err = store.append(vec![], ExpectedVersion::NoStream).unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unknown_stream_is_not_found() {
        let store = InMemoryEventStore::new();
        assert!(matches!(store.load(AggregateId::new()), Err(EventStoreError::NotFound(_))));
    }

    #[test]
    fn scan_follows_global_order_and_restarts() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        store.append(vec![uncommitted(a, 1)], ExpectedVersion::NoStream).unwrap();
        store.append(vec![uncommitted(b, 1)], ExpectedVersion::NoStream).unwrap();
        store.append(vec![uncommitted(a, 2)], ExpectedVersion::Exact(1)).unwrap();

        let order: Vec<_> = store
            .scan_all()
            .map(|e| e.map(|e| (e.aggregate_id, e.version)))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(order, vec![(a, 1), (b, 1), (a, 2)]);

        // A second scan starts over.
        assert_eq!(store.scan_all().count(), 3);
    }

    #[test]
    fn outage_fails_every_operation() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store.append(vec![uncommitted(id, 1)], ExpectedVersion::NoStream).unwrap();

        store.set_unavailable(true);
        assert!(matches!(store.load(id), Err(EventStoreError::Unavailable(_))));
        let mut scan = store.scan_all();
        assert!(matches!(scan.next(), Some(Err(EventStoreError::Unavailable(_)))));
        assert!(scan.next().is_none());

        store.set_unavailable(false);
        assert_eq!(store.load(id).unwrap().len(), 1);
    }

    #[test]
    fn concurrent_appends_at_same_version_have_one_winner() {
        let store = Arc::new(InMemoryEventStore::new());
        let id = AggregateId::new();
        store.append(vec![uncommitted(id, 0)], ExpectedVersion::NoStream).unwrap();

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = store.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    store.append(vec![uncommitted(id, n)], ExpectedVersion::Exact(1))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(store.load(id).unwrap().len(), 2);
    }
}
