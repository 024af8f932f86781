//! Event-sourcing handler: the only path between aggregates and the event log.
//!
//! ```text
//! save:  staged events → EventStore::append (expected = loaded version)
//!                      → outbox (per aggregate) → EventChannel::publish (retried)
//! load:  EventStore::load → decode → Aggregate::reconstruct
//! ```
//!
//! ## Append before publish
//!
//! An event is published only after its append committed. If publishing
//! still fails after the retry budget, the save is **not** failed: the events
//! are durable, stay queued in the aggregate's outbox and are reported via
//! `SaveOutcome::published = false`. The next save of the same aggregate (or
//! `republish_pending`) flushes the queue in version order, so per-aggregate
//! channel order always matches log order.
//!
//! An outbox exists only while someone uses it or it still holds events; an
//! idle, empty outbox is dropped from the map.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, instrument, warn};

use ledgerflow_core::{Aggregate, AggregateId, ExpectedVersion};
use ledgerflow_events::{Event, EventChannel, EventEnvelope, decode_event};

use crate::error::DispatchError;
use crate::event_store::{EventStore, StoredEvent, UncommittedEvent};
use crate::retry::RetryPolicy;

/// Envelope type carried by the channel.
pub type JsonEnvelope = EventEnvelope<JsonValue>;

type Outbox = Arc<Mutex<VecDeque<JsonEnvelope>>>;

/// Result of a successful save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Stream version after the append.
    pub version: u64,
    /// Whether every committed event reached the channel.
    pub published: bool,
    /// The committed events, as published.
    pub events: Vec<JsonEnvelope>,
}

pub struct EventSourcingHandler<S, C> {
    store: S,
    channel: C,
    retry: RetryPolicy,
    outboxes: Mutex<HashMap<AggregateId, Outbox>>,
}

impl<S, C> EventSourcingHandler<S, C> {
    pub fn new(store: S, channel: C, retry: RetryPolicy) -> Self {
        Self {
            store,
            channel,
            retry,
            outboxes: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Number of committed events still waiting to be published.
    pub fn pending_count(&self) -> usize {
        self.outbox_slots()
            .map(|slots| {
                slots
                    .iter()
                    .map(|(_, slot)| slot.lock().map(|q| q.len()).unwrap_or(0))
                    .sum()
            })
            .unwrap_or(0)
    }

    fn outbox_for(&self, aggregate_id: AggregateId) -> Result<Outbox, DispatchError> {
        let mut outboxes = self.outboxes.lock().map_err(|_| outbox_poisoned())?;
        Ok(outboxes.entry(aggregate_id).or_default().clone())
    }

    fn outbox_slots(&self) -> Result<Vec<(AggregateId, Outbox)>, DispatchError> {
        let outboxes = self.outboxes.lock().map_err(|_| outbox_poisoned())?;
        Ok(outboxes.iter().map(|(id, slot)| (*id, slot.clone())).collect())
    }

    /// Give back a slot taken with `outbox_for`/`outbox_slots`; the entry is
    /// removed when it is empty and nobody else holds it.
    ///
    /// New handles are only cloned under the map lock, so the strong count
    /// cannot grow while it is checked here.
    fn release_outbox(&self, aggregate_id: AggregateId, slot: Outbox) {
        let Ok(mut outboxes) = self.outboxes.lock() else {
            return;
        };
        let idle = outboxes
            .get(&aggregate_id)
            .is_some_and(|current| Arc::ptr_eq(current, &slot))
            && Arc::strong_count(&slot) == 2
            && slot.lock().map(|queue| queue.is_empty()).unwrap_or(false);
        if idle {
            outboxes.remove(&aggregate_id);
        }
    }

    #[cfg(test)]
    fn outbox_entries(&self) -> usize {
        self.outboxes.lock().map(|o| o.len()).unwrap_or(0)
    }
}

impl<S, C> EventSourcingHandler<S, C>
where
    S: EventStore,
    C: EventChannel<JsonEnvelope>,
{
    /// Persist the events staged on `aggregate` and publish them.
    ///
    /// `aggregate` must already have the staged events applied (see
    /// `ledgerflow_events::execute`); the expected version for the append is
    /// `aggregate.version() - staged.len()`.
    #[instrument(skip_all, fields(aggregate_id = tracing::field::Empty, staged = staged.len()))]
    pub fn save<A>(&self, aggregate: &A, staged: &[A::Event]) -> Result<SaveOutcome, DispatchError>
    where
        A: Aggregate,
        A::Id: Copy + Into<AggregateId>,
        A::Event: Event + Serialize,
    {
        let aggregate_id: AggregateId = (*aggregate.id()).into();
        tracing::Span::current().record("aggregate_id", tracing::field::display(aggregate_id));

        if staged.is_empty() {
            return Ok(SaveOutcome {
                version: aggregate.version(),
                published: true,
                events: vec![],
            });
        }

        let base = aggregate
            .version()
            .checked_sub(staged.len() as u64)
            .ok_or_else(|| {
                DispatchError::InvalidRequest(format!(
                    "aggregate {aggregate_id} is at version {} but has {} staged events",
                    aggregate.version(),
                    staged.len()
                ))
            })?;

        let uncommitted = staged
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, ev))
            .collect::<Result<Vec<_>, _>>()?;

        let slot = self.outbox_for(aggregate_id)?;
        let outcome = self.append_and_publish(aggregate_id, &slot, uncommitted, base);
        self.release_outbox(aggregate_id, slot);
        outcome
    }

    fn append_and_publish(
        &self,
        aggregate_id: AggregateId,
        slot: &Outbox,
        uncommitted: Vec<UncommittedEvent>,
        base: u64,
    ) -> Result<SaveOutcome, DispatchError> {
        // Holding the outbox across append + publish keeps channel order equal
        // to log order for this aggregate.
        let mut queue = slot.lock().map_err(|_| outbox_poisoned())?;

        let committed = self
            .store
            .append(uncommitted, ExpectedVersion::from_version(base))?;
        let version = committed.last().map(|e| e.version).unwrap_or(base);
        let events: Vec<JsonEnvelope> = committed.iter().map(StoredEvent::to_envelope).collect();
        debug!(version, "events committed");

        queue.extend(events.iter().cloned());
        let published = match self.flush(&mut queue) {
            Ok(()) => true,
            Err(err) => {
                error!(
                    aggregate_id = %aggregate_id,
                    pending = queue.len(),
                    error = %err,
                    "events committed but not published; kept for republish"
                );
                false
            }
        };

        Ok(SaveOutcome {
            version,
            published,
            events,
        })
    }

    /// Load the current state of an aggregate by folding its full stream.
    #[instrument(skip_all, fields(aggregate_id = tracing::field::Empty))]
    pub fn load<A>(&self, id: A::Id) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Id: Copy + Into<AggregateId>,
        A::Event: Event + DeserializeOwned,
    {
        let events = self.load_events::<A>(id)?;
        Ok(A::reconstruct(id, &events))
    }

    /// State of an aggregate as of `version` (the fold of its first `version` events).
    #[instrument(skip_all, fields(aggregate_id = tracing::field::Empty, version = version))]
    pub fn load_at<A>(&self, id: A::Id, version: u64) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Id: Copy + Into<AggregateId>,
        A::Event: Event + DeserializeOwned,
    {
        let events = self.load_events::<A>(id)?;
        Ok(A::reconstruct_at(id, &events, version))
    }

    fn load_events<A>(&self, id: A::Id) -> Result<Vec<A::Event>, DispatchError>
    where
        A: Aggregate,
        A::Id: Copy + Into<AggregateId>,
        A::Event: Event + DeserializeOwned,
    {
        let aggregate_id: AggregateId = id.into();
        tracing::Span::current().record("aggregate_id", tracing::field::display(aggregate_id));
        let stream = self.store.load(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &stream)?;

        stream
            .iter()
            .map(|stored| {
                decode_event::<A::Event>(&stored.event_type, &stored.payload).map_err(|e| {
                    DispatchError::CorruptStream(format!(
                        "{aggregate_id} v{}: {e}",
                        stored.version
                    ))
                })
            })
            .collect()
    }

    /// Replay the whole log in global order.
    ///
    /// `visit` sees every event (as its wire envelope) before it is folded.
    /// Returns the final state of every aggregate. A version gap inside any
    /// stream fails with `CorruptStream`; an event that cannot be decoded is
    /// still visited but not folded.
    #[instrument(skip_all)]
    pub fn replay_all<A, F>(&self, mut visit: F) -> Result<BTreeMap<AggregateId, A>, DispatchError>
    where
        A: Aggregate,
        A::Id: From<AggregateId>,
        A::Event: Event + DeserializeOwned,
        F: FnMut(&JsonEnvelope) -> Result<(), DispatchError>,
    {
        let mut states: BTreeMap<AggregateId, A> = BTreeMap::new();
        let mut positions: HashMap<AggregateId, u64> = HashMap::new();
        let mut replayed = 0u64;

        for item in self.store.scan_all() {
            let stored = item?;
            let last = positions.entry(stored.aggregate_id).or_insert(0);
            if stored.version != *last + 1 {
                return Err(DispatchError::CorruptStream(format!(
                    "{} jumps from v{} to v{}",
                    stored.aggregate_id, last, stored.version
                )));
            }
            *last = stored.version;

            visit(&stored.to_envelope())?;

            let state = states
                .entry(stored.aggregate_id)
                .or_insert_with(|| A::empty(A::Id::from(stored.aggregate_id)));
            match decode_event::<A::Event>(&stored.event_type, &stored.payload) {
                Ok(event) => state.apply(&event),
                Err(err) => warn!(
                    aggregate_id = %stored.aggregate_id,
                    version = stored.version,
                    error = %err,
                    "undecodable event skipped during replay"
                ),
            }
            replayed += 1;
        }

        info!(events = replayed, aggregates = states.len(), "replay complete");
        Ok(states)
    }

    /// Retry publishing every queued event. Returns how many were published.
    pub fn republish_pending(&self) -> Result<usize, DispatchError> {
        let mut published = 0;
        let mut failures = Vec::new();

        for (aggregate_id, slot) in self.outbox_slots()? {
            {
                let mut queue = slot.lock().map_err(|_| outbox_poisoned())?;
                let before = queue.len();
                if let Err(err) = self.flush(&mut queue) {
                    failures.push(format!("{aggregate_id}: {err}"));
                }
                published += before - queue.len();
            }
            self.release_outbox(aggregate_id, slot);
        }

        if failures.is_empty() {
            info!(published, "outbox drained");
            Ok(published)
        } else {
            Err(DispatchError::TransientInfra(failures.join("; ")))
        }
    }

    /// Re-publish an aggregate's committed events from `from_version` on,
    /// read back from the log. Consumers drop the duplicates.
    pub fn republish_from(&self, aggregate_id: AggregateId, from_version: u64) -> Result<usize, DispatchError> {
        let slot = self.outbox_for(aggregate_id)?;
        let sent = self.resend_stream(aggregate_id, &slot, from_version);
        self.release_outbox(aggregate_id, slot);
        sent
    }

    fn resend_stream(&self, aggregate_id: AggregateId, slot: &Outbox, from_version: u64) -> Result<usize, DispatchError> {
        let mut queue = slot.lock().map_err(|_| outbox_poisoned())?;

        // Anything still queued is older than what we are about to send.
        self.flush(&mut queue)?;

        let stream = self.store.load(aggregate_id)?;
        let mut sent = 0;
        for stored in stream.iter().filter(|e| e.version >= from_version) {
            self.publish_with_retry(&stored.to_envelope())?;
            sent += 1;
        }
        info!(aggregate_id = %aggregate_id, from_version, sent, "stream republished");
        Ok(sent)
    }

    fn flush(&self, queue: &mut VecDeque<JsonEnvelope>) -> Result<(), DispatchError> {
        while let Some(envelope) = queue.front() {
            self.publish_with_retry(envelope)?;
            queue.pop_front();
        }
        Ok(())
    }

    fn publish_with_retry(&self, envelope: &JsonEnvelope) -> Result<(), DispatchError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.channel.publish(envelope.clone()) {
                Ok(()) => return Ok(()),
                Err(err) if self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        aggregate_id = %envelope.aggregate_id(),
                        version = envelope.version(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "publish failed, retrying"
                    );
                    thread::sleep(delay);
                }
                Err(err) => {
                    return Err(DispatchError::TransientInfra(format!(
                        "publish of {} v{} failed after {attempt} attempts: {err}",
                        envelope.aggregate_id(),
                        envelope.version()
                    )));
                }
            }
        }
    }
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), DispatchError> {
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::CorruptStream(format!(
                "loaded stream for {aggregate_id} contains {} at index {idx}",
                e.aggregate_id
            )));
        }
        let expected = idx as u64 + 1;
        if e.version != expected {
            return Err(DispatchError::CorruptStream(format!(
                "loaded stream for {aggregate_id} has v{} where v{expected} was expected",
                e.version
            )));
        }
    }
    Ok(())
}

fn outbox_poisoned() -> DispatchError {
    DispatchError::TransientInfra("outbox lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use ledgerflow_core::AggregateRoot;
    use ledgerflow_accounts::{
        AccountCommand, AccountId, AccountType, BankAccount, DepositFunds, OpenAccount,
    };
    use ledgerflow_events::{InMemoryEventChannel, execute, partition_for};

    use crate::event_store::{EventScan, EventStoreError, InMemoryEventStore};

    type Handler = EventSourcingHandler<Arc<InMemoryEventStore>, Arc<InMemoryEventChannel<JsonEnvelope>>>;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn handler(retry: RetryPolicy) -> Handler {
        EventSourcingHandler::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventChannel::new(2)),
            retry,
        )
    }

    fn open(es: &Handler, id: AccountId, opening: u64) -> SaveOutcome {
        let mut account = BankAccount::empty(id);
        let staged = execute(
            &mut account,
            &AccountCommand::OpenAccount(OpenAccount {
                account_id: id,
                holder: "Alice".to_string(),
                account_type: AccountType::Savings,
                opening_balance: opening,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        es.save(&account, &staged).unwrap()
    }

    fn deposit(es: &Handler, account: &mut BankAccount, amount: u64) -> Result<SaveOutcome, DispatchError> {
        let staged = execute(
            account,
            &AccountCommand::DepositFunds(DepositFunds {
                account_id: *account.id(),
                amount,
                occurred_at: test_time(),
            }),
        )?;
        es.save(account, &staged)
    }

    fn published(es: &Handler, id: AccountId) -> Vec<u64> {
        let p = partition_for(&id.0, es.channel().partitions());
        es.channel()
            .partition_log(p)
            .into_iter()
            .filter(|e| e.aggregate_id() == id.0)
            .map(|e| e.version())
            .collect()
    }

    #[test]
    fn save_then_load_roundtrips_state() {
        let es = handler(RetryPolicy::no_retry());
        let id = AccountId::new(AggregateId::new());
        let outcome = open(&es, id, 100);
        assert_eq!(outcome.version, 1);
        assert!(outcome.published);

        let mut account: BankAccount = es.load(id).unwrap();
        deposit(&es, &mut account, 50).unwrap();

        let reloaded: BankAccount = es.load(id).unwrap();
        assert_eq!(reloaded.balance(), 150);
        assert_eq!(reloaded.version(), 2);
        assert_eq!(es.load_at::<BankAccount>(id, 1).unwrap().balance(), 100);
        assert_eq!(published(&es, id), vec![1, 2]);
    }

    #[test]
    fn unknown_aggregate_is_not_found() {
        let es = handler(RetryPolicy::no_retry());
        let err = es.load::<BankAccount>(AccountId::new(AggregateId::new())).unwrap_err();
        assert!(matches!(err, DispatchError::NotFound(_)));
    }

    #[test]
    fn stale_aggregate_conflicts_and_publishes_nothing() {
        let es = handler(RetryPolicy::no_retry());
        let id = AccountId::new(AggregateId::new());
        open(&es, id, 100);

        let mut first: BankAccount = es.load(id).unwrap();
        let mut second: BankAccount = es.load(id).unwrap();
        deposit(&es, &mut first, 10).unwrap();

        let err = deposit(&es, &mut second, 20).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::ConcurrencyConflict { expected: 1, actual: 2, .. }
        ));
        assert!(err.is_retryable());
        assert_eq!(published(&es, id), vec![1, 2]);
    }

    #[test]
    fn failed_publish_keeps_events_queued_in_order() {
        let es = handler(RetryPolicy::no_retry());
        let id = AccountId::new(AggregateId::new());
        open(&es, id, 100);
        let mut account: BankAccount = es.load(id).unwrap();

        es.channel().fail_next_publishes(1);
        let outcome = deposit(&es, &mut account, 5).unwrap();
        assert_eq!(outcome.version, 2);
        assert!(!outcome.published);
        assert_eq!(es.pending_count(), 1);
        // The append is durable regardless.
        assert_eq!(es.load::<BankAccount>(id).unwrap().balance(), 105);

        // Next save flushes the backlog first.
        let outcome = deposit(&es, &mut account, 5).unwrap();
        assert!(outcome.published);
        assert_eq!(es.pending_count(), 0);
        assert_eq!(published(&es, id), vec![1, 2, 3]);
    }

    #[test]
    fn republish_pending_drains_outbox() {
        let es = handler(RetryPolicy::no_retry());
        let id = AccountId::new(AggregateId::new());

        es.channel().fail_next_publishes(1);
        assert!(!open(&es, id, 1).published);
        assert_eq!(es.republish_pending().unwrap(), 1);
        assert_eq!(published(&es, id), vec![1]);
    }

    #[test]
    fn drained_outboxes_are_dropped() {
        let es = handler(RetryPolicy::no_retry());
        for _ in 0..1000 {
            assert!(open(&es, AccountId::new(AggregateId::new()), 1).published);
        }
        assert_eq!(es.pending_count(), 0);
        assert_eq!(es.outbox_entries(), 0);

        let stuck = AccountId::new(AggregateId::new());
        es.channel().fail_next_publishes(1);
        assert!(!open(&es, stuck, 1).published);
        assert_eq!(es.outbox_entries(), 1);

        es.republish_pending().unwrap();
        assert_eq!(es.outbox_entries(), 0);

        es.republish_from(stuck.0, 1).unwrap();
        assert_eq!(es.outbox_entries(), 0);
    }

    #[test]
    fn concurrent_saves_leave_no_outbox_behind() {
        let es = Arc::new(handler(RetryPolicy::no_retry()));
        let ids: Vec<_> = (0..4).map(|_| AccountId::new(AggregateId::new())).collect();
        for id in &ids {
            open(&es, *id, 0);
        }

        std::thread::scope(|scope| {
            for id in &ids {
                for _ in 0..4 {
                    let es = es.clone();
                    let id = *id;
                    scope.spawn(move || {
                        for _ in 0..25 {
                            let mut account: BankAccount = es.load(id).unwrap();
                            // Conflicts are expected; only the outbox bookkeeping matters.
                            let _ = deposit(&es, &mut account, 1);
                        }
                    });
                }
            }
        });

        assert_eq!(es.pending_count(), 0);
        assert_eq!(es.outbox_entries(), 0);
        for id in &ids {
            let versions = published(&es, *id);
            assert_eq!(versions, (1..=versions.len() as u64).collect::<Vec<_>>());
        }
    }

    mod spans {
        use super::*;
        use std::sync::Mutex;
        use tracing::span::{Attributes, Id, Record};
        use tracing::{Event as TraceEvent, Metadata, Subscriber};

        /// Collects the names of spans that declare an `aggregate_id` field.
        #[derive(Default)]
        struct SpanNames(Mutex<Vec<&'static str>>);

        impl Subscriber for &'static SpanNames {
            fn enabled(&self, _: &Metadata<'_>) -> bool {
                true
            }
            fn new_span(&self, span: &Attributes<'_>) -> Id {
                let meta = span.metadata();
                if meta.fields().field("aggregate_id").is_some() {
                    self.0.lock().unwrap().push(meta.name());
                }
                Id::from_u64(1)
            }
            fn record(&self, _: &Id, _: &Record<'_>) {}
            fn record_follows_from(&self, _: &Id, _: &Id) {}
            fn event(&self, _: &TraceEvent<'_>) {}
            fn enter(&self, _: &Id) {}
            fn exit(&self, _: &Id) {}
        }

        #[test]
        fn load_paths_open_an_aggregate_span() {
            let names: &'static SpanNames = Box::leak(Box::new(SpanNames::default()));
            let es = handler(RetryPolicy::no_retry());
            let id = AccountId::new(AggregateId::new());

            tracing::subscriber::with_default(names, || {
                open(&es, id, 10);
                es.load::<BankAccount>(id).unwrap();
                es.load_at::<BankAccount>(id, 1).unwrap();
            });

            assert_eq!(*names.0.lock().unwrap(), vec!["save", "load", "load_at"]);
        }
    }

    #[test]
    fn publish_is_retried_within_budget() {
        let es = handler(RetryPolicy::exponential(
            3,
            std::time::Duration::from_millis(1),
            std::time::Duration::from_millis(2),
        ));
        let id = AccountId::new(AggregateId::new());
        es.channel().fail_next_publishes(2);
        assert!(open(&es, id, 1).published);
        assert_eq!(published(&es, id), vec![1]);
    }

    #[test]
    fn republish_from_sends_log_suffix_again() {
        let es = handler(RetryPolicy::no_retry());
        let id = AccountId::new(AggregateId::new());
        open(&es, id, 10);
        let mut account: BankAccount = es.load(id).unwrap();
        deposit(&es, &mut account, 1).unwrap();

        assert_eq!(es.republish_from(id.0, 2).unwrap(), 1);
        assert_eq!(published(&es, id), vec![1, 2, 2]);
    }

    #[test]
    fn replay_all_folds_every_aggregate_in_global_order() {
        let es = handler(RetryPolicy::no_retry());
        let a = AccountId::new(AggregateId::new());
        let b = AccountId::new(AggregateId::new());
        open(&es, a, 10);
        open(&es, b, 20);
        let mut account: BankAccount = es.load(a).unwrap();
        deposit(&es, &mut account, 5).unwrap();

        let mut seen = Vec::new();
        let states = es
            .replay_all::<BankAccount, _>(|env| {
                seen.push((env.aggregate_id(), env.version()));
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, vec![(a.0, 1), (b.0, 1), (a.0, 2)]);
        assert_eq!(states[&a.0].balance(), 15);
        assert_eq!(states[&b.0].balance(), 20);
    }

    /// Store whose log skips a version, as a damaged backend might.
    struct GappedStore(Vec<StoredEvent>);

    impl EventStore for GappedStore {
        fn append(&self, _: Vec<UncommittedEvent>, _: ExpectedVersion) -> Result<Vec<StoredEvent>, EventStoreError> {
            Err(EventStoreError::Unavailable("read-only".into()))
        }

        fn load(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
            Ok(self.0.iter().filter(|e| e.aggregate_id == aggregate_id).cloned().collect())
        }

        fn scan_all(&self) -> EventScan<'_> {
            Box::new(self.0.clone().into_iter().map(Ok))
        }
    }

    #[test]
    fn version_gap_is_a_corrupt_stream() {
        let source = handler(RetryPolicy::no_retry());
        let id = AccountId::new(AggregateId::new());
        open(&source, id, 10);
        let mut account: BankAccount = source.load(id).unwrap();
        deposit(&source, &mut account, 1).unwrap();
        deposit(&source, &mut account, 1).unwrap();

        let mut events = source.store().load(id.0).unwrap();
        events.remove(1);

        let es = EventSourcingHandler::new(
            GappedStore(events),
            Arc::new(InMemoryEventChannel::<JsonEnvelope>::new(1)),
            RetryPolicy::no_retry(),
        );
        assert!(matches!(
            es.replay_all::<BankAccount, _>(|_| Ok(())),
            Err(DispatchError::CorruptStream(_))
        ));
        assert!(matches!(es.load::<BankAccount>(id), Err(DispatchError::CorruptStream(_))));
    }
}
