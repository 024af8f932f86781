//! Accounts projection: one row per bank account, built from account events.
//!
//! Idempotent under at-least-once delivery. Each row remembers the last stream
//! version it reflects; for an incoming event at version `v`:
//!
//! - `v <= last_applied_version`: duplicate, skipped.
//! - `v == last_applied_version + 1`: applied.
//! - `v > last_applied_version + 1`: gap; the missing range is read back from
//!   the event log (authoritative) and applied in order.
//!
//! An event whose payload cannot be decoded is logged and skipped; the row's
//! version still advances so later events are not stalled behind it.
//!
//! The version check and the write of a row happen under that row's lock, so
//! two deliveries of the same stream (say, two drainers on one partition)
//! cannot move `last_applied_version` backwards.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use ledgerflow_accounts::{AccountEvent, AccountId, AccountType, BankAccount};
use ledgerflow_core::AggregateId;
use ledgerflow_events::{EventChannel, partition_for};

use crate::error::DispatchError;
use crate::event_sourcing::{EventSourcingHandler, JsonEnvelope};
use crate::event_store::EventStore;
use crate::read_model::{ReadStore, ReadStoreError};

pub const PROJECTION_NAME: &str = "accounts";

/// Rows are locked in stripes keyed like channel partitions.
const ROW_LOCK_STRIPES: u32 = 16;

/// Read model row for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub account_id: AccountId,
    pub holder: String,
    pub account_type: AccountType,
    pub balance: u64,
    pub opened_at: DateTime<Utc>,
    pub closed: bool,
    pub last_applied_version: u64,
}

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error(transparent)]
    ReadStore(#[from] ReadStoreError),

    #[error("gap reload for {aggregate_id} failed: {reason}")]
    Reload { aggregate_id: AggregateId, reason: String },

    #[error("projection fence poisoned")]
    Fence,

    #[error("row lock poisoned")]
    RowLock,
}

impl From<ProjectionError> for DispatchError {
    fn from(value: ProjectionError) -> Self {
        DispatchError::TransientInfra(value.to_string())
    }
}

/// What `on` did with a delivered event.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Projected {
    Applied,
    Duplicate,
    /// Undecodable, or does not fit the row (e.g. a deposit before any open).
    Skipped,
    /// A gap was closed from the log; `events` counts the ones applied
    /// (skipped ones excluded).
    GapFilled { events: u64 },
}

/// Totals from a rebuild.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RebuildSummary {
    pub events_replayed: u64,
    pub accounts: usize,
}

/// Accounts projector.
///
/// Live delivery (`on`) and `rebuild` are fenced against each other: a
/// rebuild holds the write side of the fence, so no live event can land in a
/// half-rebuilt store.
pub struct AccountProjector<S, C, R> {
    es: Arc<EventSourcingHandler<S, C>>,
    store: R,
    fence: RwLock<()>,
    rows: Vec<Mutex<()>>,
}

/// Row after one event, and whether the event was skipped.
struct Step {
    row: Option<AccountView>,
    skipped: bool,
}

impl<S, C, R> AccountProjector<S, C, R>
where
    S: EventStore,
    C: EventChannel<JsonEnvelope>,
    R: ReadStore<AggregateId, AccountView>,
{
    pub fn new(es: Arc<EventSourcingHandler<S, C>>, store: R) -> Self {
        Self {
            es,
            store,
            fence: RwLock::new(()),
            rows: (0..ROW_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    /// Apply one delivered event.
    pub fn on(&self, envelope: &JsonEnvelope) -> Result<Projected, ProjectionError> {
        let _live = self.fence.read().map_err(|_| ProjectionError::Fence)?;
        self.project(envelope)
    }

    /// Drop the read model and rebuild it by replaying the entire log.
    ///
    /// Live events delivered meanwhile wait for the rebuild to finish, then
    /// are dropped as duplicates or applied normally.
    ///
    /// If the replay fails after the store was cleared, the read model is left
    /// partial: accounts that receive no further events stay missing until a
    /// rebuild succeeds, so the caller must retry it.
    #[instrument(skip(self), fields(projection = PROJECTION_NAME))]
    pub fn rebuild(&self) -> Result<RebuildSummary, DispatchError> {
        let _exclusive = self.fence.write().map_err(|_| ProjectionError::Fence)?;
        info!("rebuild started");

        self.store.clear()?;
        let mut events_replayed = 0u64;
        let replayed = self.es.replay_all::<BankAccount, _>(|envelope| {
            events_replayed += 1;
            self.project(envelope).map(|_| ()).map_err(DispatchError::from)
        });
        let states = match replayed {
            Ok(states) => states,
            Err(err) => {
                error!(
                    events_replayed,
                    error = %err,
                    "rebuild aborted after clear; read model is partial until a rebuild succeeds"
                );
                return Err(err);
            }
        };

        let summary = RebuildSummary {
            events_replayed,
            accounts: states.len(),
        };
        info!(events = summary.events_replayed, accounts = summary.accounts, "rebuild finished");
        Ok(summary)
    }

    fn row_lock(&self, aggregate_id: &AggregateId) -> Result<MutexGuard<'_, ()>, ProjectionError> {
        let stripe = partition_for(aggregate_id, ROW_LOCK_STRIPES) as usize;
        self.rows[stripe].lock().map_err(|_| ProjectionError::RowLock)
    }

    fn project(&self, envelope: &JsonEnvelope) -> Result<Projected, ProjectionError> {
        let aggregate_id = envelope.aggregate_id();
        let version = envelope.version();
        let _row = self.row_lock(&aggregate_id)?;
        let row = self.store.get(&aggregate_id)?;
        let last = row.as_ref().map(|r| r.last_applied_version).unwrap_or(0);

        if version <= last {
            debug!(aggregate_id = %aggregate_id, version, last, "duplicate event skipped");
            return Ok(Projected::Duplicate);
        }
        if version == last + 1 {
            let step = self.apply(row, envelope)?;
            return Ok(if step.skipped { Projected::Skipped } else { Projected::Applied });
        }

        info!(aggregate_id = %aggregate_id, last, version, "gap detected; reloading from log");
        let stream = self
            .es
            .store()
            .load(aggregate_id)
            .map_err(|e| ProjectionError::Reload {
                aggregate_id,
                reason: e.to_string(),
            })?;

        let mut row = row;
        let mut events = 0;
        for stored in stream.iter().filter(|e| e.version > last && e.version <= version) {
            let step = self.apply(row, &stored.to_envelope())?;
            if !step.skipped {
                events += 1;
            }
            row = step.row;
        }
        Ok(Projected::GapFilled { events })
    }

    fn apply(&self, row: Option<AccountView>, envelope: &JsonEnvelope) -> Result<Step, ProjectionError> {
        let aggregate_id = envelope.aggregate_id();
        let version = envelope.version();

        let event = match envelope.decode::<AccountEvent>() {
            Ok(event) => event,
            Err(err) => {
                warn!(
                    aggregate_id = %aggregate_id,
                    version,
                    event_type = envelope.event_type(),
                    error = %err,
                    "undecodable event skipped"
                );
                return self.advance(row, aggregate_id, version);
            }
        };

        let next = match (row, event) {
            (None, AccountEvent::AccountOpened(e)) => AccountView {
                account_id: e.account_id,
                holder: e.holder,
                account_type: e.account_type,
                balance: e.opening_balance,
                opened_at: e.occurred_at,
                closed: false,
                last_applied_version: version,
            },
            (Some(mut r), AccountEvent::FundsDeposited(e)) => {
                r.balance = r.balance.saturating_add(e.amount);
                r.last_applied_version = version;
                r
            }
            (Some(mut r), AccountEvent::FundsWithdrawn(e)) => {
                r.balance = r.balance.saturating_sub(e.amount);
                r.last_applied_version = version;
                r
            }
            (Some(mut r), AccountEvent::AccountClosed(_)) => {
                r.closed = true;
                r.last_applied_version = version;
                r
            }
            (row, event) => {
                warn!(
                    aggregate_id = %aggregate_id,
                    version,
                    event_type = envelope.event_type(),
                    has_row = row.is_some(),
                    account = %event.account_id(),
                    "event does not fit the current row; skipped"
                );
                return self.advance(row, aggregate_id, version);
            }
        };

        self.store.upsert(aggregate_id, next.clone())?;
        Ok(Step {
            row: Some(next),
            skipped: false,
        })
    }

    /// Skip an event but move the row past it.
    fn advance(&self, row: Option<AccountView>, aggregate_id: AggregateId, version: u64) -> Result<Step, ProjectionError> {
        let row = match row {
            Some(mut r) => {
                r.last_applied_version = version;
                self.store.upsert(aggregate_id, r.clone())?;
                Some(r)
            }
            None => None,
        };
        Ok(Step { row, skipped: true })
    }
}
