//! Caller-facing error taxonomy for the command and query paths.

use thiserror::Error;

use ledgerflow_core::{AggregateId, DomainError};

use crate::event_store::EventStoreError;
use crate::read_model::ReadStoreError;

/// Error returned by dispatchers, the event-sourcing handler and the projector.
///
/// - **Domain**: business-rule violation; returned as is, never retried.
/// - **ConcurrencyConflict**: expected-version mismatch; reload and retry.
/// - **NotFound / Unregistered***: unknown aggregate, command or query type.
/// - **TransientInfra**: log/channel/store unavailable after bounded retries.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("concurrency conflict on {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: u64,
        actual: u64,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no handler registered for command '{0}'")]
    UnregisteredCommand(String),

    #[error("no handler registered for query '{0}'")]
    UnregisteredQuery(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transient infrastructure error: {0}")]
    TransientInfra(String),

    #[error("corrupt event stream: {0}")]
    CorruptStream(String),
}

impl DispatchError {
    /// Whether the caller may retry (after reloading, for conflicts).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::ConcurrencyConflict { .. } | DispatchError::TransientInfra(_)
        )
    }
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency {
                aggregate_id,
                expected,
                actual,
            } => DispatchError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            },
            EventStoreError::NotFound(id) => DispatchError::NotFound(format!("aggregate {id}")),
            EventStoreError::InvalidAppend(msg) => DispatchError::InvalidRequest(msg),
            EventStoreError::Unavailable(msg) => DispatchError::TransientInfra(msg),
        }
    }
}

impl From<ReadStoreError> for DispatchError {
    fn from(value: ReadStoreError) -> Self {
        DispatchError::TransientInfra(value.to_string())
    }
}
