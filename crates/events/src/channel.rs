//! Partitioned, ordered, at-least-once event channel (mechanics only).
//!
//! The channel is the **transport layer** between the write side and the read
//! side. Events are stored in the event log first, then published here:
//!
//! ```text
//! Command → Event Log (append) → EventChannel::publish → partition(aggregate_id)
//!                                                          ↓
//!                       consumer group: fetch → apply → commit (per partition)
//! ```
//!
//! ## Guarantees
//!
//! - **Per-key ordering**: a message goes to `partition_for(key, partitions)`,
//!   and each partition is an append-only log delivered in commit order. All
//!   events of one aggregate therefore arrive in append order.
//! - **No cross-partition ordering**: partitions may be consumed concurrently.
//! - **At-least-once**: a producer retry after a lost acknowledgement may
//!   duplicate a message; a consumer that crashes between delivery and commit
//!   sees the same message again. Consumers must be idempotent.
//!
//! ## Commit-after-apply
//!
//! `fetch` always returns the message at the group's committed offset. The
//! offset only moves when the consumer calls `commit` after its handler
//! succeeded, so an uncommitted message is redelivered on the next fetch. At
//! most one consumer per (group, partition) may run at a time.

use std::sync::Arc;
use std::time::Duration;

use ledgerflow_core::AggregateId;

use crate::PartitionKeyed;

/// One message handed to a consumer, with its position in the partition log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery<M> {
    pub partition: u32,
    pub offset: u64,
    pub message: M,
}

/// Ordered channel keyed by partition key, with consumer-group offsets.
///
/// Implementable by any queue/broker offering per-key ordering and
/// consumer-group commit semantics. The trait requires `Send + Sync`; multiple
/// threads may publish concurrently.
pub trait EventChannel<M>: Send + Sync
where
    M: PartitionKeyed,
{
    type Error: core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    /// Number of partitions (fixed for the lifetime of the channel).
    fn partitions(&self) -> u32;

    /// Route `message` to its key's partition and append it.
    fn publish(&self, message: M) -> Result<(), Self::Error>;

    /// Block for up to `timeout` for the message at `group`'s committed offset.
    fn fetch(&self, group: &str, partition: u32, timeout: Duration) -> Result<Option<Delivery<M>>, Self::Error>;

    /// Mark `offset` as applied for `group`; the next fetch returns `offset + 1`.
    fn commit(&self, group: &str, partition: u32, offset: u64) -> Result<(), Self::Error>;
}

impl<M, C> EventChannel<M> for Arc<C>
where
    M: PartitionKeyed,
    C: EventChannel<M> + ?Sized,
{
    type Error = C::Error;

    fn partitions(&self) -> u32 {
        (**self).partitions()
    }

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn fetch(&self, group: &str, partition: u32, timeout: Duration) -> Result<Option<Delivery<M>>, Self::Error> {
        (**self).fetch(group, partition, timeout)
    }

    fn commit(&self, group: &str, partition: u32, offset: u64) -> Result<(), Self::Error> {
        (**self).commit(group, partition, offset)
    }
}

/// Deterministic partition selection for a key.
///
/// Depends only on the key bits, so every producer (in any process) routes a
/// given aggregate to the same partition.
pub fn partition_for(key: &AggregateId, partitions: u32) -> u32 {
    let partitions = partitions.max(1) as u128;
    let bits = key.as_u128();
    // Fold high and low halves so v7 timestamps don't dominate.
    let mixed = (bits >> 64) ^ (bits & u64::MAX as u128);
    (mixed % partitions) as u32
}
