use ledgerflow_core::AggregateId;

use crate::EventEnvelope;

/// Messages that carry a partition key.
///
/// All messages sharing a key land on the same channel partition, which is what
/// gives per-aggregate ordering. `EventEnvelope` is keyed by its aggregate id.
pub trait PartitionKeyed {
    fn partition_key(&self) -> AggregateId;
}

impl<E> PartitionKeyed for EventEnvelope<E> {
    fn partition_key(&self) -> AggregateId {
        self.aggregate_id()
    }
}
