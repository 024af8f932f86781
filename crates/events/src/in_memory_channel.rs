//! In-memory partitioned channel for tests/dev.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::channel::{Delivery, EventChannel, partition_for};
use crate::PartitionKeyed;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The broker could not be reached; nothing was written.
    #[error("channel unavailable: {0}")]
    Unavailable(String),

    /// The message was written but the acknowledgement never arrived.
    #[error("acknowledgement lost for partition {partition}")]
    AckLost { partition: u32 },

    #[error("unknown partition {0}")]
    UnknownPartition(u32),

    /// Internal lock poisoning.
    #[error("channel lock poisoned")]
    Poisoned,
}

#[derive(Debug, Default)]
struct Faults {
    fail_publishes: u32,
    lose_acks: u32,
}

#[derive(Debug)]
struct Partition<M> {
    log: Mutex<Vec<M>>,
    appended: Condvar,
}

/// In-memory partitioned log with consumer-group offsets.
///
/// - No IO / no async
/// - Messages are retained for the lifetime of the channel
/// - Fault injection simulates transient broker failures for at-least-once tests
#[derive(Debug)]
pub struct InMemoryEventChannel<M> {
    partitions: Vec<Partition<M>>,
    offsets: Mutex<HashMap<String, Vec<u64>>>,
    faults: Mutex<Faults>,
}

impl<M> InMemoryEventChannel<M> {
    pub fn new(partitions: u32) -> Self {
        let count = partitions.max(1);
        Self {
            partitions: (0..count)
                .map(|_| Partition {
                    log: Mutex::new(Vec::new()),
                    appended: Condvar::new(),
                })
                .collect(),
            offsets: Mutex::new(HashMap::new()),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Fail the next `n` publishes without writing anything.
    pub fn fail_next_publishes(&self, n: u32) {
        if let Ok(mut f) = self.faults.lock() {
            f.fail_publishes = n;
        }
    }

    /// Write the next `n` publishes but report them as failed.
    pub fn lose_next_acks(&self, n: u32) {
        if let Ok(mut f) = self.faults.lock() {
            f.lose_acks = n;
        }
    }

    /// Next offset `group` will be handed for `partition`.
    pub fn committed_offset(&self, group: &str, partition: u32) -> u64 {
        self.offsets
            .lock()
            .ok()
            .and_then(|o| o.get(group).and_then(|v| v.get(partition as usize).copied()))
            .unwrap_or(0)
    }

    fn partition(&self, partition: u32) -> Result<&Partition<M>, ChannelError> {
        self.partitions
            .get(partition as usize)
            .ok_or(ChannelError::UnknownPartition(partition))
    }
}

impl<M: Clone> InMemoryEventChannel<M> {
    /// Snapshot of every message written to `partition`, duplicates included.
    pub fn partition_log(&self, partition: u32) -> Vec<M> {
        self.partition(partition)
            .ok()
            .and_then(|p| p.log.lock().ok().map(|log| log.clone()))
            .unwrap_or_default()
    }
}

impl<M> EventChannel<M> for InMemoryEventChannel<M>
where
    M: PartitionKeyed + Clone + Send + Sync + 'static,
{
    type Error = ChannelError;

    fn partitions(&self) -> u32 {
        self.partitions.len() as u32
    }

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let lose_ack = {
            let mut faults = self.faults.lock().map_err(|_| ChannelError::Poisoned)?;
            if faults.fail_publishes > 0 {
                faults.fail_publishes -= 1;
                return Err(ChannelError::Unavailable("injected publish failure".to_string()));
            }
            if faults.lose_acks > 0 {
                faults.lose_acks -= 1;
                true
            } else {
                false
            }
        };

        let key = message.partition_key();
        let index = partition_for(&key, self.partitions());
        let partition = self.partition(index)?;
        {
            let mut log = partition.log.lock().map_err(|_| ChannelError::Poisoned)?;
            log.push(message);
            debug!(partition = index, offset = log.len() - 1, key = %key, "message appended");
        }
        partition.appended.notify_all();

        if lose_ack {
            warn!(partition = index, key = %key, "injected acknowledgement loss");
            return Err(ChannelError::AckLost { partition: index });
        }
        Ok(())
    }

    fn fetch(&self, group: &str, partition: u32, timeout: Duration) -> Result<Option<Delivery<M>>, Self::Error> {
        let part = self.partition(partition)?;
        let offset = self.committed_offset(group, partition);
        let deadline = Instant::now() + timeout;

        let mut log = part.log.lock().map_err(|_| ChannelError::Poisoned)?;
        loop {
            if let Some(message) = log.get(offset as usize) {
                return Ok(Some(Delivery {
                    partition,
                    offset,
                    message: message.clone(),
                }));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, _) = part
                .appended
                .wait_timeout(log, deadline - now)
                .map_err(|_| ChannelError::Poisoned)?;
            log = guard;
        }
    }

    fn commit(&self, group: &str, partition: u32, offset: u64) -> Result<(), Self::Error> {
        let count = self.partitions.len();
        self.partition(partition)?;
        let mut offsets = self.offsets.lock().map_err(|_| ChannelError::Poisoned)?;
        let group_offsets = offsets.entry(group.to_string()).or_insert_with(|| vec![0; count]);
        let slot = &mut group_offsets[partition as usize];
        // Commits never move backwards.
        *slot = (*slot).max(offset + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerflow_core::AggregateId;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Msg {
        key: AggregateId,
        n: u32,
    }

    impl PartitionKeyed for Msg {
        fn partition_key(&self) -> AggregateId {
            self.key
        }
    }

    const NO_WAIT: Duration = Duration::from_millis(0);

    fn drain(channel: &InMemoryEventChannel<Msg>, group: &str, partition: u32) -> Vec<Msg> {
        let mut seen = Vec::new();
        while let Some(d) = channel.fetch(group, partition, NO_WAIT).unwrap() {
            seen.push(d.message);
            channel.commit(group, partition, d.offset).unwrap();
        }
        seen
    }

    #[test]
    fn same_key_is_delivered_in_publish_order() {
        let channel = InMemoryEventChannel::new(4);
        let key = AggregateId::new();
        for n in 0..10 {
            channel.publish(Msg { key, n }).unwrap();
        }
        let p = partition_for(&key, 4);
        let seen: Vec<u32> = drain(&channel, "g", p).into_iter().map(|m| m.n).collect();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn uncommitted_message_is_redelivered() {
        let channel = InMemoryEventChannel::new(1);
        let key = AggregateId::new();
        channel.publish(Msg { key, n: 1 }).unwrap();

        let first = channel.fetch("g", 0, NO_WAIT).unwrap().unwrap();
        // Crash before commit: the same message comes back.
        let again = channel.fetch("g", 0, NO_WAIT).unwrap().unwrap();
        assert_eq!(first, again);

        channel.commit("g", 0, again.offset).unwrap();
        assert!(channel.fetch("g", 0, NO_WAIT).unwrap().is_none());
    }

    #[test]
    fn groups_track_offsets_independently() {
        let channel = InMemoryEventChannel::new(1);
        let key = AggregateId::new();
        channel.publish(Msg { key, n: 1 }).unwrap();

        assert_eq!(drain(&channel, "a", 0).len(), 1);
        assert_eq!(channel.committed_offset("a", 0), 1);
        assert_eq!(channel.committed_offset("b", 0), 0);
        assert_eq!(drain(&channel, "b", 0).len(), 1);
    }

    #[test]
    fn commit_never_moves_backwards() {
        let channel = InMemoryEventChannel::new(1);
        let key = AggregateId::new();
        channel.publish(Msg { key, n: 1 }).unwrap();
        channel.publish(Msg { key, n: 2 }).unwrap();
        channel.commit("g", 0, 1).unwrap();
        channel.commit("g", 0, 0).unwrap();
        assert_eq!(channel.committed_offset("g", 0), 2);
    }

    #[test]
    fn failed_publish_writes_nothing_and_lost_ack_writes_once() {
        let channel = InMemoryEventChannel::new(1);
        let key = AggregateId::new();

        channel.fail_next_publishes(1);
        assert!(matches!(channel.publish(Msg { key, n: 1 }), Err(ChannelError::Unavailable(_))));
        assert!(channel.partition_log(0).is_empty());

        channel.lose_next_acks(1);
        assert!(matches!(channel.publish(Msg { key, n: 1 }), Err(ChannelError::AckLost { .. })));
        assert_eq!(channel.partition_log(0).len(), 1);

        // Producer retry duplicates the message.
        channel.publish(Msg { key, n: 1 }).unwrap();
        assert_eq!(channel.partition_log(0).len(), 2);
    }

    #[test]
    fn fetch_wakes_up_on_publish() {
        let channel = std::sync::Arc::new(InMemoryEventChannel::new(1));
        let key = AggregateId::new();
        let producer = {
            let channel = channel.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                channel.publish(Msg { key, n: 9 }).unwrap();
            })
        };
        let got = channel.fetch("g", 0, Duration::from_secs(5)).unwrap();
        producer.join().unwrap();
        assert_eq!(got.map(|d| d.message.n), Some(9));
    }

    #[test]
    fn unknown_partition_is_rejected() {
        let channel: InMemoryEventChannel<Msg> = InMemoryEventChannel::new(2);
        assert_eq!(channel.fetch("g", 5, NO_WAIT).unwrap_err(), ChannelError::UnknownPartition(5));
    }
}
