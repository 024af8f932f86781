use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use ledgerflow_events::{EventChannel, PartitionKeyed};

/// Handle to stop and join the partition threads of a consumer.
#[derive(Debug)]
pub struct ConsumerHandle {
    shutdown: Arc<AtomicBool>,
    joins: Vec<thread::JoinHandle<()>>,
}

impl ConsumerHandle {
    /// Request graceful shutdown and wait for every partition thread to stop.
    ///
    /// A message being applied when shutdown is requested is finished and
    /// committed first.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for join in self.joins.drain(..) {
            let _ = join.join();
        }
    }
}

/// Consumer-group worker: one thread per partition, commit-after-apply.
///
/// - Messages within a partition are applied strictly in offset order.
/// - The offset is committed only after `handler` returned `Ok`; on `Err`
///   the same message is fetched again after one poll interval.
/// - `handler` must be idempotent (at-least-once delivery).
#[derive(Debug)]
pub struct ChannelConsumer;

impl ChannelConsumer {
    pub fn spawn<M, C, H, E>(
        name: &'static str,
        channel: C,
        group: impl Into<String>,
        poll: Duration,
        handler: H,
    ) -> std::io::Result<ConsumerHandle>
    where
        M: PartitionKeyed + Send + 'static,
        C: EventChannel<M> + Clone + 'static,
        H: Fn(&M) -> Result<(), E> + Send + Sync + 'static,
        E: core::fmt::Display + 'static,
    {
        let group = group.into();
        let shutdown = Arc::new(AtomicBool::new(false));
        let handler = Arc::new(handler);
        let mut joins = Vec::new();

        for partition in 0..channel.partitions() {
            let channel = channel.clone();
            let group = group.clone();
            let shutdown_flag = shutdown.clone();
            let handler = handler.clone();

            let spawned = thread::Builder::new()
                .name(format!("{name}-p{partition}"))
                .spawn(move || {
                    consume_partition(name, &channel, &group, partition, poll, &shutdown_flag, &*handler)
                });

            match spawned {
                Ok(join) => joins.push(join),
                Err(err) => {
                    // Stop what already started before reporting.
                    ConsumerHandle { shutdown, joins }.shutdown();
                    return Err(err);
                }
            }
        }

        info!(worker = name, group = %group, partitions = joins.len(), "consumer started");
        Ok(ConsumerHandle { shutdown, joins })
    }

    /// Apply everything currently committed to the channel for `group`, on
    /// the calling thread, partition by partition.
    ///
    /// A partition stops draining at its first handler failure (the message
    /// stays uncommitted). Returns the number of messages applied.
    pub fn drain_partitions<M, C, H, E>(channel: &C, group: &str, handler: H) -> Result<usize, C::Error>
    where
        M: PartitionKeyed,
        C: EventChannel<M>,
        H: Fn(&M) -> Result<(), E>,
        E: core::fmt::Display,
    {
        let mut applied = 0;
        for partition in 0..channel.partitions() {
            while let Some(delivery) = channel.fetch(group, partition, Duration::ZERO)? {
                if let Err(err) = handler(&delivery.message) {
                    warn!(partition, offset = delivery.offset, error = %err, "drain stopped on handler failure");
                    break;
                }
                commit_or_warn(channel, group, partition, delivery.offset);
                applied += 1;
            }
        }
        Ok(applied)
    }
}

fn consume_partition<M, C, H, E>(
    name: &'static str,
    channel: &C,
    group: &str,
    partition: u32,
    poll: Duration,
    shutdown: &AtomicBool,
    handler: &H,
) where
    M: PartitionKeyed,
    C: EventChannel<M>,
    H: Fn(&M) -> Result<(), E>,
    E: core::fmt::Display,
{
    while !shutdown.load(Ordering::SeqCst) {
        match channel.fetch(group, partition, poll) {
            Ok(Some(delivery)) => match handler(&delivery.message) {
                Ok(()) => commit_or_warn(channel, group, partition, delivery.offset),
                Err(err) => {
                    warn!(
                        worker = name,
                        partition,
                        offset = delivery.offset,
                        error = %err,
                        "handler failed; message will be redelivered"
                    );
                    thread::sleep(poll);
                }
            },
            Ok(None) => continue,
            Err(err) => {
                warn!(worker = name, partition, error = %err, "fetch failed");
                thread::sleep(poll);
            }
        }
    }
    debug!(worker = name, partition, "partition consumer stopped");
}

fn commit_or_warn<M, C>(channel: &C, group: &str, partition: u32, offset: u64)
where
    M: PartitionKeyed,
    C: EventChannel<M>,
{
    // A lost commit only means the message is delivered again.
    if let Err(err) = channel.commit(group, partition, offset) {
        warn!(partition, offset, error = %err, "offset commit failed");
    }
}
