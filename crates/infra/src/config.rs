//! Configuration loading and representation.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::retry::RetryPolicy;

pub const DEFAULT_CONSUMER_GROUP: &str = "accounts.projection";

/// Runtime settings for the CQRS pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CqrsConfig {
    /// Number of channel partitions.
    pub partitions: u32,
    /// Producer-side retry for channel publishes.
    pub publish_retry: RetryPolicy,
    /// How long a consumer waits for the next message before re-checking shutdown.
    pub consumer_poll: Duration,
    /// Consumer group used by the read-side projector.
    pub consumer_group: String,
}

impl Default for CqrsConfig {
    fn default() -> Self {
        Self {
            partitions: 4,
            publish_retry: RetryPolicy::default(),
            consumer_poll: Duration::from_millis(100),
            consumer_group: DEFAULT_CONSUMER_GROUP.to_string(),
        }
    }
}

impl CqrsConfig {
    /// Load from `LEDGERFLOW_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (tests use a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let partitions = parse_or(&lookup, "LEDGERFLOW_PARTITIONS", defaults.partitions).max(1);
        let max_attempts = parse_or(
            &lookup,
            "LEDGERFLOW_PUBLISH_MAX_ATTEMPTS",
            defaults.publish_retry.max_attempts,
        );
        let base_ms = parse_or(
            &lookup,
            "LEDGERFLOW_PUBLISH_BASE_DELAY_MS",
            defaults.publish_retry.base_delay.as_millis() as u64,
        );
        let max_ms = parse_or(
            &lookup,
            "LEDGERFLOW_PUBLISH_MAX_DELAY_MS",
            defaults.publish_retry.max_delay.as_millis() as u64,
        );
        let poll_ms = parse_or(
            &lookup,
            "LEDGERFLOW_CONSUMER_POLL_MS",
            defaults.consumer_poll.as_millis() as u64,
        );
        let consumer_group = lookup("LEDGERFLOW_CONSUMER_GROUP")
            .filter(|g| !g.trim().is_empty())
            .unwrap_or(defaults.consumer_group);

        Self {
            partitions,
            publish_retry: RetryPolicy::exponential(
                max_attempts,
                Duration::from_millis(base_ms),
                Duration::from_millis(max_ms),
            ),
            consumer_poll: Duration::from_millis(poll_ms),
            consumer_group,
        }
    }

    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.partitions = partitions.max(1);
        self
    }

    pub fn with_publish_retry(mut self, retry: RetryPolicy) -> Self {
        self.publish_retry = retry;
        self
    }

    pub fn with_consumer_poll(mut self, poll: Duration) -> Self {
        self.consumer_poll = poll;
        self
    }

    pub fn with_consumer_group(mut self, group: impl Into<String>) -> Self {
        self.consumer_group = group.into();
        self
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + core::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!(key, value = %raw, default = %default, "ignoring unparseable setting");
                default
            }
        },
    }
}
