//! Background workers.

pub mod channel_consumer;

pub use channel_consumer::{ChannelConsumer, ConsumerHandle};
