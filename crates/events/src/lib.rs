//! Events, commands, queries and the channel that carries events from the
//! write side to the read side.

pub mod channel;
pub mod codec;
pub mod command;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_channel;
pub mod partition;
pub mod query;

pub use channel::{Delivery, EventChannel, partition_for};
pub use codec::{EventCodecError, decode_event, encode_event};
pub use command::Command;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_channel::{ChannelError, InMemoryEventChannel};
pub use partition::PartitionKeyed;
pub use query::Query;
