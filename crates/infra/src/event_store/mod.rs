//! Append-only event log boundary.
//!
//! The log is the single source of truth: one ordered stream per aggregate,
//! versions 1..N without gaps, plus a global append order used for replay.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventScan, EventStore, EventStoreError, StoredEvent, UncommittedEvent};
