//! Disposable read-model storage.
//!
//! Everything here can be dropped and rebuilt from the event log.

pub mod store;

pub use store::{InMemoryReadStore, ReadStore, ReadStoreError};
