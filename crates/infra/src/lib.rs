//! Infrastructure layer: event log, event-sourcing handler, dispatchers,
//! channel consumers and the accounts read model.

pub mod bank;
pub mod command_dispatcher;
pub mod config;
pub mod error;
pub mod event_sourcing;
pub mod event_store;
pub mod mediator;
pub mod projections;
pub mod query_dispatcher;
pub mod read_model;
pub mod retry;
pub mod workers;


pub use config::CqrsConfig;
pub use error::DispatchError;
pub use event_sourcing::{EventSourcingHandler, JsonEnvelope, SaveOutcome};
pub use retry::RetryPolicy;
