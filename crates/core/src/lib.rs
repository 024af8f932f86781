//! `ledgerflow-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, and the aggregate/fold contracts every
//! event-sourced aggregate is built on.

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion, fold, fold_prefix};
pub use error::{DomainError, DomainResult};
pub use id::AggregateId;
