//! Projection implementations (read model builders).
//!
//! Projections consume account events and build query-optimized read models.
//! All projections are:
//! - **Rebuildable**: can be reconstructed from the event log
//! - **Idempotent**: safe for at-least-once, possibly gapped delivery

pub mod accounts;

pub use accounts::{AccountProjector, AccountView, Projected, ProjectionError, RebuildSummary};
