use chrono::{DateTime, Utc};

/// A domain event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - produced only by an aggregate in response to a validated command
/// - designed to be **append-only**
///
/// `event_type` is the discriminant written to the envelope's `type` field and
/// must match the serde variant name used by [`crate::codec`].
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "FundsDeposited").
    fn event_type(&self) -> &'static str;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
