use ledgerflow_core::AggregateId;

/// A command: intent to mutate (transient, never persisted).
///
/// Commands are routed by `command_type()` to exactly one registered handler.
/// They are rejected if invalid; accepted commands become events.
///
/// The expected version is never carried by the command itself: it is taken
/// from the aggregate loaded at handling time.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Discriminant used for handler lookup (e.g. "deposit-funds").
    fn command_type(&self) -> &'static str;

    /// Aggregate targeted by the command, if any (administrative commands have none).
    fn target_aggregate_id(&self) -> Option<AggregateId>;
}
