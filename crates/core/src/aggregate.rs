//! Aggregate contracts for event-sourced domain models.
//!
//! An aggregate never exists as a stored snapshot: its state is always the fold
//! of its ordered event sequence, starting from [`Aggregate::empty`]. The fold
//! helpers in this module are the only path from events to state.

/// Aggregate root marker + minimal interface.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Number of events applied so far (the stream revision).
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for an append.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The stream must not exist yet.
    NoStream,
    /// The stream's maximum version must equal this value.
    Exact(u64),
}

impl ExpectedVersion {
    /// Expectation for a stream currently at `version` (0 = empty).
    pub fn from_version(version: u64) -> Self {
        if version == 0 {
            ExpectedVersion::NoStream
        } else {
            ExpectedVersion::Exact(version)
        }
    }

    /// The stream version this expectation stands for.
    pub fn value(self) -> u64 {
        match self {
            ExpectedVersion::NoStream => 0,
            ExpectedVersion::Exact(v) => v,
        }
    }

    pub fn matches(self, actual: u64) -> bool {
        self.value() == actual
    }
}

/// Aggregate execution semantics (pure, deterministic).
///
/// - **Decision logic**: `handle(&self, cmd)` validates and returns events.
/// - **State mutation**: `apply(&mut self, event)` evolves state and bumps the version by one.
///
/// Aggregates must not perform IO or side effects.
pub trait Aggregate: AggregateRoot + Sized {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Zero-value state for a stream that has no events yet.
    fn empty(id: Self::Id) -> Self;

    /// Evolve in-memory state from a single event (total, side-effect free).
    fn apply(&mut self, event: &Self::Event);

    /// Decide which events to emit given the current state and a command.
    ///
    /// On `Err` nothing must be emitted.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Rebuild current state by folding the full, ascending event sequence.
    fn reconstruct<'a, I>(id: Self::Id, events: I) -> Self
    where
        I: IntoIterator<Item = &'a Self::Event>,
        Self::Event: 'a,
    {
        fold(Self::empty(id), events, Self::apply)
    }

    /// State as of `version`: the fold of the first `version` events.
    fn reconstruct_at<'a, I>(id: Self::Id, events: I, version: u64) -> Self
    where
        I: IntoIterator<Item = &'a Self::Event>,
        Self::Event: 'a,
    {
        fold_prefix(Self::empty(id), events, version, Self::apply)
    }
}

/// Left-fold `events` into `initial` using a pure step function.
pub fn fold<'a, S, E, F>(initial: S, events: impl IntoIterator<Item = &'a E>, step: F) -> S
where
    E: 'a,
    F: Fn(&mut S, &E),
{
    let mut state = initial;
    for event in events {
        step(&mut state, event);
    }
    state
}

/// Fold only the first `len` events of the sequence.
pub fn fold_prefix<'a, S, E, F>(
    initial: S,
    events: impl IntoIterator<Item = &'a E>,
    len: u64,
    step: F,
) -> S
where
    E: 'a,
    F: Fn(&mut S, &E),
{
    let len = usize::try_from(len).unwrap_or(usize::MAX);
    fold(initial, events.into_iter().take(len), step)
}
