/// Execute an aggregate command deterministically (no IO, no async).
///
/// 1. **Decide**: calls `aggregate.handle(command)` (pure, no mutation)
/// 2. **Evolve**: applies each decided event to the aggregate
///
/// The returned events are the ones staged for persistence. On error the
/// aggregate is untouched and nothing is staged. After success
/// `aggregate.version() - staged.len()` is the version the aggregate was
/// loaded at, which is the expected version for the append.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: ledgerflow_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
