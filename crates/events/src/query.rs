/// A query: intent to read, with no side effects.
///
/// Queries are routed by `query_type()` to exactly one registered handler.
pub trait Query: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Discriminant used for handler lookup (e.g. "find-by-holder").
    fn query_type(&self) -> &'static str;
}
