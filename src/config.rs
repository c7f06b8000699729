/// Knobs for a tabling session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TablingConfig {
    /// Complete a ground call as soon as it has an unconditional
    /// answer: a ground variant cannot have a second one.
    pub early_completion: bool,

    /// Record IDG edges on every call so tables can be invalidated and
    /// re-evaluated incrementally.
    pub incremental: bool,

    /// Maximum nesting of fresh tabled calls in the reference
    /// evaluator before it reports `Overflow`.
    pub overflow_depth: usize,

    /// Member capacity reserved for a freshly allocated cluster.
    pub cluster_capacity: usize,
}

impl Default for TablingConfig {
    fn default() -> Self {
        TablingConfig {
            early_completion: true,
            incremental: true,
            overflow_depth: 256,
            cluster_capacity: 8,
        }
    }
}
