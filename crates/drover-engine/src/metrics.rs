//! Per-tick metrics for the orchestrator.
//!
//! [`StepMetrics`] captures timing and agent-category counts for a
//! single tick. The orchestrator populates them after each `step()`
//! call; consumers read them via `last_metrics()`.

/// Timing and category counts collected during a single tick.
///
/// All durations are in microseconds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepMetrics {
    /// Wall-clock time for the entire tick, in microseconds.
    pub total_us: u64,
    /// Time spent dispatching actions and collecting replica results,
    /// in microseconds.
    pub dispatch_us: u64,
    /// Time spent reconciling replica results into the batch, in
    /// microseconds.
    pub reconcile_us: u64,
    /// Agents needing an action next tick (decision-only plus reborn).
    pub decision_agents: usize,
    /// Agents whose episode ended this tick (terminal-only plus reborn).
    pub terminal_agents: usize,
    /// Agents that terminated and were reborn in the same tick.
    pub autoreset_agents: usize,
    /// Cumulative count of ticks aborted by an error since the last
    /// successful reset.
    pub failed_ticks: u64,
}
