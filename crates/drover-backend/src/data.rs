//! Data types exchanged across the Backend Contract.

use drover_core::LocalAgentId;
use drover_space::Value;

/// Component-major observation columns: `columns[c][a]` is component
/// `c` of the a-th agent in the accompanying id list.
///
/// Backends report one column per observation-space component; the
/// engine's aggregator is the single place these are flattened.
pub type ObsColumns = Vec<Vec<Value>>;

/// Result of a backend reset.
///
/// Every hosted agent starts a fresh episode: `decision_ids` must
/// cover `0..agent_count` (each agent needs an action on the first
/// tick), and `decision_obs` columns are aligned with `decision_ids`.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplicaReset {
    /// Number of agents this replica hosts until its next reset.
    pub agent_count: usize,
    /// Agents awaiting their first action.
    pub decision_ids: Vec<LocalAgentId>,
    /// Component-major initial observations, aligned with `decision_ids`.
    pub decision_obs: ObsColumns,
}

/// Result of one backend step.
///
/// `decision_ids` and `terminal_ids` may overlap: an agent whose
/// episode ended this tick and which the backend immediately reset
/// appears in both, with its fresh observation in the decision columns
/// and its pre-reset terminal observation in the terminal columns.
/// They may also be disjoint — an agent that is terminal-only this
/// tick reappears as a decision agent on a later tick.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplicaStep {
    /// Agents that need an action for the next tick.
    pub decision_ids: Vec<LocalAgentId>,
    /// Component-major observations, aligned with `decision_ids`.
    pub decision_obs: ObsColumns,
    /// Per-decision-agent step rewards, aligned with `decision_ids`.
    pub decision_rewards: Vec<f32>,
    /// Agents whose episode ended this tick.
    pub terminal_ids: Vec<LocalAgentId>,
    /// Component-major final observations, aligned with `terminal_ids`.
    pub terminal_obs: ObsColumns,
    /// End-of-episode rewards, aligned with `terminal_ids`.
    pub terminal_rewards: Vec<f32>,
    /// Truncation flags, aligned with `terminal_ids`. Backends without
    /// a truncation signal report `false` throughout.
    pub truncated: Vec<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_data_is_plain_and_cloneable() {
        let step = ReplicaStep {
            decision_ids: vec![LocalAgentId(0)],
            decision_obs: vec![vec![Value::Discrete(1)]],
            decision_rewards: vec![0.5],
            terminal_ids: vec![],
            terminal_obs: vec![vec![]],
            terminal_rewards: vec![],
            truncated: vec![],
        };
        assert_eq!(step.clone(), step);
    }
}
