//! Per-tick merge of replica step data into one global batch.
//!
//! A backend that auto-resets conflates "the episode that just ended"
//! with "the episode that just began" under the same local agent slot:
//! the agent is terminal this tick and simultaneously reappears as a
//! fresh decision agent. Overwriting either side with the other loses
//! the bootstrap target or the next action's input, so reconciliation
//! splits every replica's tick into three disjoint categories —
//! decision-only, terminal-only, and both — and writes each with its
//! own rules.

use std::error::Error;
use std::fmt;

use indexmap::IndexMap;

use drover_backend::ReplicaStep;
use drover_core::{BackendError, LocalAgentId, ObsError, ReplicaId};
use drover_obs::ObsAggregator;

use crate::batch::StepBatch;
use crate::index::{AgentIndexMap, IndexError};

// ── StepError ───────────────────────────────────────────────────

/// Errors that abort a tick.
///
/// None of these are retried internally, and a failed tick never
/// yields a partial [`StepBatch`] — retries belong to the transport
/// layer behind a backend, not to this deterministic core.
#[derive(Clone, Debug, PartialEq)]
pub enum StepError {
    /// A backend raised during reset or step. The replica is unusable
    /// until the next successful `reset()`.
    ReplicaFailure {
        /// Index of the failing replica.
        replica: ReplicaId,
        /// The underlying backend error.
        error: BackendError,
    },
    /// A replica referenced an agent beyond its registered count —
    /// its agent population changed outside of a reset, which would
    /// invalidate in-flight global indices.
    StructuralChange {
        /// The offending replica.
        replica: ReplicaId,
        /// Agent count registered at the last reset.
        registered: usize,
        /// Agent count the replica's output implies.
        observed: usize,
    },
    /// A registered agent appeared in neither the decision nor the
    /// terminal set of its replica's tick output.
    MissingAgentInStep {
        /// The replica that omitted the agent.
        replica: ReplicaId,
        /// The omitted agent.
        local: LocalAgentId,
    },
    /// A replica listed the same agent twice within one id set.
    DuplicateAgentInStep {
        /// The offending replica.
        replica: ReplicaId,
        /// The duplicated agent.
        local: LocalAgentId,
    },
    /// Index map inconsistency.
    Index(IndexError),
    /// Observation aggregation failed.
    Obs(ObsError),
    /// Tick-level argument validation failed (wrong action count,
    /// misaligned reward or flag arrays).
    InvalidArgument {
        /// Human-readable description of what's wrong.
        reason: String,
    },
    /// `step()` was called before the first successful `reset()`.
    NotStarted,
    /// A previous tick failed; the orchestrator refuses to step until
    /// the next successful `reset()`.
    Halted,
    /// The orchestrator has been closed.
    Closed,
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReplicaFailure { replica, error } => {
                write!(f, "replica {replica}: {error}")
            }
            Self::StructuralChange {
                replica,
                registered,
                observed,
            } => write!(
                f,
                "replica {replica}: agent count changed outside reset \
                 (registered {registered}, observed {observed})"
            ),
            Self::MissingAgentInStep { replica, local } => {
                write!(f, "replica {replica}: agent {local} missing from step output")
            }
            Self::DuplicateAgentInStep { replica, local } => {
                write!(f, "replica {replica}: agent {local} listed twice")
            }
            Self::Index(e) => write!(f, "index: {e}"),
            Self::Obs(e) => write!(f, "observation: {e}"),
            Self::InvalidArgument { reason } => write!(f, "invalid argument: {reason}"),
            Self::NotStarted => write!(f, "step called before reset"),
            Self::Halted => write!(f, "orchestrator halted by a failed tick; reset required"),
            Self::Closed => write!(f, "orchestrator is closed"),
        }
    }
}

impl Error for StepError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ReplicaFailure { error, .. } => Some(error),
            Self::Index(e) => Some(e),
            Self::Obs(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IndexError> for StepError {
    fn from(e: IndexError) -> Self {
        Self::Index(e)
    }
}

impl From<ObsError> for StepError {
    fn from(e: ObsError) -> Self {
        Self::Obs(e)
    }
}

// ── Reconciliation ──────────────────────────────────────────────

/// Merge every replica's tick output into one global [`StepBatch`].
///
/// `steps` must hold one entry per registered replica, in replica
/// order. Per replica the decision and terminal id sets are split into
/// three disjoint categories and written as:
///
/// | category      | observation        | final obs      | reward   | terminated |
/// |---------------|--------------------|----------------|----------|------------|
/// | decision-only | decision (fresh)   | —              | decision | false      |
/// | both          | decision (reborn)  | terminal       | terminal | true       |
/// | terminal-only | terminal (repeated)| —              | terminal | true       |
///
/// `truncated` is the backend's flag, passed through unchanged for
/// terminal rows and false for decision-only rows.
///
/// # Errors
///
/// Any contract violation aborts the whole tick — see [`StepError`].
/// A global index left untouched by its replica's output surfaces as
/// [`StepError::MissingAgentInStep`] rather than defaulting.
pub fn reconcile(
    index: &AgentIndexMap,
    aggregator: &ObsAggregator,
    steps: &[ReplicaStep],
) -> Result<StepBatch, StepError> {
    if steps.len() != index.replica_count() {
        return Err(StepError::InvalidArgument {
            reason: format!(
                "got step data for {} replicas, {} registered",
                steps.len(),
                index.replica_count()
            ),
        });
    }

    let mut batch = StepBatch::zeroed(index.total_agents(), aggregator.width());
    let mut touched = vec![false; index.total_agents()];

    for (r, step) in steps.iter().enumerate() {
        let replica = ReplicaId(r as u32);
        reconcile_replica(index, aggregator, replica, step, &mut batch, &mut touched)?;
    }

    if let Some(gap) = touched.iter().position(|&t| !t) {
        let (replica, local) = index.locate(drover_core::GlobalIndex(gap as u32))?;
        return Err(StepError::MissingAgentInStep { replica, local });
    }

    Ok(batch)
}

fn reconcile_replica(
    index: &AgentIndexMap,
    aggregator: &ObsAggregator,
    replica: ReplicaId,
    step: &ReplicaStep,
    batch: &mut StepBatch,
    touched: &mut [bool],
) -> Result<(), StepError> {
    check_alignment(replica, step)?;

    let registered = index.agents_in(replica);
    let decision_pos = position_map(replica, registered, &step.decision_ids)?;
    let terminal_pos = position_map(replica, registered, &step.terminal_ids)?;

    let decision_rows = aggregator.aggregate(&step.decision_obs)?;
    let terminal_rows = aggregator.aggregate(&step.terminal_obs)?;
    if decision_rows.rows() != step.decision_ids.len() {
        return Err(StepError::InvalidArgument {
            reason: format!(
                "replica {replica}: {} decision observation rows for {} decision ids",
                decision_rows.rows(),
                step.decision_ids.len()
            ),
        });
    }
    if terminal_rows.rows() != step.terminal_ids.len() {
        return Err(StepError::InvalidArgument {
            reason: format!(
                "replica {replica}: {} terminal observation rows for {} terminal ids",
                terminal_rows.rows(),
                step.terminal_ids.len()
            ),
        });
    }

    // Terminal rows first: both `common` and `terminal_only` share the
    // terminal reward, terminated flag, and truncation pass-through;
    // they differ only in which observation lands where.
    for (local, &tpos) in &terminal_pos {
        let g = index.global_of(replica, *local)?;
        touched[g.index()] = true;
        batch.rewards[g.index()] = step.terminal_rewards[tpos];
        batch.terminated[g.index()] = true;
        batch.truncated[g.index()] = step.truncated[tpos];
        match decision_pos.get(local) {
            Some(&dpos) => {
                // Auto-reset: the fresh observation is what the learner
                // acts on next; the pre-reset one is the bootstrap target.
                batch
                    .observation_row_mut(g)
                    .copy_from_slice(decision_rows.row(dpos));
                batch
                    .final_observations
                    .insert(g, terminal_rows.row(tpos).to_vec());
            }
            None => {
                // No fresh observation exists yet this tick; repeat the
                // terminal one. The row already equals the final
                // observation, so no sparse entry is stored.
                batch
                    .observation_row_mut(g)
                    .copy_from_slice(terminal_rows.row(tpos));
            }
        }
    }

    for (local, &dpos) in &decision_pos {
        if terminal_pos.contains_key(local) {
            continue;
        }
        let g = index.global_of(replica, *local)?;
        touched[g.index()] = true;
        batch
            .observation_row_mut(g)
            .copy_from_slice(decision_rows.row(dpos));
        batch.rewards[g.index()] = step.decision_rewards[dpos];
    }

    Ok(())
}

/// Insertion-ordered id -> row-position map with duplicate and
/// structural-change detection.
fn position_map(
    replica: ReplicaId,
    registered: usize,
    ids: &[LocalAgentId],
) -> Result<IndexMap<LocalAgentId, usize>, StepError> {
    let mut map = IndexMap::with_capacity(ids.len());
    for (pos, id) in ids.iter().enumerate() {
        if id.0 as usize >= registered {
            return Err(StepError::StructuralChange {
                replica,
                registered,
                observed: id.0 as usize + 1,
            });
        }
        if map.insert(*id, pos).is_some() {
            return Err(StepError::DuplicateAgentInStep {
                replica,
                local: *id,
            });
        }
    }
    Ok(map)
}

fn check_alignment(replica: ReplicaId, step: &ReplicaStep) -> Result<(), StepError> {
    if step.decision_rewards.len() != step.decision_ids.len() {
        return Err(StepError::InvalidArgument {
            reason: format!(
                "replica {replica}: {} decision rewards for {} decision ids",
                step.decision_rewards.len(),
                step.decision_ids.len()
            ),
        });
    }
    if step.terminal_rewards.len() != step.terminal_ids.len() {
        return Err(StepError::InvalidArgument {
            reason: format!(
                "replica {replica}: {} terminal rewards for {} terminal ids",
                step.terminal_rewards.len(),
                step.terminal_ids.len()
            ),
        });
    }
    if step.truncated.len() != step.terminal_ids.len() {
        return Err(StepError::InvalidArgument {
            reason: format!(
                "replica {replica}: {} truncation flags for {} terminal ids",
                step.truncated.len(),
                step.terminal_ids.len()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_core::GlobalIndex;
    use drover_space::{SpaceDescriptor, Value};
    use smallvec::smallvec;

    fn scalar_space() -> SpaceDescriptor {
        SpaceDescriptor::Continuous {
            low: -100.0,
            high: 100.0,
            shape: smallvec![1],
        }
    }

    fn ids(raw: &[u32]) -> Vec<LocalAgentId> {
        raw.iter().map(|&i| LocalAgentId(i)).collect()
    }

    /// Single-component scalar observation column from raw values.
    fn obs(values: &[f32]) -> Vec<Vec<Value>> {
        vec![values.iter().map(|&v| Value::Continuous(vec![v])).collect()]
    }

    fn map(counts: &[usize]) -> AgentIndexMap {
        let mut m = AgentIndexMap::new();
        m.rebuild(counts).unwrap();
        m
    }

    fn agg() -> ObsAggregator {
        ObsAggregator::new(&scalar_space()).unwrap()
    }

    fn step(
        decision: (&[u32], &[f32], &[f32]),
        terminal: (&[u32], &[f32], &[f32], &[bool]),
    ) -> ReplicaStep {
        ReplicaStep {
            decision_ids: ids(decision.0),
            decision_obs: obs(decision.1),
            decision_rewards: decision.2.to_vec(),
            terminal_ids: ids(terminal.0),
            terminal_obs: obs(terminal.1),
            terminal_rewards: terminal.2.to_vec(),
            truncated: terminal.3.to_vec(),
        }
    }

    // ── category semantics ──────────────────────────────────────

    #[test]
    fn decision_only_row() {
        let index = map(&[1]);
        let steps = vec![step((&[0], &[1.5], &[0.25]), (&[], &[], &[], &[]))];
        let batch = reconcile(&index, &agg(), &steps).unwrap();

        let g = GlobalIndex(0);
        assert_eq!(batch.observation(g), &[1.5]);
        assert_eq!(batch.reward(g), 0.25);
        assert!(!batch.is_terminated(g));
        assert!(!batch.is_truncated(g));
        assert!(batch.final_observation(g).is_none());
    }

    #[test]
    fn terminal_only_repeats_terminal_observation() {
        let index = map(&[1]);
        let steps = vec![step((&[], &[], &[]), (&[0], &[-3.0], &[2.0], &[false]))];
        let batch = reconcile(&index, &agg(), &steps).unwrap();

        let g = GlobalIndex(0);
        assert_eq!(batch.observation(g), &[-3.0]);
        assert_eq!(batch.reward(g), 2.0);
        assert!(batch.is_terminated(g));
        // The row already equals the terminal observation; no duplicate
        // sparse entry.
        assert!(batch.final_observation(g).is_none());
    }

    #[test]
    fn common_keeps_both_observations() {
        let index = map(&[1]);
        // Agent 0 terminates (obs 9.0, reward 5.0) and is reborn with
        // fresh obs 0.5 in the same tick.
        let steps = vec![step(
            (&[0], &[0.5], &[0.0]),
            (&[0], &[9.0], &[5.0], &[false]),
        )];
        let batch = reconcile(&index, &agg(), &steps).unwrap();

        let g = GlobalIndex(0);
        assert_eq!(batch.observation(g), &[0.5], "fresh post-reset observation");
        assert_eq!(
            batch.final_observation(g),
            Some(&[9.0][..]),
            "pre-reset observation preserved for bootstrapping"
        );
        assert_eq!(batch.reward(g), 5.0, "terminal reward wins");
        assert!(batch.is_terminated(g));
        assert!(!batch.is_truncated(g));
    }

    #[test]
    fn truncation_flag_passes_through() {
        let index = map(&[2]);
        let steps = vec![step(
            (&[0], &[0.0], &[0.0]),
            (&[0, 1], &[1.0, 2.0], &[0.0, 0.0], &[true, false]),
        )];
        let batch = reconcile(&index, &agg(), &steps).unwrap();

        assert!(batch.is_truncated(GlobalIndex(0)));
        assert!(batch.is_terminated(GlobalIndex(0)));
        assert!(!batch.is_truncated(GlobalIndex(1)));

        // Agent 1 is terminal-only; it must not receive an action this
        // tick, and its row repeats the terminal observation.
        assert_eq!(batch.observation(GlobalIndex(1)), &[2.0]);
    }

    #[test]
    fn multi_replica_union_is_replica_major() {
        let index = map(&[2, 1]);
        let steps = vec![
            step((&[0], &[10.0], &[1.0]), (&[1], &[11.0], &[-1.0], &[false])),
            step((&[0], &[20.0], &[0.5]), (&[0], &[21.0], &[3.0], &[false])),
        ];
        let batch = reconcile(&index, &agg(), &steps).unwrap();

        assert_eq!(batch.observation(GlobalIndex(0)), &[10.0]);
        assert_eq!(batch.observation(GlobalIndex(1)), &[11.0]);
        assert_eq!(batch.observation(GlobalIndex(2)), &[20.0]);
        assert_eq!(batch.final_observation(GlobalIndex(2)), Some(&[21.0][..]));
        assert_eq!(batch.rewards(), &[1.0, -1.0, 3.0]);
        assert_eq!(batch.terminated(), &[false, true, true]);
    }

    #[test]
    fn zero_decision_agents_on_a_tick_is_fine() {
        let index = map(&[1]);
        let steps = vec![step((&[], &[], &[]), (&[0], &[4.0], &[1.0], &[false]))];
        assert!(reconcile(&index, &agg(), &steps).is_ok());
    }

    // ── contract violations ─────────────────────────────────────

    #[test]
    fn missing_agent_surfaces_with_replica_and_local() {
        let index = map(&[2]);
        // Agent 1 appears nowhere.
        let steps = vec![step((&[0], &[0.0], &[0.0]), (&[], &[], &[], &[]))];
        let err = reconcile(&index, &agg(), &steps).unwrap_err();
        assert_eq!(
            err,
            StepError::MissingAgentInStep {
                replica: ReplicaId(0),
                local: LocalAgentId(1)
            }
        );
    }

    #[test]
    fn out_of_range_id_is_structural_change() {
        let index = map(&[1]);
        let steps = vec![step(
            (&[0, 1], &[0.0, 0.0], &[0.0, 0.0]),
            (&[], &[], &[], &[]),
        )];
        let err = reconcile(&index, &agg(), &steps).unwrap_err();
        assert_eq!(
            err,
            StepError::StructuralChange {
                replica: ReplicaId(0),
                registered: 1,
                observed: 2
            }
        );
    }

    #[test]
    fn duplicate_id_rejected() {
        let index = map(&[2]);
        let steps = vec![step(
            (&[0, 0], &[0.0, 0.0], &[0.0, 0.0]),
            (&[1], &[0.0], &[0.0], &[false]),
        )];
        let err = reconcile(&index, &agg(), &steps).unwrap_err();
        assert_eq!(
            err,
            StepError::DuplicateAgentInStep {
                replica: ReplicaId(0),
                local: LocalAgentId(0)
            }
        );
    }

    #[test]
    fn misaligned_rewards_rejected() {
        let index = map(&[1]);
        let steps = vec![step((&[0], &[0.0], &[]), (&[], &[], &[], &[]))];
        assert!(matches!(
            reconcile(&index, &agg(), &steps),
            Err(StepError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn misaligned_truncation_flags_rejected() {
        let index = map(&[1]);
        let steps = vec![step((&[], &[], &[]), (&[0], &[0.0], &[0.0], &[]))];
        assert!(matches!(
            reconcile(&index, &agg(), &steps),
            Err(StepError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn wrong_replica_count_rejected() {
        let index = map(&[1, 1]);
        let steps = vec![step((&[0], &[0.0], &[0.0]), (&[], &[], &[], &[]))];
        assert!(matches!(
            reconcile(&index, &agg(), &steps),
            Err(StepError::InvalidArgument { .. })
        ));
    }

    // ── properties ──────────────────────────────────────────────

    use proptest::prelude::*;

    #[derive(Clone, Copy, Debug)]
    enum Category {
        DecisionOnly,
        TerminalOnly,
        Both,
    }

    fn arb_categories() -> impl Strategy<Value = Vec<Category>> {
        proptest::collection::vec(
            prop_oneof![
                Just(Category::DecisionOnly),
                Just(Category::TerminalOnly),
                Just(Category::Both),
            ],
            1..12,
        )
    }

    proptest! {
        /// Every agent lands in exactly one category, with the final
        /// observation present iff the agent is in `Both`.
        #[test]
        fn categories_partition_and_final_obs_invariant(cats in arb_categories()) {
            let n = cats.len();
            let index = map(&[n]);

            let mut decision = (vec![], vec![], vec![]);
            let mut terminal = (vec![], vec![], vec![], vec![]);
            for (a, cat) in cats.iter().enumerate() {
                let fresh = a as f32;
                let last = 1000.0 + a as f32;
                match cat {
                    Category::DecisionOnly => {
                        decision.0.push(a as u32);
                        decision.1.push(fresh);
                        decision.2.push(0.1);
                    }
                    Category::TerminalOnly => {
                        terminal.0.push(a as u32);
                        terminal.1.push(last);
                        terminal.2.push(1.0);
                        terminal.3.push(false);
                    }
                    Category::Both => {
                        decision.0.push(a as u32);
                        decision.1.push(fresh);
                        decision.2.push(0.0);
                        terminal.0.push(a as u32);
                        terminal.1.push(last);
                        terminal.2.push(1.0);
                        terminal.3.push(false);
                    }
                }
            }

            let steps = vec![step(
                (&decision.0, &decision.1, &decision.2),
                (&terminal.0, &terminal.1, &terminal.2, &terminal.3),
            )];
            let batch = reconcile(&index, &agg(), &steps).unwrap();

            for (a, cat) in cats.iter().enumerate() {
                let g = GlobalIndex(a as u32);
                let fresh = a as f32;
                let last = 1000.0 + a as f32;
                match cat {
                    Category::DecisionOnly => {
                        prop_assert!(!batch.is_terminated(g));
                        prop_assert!(batch.final_observation(g).is_none());
                        prop_assert_eq!(batch.observation(g), &[fresh]);
                    }
                    Category::TerminalOnly => {
                        prop_assert!(batch.is_terminated(g));
                        prop_assert!(batch.final_observation(g).is_none());
                        prop_assert_eq!(batch.observation(g), &[last]);
                    }
                    Category::Both => {
                        prop_assert!(batch.is_terminated(g));
                        prop_assert_eq!(batch.final_observation(g), Some(&[last][..]));
                        prop_assert_eq!(batch.observation(g), &[fresh]);
                    }
                }
            }
        }
    }
}
