//! The reference two-replica reconciliation scenario.
//!
//! Replica 0 hosts agents {0, 1}; replica 1 hosts agent {0}. On one
//! tick replica 0 reports disjoint decision/terminal sets while
//! replica 1 reports an overlapping (auto-reset) pair, exercising all
//! three reconciliation categories at once.

use drover_backend::{Backend, ReplicaStep};
use drover_core::{BackendError, GlobalIndex, LocalAgentId, ReplicaId};
use drover_engine::{Execution, OrchestratorConfig, ReplicaOrchestrator};
use drover_space::Value;
use drover_test_utils::{scalar_obs, zero_actions, ScriptedBackend};

fn replica0_step() -> ReplicaStep {
    // Agent 0 keeps going; agent 1 ends its episode with no reborn
    // entry this tick.
    ReplicaStep {
        decision_ids: vec![LocalAgentId(0)],
        decision_obs: scalar_obs(&[5.0]),
        decision_rewards: vec![0.5],
        terminal_ids: vec![LocalAgentId(1)],
        terminal_obs: scalar_obs(&[7.0]),
        terminal_rewards: vec![2.0],
        truncated: vec![false],
    }
}

fn replica1_step() -> ReplicaStep {
    // Agent 0 terminates and is immediately reborn: terminal
    // observation 9.0, fresh post-reset observation 0.25.
    ReplicaStep {
        decision_ids: vec![LocalAgentId(0)],
        decision_obs: scalar_obs(&[0.25]),
        decision_rewards: vec![0.0],
        terminal_ids: vec![LocalAgentId(0)],
        terminal_obs: scalar_obs(&[9.0]),
        terminal_rewards: vec![3.0],
        truncated: vec![false],
    }
}

fn scenario_orchestrator() -> ReplicaOrchestrator {
    let factory = |replica: ReplicaId| -> Result<Box<dyn Backend>, BackendError> {
        Ok(match replica.0 {
            0 => Box::new(ScriptedBackend::new(
                2,
                vec![1.0, 2.0],
                vec![replica0_step()],
            )),
            _ => Box::new(ScriptedBackend::new(1, vec![3.0], vec![replica1_step()])),
        })
    };
    ReplicaOrchestrator::new(OrchestratorConfig {
        factory: Box::new(factory),
        num_replicas: 2,
        execution: Execution::Sequential,
    })
    .unwrap()
}

#[test]
fn global_map_is_replica_major() {
    let mut orch = scenario_orchestrator();
    let batch = orch.reset(None).unwrap();

    assert_eq!(orch.total_agents(), 3);
    assert_eq!(batch.total_agents(), 3);

    // (0,0)->0, (0,1)->1, (1,0)->2: initial observations line up
    // replica-major.
    assert_eq!(batch.observation(GlobalIndex(0)), &[1.0]);
    assert_eq!(batch.observation(GlobalIndex(1)), &[2.0]);
    assert_eq!(batch.observation(GlobalIndex(2)), &[3.0]);
}

#[test]
fn initial_batch_has_no_terminations() {
    let mut orch = scenario_orchestrator();
    let batch = orch.reset(None).unwrap();

    assert!(batch.rewards().iter().all(|&r| r == 0.0));
    assert!(!batch.terminated().iter().any(|&t| t));
    assert!(!batch.truncated().iter().any(|&t| t));
    assert_eq!(batch.final_observations().count(), 0);
}

#[test]
fn three_categories_in_one_tick() {
    let mut orch = scenario_orchestrator();
    orch.reset(None).unwrap();

    let batch = orch.step(&zero_actions(3)).unwrap();

    // Global 0: decision-only.
    let g0 = GlobalIndex(0);
    assert_eq!(batch.observation(g0), &[5.0]);
    assert_eq!(batch.reward(g0), 0.5);
    assert!(!batch.is_terminated(g0));
    assert!(batch.final_observation(g0).is_none());

    // Global 1: terminal-only — terminated, no final observation
    // (its row already repeats the terminal observation).
    let g1 = GlobalIndex(1);
    assert_eq!(batch.observation(g1), &[7.0]);
    assert_eq!(batch.reward(g1), 2.0);
    assert!(batch.is_terminated(g1));
    assert!(!batch.is_truncated(g1));
    assert!(batch.final_observation(g1).is_none());

    // Global 2: terminal and reborn — fresh observation in the row,
    // terminal observation preserved for bootstrapping.
    let g2 = GlobalIndex(2);
    assert_eq!(batch.observation(g2), &[0.25]);
    assert_eq!(batch.reward(g2), 3.0);
    assert!(batch.is_terminated(g2));
    assert_eq!(batch.final_observation(g2), Some(&[9.0][..]));
}

#[test]
fn tick_metrics_count_categories() {
    let mut orch = scenario_orchestrator();
    orch.reset(None).unwrap();
    orch.step(&zero_actions(3)).unwrap();

    let metrics = orch.last_metrics();
    assert_eq!(metrics.decision_agents, 2); // replica 0 agent 0 + reborn
    assert_eq!(metrics.terminal_agents, 2); // replica 0 agent 1 + replica 1 agent 0
    assert_eq!(metrics.autoreset_agents, 1); // replica 1 agent 0
    assert_eq!(metrics.failed_ticks, 0);
}

#[test]
fn terminal_only_agent_gets_no_action_next_tick() {
    // After the scenario tick, replica 0's decision set is [0] and
    // replica 1's is [0]: global index 1 must not be dispatched. The
    // scripted backends have exhausted their scripts, so a second step
    // fails — but the dispatched id sets are what this test pins down
    // via the backend contract check inside ScriptedBackend (which
    // ignores ids) and the action slicing logic (which would error on
    // an unknown agent).
    let mut orch = scenario_orchestrator();
    orch.reset(None).unwrap();
    orch.step(&zero_actions(3)).unwrap();

    // The learner still supplies a full global action array; the
    // orchestrator slices out only decision agents.
    let err = orch.step(&zero_actions(3)).unwrap_err();
    // Script exhausted: the failure is a wrapped replica failure, not
    // an indexing error from dispatching to a terminal-only agent.
    assert!(matches!(
        err,
        drover_engine::StepError::ReplicaFailure { .. }
    ));
}

#[test]
fn wrong_action_count_is_rejected_atomically() {
    let mut orch = scenario_orchestrator();
    orch.reset(None).unwrap();

    let err = orch
        .step(&[Value::Discrete(0), Value::Discrete(0)])
        .unwrap_err();
    assert!(matches!(
        err,
        drover_engine::StepError::InvalidArgument { .. }
    ));
    assert!(orch.is_halted());
}
