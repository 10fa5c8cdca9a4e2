//! Test utilities and mock backends for Drover development.
//!
//! Provides deterministic [`Backend`] implementations for exercising
//! the engine: [`CountdownBackend`] (seeded episode lengths with
//! desynchronized terminations), [`ScriptedBackend`] (exact per-tick
//! scenarios), and a set of contract violators for error-path tests.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::collections::VecDeque;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use smallvec::smallvec;

use drover_backend::{Backend, ObsColumns, ReplicaReset, ReplicaStep};
use drover_core::{BackendError, LocalAgentId};
use drover_space::{SpaceDescriptor, Value};

// ── Shared helpers ──────────────────────────────────────────────

/// A one-component scalar observation space.
pub fn scalar_obs_space() -> SpaceDescriptor {
    SpaceDescriptor::Continuous {
        low: -1.0e9,
        high: 1.0e9,
        shape: smallvec![1],
    }
}

/// Single-column scalar observations, one value per agent.
pub fn scalar_obs(values: &[f32]) -> ObsColumns {
    vec![values.iter().map(|&v| Value::Continuous(vec![v])).collect()]
}

/// A batch of `Discrete(0)` actions, one per agent.
pub fn zero_actions(agent_count: usize) -> Vec<Value> {
    vec![Value::Discrete(0); agent_count]
}

fn failure(reason: impl Into<String>) -> BackendError {
    BackendError::Failure {
        reason: reason.into(),
    }
}

// ── CountdownBackend ────────────────────────────────────────────

/// Configuration for [`CountdownBackend`].
#[derive(Clone, Debug)]
pub struct CountdownConfig {
    /// Agents hosted by the replica.
    pub agent_count: usize,
    /// Shortest episode length, in ticks.
    pub min_len: u64,
    /// Longest episode length, in ticks (inclusive).
    pub max_len: u64,
    /// Terminal agents restart in the same tick (appearing in both the
    /// terminal and decision sets) when true; otherwise they rest one
    /// tick and reappear as decision agents on the next.
    pub auto_reset: bool,
    /// Report every episode end as truncated rather than terminated
    /// naturally.
    pub truncated_episodes: bool,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            agent_count: 2,
            min_len: 2,
            max_len: 5,
            auto_reset: true,
            truncated_episodes: false,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct AgentState {
    remaining: u64,
    resting: bool,
}

/// A deterministic multi-agent backend with per-agent episode lengths.
///
/// Episode lengths are drawn from a ChaCha8 RNG seeded at reset, so
/// agents terminate on different ticks and the same seed replays the
/// same termination schedule. Observations are two-component
/// (a continuous `[agent, remaining]` pair and the agent id as a
/// discrete category) to exercise multi-component aggregation.
///
/// The backend verifies its side of the contract: `step` must receive
/// exactly the decision ids from its previous return, with one valid
/// action per id.
pub struct CountdownBackend {
    config: CountdownConfig,
    obs_space: SpaceDescriptor,
    action_space: SpaceDescriptor,
    rng: ChaCha8Rng,
    agents: Vec<AgentState>,
    expected_decision: Vec<LocalAgentId>,
}

impl CountdownBackend {
    pub fn new(config: CountdownConfig) -> Self {
        assert!(config.agent_count > 0, "CountdownBackend needs agents");
        assert!(config.min_len >= 1 && config.min_len <= config.max_len);
        let obs_space = SpaceDescriptor::Composite {
            children: vec![
                SpaceDescriptor::Continuous {
                    low: 0.0,
                    high: 1.0e9,
                    shape: smallvec![2],
                },
                SpaceDescriptor::Discrete {
                    n: config.agent_count as u32,
                },
            ],
        };
        Self {
            config,
            obs_space,
            action_space: SpaceDescriptor::Discrete { n: 3 },
            rng: ChaCha8Rng::seed_from_u64(0),
            agents: Vec::new(),
            expected_decision: Vec::new(),
        }
    }

    /// A factory producing one identically-configured backend per
    /// replica.
    pub fn factory(
        config: CountdownConfig,
    ) -> impl Fn(drover_core::ReplicaId) -> Result<Box<dyn Backend>, BackendError> {
        move |_| Ok(Box::new(CountdownBackend::new(config.clone())) as Box<dyn Backend>)
    }

    fn draw_len(&mut self) -> u64 {
        self.rng
            .random_range(self.config.min_len..=self.config.max_len)
    }

    fn obs_of(&self, agent: usize) -> Vec<Value> {
        vec![
            Value::Continuous(vec![agent as f32, self.agents[agent].remaining as f32]),
            Value::Discrete(agent as i64),
        ]
    }

    /// Component-major columns for the listed agents.
    fn columns_for(&self, ids: &[LocalAgentId]) -> ObsColumns {
        let mut columns = vec![Vec::with_capacity(ids.len()), Vec::with_capacity(ids.len())];
        for id in ids {
            let obs = self.obs_of(id.0 as usize);
            let mut obs = obs.into_iter();
            columns[0].push(obs.next().expect("two components"));
            columns[1].push(obs.next().expect("two components"));
        }
        columns
    }
}

impl Backend for CountdownBackend {
    fn reset(&mut self, seed: Option<u64>) -> Result<ReplicaReset, BackendError> {
        self.rng = ChaCha8Rng::seed_from_u64(seed.unwrap_or(0));
        self.agents = (0..self.config.agent_count)
            .map(|_| AgentState {
                remaining: 0,
                resting: false,
            })
            .collect();
        for a in 0..self.config.agent_count {
            self.agents[a].remaining = self.draw_len();
        }
        let ids: Vec<LocalAgentId> = (0..self.config.agent_count)
            .map(|a| LocalAgentId(a as u32))
            .collect();
        self.expected_decision = ids.clone();
        Ok(ReplicaReset {
            agent_count: self.config.agent_count,
            decision_obs: self.columns_for(&ids),
            decision_ids: ids,
        })
    }

    fn step(
        &mut self,
        decision_ids: &[LocalAgentId],
        actions: &[Value],
    ) -> Result<ReplicaStep, BackendError> {
        if decision_ids != self.expected_decision.as_slice() {
            return Err(failure(format!(
                "got actions for {decision_ids:?}, expected {:?}",
                self.expected_decision
            )));
        }
        if actions.len() != decision_ids.len() {
            return Err(failure("action count does not match decision ids"));
        }
        for action in actions {
            if !self.action_space.validate(action) {
                return Err(failure(format!(
                    "action {action} does not fit {}",
                    self.action_space
                )));
            }
        }

        let mut decision_ids_out = Vec::new();
        let mut decision_rewards = Vec::new();
        let mut terminal_ids = Vec::new();
        let mut terminal_rewards = Vec::new();
        let mut truncated = Vec::new();

        // Terminal observations must be captured before an auto-reset
        // overwrites the agent state, so collect them eagerly.
        let mut terminal_columns: ObsColumns = vec![Vec::new(), Vec::new()];

        for a in 0..self.config.agent_count {
            let id = LocalAgentId(a as u32);
            if self.agents[a].resting {
                // Rested one tick after a non-auto-reset episode end;
                // rejoin the decision set with a fresh episode.
                self.agents[a].resting = false;
                self.agents[a].remaining = self.draw_len();
                decision_ids_out.push(id);
                decision_rewards.push(0.0);
                continue;
            }

            self.agents[a].remaining -= 1;
            if self.agents[a].remaining == 0 {
                terminal_ids.push(id);
                let obs = self.obs_of(a);
                terminal_columns[0].push(obs[0].clone());
                terminal_columns[1].push(obs[1].clone());
                terminal_rewards.push(1.0);
                truncated.push(self.config.truncated_episodes);
                if self.config.auto_reset {
                    self.agents[a].remaining = self.draw_len();
                    decision_ids_out.push(id);
                    decision_rewards.push(0.0);
                } else {
                    self.agents[a].resting = true;
                }
            } else {
                decision_ids_out.push(id);
                decision_rewards.push(0.1);
            }
        }

        let decision_obs = self.columns_for(&decision_ids_out);
        self.expected_decision = decision_ids_out.clone();

        Ok(ReplicaStep {
            decision_ids: decision_ids_out,
            decision_obs,
            decision_rewards,
            terminal_ids,
            terminal_obs: terminal_columns,
            terminal_rewards,
            truncated,
        })
    }

    fn observation_space(&self) -> &SpaceDescriptor {
        &self.obs_space
    }

    fn action_space(&self) -> &SpaceDescriptor {
        &self.action_space
    }

    fn close(&mut self) {}
}

// ── ScriptedBackend ─────────────────────────────────────────────

/// Replays an exact per-tick script of [`ReplicaStep`]s.
///
/// `reset` reports `agent_count` agents, all decision, with the given
/// initial scalar observations; each `step` pops the next scripted
/// entry. Stepping past the end of the script is a backend failure.
pub struct ScriptedBackend {
    agent_count: usize,
    initial_obs: Vec<f32>,
    script: VecDeque<ReplicaStep>,
    obs_space: SpaceDescriptor,
    action_space: SpaceDescriptor,
}

impl ScriptedBackend {
    pub fn new(agent_count: usize, initial_obs: Vec<f32>, script: Vec<ReplicaStep>) -> Self {
        assert_eq!(initial_obs.len(), agent_count);
        Self {
            agent_count,
            initial_obs,
            script: script.into(),
            obs_space: scalar_obs_space(),
            action_space: SpaceDescriptor::Discrete { n: 2 },
        }
    }
}

impl Backend for ScriptedBackend {
    fn reset(&mut self, _seed: Option<u64>) -> Result<ReplicaReset, BackendError> {
        Ok(ReplicaReset {
            agent_count: self.agent_count,
            decision_ids: (0..self.agent_count)
                .map(|a| LocalAgentId(a as u32))
                .collect(),
            decision_obs: scalar_obs(&self.initial_obs),
        })
    }

    fn step(
        &mut self,
        _decision_ids: &[LocalAgentId],
        _actions: &[Value],
    ) -> Result<ReplicaStep, BackendError> {
        self.script
            .pop_front()
            .ok_or_else(|| failure("scripted backend ran out of steps"))
    }

    fn observation_space(&self) -> &SpaceDescriptor {
        &self.obs_space
    }

    fn action_space(&self) -> &SpaceDescriptor {
        &self.action_space
    }

    fn close(&mut self) {}
}

// ── FailingBackend ──────────────────────────────────────────────

/// Fails on reset, or after a configured number of successful steps.
///
/// Hosts one never-terminating agent with scalar observations.
pub struct FailingBackend {
    fail_on_reset: bool,
    fail_after_steps: Option<u64>,
    steps: u64,
    obs_space: SpaceDescriptor,
    action_space: SpaceDescriptor,
}

impl FailingBackend {
    pub fn fail_on_reset() -> Self {
        Self::new(true, None)
    }

    pub fn fail_after(steps: u64) -> Self {
        Self::new(false, Some(steps))
    }

    fn new(fail_on_reset: bool, fail_after_steps: Option<u64>) -> Self {
        Self {
            fail_on_reset,
            fail_after_steps,
            steps: 0,
            obs_space: scalar_obs_space(),
            action_space: SpaceDescriptor::Discrete { n: 2 },
        }
    }
}

impl Backend for FailingBackend {
    fn reset(&mut self, _seed: Option<u64>) -> Result<ReplicaReset, BackendError> {
        if self.fail_on_reset {
            return Err(failure("injected reset failure"));
        }
        self.steps = 0;
        Ok(ReplicaReset {
            agent_count: 1,
            decision_ids: vec![LocalAgentId(0)],
            decision_obs: scalar_obs(&[0.0]),
        })
    }

    fn step(
        &mut self,
        _decision_ids: &[LocalAgentId],
        _actions: &[Value],
    ) -> Result<ReplicaStep, BackendError> {
        if let Some(limit) = self.fail_after_steps {
            if self.steps >= limit {
                return Err(failure("injected step failure"));
            }
        }
        self.steps += 1;
        Ok(ReplicaStep {
            decision_ids: vec![LocalAgentId(0)],
            decision_obs: scalar_obs(&[self.steps as f32]),
            decision_rewards: vec![0.0],
            terminal_ids: vec![],
            terminal_obs: scalar_obs(&[]),
            terminal_rewards: vec![],
            truncated: vec![],
        })
    }

    fn observation_space(&self) -> &SpaceDescriptor {
        &self.obs_space
    }

    fn action_space(&self) -> &SpaceDescriptor {
        &self.action_space
    }

    fn close(&mut self) {}
}

// ── MisreportingBackend ─────────────────────────────────────────

/// Which contract violation [`MisreportingBackend`] commits on step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Misreport {
    /// Drop the last agent from the output entirely.
    OmitLastAgent,
    /// List the first agent twice in the decision set.
    DuplicateFirstAgent,
    /// Reference an agent id beyond the registered count.
    PhantomAgent,
}

/// A backend that resets honestly but violates the step contract.
pub struct MisreportingBackend {
    agent_count: usize,
    mode: Misreport,
    obs_space: SpaceDescriptor,
    action_space: SpaceDescriptor,
}

impl MisreportingBackend {
    pub fn new(agent_count: usize, mode: Misreport) -> Self {
        assert!(agent_count > 0);
        Self {
            agent_count,
            mode,
            obs_space: scalar_obs_space(),
            action_space: SpaceDescriptor::Discrete { n: 2 },
        }
    }
}

impl Backend for MisreportingBackend {
    fn reset(&mut self, _seed: Option<u64>) -> Result<ReplicaReset, BackendError> {
        Ok(ReplicaReset {
            agent_count: self.agent_count,
            decision_ids: (0..self.agent_count)
                .map(|a| LocalAgentId(a as u32))
                .collect(),
            decision_obs: scalar_obs(&vec![0.0; self.agent_count]),
        })
    }

    fn step(
        &mut self,
        _decision_ids: &[LocalAgentId],
        _actions: &[Value],
    ) -> Result<ReplicaStep, BackendError> {
        let mut ids: Vec<LocalAgentId> = (0..self.agent_count)
            .map(|a| LocalAgentId(a as u32))
            .collect();
        match self.mode {
            Misreport::OmitLastAgent => {
                ids.pop();
            }
            Misreport::DuplicateFirstAgent => {
                ids.push(LocalAgentId(0));
            }
            Misreport::PhantomAgent => {
                ids.push(LocalAgentId(self.agent_count as u32));
            }
        }
        let obs: Vec<f32> = (0..ids.len()).map(|i| i as f32).collect();
        Ok(ReplicaStep {
            decision_rewards: vec![0.0; ids.len()],
            decision_obs: scalar_obs(&obs),
            decision_ids: ids,
            terminal_ids: vec![],
            terminal_obs: scalar_obs(&[]),
            terminal_rewards: vec![],
            truncated: vec![],
        })
    }

    fn observation_space(&self) -> &SpaceDescriptor {
        &self.obs_space
    }

    fn action_space(&self) -> &SpaceDescriptor {
        &self.action_space
    }

    fn close(&mut self) {}
}

// ── SpaceShiftingBackend ────────────────────────────────────────

/// Reports a different observation space after a configured number of
/// resets — the mid-training space change the engine must reject.
pub struct SpaceShiftingBackend {
    resets: u32,
    shift_after: u32,
    obs_space: SpaceDescriptor,
    action_space: SpaceDescriptor,
}

impl SpaceShiftingBackend {
    pub fn shift_after(resets: u32) -> Self {
        Self {
            resets: 0,
            shift_after: resets,
            obs_space: scalar_obs_space(),
            action_space: SpaceDescriptor::Discrete { n: 2 },
        }
    }
}

impl Backend for SpaceShiftingBackend {
    fn reset(&mut self, _seed: Option<u64>) -> Result<ReplicaReset, BackendError> {
        self.resets += 1;
        if self.resets > self.shift_after {
            self.obs_space = SpaceDescriptor::Continuous {
                low: -1.0e9,
                high: 2.0e9, // drifted bound
                shape: smallvec![1],
            };
        }
        Ok(ReplicaReset {
            agent_count: 1,
            decision_ids: vec![LocalAgentId(0)],
            decision_obs: scalar_obs(&[0.0]),
        })
    }

    fn step(
        &mut self,
        _decision_ids: &[LocalAgentId],
        _actions: &[Value],
    ) -> Result<ReplicaStep, BackendError> {
        Ok(ReplicaStep {
            decision_ids: vec![LocalAgentId(0)],
            decision_obs: scalar_obs(&[1.0]),
            decision_rewards: vec![0.0],
            terminal_ids: vec![],
            terminal_obs: scalar_obs(&[]),
            terminal_rewards: vec![],
            truncated: vec![],
        })
    }

    fn observation_space(&self) -> &SpaceDescriptor {
        &self.obs_space
    }

    fn action_space(&self) -> &SpaceDescriptor {
        &self.action_space
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_same_seed_same_schedule() {
        let config = CountdownConfig::default();
        let mut a = CountdownBackend::new(config.clone());
        let mut b = CountdownBackend::new(config);
        let reset_a = a.reset(Some(7)).unwrap();
        let reset_b = b.reset(Some(7)).unwrap();
        assert_eq!(reset_a, reset_b);

        for _ in 0..20 {
            let ids = a.expected_decision.clone();
            let actions = zero_actions(ids.len());
            let step_a = a.step(&ids, &actions).unwrap();
            let step_b = b.step(&ids, &actions).unwrap();
            assert_eq!(step_a, step_b);
        }
    }

    #[test]
    fn countdown_rejects_wrong_decision_ids() {
        let mut backend = CountdownBackend::new(CountdownConfig::default());
        backend.reset(Some(1)).unwrap();
        let wrong = vec![LocalAgentId(1)];
        assert!(backend.step(&wrong, &zero_actions(1)).is_err());
    }

    #[test]
    fn countdown_non_auto_reset_rests_one_tick() {
        let config = CountdownConfig {
            agent_count: 1,
            min_len: 1,
            max_len: 1,
            auto_reset: false,
            truncated_episodes: false,
        };
        let mut backend = CountdownBackend::new(config);
        backend.reset(Some(3)).unwrap();

        // Episode length 1: the first step terminates the agent with
        // no reborn decision entry.
        let step1 = backend
            .step(&[LocalAgentId(0)], &zero_actions(1))
            .unwrap();
        assert_eq!(step1.terminal_ids, vec![LocalAgentId(0)]);
        assert!(step1.decision_ids.is_empty());

        // Next tick it rejoins with no action dispatched.
        let step2 = backend.step(&[], &[]).unwrap();
        assert_eq!(step2.decision_ids, vec![LocalAgentId(0)]);
        assert!(step2.terminal_ids.is_empty());
    }

    #[test]
    fn scripted_backend_replays_and_exhausts() {
        let mut backend = ScriptedBackend::new(1, vec![0.5], vec![]);
        let reset = backend.reset(None).unwrap();
        assert_eq!(reset.agent_count, 1);
        assert!(backend.step(&[LocalAgentId(0)], &zero_actions(1)).is_err());
    }
}
