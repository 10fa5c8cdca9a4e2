//! The replica orchestrator: N backends, one flat batch.
//!
//! # Ownership model
//!
//! `ReplicaOrchestrator` owns its backends outright — either inline
//! (sequential stepping) or moved onto worker threads (fan-out/fan-in).
//! All mutating methods take `&mut self`; there is no interior
//! mutability and no locking. One tick is a strictly ordered sequence:
//! slice actions per replica, dispatch, await every replica result,
//! reconcile, return. A tick either fully succeeds or fully fails —
//! on failure the orchestrator halts until the next successful reset
//! rather than returning a batch with stale or missing agents.

use std::time::Instant;

use drover_backend::{Backend, ReplicaReset, ReplicaStep};
use drover_core::{BackendError, GlobalIndex, LocalAgentId, ReplicaId, TickId};
use drover_obs::ObsAggregator;
use drover_space::{SpaceDescriptor, Value};

use crate::batch::StepBatch;
use crate::config::{ConfigError, Execution, OrchestratorConfig};
use crate::index::AgentIndexMap;
use crate::metrics::StepMetrics;
use crate::pool::WorkerPool;
use crate::reconcile::{reconcile, StepError};

enum Replicas {
    Inline(Vec<Box<dyn Backend>>),
    Pooled(WorkerPool),
}

/// Owns N backend replicas and exposes them to the learner as one
/// flat, globally-indexed batch of agents.
///
/// # Example
///
/// ```ignore
/// let mut orch = ReplicaOrchestrator::new(config)?;
/// let mut batch = orch.reset(Some(42))?;
/// loop {
///     let actions = policy.act(batch.observations());
///     batch = orch.step(&actions)?;
/// }
/// ```
pub struct ReplicaOrchestrator {
    replicas: Replicas,
    num_replicas: usize,
    index: AgentIndexMap,
    aggregator: ObsAggregator,
    observation_space: SpaceDescriptor,
    action_space: SpaceDescriptor,
    /// Per replica, the decision ids from its previous return — the
    /// agents that receive an action on the next step.
    last_decision: Vec<Vec<LocalAgentId>>,
    tick: TickId,
    started: bool,
    halted: bool,
    closed: bool,
    metrics: StepMetrics,
}

impl ReplicaOrchestrator {
    /// Create an orchestrator from a config.
    ///
    /// Creates every backend through the factory, captures replica 0's
    /// space descriptors as canonical, verifies every other replica
    /// matches them, and compiles the observation aggregator. No reset
    /// is performed — call [`reset`](Self::reset) before stepping.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NoReplicas`] for an empty config,
    /// [`ConfigError::Backend`] if the factory fails,
    /// [`ConfigError::SpaceMismatch`] if replicas disagree on spaces,
    /// [`ConfigError::Space`] if the observation space is image-shaped
    /// or zero-width, and [`ConfigError::ThreadSpawnFailed`] if a
    /// worker thread cannot start.
    pub fn new(config: OrchestratorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut backends: Vec<Box<dyn Backend>> = Vec::with_capacity(config.num_replicas);
        for r in 0..config.num_replicas {
            let replica = ReplicaId(r as u32);
            let backend = config
                .factory
                .create(replica)
                .map_err(|error| ConfigError::Backend { replica, error })?;
            backends.push(backend);
        }

        // Replica 0's descriptors are canonical for the whole group.
        let observation_space = backends[0].observation_space().clone();
        let action_space = backends[0].action_space().clone();
        for (r, backend) in backends.iter().enumerate().skip(1) {
            if backend.observation_space() != &observation_space
                || backend.action_space() != &action_space
            {
                return Err(ConfigError::SpaceMismatch {
                    replica: ReplicaId(r as u32),
                });
            }
        }

        let aggregator = ObsAggregator::new(&observation_space)?;

        let num_replicas = backends.len();
        let replicas = match config.execution {
            Execution::Sequential => Replicas::Inline(backends),
            Execution::Threaded => Replicas::Pooled(WorkerPool::spawn(backends)?),
        };

        Ok(Self {
            replicas,
            num_replicas,
            index: AgentIndexMap::new(),
            aggregator,
            observation_space,
            action_space,
            last_decision: Vec::new(),
            tick: TickId(0),
            started: false,
            halted: false,
            closed: false,
            metrics: StepMetrics::default(),
        })
    }

    /// Reset every replica and return the initial batch.
    ///
    /// Replica `i` receives seed `base + i` when a base seed is given,
    /// `None` otherwise. The index map is rebuilt from the post-reset
    /// agent counts; every agent must appear as a decision agent. The
    /// returned batch has zero rewards, all flags false, and no final
    /// observations. A successful reset clears the halted state.
    ///
    /// # Errors
    ///
    /// [`StepError::Closed`] after [`close`](Self::close);
    /// [`StepError::ReplicaFailure`] if any backend fails (wrapped with
    /// its replica index); contract violations as in [`step`](Self::step).
    /// On error the orchestrator stays halted and `close()` remains
    /// safe to call.
    pub fn reset(&mut self, seed: Option<u64>) -> Result<StepBatch, StepError> {
        if self.closed {
            return Err(StepError::Closed);
        }

        let seeds: Vec<Option<u64>> = (0..self.num_replicas)
            .map(|i| seed.map(|s| s + i as u64))
            .collect();

        let resets = self.reset_replicas(&seeds).map_err(|(replica, error)| {
            self.halted = true;
            StepError::ReplicaFailure { replica, error }
        })?;

        match self.build_initial_batch(&resets) {
            Ok(batch) => {
                self.last_decision = resets.iter().map(|r| r.decision_ids.clone()).collect();
                self.started = true;
                self.halted = false;
                self.tick = TickId(0);
                self.metrics = StepMetrics::default();
                Ok(batch)
            }
            Err(e) => {
                self.halted = true;
                Err(e)
            }
        }
    }

    /// Execute one tick.
    ///
    /// `actions` is indexed by global index and must have exactly
    /// [`total_agents()`](Self::total_agents) entries. Each replica
    /// receives the sub-batch for its decision agents from its
    /// *previous* return — an agent that was terminal-only last tick
    /// receives no action. Debug builds validate every dispatched
    /// action against the action space.
    ///
    /// # Errors
    ///
    /// Any error aborts the tick without returning a partial batch and
    /// halts the orchestrator until the next successful
    /// [`reset`](Self::reset). See [`StepError`] for the kinds.
    pub fn step(&mut self, actions: &[Value]) -> Result<StepBatch, StepError> {
        if self.closed {
            return Err(StepError::Closed);
        }
        if self.halted {
            return Err(StepError::Halted);
        }
        if !self.started {
            return Err(StepError::NotStarted);
        }

        match self.step_inner(actions) {
            Ok(batch) => Ok(batch),
            Err(e) => {
                self.halted = true;
                self.metrics.failed_ticks += 1;
                Err(e)
            }
        }
    }

    fn step_inner(&mut self, actions: &[Value]) -> Result<StepBatch, StepError> {
        let total = self.index.total_agents();
        if actions.len() != total {
            return Err(StepError::InvalidArgument {
                reason: format!("got {} actions for {total} agents", actions.len()),
            });
        }

        #[cfg(debug_assertions)]
        for (i, action) in actions.iter().enumerate() {
            debug_assert!(
                self.action_space.validate(action),
                "action for global index {i} does not match {}",
                self.action_space
            );
        }

        let start = Instant::now();

        // Slice the global batch: replica r gets actions for exactly
        // the ids it listed as decision agents last tick.
        let mut batches = Vec::with_capacity(self.num_replicas);
        for (r, ids) in self.last_decision.iter().enumerate() {
            let replica = ReplicaId(r as u32);
            let mut replica_actions = Vec::with_capacity(ids.len());
            for id in ids {
                let g = self.index.global_of(replica, *id)?;
                replica_actions.push(actions[g.index()].clone());
            }
            batches.push((ids.clone(), replica_actions));
        }

        let steps = self
            .step_replicas(batches)
            .map_err(|(replica, error)| StepError::ReplicaFailure { replica, error })?;
        let dispatch_us = start.elapsed().as_micros() as u64;

        let reconcile_start = Instant::now();
        let batch = reconcile(&self.index, &self.aggregator, &steps)?;
        let reconcile_us = reconcile_start.elapsed().as_micros() as u64;

        for (r, step) in steps.iter().enumerate() {
            self.last_decision[r] = step.decision_ids.clone();
        }
        self.tick = TickId(self.tick.0 + 1);
        self.metrics = StepMetrics {
            total_us: start.elapsed().as_micros() as u64,
            dispatch_us,
            reconcile_us,
            decision_agents: steps.iter().map(|s| s.decision_ids.len()).sum(),
            terminal_agents: steps.iter().map(|s| s.terminal_ids.len()).sum(),
            autoreset_agents: batch.final_observations().count(),
            failed_ticks: self.metrics.failed_ticks,
        };

        Ok(batch)
    }

    /// Close every replica. Idempotent, and safe after a failed reset.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        match &mut self.replicas {
            Replicas::Inline(backends) => {
                for backend in backends {
                    backend.close();
                }
            }
            Replicas::Pooled(pool) => pool.close_all(),
        }
        self.closed = true;
    }

    /// Width of one flattened observation row.
    pub fn observation_width(&self) -> usize {
        self.aggregator.width()
    }

    /// The canonical observation space descriptor.
    pub fn observation_space(&self) -> &SpaceDescriptor {
        &self.observation_space
    }

    /// The canonical action space descriptor.
    pub fn action_space(&self) -> &SpaceDescriptor {
        &self.action_space
    }

    /// Total agents across all replicas. Zero before the first reset.
    pub fn total_agents(&self) -> usize {
        self.index.total_agents()
    }

    /// Number of replicas.
    pub fn num_replicas(&self) -> usize {
        self.num_replicas
    }

    /// Ticks completed since the last reset.
    pub fn current_tick(&self) -> TickId {
        self.tick
    }

    /// Whether a failed tick has halted the orchestrator. Cleared by a
    /// successful [`reset`](Self::reset).
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Metrics from the most recent successful tick.
    pub fn last_metrics(&self) -> &StepMetrics {
        &self.metrics
    }

    // ── replica dispatch ────────────────────────────────────────

    fn reset_replicas(
        &mut self,
        seeds: &[Option<u64>],
    ) -> Result<Vec<ReplicaReset>, (ReplicaId, BackendError)> {
        match &mut self.replicas {
            Replicas::Inline(backends) => {
                let mut out = Vec::with_capacity(backends.len());
                for (i, backend) in backends.iter_mut().enumerate() {
                    let replica = ReplicaId(i as u32);
                    let reset = backend.reset(seeds[i]).map_err(|e| (replica, e))?;
                    if backend.observation_space() != &self.observation_space
                        || backend.action_space() != &self.action_space
                    {
                        return Err((replica, BackendError::SpaceChanged));
                    }
                    out.push(reset);
                }
                Ok(out)
            }
            Replicas::Pooled(pool) => pool.reset_all(seeds),
        }
    }

    fn step_replicas(
        &mut self,
        batches: Vec<(Vec<LocalAgentId>, Vec<Value>)>,
    ) -> Result<Vec<ReplicaStep>, (ReplicaId, BackendError)> {
        match &mut self.replicas {
            Replicas::Inline(backends) => {
                let mut out = Vec::with_capacity(backends.len());
                for (i, (backend, (ids, actions))) in
                    backends.iter_mut().zip(batches).enumerate()
                {
                    let replica = ReplicaId(i as u32);
                    out.push(backend.step(&ids, &actions).map_err(|e| (replica, e))?);
                }
                Ok(out)
            }
            Replicas::Pooled(pool) => pool.step_all(batches),
        }
    }

    fn build_initial_batch(&mut self, resets: &[ReplicaReset]) -> Result<StepBatch, StepError> {
        let counts: Vec<usize> = resets.iter().map(|r| r.agent_count).collect();
        self.index.rebuild(&counts)?;

        let mut batch = StepBatch::zeroed(self.index.total_agents(), self.aggregator.width());
        let mut touched = vec![false; self.index.total_agents()];
        for (r, reset) in resets.iter().enumerate() {
            let replica = ReplicaId(r as u32);
            let rows = self.aggregator.aggregate(&reset.decision_obs)?;
            if rows.rows() != reset.decision_ids.len() {
                return Err(StepError::InvalidArgument {
                    reason: format!(
                        "replica {replica}: {} initial observation rows for {} decision ids",
                        rows.rows(),
                        reset.decision_ids.len()
                    ),
                });
            }
            for (pos, local) in reset.decision_ids.iter().enumerate() {
                let g = self.index.global_of(replica, *local)?;
                if touched[g.index()] {
                    return Err(StepError::DuplicateAgentInStep {
                        replica,
                        local: *local,
                    });
                }
                touched[g.index()] = true;
                batch.observation_row_mut(g).copy_from_slice(rows.row(pos));
            }
        }

        // Every agent starts its episode at reset; a silent one means
        // the backend's agent_count and decision set disagree.
        if let Some(gap) = touched.iter().position(|&t| !t) {
            let (replica, local) = self.index.locate(GlobalIndex(gap as u32))?;
            return Err(StepError::MissingAgentInStep { replica, local });
        }

        Ok(batch)
    }
}

impl std::fmt::Debug for ReplicaOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaOrchestrator")
            .field("num_replicas", &self.num_replicas)
            .field("total_agents", &self.index.total_agents())
            .field("current_tick", &self.tick)
            .field("halted", &self.halted)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Drop for ReplicaOrchestrator {
    fn drop(&mut self) {
        self.close();
    }
}
