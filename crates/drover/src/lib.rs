//! Drover: multi-replica orchestration for multi-agent reinforcement
//! learning.
//!
//! This is the top-level facade crate that re-exports the public API
//! from all Drover sub-crates. For most users, adding `drover` as a
//! single dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use drover::prelude::*;
//! use smallvec::smallvec;
//!
//! // A minimal backend: one agent whose episodes last two ticks and
//! // restart in the same tick they end (auto-reset).
//! struct TwoTick {
//!     remaining: u64,
//!     obs_space: SpaceDescriptor,
//!     act_space: SpaceDescriptor,
//! }
//!
//! impl TwoTick {
//!     fn new() -> Self {
//!         Self {
//!             remaining: 2,
//!             obs_space: SpaceDescriptor::Continuous {
//!                 low: 0.0,
//!                 high: 10.0,
//!                 shape: smallvec![1],
//!             },
//!             act_space: SpaceDescriptor::Discrete { n: 2 },
//!         }
//!     }
//!
//!     fn obs(&self) -> Vec<Vec<Value>> {
//!         vec![vec![Value::Continuous(vec![self.remaining as f32])]]
//!     }
//! }
//!
//! impl Backend for TwoTick {
//!     fn reset(&mut self, _seed: Option<u64>) -> Result<ReplicaReset, BackendError> {
//!         self.remaining = 2;
//!         Ok(ReplicaReset {
//!             agent_count: 1,
//!             decision_ids: vec![LocalAgentId(0)],
//!             decision_obs: self.obs(),
//!         })
//!     }
//!
//!     fn step(
//!         &mut self,
//!         _ids: &[LocalAgentId],
//!         _actions: &[Value],
//!     ) -> Result<ReplicaStep, BackendError> {
//!         self.remaining -= 1;
//!         if self.remaining == 0 {
//!             let terminal_obs = self.obs();
//!             self.remaining = 2; // implicit reset, same tick
//!             Ok(ReplicaStep {
//!                 decision_ids: vec![LocalAgentId(0)],
//!                 decision_obs: self.obs(),
//!                 decision_rewards: vec![0.0],
//!                 terminal_ids: vec![LocalAgentId(0)],
//!                 terminal_obs,
//!                 terminal_rewards: vec![1.0],
//!                 truncated: vec![false],
//!             })
//!         } else {
//!             Ok(ReplicaStep {
//!                 decision_ids: vec![LocalAgentId(0)],
//!                 decision_obs: self.obs(),
//!                 decision_rewards: vec![0.1],
//!                 terminal_ids: vec![],
//!                 terminal_obs: vec![vec![]],
//!                 terminal_rewards: vec![],
//!                 truncated: vec![],
//!             })
//!         }
//!     }
//!
//!     fn observation_space(&self) -> &SpaceDescriptor {
//!         &self.obs_space
//!     }
//!
//!     fn action_space(&self) -> &SpaceDescriptor {
//!         &self.act_space
//!     }
//!
//!     fn close(&mut self) {}
//! }
//!
//! // Four replicas of the backend behind one flat batch.
//! let factory = |_: ReplicaId| -> Result<Box<dyn Backend>, BackendError> {
//!     Ok(Box::new(TwoTick::new()))
//! };
//! let mut orch = ReplicaOrchestrator::new(OrchestratorConfig {
//!     factory: Box::new(factory),
//!     num_replicas: 4,
//!     execution: Execution::Sequential,
//! })
//! .unwrap();
//!
//! let batch = orch.reset(Some(0)).unwrap();
//! assert_eq!(orch.total_agents(), 4);
//! assert_eq!(batch.observations().len(), 4);
//!
//! // Tick 1: everyone mid-episode. Tick 2: every episode ends and
//! // restarts, so the pre-reset observation is preserved per agent.
//! let actions = vec![Value::Discrete(0); 4];
//! let batch = orch.step(&actions).unwrap();
//! assert!(!batch.terminated().iter().any(|&t| t));
//! let batch = orch.step(&actions).unwrap();
//! assert!(batch.terminated().iter().all(|&t| t));
//! assert_eq!(batch.final_observations().count(), 4);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in
//! the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `drover-core` | IDs and shared error types |
//! | [`space`] | `drover-space` | Space descriptors and sampled values |
//! | [`obs`] | `drover-obs` | Observation aggregation |
//! | [`backend`] | `drover-backend` | The Backend Contract |
//! | [`engine`] | `drover-engine` | Index map, reconciler, orchestrator |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core IDs and shared error types (`drover-core`).
pub use drover_core as types;

/// Space descriptors and sampled values (`drover-space`).
pub use drover_space as space;

/// Observation aggregation (`drover-obs`).
pub use drover_obs as obs;

/// The Backend Contract (`drover-backend`).
pub use drover_backend as backend;

/// Index map, step reconciler, and orchestrator (`drover-engine`).
pub use drover_engine as engine;

/// The commonly-used subset of the Drover API.
pub mod prelude {
    pub use drover_backend::{Backend, BackendFactory, ObsColumns, ReplicaReset, ReplicaStep};
    pub use drover_core::{
        BackendError, GlobalIndex, LocalAgentId, ObsError, ReplicaId, SpaceError, TickId,
    };
    pub use drover_engine::{
        AgentIndexMap, ConfigError, Execution, OrchestratorConfig, ReplicaOrchestrator,
        StepBatch, StepError, StepMetrics,
    };
    pub use drover_obs::{AgentRows, ObsAggregator};
    pub use drover_space::{SpaceDescriptor, Value};
}
