//! Replica orchestration engine for the Drover framework.
//!
//! Owns N simulation backends, drives them in lockstep, and presents
//! the learner with one flat batch of globally-indexed agents per
//! tick. The hard part lives in [`reconcile`]: merging each replica's
//! decision and terminal agent sets — which may overlap when a backend
//! auto-resets an agent mid-tick — into consistent observation,
//! reward, and termination arrays without losing either the bootstrap
//! target or the next action's input.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod batch;
pub mod config;
pub mod index;
pub mod metrics;
pub mod orchestrator;
mod pool;
pub mod reconcile;

pub use batch::StepBatch;
pub use config::{ConfigError, Execution, OrchestratorConfig};
pub use index::{AgentIndexMap, IndexError};
pub use metrics::StepMetrics;
pub use orchestrator::ReplicaOrchestrator;
pub use reconcile::{reconcile, StepError};
