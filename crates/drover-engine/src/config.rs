//! Orchestrator configuration and construction-time errors.

use std::error::Error;
use std::fmt;

use drover_backend::BackendFactory;
use drover_core::{BackendError, ReplicaId, SpaceError};

// ── Execution ───────────────────────────────────────────────────

/// How replicas are driven within a tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Execution {
    /// One thread, strictly ordered: dispatch to each replica in turn,
    /// then reconcile. The default.
    #[default]
    Sequential,
    /// One worker thread per replica with a fan-out/fan-in join that
    /// completes entirely before reconciliation begins. Replicas are
    /// data-parallel — the only shared state is the read-only index
    /// map — so results are identical to sequential execution.
    Threaded,
}

// ── OrchestratorConfig ──────────────────────────────────────────

/// Construction input for
/// [`ReplicaOrchestrator`](crate::ReplicaOrchestrator).
///
/// The factory is an explicit value: backends are selected at
/// construction time, not through a global registry.
pub struct OrchestratorConfig {
    /// Creates one backend per replica.
    pub factory: Box<dyn BackendFactory>,
    /// Number of replicas to run.
    pub num_replicas: usize,
    /// Replica driving mode.
    pub execution: Execution,
}

impl OrchestratorConfig {
    /// Check structural invariants that need no backend.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NoReplicas`] if `num_replicas` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_replicas == 0 {
            return Err(ConfigError::NoReplicas);
        }
        Ok(())
    }
}

impl fmt::Debug for OrchestratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorConfig")
            .field("num_replicas", &self.num_replicas)
            .field("execution", &self.execution)
            .finish_non_exhaustive()
    }
}

// ── ConfigError ─────────────────────────────────────────────────

/// Errors detected while constructing an orchestrator.
#[derive(Debug)]
pub enum ConfigError {
    /// `num_replicas` is zero.
    NoReplicas,
    /// The factory failed to create a backend.
    Backend {
        /// Replica whose creation failed.
        replica: ReplicaId,
        /// The underlying backend error.
        error: BackendError,
    },
    /// A replica's space descriptors differ from replica 0's. All
    /// replicas in one orchestrator must share the same spaces.
    SpaceMismatch {
        /// The replica that disagrees with replica 0.
        replica: ReplicaId,
    },
    /// The observation space cannot feed a vector learner.
    Space(SpaceError),
    /// A replica worker thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of the spawn failure.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoReplicas => write!(f, "orchestrator requires at least one replica"),
            Self::Backend { replica, error } => {
                write!(f, "replica {replica}: construction failed: {error}")
            }
            Self::SpaceMismatch { replica } => write!(
                f,
                "replica {replica} reports different space descriptors than replica 0"
            ),
            Self::Space(e) => write!(f, "{e}"),
            Self::ThreadSpawnFailed { reason } => {
                write!(f, "failed to spawn replica worker: {reason}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Backend { error, .. } => Some(error),
            Self::Space(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SpaceError> for ConfigError {
    fn from(e: SpaceError) -> Self {
        Self::Space(e)
    }
}
