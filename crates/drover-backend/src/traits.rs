//! The [`Backend`] capability trait and its construction-time factory.

use drover_core::{BackendError, LocalAgentId, ReplicaId};
use drover_space::{SpaceDescriptor, Value};

use crate::data::{ReplicaReset, ReplicaStep};

/// One running simulation replica.
///
/// # Contract
///
/// - [`reset`](Self::reset) starts a fresh episode for every hosted
///   agent and reports the agent count that holds until the next
///   reset. Changing the agent count between resets is a structural
///   violation the engine rejects.
/// - [`step`](Self::step) receives exactly the ids the backend listed
///   as decision agents in its previous return, with one action per
///   id. Agents that were terminal-only receive no action on the tick
///   after their episode ends.
/// - Every hosted agent must appear in `decision_ids`, `terminal_ids`,
///   or both on every step. Silence about an agent is a contract
///   violation, not a default.
/// - Space descriptors are stable for the lifetime of the backend.
///
/// # Object safety
///
/// Object-safe; the engine stores replicas as `Box<dyn Backend>`.
/// `Send` is required so replicas can be moved onto worker threads for
/// fan-out/fan-in execution.
pub trait Backend: Send {
    /// Start a fresh episode batch.
    ///
    /// `seed` is an optional deterministic seed; backends without
    /// seeding ignore it.
    fn reset(&mut self, seed: Option<u64>) -> Result<ReplicaReset, BackendError>;

    /// Advance the simulation one tick.
    ///
    /// `decision_ids` is the decision set from this backend's previous
    /// return (or its reset); `actions` is aligned with it.
    fn step(
        &mut self,
        decision_ids: &[LocalAgentId],
        actions: &[Value],
    ) -> Result<ReplicaStep, BackendError>;

    /// The observation space, stable for the lifetime of the backend.
    fn observation_space(&self) -> &SpaceDescriptor;

    /// The action space, stable for the lifetime of the backend.
    fn action_space(&self) -> &SpaceDescriptor;

    /// Release backend resources. Idempotent.
    fn close(&mut self);
}

/// Creates one backend per replica at orchestrator construction.
///
/// An explicit value passed into the orchestrator — the replacement
/// for class-level backend registries. Implemented for free by any
/// `Fn(ReplicaId) -> Result<Box<dyn Backend>, BackendError>` closure:
///
/// ```ignore
/// let factory = |replica: ReplicaId| -> Result<Box<dyn Backend>, BackendError> {
///     Ok(Box::new(MyBackend::connect(replica)?))
/// };
/// ```
pub trait BackendFactory {
    /// Create the backend for `replica`.
    fn create(&self, replica: ReplicaId) -> Result<Box<dyn Backend>, BackendError>;
}

impl<F> BackendFactory for F
where
    F: Fn(ReplicaId) -> Result<Box<dyn Backend>, BackendError>,
{
    fn create(&self, replica: ReplicaId) -> Result<Box<dyn Backend>, BackendError> {
        self(replica)
    }
}
