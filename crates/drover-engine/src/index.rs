//! Bidirectional (replica, local agent) <-> global index mapping.
//!
//! Global indices are dense and replica-major: all of replica 0's
//! agents precede replica 1's, with no gaps or duplicates. The map is
//! rebuilt synchronously at reset and is read-only between rebuilds —
//! there is no interior mutability and no concurrency hazard.

use std::error::Error;
use std::fmt;

use drover_core::{GlobalIndex, LocalAgentId, ReplicaId};

// ── IndexError ──────────────────────────────────────────────────

/// Index map inconsistencies.
///
/// These indicate a backend contract violation or a caller bug, never
/// a transient condition; none are retried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexError {
    /// The (replica, local) pair was never registered.
    UnknownAgent {
        /// Replica the lookup targeted.
        replica: ReplicaId,
        /// Local agent id that is not registered.
        local: LocalAgentId,
    },
    /// Global index out of range.
    UnknownGlobal {
        /// The requested index.
        index: GlobalIndex,
        /// Total registered agents.
        total: usize,
    },
    /// The combined agent count does not fit the index representation.
    AgentCountOverflow {
        /// The total that overflowed.
        total: usize,
    },
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAgent { replica, local } => {
                write!(f, "replica {replica} has no agent {local}")
            }
            Self::UnknownGlobal { index, total } => {
                write!(f, "global index {index} out of range (total_agents={total})")
            }
            Self::AgentCountOverflow { total } => {
                write!(f, "total agent count {total} exceeds u32 range")
            }
        }
    }
}

impl Error for IndexError {}

// ── AgentIndexMap ───────────────────────────────────────────────

/// Dense replica-major agent indexing.
///
/// Empty until the first [`rebuild`](Self::rebuild). Rebuilding is
/// deterministic and pure given the per-replica agent counts; the
/// engine calls it once per reset and never mid-episode.
///
/// # Examples
///
/// ```
/// use drover_core::{GlobalIndex, LocalAgentId, ReplicaId};
/// use drover_engine::AgentIndexMap;
///
/// let mut map = AgentIndexMap::new();
/// map.rebuild(&[2, 1]).unwrap();
/// assert_eq!(map.total_agents(), 3);
/// assert_eq!(
///     map.global_of(ReplicaId(1), LocalAgentId(0)).unwrap(),
///     GlobalIndex(2)
/// );
/// ```
#[derive(Clone, Debug, Default)]
pub struct AgentIndexMap {
    local_to_global: Vec<Vec<GlobalIndex>>,
    global_to_local: Vec<(ReplicaId, LocalAgentId)>,
}

impl AgentIndexMap {
    /// An empty map with no registered replicas.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute both directions from per-replica agent counts.
    ///
    /// Replica-major, zero-based: replica `r`'s agent `a` maps to
    /// `sum(counts[..r]) + a`. Replaces any previous mapping.
    ///
    /// # Errors
    ///
    /// [`IndexError::AgentCountOverflow`] if the combined count does
    /// not fit in `u32`. The map is left unchanged on error.
    pub fn rebuild(&mut self, agents_per_replica: &[usize]) -> Result<(), IndexError> {
        let total: usize = agents_per_replica.iter().sum();
        if u32::try_from(total).is_err() {
            return Err(IndexError::AgentCountOverflow { total });
        }

        let mut local_to_global = Vec::with_capacity(agents_per_replica.len());
        let mut global_to_local = Vec::with_capacity(total);
        let mut next = 0u32;
        for (r, &count) in agents_per_replica.iter().enumerate() {
            let replica = ReplicaId(r as u32);
            let mut forward = Vec::with_capacity(count);
            for a in 0..count {
                forward.push(GlobalIndex(next));
                global_to_local.push((replica, LocalAgentId(a as u32)));
                next += 1;
            }
            local_to_global.push(forward);
        }

        self.local_to_global = local_to_global;
        self.global_to_local = global_to_local;
        Ok(())
    }

    /// The global index of one replica-local agent. O(1).
    ///
    /// # Errors
    ///
    /// [`IndexError::UnknownAgent`] if the pair was never registered.
    pub fn global_of(
        &self,
        replica: ReplicaId,
        local: LocalAgentId,
    ) -> Result<GlobalIndex, IndexError> {
        self.local_to_global
            .get(replica.0 as usize)
            .and_then(|forward| forward.get(local.0 as usize))
            .copied()
            .ok_or(IndexError::UnknownAgent { replica, local })
    }

    /// The (replica, local) pair behind one global index. O(1).
    ///
    /// # Errors
    ///
    /// [`IndexError::UnknownGlobal`] if the index is out of range.
    pub fn locate(&self, index: GlobalIndex) -> Result<(ReplicaId, LocalAgentId), IndexError> {
        self.global_to_local
            .get(index.index())
            .copied()
            .ok_or(IndexError::UnknownGlobal {
                index,
                total: self.global_to_local.len(),
            })
    }

    /// Total agents across all replicas.
    pub fn total_agents(&self) -> usize {
        self.global_to_local.len()
    }

    /// Number of registered replicas.
    pub fn replica_count(&self) -> usize {
        self.local_to_global.len()
    }

    /// Agent count of one replica, 0 if the replica is unknown.
    pub fn agents_in(&self, replica: ReplicaId) -> usize {
        self.local_to_global
            .get(replica.0 as usize)
            .map_or(0, Vec::len)
    }
}
