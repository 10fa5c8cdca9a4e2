//! Error types shared across the Drover workspace, organized by
//! subsystem: space (descriptors and values), observation aggregation,
//! and backend execution.
//!
//! Engine-local errors (`IndexError`, `StepError`, `ConfigError`) live
//! in `drover-engine` next to the code that raises them.

use std::error::Error;
use std::fmt;

/// Errors from space descriptors and value encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpaceError {
    /// A value's variant or shape disagrees with its descriptor.
    ///
    /// Fatal to the tick that produced it; never retried.
    ShapeMismatch {
        /// Compact description of the descriptor, e.g. `Continuous[3]`.
        expected: String,
        /// Compact description of the offending value.
        found: String,
    },
    /// The space cannot be flattened to a vector observation
    /// (image-shaped continuous spaces of rank >= 3, in particular).
    ///
    /// Fatal at setup time.
    UnsupportedSpace {
        /// Description of why the space is rejected.
        reason: String,
    },
}

impl fmt::Display for SpaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeMismatch { expected, found } => {
                write!(f, "shape mismatch: expected {expected}, found {found}")
            }
            Self::UnsupportedSpace { reason } => write!(f, "unsupported space: {reason}"),
        }
    }
}

impl Error for SpaceError {}

/// Errors from observation aggregation.
///
/// Raised by `ObsAggregator` when a backend's component columns do not
/// line up with the compiled observation space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObsError {
    /// A component value failed to flatten.
    Space(SpaceError),
    /// The number of component columns differs from the space's
    /// component count.
    ComponentCountMismatch {
        /// Components in the compiled observation space.
        expected: usize,
        /// Columns actually supplied.
        found: usize,
    },
    /// Two component columns disagree on the number of agents.
    AgentCountMismatch {
        /// Index of the offending component column.
        component: usize,
        /// Agent count of column 0.
        expected: usize,
        /// Agent count of the offending column.
        found: usize,
    },
}

impl fmt::Display for ObsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Space(e) => write!(f, "{e}"),
            Self::ComponentCountMismatch { expected, found } => {
                write!(f, "expected {expected} component columns, found {found}")
            }
            Self::AgentCountMismatch {
                component,
                expected,
                found,
            } => write!(
                f,
                "component {component} has {found} agents, column 0 has {expected}"
            ),
        }
    }
}

impl Error for ObsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Space(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SpaceError> for ObsError {
    fn from(e: SpaceError) -> Self {
        Self::Space(e)
    }
}

/// Errors raised by a backend during reset or step.
///
/// The engine wraps these with the replica index before propagating
/// (`StepError::ReplicaFailure`). Retries, if desired, belong to the
/// transport layer behind the backend, never to the orchestration core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendError {
    /// The backend's reset or step raised.
    Failure {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The backend reported different space descriptors than the ones
    /// captured at orchestrator construction. Mid-training space
    /// changes are unsupported.
    SpaceChanged,
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failure { reason } => write!(f, "backend failure: {reason}"),
            Self::SpaceChanged => write!(f, "backend space descriptors changed after reset"),
        }
    }
}

impl Error for BackendError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_error_display() {
        let e = SpaceError::ShapeMismatch {
            expected: "Continuous[3]".into(),
            found: "Discrete".into(),
        };
        assert_eq!(
            e.to_string(),
            "shape mismatch: expected Continuous[3], found Discrete"
        );
    }

    #[test]
    fn obs_error_sources_space_error() {
        let e = ObsError::Space(SpaceError::UnsupportedSpace {
            reason: "rank 3".into(),
        });
        assert!(e.source().is_some());
        let e = ObsError::ComponentCountMismatch {
            expected: 2,
            found: 1,
        };
        assert!(e.source().is_none());
    }

    #[test]
    fn backend_error_display() {
        let e = BackendError::Failure {
            reason: "socket closed".into(),
        };
        assert_eq!(e.to_string(), "backend failure: socket closed");
        assert_eq!(
            BackendError::SpaceChanged.to_string(),
            "backend space descriptors changed after reset"
        );
    }
}
