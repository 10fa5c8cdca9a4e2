//! Compile-once observation aggregator.
//!
//! Compilation resolves the observation space into an ordered component
//! list with a precomputed total width; aggregation then runs without
//! any per-tick descriptor walking beyond the flatten calls themselves.

use drover_core::{ObsError, SpaceError};
use drover_space::{SpaceDescriptor, Value};

use crate::rows::AgentRows;

/// Flattens component-major observation columns into fixed-width rows.
///
/// Built once per replica group from the observation space descriptor.
/// A composite space contributes one component per child, in
/// declaration order; any other space is a single component.
///
/// # Examples
///
/// ```
/// use drover_obs::{ObsAggregator, Value};
/// use drover_space::SpaceDescriptor;
/// use smallvec::smallvec;
///
/// let space = SpaceDescriptor::Composite {
///     children: vec![
///         SpaceDescriptor::Continuous { low: -1.0, high: 1.0, shape: smallvec![2] },
///         SpaceDescriptor::Discrete { n: 3 },
///     ],
/// };
/// let agg = ObsAggregator::new(&space).unwrap();
/// assert_eq!(agg.width(), 3);
///
/// // Two agents, component-major columns.
/// let columns = vec![
///     vec![Value::Continuous(vec![0.1, 0.2]), Value::Continuous(vec![0.3, 0.4])],
///     vec![Value::Discrete(1), Value::Discrete(2)],
/// ];
/// let rows = agg.aggregate(&columns).unwrap();
/// assert_eq!(rows.row(0), &[0.1, 0.2, 1.0]);
/// assert_eq!(rows.row(1), &[0.3, 0.4, 2.0]);
/// ```
#[derive(Clone, Debug)]
pub struct ObsAggregator {
    components: Vec<SpaceDescriptor>,
    widths: Vec<usize>,
    width: usize,
}

impl ObsAggregator {
    /// Compile an aggregator from an observation space.
    ///
    /// # Errors
    ///
    /// [`SpaceError::UnsupportedSpace`] if the space contains an
    /// image-shaped component (rank >= 3) or flattens to zero width.
    pub fn new(space: &SpaceDescriptor) -> Result<Self, SpaceError> {
        space.ensure_vector()?;
        let components = match space {
            SpaceDescriptor::Composite { children } => children.clone(),
            other => vec![other.clone()],
        };
        let widths: Vec<usize> = components.iter().map(SpaceDescriptor::flat_dim).collect();
        let width = widths.iter().sum();
        if width == 0 {
            return Err(SpaceError::UnsupportedSpace {
                reason: "observation space flattens to zero width".into(),
            });
        }
        Ok(Self {
            components,
            widths,
            width,
        })
    }

    /// Total row width: `sum(flat_dim())` over components.
    ///
    /// Invariant for every [`aggregate`](Self::aggregate) call,
    /// including the zero-agent case.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of observation components.
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Aggregate component-major columns into one row per agent.
    ///
    /// `columns[c][a]` is component `c` of agent `a`. All columns must
    /// have the same length; that length is the agent count, and zero
    /// agents yields a 0-row block rather than an error (a replica may
    /// have no decision agents on a tick).
    ///
    /// # Errors
    ///
    /// [`ObsError::ComponentCountMismatch`] if the column count differs
    /// from the compiled component count,
    /// [`ObsError::AgentCountMismatch`] if columns disagree on agent
    /// count, and [`ObsError::Space`] if any value fails to flatten.
    pub fn aggregate(&self, columns: &[Vec<Value>]) -> Result<AgentRows, ObsError> {
        if columns.len() != self.components.len() {
            return Err(ObsError::ComponentCountMismatch {
                expected: self.components.len(),
                found: columns.len(),
            });
        }
        let agents = columns[0].len();
        for (c, column) in columns.iter().enumerate() {
            if column.len() != agents {
                return Err(ObsError::AgentCountMismatch {
                    component: c,
                    expected: agents,
                    found: column.len(),
                });
            }
        }

        let mut data = vec![0.0f32; agents * self.width];
        for agent in 0..agents {
            let row_start = agent * self.width;
            let mut offset = row_start;
            for (c, component) in self.components.iter().enumerate() {
                let end = offset + self.widths[c];
                component.flatten_into(&columns[c][agent], &mut data[offset..end])?;
                offset = end;
            }
        }
        Ok(AgentRows::new(self.width, agents, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn two_component_space() -> SpaceDescriptor {
        SpaceDescriptor::Composite {
            children: vec![
                SpaceDescriptor::Continuous {
                    low: -10.0,
                    high: 10.0,
                    shape: smallvec![2],
                },
                SpaceDescriptor::MultiDiscrete {
                    branches: smallvec![4, 4],
                },
            ],
        }
    }

    // ── compilation ─────────────────────────────────────────────

    #[test]
    fn non_composite_space_is_single_component() {
        let agg = ObsAggregator::new(&SpaceDescriptor::Discrete { n: 6 }).unwrap();
        assert_eq!(agg.component_count(), 1);
        assert_eq!(agg.width(), 1);
    }

    #[test]
    fn composite_children_become_components() {
        let agg = ObsAggregator::new(&two_component_space()).unwrap();
        assert_eq!(agg.component_count(), 2);
        assert_eq!(agg.width(), 4);
    }

    #[test]
    fn image_component_rejected_at_compile() {
        let space = SpaceDescriptor::Continuous {
            low: 0.0,
            high: 1.0,
            shape: smallvec![32, 32, 3],
        };
        assert!(matches!(
            ObsAggregator::new(&space),
            Err(SpaceError::UnsupportedSpace { .. })
        ));
    }

    #[test]
    fn zero_width_space_rejected_at_compile() {
        let space = SpaceDescriptor::Composite { children: vec![] };
        assert!(ObsAggregator::new(&space).is_err());
    }

    // ── aggregation ─────────────────────────────────────────────

    #[test]
    fn rows_concatenate_components_in_order() {
        let agg = ObsAggregator::new(&two_component_space()).unwrap();
        let columns = vec![
            vec![
                Value::Continuous(vec![1.0, 2.0]),
                Value::Continuous(vec![3.0, 4.0]),
            ],
            vec![
                Value::MultiDiscrete(smallvec![0, 3]),
                Value::MultiDiscrete(smallvec![2, 1]),
            ],
        ];
        let rows = agg.aggregate(&columns).unwrap();
        assert_eq!(rows.rows(), 2);
        assert_eq!(rows.row(0), &[1.0, 2.0, 0.0, 3.0]);
        assert_eq!(rows.row(1), &[3.0, 4.0, 2.0, 1.0]);
    }

    #[test]
    fn zero_agents_yields_empty_block_not_error() {
        let agg = ObsAggregator::new(&two_component_space()).unwrap();
        let rows = agg.aggregate(&[vec![], vec![]]).unwrap();
        assert_eq!(rows.rows(), 0);
        assert_eq!(rows.width(), 4);
    }

    #[test]
    fn wrong_column_count_rejected() {
        let agg = ObsAggregator::new(&two_component_space()).unwrap();
        let err = agg.aggregate(&[vec![]]).unwrap_err();
        assert_eq!(
            err,
            ObsError::ComponentCountMismatch {
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn ragged_columns_rejected() {
        let agg = ObsAggregator::new(&two_component_space()).unwrap();
        let columns = vec![
            vec![Value::Continuous(vec![0.0, 0.0])],
            vec![
                Value::MultiDiscrete(smallvec![0, 0]),
                Value::MultiDiscrete(smallvec![1, 1]),
            ],
        ];
        let err = agg.aggregate(&columns).unwrap_err();
        assert!(matches!(err, ObsError::AgentCountMismatch { component: 1, .. }));
    }

    #[test]
    fn bad_value_surfaces_space_error() {
        let agg = ObsAggregator::new(&two_component_space()).unwrap();
        let columns = vec![
            vec![Value::Discrete(0)], // wrong variant for component 0
            vec![Value::MultiDiscrete(smallvec![0, 0])],
        ];
        assert!(matches!(
            agg.aggregate(&columns),
            Err(ObsError::Space(SpaceError::ShapeMismatch { .. }))
        ));
    }

    // ── properties ──────────────────────────────────────────────

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn width_invariant_any_agent_count(agents in 0usize..20) {
            let agg = ObsAggregator::new(&two_component_space()).unwrap();
            let columns = vec![
                (0..agents).map(|i| Value::Continuous(vec![i as f32, 0.0])).collect(),
                (0..agents).map(|_| Value::MultiDiscrete(smallvec![0, 0])).collect(),
            ];
            let rows = agg.aggregate(&columns).unwrap();
            prop_assert_eq!(rows.width(), agg.width());
            prop_assert_eq!(rows.rows(), agents);
            prop_assert_eq!(rows.as_flat().len(), agents * agg.width());
        }
    }
}
