//! Space descriptors: structure, flat width, and value encoding.
//!
//! A [`SpaceDescriptor`] is built once per replica group from the
//! backend's reported spaces and never changes afterwards. All widths
//! are "one unit per dimension": discrete components occupy a single
//! slot as a cast integer, never a one-hot block — expansion, if a
//! learner wants it, happens downstream.

use drover_core::SpaceError;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

use crate::value::Value;

/// Shape of a continuous space, one extent per dimension.
pub type Shape = SmallVec<[usize; 4]>;

/// Branch cardinalities of a multi-discrete space.
pub type Branches = SmallVec<[u32; 4]>;

/// Describes an observation or action space.
///
/// The serde representation is `"type"`-tagged, matching the JSON wire
/// format backends use to report their spaces:
///
/// ```json
/// { "type": "Discrete", "n": 5 }
/// { "type": "Continuous", "low": -1.0, "high": 1.0, "shape": [3] }
/// ```
///
/// # Examples
///
/// ```
/// use drover_space::SpaceDescriptor;
/// use smallvec::smallvec;
///
/// let space = SpaceDescriptor::Composite {
///     children: vec![
///         SpaceDescriptor::Continuous { low: -1.0, high: 1.0, shape: smallvec![3] },
///         SpaceDescriptor::Discrete { n: 4 },
///     ],
/// };
/// assert_eq!(space.flat_dim(), 4);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SpaceDescriptor {
    /// A bounded box of `f32` values. `low`/`high` are scalar bounds
    /// broadcast over every element.
    Continuous {
        /// Inclusive lower bound for every element.
        low: f32,
        /// Inclusive upper bound for every element.
        high: f32,
        /// Extent per dimension. Empty means a scalar (width 1).
        shape: Shape,
    },
    /// A single categorical choice in `0..n`.
    Discrete {
        /// Number of categories.
        n: u32,
    },
    /// Independent categorical choices, one per branch.
    MultiDiscrete {
        /// Category count per branch.
        branches: Branches,
    },
    /// A fixed-order list of sub-spaces, flattened by concatenation in
    /// declaration order.
    Composite {
        /// Ordered child descriptors.
        children: Vec<SpaceDescriptor>,
    },
}

impl SpaceDescriptor {
    /// Width of the flattened encoding, in `f32` slots.
    ///
    /// One unit per dimension: continuous spaces contribute the product
    /// of their shape, discrete spaces contribute 1, multi-discrete
    /// spaces one per branch, composites the sum over children.
    /// Deterministic and side-effect-free.
    pub fn flat_dim(&self) -> usize {
        match self {
            SpaceDescriptor::Continuous { shape, .. } => shape.iter().product(),
            SpaceDescriptor::Discrete { .. } => 1,
            SpaceDescriptor::MultiDiscrete { branches } => branches.len(),
            SpaceDescriptor::Composite { children } => {
                children.iter().map(SpaceDescriptor::flat_dim).sum()
            }
        }
    }

    /// Reject spaces that cannot feed a vector-observation learner.
    ///
    /// Image-shaped continuous spaces (rank >= 3) anywhere in the tree
    /// fail with [`SpaceError::UnsupportedSpace`].
    pub fn ensure_vector(&self) -> Result<(), SpaceError> {
        match self {
            SpaceDescriptor::Continuous { shape, .. } => {
                if shape.len() >= 3 {
                    return Err(SpaceError::UnsupportedSpace {
                        reason: format!(
                            "continuous space of rank {} is image-shaped; \
                             only vector observations are supported",
                            shape.len()
                        ),
                    });
                }
                Ok(())
            }
            SpaceDescriptor::Discrete { .. } | SpaceDescriptor::MultiDiscrete { .. } => Ok(()),
            SpaceDescriptor::Composite { children } => {
                for child in children {
                    child.ensure_vector()?;
                }
                Ok(())
            }
        }
    }

    /// Bounds/category check for one value.
    ///
    /// Debug builds and test harnesses only — the hot path flattens
    /// without validating.
    pub fn validate(&self, value: &Value) -> bool {
        match (self, value) {
            (SpaceDescriptor::Continuous { low, high, shape }, Value::Continuous(data)) => {
                data.len() == shape.iter().product::<usize>()
                    && data.iter().all(|v| v.is_finite() && *v >= *low && *v <= *high)
            }
            (SpaceDescriptor::Discrete { n }, Value::Discrete(v)) => {
                *v >= 0 && (*v as u64) < u64::from(*n)
            }
            (SpaceDescriptor::MultiDiscrete { branches }, Value::MultiDiscrete(vs)) => {
                vs.len() == branches.len()
                    && vs
                        .iter()
                        .zip(branches.iter())
                        .all(|(v, n)| *v >= 0 && (*v as u64) < u64::from(*n))
            }
            (SpaceDescriptor::Composite { children }, Value::Composite(vs)) => {
                vs.len() == children.len()
                    && children.iter().zip(vs.iter()).all(|(c, v)| c.validate(v))
            }
            _ => false,
        }
    }

    /// Flatten one value into a fresh vector of width [`flat_dim()`].
    ///
    /// # Errors
    ///
    /// [`SpaceError::ShapeMismatch`] if the value's variant or length
    /// disagrees with this descriptor.
    ///
    /// [`flat_dim()`]: Self::flat_dim
    pub fn flatten(&self, value: &Value) -> Result<Vec<f32>, SpaceError> {
        let mut out = vec![0.0; self.flat_dim()];
        self.flatten_into(value, &mut out)?;
        Ok(out)
    }

    /// Flatten one value into a preallocated slice of exactly
    /// [`flat_dim()`](Self::flat_dim) elements.
    ///
    /// Composite children are written in declaration order. Integer
    /// variants are cast to `f32`, never one-hot expanded.
    ///
    /// # Errors
    ///
    /// [`SpaceError::ShapeMismatch`] if the value does not match the
    /// descriptor or `out` has the wrong length.
    pub fn flatten_into(&self, value: &Value, out: &mut [f32]) -> Result<(), SpaceError> {
        if out.len() != self.flat_dim() {
            return Err(self.mismatch(value));
        }
        match (self, value) {
            (SpaceDescriptor::Continuous { .. }, Value::Continuous(data)) => {
                if data.len() != out.len() {
                    return Err(self.mismatch(value));
                }
                out.copy_from_slice(data);
                Ok(())
            }
            (SpaceDescriptor::Discrete { .. }, Value::Discrete(v)) => {
                out[0] = *v as f32;
                Ok(())
            }
            (SpaceDescriptor::MultiDiscrete { branches }, Value::MultiDiscrete(vs)) => {
                if vs.len() != branches.len() {
                    return Err(self.mismatch(value));
                }
                for (slot, v) in out.iter_mut().zip(vs.iter()) {
                    *slot = *v as f32;
                }
                Ok(())
            }
            (SpaceDescriptor::Composite { children }, Value::Composite(vs)) => {
                if vs.len() != children.len() {
                    return Err(self.mismatch(value));
                }
                let mut offset = 0;
                for (child, v) in children.iter().zip(vs.iter()) {
                    let width = child.flat_dim();
                    child.flatten_into(v, &mut out[offset..offset + width])?;
                    offset += width;
                }
                Ok(())
            }
            _ => Err(self.mismatch(value)),
        }
    }

    /// Learner-side inverse of [`flatten`](Self::flatten).
    ///
    /// Reconstructs the structured value from a flat slice of exactly
    /// [`flat_dim()`](Self::flat_dim) elements. Discrete slots are
    /// rounded to the nearest integer. `unflatten(flatten(v)) == v` for
    /// every valid `v`.
    ///
    /// # Errors
    ///
    /// [`SpaceError::ShapeMismatch`] if the slice length disagrees with
    /// the descriptor.
    pub fn unflatten(&self, flat: &[f32]) -> Result<Value, SpaceError> {
        if flat.len() != self.flat_dim() {
            return Err(SpaceError::ShapeMismatch {
                expected: self.to_string(),
                found: format!("slice of {} f32", flat.len()),
            });
        }
        match self {
            SpaceDescriptor::Continuous { .. } => Ok(Value::Continuous(flat.to_vec())),
            SpaceDescriptor::Discrete { .. } => Ok(Value::Discrete(flat[0].round() as i64)),
            SpaceDescriptor::MultiDiscrete { .. } => Ok(Value::MultiDiscrete(
                flat.iter().map(|v| v.round() as i64).collect(),
            )),
            SpaceDescriptor::Composite { children } => {
                let mut offset = 0;
                let mut values = Vec::with_capacity(children.len());
                for child in children {
                    let width = child.flat_dim();
                    values.push(child.unflatten(&flat[offset..offset + width])?);
                    offset += width;
                }
                Ok(Value::Composite(values))
            }
        }
    }

    fn mismatch(&self, value: &Value) -> SpaceError {
        SpaceError::ShapeMismatch {
            expected: self.to_string(),
            found: value.kind_label(),
        }
    }
}

impl fmt::Display for SpaceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpaceDescriptor::Continuous { shape, .. } => {
                write!(f, "Continuous[")?;
                for (i, d) in shape.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{d}")?;
                }
                write!(f, "]")
            }
            SpaceDescriptor::Discrete { n } => write!(f, "Discrete({n})"),
            SpaceDescriptor::MultiDiscrete { branches } => {
                write!(f, "MultiDiscrete[")?;
                for (i, n) in branches.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{n}")?;
                }
                write!(f, "]")
            }
            SpaceDescriptor::Composite { children } => {
                write!(f, "Composite{{")?;
                for (i, c) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{c}")?;
                }
                write!(f, "}}")
            }
        }
    }
}
