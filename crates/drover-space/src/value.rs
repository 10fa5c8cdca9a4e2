//! Sampled values of a space.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// One sampled point of a [`SpaceDescriptor`](crate::SpaceDescriptor).
///
/// The variant must match the descriptor's variant: flattening a
/// `Discrete` value against a `Continuous` descriptor is a
/// `ShapeMismatch`. Composite values carry one child value per child
/// descriptor, in declaration order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// A point in a continuous box, row-major over the descriptor's
    /// shape.
    Continuous(Vec<f32>),
    /// A single category choice.
    Discrete(i64),
    /// One category choice per branch.
    MultiDiscrete(SmallVec<[i64; 4]>),
    /// One child value per composite child, in declaration order.
    Composite(Vec<Value>),
}

impl Value {
    /// Compact description used in error messages, e.g. `Continuous(6)`.
    pub fn kind_label(&self) -> String {
        match self {
            Value::Continuous(v) => format!("Continuous({})", v.len()),
            Value::Discrete(_) => "Discrete".to_string(),
            Value::MultiDiscrete(v) => format!("MultiDiscrete({})", v.len()),
            Value::Composite(v) => format!("Composite({})", v.len()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind_label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn kind_labels() {
        assert_eq!(Value::Continuous(vec![0.0; 6]).kind_label(), "Continuous(6)");
        assert_eq!(Value::Discrete(2).kind_label(), "Discrete");
        assert_eq!(
            Value::MultiDiscrete(smallvec![0, 1]).kind_label(),
            "MultiDiscrete(2)"
        );
        assert_eq!(
            Value::Composite(vec![Value::Discrete(0)]).kind_label(),
            "Composite(1)"
        );
    }
}
