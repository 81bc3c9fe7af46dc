//! Data rules and post-scaling

use serde::{Deserialize, Serialize};

use super::{DomainValue, SampleType};

/// How the values of a signal are produced from the sample index.
///
/// Implicit rules (everything but `Explicit`) are evaluated relative to the
/// packet offset, so a packet needs no buffer to carry them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum DataRule {
    /// Values travel in the packet buffer.
    #[default]
    Explicit,
    /// `offset + start + index * delta`
    Linear { delta: DomainValue, start: DomainValue },
    /// Every sample has the same value.
    Constant(DomainValue),
    /// `offset + base^(start + index * delta)`
    Logarithmic { delta: f64, start: f64, base: f64 },
    /// `offset + values[index]`
    List(Vec<f64>),
}

impl DataRule {
    pub fn linear(delta: impl Into<DomainValue>, start: impl Into<DomainValue>) -> Self {
        DataRule::Linear { delta: delta.into(), start: start.into() }
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self, DataRule::Explicit)
    }

    pub fn is_linear(&self) -> bool {
        matches!(self, DataRule::Linear { .. })
    }

    /// Delta and start of a linear rule.
    pub fn linear_parameters(&self) -> Option<(DomainValue, DomainValue)> {
        match self {
            DataRule::Linear { delta, start } => Some((*delta, *start)),
            _ => None,
        }
    }

    /// Evaluate the rule for sample `index` of a packet placed at `offset`.
    ///
    /// Returns `None` for `Explicit`, an out-of-range list index, or overflow.
    pub fn evaluate(&self, offset: DomainValue, index: usize) -> Option<DomainValue> {
        match self {
            DataRule::Explicit => None,
            DataRule::Linear { delta, start } => {
                offset.checked_add(*start)?.checked_add(delta.checked_scale(index)?)
            }
            DataRule::Constant(value) => Some(*value),
            DataRule::Logarithmic { delta, start, base } => {
                let exponent = start + index as f64 * delta;
                offset.checked_add(DomainValue::Float(base.powf(exponent)))
            }
            DataRule::List(values) => {
                offset.checked_add(DomainValue::Float(*values.get(index)?))
            }
        }
    }
}

/// Post-scaling applied to raw samples: `raw * scale + offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaling {
    /// Type of the raw samples in the packet buffer.
    pub input_type: SampleType,
    /// Type of the scaled samples (the descriptor's sample type).
    pub output_type: SampleType,
    pub scale: f64,
    pub offset: f64,
}

impl Scaling {
    pub fn linear(input_type: SampleType, output_type: SampleType, scale: f64, offset: f64) -> Self {
        Self { input_type, output_type, scale, offset }
    }

    #[inline]
    pub fn apply(&self, raw: f64) -> f64 {
        raw * self.scale + self.offset
    }
}
