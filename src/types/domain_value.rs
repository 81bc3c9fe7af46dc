//! Tagged numeric used for domain offsets, deltas and gap sizes

use serde::{Deserialize, Serialize};
use std::fmt;

use super::SampleType;

/// A domain quantity whose representation follows the domain sample type.
///
/// Integer domains (ticks) use `Int`, floating domains use `Float`. Mixed
/// arithmetic promotes to `Float`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DomainValue {
    Int(i64),
    Float(f64),
}

impl DomainValue {
    /// Zero in the representation used by `sample_type`.
    pub fn zero_for(sample_type: SampleType) -> Self {
        if sample_type.is_float() { DomainValue::Float(0.0) } else { DomainValue::Int(0) }
    }

    /// Convert into the representation used by `sample_type`.
    pub fn cast_for(self, sample_type: SampleType) -> Self {
        match (self, sample_type.is_float()) {
            (DomainValue::Int(v), true) => DomainValue::Float(v as f64),
            (DomainValue::Float(v), false) => DomainValue::Int(v.round() as i64),
            (value, _) => value,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            DomainValue::Int(v) => v as f64,
            DomainValue::Float(v) => v,
        }
    }

    /// Integer view; floats are truncated toward zero.
    pub fn as_i64(self) -> i64 {
        match self {
            DomainValue::Int(v) => v,
            DomainValue::Float(v) => v as i64,
        }
    }

    pub fn is_int(self) -> bool {
        matches!(self, DomainValue::Int(_))
    }

    pub fn checked_add(self, other: DomainValue) -> Option<DomainValue> {
        match (self, other) {
            (DomainValue::Int(a), DomainValue::Int(b)) => a.checked_add(b).map(DomainValue::Int),
            (a, b) => Some(DomainValue::Float(a.as_f64() + b.as_f64())),
        }
    }

    pub fn checked_sub(self, other: DomainValue) -> Option<DomainValue> {
        match (self, other) {
            (DomainValue::Int(a), DomainValue::Int(b)) => a.checked_sub(b).map(DomainValue::Int),
            (a, b) => Some(DomainValue::Float(a.as_f64() - b.as_f64())),
        }
    }

    /// `self * count`, used to advance by a number of samples.
    pub fn checked_scale(self, count: usize) -> Option<DomainValue> {
        match self {
            DomainValue::Int(v) => {
                i64::try_from(count).ok().and_then(|n| v.checked_mul(n)).map(DomainValue::Int)
            }
            DomainValue::Float(v) => Some(DomainValue::Float(v * count as f64)),
        }
    }

    /// Whether two domain positions denote the same point.
    ///
    /// Floating positions compare within `1e-9` of `step`, which absorbs
    /// accumulated rounding from repeated additions of the delta.
    pub fn same_position(self, other: DomainValue, step: DomainValue) -> bool {
        match (self, other) {
            (DomainValue::Int(a), DomainValue::Int(b)) => a == b,
            (a, b) => (a.as_f64() - b.as_f64()).abs() <= step.as_f64().abs() * 1e-9,
        }
    }
}

impl Default for DomainValue {
    fn default() -> Self {
        DomainValue::Int(0)
    }
}

impl From<i64> for DomainValue {
    fn from(value: i64) -> Self {
        DomainValue::Int(value)
    }
}

impl From<f64> for DomainValue {
    fn from(value: f64) -> Self {
        DomainValue::Float(value)
    }
}

impl fmt::Display for DomainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainValue::Int(v) => write!(f, "{}", v),
            DomainValue::Float(v) => write!(f, "{}", v),
        }
    }
}
