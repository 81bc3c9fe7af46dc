//! Sample type definitions

use serde::{Deserialize, Serialize};

/// Element types a signal can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    /// Pair of 32-bit floats (real, imaginary)
    ComplexFloat32,
    /// Pair of 64-bit floats (real, imaginary)
    ComplexFloat64,
    /// Pair of 64-bit signed integers (start, end)
    RangeInt64,
    /// Opaque bytes of producer-defined length
    Binary,
    /// UTF-8 text of producer-defined length
    String,
    /// Composite record described elsewhere
    Struct,
}

impl SampleType {
    /// Size in bytes of one element, or 0 for variable-size types.
    pub const fn size(&self) -> usize {
        match self {
            SampleType::Int8 | SampleType::UInt8 => 1,
            SampleType::Int16 | SampleType::UInt16 => 2,
            SampleType::Int32 | SampleType::UInt32 | SampleType::Float32 => 4,
            SampleType::Int64 | SampleType::UInt64 | SampleType::Float64 => 8,
            SampleType::ComplexFloat32 => 8,
            SampleType::ComplexFloat64 | SampleType::RangeInt64 => 16,
            SampleType::Binary | SampleType::String | SampleType::Struct => 0,
        }
    }

    /// Whether every element occupies the same number of bytes.
    pub const fn is_fixed_size(&self) -> bool {
        self.size() != 0
    }

    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            SampleType::Int8
                | SampleType::UInt8
                | SampleType::Int16
                | SampleType::UInt16
                | SampleType::Int32
                | SampleType::UInt32
                | SampleType::Int64
                | SampleType::UInt64
        )
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, SampleType::Float32 | SampleType::Float64)
    }

    /// Integer or floating point scalar.
    pub const fn is_real(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub const fn is_complex(&self) -> bool {
        matches!(self, SampleType::ComplexFloat32 | SampleType::ComplexFloat64)
    }

    /// Whether samples of this type can be converted into `target`.
    ///
    /// Real scalars convert between each other and widen into complex;
    /// complex only converts into complex; ranges only into ranges.
    /// Variable-size types never convert.
    pub const fn converts_to(&self, target: SampleType) -> bool {
        if self.is_real() {
            target.is_real() || target.is_complex()
        } else if self.is_complex() {
            target.is_complex()
        } else {
            matches!((self, target), (SampleType::RangeInt64, SampleType::RangeInt64))
        }
    }
}

/// Inclusive start/end pair carried by [`SampleType::RangeInt64`] signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeInt64 {
    pub start: i64,
    pub end: i64,
}

impl RangeInt64 {
    pub const fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }
}
