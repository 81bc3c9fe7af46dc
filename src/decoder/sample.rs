//! Typed sample encoding and numeric conversion

use num_complex::{Complex, Complex64};
use std::fmt::Debug;

use crate::types::{RangeInt64, SampleType};

/// Widest representation of a single sample, used as the conversion pivot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int(i64),
    UInt(u64),
    Float(f64),
    Complex(Complex64),
    Range(RangeInt64),
}

impl Scalar {
    /// Real view of the scalar; `None` for complex and range values.
    pub fn as_f64(self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(v as f64),
            Scalar::UInt(v) => Some(v as f64),
            Scalar::Float(v) => Some(v),
            Scalar::Complex(_) | Scalar::Range(_) => None,
        }
    }
}

/// Element types readers can decode into.
///
/// Numeric conversions follow `as` cast semantics: integers wrap, floats
/// saturate when narrowed to integers.
pub trait Sample: Copy + Default + Debug + Send + Sync + 'static {
    /// Wire type with the same layout as `Self`.
    const SAMPLE_TYPE: SampleType;

    /// Decode one element from little-endian bytes.
    fn read_le(bytes: &[u8]) -> Option<Self>;

    /// Append the little-endian encoding of `self` to `out`.
    fn write_le(&self, out: &mut Vec<u8>);

    /// Convert from the pivot, `None` if the kinds are incompatible.
    fn from_scalar(value: Scalar) -> Option<Self>;

    fn to_scalar(self) -> Scalar;
}

macro_rules! impl_real_sample {
    ($ty:ty, $sample_type:expr, $variant:ident, $wide:ty) => {
        impl Sample for $ty {
            const SAMPLE_TYPE: SampleType = $sample_type;

            #[inline]
            fn read_le(bytes: &[u8]) -> Option<Self> {
                let bytes = bytes.get(..std::mem::size_of::<$ty>())?;
                Some(<$ty>::from_le_bytes(bytes.try_into().ok()?))
            }

            #[inline]
            fn write_le(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            #[inline]
            fn from_scalar(value: Scalar) -> Option<Self> {
                match value {
                    Scalar::Int(v) => Some(v as $ty),
                    Scalar::UInt(v) => Some(v as $ty),
                    Scalar::Float(v) => Some(v as $ty),
                    Scalar::Complex(_) | Scalar::Range(_) => None,
                }
            }

            #[inline]
            fn to_scalar(self) -> Scalar {
                Scalar::$variant(self as $wide)
            }
        }
    };
}

impl_real_sample!(i8, SampleType::Int8, Int, i64);
impl_real_sample!(u8, SampleType::UInt8, UInt, u64);
impl_real_sample!(i16, SampleType::Int16, Int, i64);
impl_real_sample!(u16, SampleType::UInt16, UInt, u64);
impl_real_sample!(i32, SampleType::Int32, Int, i64);
impl_real_sample!(u32, SampleType::UInt32, UInt, u64);
impl_real_sample!(i64, SampleType::Int64, Int, i64);
impl_real_sample!(u64, SampleType::UInt64, UInt, u64);
impl_real_sample!(f32, SampleType::Float32, Float, f64);
impl_real_sample!(f64, SampleType::Float64, Float, f64);

macro_rules! impl_complex_sample {
    ($float:ty, $sample_type:expr) => {
        impl Sample for Complex<$float> {
            const SAMPLE_TYPE: SampleType = $sample_type;

            fn read_le(bytes: &[u8]) -> Option<Self> {
                const PART: usize = std::mem::size_of::<$float>();
                let re = <$float>::read_le(bytes)?;
                let im = <$float>::read_le(bytes.get(PART..)?)?;
                Some(Complex::new(re, im))
            }

            fn write_le(&self, out: &mut Vec<u8>) {
                self.re.write_le(out);
                self.im.write_le(out);
            }

            fn from_scalar(value: Scalar) -> Option<Self> {
                match value {
                    Scalar::Complex(c) => Some(Complex::new(c.re as $float, c.im as $float)),
                    Scalar::Range(_) => None,
                    real => real.as_f64().map(|re| Complex::new(re as $float, 0.0)),
                }
            }

            fn to_scalar(self) -> Scalar {
                Scalar::Complex(Complex64::new(self.re as f64, self.im as f64))
            }
        }
    };
}

impl_complex_sample!(f32, SampleType::ComplexFloat32);
impl_complex_sample!(f64, SampleType::ComplexFloat64);

impl Sample for RangeInt64 {
    const SAMPLE_TYPE: SampleType = SampleType::RangeInt64;

    fn read_le(bytes: &[u8]) -> Option<Self> {
        Some(RangeInt64::new(i64::read_le(bytes)?, i64::read_le(bytes.get(8..)?)?))
    }

    fn write_le(&self, out: &mut Vec<u8>) {
        self.start.write_le(out);
        self.end.write_le(out);
    }

    fn from_scalar(value: Scalar) -> Option<Self> {
        match value {
            Scalar::Range(range) => Some(range),
            _ => None,
        }
    }

    fn to_scalar(self) -> Scalar {
        Scalar::Range(self)
    }
}

/// Decode one element of `sample_type` into the pivot representation.
pub fn read_scalar(sample_type: SampleType, bytes: &[u8]) -> Option<Scalar> {
    match sample_type {
        SampleType::Int8 => i8::read_le(bytes).map(Sample::to_scalar),
        SampleType::UInt8 => u8::read_le(bytes).map(Sample::to_scalar),
        SampleType::Int16 => i16::read_le(bytes).map(Sample::to_scalar),
        SampleType::UInt16 => u16::read_le(bytes).map(Sample::to_scalar),
        SampleType::Int32 => i32::read_le(bytes).map(Sample::to_scalar),
        SampleType::UInt32 => u32::read_le(bytes).map(Sample::to_scalar),
        SampleType::Int64 => i64::read_le(bytes).map(Sample::to_scalar),
        SampleType::UInt64 => u64::read_le(bytes).map(Sample::to_scalar),
        SampleType::Float32 => f32::read_le(bytes).map(Sample::to_scalar),
        SampleType::Float64 => f64::read_le(bytes).map(Sample::to_scalar),
        SampleType::ComplexFloat32 => Complex::<f32>::read_le(bytes).map(Sample::to_scalar),
        SampleType::ComplexFloat64 => Complex::<f64>::read_le(bytes).map(Sample::to_scalar),
        SampleType::RangeInt64 => RangeInt64::read_le(bytes).map(Sample::to_scalar),
        SampleType::Binary | SampleType::String | SampleType::Struct => None,
    }
}
