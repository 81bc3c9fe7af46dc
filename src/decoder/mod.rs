//! Conversion of packet contents into caller-typed buffers.
//!
//! A [`SampleDecoder`] is bound to one descriptor and one read mode. Binding
//! checks convertibility once, so decoding itself only fails on malformed
//! packets. Decoding holds no state between calls.

mod sample;

pub use sample::{Sample, Scalar, read_scalar};

use std::marker::PhantomData;
use std::sync::Arc;

use crate::types::{DataDescriptor, DataPacket, DomainValue, ReadMode, SampleType};
use crate::{ReaderError, Result};

/// Decodes samples of one descriptor into `T`.
#[derive(Debug, Clone)]
pub struct SampleDecoder<T: Sample> {
    descriptor: Arc<DataDescriptor>,
    mode: ReadMode,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Sample> SampleDecoder<T> {
    /// Bind a decoder, checking that `descriptor` can be read as `T` in `mode`.
    ///
    /// Fails with `InvalidSampleType` for unconvertible types and with
    /// `Unsupported` for implicit rules read as raw values.
    pub fn for_descriptor(descriptor: Arc<DataDescriptor>, mode: ReadMode) -> Result<Self> {
        let source = source_type(&descriptor, mode);
        let mismatch = || ReaderError::InvalidSampleType { sample_type: source, read_type: T::SAMPLE_TYPE };

        match mode {
            ReadMode::RawValue => {
                if !descriptor.rule.is_explicit() {
                    return Err(ReaderError::unsupported(format!(
                        "'{}' uses an implicit rule and has no raw values",
                        descriptor.name
                    )));
                }
                if !source.is_fixed_size() || source.size() != T::SAMPLE_TYPE.size() {
                    return Err(mismatch());
                }
            }
            ReadMode::Unscaled | ReadMode::Scaled => {
                if !source.converts_to(T::SAMPLE_TYPE) {
                    return Err(mismatch());
                }
            }
        }

        Ok(Self { descriptor, mode, _marker: PhantomData })
    }

    pub fn descriptor(&self) -> &Arc<DataDescriptor> {
        &self.descriptor
    }

    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    /// Decode `out.len()` samples of `packet` starting at sample `start`.
    pub fn decode(&self, packet: &DataPacket, start: usize, out: &mut [T]) -> Result<()> {
        let end = checked_end(packet, start, out.len())?;
        if self.descriptor.rule.is_explicit() {
            self.decode_explicit(packet, start, end, out)
        } else {
            self.decode_implicit(packet, start, out)
        }
    }

    /// Check that `len` samples of `packet` from `start` are decodable
    /// without decoding them.
    ///
    /// Catches packets whose buffer does not hold samples of the bound
    /// descriptor's raw type. Per-sample conversion failures still surface
    /// only from [`decode`](Self::decode).
    pub fn check(&self, packet: &DataPacket, start: usize, len: usize) -> Result<()> {
        let end = checked_end(packet, start, len)?;
        if self.descriptor.rule.is_explicit() {
            self.explicit_bytes(packet, start, end)?;
        }
        Ok(())
    }

    fn explicit_bytes<'p>(&self, packet: &'p DataPacket, start: usize, end: usize) -> Result<&'p [u8]> {
        let raw_type = self.descriptor.raw_sample_type();
        let packet_type = packet.descriptor.raw_sample_type();
        if packet_type != raw_type {
            return Err(ReaderError::InvalidSampleType { sample_type: packet_type, read_type: raw_type });
        }
        let size = raw_type.size();
        packet.raw_bytes().and_then(|bytes| bytes.get(start * size..end * size)).ok_or_else(|| {
            ReaderError::invalid_state(format!("packet of '{}' has no buffer for its samples", self.descriptor.name))
        })
    }

    fn decode_explicit(&self, packet: &DataPacket, start: usize, end: usize, out: &mut [T]) -> Result<()> {
        let raw_type = self.descriptor.raw_sample_type();
        let size = raw_type.size();
        let bytes = self.explicit_bytes(packet, start, end)?;

        let scaling = self.descriptor.post_scaling.as_ref().filter(|_| self.mode.applies_scaling());

        for (slot, chunk) in out.iter_mut().zip(bytes.chunks_exact(size)) {
            *slot = match self.mode {
                ReadMode::RawValue => T::read_le(chunk),
                ReadMode::Unscaled | ReadMode::Scaled => {
                    let mut scalar = read_scalar(raw_type, chunk);
                    if let Some(scaling) = scaling {
                        scalar = scalar
                            .and_then(Scalar::as_f64)
                            .map(|raw| cast_to(scaling.apply(raw), scaling.output_type));
                    }
                    scalar.and_then(T::from_scalar)
                }
            }
            .ok_or_else(|| self.conversion_error())?;
        }
        Ok(())
    }

    fn decode_implicit(&self, packet: &DataPacket, start: usize, out: &mut [T]) -> Result<()> {
        let sample_type = self.descriptor.sample_type;
        for (index, slot) in (start..).zip(out.iter_mut()) {
            let value = self.descriptor.rule.evaluate(packet.offset, index).ok_or_else(|| {
                ReaderError::overflow(format!("evaluating rule of '{}' at sample {}", self.descriptor.name, index))
            })?;
            let scalar = match value.cast_for(sample_type) {
                DomainValue::Int(v) => Scalar::Int(v),
                DomainValue::Float(v) => Scalar::Float(v),
            };
            *slot = T::from_scalar(scalar).ok_or_else(|| self.conversion_error())?;
        }
        Ok(())
    }

    fn conversion_error(&self) -> ReaderError {
        ReaderError::InvalidSampleType {
            sample_type: source_type(&self.descriptor, self.mode),
            read_type: T::SAMPLE_TYPE,
        }
    }
}

/// End of the sample range `start..start + len`, if it lies within `packet`.
fn checked_end(packet: &DataPacket, start: usize, len: usize) -> Result<usize> {
    start.checked_add(len).filter(|&end| end <= packet.sample_count).ok_or_else(|| {
        ReaderError::invalid_parameter(format!(
            "decode of {} samples at {} exceeds packet of {}",
            len, start, packet.sample_count
        ))
    })
}

/// Type the decoder reads from before converting into the caller's type.
fn source_type(descriptor: &DataDescriptor, mode: ReadMode) -> SampleType {
    if descriptor.rule.is_explicit() && !mode.applies_scaling() {
        descriptor.raw_sample_type()
    } else {
        descriptor.sample_type
    }
}

fn cast_to(value: f64, sample_type: SampleType) -> Scalar {
    if sample_type.is_integer() { Scalar::Int(value.round() as i64) } else { Scalar::Float(value) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataRule, RangeInt64, Scaling};
    use num_complex::Complex;
    use proptest::prelude::*;

    fn descriptor(sample_type: SampleType) -> Arc<DataDescriptor> {
        Arc::new(DataDescriptor::builder(sample_type).name("values").build().unwrap())
    }

    fn scaled_i16() -> Arc<DataDescriptor> {
        Arc::new(
            DataDescriptor::builder(SampleType::Float64)
                .name("scaled")
                .post_scaling(Scaling::linear(SampleType::Int16, SampleType::Float64, 0.5, 10.0))
                .build()
                .unwrap(),
        )
    }

    fn decode_all<T: Sample>(descriptor: Arc<DataDescriptor>, mode: ReadMode, packet: &DataPacket) -> Result<Vec<T>> {
        let decoder = SampleDecoder::<T>::for_descriptor(descriptor, mode)?;
        let mut out = vec![T::default(); packet.sample_count];
        decoder.decode(packet, 0, &mut out)?;
        Ok(out)
    }

    proptest! {
        #[test]
        fn prop_raw_decoding_is_bit_identical_and_repeatable(values in prop::collection::vec(any::<f64>(), 0..64)) {
            let packet = DataPacket::from_samples(descriptor(SampleType::Float64), &values).unwrap();
            let decoder = SampleDecoder::<u64>::for_descriptor(packet.descriptor.clone(), ReadMode::RawValue).unwrap();

            let mut first = vec![0u64; values.len()];
            let mut second = vec![0u64; values.len()];
            decoder.decode(&packet, 0, &mut first).unwrap();
            decoder.decode(&packet, 0, &mut second).unwrap();

            prop_assert_eq!(&first, &second);
            for (bits, value) in first.iter().zip(&values) {
                prop_assert_eq!(*bits, value.to_bits());
            }
        }

        #[test]
        fn prop_integers_widen_exactly(values in prop::collection::vec(any::<i32>(), 1..64)) {
            let packet = DataPacket::from_samples(descriptor(SampleType::Int32), &values).unwrap();
            let out: Vec<f64> = decode_all(packet.descriptor.clone(), ReadMode::Scaled, &packet).unwrap();
            for (decoded, value) in out.iter().zip(&values) {
                prop_assert_eq!(*decoded, *value as f64);
            }
        }

        #[test]
        fn prop_partial_decode_matches_slice(values in prop::collection::vec(any::<i16>(), 1..64), split in 0usize..64) {
            let split = split % values.len();
            let packet = DataPacket::from_samples(descriptor(SampleType::Int16), &values).unwrap();
            let decoder = SampleDecoder::<i64>::for_descriptor(packet.descriptor.clone(), ReadMode::Unscaled).unwrap();
            let mut out = vec![0i64; values.len() - split];
            decoder.decode(&packet, split, &mut out).unwrap();
            let expected: Vec<i64> = values[split..].iter().map(|&v| v as i64).collect();
            prop_assert_eq!(out, expected);
        }
    }

    #[test]
    fn scaled_mode_applies_post_scaling() {
        let packet = DataPacket::from_samples(scaled_i16(), &[0i16, 2, -4]).unwrap();
        let out: Vec<f64> = decode_all(scaled_i16(), ReadMode::Scaled, &packet).unwrap();
        assert_eq!(out, vec![10.0, 11.0, 8.0]);
    }

    #[test]
    fn unscaled_mode_returns_raw_numbers() {
        let packet = DataPacket::from_samples(scaled_i16(), &[0i16, 2, -4]).unwrap();
        let out: Vec<f64> = decode_all(scaled_i16(), ReadMode::Unscaled, &packet).unwrap();
        assert_eq!(out, vec![0.0, 2.0, -4.0]);
    }

    #[test]
    fn raw_mode_requires_matching_size() {
        let error = SampleDecoder::<f32>::for_descriptor(scaled_i16(), ReadMode::RawValue).unwrap_err();
        assert!(matches!(
            error,
            ReaderError::InvalidSampleType { sample_type: SampleType::Int16, read_type: SampleType::Float32 }
        ));
        let packet = DataPacket::from_samples(scaled_i16(), &[-1i16]).unwrap();
        let out: Vec<u16> = decode_all(scaled_i16(), ReadMode::RawValue, &packet).unwrap();
        assert_eq!(out, vec![u16::MAX]);
    }

    #[test]
    fn struct_samples_do_not_decode_as_numbers() {
        let error = SampleDecoder::<f64>::for_descriptor(descriptor(SampleType::Struct), ReadMode::Scaled).unwrap_err();
        assert!(matches!(error, ReaderError::InvalidSampleType { sample_type: SampleType::Struct, .. }));
    }

    #[test]
    fn complex_does_not_narrow_to_real() {
        assert!(SampleDecoder::<f64>::for_descriptor(descriptor(SampleType::ComplexFloat32), ReadMode::Scaled).is_err());
        assert!(
            SampleDecoder::<Complex<f64>>::for_descriptor(descriptor(SampleType::ComplexFloat32), ReadMode::Scaled)
                .is_ok()
        );
    }

    #[test]
    fn real_widens_into_complex() {
        let packet = DataPacket::from_samples(descriptor(SampleType::Float32), &[1.5f32, -2.0]).unwrap();
        let out: Vec<Complex<f64>> = decode_all(packet.descriptor.clone(), ReadMode::Scaled, &packet).unwrap();
        assert_eq!(out, vec![Complex::new(1.5, 0.0), Complex::new(-2.0, 0.0)]);
    }

    #[test]
    fn ranges_decode_as_ranges() {
        let ranges = [RangeInt64::new(0, 9), RangeInt64::new(10, 19)];
        let packet = DataPacket::from_samples(descriptor(SampleType::RangeInt64), &ranges).unwrap();
        let out: Vec<RangeInt64> = decode_all(packet.descriptor.clone(), ReadMode::Scaled, &packet).unwrap();
        assert_eq!(out, ranges.to_vec());
    }

    #[test]
    fn linear_rule_evaluates_from_packet_offset() {
        let domain = Arc::new(
            DataDescriptor::builder(SampleType::Int64).rule(DataRule::linear(10i64, 5i64)).build().unwrap(),
        );
        let packet = DataPacket::implicit(domain.clone(), 4, 1_000i64).unwrap();
        let decoder = SampleDecoder::<i64>::for_descriptor(domain, ReadMode::Unscaled).unwrap();
        let mut out = [0i64; 2];
        decoder.decode(&packet, 2, &mut out).unwrap();
        assert_eq!(out, [1_025, 1_035]);
    }

    #[test]
    fn constant_and_list_rules() {
        let constant = Arc::new(
            DataDescriptor::builder(SampleType::Float64)
                .rule(DataRule::Constant(DomainValue::Float(3.5)))
                .build()
                .unwrap(),
        );
        let packet = DataPacket::implicit(constant.clone(), 3, 0.0).unwrap();
        let out: Vec<f32> = decode_all(constant, ReadMode::Scaled, &packet).unwrap();
        assert_eq!(out, vec![3.5; 3]);

        let list = Arc::new(
            DataDescriptor::builder(SampleType::Float64).rule(DataRule::List(vec![1.0, 2.0, 4.0])).build().unwrap(),
        );
        let packet = DataPacket::implicit(list.clone(), 3, 100.0).unwrap();
        let out: Vec<f64> = decode_all(list, ReadMode::Unscaled, &packet).unwrap();
        assert_eq!(out, vec![101.0, 102.0, 104.0]);
    }

    #[test]
    fn implicit_rule_in_raw_mode_is_unsupported() {
        let domain = Arc::new(
            DataDescriptor::builder(SampleType::Int64).rule(DataRule::linear(1i64, 0i64)).build().unwrap(),
        );
        let error = SampleDecoder::<i64>::for_descriptor(domain, ReadMode::RawValue).unwrap_err();
        assert!(matches!(error, ReaderError::Unsupported { .. }));
    }

    #[test]
    fn decode_past_packet_end_is_rejected() {
        let packet = DataPacket::from_samples(descriptor(SampleType::Int8), &[1i8, 2]).unwrap();
        let decoder = SampleDecoder::<i8>::for_descriptor(packet.descriptor.clone(), ReadMode::Scaled).unwrap();
        let mut out = [0i8; 2];
        assert!(decoder.decode(&packet, 1, &mut out).is_err());
    }

    #[test]
    fn packet_of_another_raw_type_is_rejected() {
        let packet = DataPacket::from_samples(descriptor(SampleType::Int8), &[1i8, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let decoder = SampleDecoder::<f64>::for_descriptor(descriptor(SampleType::Float64), ReadMode::Scaled).unwrap();

        let error = decoder.check(&packet, 0, 1).unwrap_err();
        assert!(matches!(
            error,
            ReaderError::InvalidSampleType { sample_type: SampleType::Int8, read_type: SampleType::Float64 }
        ));
        let mut out = [0.0; 1];
        assert!(decoder.decode(&packet, 0, &mut out).is_err());
    }

    #[test]
    fn check_accepts_what_decode_reads() {
        let packet = DataPacket::from_samples(descriptor(SampleType::Int16), &[1i16, 2, 3]).unwrap();
        let decoder = SampleDecoder::<f64>::for_descriptor(packet.descriptor.clone(), ReadMode::Scaled).unwrap();
        assert!(decoder.check(&packet, 1, 2).is_ok());
        assert!(decoder.check(&packet, 2, 2).is_err());
    }
}
