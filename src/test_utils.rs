//! Test utilities shared by unit tests, integration tests and benchmarks
//!
//! Builds the descriptors, signals and packets most tests need: a millisecond
//! time domain with a linear rule and explicit `f64` values on top of it.

#![cfg(any(test, feature = "benchmark"))]

use std::sync::Arc;

use crate::types::{DataDescriptor, DataPacket, DataRule, Packet, Ratio, SampleType, Unit};
use crate::{Result, Signal};

/// Origin used by [`ms_domain`].
pub const TEST_EPOCH: &str = "2024-01-01T00:00:00Z";

/// Install a fmt subscriber honouring `RUST_LOG`; repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Integer tick domain advancing `delta` ticks per sample.
pub fn time_domain(delta: i64, resolution: Ratio, origin: Option<&str>) -> Arc<DataDescriptor> {
    let mut builder = DataDescriptor::builder(SampleType::Int64)
        .name("time")
        .rule(DataRule::linear(delta, 0i64))
        .unit(Unit::seconds())
        .tick_resolution(resolution);
    if let Some(origin) = origin {
        builder = builder.origin(origin);
    }
    Arc::new(builder.build().expect("valid time domain"))
}

/// Millisecond tick domain starting at [`TEST_EPOCH`].
pub fn ms_domain(delta: i64) -> Arc<DataDescriptor> {
    time_domain(delta, Ratio::new(1, 1000), Some(TEST_EPOCH))
}

/// Explicit values of `sample_type`.
pub fn values_of(sample_type: SampleType) -> Arc<DataDescriptor> {
    Arc::new(DataDescriptor::builder(sample_type).name("values").build().expect("valid value descriptor"))
}

/// Explicit `f64` values.
pub fn float_values() -> Arc<DataDescriptor> {
    values_of(SampleType::Float64)
}

/// Signal with `f64` values on a millisecond domain of `delta` ticks per sample.
pub fn test_signal(id: &str, delta: i64) -> Signal {
    Signal::new(id, Some(float_values()), Some(ms_domain(delta)))
}

/// `f64` data packet on the signal's current domain starting at tick `offset`.
pub fn data_packet(signal: &Signal, offset: i64, values: &[f64]) -> Packet {
    let value_descriptor = signal.value_descriptor().expect("signal has values");
    let domain_descriptor = signal.domain_descriptor().expect("signal has a domain");
    let domain = DataPacket::implicit(domain_descriptor, values.len(), offset).expect("implicit domain packet");
    let packet = DataPacket::from_samples(value_descriptor, values)
        .expect("values match descriptor")
        .with_domain(Arc::new(domain))
        .expect("domain covers values");
    Packet::from(packet)
}

/// `count` consecutive values starting at `start`.
pub fn ramp(start: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| start + i as f64).collect()
}

/// Send a ramp of `count` samples starting at tick `offset`.
///
/// Values equal the sample index since `first_index`, which makes alignment
/// easy to assert on.
pub fn send_ramp(signal: &Signal, offset: i64, first_index: usize, count: usize) -> Result<()> {
    signal.send_packet(data_packet(signal, offset, &ramp(first_index as f64, count)))
}
