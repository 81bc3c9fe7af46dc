//! Helpers shared by the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use daq_reader::types::{DataDescriptor, DataPacket, DataRule, Packet, Ratio, SampleType};
use daq_reader::Signal;

pub const EPOCH: &str = "2024-01-01T00:00:00Z";

/// Millisecond tick domain advancing `delta` ticks per sample.
pub fn ms_domain(delta: i64) -> Arc<DataDescriptor> {
    Arc::new(
        DataDescriptor::builder(SampleType::Int64)
            .name("time")
            .rule(DataRule::linear(delta, 0i64))
            .tick_resolution(Ratio::new(1, 1000))
            .origin(EPOCH)
            .build()
            .unwrap(),
    )
}

pub fn float_values() -> Arc<DataDescriptor> {
    Arc::new(DataDescriptor::builder(SampleType::Float64).name("values").build().unwrap())
}

pub fn signal(id: &str, delta: i64) -> Signal {
    Signal::new(id, Some(float_values()), Some(ms_domain(delta)))
}

/// `count` samples from tick `first`, each valued at its own tick.
pub fn tick_packet(signal: &Signal, first: i64, count: usize) -> Packet {
    let domain_descriptor = signal.domain_descriptor().unwrap();
    let delta = match domain_descriptor.rule.linear_parameters() {
        Some((delta, _)) => delta.as_i64(),
        None => 1,
    };
    let values: Vec<f64> = (0..count as i64).map(|i| (first + i * delta) as f64).collect();
    let domain = DataPacket::implicit(domain_descriptor, count, first).unwrap();
    DataPacket::from_samples(signal.value_descriptor().unwrap(), &values)
        .unwrap()
        .with_domain(Arc::new(domain))
        .unwrap()
        .into()
}

pub fn send_ticks(signal: &Signal, first: i64, count: usize) {
    signal.send_packet(tick_packet(signal, first, count)).unwrap();
}
