//! Packet queues and synchronized readers for data-acquisition signals.
//!
//! Signals publish packets of samples. Each connection between a signal and an
//! input port is a FIFO packet queue with gap detection; readers drain those
//! queues into typed buffers.
//!
//! # Features
//!
//! - **Zero-copy fan-out**: packet buffers are shared between connections
//! - **In-band events**: descriptor changes and domain gaps arrive in order with data
//! - **Multi-rate synchronization**: signals with different sample rates, tick
//!   resolutions and origins are aligned on a common domain
//! - **Typed decoding**: raw, unscaled or scaled reads into any numeric type
//! - **Blocking and async**: timeouts on reads, plus notification streams
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use daq_reader::types::{DataDescriptor, DataPacket, DataRule, Packet, Ratio, SampleType};
//! use daq_reader::{MultiReaderBuilder, Signal};
//!
//! fn domain(delta: i64) -> Arc<DataDescriptor> {
//!     Arc::new(
//!         DataDescriptor::builder(SampleType::Int64)
//!             .rule(DataRule::linear(delta, 0i64))
//!             .tick_resolution(Ratio::new(1, 1000))
//!             .build()
//!             .unwrap(),
//!     )
//! }
//!
//! fn packet(signal: &Signal, offset: i64, values: &[f64]) -> Packet {
//!     let time = DataPacket::implicit(signal.domain_descriptor().unwrap(), values.len(), offset).unwrap();
//!     DataPacket::from_samples(signal.value_descriptor().unwrap(), values)
//!         .unwrap()
//!         .with_domain(Arc::new(time))
//!         .unwrap()
//!         .into()
//! }
//!
//! let values = Arc::new(DataDescriptor::builder(SampleType::Float64).build().unwrap());
//! let fast = Signal::new("fast", Some(values.clone()), Some(domain(1)));
//! let slow = Signal::new("slow", Some(values), Some(domain(2)));
//!
//! let mut reader = MultiReaderBuilder::<f64, i64>::new().add_signal(&fast).add_signal(&slow).build().unwrap();
//! assert_eq!(reader.sample_rate_dividers(), vec![2, 1]);
//!
//! fast.send_packet(packet(&fast, 0, &[0.0, 1.0, 2.0, 3.0])).unwrap();
//! slow.send_packet(packet(&slow, 0, &[10.0, 11.0])).unwrap();
//!
//! let mut fast_values = [0.0; 4];
//! let mut slow_values = [0.0; 2];
//! let status = reader.read(&mut [&mut fast_values[..], &mut slow_values[..]], 2, Duration::ZERO).unwrap();
//! assert_eq!(status.count, 2);
//! assert_eq!(slow_values, [10.0, 11.0]);
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Packet transport
pub mod connection;
pub mod executor;
pub mod signal;
pub mod source;

// Reading
pub mod decoder;
pub mod reader;
pub mod stream;

// Core exports
pub use error::*;
pub use types::*;

pub use connection::{Connection, InputPort, Notifier};
pub use decoder::{Sample, SampleDecoder};
pub use executor::{InlineExecutor, TaskExecutor, ThreadExecutor, TokioExecutor};
pub use signal::Signal;
pub use source::{EventSink, PacketSource};

// Reader exports
pub use reader::{
    AUTO_SAMPLE_RATE, BlockReader, BlockReaderBuilder, FailureReason, MultiReader, MultiReaderBuilder,
    MultiReaderStatus, ReaderConfig, ReaderSource, ReaderStatus, SignalFailure, StreamReader,
    StreamReaderBuilder, TailReader, TailReaderBuilder,
};
