//! Core types describing signal data.
//!
//! ## Architecture
//!
//! - [`DataDescriptor`] describes the layout of a signal's samples: element
//!   type, data rule, optional post-scaling, unit, and for domain signals the
//!   origin and tick resolution.
//! - [`Packet`] is the unit of transfer. Data packets share their buffer via
//!   `Arc<[u8]>` so fan-out to several connections never copies samples.
//! - [`EventPacket`] carries descriptor changes and detected gaps in-line with
//!   data so readers observe them at the right position.
//! - [`DomainValue`] and [`Ratio`] hold domain offsets and resolutions.
//!
//! ## Usage Example
//!
//! ```rust
//! use daq_reader::types::{DataDescriptor, DataPacket, DataRule, Ratio, SampleType};
//! use std::sync::Arc;
//!
//! let domain = Arc::new(
//!     DataDescriptor::builder(SampleType::Int64)
//!         .name("time")
//!         .rule(DataRule::linear(100i64, 0i64))
//!         .tick_resolution(Ratio::new(1, 1000))
//!         .origin("2024-01-01T00:00:00Z")
//!         .build()
//!         .unwrap(),
//! );
//!
//! let packet = DataPacket::implicit(domain, 10, 5_000i64).unwrap();
//! assert_eq!(packet.sample_count, 10);
//! assert_eq!(packet.domain_offset().unwrap().as_i64(), 5_000);
//! ```

mod descriptor;
mod domain_value;
mod packet;
mod ratio;
mod read_mode;
mod rule;
mod sample_type;

pub use descriptor::{DataDescriptor, DataDescriptorBuilder, Unit};
pub use domain_value::DomainValue;
pub use packet::{DataPacket, EventPacket, EventParameter, Packet, event_ids, event_params};
pub use ratio::{Ratio, checked_lcm, gcd};
pub use read_mode::{ReadMode, ReadStatus, ReadTimeoutType, SyncStatus};
pub use rule::{DataRule, Scaling};
pub use sample_type::{RangeInt64, SampleType};
