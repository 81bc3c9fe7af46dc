//! Packet types flowing from signals to readers

use std::collections::HashMap;
use std::sync::Arc;

use super::{DataDescriptor, DomainValue};
use crate::decoder::Sample;
use crate::{ReaderError, Result};

/// Event identifiers understood by the reader engine.
pub mod event_ids {
    /// Sent by a signal when its value or domain descriptor changes.
    pub const DATA_DESCRIPTOR_CHANGED: &str = "DATA_DESCRIPTOR_CHANGED";
    /// Inserted by a connection when the implicit domain skips ahead.
    pub const IMPLICIT_DOMAIN_GAP_DETECTED: &str = "IMPLICIT_DOMAIN_GAP_DETECTED";
}

/// Event parameter keys forming the contract with producers.
pub mod event_params {
    pub const DATA_DESCRIPTOR: &str = "DATA_DESCRIPTOR";
    pub const DOMAIN_DATA_DESCRIPTOR: &str = "DOMAIN_DATA_DESCRIPTOR";
    pub const DIFF: &str = "DIFF";
}

/// Unit of transfer between a signal and a reader.
///
/// Cloning only bumps a reference count; the payload is never mutated once
/// constructed.
#[derive(Debug, Clone)]
pub enum Packet {
    Data(Arc<DataPacket>),
    Event(Arc<EventPacket>),
}

impl Packet {
    /// Number of samples carried (0 for events).
    pub fn sample_count(&self) -> usize {
        match self {
            Packet::Data(data) => data.sample_count,
            Packet::Event(_) => 0,
        }
    }

    pub fn is_event(&self) -> bool {
        matches!(self, Packet::Event(_))
    }

    pub fn as_data(&self) -> Option<&Arc<DataPacket>> {
        match self {
            Packet::Data(data) => Some(data),
            Packet::Event(_) => None,
        }
    }

    pub fn as_event(&self) -> Option<&Arc<EventPacket>> {
        match self {
            Packet::Event(event) => Some(event),
            Packet::Data(_) => None,
        }
    }

    pub fn is_descriptor_changed(&self) -> bool {
        self.as_event().is_some_and(|e| e.is_descriptor_changed())
    }

    pub fn is_gap(&self) -> bool {
        self.as_event().is_some_and(|e| e.is_gap())
    }

    /// Whether two handles refer to the same packet.
    pub fn ptr_eq(&self, other: &Packet) -> bool {
        match (self, other) {
            (Packet::Data(a), Packet::Data(b)) => Arc::ptr_eq(a, b),
            (Packet::Event(a), Packet::Event(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<DataPacket> for Packet {
    fn from(packet: DataPacket) -> Self {
        Packet::Data(Arc::new(packet))
    }
}

impl From<EventPacket> for Packet {
    fn from(packet: EventPacket) -> Self {
        Packet::Event(Arc::new(packet))
    }
}

/// A run of samples described by one descriptor.
#[derive(Debug, Clone)]
pub struct DataPacket {
    /// Descriptor the samples were produced with
    pub descriptor: Arc<DataDescriptor>,
    /// Number of samples
    pub sample_count: usize,
    /// Position of the first sample for implicit rules
    pub offset: DomainValue,
    /// Raw little-endian element buffer for explicit rules
    pub data: Option<Arc<[u8]>>,
    /// Domain packet covering the same samples
    pub domain: Option<Arc<DataPacket>>,
}

impl DataPacket {
    /// Packet whose values travel in `data`.
    pub fn explicit(
        descriptor: Arc<DataDescriptor>,
        sample_count: usize,
        data: Vec<u8>,
    ) -> Result<Self> {
        let element_size = descriptor.raw_sample_size();
        if element_size != 0 && data.len() != element_size * sample_count {
            return Err(ReaderError::invalid_parameter(format!(
                "packet buffer holds {} bytes, expected {} samples of {} bytes",
                data.len(),
                sample_count,
                element_size
            )));
        }
        Ok(Self {
            descriptor,
            sample_count,
            offset: DomainValue::default(),
            data: Some(data.into()),
            domain: None,
        })
    }

    /// Encode `samples` as the packet buffer. `T` must be the descriptor's raw type.
    pub fn from_samples<T: Sample>(descriptor: Arc<DataDescriptor>, samples: &[T]) -> Result<Self> {
        if descriptor.raw_sample_type() != T::SAMPLE_TYPE {
            return Err(ReaderError::InvalidSampleType {
                sample_type: T::SAMPLE_TYPE,
                read_type: descriptor.raw_sample_type(),
            });
        }
        let mut data = Vec::with_capacity(samples.len() * T::SAMPLE_TYPE.size());
        for sample in samples {
            sample.write_le(&mut data);
        }
        Self::explicit(descriptor, samples.len(), data)
    }

    /// Packet whose values follow the descriptor's implicit rule from `offset`.
    pub fn implicit(
        descriptor: Arc<DataDescriptor>,
        sample_count: usize,
        offset: impl Into<DomainValue>,
    ) -> Result<Self> {
        if descriptor.rule.is_explicit() {
            return Err(ReaderError::invalid_parameter(format!(
                "descriptor '{}' has an explicit rule; implicit packets need a rule",
                descriptor.name
            )));
        }
        Ok(Self { descriptor, sample_count, offset: offset.into(), data: None, domain: None })
    }

    /// Attach the domain packet covering these samples.
    pub fn with_domain(mut self, domain: Arc<DataPacket>) -> Result<Self> {
        if domain.sample_count != self.sample_count {
            return Err(ReaderError::invalid_parameter(format!(
                "domain packet has {} samples, value packet has {}",
                domain.sample_count, self.sample_count
            )));
        }
        self.domain = Some(domain);
        Ok(self)
    }

    /// Raw buffer, if the packet carries one.
    pub fn raw_bytes(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Offset of the implicit linear domain these samples sit on.
    ///
    /// Uses the attached domain packet when present, otherwise this packet
    /// itself when it follows a linear rule.
    pub fn domain_offset(&self) -> Option<DomainValue> {
        match &self.domain {
            Some(domain) if domain.descriptor.has_linear_rule() => Some(domain.offset),
            Some(_) => None,
            None if self.descriptor.has_linear_rule() => Some(self.offset),
            None => None,
        }
    }

    /// Descriptor of the linear domain returned by [`domain_offset`](Self::domain_offset).
    pub fn domain_descriptor(&self) -> Option<&Arc<DataDescriptor>> {
        match &self.domain {
            Some(domain) => Some(&domain.descriptor),
            None if self.descriptor.has_linear_rule() => Some(&self.descriptor),
            None => None,
        }
    }
}

/// Value attached to an event parameter key.
#[derive(Debug, Clone, PartialEq)]
pub enum EventParameter {
    /// A descriptor; `None` means the signal has no such descriptor.
    Descriptor(Option<Arc<DataDescriptor>>),
    Value(DomainValue),
    Text(String),
}

/// Out-of-band notification travelling in-line with data.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPacket {
    id: String,
    parameters: HashMap<String, EventParameter>,
}

impl EventPacket {
    pub fn new(id: impl Into<String>, parameters: HashMap<String, EventParameter>) -> Self {
        Self { id: id.into(), parameters }
    }

    /// `DATA_DESCRIPTOR_CHANGED` carrying both current descriptors.
    pub fn descriptor_changed(
        value: Option<Arc<DataDescriptor>>,
        domain: Option<Arc<DataDescriptor>>,
    ) -> Self {
        let mut parameters = HashMap::with_capacity(2);
        parameters.insert(event_params::DATA_DESCRIPTOR.to_string(), EventParameter::Descriptor(value));
        parameters.insert(
            event_params::DOMAIN_DATA_DESCRIPTOR.to_string(),
            EventParameter::Descriptor(domain),
        );
        Self::new(event_ids::DATA_DESCRIPTOR_CHANGED, parameters)
    }

    /// `IMPLICIT_DOMAIN_GAP_DETECTED` with the size of the discontinuity.
    pub fn implicit_domain_gap(diff: DomainValue) -> Self {
        let mut parameters = HashMap::with_capacity(1);
        parameters.insert(event_params::DIFF.to_string(), EventParameter::Value(diff));
        Self::new(event_ids::IMPLICIT_DOMAIN_GAP_DETECTED, parameters)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parameters(&self) -> &HashMap<String, EventParameter> {
        &self.parameters
    }

    pub fn parameter(&self, key: &str) -> Option<&EventParameter> {
        self.parameters.get(key)
    }

    pub fn is_descriptor_changed(&self) -> bool {
        self.id == event_ids::DATA_DESCRIPTOR_CHANGED
    }

    pub fn is_gap(&self) -> bool {
        self.id == event_ids::IMPLICIT_DOMAIN_GAP_DETECTED
    }

    /// Value descriptor carried by a descriptor-changed event.
    pub fn value_descriptor(&self) -> Option<Arc<DataDescriptor>> {
        self.descriptor_parameter(event_params::DATA_DESCRIPTOR)
    }

    /// Domain descriptor carried by a descriptor-changed event.
    pub fn domain_descriptor(&self) -> Option<Arc<DataDescriptor>> {
        self.descriptor_parameter(event_params::DOMAIN_DATA_DESCRIPTOR)
    }

    /// Gap size carried by a gap event.
    pub fn gap_diff(&self) -> Option<DomainValue> {
        match self.parameters.get(event_params::DIFF) {
            Some(EventParameter::Value(diff)) => Some(*diff),
            _ => None,
        }
    }

    fn descriptor_parameter(&self, key: &str) -> Option<Arc<DataDescriptor>> {
        match self.parameters.get(key) {
            Some(EventParameter::Descriptor(descriptor)) => descriptor.clone(),
            _ => None,
        }
    }
}
