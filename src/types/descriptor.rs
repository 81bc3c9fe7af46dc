//! Data descriptors describing a signal's sample layout

use serde::{Deserialize, Serialize};

use super::{DataRule, Ratio, SampleType, Scaling};
use crate::{ReaderError, Result};

/// Unit of measurement attached to a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub symbol: String,
    pub name: String,
    pub quantity: String,
}

impl Unit {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>, quantity: impl Into<String>) -> Self {
        Self { symbol: symbol.into(), name: name.into(), quantity: quantity.into() }
    }

    /// Seconds, the unit of time domains.
    pub fn seconds() -> Self {
        Self::new("s", "second", "time")
    }
}

/// Layout and interpretation of a signal's samples.
///
/// A descriptor is immutable once built; producers announce a new one with a
/// `DATA_DESCRIPTOR_CHANGED` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDescriptor {
    /// Human-readable name
    pub name: String,
    /// Type of the samples after post-scaling
    pub sample_type: SampleType,
    /// How values are derived from the sample index
    pub rule: DataRule,
    /// Optional `raw * scale + offset` transformation
    pub post_scaling: Option<Scaling>,
    /// Unit of measurement
    pub unit: Option<Unit>,
    /// Domain origin as an RFC 3339 timestamp (domain descriptors only)
    pub origin: Option<String>,
    /// Duration of one tick in units of `unit` (domain descriptors only)
    pub tick_resolution: Option<Ratio>,
}

impl DataDescriptor {
    /// Start building a descriptor for samples of `sample_type`.
    pub fn builder(sample_type: SampleType) -> DataDescriptorBuilder {
        DataDescriptorBuilder::new(sample_type)
    }

    /// Validate the descriptor for consistency.
    pub fn validate(&self) -> Result<()> {
        match &self.rule {
            DataRule::Explicit => {}
            DataRule::Linear { delta, .. } => {
                if !self.sample_type.is_real() {
                    return Err(ReaderError::invalid_parameter(format!(
                        "descriptor '{}': linear rule requires a real sample type, got {:?}",
                        self.name, self.sample_type
                    )));
                }
                if delta.as_f64() == 0.0 {
                    return Err(ReaderError::invalid_parameter(format!(
                        "descriptor '{}': linear rule delta is zero",
                        self.name
                    )));
                }
            }
            DataRule::Constant(_) | DataRule::Logarithmic { .. } | DataRule::List(_) => {
                if !self.sample_type.is_real() {
                    return Err(ReaderError::invalid_parameter(format!(
                        "descriptor '{}': implicit rule requires a real sample type",
                        self.name
                    )));
                }
            }
        }

        if let Some(scaling) = &self.post_scaling {
            if !scaling.input_type.is_real() || !scaling.output_type.is_real() {
                return Err(ReaderError::invalid_parameter(format!(
                    "descriptor '{}': post-scaling needs real input and output types",
                    self.name
                )));
            }
            if scaling.output_type != self.sample_type {
                return Err(ReaderError::invalid_parameter(format!(
                    "descriptor '{}': post-scaling output {:?} does not match sample type {:?}",
                    self.name, scaling.output_type, self.sample_type
                )));
            }
            if !self.rule.is_explicit() {
                return Err(ReaderError::invalid_parameter(format!(
                    "descriptor '{}': post-scaling requires explicit values",
                    self.name
                )));
            }
        }

        if let Some(resolution) = &self.tick_resolution {
            if !resolution.is_positive() {
                return Err(ReaderError::invalid_parameter(format!(
                    "descriptor '{}': tick resolution {} is not positive",
                    self.name, resolution
                )));
            }
        }

        Ok(())
    }

    /// Type of the elements stored in a packet buffer.
    pub fn raw_sample_type(&self) -> SampleType {
        self.post_scaling.as_ref().map(|s| s.input_type).unwrap_or(self.sample_type)
    }

    /// Bytes per element in a packet buffer (0 for variable-size types).
    pub fn raw_sample_size(&self) -> usize {
        self.raw_sample_type().size()
    }

    /// Whether this describes an implicit linear domain usable for gap
    /// detection and synchronization.
    pub fn has_linear_rule(&self) -> bool {
        self.rule.is_linear()
    }
}

/// Fluent builder for [`DataDescriptor`].
#[derive(Debug, Clone)]
pub struct DataDescriptorBuilder {
    descriptor: DataDescriptor,
}

impl DataDescriptorBuilder {
    pub fn new(sample_type: SampleType) -> Self {
        Self {
            descriptor: DataDescriptor {
                name: String::new(),
                sample_type,
                rule: DataRule::Explicit,
                post_scaling: None,
                unit: None,
                origin: None,
                tick_resolution: None,
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.descriptor.name = name.into();
        self
    }

    pub fn rule(mut self, rule: DataRule) -> Self {
        self.descriptor.rule = rule;
        self
    }

    pub fn post_scaling(mut self, scaling: Scaling) -> Self {
        self.descriptor.post_scaling = Some(scaling);
        self
    }

    pub fn unit(mut self, unit: Unit) -> Self {
        self.descriptor.unit = Some(unit);
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.descriptor.origin = Some(origin.into());
        self
    }

    pub fn tick_resolution(mut self, resolution: Ratio) -> Self {
        self.descriptor.tick_resolution = Some(resolution);
        self
    }

    /// Validate and return the descriptor.
    pub fn build(self) -> Result<DataDescriptor> {
        self.descriptor.validate()?;
        Ok(self.descriptor)
    }
}
