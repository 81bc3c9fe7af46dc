//! Reader configuration snapshot

use serde::{Deserialize, Serialize};

use crate::types::{Ratio, ReadMode, ReadTimeoutType};
use crate::{ReaderError, Result};

/// Sentinel for `required_common_sample_rate` selecting the LCM of all signals.
pub const AUTO_SAMPLE_RATE: i64 = -1;

/// Options shared by every reader kind.
///
/// Builders take a snapshot of this at `build()`; later changes to the builder
/// do not affect built readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Which transformations are applied while decoding values
    pub read_mode: ReadMode,
    /// Handle events internally instead of returning them to the caller
    pub skip_events: bool,
    /// Whether a blocking read waits for all signals or any signal
    pub timeout_type: ReadTimeoutType,
    /// Forced common sample rate in common ticks, or [`AUTO_SAMPLE_RATE`]
    pub required_common_sample_rate: i64,
    /// Round the synchronization tick up to a whole second of the domain
    pub start_on_full_unit_of_domain: bool,
    /// Fewest samples a partial read delivers
    pub min_read_count: usize,
    /// Largest tolerated start misalignment in seconds
    pub tick_offset_tolerance: Option<Ratio>,
    /// Samples per block (block readers)
    pub block_size: usize,
    /// Samples shared by consecutive blocks (block readers)
    pub overlap: usize,
    /// Retained samples (tail readers)
    pub history_size: usize,
    /// Gap detection on ports the reader creates itself
    pub gap_checking: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            read_mode: ReadMode::Scaled,
            skip_events: false,
            timeout_type: ReadTimeoutType::All,
            required_common_sample_rate: AUTO_SAMPLE_RATE,
            start_on_full_unit_of_domain: false,
            min_read_count: 1,
            tick_offset_tolerance: None,
            block_size: 1,
            overlap: 0,
            history_size: 1,
            gap_checking: true,
        }
    }
}

impl ReaderConfig {
    /// Parse a configuration from YAML, filling unspecified fields with defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ReaderConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Check options every reader kind relies on.
    pub fn validate(&self) -> Result<()> {
        if self.required_common_sample_rate != AUTO_SAMPLE_RATE && self.required_common_sample_rate <= 0 {
            return Err(ReaderError::invalid_parameter(format!(
                "required common sample rate must be positive or {}, got {}",
                AUTO_SAMPLE_RATE, self.required_common_sample_rate
            )));
        }
        if self.min_read_count == 0 {
            return Err(ReaderError::invalid_parameter("min read count must be at least 1"));
        }
        if let Some(tolerance) = &self.tick_offset_tolerance {
            if tolerance.numerator() < 0 {
                return Err(ReaderError::invalid_parameter(format!(
                    "tick offset tolerance {} is negative",
                    tolerance
                )));
            }
        }
        Ok(())
    }

    /// Additional checks for block readers.
    pub fn validate_block(&self) -> Result<()> {
        self.validate()?;
        if self.block_size == 0 {
            return Err(ReaderError::invalid_parameter("block size must be at least 1"));
        }
        if self.overlap >= self.block_size {
            return Err(ReaderError::invalid_parameter(format!(
                "overlap {} must be smaller than block size {}",
                self.overlap, self.block_size
            )));
        }
        Ok(())
    }

    /// Additional checks for tail readers.
    pub fn validate_tail(&self) -> Result<()> {
        self.validate()?;
        if self.history_size == 0 {
            return Err(ReaderError::invalid_parameter("history size must be at least 1"));
        }
        Ok(())
    }

    pub fn is_auto_sample_rate(&self) -> bool {
        self.required_common_sample_rate == AUTO_SAMPLE_RATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ReaderConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.is_auto_sample_rate());
        assert_eq!(config.read_mode, ReadMode::Scaled);
    }

    #[test]
    fn yaml_fills_defaults() {
        let config = ReaderConfig::from_yaml(
            "read_mode: Unscaled\ntimeout_type: Any\ntick_offset_tolerance:\n  numerator: 1\n  denominator: 1000\n",
        )
        .unwrap();
        assert_eq!(config.read_mode, ReadMode::Unscaled);
        assert_eq!(config.timeout_type, ReadTimeoutType::Any);
        assert_eq!(config.tick_offset_tolerance, Some(Ratio::new(1, 1000)));
        assert_eq!(config.min_read_count, 1);
        assert!(config.gap_checking);
    }

    #[test]
    fn yaml_roundtrip() {
        let config = ReaderConfig { block_size: 10, overlap: 4, ..ReaderConfig::default() };
        let yaml = config.to_yaml().unwrap();
        assert_eq!(ReaderConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn malformed_yaml_is_config_error() {
        let error = ReaderConfig::from_yaml("read_mode: [").unwrap_err();
        assert!(matches!(error, ReaderError::Config { .. }));
    }

    #[test]
    fn zero_denominator_in_yaml_is_rejected() {
        let yaml = "tick_offset_tolerance:\n  numerator: 1\n  denominator: 0\n";
        assert!(ReaderConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let config = ReaderConfig { required_common_sample_rate: 0, ..ReaderConfig::default() };
        assert!(config.validate().is_err());
        let config = ReaderConfig { min_read_count: 0, ..ReaderConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn overlap_must_be_below_block_size() {
        let config = ReaderConfig { block_size: 10, overlap: 10, ..ReaderConfig::default() };
        assert!(matches!(config.validate_block(), Err(ReaderError::InvalidParameter { .. })));
        let config = ReaderConfig { block_size: 10, overlap: 9, ..ReaderConfig::default() };
        assert!(config.validate_block().is_ok());
    }

    #[test]
    fn history_must_be_positive() {
        let config = ReaderConfig { history_size: 0, ..ReaderConfig::default() };
        assert!(config.validate_tail().is_err());
    }
}
