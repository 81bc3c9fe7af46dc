//! Error types for the reader engine.
//!
//! Errors returned as `Err` from this crate are either configuration problems
//! surfaced at `build()` time or programmer errors on a read call (wrong
//! buffer shape). Conditions that arise while data flows (events, timeouts,
//! synchronization failures, type mismatches after a descriptor change) are
//! reported through [`ReaderStatus`](crate::ReaderStatus) and
//! [`MultiReaderStatus`](crate::MultiReaderStatus) instead.
//!
//! ## Error Categories
//!
//! - **Configuration**: builder misuse, invalid block/overlap/history sizes
//! - **Type**: a descriptor whose sample type cannot be read as the requested type
//! - **Synchronization**: incompatible sample rates, gaps, tolerance violations
//! - **Lifetime**: a queue or port that was invalidated mid-operation
//!
//! ```rust
//! use daq_reader::ReaderError;
//!
//! let error = ReaderError::invalid_state("input port disconnected");
//! assert!(!error.is_retryable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use thiserror::Error;

use crate::types::SampleType;

/// Result type alias for reader operations.
pub type Result<T, E = ReaderError> = std::result::Result<T, E>;

/// Main error type for reader and queue operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReaderError {
    #[error("Failed to create reader: {reason}")]
    CreateFailed { reason: String },

    #[error("Invalid parameter: {details}")]
    InvalidParameter { details: String },

    #[error("Cannot read {sample_type:?} samples as {read_type:?}")]
    InvalidSampleType { sample_type: SampleType, read_type: SampleType },

    #[error("Incompatible sample rates: {details}")]
    IncompatibleSampleRates { details: String },

    #[error("Synchronization failed for signal '{signal}': {reason}")]
    SynchronizationFailed { signal: String, reason: String },

    #[error("Invalid state: {context}")]
    InvalidState { context: String },

    #[error("Arithmetic overflow in {context}")]
    ArithmeticOverflow { context: String },

    #[error("Operation not supported: {details}")]
    Unsupported { details: String },

    #[error("Reader configuration error")]
    Config {
        #[source]
        source: serde_yaml_ng::Error,
    },
}

impl ReaderError {
    /// Returns whether re-issuing the failed operation can succeed without
    /// rebuilding the reader.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReaderError::CreateFailed { .. } => false,
            ReaderError::InvalidParameter { .. } => false,
            ReaderError::InvalidSampleType { .. } => true,
            ReaderError::IncompatibleSampleRates { .. } => false,
            ReaderError::SynchronizationFailed { .. } => false,
            ReaderError::InvalidState { .. } => false,
            ReaderError::ArithmeticOverflow { .. } => false,
            ReaderError::Unsupported { .. } => false,
            ReaderError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ReaderError::CreateFailed { .. } => vec![
                "Use a fresh builder for every reader",
                "Add at least one signal or input port before building",
            ],
            ReaderError::InvalidParameter { .. } => vec![
                "Check block size, overlap and history size",
                "Check that output buffers are large enough for the requested count",
            ],
            ReaderError::InvalidSampleType { .. } => vec![
                "Choose a read type the signal's sample type converts to",
                "Wait for the next descriptor change and read again",
            ],
            ReaderError::IncompatibleSampleRates { .. } => vec![
                "Use signals whose domain deltas share a common multiple",
                "Set a required common sample rate that every delta divides",
            ],
            ReaderError::SynchronizationFailed { .. } => vec![
                "Rebuild the multi reader",
                "Increase the tick offset tolerance",
                "Check the producers for dropped packets",
            ],
            ReaderError::InvalidState { .. } => vec![
                "Reconnect the input port and rebuild the reader",
                "Keep the signal alive while it is being read",
            ],
            ReaderError::ArithmeticOverflow { .. } => vec![
                "Use fewer irregular sample rates in one group",
                "Set an explicit required common sample rate",
            ],
            ReaderError::Unsupported { .. } => vec![
                "Use a read mode that supports the signal's data rule",
            ],
            ReaderError::Config { .. } => vec![
                "Check the reader configuration document for typos",
                "Compare against ReaderConfig::default()",
            ],
        }
    }

    /// Helper constructor for builder failures.
    pub fn create_failed(reason: impl Into<String>) -> Self {
        ReaderError::CreateFailed { reason: reason.into() }
    }

    /// Helper constructor for invalid arguments.
    pub fn invalid_parameter(details: impl Into<String>) -> Self {
        ReaderError::InvalidParameter { details: details.into() }
    }

    /// Helper constructor for lifetime errors.
    pub fn invalid_state(context: impl Into<String>) -> Self {
        ReaderError::InvalidState { context: context.into() }
    }

    /// Helper constructor for rate incompatibilities.
    pub fn incompatible_rates(details: impl Into<String>) -> Self {
        ReaderError::IncompatibleSampleRates { details: details.into() }
    }

    /// Helper constructor for checked arithmetic failures.
    pub fn overflow(context: impl Into<String>) -> Self {
        ReaderError::ArithmeticOverflow { context: context.into() }
    }

    /// Helper constructor for unsupported read paths.
    pub fn unsupported(details: impl Into<String>) -> Self {
        ReaderError::Unsupported { details: details.into() }
    }
}

impl From<serde_yaml_ng::Error> for ReaderError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        ReaderError::Config { source: err }
    }
}
