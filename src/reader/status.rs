//! Structured results of read calls

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::ReaderError;
use crate::types::{EventPacket, ReadStatus, SampleType, SyncStatus};

/// Why a signal stopped taking part in reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// The signal's data jumped relative to its peers.
    Gap,
    /// The signal's start lies outside the tick offset tolerance.
    ToleranceExceeded,
    /// The current descriptor cannot be read as the requested type.
    InvalidSampleType,
    /// The signal's domain does not fit the common sample rate.
    IncompatibleSampleRates,
    /// The connection or signal is gone.
    InvalidState,
    /// The read mode cannot be applied to the signal's data.
    Unsupported,
}

impl FailureReason {
    /// Read status reported for a failure of this kind.
    pub fn read_status(self) -> ReadStatus {
        match self {
            FailureReason::Unsupported => ReadStatus::Unsupported,
            _ => ReadStatus::Fail,
        }
    }
}

impl From<&ReaderError> for FailureReason {
    fn from(error: &ReaderError) -> Self {
        match error {
            ReaderError::InvalidSampleType { .. } => FailureReason::InvalidSampleType,
            ReaderError::IncompatibleSampleRates { .. } | ReaderError::ArithmeticOverflow { .. } => {
                FailureReason::IncompatibleSampleRates
            }
            ReaderError::Unsupported { .. } => FailureReason::Unsupported,
            _ => FailureReason::InvalidState,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureReason::Gap => "gap relative to peers",
            FailureReason::ToleranceExceeded => "tick offset tolerance exceeded",
            FailureReason::InvalidSampleType => "invalid sample type",
            FailureReason::IncompatibleSampleRates => "incompatible sample rate",
            FailureReason::InvalidState => "invalid state",
            FailureReason::Unsupported => "unsupported",
        };
        f.write_str(text)
    }
}

/// A failing signal and the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalFailure {
    pub signal_id: String,
    pub reason: FailureReason,
    pub details: String,
    /// Stored and requested type of an [`InvalidSampleType`](FailureReason::InvalidSampleType) failure
    pub sample_types: Option<(SampleType, SampleType)>,
}

impl SignalFailure {
    pub fn new(signal_id: impl Into<String>, reason: FailureReason, details: impl Into<String>) -> Self {
        Self { signal_id: signal_id.into(), reason, details: details.into(), sample_types: None }
    }

    /// Failure of `signal_id` caused by `error`.
    pub fn from_error(signal_id: impl Into<String>, error: &ReaderError) -> Self {
        let mut failure = Self::new(signal_id, FailureReason::from(error), error.to_string());
        if let ReaderError::InvalidSampleType { sample_type, read_type } = error {
            failure.sample_types = Some((*sample_type, *read_type));
        }
        failure
    }

    /// Error form for callers that prefer `?` over status inspection.
    pub fn to_error(&self) -> ReaderError {
        let context = format!("signal '{}': {}", self.signal_id, self.details);
        match self.reason {
            FailureReason::Gap | FailureReason::ToleranceExceeded => ReaderError::SynchronizationFailed {
                signal: self.signal_id.clone(),
                reason: format!("{}: {}", self.reason, self.details),
            },
            FailureReason::InvalidSampleType => match self.sample_types {
                Some((sample_type, read_type)) => ReaderError::InvalidSampleType { sample_type, read_type },
                None => ReaderError::invalid_parameter(context),
            },
            FailureReason::IncompatibleSampleRates => ReaderError::incompatible_rates(context),
            FailureReason::InvalidState => ReaderError::invalid_state(context),
            FailureReason::Unsupported => ReaderError::unsupported(context),
        }
    }
}

impl fmt::Display for SignalFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.signal_id, self.reason, self.details)
    }
}

/// Result of a single-signal read.
#[derive(Debug, Clone)]
pub struct ReaderStatus {
    pub read_status: ReadStatus,
    /// Samples (or blocks) written
    pub count: usize,
    /// Event that interrupted the read
    pub event_packet: Option<Arc<EventPacket>>,
    /// The timeout elapsed before the requested count was available
    pub timed_out: bool,
    /// The reader can still deliver data
    pub valid: bool,
    pub failure: Option<SignalFailure>,
}

impl ReaderStatus {
    pub fn ok(count: usize, timed_out: bool) -> Self {
        Self { read_status: ReadStatus::Ok, count, event_packet: None, timed_out, valid: true, failure: None }
    }

    pub fn event(count: usize, event: Arc<EventPacket>) -> Self {
        Self {
            read_status: ReadStatus::Event,
            count,
            event_packet: Some(event),
            timed_out: false,
            valid: true,
            failure: None,
        }
    }

    pub fn failed(failure: SignalFailure) -> Self {
        Self {
            read_status: failure.reason.read_status(),
            count: 0,
            event_packet: None,
            timed_out: false,
            valid: false,
            failure: Some(failure),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.read_status == ReadStatus::Ok
    }
}

/// Result of a multi reader call.
#[derive(Debug, Clone)]
pub struct MultiReaderStatus {
    pub read_status: ReadStatus,
    /// Common-rate samples written per signal
    pub count: usize,
    /// Events that paused the read, keyed by signal id
    pub event_packets: HashMap<String, Arc<EventPacket>>,
    pub failures: Vec<SignalFailure>,
    /// The timeout elapsed before the requested count was available
    pub timed_out: bool,
    pub sync_status: SyncStatus,
    /// Absolute time of the agreed start tick
    pub start_timestamp: Option<DateTime<Utc>>,
}

impl MultiReaderStatus {
    pub(crate) fn new(read_status: ReadStatus, sync_status: SyncStatus, start: Option<DateTime<Utc>>) -> Self {
        Self {
            read_status,
            count: 0,
            event_packets: HashMap::new(),
            failures: Vec::new(),
            timed_out: false,
            sync_status,
            start_timestamp: start,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.read_status == ReadStatus::Ok
    }

    /// Whether the read stopped because the signals could not be aligned.
    pub fn is_sync_failure(&self) -> bool {
        self.sync_status == SyncStatus::SynchronizationFailed
    }

    /// First failure as an error.
    pub fn error(&self) -> Option<ReaderError> {
        self.failures.first().map(SignalFailure::to_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_maps_to_unsupported_status() {
        let failure = SignalFailure::new("ai0", FailureReason::Unsupported, "raw read of implicit rule");
        let status = ReaderStatus::failed(failure);
        assert_eq!(status.read_status, ReadStatus::Unsupported);
        assert!(!status.valid);
    }

    #[test]
    fn reader_errors_classify() {
        let error = ReaderError::InvalidSampleType { sample_type: SampleType::Struct, read_type: SampleType::Int32 };
        assert_eq!(FailureReason::from(&error), FailureReason::InvalidSampleType);
        assert_eq!(FailureReason::from(&ReaderError::overflow("lcm")), FailureReason::IncompatibleSampleRates);
        assert_eq!(FailureReason::from(&ReaderError::invalid_state("gone")), FailureReason::InvalidState);
    }

    #[test]
    fn failure_error_names_signal() {
        let failure = SignalFailure::new("ai1", FailureReason::ToleranceExceeded, "starts 50 ticks late");
        let message = failure.to_error().to_string();
        assert!(message.contains("ai1"));
        assert!(message.contains("tolerance"));
    }

    #[test]
    fn failure_errors_keep_their_kind() {
        let mismatch = ReaderError::InvalidSampleType { sample_type: SampleType::Int8, read_type: SampleType::Float64 };
        assert!(matches!(
            SignalFailure::from_error("ai0", &mismatch).to_error(),
            ReaderError::InvalidSampleType { sample_type: SampleType::Int8, read_type: SampleType::Float64 }
        ));
        assert!(matches!(
            SignalFailure::new("ai0", FailureReason::Unsupported, "raw").to_error(),
            ReaderError::Unsupported { .. }
        ));
        assert!(matches!(
            SignalFailure::new("ai0", FailureReason::InvalidState, "port gone").to_error(),
            ReaderError::InvalidState { .. }
        ));
        assert!(matches!(
            SignalFailure::from_error("ai0", &ReaderError::overflow("lcm")).to_error(),
            ReaderError::IncompatibleSampleRates { .. }
        ));
        assert!(matches!(
            SignalFailure::new("ai0", FailureReason::Gap, "jumped 10 ticks").to_error(),
            ReaderError::SynchronizationFailed { .. }
        ));
    }
}
