//! Read policies and status enumerations

use serde::{Deserialize, Serialize};

/// Which transformations are applied when decoding samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadMode {
    /// Raw buffer bytes reinterpreted as the read type; no rules, no scaling.
    RawValue,
    /// Implicit rules evaluated, post-scaling skipped.
    Unscaled,
    /// Implicit rules evaluated and post-scaling applied.
    #[default]
    Scaled,
}

impl ReadMode {
    pub fn applies_scaling(self) -> bool {
        matches!(self, ReadMode::Scaled)
    }

    pub fn evaluates_rules(self) -> bool {
        !matches!(self, ReadMode::RawValue)
    }
}

/// When a blocking read may return before the requested count is satisfied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadTimeoutType {
    /// Wait until every signal can deliver the full count.
    #[default]
    All,
    /// Return as soon as any signal has data.
    Any,
}

/// Outcome category of a read call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadStatus {
    /// Data (possibly zero samples) was read.
    Ok,
    /// An event packet interrupted the read.
    Event,
    /// The reader or one of its signals is unusable.
    Fail,
    /// The signal's data cannot be read with the configured mode.
    Unsupported,
}

/// Synchronization progress of a reader taking part in a multi reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncStatus {
    #[default]
    Unsynchronized,
    Synchronizing,
    Synchronized,
    SynchronizationFailed,
}

impl SyncStatus {
    pub fn is_synchronized(self) -> bool {
        matches!(self, SyncStatus::Synchronized)
    }

    pub fn is_failed(self) -> bool {
        matches!(self, SyncStatus::SynchronizationFailed)
    }
}
