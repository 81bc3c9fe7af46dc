//! Readers turning packet queues into typed sample buffers
//!
//! Every reader wraps one or more [`SignalReader`]s:
//!
//! - [`StreamReader`] reads one signal sample by sample.
//! - [`MultiReader`] aligns several signals on a common domain and sample rate.
//! - [`BlockReader`] reads one signal in fixed-size, optionally overlapping blocks.
//! - [`TailReader`] keeps the most recent samples of one signal.
//!
//! Readers are built from a [`ReaderConfig`] snapshot, usually through the
//! builders in this module. Blocking reads wait on the [`Notifier`] shared by
//! the reader's input ports and never hold a queue lock while waiting.
//!
//! [`Notifier`]: crate::connection::Notifier

use std::time::{Duration, Instant};

mod block_reader;
mod builder;
mod config;
mod domain;
mod multi_reader;
mod signal_reader;
mod status;
mod stream_reader;
mod tail_reader;

pub use block_reader::BlockReader;
pub use builder::{BlockReaderBuilder, MultiReaderBuilder, ReaderSource, StreamReaderBuilder, TailReaderBuilder};
pub use config::{AUTO_SAMPLE_RATE, ReaderConfig};
pub use domain::{CommonDomain, SignalDomain, TickMapping, parse_origin};
pub use multi_reader::MultiReader;
pub use signal_reader::{SignalInfo, SignalReader, Transform};
pub use status::{FailureReason, MultiReaderStatus, ReaderStatus, SignalFailure};
pub use stream_reader::StreamReader;
pub use tail_reader::TailReader;

const FAR_FUTURE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Instant a read with `timeout` gives up at.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).or_else(|| now.checked_add(FAR_FUTURE)).unwrap_or(now)
}

/// Why a single-signal read loop stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    /// The requested amount is available.
    Complete,
    /// An event is queued behind the available data.
    BlockedByEvent,
    /// `Any` timeout type and some data is available.
    AnyData,
    /// The deadline passed.
    Expired,
}

impl Readiness {
    /// Decide whether a read of `requested` units can return with `available`.
    ///
    /// `min_read_count` guards partial reads, except in front of an event
    /// where waiting longer cannot add data.
    pub(crate) fn check(
        available: usize,
        requested: usize,
        event_queued: bool,
        config: &ReaderConfig,
        deadline: Instant,
    ) -> Option<(Self, usize)> {
        let threshold = config.min_read_count.min(requested).max(1);
        let readiness = if available >= requested {
            Readiness::Complete
        } else if event_queued && available > 0 {
            Readiness::BlockedByEvent
        } else if config.timeout_type == crate::types::ReadTimeoutType::Any && available >= threshold {
            Readiness::AnyData
        } else if Instant::now() >= deadline {
            Readiness::Expired
        } else {
            return None;
        };

        let mut count = available.min(requested);
        if readiness == Readiness::Expired && count < threshold {
            count = 0;
        }
        Some((readiness, count))
    }

    /// Whether a read returning `count` of `requested` units reports a timeout.
    pub(crate) fn timed_out(self, count: usize, requested: usize) -> bool {
        self == Readiness::Expired && count < requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReadTimeoutType;

    fn past() -> Instant {
        Instant::now()
    }

    fn future() -> Instant {
        deadline_after(Duration::from_secs(60))
    }

    #[test]
    fn complete_reads_return_requested_count() {
        let config = ReaderConfig::default();
        assert_eq!(Readiness::check(12, 10, false, &config, future()), Some((Readiness::Complete, 10)));
    }

    #[test]
    fn all_waits_for_full_count() {
        let config = ReaderConfig::default();
        assert_eq!(Readiness::check(3, 10, false, &config, future()), None);
        let (readiness, count) = Readiness::check(3, 10, false, &config, past()).unwrap();
        assert_eq!((readiness, count), (Readiness::Expired, 3));
        assert!(readiness.timed_out(count, 10));
    }

    #[test]
    fn any_returns_partial_data() {
        let config = ReaderConfig { timeout_type: ReadTimeoutType::Any, ..ReaderConfig::default() };
        let (readiness, count) = Readiness::check(3, 10, false, &config, future()).unwrap();
        assert_eq!((readiness, count), (Readiness::AnyData, 3));
        assert!(!readiness.timed_out(count, 10));
    }

    #[test]
    fn min_read_count_holds_back_small_partials() {
        let config = ReaderConfig { min_read_count: 5, ..ReaderConfig::default() };
        assert_eq!(Readiness::check(3, 10, false, &config, past()), Some((Readiness::Expired, 0)));
        assert_eq!(Readiness::check(3, 10, true, &config, future()), Some((Readiness::BlockedByEvent, 3)));
    }

    #[test]
    fn huge_timeouts_do_not_overflow() {
        assert!(deadline_after(Duration::MAX) > Instant::now());
    }
}
