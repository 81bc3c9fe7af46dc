//! Async views of reader notifications
//!
//! Readers expose the generation counter of their [`Notifier`] as a stream so
//! async code can await new data instead of blocking in a read call. Bursts of
//! packets collapse into one item; [`ThrottleExt`] caps the rate further.

mod throttle;

pub use throttle::{Throttle, ThrottleExt};

use tokio_stream::wrappers::WatchStream;

use crate::connection::Notifier;

/// Generations of `notifier`, yielded after each burst of enqueued packets.
pub fn data_available(notifier: &Notifier) -> WatchStream<u64> {
    notifier.subscribe()
}
