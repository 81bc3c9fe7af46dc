//! Packet-enqueued notifications shared between connections and readers

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex, RwLock};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::trace;

use crate::executor::{self, TaskExecutor};

/// Callback invoked after packets were enqueued.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Wake-up source for blocked reads and data-available callbacks.
///
/// Every `notify` bumps a generation counter. Waiters remember the generation
/// they observed before checking the queues and sleep until it moves, so a
/// notification arriving between the check and the wait is never lost.
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<NotifierInner>,
}

struct NotifierInner {
    generation: Mutex<u64>,
    condvar: Condvar,
    listener: RwLock<Option<Listener>>,
    executor: RwLock<Arc<dyn TaskExecutor>>,
    watch: watch::Sender<u64>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::with_executor(executor::inline())
    }

    pub fn with_executor(executor: Arc<dyn TaskExecutor>) -> Self {
        let (watch, _) = watch::channel(0);
        Self {
            inner: Arc::new(NotifierInner {
                generation: Mutex::new(0),
                condvar: Condvar::new(),
                listener: RwLock::new(None),
                executor: RwLock::new(executor),
                watch,
            }),
        }
    }

    /// Signal that new packets are available.
    ///
    /// Must not be called while a queue lock is held.
    pub fn notify(&self) {
        let generation = {
            let mut generation = self.inner.generation.lock();
            *generation = generation.wrapping_add(1);
            *generation
        };
        self.inner.condvar.notify_all();
        self.inner.watch.send_replace(generation);
        trace!(generation, "packets enqueued");

        let listener = self.inner.listener.read().clone();
        if let Some(listener) = listener {
            let executor = self.inner.executor.read().clone();
            executor.submit(Box::new(move || listener()));
        }
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        *self.inner.generation.lock()
    }

    /// Block until the generation differs from `seen` or `deadline` passes.
    ///
    /// Returns the generation observed on wake-up.
    pub fn wait_for_change(&self, seen: u64, deadline: Instant) -> u64 {
        let mut generation = self.inner.generation.lock();
        while *generation == seen {
            if self.inner.condvar.wait_until(&mut generation, deadline).timed_out() {
                break;
            }
        }
        *generation
    }

    pub fn set_listener(&self, listener: Option<Listener>) {
        *self.inner.listener.write() = listener;
    }

    pub fn set_executor(&self, executor: Arc<dyn TaskExecutor>) {
        *self.inner.executor.write() = executor;
    }

    /// Stream of generations, yielding once per notification burst.
    ///
    /// The stream does not replay the generation current at subscription.
    pub fn subscribe(&self) -> WatchStream<u64> {
        WatchStream::from_changes(self.inner.watch.subscribe())
    }

    /// Whether two handles share the same state.
    pub fn same_as(&self, other: &Notifier) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("generation", &self.generation())
            .field("has_listener", &self.inner.listener.read().is_some())
            .finish()
    }
}
