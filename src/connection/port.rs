//! Consumer-side input port

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::{Connection, Notifier};
use crate::signal::Signal;
use crate::source::PacketSource;
use crate::{ReaderError, Result};

/// Input port holding at most one connection at a time.
///
/// Clones share the port. Dropping the last handle disconnects it.
#[derive(Clone, Debug)]
pub struct InputPort {
    inner: Arc<PortInner>,
}

#[derive(Debug)]
struct PortInner {
    name: String,
    gap_checking: AtomicBool,
    notifier: RwLock<Notifier>,
    connection: Mutex<Option<Arc<Connection>>>,
}

impl InputPort {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(PortInner {
                name: name.into(),
                gap_checking: AtomicBool::new(true),
                notifier: RwLock::new(Notifier::new()),
                connection: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Connect to `signal`, which immediately enqueues its descriptors.
    ///
    /// Fails with `InvalidState` if the port is already connected.
    pub fn connect(&self, signal: &Signal) -> Result<()> {
        let mut slot = self.inner.connection.lock();
        if slot.as_ref().is_some_and(|c| c.is_valid()) {
            return Err(ReaderError::invalid_state(format!(
                "input port '{}' is already connected",
                self.inner.name
            )));
        }
        let connection = Arc::new(Connection::with_signal(
            signal.downgrade(),
            self.gap_checking(),
            self.notifier(),
        ));
        signal.attach(&connection)?;
        *slot = Some(connection);
        debug!(port = %self.inner.name, signal = %signal.id(), "input port connected");
        Ok(())
    }

    /// Drop the current connection, if any.
    pub fn disconnect(&self) {
        if let Some(connection) = self.inner.connection.lock().take() {
            connection.invalidate();
            debug!(port = %self.inner.name, "input port disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.lock().as_ref().is_some_and(|c| c.is_valid())
    }

    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.inner.connection.lock().clone()
    }

    /// The current connection as a reader-facing packet source.
    pub fn source(&self) -> Option<Arc<dyn PacketSource>> {
        self.connection().map(|c| c as Arc<dyn PacketSource>)
    }

    /// Signal on the other end of the connection, if both are alive.
    pub fn signal(&self) -> Option<Signal> {
        self.connection().and_then(|c| c.signal())
    }

    pub fn gap_checking(&self) -> bool {
        self.inner.gap_checking.load(Ordering::Acquire)
    }

    /// Enable or disable gap checking for the next connection.
    pub fn set_gap_checking(&self, enabled: bool) {
        self.inner.gap_checking.store(enabled, Ordering::Release);
    }

    pub fn notifier(&self) -> Notifier {
        self.inner.notifier.read().clone()
    }

    /// Route enqueue notifications of this port to `notifier`.
    pub fn set_notifier(&self, notifier: Notifier) {
        if let Some(connection) = self.inner.connection.lock().as_ref() {
            connection.set_notifier(notifier.clone());
        }
        *self.inner.notifier.write() = notifier;
    }
}

impl Drop for PortInner {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().take() {
            connection.invalidate();
        }
    }
}
