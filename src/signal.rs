//! Producer-side signal handle

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::connection::Connection;
use crate::types::{DataDescriptor, EventPacket, Packet};
use crate::Result;

/// A signal producing packets for every connected input port.
///
/// Cloning yields another handle to the same signal. Connections keep only a
/// weak reference, so dropping every handle releases the signal while ports
/// stay connected to an orphaned queue.
#[derive(Clone, Debug)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

#[derive(Debug)]
pub(crate) struct SignalInner {
    id: String,
    descriptors: RwLock<Descriptors>,
    connections: Mutex<Vec<Weak<Connection>>>,
}

#[derive(Debug, Clone, Default)]
struct Descriptors {
    value: Option<Arc<DataDescriptor>>,
    domain: Option<Arc<DataDescriptor>>,
}

/// Weak handle held by connections.
#[derive(Debug, Clone, Default)]
pub(crate) struct WeakSignal(Weak<SignalInner>);

impl WeakSignal {
    pub(crate) fn upgrade(&self) -> Option<Signal> {
        self.0.upgrade().map(|inner| Signal { inner })
    }
}

impl Signal {
    pub fn new(
        id: impl Into<String>,
        value: Option<Arc<DataDescriptor>>,
        domain: Option<Arc<DataDescriptor>>,
    ) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: id.into(),
                descriptors: RwLock::new(Descriptors { value, domain }),
                connections: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn value_descriptor(&self) -> Option<Arc<DataDescriptor>> {
        self.inner.descriptors.read().value.clone()
    }

    pub fn domain_descriptor(&self) -> Option<Arc<DataDescriptor>> {
        self.inner.descriptors.read().domain.clone()
    }

    /// Replace both descriptors and announce the change on every connection.
    ///
    /// Connections attached concurrently see either the old descriptors
    /// followed by this change, or only the new ones.
    pub fn set_descriptors(
        &self,
        value: Option<Arc<DataDescriptor>>,
        domain: Option<Arc<DataDescriptor>>,
    ) -> Result<()> {
        let event = Packet::from(EventPacket::descriptor_changed(value.clone(), domain.clone()));
        let (live, result) = {
            let mut connections = self.inner.connections.lock();
            *self.inner.descriptors.write() = Descriptors { value, domain };
            let live = retain_live(&mut connections);
            let result = live.iter().try_for_each(|c| tolerate_disconnect(c, c.push(event.clone())));
            (live, result)
        };
        for connection in &live {
            connection.notify();
        }
        debug!(signal = %self.inner.id, "descriptors changed");
        result
    }

    /// Enqueue `packet` on every live connection.
    pub fn send_packet(&self, packet: Packet) -> Result<()> {
        for connection in self.live_connections() {
            tolerate_disconnect(&connection, connection.enqueue_cloned(&packet))?;
        }
        trace!(signal = %self.inner.id, samples = packet.sample_count(), "packet sent");
        Ok(())
    }

    /// Enqueue `packets` on every live connection as one batch.
    pub fn send_packets(&self, packets: Vec<Packet>) -> Result<()> {
        for connection in self.live_connections() {
            tolerate_disconnect(&connection, connection.enqueue_multiple(packets.clone()))?;
        }
        Ok(())
    }

    /// Number of connections still accepting packets.
    pub fn connection_count(&self) -> usize {
        self.live_connections().len()
    }

    pub(crate) fn downgrade(&self) -> WeakSignal {
        WeakSignal(Arc::downgrade(&self.inner))
    }

    /// Register `connection` and enqueue the current descriptors on it.
    pub(crate) fn attach(&self, connection: &Arc<Connection>) -> Result<()> {
        {
            let mut connections = self.inner.connections.lock();
            let descriptors = self.inner.descriptors.read().clone();
            connection.push(Packet::from(EventPacket::descriptor_changed(descriptors.value, descriptors.domain)))?;
            connections.push(Arc::downgrade(connection));
        }
        connection.notify();
        debug!(signal = %self.inner.id, "connection attached");
        Ok(())
    }

    /// Drops connections that were released or invalidated and returns the rest.
    fn live_connections(&self) -> Vec<Arc<Connection>> {
        retain_live(&mut self.inner.connections.lock())
    }
}

fn retain_live(connections: &mut Vec<Weak<Connection>>) -> Vec<Arc<Connection>> {
    connections.retain(|weak| weak.upgrade().is_some_and(|c| c.is_valid()));
    connections.iter().filter_map(Weak::upgrade).collect()
}

/// A port disconnecting while a packet is in flight is not a send failure.
fn tolerate_disconnect(connection: &Connection, result: Result<()>) -> Result<()> {
    match result {
        Err(_) if !connection.is_valid() => Ok(()),
        other => other,
    }
}

impl PartialEq for Signal {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Signal {}
