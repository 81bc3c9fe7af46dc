//! Packet queues between signals and input ports.
//!
//! A [`Connection`] is the FIFO edge between exactly one [`Signal`] and one
//! [`InputPort`]. Producers enqueue, the reader owning the port dequeues. Every
//! operation holds the queue mutex for its whole duration and never calls out
//! while holding it; the port's [`Notifier`] is woken after the lock is
//! released.
//!
//! ## Gap detection
//!
//! When the signal's domain follows a linear rule, each connection tracks the
//! offset the next data packet should start at. A packet starting elsewhere
//! gets an `IMPLICIT_DOMAIN_GAP_DETECTED` event inserted in front of it.

mod gap;
mod notifier;
mod port;


pub use gap::{GapCheckState, GapChecker};
pub use notifier::{Listener, Notifier};
pub use port::InputPort;

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::signal::{Signal, WeakSignal};
use crate::source::PacketSource;
use crate::types::{DataPacket, Packet};
use crate::{ReaderError, Result};

/// Running totals of what was enqueued on a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Samples in enqueued data packets
    pub samples: u64,
    /// Event packets, including inserted gap events
    pub event_packets: u64,
    /// Gap events inserted by the connection
    pub gap_packets: u64,
}

struct QueueState {
    packets: VecDeque<Packet>,
    gap_checker: GapChecker,
    stats: ConnectionStats,
    valid: bool,
}

impl QueueState {
    fn push(&mut self, packet: Packet) {
        if let Some(gap) = self.gap_checker.check(&packet) {
            self.packets.push_back(Packet::from(gap));
            self.stats.event_packets += 1;
            self.stats.gap_packets += 1;
        }
        match &packet {
            Packet::Data(data) => self.stats.samples += data.sample_count as u64,
            Packet::Event(_) => self.stats.event_packets += 1,
        }
        self.packets.push_back(packet);
    }

    /// Samples in data packets ahead of the first packet matching `stop`.
    fn samples_until(&self, stop: impl Fn(&Packet) -> bool) -> usize {
        self.packets.iter().take_while(|packet| !stop(*packet)).map(Packet::sample_count).sum()
    }
}

/// FIFO packet queue between a signal and an input port.
pub struct Connection {
    state: Mutex<QueueState>,
    signal: WeakSignal,
    notifier: RwLock<Notifier>,
}

impl Connection {
    /// Queue not attached to any signal.
    pub fn new(gap_checking: bool) -> Self {
        Self::with_signal(WeakSignal::default(), gap_checking, Notifier::new())
    }

    pub(crate) fn with_signal(signal: WeakSignal, gap_checking: bool, notifier: Notifier) -> Self {
        Self {
            state: Mutex::new(QueueState {
                packets: VecDeque::new(),
                gap_checker: GapChecker::new(gap_checking),
                stats: ConnectionStats::default(),
                valid: true,
            }),
            signal,
            notifier: RwLock::new(notifier),
        }
    }

    /// Append `packet`, taking ownership of the handle.
    pub fn enqueue(&self, packet: Packet) -> Result<()> {
        self.push(packet)?;
        self.notify();
        Ok(())
    }

    /// Append `packet` without waking the consumer; pair with [`notify`](Self::notify).
    pub(crate) fn push(&self, packet: Packet) -> Result<()> {
        let mut state = self.state.lock();
        if !state.valid {
            return Err(ReaderError::invalid_state("enqueue on a disconnected connection"));
        }
        trace!(samples = packet.sample_count(), event = packet.is_event(), "enqueue");
        state.push(packet);
        Ok(())
    }

    /// Append a clone of `packet`, leaving the caller's handle untouched.
    pub fn enqueue_cloned(&self, packet: &Packet) -> Result<()> {
        self.enqueue(packet.clone())
    }

    /// Append `packets` in order; a concurrent reader sees all of them or none.
    pub fn enqueue_multiple(&self, packets: impl IntoIterator<Item = Packet>) -> Result<()> {
        {
            let mut state = self.state.lock();
            if !state.valid {
                return Err(ReaderError::invalid_state("enqueue on a disconnected connection"));
            }
            for packet in packets {
                state.push(packet);
            }
        }
        self.notify();
        Ok(())
    }

    pub fn dequeue(&self) -> Option<Packet> {
        self.state.lock().packets.pop_front()
    }

    /// Remove every queued packet, oldest first.
    pub fn dequeue_all(&self) -> Vec<Packet> {
        self.state.lock().packets.drain(..).collect()
    }

    pub fn peek(&self) -> Option<Packet> {
        self.state.lock().packets.front().cloned()
    }

    pub fn packet_count(&self) -> usize {
        self.state.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().packets.is_empty()
    }

    /// Samples in all queued data packets.
    pub fn available_samples(&self) -> usize {
        self.state.lock().samples_until(|_| false)
    }

    /// Samples ahead of the first descriptor-changed event.
    pub fn samples_until_next_descriptor(&self) -> usize {
        self.state.lock().samples_until(Packet::is_descriptor_changed)
    }

    /// Samples ahead of the first event of any kind.
    pub fn samples_until_next_event_packet(&self) -> usize {
        self.state.lock().samples_until(Packet::is_event)
    }

    /// Samples ahead of the first gap event.
    pub fn samples_until_next_gap_packet(&self) -> usize {
        self.state.lock().samples_until(Packet::is_gap)
    }

    /// Data packets in front of the first event, enough to cover `samples` samples.
    pub fn data_ahead(&self, samples: usize) -> Vec<Arc<DataPacket>> {
        let state = self.state.lock();
        let mut covered = 0;
        state
            .packets
            .iter()
            .map_while(Packet::as_data)
            .take_while(|data| {
                let needed = covered < samples;
                covered += data.sample_count;
                needed
            })
            .cloned()
            .collect()
    }

    pub fn has_event_packet(&self) -> bool {
        self.state.lock().packets.iter().any(Packet::is_event)
    }

    pub fn has_gap_packet(&self) -> bool {
        self.state.lock().packets.iter().any(Packet::is_gap)
    }

    pub fn stats(&self) -> ConnectionStats {
        self.state.lock().stats
    }

    pub fn gap_check_state(&self) -> GapCheckState {
        self.state.lock().gap_checker.state()
    }

    pub fn is_valid(&self) -> bool {
        self.state.lock().valid
    }

    /// Mark the connection dead and drop queued packets.
    ///
    /// Later enqueues fail with `InvalidState`; blocked readers are woken.
    pub fn invalidate(&self) {
        {
            let mut state = self.state.lock();
            state.valid = false;
            state.packets.clear();
        }
        self.notify();
    }

    /// The producing signal, if it is still alive.
    pub fn signal(&self) -> Option<Signal> {
        self.signal.upgrade()
    }

    pub fn notifier(&self) -> Notifier {
        self.notifier.read().clone()
    }

    pub fn set_notifier(&self, notifier: Notifier) {
        *self.notifier.write() = notifier;
    }

    pub(crate) fn notify(&self) {
        let notifier = self.notifier.read().clone();
        notifier.notify();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Connection")
            .field("packets", &state.packets.len())
            .field("gap_check", &state.gap_checker.state())
            .field("stats", &state.stats)
            .field("valid", &state.valid)
            .finish()
    }
}

impl PacketSource for Connection {
    fn peek(&self) -> Option<Packet> {
        Connection::peek(self)
    }

    fn dequeue(&self) -> Option<Packet> {
        Connection::dequeue(self)
    }

    fn available_samples(&self) -> usize {
        Connection::available_samples(self)
    }

    fn samples_until_next_event(&self) -> usize {
        self.samples_until_next_event_packet()
    }

    fn samples_until_next_descriptor(&self) -> usize {
        Connection::samples_until_next_descriptor(self)
    }

    fn data_ahead(&self, samples: usize) -> Vec<Arc<DataPacket>> {
        Connection::data_ahead(self, samples)
    }

    fn has_event(&self) -> bool {
        self.has_event_packet()
    }

    fn is_valid(&self) -> bool {
        Connection::is_valid(self)
    }

    fn notifier(&self) -> Notifier {
        Connection::notifier(self)
    }
}
