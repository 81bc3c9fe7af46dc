//! Trait seams between connections and readers.
//!
//! Readers resolve their packet source once per call from the input port and
//! talk to it only through [`PacketSource`]. Components reacting to in-band
//! events implement [`EventSink`].

use std::sync::Arc;

use crate::connection::Notifier;
use crate::types::{DataPacket, EventPacket, Packet};

/// Consumer-side view of a packet queue.
pub trait PacketSource: Send + Sync {
    /// Head packet without removing it.
    fn peek(&self) -> Option<Packet>;

    /// Remove and return the head packet.
    fn dequeue(&self) -> Option<Packet>;

    /// Samples in all queued data packets.
    fn available_samples(&self) -> usize;

    /// Samples queued in front of the first event packet.
    fn samples_until_next_event(&self) -> usize;

    /// Samples queued in front of the first descriptor-changed event.
    fn samples_until_next_descriptor(&self) -> usize;

    /// Data packets queued in front of the first event, enough to cover
    /// `samples` samples when that many are queued.
    fn data_ahead(&self, samples: usize) -> Vec<Arc<DataPacket>>;

    /// Whether any event packet is queued.
    fn has_event(&self) -> bool;

    /// Whether the source can still deliver packets.
    fn is_valid(&self) -> bool;

    /// Notifier woken when packets are enqueued.
    fn notifier(&self) -> Notifier;
}

/// Receiver of in-band event packets.
pub trait EventSink {
    /// Apply `event`; returns `true` when it changed the sink's state.
    fn handle_event(&mut self, event: &EventPacket) -> bool;
}
