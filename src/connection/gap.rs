//! Implicit domain gap detection

use tracing::{debug, warn};

use crate::source::EventSink;
use crate::types::{DataDescriptor, DataPacket, DomainValue, EventPacket, Packet};

/// Progress of the gap checker on one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapCheckState {
    /// Gap checking is switched off for this connection.
    Disabled,
    /// No descriptor has been observed yet.
    Uninitialized,
    /// The current domain has no linear rule; nothing to check.
    NotAvailable,
    /// A linear domain is known but no data has arrived since.
    Initialized,
    /// Tracking the expected offset of the next packet.
    Running,
}

/// Tracks the expected domain offset of the next data packet.
#[derive(Debug, Clone)]
pub struct GapChecker {
    state: GapCheckState,
    delta: DomainValue,
    expected: DomainValue,
}

impl GapChecker {
    pub fn new(enabled: bool) -> Self {
        let state = if enabled { GapCheckState::Uninitialized } else { GapCheckState::Disabled };
        Self { state, delta: DomainValue::default(), expected: DomainValue::default() }
    }

    pub fn state(&self) -> GapCheckState {
        self.state
    }

    /// Offset the next data packet is expected to start at, once running.
    pub fn expected_offset(&self) -> Option<DomainValue> {
        (self.state == GapCheckState::Running).then_some(self.expected)
    }

    /// Inspect a packet about to be enqueued.
    ///
    /// Returns the gap event to insert in front of `packet` when its domain
    /// offset differs from the one the previous packet implied.
    pub fn check(&mut self, packet: &Packet) -> Option<EventPacket> {
        match packet {
            Packet::Event(event) => {
                self.handle_event(event);
                None
            }
            Packet::Data(data) => self.check_data(data),
        }
    }

    fn check_data(&mut self, packet: &DataPacket) -> Option<EventPacket> {
        match self.state {
            GapCheckState::Disabled | GapCheckState::NotAvailable => return None,
            GapCheckState::Uninitialized => {
                let Some(descriptor) = packet.domain_descriptor() else {
                    self.state = GapCheckState::NotAvailable;
                    return None;
                };
                self.initialize(descriptor);
                if self.state != GapCheckState::Initialized {
                    return None;
                }
            }
            GapCheckState::Initialized | GapCheckState::Running => {}
        }

        let offset = packet.domain_offset()?;
        let Some(next) = self.advance(offset, packet.sample_count) else {
            warn!(%offset, delta = %self.delta, "domain offset overflow, gap checking stopped");
            self.state = GapCheckState::NotAvailable;
            return None;
        };

        let gap = match self.state {
            GapCheckState::Running if !offset.same_position(self.expected, self.delta) => {
                match offset.checked_sub(self.expected) {
                    Some(diff) => {
                        debug!(expected = %self.expected, observed = %offset, %diff, "implicit domain gap detected");
                        Some(EventPacket::implicit_domain_gap(diff))
                    }
                    None => None,
                }
            }
            _ => None,
        };

        self.expected = next;
        self.state = GapCheckState::Running;
        gap
    }

    fn advance(&self, offset: DomainValue, sample_count: usize) -> Option<DomainValue> {
        offset.checked_add(self.delta.checked_scale(sample_count)?)
    }

    fn initialize(&mut self, domain: &DataDescriptor) {
        match domain.rule.linear_parameters() {
            Some((delta, _)) => {
                self.delta = delta.cast_for(domain.sample_type);
                self.state = GapCheckState::Initialized;
            }
            None => self.state = GapCheckState::NotAvailable,
        }
    }
}

impl EventSink for GapChecker {
    fn handle_event(&mut self, event: &EventPacket) -> bool {
        if self.state == GapCheckState::Disabled || !event.is_descriptor_changed() {
            return false;
        }
        let domain = event.domain_descriptor().or_else(|| {
            event.value_descriptor().filter(|descriptor| descriptor.has_linear_rule())
        });
        match domain {
            Some(domain) => self.initialize(&domain),
            None => self.state = GapCheckState::NotAvailable,
        }
        true
    }
}
