//! Per-signal reading state shared by every reader kind

use std::fmt;
use std::sync::Arc;

use tracing::{Span, debug, info_span, trace, warn};

use super::domain::{SignalDomain, TickMapping};
use super::status::{FailureReason, SignalFailure};
use crate::connection::InputPort;
use crate::decoder::{Sample, SampleDecoder};
use crate::source::{EventSink, PacketSource};
use crate::types::{DataDescriptor, DataPacket, EventPacket, Packet, ReadMode, SyncStatus};
use crate::{ReaderError, Result};

/// In-place transformation applied to decoded samples.
pub type Transform<T> = Arc<dyn Fn(&mut [T]) + Send + Sync>;

/// What a reader needs to know about one signal.
pub struct SignalInfo<V, D> {
    pub port: InputPort,
    pub value_transform: Option<Transform<V>>,
    pub domain_transform: Option<Transform<D>>,
    pub read_mode: ReadMode,
    /// Span reader work for this signal is recorded under
    pub span: Span,
}

impl<V, D> SignalInfo<V, D> {
    pub fn new(port: InputPort, read_mode: ReadMode) -> Self {
        let span = info_span!("signal_reader", port = %port.name());
        Self { port, value_transform: None, domain_transform: None, read_mode, span }
    }
}

impl<V, D> Clone for SignalInfo<V, D> {
    fn clone(&self) -> Self {
        Self {
            port: self.port.clone(),
            value_transform: self.value_transform.clone(),
            domain_transform: self.domain_transform.clone(),
            read_mode: self.read_mode,
            span: self.span.clone(),
        }
    }
}

/// How an event changed the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventEffect {
    /// Descriptor event repeating the current descriptors
    Ignored,
    ValueChanged,
    DomainChanged,
    Gap,
    Other,
}

/// Events taken off the head of the queue in one pass.
#[derive(Debug, Default)]
pub(crate) struct Drained {
    /// First event the caller has to see
    pub event: Option<Arc<EventPacket>>,
    /// A handled event changed the reader's state
    pub handled: bool,
    /// A handled event replaced the domain descriptor
    pub domain_changed: bool,
}

/// Result of aligning a reader to a synchronization tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SyncOutcome {
    /// The next sample lies within tolerance of the target.
    Synchronized { tick: i64 },
    /// Not enough data queued to decide.
    Pending,
    /// The next sample lies beyond the tolerance window.
    Failed { tick: i64 },
}

struct Cursor {
    packet: Arc<DataPacket>,
    position: usize,
}

impl Cursor {
    fn remaining(&self) -> usize {
        self.packet.sample_count - self.position
    }
}

/// Reading state of one signal.
///
/// Owns a partially consumed data packet, the descriptors announced by the
/// latest descriptor event, and decoders bound to them.
pub struct SignalReader<V: Sample, D: Sample> {
    info: SignalInfo<V, D>,
    id: String,
    value_descriptor: Option<Arc<DataDescriptor>>,
    domain_descriptor: Option<Arc<DataDescriptor>>,
    value_decoder: Option<SampleDecoder<V>>,
    domain_decoder: Option<SampleDecoder<D>>,
    failure: Option<SignalFailure>,
    cursor: Option<Cursor>,
    /// Native tick of the sample after the last one consumed
    next_expected: Option<i64>,
    mapping: TickMapping,
    sync_status: SyncStatus,
}

impl<V: Sample, D: Sample> SignalReader<V, D> {
    pub fn new(info: SignalInfo<V, D>) -> Self {
        let id = info.port.signal().map(|s| s.id().to_string()).unwrap_or_else(|| info.port.name().to_string());
        Self {
            info,
            id,
            value_descriptor: None,
            domain_descriptor: None,
            value_decoder: None,
            domain_decoder: None,
            failure: None,
            cursor: None,
            next_expected: None,
            mapping: TickMapping::native(1),
            sync_status: SyncStatus::Unsynchronized,
        }
    }

    /// Id of the connected signal, or the port name if none was connected.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn port(&self) -> &InputPort {
        &self.info.port
    }

    pub fn read_mode(&self) -> ReadMode {
        self.info.read_mode
    }

    pub fn value_descriptor(&self) -> Option<&Arc<DataDescriptor>> {
        self.value_descriptor.as_ref()
    }

    pub fn domain_descriptor(&self) -> Option<&Arc<DataDescriptor>> {
        self.domain_descriptor.as_ref()
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    pub(crate) fn set_sync_status(&mut self, status: SyncStatus) {
        self.sync_status = status;
    }

    pub fn mapping(&self) -> TickMapping {
        self.mapping
    }

    pub(crate) fn set_mapping(&mut self, mapping: TickMapping) {
        self.mapping = mapping;
    }

    /// Native samples per common-rate sample.
    pub fn divider(&self) -> usize {
        self.mapping.divider.max(1)
    }

    /// Native ticks per sample of the current domain.
    pub fn sample_rate(&self) -> Option<i64> {
        let (delta, _) = self.domain_descriptor.as_ref()?.rule.linear_parameters()?;
        Some(delta.as_i64())
    }

    pub fn failure(&self) -> Option<&SignalFailure> {
        self.failure.as_ref()
    }

    pub(crate) fn span(&self) -> &Span {
        &self.info.span
    }

    fn source(&self) -> Option<Arc<dyn PacketSource>> {
        self.info.port.source()
    }

    pub fn is_connected(&self) -> bool {
        self.source().is_some_and(|source| source.is_valid())
    }

    /// Failure preventing reads, including a lost connection.
    pub fn check_valid(&self) -> Option<SignalFailure> {
        if let Some(failure) = &self.failure {
            return Some(failure.clone());
        }
        if !self.is_connected() {
            return Some(SignalFailure::new(&self.id, FailureReason::InvalidState, "input port is not connected"));
        }
        None
    }

    /// Domain parameters of the current domain descriptor.
    pub fn signal_domain(&self) -> Result<SignalDomain> {
        let descriptor = self.domain_descriptor.as_ref().ok_or_else(|| {
            ReaderError::invalid_parameter(format!("signal '{}' has no domain descriptor", self.id))
        })?;
        SignalDomain::from_descriptor(&self.id, descriptor)
    }

    fn cursor_remaining(&self) -> usize {
        self.cursor.as_ref().map_or(0, Cursor::remaining)
    }

    /// Native samples readable before the next event.
    pub fn samples_until_event(&self) -> usize {
        self.cursor_remaining() + self.source().map_or(0, |source| source.samples_until_next_event())
    }

    /// Common-rate samples available.
    ///
    /// With `across_descriptor_changes` unset only samples ahead of the next
    /// descriptor change are counted.
    pub fn available(&self, across_descriptor_changes: bool) -> usize {
        let queued = self.source().map_or(0, |source| {
            if across_descriptor_changes {
                source.available_samples()
            } else {
                source.samples_until_next_descriptor()
            }
        });
        (self.cursor_remaining() + queued) / self.divider()
    }

    pub fn has_queued_event(&self) -> bool {
        self.source().is_some_and(|source| source.has_event())
    }

    /// Event at the head of the queue, once the current packet is consumed.
    pub fn peek_event(&self) -> Option<Arc<EventPacket>> {
        if self.cursor_remaining() > 0 {
            return None;
        }
        match self.source()?.peek()? {
            Packet::Event(event) => Some(event),
            Packet::Data(_) => None,
        }
    }

    /// Remove and return the event at the head of the queue.
    pub fn take_event(&mut self) -> Option<Arc<EventPacket>> {
        self.peek_event()?;
        self.cursor = None;
        match self.source()?.dequeue()? {
            Packet::Event(event) => Some(event),
            Packet::Data(_) => None,
        }
    }

    /// Apply a descriptor change; returns `false` when nothing changed.
    pub fn handle_descriptor_changed(&mut self, event: &EventPacket) -> bool {
        !matches!(self.apply_descriptor_event(event), EventEffect::Ignored)
    }

    fn apply_descriptor_event(&mut self, event: &EventPacket) -> EventEffect {
        let value = event.value_descriptor();
        let domain = event.domain_descriptor();
        let value_changed = value != self.value_descriptor;
        let domain_changed = domain != self.domain_descriptor;
        if !value_changed && !domain_changed {
            trace!(signal = %self.id, "descriptor event repeats current descriptors");
            return EventEffect::Ignored;
        }

        let _entered = self.info.span.clone().entered();
        self.value_descriptor = value;
        self.domain_descriptor = domain;
        self.rebind_decoders();

        if self.sync_status == SyncStatus::Synchronized {
            self.sync_status = SyncStatus::Synchronizing;
        }
        if domain_changed {
            self.next_expected = None;
        }
        debug!(signal = %self.id, value_changed, domain_changed, "descriptors changed");

        if domain_changed { EventEffect::DomainChanged } else { EventEffect::ValueChanged }
    }

    fn rebind_decoders(&mut self) {
        self.failure = None;
        self.value_decoder = None;
        self.domain_decoder = None;

        match &self.value_descriptor {
            Some(descriptor) => match SampleDecoder::for_descriptor(descriptor.clone(), self.info.read_mode) {
                Ok(decoder) => self.value_decoder = Some(decoder),
                Err(e) => {
                    warn!(signal = %self.id, error = %e, "value descriptor cannot be read");
                    self.failure = Some(SignalFailure::from_error(&self.id, &e));
                }
            },
            None => {
                self.failure =
                    Some(SignalFailure::new(&self.id, FailureReason::InvalidState, "signal has no value descriptor"));
            }
        }

        if let Some(descriptor) = &self.domain_descriptor {
            match SampleDecoder::for_descriptor(descriptor.clone(), ReadMode::Unscaled) {
                Ok(decoder) => self.domain_decoder = Some(decoder),
                Err(e) => {
                    warn!(signal = %self.id, error = %e, "domain descriptor cannot be read");
                    if self.failure.is_none() {
                        self.failure = Some(SignalFailure::from_error(&self.id, &e));
                    }
                }
            }
        }
    }

    pub(crate) fn apply_event(&mut self, event: &EventPacket) -> EventEffect {
        if event.is_descriptor_changed() {
            self.apply_descriptor_event(event)
        } else if event.is_gap() {
            debug!(signal = %self.id, diff = ?event.gap_diff(), "gap in signal domain");
            self.next_expected = None;
            if self.sync_status == SyncStatus::Synchronized {
                self.sync_status = SyncStatus::Synchronizing;
            }
            EventEffect::Gap
        } else {
            EventEffect::Other
        }
    }

    /// Apply descriptor events already queued ahead of any data.
    pub(crate) fn apply_queued_descriptors(&mut self) {
        while self.peek_event().is_some_and(|event| event.is_descriptor_changed()) {
            if let Some(event) = self.take_event() {
                self.apply_event(&event);
            }
        }
    }

    /// Take events off the queue head until one must be reported.
    ///
    /// Descriptor events repeating the current descriptors are swallowed, as
    /// is every event when `skip_events` is set. Samples that cannot form a
    /// whole common-rate sample before an event, and data the current
    /// descriptor cannot decode, are dropped on the way.
    pub(crate) fn drain_events(&mut self, skip_events: bool) -> Drained {
        let mut drained = Drained::default();
        loop {
            self.discard_partial_before_event();
            self.drop_undecodable();
            let Some(event) = self.take_event() else { break };
            let effect = self.apply_event(&event);
            drained.handled |= effect != EventEffect::Ignored;
            drained.domain_changed |= effect == EventEffect::DomainChanged;
            if effect == EventEffect::Ignored || skip_events {
                continue;
            }
            drained.event = Some(event);
            break;
        }
        drained
    }

    fn discard_partial_before_event(&mut self) {
        let until = self.samples_until_event();
        if until > 0 && until < self.divider() && self.has_queued_event() {
            let skipped = self.skip(until);
            debug!(signal = %self.id, skipped, "dropped samples short of a common-rate sample before event");
        }
    }

    fn drop_undecodable(&mut self) {
        let undecodable = self.failure.as_ref().is_some_and(|failure| {
            matches!(failure.reason, FailureReason::InvalidSampleType | FailureReason::Unsupported)
        });
        if undecodable {
            let until = self.samples_until_event();
            if until > 0 {
                let skipped = self.skip(until);
                debug!(signal = %self.id, skipped, "dropped samples of unreadable descriptor");
            }
        }
    }

    /// Make sure the cursor holds unread samples, pulling the next data packet.
    fn ensure_cursor(&mut self) -> bool {
        if self.cursor_remaining() > 0 {
            return true;
        }
        self.cursor = None;
        let Some(source) = self.source() else { return false };
        while let Some(Packet::Data(_)) = source.peek() {
            if let Some(Packet::Data(packet)) = source.dequeue() {
                if packet.sample_count > 0 {
                    self.cursor = Some(Cursor { packet, position: 0 });
                    return true;
                }
            }
        }
        false
    }

    fn advance(&mut self, count: usize) {
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.position += count;
            self.next_expected = native_tick(&cursor.packet, cursor.position);
        }
    }

    /// Decode up to `count` native samples, stopping at the next event.
    ///
    /// Either buffer may be omitted; omitting both skips samples.
    pub fn read_packets(
        &mut self,
        mut values: Option<&mut [V]>,
        mut domain: Option<&mut [D]>,
        count: usize,
    ) -> Result<usize> {
        let short = values.as_ref().is_some_and(|v| v.len() < count) || domain.as_ref().is_some_and(|d| d.len() < count);
        if short {
            return Err(ReaderError::invalid_parameter(format!(
                "buffers for '{}' hold fewer than {} samples",
                self.id, count
            )));
        }

        let mut done = 0;
        while done < count && self.ensure_cursor() {
            let Some(cursor) = self.cursor.as_ref() else { break };
            let packet = cursor.packet.clone();
            let start = cursor.position;
            let n = (count - done).min(cursor.remaining());

            if let Some(values) = values.as_deref_mut() {
                self.read_packet_data(&packet, start, &mut values[done..done + n])?;
            }
            if let Some(domain) = domain.as_deref_mut() {
                self.read_packet_domain(&packet, start, &mut domain[done..done + n])?;
            }
            self.advance(n);
            done += n;
        }

        if let (Some(values), Some(transform)) = (values, &self.info.value_transform) {
            transform(&mut values[..done]);
        }
        if let (Some(domain), Some(transform)) = (domain, &self.info.domain_transform) {
            transform(&mut domain[..done]);
        }
        trace!(signal = %self.id, requested = count, read = done, "read packets");
        Ok(done)
    }

    /// Check that the next `count` native samples decode under the current
    /// descriptors, without consuming anything.
    pub(crate) fn check_decodable(&self, count: usize, values: bool, domain: bool) -> Result<()> {
        if count == 0 || !(values || domain) {
            return Ok(());
        }
        let mut packets: Vec<(Arc<DataPacket>, usize)> =
            self.cursor.iter().filter(|c| c.remaining() > 0).map(|c| (c.packet.clone(), c.position)).collect();
        let buffered = self.cursor_remaining();
        if buffered < count {
            if let Some(source) = self.source() {
                packets.extend(source.data_ahead(count - buffered).into_iter().map(|packet| (packet, 0)));
            }
        }

        let mut left = count;
        for (packet, start) in packets {
            if left == 0 {
                break;
            }
            let n = left.min(packet.sample_count - start);
            if values {
                self.value_decoder()?.check(&packet, start, n)?;
            }
            if let (true, Some(samples), Some(decoder)) = (domain, &packet.domain, &self.domain_decoder) {
                decoder.check(samples, start, n)?;
            }
            left -= n;
        }
        Ok(())
    }

    fn value_decoder(&self) -> Result<&SampleDecoder<V>> {
        self.value_decoder.as_ref().ok_or_else(|| {
            ReaderError::invalid_state(format!("signal '{}' has no readable value descriptor", self.id))
        })
    }

    fn read_packet_data(&self, packet: &DataPacket, start: usize, out: &mut [V]) -> Result<()> {
        self.value_decoder()?.decode(packet, start, out)
    }

    fn read_packet_domain(&self, packet: &DataPacket, start: usize, out: &mut [D]) -> Result<()> {
        match (&packet.domain, &self.domain_decoder) {
            (Some(domain), Some(decoder)) => decoder.decode(domain, start, out),
            _ => {
                out.fill(D::default());
                Ok(())
            }
        }
    }

    /// Drop up to `count` native samples ahead of the next event.
    pub fn skip(&mut self, count: usize) -> usize {
        let mut done = 0;
        while done < count && self.ensure_cursor() {
            let n = (count - done).min(self.cursor_remaining());
            self.advance(n);
            done += n;
        }
        done
    }

    /// Common tick of the next unread sample, pulling a packet if needed.
    pub(crate) fn next_tick(&mut self) -> Option<i64> {
        if !self.ensure_cursor() {
            return None;
        }
        let cursor = self.cursor.as_ref()?;
        self.mapping.to_common(native_tick(&cursor.packet, cursor.position)?)
    }

    /// Common tick the next sample is expected at, from what was consumed.
    pub(crate) fn expected_tick(&self) -> Option<i64> {
        self.mapping.to_common(self.next_expected?)
    }

    /// Align the next sample to `tick`.
    ///
    /// Samples before `tick - lower` are dropped. The reader synchronizes if
    /// its next sample then lies at or before `tick + upper`.
    pub(crate) fn sync(&mut self, tick: i64, lower: i64, upper: i64) -> SyncOutcome {
        let _entered = self.info.span.clone().entered();
        self.sync_status = SyncStatus::Synchronizing;
        let earliest = tick.saturating_sub(lower);
        let delta = self.mapping.delta.max(1);

        let next = loop {
            let Some(next) = self.next_tick() else { return SyncOutcome::Pending };
            if next >= earliest {
                break next;
            }
            let behind = (earliest as i128 - next as i128 + delta as i128 - 1) / delta as i128;
            let step = usize::try_from(behind).unwrap_or(usize::MAX).min(self.cursor_remaining());
            self.skip(step);
        };

        if next > tick.saturating_add(upper) {
            self.sync_status = SyncStatus::SynchronizationFailed;
            warn!(signal = %self.id, target = tick, next, "next sample lies beyond the tolerance window");
            SyncOutcome::Failed { tick: next }
        } else {
            self.next_expected = self.cursor.as_ref().and_then(|c| native_tick(&c.packet, c.position));
            self.sync_status = SyncStatus::Synchronized;
            debug!(signal = %self.id, target = tick, next, "synchronized");
            SyncOutcome::Synchronized { tick: next }
        }
    }

    pub(crate) fn fail(&mut self, failure: SignalFailure) {
        warn!(signal = %self.id, %failure, "signal reader failed");
        self.failure = Some(failure);
    }
}

impl<V: Sample, D: Sample> EventSink for SignalReader<V, D> {
    fn handle_event(&mut self, event: &EventPacket) -> bool {
        !matches!(self.apply_event(event), EventEffect::Ignored)
    }
}

impl<V: Sample, D: Sample> fmt::Debug for SignalReader<V, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalReader")
            .field("id", &self.id)
            .field("read_mode", &self.info.read_mode)
            .field("sync_status", &self.sync_status)
            .field("mapping", &self.mapping)
            .field("failure", &self.failure)
            .finish()
    }
}

/// Native domain tick of sample `index` of `packet`.
fn native_tick(packet: &DataPacket, index: usize) -> Option<i64> {
    let descriptor = packet.domain_descriptor()?;
    let offset = packet.domain_offset()?;
    descriptor.rule.evaluate(offset, index).map(|tick| tick.as_i64())
}
