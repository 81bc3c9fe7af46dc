//! Fixed-size, optionally overlapping blocks of one signal

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use super::signal_reader::{SignalInfo, SignalReader};
use super::status::{ReaderStatus, SignalFailure};
use super::{Readiness, ReaderConfig, deadline_after};
use crate::connection::{Listener, Notifier};
use crate::decoder::Sample;
use crate::executor::TaskExecutor;
use crate::types::DataDescriptor;
use crate::{ReaderError, Result};

/// Reads one signal in blocks of `block_size` samples.
///
/// Consecutive blocks share `overlap` samples: the last `overlap` samples of
/// a block are repeated at the start of the next one. Counts passed to and
/// returned from reads are in blocks. Samples that cannot complete a block
/// before an event are dropped and the overlap starts over after the event.
pub struct BlockReader<V: Sample = f64, D: Sample = i64> {
    reader: SignalReader<V, D>,
    config: ReaderConfig,
    notifier: Notifier,
    retained_values: Vec<V>,
    retained_domain: Vec<D>,
    scratch_domain: Vec<D>,
}

impl<V: Sample, D: Sample> BlockReader<V, D> {
    pub(crate) fn open(info: SignalInfo<V, D>, config: ReaderConfig, executor: Arc<dyn TaskExecutor>) -> Result<Self> {
        config.validate_block()?;
        if !info.port.is_connected() {
            return Err(ReaderError::create_failed(format!("input port '{}' is not connected", info.port.name())));
        }
        let notifier = Notifier::with_executor(executor);
        info.port.set_notifier(notifier.clone());

        let mut reader = SignalReader::new(info);
        reader.apply_queued_descriptors();
        debug!(signal = %reader.id(), block_size = config.block_size, overlap = config.overlap, "block reader created");
        Ok(Self {
            reader,
            retained_values: Vec::with_capacity(config.overlap),
            retained_domain: Vec::with_capacity(config.overlap),
            scratch_domain: vec![D::default(); config.block_size],
            config,
            notifier,
        })
    }

    pub fn id(&self) -> &str {
        self.reader.id()
    }

    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    pub fn overlap(&self) -> usize {
        self.config.overlap
    }

    pub fn value_descriptor(&self) -> Option<&Arc<DataDescriptor>> {
        self.reader.value_descriptor()
    }

    pub fn domain_descriptor(&self) -> Option<&Arc<DataDescriptor>> {
        self.reader.domain_descriptor()
    }

    /// Fresh samples the next block needs.
    fn fresh_needed(&self) -> usize {
        self.config.block_size - self.retained_values.len()
    }

    /// Whole blocks readable before the next event.
    pub fn available_count(&self) -> usize {
        let available = self.reader.samples_until_event();
        let fresh = self.fresh_needed();
        if available < fresh {
            return 0;
        }
        let stride = self.config.block_size - self.config.overlap;
        1 + (available - fresh) / stride
    }

    /// Read up to `count` blocks into `values`, which must hold
    /// `count * block_size` samples.
    pub fn read(&mut self, values: &mut [V], count: usize, timeout: Duration) -> Result<ReaderStatus> {
        self.read_internal(values, None, count, timeout)
    }

    pub fn read_with_domain(
        &mut self,
        values: &mut [V],
        domain: &mut [D],
        count: usize,
        timeout: Duration,
    ) -> Result<ReaderStatus> {
        self.read_internal(values, Some(domain), count, timeout)
    }

    pub fn set_on_data_available(&self, listener: Option<Listener>) {
        self.notifier.set_listener(listener);
    }

    pub fn data_available_stream(&self) -> WatchStream<u64> {
        crate::stream::data_available(&self.notifier)
    }

    fn reset_overlap(&mut self) {
        self.retained_values.clear();
        self.retained_domain.clear();
    }

    /// Drop samples that cannot complete a block before the next event.
    fn discard_partial_block(&mut self) {
        let until = self.reader.samples_until_event();
        if until == 0 || until >= self.fresh_needed() || !self.reader.has_queued_event() {
            return;
        }
        let skipped = self.reader.skip(until);
        self.reset_overlap();
        debug!(signal = %self.reader.id(), skipped, "dropped partial block before event");
    }

    fn read_internal(
        &mut self,
        values: &mut [V],
        mut domain: Option<&mut [D]>,
        count: usize,
        timeout: Duration,
    ) -> Result<ReaderStatus> {
        let needed = count
            .checked_mul(self.config.block_size)
            .ok_or_else(|| ReaderError::overflow("block buffer size"))?;
        if values.len() < needed || domain.as_ref().is_some_and(|d| d.len() < needed) {
            return Err(ReaderError::invalid_parameter(format!(
                "buffers hold fewer than {} samples ({} blocks)",
                needed, count
            )));
        }
        let _entered = self.reader.span().clone().entered();
        let deadline = deadline_after(timeout);

        loop {
            let generation = self.notifier.generation();

            self.discard_partial_block();
            let drained = self.reader.drain_events(self.config.skip_events);
            if drained.handled {
                self.reset_overlap();
            }
            if let Some(event) = drained.event {
                return Ok(ReaderStatus::event(0, event));
            }
            if let Some(failure) = self.reader.check_valid() {
                return Ok(ReaderStatus::failed(failure));
            }

            let available = self.available_count();
            let event_queued = self.reader.has_queued_event();
            if let Some((readiness, n)) = Readiness::check(available, count, event_queued, &self.config, deadline) {
                for block in 0..n {
                    let range = block * self.config.block_size..(block + 1) * self.config.block_size;
                    let domain_block = domain.as_deref_mut().map(|d| &mut d[range.clone()]);
                    if let Err(e) = self.read_block(&mut values[range], domain_block) {
                        let failure = SignalFailure::from_error(self.reader.id(), &e);
                        self.reader.fail(failure.clone());
                        return Ok(ReaderStatus::failed(failure));
                    }
                }
                if readiness == Readiness::BlockedByEvent {
                    self.discard_partial_block();
                    let drained = self.reader.drain_events(self.config.skip_events);
                    if drained.handled {
                        self.reset_overlap();
                    }
                    if let Some(event) = drained.event {
                        return Ok(ReaderStatus::event(n, event));
                    }
                }
                return Ok(ReaderStatus::ok(n, readiness.timed_out(n, count)));
            }

            self.notifier.wait_for_change(generation, deadline);
        }
    }

    fn read_block(&mut self, values: &mut [V], domain: Option<&mut [D]>) -> Result<()> {
        let retained = self.retained_values.len();
        let fresh = values.len() - retained;
        values[..retained].copy_from_slice(&self.retained_values);

        let domain = match domain {
            Some(domain) => domain,
            None => self.scratch_domain.as_mut_slice(),
        };
        domain[..retained].copy_from_slice(&self.retained_domain);

        let read = self.reader.read_packets(Some(&mut values[retained..]), Some(&mut domain[retained..]), fresh)?;
        if read < fresh {
            return Err(ReaderError::invalid_state(format!("block needed {} samples, {} were queued", fresh, read)));
        }

        let keep = values.len() - self.config.overlap;
        self.retained_values.clear();
        self.retained_values.extend_from_slice(&values[keep..]);
        self.retained_domain.clear();
        self.retained_domain.extend_from_slice(&domain[keep..]);
        Ok(())
    }
}

impl<V: Sample, D: Sample> std::fmt::Debug for BlockReader<V, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockReader")
            .field("reader", &self.reader)
            .field("block_size", &self.config.block_size)
            .field("overlap", &self.config.overlap)
            .field("retained", &self.retained_values.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Signal;
    use crate::reader::BlockReaderBuilder;
    use crate::test_utils::{ms_domain, ramp, send_ramp, test_signal};
    use crate::types::{ReadStatus, ReadTimeoutType};

    fn blocks(signal: &Signal, block_size: usize, overlap: usize) -> BlockReader {
        BlockReaderBuilder::new().signal(signal).block_size(block_size).overlap(overlap).build().unwrap()
    }

    #[test]
    fn consecutive_blocks_share_overlap() {
        let signal = test_signal("ai0", 1);
        let mut reader = blocks(&signal, 10, 4);
        send_ramp(&signal, 0, 0, 22).unwrap();

        assert_eq!(reader.available_count(), 3);
        let mut values = [0.0; 30];
        let mut domain = [0i64; 30];
        let status = reader.read_with_domain(&mut values, &mut domain, 3, Duration::ZERO).unwrap();
        assert_eq!(status.count, 3);
        assert_eq!(&values[..10], &ramp(0.0, 10)[..]);
        assert_eq!(&values[10..20], &ramp(6.0, 10)[..]);
        assert_eq!(&values[20..30], &ramp(12.0, 10)[..]);
        assert_eq!(&values[6..10], &values[10..14]);
        assert_eq!(&domain[16..20], &domain[20..24]);
        assert_eq!(reader.available_count(), 0);
    }

    #[test]
    fn overlap_carries_across_reads() {
        let signal = test_signal("ai0", 1);
        let mut reader = blocks(&signal, 10, 4);
        send_ramp(&signal, 0, 0, 10).unwrap();

        let mut values = [0.0; 10];
        assert_eq!(reader.read(&mut values, 1, Duration::ZERO).unwrap().count, 1);
        send_ramp(&signal, 10, 10, 6).unwrap();
        assert_eq!(reader.read(&mut values, 1, Duration::ZERO).unwrap().count, 1);
        assert_eq!(values.to_vec(), ramp(6.0, 10));
    }

    #[test]
    fn partial_block_before_event_is_dropped() {
        let signal = test_signal("ai0", 1);
        let mut reader = blocks(&signal, 4, 0);
        send_ramp(&signal, 0, 0, 6).unwrap();
        signal.set_descriptors(signal.value_descriptor(), Some(ms_domain(2))).unwrap();

        let mut values = [0.0; 8];
        let status = reader.read(&mut values, 2, Duration::from_secs(5)).unwrap();
        assert_eq!((status.read_status, status.count), (ReadStatus::Event, 1));
        assert!(status.event_packet.unwrap().is_descriptor_changed());
        assert_eq!(&values[..4], &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(reader.available_count(), 0);

        let status = reader.read(&mut values, 2, Duration::ZERO).unwrap();
        assert_eq!((status.read_status, status.count), (ReadStatus::Ok, 0));
    }

    #[test]
    fn blocks_wait_for_enough_samples() {
        let signal = test_signal("ai0", 1);
        let config = ReaderConfig { timeout_type: ReadTimeoutType::All, ..ReaderConfig::default() };
        let mut reader: BlockReader =
            BlockReaderBuilder::new().signal(&signal).config(config).block_size(5).build().unwrap();
        send_ramp(&signal, 0, 0, 7).unwrap();

        let mut values = [0.0; 10];
        let status = reader.read(&mut values, 2, Duration::from_millis(20)).unwrap();
        assert_eq!(status.count, 1);
        assert!(status.timed_out);
    }

    #[test]
    fn overlap_not_below_block_size_is_rejected() {
        let signal = test_signal("ai0", 1);
        let result = BlockReaderBuilder::<f64, i64>::new().signal(&signal).block_size(10).overlap(10).build();
        assert!(matches!(result, Err(ReaderError::InvalidParameter { .. })));
    }
}
