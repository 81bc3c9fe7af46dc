//! Sample-by-sample reader of one signal

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use super::signal_reader::{SignalInfo, SignalReader};
use super::status::{ReaderStatus, SignalFailure};
use super::{Readiness, ReaderConfig, deadline_after};
use crate::connection::{InputPort, Listener, Notifier};
use crate::decoder::Sample;
use crate::executor::TaskExecutor;
use crate::types::{DataDescriptor, ReadMode};
use crate::{ReaderError, Result};

/// Reads the samples of one signal in arrival order.
///
/// Reads stop at events: a read cut short by an event returns the samples
/// preceding it together with the event, reported as
/// [`ReadStatus::Event`](crate::types::ReadStatus::Event).
pub struct StreamReader<V: Sample = f64, D: Sample = i64> {
    reader: SignalReader<V, D>,
    config: ReaderConfig,
    notifier: Notifier,
}

impl<V: Sample, D: Sample> StreamReader<V, D> {
    pub(crate) fn open(info: SignalInfo<V, D>, config: ReaderConfig, executor: Arc<dyn TaskExecutor>) -> Result<Self> {
        config.validate()?;
        if !info.port.is_connected() {
            return Err(ReaderError::create_failed(format!("input port '{}' is not connected", info.port.name())));
        }
        let notifier = Notifier::with_executor(executor);
        info.port.set_notifier(notifier.clone());

        let mut reader = SignalReader::new(info);
        reader.apply_queued_descriptors();
        debug!(signal = %reader.id(), read_mode = ?config.read_mode, "stream reader created");
        Ok(Self { reader, config, notifier })
    }

    pub fn id(&self) -> &str {
        self.reader.id()
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn read_mode(&self) -> ReadMode {
        self.config.read_mode
    }

    pub fn port(&self) -> &InputPort {
        self.reader.port()
    }

    pub fn value_descriptor(&self) -> Option<&Arc<DataDescriptor>> {
        self.reader.value_descriptor()
    }

    pub fn domain_descriptor(&self) -> Option<&Arc<DataDescriptor>> {
        self.reader.domain_descriptor()
    }

    /// Samples readable before the next descriptor change.
    pub fn available_count(&self) -> usize {
        self.reader.available(false)
    }

    pub fn is_empty(&self) -> bool {
        self.available_count() == 0
    }

    /// Read up to `count` values, waiting at most `timeout`.
    pub fn read(&mut self, values: &mut [V], count: usize, timeout: Duration) -> Result<ReaderStatus> {
        self.read_internal(Some(values), None, count, timeout)
    }

    /// Read up to `count` values and their domain values.
    pub fn read_with_domain(
        &mut self,
        values: &mut [V],
        domain: &mut [D],
        count: usize,
        timeout: Duration,
    ) -> Result<ReaderStatus> {
        self.read_internal(Some(values), Some(domain), count, timeout)
    }

    /// Drop up to `count` samples without decoding them.
    pub fn skip_samples(&mut self, count: usize) -> Result<ReaderStatus> {
        self.read_internal(None, None, count, Duration::ZERO)
    }

    /// Callback run through the reader's executor whenever packets arrive.
    pub fn set_on_data_available(&self, listener: Option<Listener>) {
        self.notifier.set_listener(listener);
    }

    /// Stream yielding once per burst of enqueued packets.
    pub fn data_available_stream(&self) -> WatchStream<u64> {
        crate::stream::data_available(&self.notifier)
    }

    fn read_internal(
        &mut self,
        mut values: Option<&mut [V]>,
        mut domain: Option<&mut [D]>,
        count: usize,
        timeout: Duration,
    ) -> Result<ReaderStatus> {
        if values.as_ref().is_some_and(|v| v.len() < count) || domain.as_ref().is_some_and(|d| d.len() < count) {
            return Err(ReaderError::invalid_parameter(format!("buffers hold fewer than {} samples", count)));
        }
        let _entered = self.reader.span().clone().entered();
        let deadline = deadline_after(timeout);

        loop {
            let generation = self.notifier.generation();

            let drained = self.reader.drain_events(self.config.skip_events);
            if let Some(event) = drained.event {
                return Ok(ReaderStatus::event(0, event));
            }
            if let Some(failure) = self.reader.check_valid() {
                return Ok(ReaderStatus::failed(failure));
            }

            let available = self.reader.samples_until_event();
            let event_queued = self.reader.has_queued_event();
            if let Some((readiness, n)) = Readiness::check(available, count, event_queued, &self.config, deadline) {
                let read = match self.reader.read_packets(values.as_deref_mut(), domain.as_deref_mut(), n) {
                    Ok(read) => read,
                    Err(e) => {
                        let failure = SignalFailure::from_error(self.reader.id(), &e);
                        self.reader.fail(failure.clone());
                        return Ok(ReaderStatus::failed(failure));
                    }
                };
                if readiness == Readiness::BlockedByEvent {
                    if let Some(event) = self.reader.drain_events(self.config.skip_events).event {
                        return Ok(ReaderStatus::event(read, event));
                    }
                }
                return Ok(ReaderStatus::ok(read, readiness.timed_out(read, count)));
            }

            self.notifier.wait_for_change(generation, deadline);
        }
    }
}

impl<V: Sample, D: Sample> std::fmt::Debug for StreamReader<V, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader").field("reader", &self.reader).field("config", &self.config).finish()
    }
}
