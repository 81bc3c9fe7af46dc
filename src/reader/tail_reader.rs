//! Most recent samples of one signal

use std::collections::VecDeque;
use std::sync::Arc;

use tokio_stream::wrappers::WatchStream;
use tracing::{debug, trace};

use super::ReaderConfig;
use super::signal_reader::{SignalInfo, SignalReader};
use super::status::{ReaderStatus, SignalFailure};
use crate::connection::{Listener, Notifier};
use crate::decoder::Sample;
use crate::executor::TaskExecutor;
use crate::types::DataDescriptor;
use crate::{ReaderError, Result};

/// Keeps the last `history_size` samples of one signal.
///
/// Reads never block and never consume the window: each read first pulls
/// everything queued ahead of the next event into the window, then copies its
/// newest samples out, oldest first. An event ends the current history.
pub struct TailReader<V: Sample = f64, D: Sample = i64> {
    reader: SignalReader<V, D>,
    config: ReaderConfig,
    notifier: Notifier,
    values: VecDeque<V>,
    domain: VecDeque<D>,
    scratch_values: Vec<V>,
    scratch_domain: Vec<D>,
}

impl<V: Sample, D: Sample> TailReader<V, D> {
    pub(crate) fn open(info: SignalInfo<V, D>, config: ReaderConfig, executor: Arc<dyn TaskExecutor>) -> Result<Self> {
        config.validate_tail()?;
        if !info.port.is_connected() {
            return Err(ReaderError::create_failed(format!("input port '{}' is not connected", info.port.name())));
        }
        let notifier = Notifier::with_executor(executor);
        info.port.set_notifier(notifier.clone());

        let mut reader = SignalReader::new(info);
        reader.apply_queued_descriptors();
        debug!(signal = %reader.id(), history_size = config.history_size, "tail reader created");
        let history = config.history_size;
        Ok(Self {
            reader,
            config,
            notifier,
            values: VecDeque::with_capacity(history),
            domain: VecDeque::with_capacity(history),
            scratch_values: vec![V::default(); history],
            scratch_domain: vec![D::default(); history],
        })
    }

    pub fn id(&self) -> &str {
        self.reader.id()
    }

    pub fn history_size(&self) -> usize {
        self.config.history_size
    }

    pub fn value_descriptor(&self) -> Option<&Arc<DataDescriptor>> {
        self.reader.value_descriptor()
    }

    /// Samples a read could return right now.
    pub fn available_count(&self) -> usize {
        (self.values.len() + self.reader.samples_until_event()).min(self.config.history_size)
    }

    /// Copy the newest `count` samples, or fewer if the window holds fewer.
    pub fn read(&mut self, values: &mut [V], count: usize) -> Result<ReaderStatus> {
        self.read_internal(values, None, count)
    }

    pub fn read_with_domain(&mut self, values: &mut [V], domain: &mut [D], count: usize) -> Result<ReaderStatus> {
        self.read_internal(values, Some(domain), count)
    }

    pub fn set_on_data_available(&self, listener: Option<Listener>) {
        self.notifier.set_listener(listener);
    }

    pub fn data_available_stream(&self) -> WatchStream<u64> {
        crate::stream::data_available(&self.notifier)
    }

    fn read_internal(&mut self, values: &mut [V], domain: Option<&mut [D]>, count: usize) -> Result<ReaderStatus> {
        if values.len() < count || domain.as_ref().is_some_and(|d| d.len() < count) {
            return Err(ReaderError::invalid_parameter(format!("buffers hold fewer than {} samples", count)));
        }
        let _entered = self.reader.span().clone().entered();

        if self.reader.check_valid().is_some() {
            let drained = self.reader.drain_events(self.config.skip_events);
            if drained.handled {
                self.clear_history();
            }
            if let Some(event) = drained.event {
                return Ok(ReaderStatus::event(0, event));
            }
            if let Some(failure) = self.reader.check_valid() {
                return Ok(ReaderStatus::failed(failure));
            }
        }

        if let Err(e) = self.ingest() {
            let failure = SignalFailure::from_error(self.reader.id(), &e);
            self.reader.fail(failure.clone());
            return Ok(ReaderStatus::failed(failure));
        }

        let n = count.min(self.values.len());
        let start = self.values.len() - n;
        for (slot, value) in values.iter_mut().zip(self.values.range(start..)) {
            *slot = *value;
        }
        if let Some(domain) = domain {
            for (slot, value) in domain.iter_mut().zip(self.domain.range(start..)) {
                *slot = *value;
            }
        }

        let drained = self.reader.drain_events(self.config.skip_events);
        if drained.handled {
            self.clear_history();
        }
        match drained.event {
            Some(event) => Ok(ReaderStatus::event(n, event)),
            None => Ok(ReaderStatus::ok(n, false)),
        }
    }

    /// Move every sample queued ahead of the next event into the window.
    fn ingest(&mut self) -> Result<()> {
        let history = self.config.history_size;
        let queued = self.reader.samples_until_event();
        if queued == 0 {
            return Ok(());
        }
        if queued > history {
            self.reader.skip(queued - history);
        }

        let wanted = queued.min(history);
        let read = self.reader.read_packets(
            Some(&mut self.scratch_values[..wanted]),
            Some(&mut self.scratch_domain[..wanted]),
            wanted,
        )?;
        self.values.extend(&self.scratch_values[..read]);
        self.domain.extend(&self.scratch_domain[..read]);
        while self.values.len() > history {
            self.values.pop_front();
            self.domain.pop_front();
        }
        trace!(signal = %self.reader.id(), read, window = self.values.len(), "tail window updated");
        Ok(())
    }

    fn clear_history(&mut self) {
        self.values.clear();
        self.domain.clear();
    }
}

impl<V: Sample, D: Sample> std::fmt::Debug for TailReader<V, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailReader")
            .field("reader", &self.reader)
            .field("history_size", &self.config.history_size)
            .field("window", &self.values.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::Signal;
    use crate::reader::TailReaderBuilder;
    use crate::test_utils::{ms_domain, ramp, send_ramp, test_signal};
    use crate::types::ReadStatus;

    fn tail(signal: &Signal, history: usize) -> TailReader {
        TailReaderBuilder::new().signal(signal).history_size(history).build().unwrap()
    }

    proptest! {
        #[test]
        fn window_holds_most_recent_samples(history in 1usize..32, extra in 1usize..64, chunk in 1usize..16) {
            let signal = test_signal("ai0", 1);
            let mut reader = tail(&signal, history);
            let total = history + extra;
            let mut sent = 0;
            while sent < total {
                let n = chunk.min(total - sent);
                send_ramp(&signal, sent as i64, sent, n).unwrap();
                sent += n;
            }

            let mut values = vec![0.0; history];
            let status = reader.read(&mut values, history).unwrap();
            prop_assert_eq!(status.count, history);
            prop_assert_eq!(values, ramp(extra as f64, history));
        }
    }

    #[test]
    fn reads_return_what_is_resident() {
        let signal = test_signal("ai0", 1);
        let mut reader = tail(&signal, 5);
        let mut values = [0.0; 5];
        assert_eq!(reader.read(&mut values, 5).unwrap().count, 0);

        send_ramp(&signal, 0, 0, 3).unwrap();
        assert_eq!(reader.available_count(), 3);
        let status = reader.read(&mut values, 5).unwrap();
        assert_eq!(status.count, 3);
        assert_eq!(&values[..3], &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn reads_do_not_consume_the_window() {
        let signal = test_signal("ai0", 1);
        let mut reader = tail(&signal, 4);
        send_ramp(&signal, 0, 0, 6).unwrap();

        let mut values = [0.0; 2];
        let mut domain = [0i64; 2];
        reader.read_with_domain(&mut values, &mut domain, 2).unwrap();
        assert_eq!((values, domain), ([4.0, 5.0], [4, 5]));
        reader.read_with_domain(&mut values, &mut domain, 2).unwrap();
        assert_eq!((values, domain), ([4.0, 5.0], [4, 5]));

        send_ramp(&signal, 6, 6, 1).unwrap();
        let mut values = [0.0; 4];
        reader.read(&mut values, 4).unwrap();
        assert_eq!(values, [3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn event_returns_tail_and_clears_history() {
        let signal = test_signal("ai0", 1);
        let mut reader = tail(&signal, 4);
        send_ramp(&signal, 0, 0, 3).unwrap();
        signal.set_descriptors(signal.value_descriptor(), Some(ms_domain(5))).unwrap();

        let mut values = [0.0; 4];
        let status = reader.read(&mut values, 4).unwrap();
        assert_eq!(status.read_status, ReadStatus::Event);
        assert_eq!(status.count, 3);
        assert_eq!(&values[..3], &[0.0, 1.0, 2.0]);
        assert_eq!(reader.read(&mut values, 4).unwrap().count, 0);
    }
}
