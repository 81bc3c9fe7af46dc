//! Synchronized reading of several signals on a common sample rate

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_stream::wrappers::WatchStream;
use tracing::{Span, debug, info, info_span, warn};

use super::domain::CommonDomain;
use super::signal_reader::{SignalInfo, SignalReader, SyncOutcome};
use super::status::{FailureReason, MultiReaderStatus, SignalFailure};
use super::{ReaderConfig, deadline_after};
use crate::connection::{Listener, Notifier};
use crate::decoder::Sample;
use crate::types::{Ratio, ReadStatus, ReadTimeoutType, SyncStatus};
use crate::{ReaderError, Result};

/// Outcome of one synchronization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncPass {
    Done,
    Pending,
    Failed,
}

/// Reads several signals aligned on a common domain.
///
/// All signals are converted to a shared tick unit (the finest resolution of
/// the group, counted from the earliest origin). The common sample rate is the
/// least common multiple of the signals' sample periods in that unit, and each
/// signal contributes `divider` native samples per common-rate sample.
///
/// Before the first read the reader synchronizes: the latest first sample of
/// all signals becomes the start tick and earlier samples are dropped. A gap or
/// domain change on one signal later resynchronizes that signal against its
/// peers; failing to do so is terminal.
pub struct MultiReader<V: Sample = f64, D: Sample = i64> {
    readers: Vec<SignalReader<V, D>>,
    config: ReaderConfig,
    notifier: Notifier,
    common: Option<CommonDomain>,
    domain_failure: Option<SignalFailure>,
    sync_status: SyncStatus,
    sync_failures: Vec<SignalFailure>,
    start_timestamp: Option<DateTime<Utc>>,
    span: Span,
}

impl<V: Sample, D: Sample> MultiReader<V, D> {
    pub(crate) fn new(infos: Vec<SignalInfo<V, D>>, config: ReaderConfig, notifier: Notifier) -> Result<Self> {
        config.validate()?;
        if infos.is_empty() {
            return Err(ReaderError::create_failed("multi reader needs at least one signal"));
        }

        let mut readers: Vec<SignalReader<V, D>> = infos.into_iter().map(SignalReader::new).collect();
        for reader in &mut readers {
            reader.port().set_notifier(notifier.clone());
            reader.apply_queued_descriptors();
        }

        let span = info_span!("multi_reader", signals = readers.len());
        let mut reader = Self {
            readers,
            config,
            notifier,
            common: None,
            domain_failure: None,
            sync_status: SyncStatus::Unsynchronized,
            sync_failures: Vec::new(),
            start_timestamp: None,
            span,
        };
        let common = reader.compute_common_domain()?;
        reader.apply_common_domain(common);
        Ok(reader)
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn signal_ids(&self) -> Vec<&str> {
        self.readers.iter().map(SignalReader::id).collect()
    }

    pub fn signal_count(&self) -> usize {
        self.readers.len()
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    /// Absolute time of the tick the signals were aligned to.
    pub fn start_timestamp(&self) -> Option<DateTime<Utc>> {
        self.start_timestamp
    }

    /// Common ticks per common-rate sample.
    pub fn common_sample_rate(&self) -> Option<i64> {
        self.common.as_ref().map(|common| common.sample_rate)
    }

    /// Seconds per common tick.
    pub fn tick_resolution(&self) -> Option<Ratio> {
        self.common.as_ref().map(|common| common.resolution)
    }

    /// Native samples per common-rate sample, in signal order.
    pub fn sample_rate_dividers(&self) -> Vec<usize> {
        self.readers.iter().map(SignalReader::divider).collect()
    }

    /// Failures that ended synchronization.
    pub fn sync_failures(&self) -> &[SignalFailure] {
        &self.sync_failures
    }

    /// Callback run through the reader's executor whenever packets arrive.
    pub fn set_on_data_available(&self, listener: Option<Listener>) {
        self.notifier.set_listener(listener);
    }

    /// Stream yielding once per burst of packets enqueued on any signal.
    pub fn data_available_stream(&self) -> WatchStream<u64> {
        crate::stream::data_available(&self.notifier)
    }

    /// Common-rate samples every signal can deliver without waiting.
    ///
    /// Synchronizes first if needed, which may drop leading samples.
    pub fn available_count(&mut self) -> usize {
        if self.sync_status.is_failed() || self.collect_failures().is_some() {
            return 0;
        }
        if self.needs_sync() && self.synchronize() != SyncPass::Done {
            return 0;
        }
        self.min_available()
    }

    /// Read `count` common-rate samples of every signal.
    ///
    /// `values` holds one column per signal in the order signals were added;
    /// column `i` must fit `count * divider(i)` samples.
    pub fn read(&mut self, values: &mut [&mut [V]], count: usize, timeout: Duration) -> Result<MultiReaderStatus> {
        self.read_internal(Some(values), None, count, timeout)
    }

    /// Like [`read`](Self::read), also decoding each signal's domain values.
    pub fn read_with_domain(
        &mut self,
        values: &mut [&mut [V]],
        domain: &mut [&mut [D]],
        count: usize,
        timeout: Duration,
    ) -> Result<MultiReaderStatus> {
        self.read_internal(Some(values), Some(domain), count, timeout)
    }

    /// Drop up to `count` common-rate samples of every signal.
    pub fn skip_samples(&mut self, count: usize) -> Result<MultiReaderStatus> {
        self.read_internal(None, None, count, Duration::ZERO)
    }

    fn read_internal(
        &mut self,
        mut values: Option<&mut [&mut [V]]>,
        mut domain: Option<&mut [&mut [D]]>,
        count: usize,
        timeout: Duration,
    ) -> Result<MultiReaderStatus> {
        self.check_columns(values.as_deref().map(<[&mut [V]]>::len), "value")?;
        self.check_columns(domain.as_deref().map(<[&mut [D]]>::len), "domain")?;
        self.check_column_lengths(values.as_deref(), count)?;
        self.check_column_lengths(domain.as_deref(), count)?;

        let _entered = self.span.clone().entered();
        let deadline = deadline_after(timeout);

        loop {
            let generation = self.notifier.generation();

            if self.sync_status.is_failed() {
                return Ok(self.sync_failure_status());
            }
            if let Some(status) = self.process_events() {
                return Ok(status);
            }
            if let Some(failures) = self.collect_failures() {
                return Ok(self.failure_status(failures));
            }

            let expired = std::time::Instant::now() >= deadline;
            if self.needs_sync() {
                match self.synchronize() {
                    SyncPass::Done => {}
                    SyncPass::Failed => return Ok(self.sync_failure_status()),
                    SyncPass::Pending if expired || self.any_ready() => {
                        let mut status = self.status(ReadStatus::Ok);
                        status.timed_out = expired && count > 0;
                        return Ok(status);
                    }
                    SyncPass::Pending => {
                        self.notifier.wait_for_change(generation, deadline);
                        continue;
                    }
                }
            }

            if let Some((n, timed_out)) = self.ready_count(count, expired) {
                if let Some(failures) = self.read_common(values.as_deref_mut(), domain.as_deref_mut(), n)? {
                    return Ok(self.failure_status(failures));
                }
                if n < count {
                    if let Some(mut status) = self.process_events() {
                        status.count = n;
                        return Ok(status);
                    }
                }
                let mut status = self.status(ReadStatus::Ok);
                status.count = n;
                status.timed_out = timed_out;
                return Ok(status);
            }

            self.notifier.wait_for_change(generation, deadline);
        }
    }

    /// Common-rate samples to read now, or `None` to keep waiting.
    fn ready_count(&self, count: usize, expired: bool) -> Option<(usize, bool)> {
        let available = self.min_available();
        let threshold = self.config.min_read_count.min(count).max(1);

        if available >= count {
            return Some((count, false));
        }
        if available > 0 && self.readers.iter().any(SignalReader::has_queued_event) {
            return Some((available, false));
        }
        if self.any_ready() {
            let n = if available >= threshold { available } else { 0 };
            return Some((n, false));
        }
        if expired {
            let n = if available >= threshold { available } else { 0 };
            return Some((n, n < count));
        }
        None
    }

    /// `Any` timeout type and at least one signal has data.
    fn any_ready(&self) -> bool {
        self.config.timeout_type == ReadTimeoutType::Any
            && self.readers.iter().any(|reader| reader.samples_until_event() > 0)
    }

    fn check_columns(&self, columns: Option<usize>, kind: &str) -> Result<()> {
        match columns {
            Some(columns) if columns != self.readers.len() => Err(ReaderError::invalid_parameter(format!(
                "expected {} {} buffers, got {}",
                self.readers.len(),
                kind,
                columns
            ))),
            _ => Ok(()),
        }
    }

    fn check_column_lengths<T>(&self, columns: Option<&[&mut [T]]>, count: usize) -> Result<()> {
        let Some(columns) = columns else { return Ok(()) };
        for (reader, column) in self.readers.iter().zip(columns) {
            let needed = count
                .checked_mul(reader.divider())
                .ok_or_else(|| ReaderError::overflow(format!("buffer size for '{}'", reader.id())))?;
            if column.len() < needed {
                return Err(ReaderError::invalid_parameter(format!(
                    "buffer for '{}' holds {} samples, {} needed",
                    reader.id(),
                    column.len(),
                    needed
                )));
            }
        }
        Ok(())
    }

    fn status(&self, read_status: ReadStatus) -> MultiReaderStatus {
        MultiReaderStatus::new(read_status, self.sync_status, self.start_timestamp)
    }

    fn sync_failure_status(&self) -> MultiReaderStatus {
        let mut status = self.status(ReadStatus::Fail);
        status.failures = self.sync_failures.clone();
        status
    }

    fn failure_status(&self, failures: Vec<SignalFailure>) -> MultiReaderStatus {
        let unsupported = failures.iter().all(|failure| failure.reason == FailureReason::Unsupported);
        let mut status = self.status(if unsupported { ReadStatus::Unsupported } else { ReadStatus::Fail });
        status.failures = failures;
        status
    }

    fn collect_failures(&self) -> Option<Vec<SignalFailure>> {
        let failures: Vec<SignalFailure> =
            self.domain_failure.iter().cloned().chain(self.readers.iter().filter_map(SignalReader::check_valid)).collect();
        if failures.is_empty() { None } else { Some(failures) }
    }

    /// Handle the events at every signal's head.
    ///
    /// Returns the events the caller has to see; an event on one signal pauses
    /// all of them.
    fn process_events(&mut self) -> Option<MultiReaderStatus> {
        let mut events = HashMap::new();
        let mut domain_changed = None;
        for reader in &mut self.readers {
            let drained = reader.drain_events(self.config.skip_events);
            if drained.domain_changed {
                domain_changed = Some(reader.id().to_string());
            }
            if let Some(event) = drained.event {
                events.insert(reader.id().to_string(), event);
            }
        }

        if let Some(signal) = domain_changed {
            self.refresh_common_domain(&signal);
        }
        if events.is_empty() {
            return None;
        }
        debug!(signals = ?events.keys().collect::<Vec<_>>(), "read paused by events");
        let mut status = self.status(ReadStatus::Event);
        status.event_packets = events;
        Some(status)
    }

    fn compute_common_domain(&self) -> Result<CommonDomain> {
        let domains = self.readers.iter().map(SignalReader::signal_domain).collect::<Result<Vec<_>>>()?;
        CommonDomain::compute(&domains, self.config.required_common_sample_rate)
    }

    fn apply_common_domain(&mut self, common: CommonDomain) {
        for (reader, mapping) in self.readers.iter_mut().zip(&common.mappings) {
            reader.set_mapping(*mapping);
        }
        debug!(
            sample_rate = common.sample_rate,
            resolution = %common.resolution,
            dividers = ?self.sample_rate_dividers(),
            "common domain"
        );
        self.common = Some(common);
        self.domain_failure = None;
    }

    fn refresh_common_domain(&mut self, changed_signal: &str) {
        match self.compute_common_domain() {
            Ok(common) => self.apply_common_domain(common),
            Err(e) => {
                warn!(signal = changed_signal, error = %e, "signals no longer share a common sample rate");
                self.common = None;
                self.domain_failure =
                    Some(SignalFailure::from_error(changed_signal, &e));
            }
        }
    }

    fn needs_sync(&self) -> bool {
        self.sync_status != SyncStatus::Synchronized
            || self.readers.iter().any(|reader| reader.sync_status() != SyncStatus::Synchronized)
    }

    fn min_available(&self) -> usize {
        self.readers.iter().map(|reader| reader.samples_until_event() / reader.divider()).min().unwrap_or(0)
    }

    /// Tolerance window `(lower, upper)` in common ticks for `reader`.
    fn window(tolerance: Option<i64>, reader: &SignalReader<V, D>) -> (i64, i64) {
        match tolerance {
            Some(tolerance) => (tolerance, tolerance),
            None => (0, reader.mapping().delta.saturating_sub(1).max(0)),
        }
    }

    fn synchronize(&mut self) -> SyncPass {
        let Some(common) = self.common.clone() else { return SyncPass::Pending };
        let tolerance = match self.config.tick_offset_tolerance.map(|t| common.tolerance_ticks(t)).transpose() {
            Ok(tolerance) => tolerance,
            Err(e) => {
                let first = self.readers.first().map(|r| r.id().to_string()).unwrap_or_default();
                return self.fail_sync(vec![SignalFailure::from_error(first, &e)]);
            }
        };

        if self.sync_status == SyncStatus::Synchronized {
            let target = self
                .readers
                .iter()
                .filter(|reader| reader.sync_status() == SyncStatus::Synchronized)
                .filter_map(SignalReader::expected_tick)
                .max();
            if let Some(target) = target {
                return self.resync(target, tolerance);
            }
            debug!("no synchronized peer left, restarting synchronization");
        }
        self.initial_sync(&common, tolerance)
    }

    fn initial_sync(&mut self, common: &CommonDomain, tolerance: Option<i64>) -> SyncPass {
        self.sync_status = SyncStatus::Synchronizing;

        let mut latest: Option<(usize, i64)> = None;
        for (index, reader) in self.readers.iter_mut().enumerate() {
            let Some(tick) = reader.next_tick() else { return SyncPass::Pending };
            if latest.is_none_or(|(_, latest)| tick > latest) {
                latest = Some((index, tick));
            }
        }
        let Some((latest_index, latest_tick)) = latest else { return SyncPass::Pending };
        let target = if self.config.start_on_full_unit_of_domain {
            common.round_up_to_second(latest_tick).unwrap_or(latest_tick)
        } else {
            latest_tick
        };

        let mut pending = false;
        let mut beyond = Vec::new();
        for reader in &mut self.readers {
            let (lower, upper) = Self::window(tolerance, reader);
            match reader.sync(target, lower, upper) {
                SyncOutcome::Synchronized { .. } => {}
                SyncOutcome::Pending => pending = true,
                SyncOutcome::Failed { tick } => beyond.push(format!("'{}' next sample at tick {}", reader.id(), tick)),
            }
        }

        if !beyond.is_empty() {
            let later = self.readers[latest_index].id().to_string();
            let details = format!("start tick {} not reachable within tolerance: {}", target, beyond.join(", "));
            return self.fail_sync(vec![SignalFailure::new(later, FailureReason::ToleranceExceeded, details)]);
        }
        if pending {
            return SyncPass::Pending;
        }

        self.sync_status = SyncStatus::Synchronized;
        self.start_timestamp = common.timestamp(target);
        info!(tick = target, start = ?self.start_timestamp, "signals synchronized");
        SyncPass::Done
    }

    fn resync(&mut self, target: i64, tolerance: Option<i64>) -> SyncPass {
        let mut pending = false;
        let mut failures = Vec::new();
        for reader in &mut self.readers {
            if reader.sync_status() == SyncStatus::Synchronized {
                continue;
            }
            let (lower, upper) = Self::window(tolerance, reader);
            match reader.sync(target, lower, upper) {
                SyncOutcome::Synchronized { .. } => debug!(signal = %reader.id(), tick = target, "signal resynchronized"),
                SyncOutcome::Pending => pending = true,
                SyncOutcome::Failed { tick } => failures.push(SignalFailure::new(
                    reader.id(),
                    FailureReason::Gap,
                    format!("next sample at tick {} while peers continue at tick {}", tick, target),
                )),
            }
        }

        if !failures.is_empty() {
            return self.fail_sync(failures);
        }
        if pending { SyncPass::Pending } else { SyncPass::Done }
    }

    fn fail_sync(&mut self, failures: Vec<SignalFailure>) -> SyncPass {
        for failure in &failures {
            warn!(%failure, "synchronization failed");
        }
        self.sync_status = SyncStatus::SynchronizationFailed;
        self.sync_failures = failures;
        SyncPass::Failed
    }

    /// Read `count` common-rate samples from every signal.
    ///
    /// Every signal's samples are checked before any reader advances, so a
    /// packet that cannot be decoded leaves all signals where they were.
    /// Returns the failures that stopped the read.
    fn read_common(
        &mut self,
        mut values: Option<&mut [&mut [V]]>,
        mut domain: Option<&mut [&mut [D]]>,
        count: usize,
    ) -> Result<Option<Vec<SignalFailure>>> {
        self.check_column_lengths(values.as_deref(), count)?;
        self.check_column_lengths(domain.as_deref(), count)?;

        let mut failures = Vec::new();
        for reader in &mut self.readers {
            let native = count * reader.divider();
            if let Err(e) = reader.check_decodable(native, values.is_some(), domain.is_some()) {
                let failure = SignalFailure::from_error(reader.id(), &e);
                reader.fail(failure.clone());
                failures.push(failure);
            }
        }
        if !failures.is_empty() {
            return Ok(Some(failures));
        }

        for (index, reader) in self.readers.iter_mut().enumerate() {
            let native = count * reader.divider();
            let value_column = values.as_deref_mut().map(|columns| &mut columns[index][..native]);
            let domain_column = domain.as_deref_mut().map(|columns| &mut columns[index][..native]);
            let failure = match reader.read_packets(value_column, domain_column, native) {
                Ok(read) if read == native => continue,
                Ok(read) => SignalFailure::new(
                    reader.id(),
                    FailureReason::InvalidState,
                    format!("read {read} of {native} samples"),
                ),
                Err(e) => SignalFailure::from_error(reader.id(), &e),
            };
            reader.fail(failure.clone());
            return Ok(Some(vec![failure]));
        }
        Ok(None)
    }
}

impl<V: Sample, D: Sample> fmt::Debug for MultiReader<V, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiReader")
            .field("readers", &self.readers)
            .field("sync_status", &self.sync_status)
            .field("common", &self.common)
            .field("start_timestamp", &self.start_timestamp)
            .finish()
    }
}
