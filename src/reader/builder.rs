//! Builders assembling readers from signals or input ports

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use super::signal_reader::{SignalInfo, Transform};
use super::{BlockReader, MultiReader, ReaderConfig, StreamReader, TailReader};
use crate::connection::{InputPort, Notifier};
use crate::decoder::Sample;
use crate::executor::{self, TaskExecutor};
use crate::signal::Signal;
use crate::types::{Ratio, ReadMode, ReadTimeoutType, SampleType};
use crate::{ReaderError, Result};

/// Something a reader can read from.
///
/// Signals get a fresh input port owned by the reader; ports must already be
/// connected.
#[derive(Debug, Clone)]
pub enum ReaderSource {
    Signal(Signal),
    Port(InputPort),
}

impl From<Signal> for ReaderSource {
    fn from(signal: Signal) -> Self {
        ReaderSource::Signal(signal)
    }
}

impl From<&Signal> for ReaderSource {
    fn from(signal: &Signal) -> Self {
        ReaderSource::Signal(signal.clone())
    }
}

impl From<InputPort> for ReaderSource {
    fn from(port: InputPort) -> Self {
        ReaderSource::Port(port)
    }
}

impl From<&InputPort> for ReaderSource {
    fn from(port: &InputPort) -> Self {
        ReaderSource::Port(port.clone())
    }
}

impl ReaderSource {
    /// Connected input port for this source.
    fn resolve(&self, gap_checking: bool) -> Result<InputPort> {
        match self {
            ReaderSource::Signal(signal) => {
                let port = InputPort::new(format!("{}_reader", signal.id()));
                port.set_gap_checking(gap_checking);
                port.connect(signal)
                    .map_err(|e| ReaderError::create_failed(format!("cannot connect '{}': {}", signal.id(), e)))?;
                Ok(port)
            }
            ReaderSource::Port(port) if port.is_connected() => Ok(port.clone()),
            ReaderSource::Port(port) => {
                Err(ReaderError::create_failed(format!("input port '{}' is not connected", port.name())))
            }
        }
    }
}

/// Settings shared by every builder.
struct Common<V, D> {
    config: ReaderConfig,
    executor: Option<Arc<dyn TaskExecutor>>,
    value_transform: Option<Transform<V>>,
    domain_transform: Option<Transform<D>>,
    spent: bool,
}

impl<V, D> Default for Common<V, D> {
    fn default() -> Self {
        Self {
            config: ReaderConfig::default(),
            executor: None,
            value_transform: None,
            domain_transform: None,
            spent: false,
        }
    }
}

impl<V, D> Common<V, D> {
    /// Mark the builder used; a second build fails.
    fn take(&mut self) -> Result<()> {
        if self.spent {
            return Err(ReaderError::create_failed("builder was already used to build a reader"));
        }
        self.spent = true;
        Ok(())
    }

    fn executor(&self) -> Arc<dyn TaskExecutor> {
        self.executor.clone().unwrap_or_else(executor::inline)
    }

    fn info(&self, port: InputPort) -> SignalInfo<V, D> {
        let mut info = SignalInfo::new(port, self.config.read_mode);
        info.value_transform = self.value_transform.clone();
        info.domain_transform = self.domain_transform.clone();
        info
    }
}

macro_rules! common_setters {
    () => {
        /// Replace the whole configuration.
        pub fn config(&mut self, config: ReaderConfig) -> &mut Self {
            self.common.config = config;
            self
        }

        pub fn read_mode(&mut self, mode: ReadMode) -> &mut Self {
            self.common.config.read_mode = mode;
            self
        }

        pub fn skip_events(&mut self, skip: bool) -> &mut Self {
            self.common.config.skip_events = skip;
            self
        }

        pub fn timeout_type(&mut self, timeout_type: ReadTimeoutType) -> &mut Self {
            self.common.config.timeout_type = timeout_type;
            self
        }

        pub fn min_read_count(&mut self, count: usize) -> &mut Self {
            self.common.config.min_read_count = count;
            self
        }

        /// Gap detection on ports created for signals.
        pub fn gap_checking(&mut self, enabled: bool) -> &mut Self {
            self.common.config.gap_checking = enabled;
            self
        }

        /// Executor running data-available callbacks.
        pub fn executor(&mut self, executor: Arc<dyn TaskExecutor>) -> &mut Self {
            self.common.executor = Some(executor);
            self
        }

        /// Transformation applied to every decoded value buffer.
        pub fn value_transform(&mut self, transform: Transform<V>) -> &mut Self {
            self.common.value_transform = Some(transform);
            self
        }

        /// Transformation applied to every decoded domain buffer.
        pub fn domain_transform(&mut self, transform: Transform<D>) -> &mut Self {
            self.common.domain_transform = Some(transform);
            self
        }

        pub fn value_read_type(&self) -> SampleType {
            V::SAMPLE_TYPE
        }

        pub fn domain_read_type(&self) -> SampleType {
            D::SAMPLE_TYPE
        }

        pub fn current_config(&self) -> &ReaderConfig {
            &self.common.config
        }
    };
}

/// Builds a [`MultiReader`].
///
/// ```
/// use daq_reader::{MultiReaderBuilder, Signal};
///
/// let a = Signal::new("a", None, None);
/// let b = Signal::new("b", None, None);
/// // Signals without a domain cannot be synchronized.
/// let result = MultiReaderBuilder::<f64, i64>::new().add_signal(&a).add_signal(&b).build();
/// assert!(result.is_err());
/// ```
pub struct MultiReaderBuilder<V: Sample = f64, D: Sample = i64> {
    sources: Vec<ReaderSource>,
    common: Common<V, D>,
    _types: PhantomData<fn() -> (V, D)>,
}

impl<V: Sample, D: Sample> Default for MultiReaderBuilder<V, D> {
    fn default() -> Self {
        Self { sources: Vec::new(), common: Common::default(), _types: PhantomData }
    }
}

impl<V: Sample, D: Sample> MultiReaderBuilder<V, D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_signal(&mut self, signal: &Signal) -> &mut Self {
        self.sources.push(ReaderSource::from(signal));
        self
    }

    pub fn add_input_port(&mut self, port: &InputPort) -> &mut Self {
        self.sources.push(ReaderSource::from(port));
        self
    }

    pub fn add_source(&mut self, source: impl Into<ReaderSource>) -> &mut Self {
        self.sources.push(source.into());
        self
    }

    /// Common sample rate in common ticks, or [`AUTO_SAMPLE_RATE`](super::AUTO_SAMPLE_RATE).
    pub fn required_common_sample_rate(&mut self, rate: i64) -> &mut Self {
        self.common.config.required_common_sample_rate = rate;
        self
    }

    pub fn start_on_full_unit_of_domain(&mut self, enabled: bool) -> &mut Self {
        self.common.config.start_on_full_unit_of_domain = enabled;
        self
    }

    /// Largest tolerated start misalignment, in seconds.
    pub fn tick_offset_tolerance(&mut self, tolerance: Ratio) -> &mut Self {
        self.common.config.tick_offset_tolerance = Some(tolerance);
        self
    }

    common_setters!();

    pub fn build(&mut self) -> Result<MultiReader<V, D>> {
        self.common.take()?;
        if self.sources.is_empty() {
            return Err(ReaderError::create_failed("no signals or input ports were added"));
        }
        let config = self.common.config.clone();
        config.validate()?;

        let infos = self
            .sources
            .iter()
            .map(|source| source.resolve(config.gap_checking).map(|port| self.common.info(port)))
            .collect::<Result<Vec<_>>>()?;
        debug!(signals = infos.len(), "building multi reader");
        MultiReader::new(infos, config, Notifier::with_executor(self.common.executor()))
    }
}

macro_rules! single_builder {
    ($builder:ident, $reader:ident, $what:literal) => {
        #[doc = concat!("Builds a [`", stringify!($reader), "`] ", $what, ".")]
        pub struct $builder<V: Sample = f64, D: Sample = i64> {
            source: Option<ReaderSource>,
            common: Common<V, D>,
            _types: PhantomData<fn() -> (V, D)>,
        }

        impl<V: Sample, D: Sample> Default for $builder<V, D> {
            fn default() -> Self {
                Self { source: None, common: Common::default(), _types: PhantomData }
            }
        }

        impl<V: Sample, D: Sample> $builder<V, D> {
            pub fn new() -> Self {
                Self::default()
            }

            pub fn signal(&mut self, signal: &Signal) -> &mut Self {
                self.source = Some(ReaderSource::from(signal));
                self
            }

            pub fn input_port(&mut self, port: &InputPort) -> &mut Self {
                self.source = Some(ReaderSource::from(port));
                self
            }

            common_setters!();

            pub fn build(&mut self) -> Result<$reader<V, D>> {
                self.common.take()?;
                let source = self
                    .source
                    .as_ref()
                    .ok_or_else(|| ReaderError::create_failed("no signal or input port was set"))?;
                let config = self.common.config.clone();
                config.validate()?;
                let port = source.resolve(config.gap_checking)?;
                $reader::open(self.common.info(port), config, self.common.executor())
            }
        }
    };
}

single_builder!(StreamReaderBuilder, StreamReader, "reading one signal sample by sample");
single_builder!(BlockReaderBuilder, BlockReader, "reading one signal in blocks");
single_builder!(TailReaderBuilder, TailReader, "keeping the newest samples of one signal");

impl<V: Sample, D: Sample> BlockReaderBuilder<V, D> {
    pub fn block_size(&mut self, size: usize) -> &mut Self {
        self.common.config.block_size = size;
        self
    }

    pub fn overlap(&mut self, overlap: usize) -> &mut Self {
        self.common.config.overlap = overlap;
        self
    }
}

impl<V: Sample, D: Sample> TailReaderBuilder<V, D> {
    pub fn history_size(&mut self, size: usize) -> &mut Self {
        self.common.config.history_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::executor::InlineExecutor;
    use crate::test_utils::{send_ramp, test_signal};

    #[test]
    fn builder_is_single_use() {
        let signal = test_signal("ai0", 1);
        let mut builder = StreamReaderBuilder::<f64, i64>::new();
        builder.signal(&signal);
        assert!(builder.build().is_ok());
        assert!(matches!(builder.build(), Err(ReaderError::CreateFailed { .. })));
    }

    #[test]
    fn empty_multi_builder_fails() {
        let result = MultiReaderBuilder::<f64, i64>::new().build();
        assert!(matches!(result, Err(ReaderError::CreateFailed { .. })));
    }

    #[test]
    fn single_builder_needs_a_source() {
        let result = TailReaderBuilder::<f64, i64>::new().build();
        assert!(matches!(result, Err(ReaderError::CreateFailed { .. })));
    }

    #[test]
    fn unconnected_port_fails() {
        let port = InputPort::new("loose");
        let result = MultiReaderBuilder::<f64, i64>::new().add_input_port(&port).build();
        assert!(matches!(result, Err(ReaderError::CreateFailed { .. })));
    }

    #[test]
    fn signals_get_their_own_ports() {
        let a = test_signal("a", 1);
        let b = test_signal("b", 1);
        let _reader = MultiReaderBuilder::<f64, i64>::new().add_signal(&a).add_source(b.clone()).build().unwrap();
        assert_eq!(a.connection_count(), 1);
        assert_eq!(b.connection_count(), 1);
    }

    #[test]
    fn connected_ports_are_reused() {
        let signal = test_signal("ai0", 1);
        let port = InputPort::new("in");
        port.connect(&signal).unwrap();
        let reader = StreamReaderBuilder::<f64, i64>::new().input_port(&port).build().unwrap();
        assert_eq!(reader.port().name(), "in");
        assert_eq!(signal.connection_count(), 1);
    }

    #[test]
    fn read_types_follow_parameters() {
        let builder = MultiReaderBuilder::<i32, f64>::new();
        assert_eq!(builder.value_read_type(), SampleType::Int32);
        assert_eq!(builder.domain_read_type(), SampleType::Float64);
    }

    #[test]
    fn config_is_snapshotted_at_build() {
        let signal = test_signal("ai0", 1);
        let mut builder = BlockReaderBuilder::<f64, i64>::new();
        builder.signal(&signal).block_size(8).overlap(2);
        let reader = builder.build().unwrap();
        builder.block_size(16);
        assert_eq!((reader.block_size(), reader.overlap()), (8, 2));
    }

    #[test]
    fn transforms_reach_single_readers() {
        let signal = test_signal("ai0", 1);
        let mut reader = StreamReaderBuilder::<f64, i64>::new()
            .signal(&signal)
            .value_transform(Arc::new(|values: &mut [f64]| values.iter_mut().for_each(|v| *v *= 2.0)))
            .build()
            .unwrap();
        send_ramp(&signal, 0, 0, 3).unwrap();
        let mut values = [0.0; 3];
        reader.read(&mut values, 3, std::time::Duration::ZERO).unwrap();
        assert_eq!(values, [0.0, 2.0, 4.0]);
    }

    #[test]
    fn executor_runs_listener() {
        let signal = test_signal("ai0", 1);
        let reader = StreamReaderBuilder::<f64, i64>::new()
            .signal(&signal)
            .executor(Arc::new(InlineExecutor))
            .build()
            .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        reader.set_on_data_available(Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        send_ramp(&signal, 0, 0, 4).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
