//! Tick-domain arithmetic for synchronized reading.
//!
//! Every signal counts time in its own ticks: an integer domain advancing by a
//! linear delta, a tick resolution in seconds and an origin. Synchronizing
//! signals needs one shared unit. The common resolution is the rational GCD of
//! all resolutions, so every native tick maps to an integer number of common
//! ticks, and the common epoch is the earliest origin.
//!
//! The common sample rate is expressed as a period in common ticks: the LCM
//! of every signal's delta (or a caller-required value every delta divides).
//! A signal's divider is the number of its native samples per common-rate
//! sample.

use chrono::{DateTime, Duration, Utc};

use crate::types::{DataDescriptor, Ratio, checked_lcm, gcd};
use crate::{ReaderError, Result};

use super::config::AUTO_SAMPLE_RATE;

const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// Domain parameters of one signal, taken from its domain descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDomain {
    pub signal_id: String,
    /// Native ticks per sample
    pub delta: i64,
    /// Seconds per native tick
    pub resolution: Ratio,
    pub epoch: DateTime<Utc>,
}

impl SignalDomain {
    pub fn from_descriptor(signal_id: &str, descriptor: &DataDescriptor) -> Result<Self> {
        let Some((delta, _)) = descriptor.rule.linear_parameters() else {
            return Err(ReaderError::incompatible_rates(format!(
                "domain of '{}' has no linear rule",
                signal_id
            )));
        };
        if !descriptor.sample_type.is_integer() || !delta.is_int() {
            return Err(ReaderError::incompatible_rates(format!(
                "domain of '{}' does not count integer ticks",
                signal_id
            )));
        }
        let delta = delta.as_i64();
        if delta <= 0 {
            return Err(ReaderError::incompatible_rates(format!(
                "domain of '{}' has non-positive delta {}",
                signal_id, delta
            )));
        }
        let resolution = descriptor.tick_resolution.ok_or_else(|| {
            ReaderError::invalid_parameter(format!("domain of '{}' has no tick resolution", signal_id))
        })?;
        let epoch = parse_origin(descriptor.origin.as_deref())?;

        Ok(Self { signal_id: signal_id.to_string(), delta, resolution, epoch })
    }
}

/// Parse an RFC 3339 origin; a missing origin is the Unix epoch.
pub fn parse_origin(origin: Option<&str>) -> Result<DateTime<Utc>> {
    match origin {
        None => Ok(DateTime::<Utc>::default()),
        Some(text) => DateTime::parse_from_rfc3339(text)
            .map(|time| time.with_timezone(&Utc))
            .map_err(|e| ReaderError::invalid_parameter(format!("invalid domain origin '{}': {}", text, e))),
    }
}

/// Conversion from one signal's native ticks to common ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickMapping {
    /// Common ticks per native tick
    pub factor: i64,
    /// Common ticks between the common epoch and the signal's origin
    pub epoch_offset: i64,
    /// Common ticks per native sample
    pub delta: i64,
    /// Native samples per common-rate sample
    pub divider: usize,
}

impl TickMapping {
    /// Mapping of a signal read on its own.
    pub fn native(delta: i64) -> Self {
        Self { factor: 1, epoch_offset: 0, delta, divider: 1 }
    }

    pub fn to_common(&self, native_tick: i64) -> Option<i64> {
        native_tick.checked_mul(self.factor)?.checked_add(self.epoch_offset)
    }
}

/// Shared tick unit and sample rate of a group of signals.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonDomain {
    /// Seconds per common tick
    pub resolution: Ratio,
    pub epoch: DateTime<Utc>,
    /// Common ticks per common-rate sample
    pub sample_rate: i64,
    /// Per-signal mappings, in input order
    pub mappings: Vec<TickMapping>,
}

impl CommonDomain {
    /// Derive the common domain of `domains`.
    ///
    /// `required_rate` is either [`AUTO_SAMPLE_RATE`] or a period in common
    /// ticks that every signal's delta must divide.
    pub fn compute(domains: &[SignalDomain], required_rate: i64) -> Result<Self> {
        let (first, rest) = domains
            .split_first()
            .ok_or_else(|| ReaderError::invalid_parameter("no signal domains to synchronize"))?;

        let mut numerator = first.resolution.numerator();
        let mut denominator = first.resolution.denominator();
        let mut epoch = first.epoch;
        for domain in rest {
            numerator = gcd(numerator, domain.resolution.numerator());
            denominator = checked_lcm(denominator, domain.resolution.denominator())
                .ok_or_else(|| ReaderError::overflow("common tick resolution"))?;
            epoch = epoch.min(domain.epoch);
        }
        let resolution = Ratio::try_new(numerator, denominator)?;

        let mut mappings = Vec::with_capacity(domains.len());
        for domain in domains {
            let factor = domain
                .resolution
                .checked_div(resolution)
                .filter(Ratio::is_integer)
                .map(|factor| factor.numerator())
                .ok_or_else(|| ReaderError::overflow(format!("tick factor of '{}'", domain.signal_id)))?;
            let epoch_offset = ticks_between(epoch, domain.epoch, resolution)
                .ok_or_else(|| ReaderError::overflow(format!("epoch offset of '{}'", domain.signal_id)))?;
            let delta = domain
                .delta
                .checked_mul(factor)
                .ok_or_else(|| ReaderError::overflow(format!("delta of '{}'", domain.signal_id)))?;
            mappings.push(TickMapping { factor, epoch_offset, delta, divider: 1 });
        }

        let sample_rate = if required_rate == AUTO_SAMPLE_RATE {
            mappings.iter().try_fold(1i64, |rate, mapping| checked_lcm(rate, mapping.delta)).ok_or_else(|| {
                ReaderError::overflow(format!("least common multiple of {} sample-rate deltas", mappings.len()))
            })?
        } else {
            required_rate
        };
        if sample_rate <= 0 {
            return Err(ReaderError::incompatible_rates(format!("common sample rate {} is not positive", sample_rate)));
        }

        for (mapping, domain) in mappings.iter_mut().zip(domains) {
            if sample_rate % mapping.delta != 0 {
                return Err(ReaderError::incompatible_rates(format!(
                    "common sample rate {} is not a multiple of delta {} of '{}'",
                    sample_rate, mapping.delta, domain.signal_id
                )));
            }
            mapping.divider = usize::try_from(sample_rate / mapping.delta)
                .map_err(|_| ReaderError::overflow(format!("divider of '{}'", domain.signal_id)))?;
        }

        Ok(Self { resolution, epoch, sample_rate, mappings })
    }

    /// Tolerance in whole common ticks.
    pub fn tolerance_ticks(&self, tolerance: Ratio) -> Result<i64> {
        tolerance
            .checked_div(self.resolution)
            .map(|ticks| ticks.floor())
            .ok_or_else(|| ReaderError::overflow("tick offset tolerance"))
    }

    /// Common ticks per second, if that is a whole number.
    pub fn ticks_per_second(&self) -> Option<i64> {
        Ratio::integer(1).checked_div(self.resolution).filter(Ratio::is_integer).map(|r| r.numerator())
    }

    /// Smallest whole-second tick not before `tick`.
    pub fn round_up_to_second(&self, tick: i64) -> Option<i64> {
        let unit = self.ticks_per_second()?;
        let rounded = tick.checked_add(unit - 1)?.div_euclid(unit);
        rounded.checked_mul(unit)
    }

    /// Absolute time of a common tick.
    pub fn timestamp(&self, tick: i64) -> Option<DateTime<Utc>> {
        let nanos = (tick as i128)
            .checked_mul(self.resolution.numerator() as i128)?
            .checked_mul(NANOS_PER_SECOND)?
            .div_euclid(self.resolution.denominator() as i128);
        self.epoch.checked_add_signed(Duration::nanoseconds(i64::try_from(nanos).ok()?))
    }
}

/// Whole ticks of `resolution` from `from` to `to`.
fn ticks_between(from: DateTime<Utc>, to: DateTime<Utc>, resolution: Ratio) -> Option<i64> {
    let nanos = (to - from).num_nanoseconds()? as i128;
    let ticks = nanos
        .checked_mul(resolution.denominator() as i128)?
        .div_euclid((resolution.numerator() as i128).checked_mul(NANOS_PER_SECOND)?);
    i64::try_from(ticks).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataRule, SampleType};

    fn domain(id: &str, delta: i64, resolution: Ratio, origin: Option<&str>) -> SignalDomain {
        SignalDomain {
            signal_id: id.to_string(),
            delta,
            resolution,
            epoch: parse_origin(origin).unwrap(),
        }
    }

    fn ms(id: &str, delta: i64) -> SignalDomain {
        domain(id, delta, Ratio::new(1, 1000), None)
    }

    #[test]
    fn lcm_of_deltas_and_dividers() {
        let common = CommonDomain::compute(&[ms("a", 100), ms("b", 200), ms("c", 500)], AUTO_SAMPLE_RATE).unwrap();
        assert_eq!(common.sample_rate, 1000);
        let dividers: Vec<usize> = common.mappings.iter().map(|m| m.divider).collect();
        assert_eq!(dividers, vec![10, 5, 2]);
        // 100 common-rate samples in native samples
        let consumed: Vec<usize> = dividers.iter().map(|d| 100 * d).collect();
        assert_eq!(consumed, vec![1000, 500, 200]);
    }

    #[test]
    fn required_rate_must_be_multiple_of_every_delta() {
        let domains = [ms("a", 100), ms("b", 300)];
        let error = CommonDomain::compute(&domains, 1000).unwrap_err();
        assert!(matches!(error, ReaderError::IncompatibleSampleRates { ref details } if details.contains("'b'")));

        let common = CommonDomain::compute(&domains, 600).unwrap();
        assert_eq!(common.sample_rate, 600);
        assert_eq!(common.mappings[0].divider, 6);
        assert_eq!(common.mappings[1].divider, 2);
    }

    #[test]
    fn mixed_resolutions_share_finest_unit() {
        let domains = [
            domain("ms", 1, Ratio::new(1, 1000), None),
            domain("us", 250, Ratio::new(1, 1_000_000), None),
        ];
        let common = CommonDomain::compute(&domains, AUTO_SAMPLE_RATE).unwrap();
        assert_eq!(common.resolution, Ratio::new(1, 1_000_000));
        assert_eq!(common.mappings[0].factor, 1000);
        assert_eq!(common.mappings[0].delta, 1000);
        assert_eq!(common.mappings[1].factor, 1);
        assert_eq!(common.sample_rate, 1000);
        assert_eq!(common.mappings[1].divider, 4);
    }

    #[test]
    fn later_origin_offsets_ticks() {
        let domains = [
            domain("a", 1, Ratio::new(1, 1000), Some("2024-01-01T00:00:00Z")),
            domain("b", 1, Ratio::new(1, 1000), Some("2024-01-01T00:00:02Z")),
        ];
        let common = CommonDomain::compute(&domains, AUTO_SAMPLE_RATE).unwrap();
        assert_eq!(common.mappings[0].epoch_offset, 0);
        assert_eq!(common.mappings[1].epoch_offset, 2000);
        assert_eq!(common.mappings[1].to_common(5), Some(2005));
    }

    #[test]
    fn lcm_overflow_is_rejected() {
        let domains = [ms("a", 4_294_967_291), ms("b", 4_294_967_279), ms("c", 4_294_967_231)];
        let error = CommonDomain::compute(&domains, AUTO_SAMPLE_RATE).unwrap_err();
        assert!(matches!(error, ReaderError::ArithmeticOverflow { .. }));
    }

    #[test]
    fn timestamp_and_rounding() {
        let domains = [domain("a", 10, Ratio::new(1, 1000), Some("2024-01-01T00:00:00Z"))];
        let common = CommonDomain::compute(&domains, AUTO_SAMPLE_RATE).unwrap();
        assert_eq!(common.ticks_per_second(), Some(1000));
        assert_eq!(common.round_up_to_second(1), Some(1000));
        assert_eq!(common.round_up_to_second(2000), Some(2000));
        let stamp = common.timestamp(1500).unwrap();
        assert_eq!(stamp, parse_origin(Some("2024-01-01T00:00:01.5Z")).unwrap());
    }

    #[test]
    fn tolerance_in_common_ticks() {
        let common = CommonDomain::compute(&[ms("a", 1)], AUTO_SAMPLE_RATE).unwrap();
        assert_eq!(common.tolerance_ticks(Ratio::new(1, 100)).unwrap(), 10);
        assert_eq!(common.tolerance_ticks(Ratio::new(1, 3000)).unwrap(), 0);
    }

    #[test]
    fn descriptor_must_be_linear_integer_domain() {
        let explicit = DataDescriptor::builder(SampleType::Int64).tick_resolution(Ratio::new(1, 1000)).build().unwrap();
        assert!(SignalDomain::from_descriptor("a", &explicit).is_err());

        let float = DataDescriptor::builder(SampleType::Float64)
            .rule(DataRule::linear(0.001, 0.0))
            .tick_resolution(Ratio::new(1, 1))
            .build()
            .unwrap();
        assert!(matches!(
            SignalDomain::from_descriptor("a", &float),
            Err(ReaderError::IncompatibleSampleRates { .. })
        ));

        let missing_resolution =
            DataDescriptor::builder(SampleType::Int64).rule(DataRule::linear(1i64, 0i64)).build().unwrap();
        assert!(matches!(
            SignalDomain::from_descriptor("a", &missing_resolution),
            Err(ReaderError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn invalid_origin_is_rejected() {
        assert!(parse_origin(Some("yesterday")).is_err());
        assert_eq!(parse_origin(None).unwrap().timestamp(), 0);
    }
}
