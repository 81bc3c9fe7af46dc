//! Rational numbers for tick resolutions and tolerances

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ReaderError, Result};

/// Normalized fraction `numerator / denominator` with a positive denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRatio", into = "RawRatio")]
pub struct Ratio {
    numerator: i64,
    denominator: i64,
}

#[derive(Serialize, Deserialize)]
struct RawRatio {
    numerator: i64,
    denominator: i64,
}

impl TryFrom<RawRatio> for Ratio {
    type Error = ReaderError;

    fn try_from(raw: RawRatio) -> Result<Self> {
        Ratio::try_new(raw.numerator, raw.denominator)
    }
}

impl From<Ratio> for RawRatio {
    fn from(ratio: Ratio) -> Self {
        RawRatio { numerator: ratio.numerator, denominator: ratio.denominator }
    }
}

impl Ratio {
    /// Create a ratio, rejecting a zero denominator.
    pub fn try_new(numerator: i64, denominator: i64) -> Result<Self> {
        if denominator == 0 {
            return Err(ReaderError::invalid_parameter("ratio denominator is zero"));
        }
        let divisor = gcd(numerator, denominator).max(1);
        let sign = if denominator < 0 { -1 } else { 1 };
        Ok(Self { numerator: sign * numerator / divisor, denominator: sign * denominator / divisor })
    }

    /// Create a ratio from literals known to be valid.
    ///
    /// A zero denominator yields `0/1`.
    pub fn new(numerator: i64, denominator: i64) -> Self {
        Self::try_new(numerator, denominator).unwrap_or(Self { numerator: 0, denominator: 1 })
    }

    pub const fn integer(value: i64) -> Self {
        Self { numerator: value, denominator: 1 }
    }

    pub const fn numerator(&self) -> i64 {
        self.numerator
    }

    pub const fn denominator(&self) -> i64 {
        self.denominator
    }

    pub const fn is_zero(&self) -> bool {
        self.numerator == 0
    }

    pub const fn is_positive(&self) -> bool {
        self.numerator > 0
    }

    pub const fn is_integer(&self) -> bool {
        self.denominator == 1
    }

    pub fn to_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    pub fn reciprocal(&self) -> Result<Self> {
        Ratio::try_new(self.denominator, self.numerator)
    }

    pub fn checked_mul(&self, other: Ratio) -> Option<Self> {
        let numerator = (self.numerator as i128).checked_mul(other.numerator as i128)?;
        let denominator = (self.denominator as i128).checked_mul(other.denominator as i128)?;
        from_wide(numerator, denominator)
    }

    pub fn checked_div(&self, other: Ratio) -> Option<Self> {
        if other.numerator == 0 {
            return None;
        }
        let numerator = (self.numerator as i128).checked_mul(other.denominator as i128)?;
        let denominator = (self.denominator as i128).checked_mul(other.numerator as i128)?;
        from_wide(numerator, denominator)
    }

    /// Largest integer not greater than this ratio.
    pub fn floor(&self) -> i64 {
        self.numerator.div_euclid(self.denominator)
    }
}

fn from_wide(numerator: i128, denominator: i128) -> Option<Ratio> {
    let divisor = gcd_wide(numerator, denominator).max(1);
    let sign = if denominator < 0 { -1 } else { 1 };
    let numerator = i64::try_from(sign * numerator / divisor).ok()?;
    let denominator = i64::try_from(sign * denominator / divisor).ok()?;
    if denominator == 0 {
        return None;
    }
    Some(Ratio { numerator, denominator })
}

impl Default for Ratio {
    fn default() -> Self {
        Ratio::integer(0)
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Greatest common divisor (always non-negative).
pub fn gcd(a: i64, b: i64) -> i64 {
    gcd_wide(a as i128, b as i128) as i64
}

fn gcd_wide(mut a: i128, mut b: i128) -> i128 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Least common multiple of two positive integers, `None` on overflow.
pub fn checked_lcm(a: i64, b: i64) -> Option<i64> {
    if a == 0 || b == 0 {
        return Some(0);
    }
    (a / gcd(a, b)).checked_mul(b).map(i64::abs)
}
