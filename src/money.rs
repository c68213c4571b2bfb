//! Fixed-point USD amounts.
//!
//! Payment amounts are stored as integer micro-USD (`1 USD == 1_000_000`
//! units) so that revenue splits and accumulator sums are exact. Amounts are
//! parsed from human-readable strings like `"0.001"` or `"$0.01"` via
//! [`rust_decimal`], and serialized back as normalized decimal strings to
//! keep floats out of the wire format entirely.

use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Micro-USD per whole USD.
pub const MICROS_PER_USD: u64 = 1_000_000;

/// Maximum number of decimal places an amount may carry.
pub const MAX_SCALE: u32 = 6;

mod bounds {
    use super::*;

    pub const MAX_STR: &str = "999999999";

    /// The maximum in micro-USD. Fits comfortably in `i64`, which keeps the
    /// `Decimal` rendering in [`UsdAmount::to_decimal`] sound.
    pub const MAX_MICROS: u64 = 999_999_999 * MICROS_PER_USD;

    pub static MAX: Lazy<Decimal> = Lazy::new(|| Decimal::from_str(MAX_STR).expect("valid decimal"));
    pub static SYMBOLS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\d.\-]+").expect("valid regex"));
}

/// A non-negative USD amount in integer micro-USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct UsdAmount(u64);

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum UsdAmountError {
    #[error("Invalid number format")]
    InvalidFormat,
    #[error("Amount must not exceed {}", bounds::MAX_STR)]
    OutOfRange,
    #[error("Negative value is not allowed")]
    Negative,
    #[error("At most {MAX_SCALE} decimal places are supported, got {0}")]
    TooPrecise(u32),
}

impl UsdAmount {
    pub const ZERO: UsdAmount = UsdAmount(0);

    /// Builds an amount from integer micro-USD, saturating at the
    /// representable maximum (parsing enforces the same bound).
    pub fn from_micros(micros: u64) -> Self {
        Self(micros.min(bounds::MAX_MICROS))
    }

    pub fn as_micros(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Sums two amounts, saturating at the representable maximum.
    ///
    /// Accumulator totals only ever grow; saturation keeps the monotonicity
    /// invariant even in pathological overflow cases.
    pub fn saturating_add(&self, other: UsdAmount) -> UsdAmount {
        UsdAmount::from_micros(self.0.saturating_add(other.0))
    }

    /// Parses a human-readable amount like `"0.001"`, `"$0.01"` or `"1,000"`.
    pub fn parse(input: &str) -> Result<Self, UsdAmountError> {
        // Strip currency symbols and grouping separators, keep digits, dot, minus.
        let cleaned = bounds::SYMBOLS.replace_all(input, "").to_string();
        let decimal = Decimal::from_str(&cleaned).map_err(|_| UsdAmountError::InvalidFormat)?;
        Self::try_from(decimal)
    }

    fn to_decimal(self) -> Decimal {
        Decimal::new(self.0 as i64, MAX_SCALE).normalize()
    }
}

impl TryFrom<Decimal> for UsdAmount {
    type Error = UsdAmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(UsdAmountError::Negative);
        }
        let normalized = value.normalize();
        if normalized.scale() > MAX_SCALE {
            return Err(UsdAmountError::TooPrecise(normalized.scale()));
        }
        if normalized > *bounds::MAX {
            return Err(UsdAmountError::OutOfRange);
        }
        let micros = normalized
            .checked_mul(Decimal::from(MICROS_PER_USD))
            .and_then(|scaled| scaled.to_u64())
            .ok_or(UsdAmountError::OutOfRange)?;
        Ok(UsdAmount(micros))
    }
}

impl FromStr for UsdAmount {
    type Err = UsdAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UsdAmount::parse(s)
    }
}

impl Display for UsdAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl Serialize for UsdAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for UsdAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        UsdAmount::parse(&s).map_err(serde::de::Error::custom)
    }
}
