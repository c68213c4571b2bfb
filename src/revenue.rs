//! Revenue split computation.
//!
//! On every `Pending -> Completed` transition the payment amount is divided
//! between the resource owner and the platform according to the basis-point
//! share captured on the record at creation time. The split is pure
//! arithmetic here; the ledger applies it to the owner's accumulator inside
//! the same critical section as the status transition, so it runs exactly
//! once per payment. A split is never rolled back: the payment buys the
//! right to access, not a refundable service guarantee.

use serde::{Deserialize, Serialize};

use crate::money::UsdAmount;

/// Basis points out of 10_000 owed to the resource owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RevenueShareBp(u16);

pub const BP_DENOMINATOR: u64 = 10_000;

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("Revenue share must be at most {BP_DENOMINATOR} basis points, got {0}")]
pub struct RevenueShareOutOfRange(u16);

impl RevenueShareBp {
    pub fn new(bp: u16) -> Result<Self, RevenueShareOutOfRange> {
        if u64::from(bp) > BP_DENOMINATOR {
            return Err(RevenueShareOutOfRange(bp));
        }
        Ok(Self(bp))
    }

    /// The conventional 85% publisher share.
    pub fn default_share() -> Self {
        Self(8_500)
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl<'de> Deserialize<'de> for RevenueShareBp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bp = u16::deserialize(deserializer)?;
        RevenueShareBp::new(bp).map_err(serde::de::Error::custom)
    }
}

/// Outcome of splitting one payment amount.
///
/// `publisher + platform == amount` holds exactly: the publisher share is
/// computed by integer floor division over micro-USD and the platform takes
/// the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RevenueSplit {
    pub publisher_share: UsdAmount,
    pub platform_share: UsdAmount,
}

impl RevenueSplit {
    pub fn of(amount: UsdAmount, share: RevenueShareBp) -> Self {
        let micros = u128::from(amount.as_micros());
        let publisher = micros * u128::from(share.as_u16()) / u128::from(BP_DENOMINATOR);
        let publisher = publisher as u64;
        RevenueSplit {
            publisher_share: UsdAmount::from_micros(publisher),
            platform_share: UsdAmount::from_micros(amount.as_micros() - publisher),
        }
    }
}
