//! Unix timestamps and the clock abstraction used for entitlement expiry.
//!
//! All lifecycle state (creation, completion, expiry) is tracked in whole
//! seconds since the Unix epoch. Components never read the system clock
//! directly; they go through a [`Clock`] so that expiry behaviour can be
//! tested against a simulated clock.

use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// A Unix timestamp in seconds, used for payment creation, completion and
/// entitlement expiry.
///
/// Serialized as a plain integer. Second granularity is sufficient for
/// entitlement windows, which are minutes long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixTimestamp(u64);

impl UnixTimestamp {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Seconds remaining until `deadline`, or `None` if it already passed.
    ///
    /// A deadline equal to now counts as passed: an entitlement whose
    /// `expires_at` is the current second is no longer granted.
    pub fn remaining_until(&self, deadline: UnixTimestamp) -> Option<u64> {
        if deadline > *self {
            Some(deadline.0 - self.0)
        } else {
            None
        }
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        UnixTimestamp(self.0.saturating_add(rhs))
    }
}

/// Source of the current time.
///
/// The gateway holds one `Clock` and threads `now` through the ledger and
/// resolver, so tests can drive expiry with [`ManualClock`].
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> UnixTimestamp;
}

/// Wall-clock time from [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UnixTimestamp {
        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        UnixTimestamp::from_secs(secs)
    }
}

/// A settable clock for tests that need to cross expiry boundaries.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn at(secs: u64) -> Self {
        Self(AtomicU64::new(secs))
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, secs: u64) {
        self.0.store(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> UnixTimestamp {
        UnixTimestamp::from_secs(self.0.load(Ordering::SeqCst))
    }
}
