//! Monotonic time points and deadline arithmetic.
//!
//! Every time-dependent piece of the firmware (bus timeouts, sensor cache
//! expiry, sensor watchdogs) works on [`Instant`] values handed in by a
//! [`TimeSource`](crate::app::ports::TimeSource), never on a global clock.
//! That keeps the state machines deterministic under test.

use core::ops::Add;
use core::time::Duration;

/// Microseconds since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(u64);

impl Instant {
    /// The boot instant.
    pub const ZERO: Self = Self(0);

    pub const fn from_micros(us: u64) -> Self {
        Self(us)
    }

    pub const fn from_millis(ms: u64) -> Self {
        Self(ms.saturating_mul(1_000))
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000))
    }

    pub const fn as_micros(self) -> u64 {
        self.0
    }

    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn saturating_duration_since(self, earlier: Instant) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }

    /// `true` once `self` lies strictly after `deadline`.
    pub fn is_past(self, deadline: Instant) -> bool {
        self.0 > deadline.0
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        let us = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Instant(self.0.saturating_add(us))
    }
}

/// `true` if an armed deadline has been passed. An unarmed deadline never expires.
pub fn deadline_passed(deadline: Option<Instant>, now: Instant) -> bool {
    deadline.is_some_and(|d| now.is_past(d))
}
