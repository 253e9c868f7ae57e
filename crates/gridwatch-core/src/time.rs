//! Wall-clock ticks.
//!
//! The durable schedule keys on a 64-bit count of 100-nanosecond units on
//! the UTC wall clock (Unix epoch). Everything that compares against the
//! schedule — `now`, check frequencies, stored execution times — uses the
//! same scale.

use std::ops::{Add, Sub};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// 100-nanosecond units per millisecond.
pub const TICKS_PER_MILLISECOND: u64 = 10_000;

/// 100-nanosecond units per second.
pub const TICKS_PER_SECOND: u64 = 10_000_000;

/// A UTC wall-clock instant in 100-ns units since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Ticks(pub u64);

impl Ticks {
    /// The current wall-clock time.
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::from_duration(elapsed)
    }

    /// A duration expressed in ticks.
    pub fn from_duration(d: Duration) -> Self {
        Ticks((d.as_nanos() / 100) as u64)
    }

    pub fn from_millis(ms: u64) -> Self {
        Ticks(ms * TICKS_PER_MILLISECOND)
    }

    pub fn as_millis(self) -> u64 {
        self.0 / TICKS_PER_MILLISECOND
    }

    pub fn saturating_sub(self, d: Duration) -> Self {
        Ticks(self.0.saturating_sub(Ticks::from_duration(d).0))
    }
}

impl Add<Duration> for Ticks {
    type Output = Ticks;

    fn add(self, rhs: Duration) -> Ticks {
        Ticks(self.0.saturating_add(Ticks::from_duration(rhs).0))
    }
}

impl Sub<Ticks> for Ticks {
    type Output = Duration;

    fn sub(self, rhs: Ticks) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(rhs.0) * 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(Ticks::from_millis(1).0, 10_000);
        assert_eq!(Ticks::from_duration(Duration::from_secs(1)).0, TICKS_PER_SECOND);
        assert_eq!(Ticks::from_millis(1500).as_millis(), 1500);
    }

    #[test]
    fn add_duration() {
        let t = Ticks::from_millis(1000);
        assert_eq!(t + Duration::from_secs(1), Ticks::from_millis(2000));
    }

    #[test]
    fn subtract_instants() {
        let a = Ticks::from_millis(5000);
        let b = Ticks::from_millis(2000);
        assert_eq!(a - b, Duration::from_secs(3));
        // Saturates rather than wrapping.
        assert_eq!(b - a, Duration::ZERO);
    }

    #[test]
    fn saturating_sub_duration() {
        let t = Ticks::from_millis(1000);
        assert_eq!(t.saturating_sub(Duration::from_millis(400)), Ticks::from_millis(600));
        assert_eq!(t.saturating_sub(Duration::from_secs(10)), Ticks(0));
    }

    #[test]
    fn now_is_monotone_enough() {
        let a = Ticks::now();
        let b = Ticks::now();
        assert!(b >= a);
    }
}
