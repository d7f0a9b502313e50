/*! Millisecond clock types.

The stack never reads a clock itself: the caller passes the current
[Instant] to [Stack::poll](crate::iface::Stack::poll) and every timer is
stored as an absolute deadline. A [Duration] is a lifetime or an interval.

Both count milliseconds in a `u64`, which does not wrap within the
lifetime of any device, and all arithmetic saturates.
*/

use core::{fmt, ops};

/// A point in time, in milliseconds since an arbitrary epoch such as
/// system startup.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Instant {
    millis: u64,
}

impl Instant {
    pub const ZERO: Instant = Instant::from_millis(0);

    pub const fn from_millis(millis: u64) -> Instant {
        Instant { millis }
    }

    pub const fn from_secs(secs: u64) -> Instant {
        Instant::from_millis(secs * 1000)
    }

    pub const fn total_millis(&self) -> u64 {
        self.millis
    }

    /// Time elapsed from `earlier` to `self`; zero if `earlier` is in the
    /// future.
    pub const fn saturating_duration_since(&self, earlier: Instant) -> Duration {
        Duration::from_millis(self.millis.saturating_sub(earlier.millis))
    }
}

/// Lifetimes and intervals.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration {
    millis: u64,
}

impl Duration {
    pub const ZERO: Duration = Duration::from_millis(0);

    pub const fn from_millis(millis: u64) -> Duration {
        Duration { millis }
    }

    pub const fn from_secs(secs: u64) -> Duration {
        Duration::from_millis(secs * 1000)
    }

    /// Whole seconds, rounded down.
    pub const fn secs(&self) -> u64 {
        self.millis / 1000
    }

    pub const fn total_millis(&self) -> u64 {
        self.millis
    }
}

/// Seconds with millisecond precision, e.g. `5.674s`.
fn write_millis(f: &mut fmt::Formatter, millis: u64) -> fmt::Result {
    write!(f, "{}.{:03}s", millis / 1000, millis % 1000)
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_millis(f, self.millis)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_millis(f, self.millis)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Instant {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}.{:03}s", self.millis / 1000, self.millis % 1000);
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Duration {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}.{:03}s", self.millis / 1000, self.millis % 1000);
    }
}

impl ops::Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant::from_millis(self.millis.saturating_add(rhs.millis))
    }
}

impl ops::AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl ops::Sub<Duration> for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Duration {
        Duration::from_millis(self.millis.saturating_sub(rhs.millis))
    }
}
