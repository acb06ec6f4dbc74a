// Copyright 2026 the Afterglow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic timestamps in nanoseconds.
//!
//! [`Timestamp`] is an absolute point on the compositor's monotonic clock,
//! expressed in nanoseconds. The zero value is a sentinel for "not yet set":
//! every stage of a frame starts out unset and is filled in as the
//! corresponding signal arrives.
//!
//! [`Duration`] is a signed span in the same units. Signed arithmetic matters
//! here: an actual timestamp can land before its prediction, and the jank
//! classifier compares deltas in both directions.

use core::fmt;
use core::ops::{Add, Sub};

/// An absolute point in time, in nanoseconds on the monotonic clock.
///
/// Zero means "not yet set".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// The "not yet set" sentinel.
    pub const ZERO: Self = Self(0);

    /// Returns the raw nanosecond value.
    #[inline]
    #[must_use]
    pub const fn nanos(self) -> i64 {
        self.0
    }

    /// Creates a timestamp from a nanosecond value.
    #[inline]
    #[must_use]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Returns `true` when this timestamp holds a real value rather than the
    /// "not yet set" sentinel.
    #[inline]
    #[must_use]
    pub const fn is_set(self) -> bool {
        self.0 != 0
    }

    /// Checked addition of a duration.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, duration: Duration) -> Option<Self> {
        match self.0.checked_add(duration.0) {
            Some(t) => Some(Self(t)),
            None => None,
        }
    }

    /// Saturating subtraction of a duration, clamped at zero.
    #[inline]
    #[must_use]
    pub const fn saturating_sub(self, duration: Duration) -> Self {
        let v = self.0.saturating_sub(duration.0);
        Self(if v < 0 { 0 } else { v })
    }

    /// Returns the smaller of two timestamps, ignoring unset values.
    ///
    /// An unset side loses to a set side; two unset sides stay unset.
    #[must_use]
    pub const fn min_set(self, other: Self) -> Self {
        match (self.is_set(), other.is_set()) {
            (true, true) => {
                if self.0 <= other.0 {
                    self
                } else {
                    other
                }
            }
            (true, false) => self,
            (false, _) => other,
        }
    }
}

impl Add<Duration> for Timestamp {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Duration) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Self) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// A signed span of time in nanoseconds.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(pub i64);

impl Duration {
    /// A zero-length duration.
    pub const ZERO: Self = Self(0);

    /// Creates a duration from a nanosecond value.
    #[inline]
    #[must_use]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Creates a duration from a millisecond value.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis * 1_000_000)
    }

    /// Returns the raw nanosecond value.
    #[inline]
    #[must_use]
    pub const fn nanos(self) -> i64 {
        self.0
    }

    /// Returns the absolute value.
    #[inline]
    #[must_use]
    pub const fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// Returns this duration in fractional milliseconds, for dump rendering.
    #[inline]
    #[must_use]
    pub fn as_millis_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }
}

impl Add for Duration {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Duration {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Duration({})", self.0)
    }
}
