// Copyright 2026 the Afterglow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Clock seam for prediction-retention bookkeeping.
//!
//! The token registry expires predictions by wall time, so it needs a clock —
//! but nothing else in the engine reads one, and the jank classifier must stay
//! a pure function of its inputs. [`Clock`] is the single injection point:
//! production wires in [`MonotonicClock`], tests drive a [`ManualClock`]
//! forward explicitly.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use crate::time::Timestamp;

/// Source of monotonic "now" timestamps.
pub trait Clock: Send + Sync {
    /// Returns the current monotonic time.
    fn now(&self) -> Timestamp;
}

/// A [`Clock`] backed by [`std::time::Instant`].
///
/// Timestamps are nanoseconds since the clock was created. The origin is
/// arbitrary; only differences are meaningful, which is all the retention
/// sweep needs.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose zero point is "now".
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        // Returning 1ns for an immediate call keeps the zero sentinel free.
        let nanos = i64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(i64::MAX);
        Timestamp(nanos.max(1))
    }
}

/// A [`Clock`] that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock reading the given time.
    #[must_use]
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(now.nanos()),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now: Timestamp) {
        self.now.store(now.nanos(), Ordering::Relaxed);
    }

    /// Advances the current time by `nanos`.
    pub fn advance(&self, nanos: i64) {
        self.now.fetch_add(nanos, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now.load(Ordering::Relaxed))
    }
}
