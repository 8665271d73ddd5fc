//! Time source abstraction for breaker and bulkhead windows.
//!
//! Blackout and soft-leak decisions compare timestamps taken from a [`Clock`]
//! rather than `Instant::now()` directly, so tests can drive millisecond-scale
//! windows deterministically.

use std::time::{Duration, Instant};

/// Thread-safe time source.
///
/// `now` returns the elapsed time since the implementer's epoch. Readings from
/// a single instance must be monotone non-decreasing; readings from different
/// instances are not comparable.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Elapsed time since this clock's epoch.
    fn now(&self) -> Duration;
}

/// Monotonic clock whose epoch is the moment it was created.
///
/// Clones share the epoch. Resets on process restart, which is fine here:
/// breaker state is not persisted across restarts.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}
