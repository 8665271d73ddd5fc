//! Backoff strategies mapping `(base, max, attempt)` to a delay in `[0, max]`.
//!
//! Two call sites share these strategies: the retry loop spaces attempts on
//! one resource, and the circuit breaker grows a tripped resource's blackout
//! window. Attempt `0` is always accepted. Computations that would overflow a
//! signed 64-bit nanosecond count clamp to `max` instead of wrapping.
//!
//! ```rust
//! use std::time::Duration;
//! use failpool::Backoff;
//!
//! let backoff = Backoff::Exponential;
//! assert_eq!(
//!     backoff.delay(Duration::from_secs(2), Duration::from_secs(20), 3),
//!     Duration::from_secs(16),
//! );
//! assert_eq!(
//!     backoff.delay(Duration::from_secs(2), Duration::from_secs(20), 4),
//!     Duration::from_secs(20), // capped
//! );
//! ```

use rand::{rng, Rng};
use std::sync::Arc;
use std::time::Duration;

/// Signature for caller-supplied backoff functions. Must be pure and return a
/// delay in `[0, max]`.
pub type BackoffFn = dyn Fn(Duration, Duration, u32) -> Duration + Send + Sync;

/// Delay ceiling: the largest nanosecond count a signed 64-bit field holds.
const NANOS_CEILING: u64 = i64::MAX as u64;

/// Backoff strategy.
#[derive(Clone)]
pub enum Backoff {
    /// Always zero delay.
    None,
    /// `min(max, base * 2^attempt)`.
    Exponential,
    /// Uniform random in `[0, min(max, base * 2^attempt))`.
    ExponentialJittered,
    /// Random walk floored at `base`: with `span = base * 2^attempt - base`,
    /// uniform `r` in `[0, span)` gives `min(max, base + r)`; `base` itself
    /// (capped at `max`) when the span is empty.
    DecorrelatedJittered,
    /// Caller-supplied function under the same contract.
    Custom(Arc<BackoffFn>),
}

impl Backoff {
    /// Wrap a caller-supplied backoff function.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(Duration, Duration, u32) -> Duration + Send + Sync + 'static,
    {
        Backoff::Custom(Arc::new(f))
    }

    /// Delay for `attempt`, using the thread-local RNG for jittered variants.
    pub fn delay(&self, base: Duration, max: Duration, attempt: u32) -> Duration {
        self.delay_with_rng(base, max, attempt, &mut rng())
    }

    /// Delay for `attempt` with an injected RNG, for deterministic tests.
    pub fn delay_with_rng<R: Rng>(
        &self,
        base: Duration,
        max: Duration,
        attempt: u32,
        rng: &mut R,
    ) -> Duration {
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Exponential => {
                Duration::from_nanos(doubled_nanos(base, attempt).min(nanos(max)))
            }
            Backoff::ExponentialJittered => {
                let cap = doubled_nanos(base, attempt).min(nanos(max));
                if cap == 0 {
                    return Duration::ZERO;
                }
                Duration::from_nanos(rng.random_range(0..cap))
            }
            Backoff::DecorrelatedJittered => {
                let floor = nanos(base);
                let span = doubled_nanos(base, attempt).saturating_sub(floor);
                let picked = if span > 0 {
                    floor.saturating_add(rng.random_range(0..span))
                } else {
                    floor
                };
                Duration::from_nanos(picked.min(nanos(max)))
            }
            Backoff::Custom(f) => f(base, max, attempt),
        }
    }
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backoff::None => write!(f, "None"),
            Backoff::Exponential => write!(f, "Exponential"),
            Backoff::ExponentialJittered => write!(f, "ExponentialJittered"),
            Backoff::DecorrelatedJittered => write!(f, "DecorrelatedJittered"),
            Backoff::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}

/// `base * 2^attempt` in nanoseconds, saturating at the signed 64-bit ceiling.
fn doubled_nanos(base: Duration, attempt: u32) -> u64 {
    let base = base.as_nanos();
    if base == 0 {
        return 0;
    }
    if attempt >= 64 {
        return NANOS_CEILING;
    }
    let scaled = base.saturating_mul(1u128 << attempt);
    u64::try_from(scaled).unwrap_or(NANOS_CEILING).min(NANOS_CEILING)
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
