//! Resource selection strategies.
//!
//! A picker chooses the next resource to try from the eligible list, given
//! the incumbent (if any) and live metrics. The default is
//! Power-of-Two-Choices; a round-robin-flavored random picker is provided as
//! the alternative.

use crate::metric::ResourceMetrics;
use crate::resource::{Resource, ResourceList};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Pluggable resource selection.
///
/// `eligible` is the list after breaker and bulkhead filtering, in pool
/// order. Returning `None` fails the call with
/// [`AllResourcesDown`](crate::FailPoolError::AllResourcesDown).
pub trait Picker: Send + Sync {
    fn pick(
        &self,
        metrics: &ResourceMetrics,
        current: Option<&Resource>,
        eligible: &ResourceList,
    ) -> Option<Resource>;
}

/// Power-of-Two-Choices picker.
///
/// Excludes the incumbent, samples two distinct candidates, and keeps the one
/// with the lower observed in-flight count. When the incumbent is the only
/// survivor it is returned again: retrying it beats failing the call outright.
#[derive(Debug)]
pub struct P2cPicker {
    rng: Mutex<StdRng>,
}

impl P2cPicker {
    pub fn new() -> Self {
        Self { rng: Mutex::new(StdRng::from_os_rng()) }
    }

    /// Seeded constructor for deterministic tests.
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

impl Default for P2cPicker {
    fn default() -> Self {
        Self::new()
    }
}

impl Picker for P2cPicker {
    fn pick(
        &self,
        metrics: &ResourceMetrics,
        current: Option<&Resource>,
        eligible: &ResourceList,
    ) -> Option<Resource> {
        let candidates: Vec<&Resource> =
            eligible.iter().filter(|r| Some(*r) != current).collect();

        match candidates.len() {
            0 => current.cloned(),
            1 => Some(candidates[0].clone()),
            len => {
                let (i1, i2) = if len == 2 {
                    (0, 1)
                } else {
                    let mut rng = self.rng.lock().unwrap();
                    let i1 = rng.random_range(0..len);
                    let delta = rng.random_range(1..len);
                    (i1, (i1 + delta) % len)
                };
                let first = candidates[i1];
                let second = candidates[i2];
                if metrics.observed_active(first) > metrics.observed_active(second) {
                    Some(second.clone())
                } else {
                    Some(first.clone())
                }
            }
        }
    }
}

/// Random picker with round-robin advance.
///
/// Picks uniformly when there is no incumbent in the eligible list, otherwise
/// steps to the next position after it.
#[derive(Debug)]
pub struct RandomPicker {
    rng: Mutex<StdRng>,
}

impl RandomPicker {
    pub fn new() -> Self {
        Self { rng: Mutex::new(StdRng::from_os_rng()) }
    }

    /// Seeded constructor for deterministic tests.
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

impl Default for RandomPicker {
    fn default() -> Self {
        Self::new()
    }
}

impl Picker for RandomPicker {
    fn pick(
        &self,
        _metrics: &ResourceMetrics,
        current: Option<&Resource>,
        eligible: &ResourceList,
    ) -> Option<Resource> {
        if eligible.is_empty() {
            return None;
        }
        let position = match current.and_then(|c| eligible.index_of(c)) {
            Some(index) => (index + 1) % eligible.len(),
            None => self.rng.lock().unwrap().random_range(0..eligible.len()),
        };
        eligible.get(position).cloned()
    }
}
