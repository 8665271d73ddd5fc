//! Per-resource metric records driving breaker and bulkhead decisions.
//!
//! One record exists per resource for the lifetime of the pool. All updates
//! are single atomic operations; readers may observe slightly stale values,
//! which is acceptable because the breaker and bulkhead predicates are
//! monotone and self-correct on the next read.

use crate::backoff::Backoff;
use crate::clock::Clock;
use crate::resource::{Resource, ResourceList};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Attempts past the failure threshold are clamped here before the blackout
/// backoff runs, bounding both the shift and the quarantine growth.
const MAX_BLACKOUT_ATTEMPT: u64 = 16;

/// Breaker and bulkhead tuning owned by the store.
#[derive(Debug, Clone)]
pub(crate) struct MetricConfig {
    pub(crate) breaker_enabled: bool,
    pub(crate) bulkhead_enabled: bool,
    pub(crate) failure_threshold: u64,
    pub(crate) active_threshold: u64,
    pub(crate) tripped_base_time: Duration,
    pub(crate) tripped_timeout_max: Duration,
    pub(crate) active_req_count_window: Duration,
    pub(crate) tripped_backoff: Backoff,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            breaker_enabled: false,
            bulkhead_enabled: false,
            failure_threshold: 0,
            active_threshold: 0,
            tripped_base_time: Duration::ZERO,
            tripped_timeout_max: Duration::ZERO,
            // keeps observed_active self-healing for picker comparisons even
            // when the bulkhead is off
            active_req_count_window: Duration::from_secs(1),
            tripped_backoff: Backoff::Exponential,
        }
    }
}

#[derive(Default)]
struct ResourceMetric {
    /// Contiguous failures since the last success.
    successive_fail_count: AtomicU64,
    /// In-flight attempts currently holding this resource.
    active_req_count: AtomicU64,
    /// Clock reading (nanos) of the most recent breakable failure.
    last_failed_at: AtomicU64,
    /// Clock reading (nanos) of the most recent active-count change.
    last_active_change_at: AtomicU64,
}

/// Store of per-resource metrics plus the breaker/bulkhead predicates.
pub struct ResourceMetrics {
    resources: ResourceList,
    records: Vec<ResourceMetric>,
    config: MetricConfig,
    clock: Arc<dyn Clock>,
}

impl ResourceMetrics {
    pub(crate) fn new(
        resources: ResourceList,
        config: MetricConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let records = (0..resources.len()).map(|_| ResourceMetric::default()).collect();
        Self { resources, records, config, clock }
    }

    pub(crate) fn resources(&self) -> &ResourceList {
        &self.resources
    }

    fn record(&self, resource: &Resource) -> Option<&ResourceMetric> {
        self.records.get(resource.index())
    }

    fn now_nanos(&self) -> u64 {
        u64::try_from(self.clock.now().as_nanos()).unwrap_or(u64::MAX)
    }

    pub(crate) fn record_success(&self, resource: &Resource) {
        if let Some(record) = self.record(resource) {
            record.successive_fail_count.store(0, Ordering::Release);
        }
    }

    pub(crate) fn record_failure(&self, resource: &Resource) {
        if let Some(record) = self.record(resource) {
            record.successive_fail_count.fetch_add(1, Ordering::AcqRel);
            record.last_failed_at.store(self.now_nanos(), Ordering::Release);
        }
    }

    pub(crate) fn inc_active(&self, resource: &Resource) {
        if let Some(record) = self.record(resource) {
            record.active_req_count.fetch_add(1, Ordering::AcqRel);
            record.last_active_change_at.store(self.now_nanos(), Ordering::Release);
        }
    }

    /// Decrement is a no-op at zero; the counter never wraps below zero.
    pub(crate) fn desc_active(&self, resource: &Resource) {
        if let Some(record) = self.record(resource) {
            let _ = record.active_req_count.fetch_update(
                Ordering::AcqRel,
                Ordering::Acquire,
                |count| count.checked_sub(1),
            );
            record.last_active_change_at.store(self.now_nanos(), Ordering::Release);
        }
    }

    /// Snapshot of the in-flight count, with the soft leak: a nonzero count
    /// untouched for longer than the active window is reset to zero. This
    /// protects against missed decrements elsewhere; paired inc/dec remains
    /// the contract.
    pub fn observed_active(&self, resource: &Resource) -> u64 {
        let Some(record) = self.record(resource) else {
            return 0;
        };
        let count = record.active_req_count.load(Ordering::Acquire);
        if count == 0 {
            return 0;
        }
        let last_change = record.last_active_change_at.load(Ordering::Acquire);
        let idle = self.now_nanos().saturating_sub(last_change);
        if Duration::from_nanos(idle) > self.config.active_req_count_window {
            record.active_req_count.store(0, Ordering::Release);
            return 0;
        }
        count
    }

    /// Snapshot of the successive-failure count.
    pub fn fail_count(&self, resource: &Resource) -> u64 {
        self.record(resource)
            .map(|record| record.successive_fail_count.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Blackout window for a given successive-failure count; zero below the
    /// threshold.
    fn blackout_period(&self, fails: u64) -> Duration {
        if fails < self.config.failure_threshold {
            return Duration::ZERO;
        }
        let attempt = (fails - self.config.failure_threshold).min(MAX_BLACKOUT_ATTEMPT) as u32;
        self.config.tripped_backoff.delay(
            self.config.tripped_base_time,
            self.config.tripped_timeout_max,
            attempt,
        )
    }

    /// Breaker predicate: true while the resource sits inside the blackout
    /// window that follows crossing the failure threshold. Each further
    /// failure extends the window through the tripped backoff; any success
    /// resets the count and the predicate with it.
    pub fn is_tripped(&self, resource: &Resource) -> bool {
        let Some(record) = self.record(resource) else {
            return false;
        };
        let blackout = self.blackout_period(self.fail_count(resource));
        if blackout.is_zero() {
            return false;
        }
        let last_failed = Duration::from_nanos(record.last_failed_at.load(Ordering::Acquire));
        self.clock.now() < last_failed.saturating_add(blackout)
    }

    pub(crate) fn is_eligible(&self, resource: &Resource) -> bool {
        if self.config.breaker_enabled && self.is_tripped(resource) {
            return false;
        }
        if self.config.bulkhead_enabled
            && self.observed_active(resource) >= self.config.active_threshold
        {
            return false;
        }
        true
    }

    /// Resources that pass the breaker and bulkhead filters, in pool order.
    pub(crate) fn available(&self) -> ResourceList {
        let mut eligible = ResourceList::with_capacity(self.resources.len());
        for resource in &self.resources {
            if self.is_eligible(resource) {
                eligible.push(resource.clone());
            }
        }
        eligible
    }
}

impl std::fmt::Debug for ResourceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMetrics")
            .field("resources", &self.resources.len())
            .field("config", &self.config)
            .finish()
    }
}
