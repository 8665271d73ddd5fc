//! The dispatch-and-retry engine.
//!
//! [`FailPool`] owns the resource list, the metric store, and the policy
//! configuration. One call to [`execute`](FailPool::execute) runs a bounded
//! state machine: pick an eligible resource, attempt the operation up to the
//! per-resource retry budget with backoff between attempts, then repick, up
//! to the pick budget. Classification of each failure decides whether it
//! feeds the breaker, whether another attempt is allowed, or whether the
//! error is returned as-is.

use crate::backoff::Backoff;
use crate::classify::{network_error_classification, Classifier, ResponseClass};
use crate::clock::{Clock, MonotonicClock};
use crate::error::FailPoolError;
use crate::metric::{MetricConfig, ResourceMetrics};
use crate::picker::{P2cPicker, Picker};
use crate::resource::{Resource, ResourceList};
use crate::sleeper::{Sleeper, TokioSleeper};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fault-tolerant dispatcher over a pool of equivalent backend resources.
///
/// Construct with [`FailPool::builder`]; every policy is off until its
/// builder method enables it. The pool is a self-contained value: multiple
/// pools coexist with independent metric stores, and a pool can be cloned
/// cheaply (clones share metrics and configuration).
///
/// ```no_run
/// use std::time::Duration;
/// use failpool::{Backoff, FailPool, Resource};
///
/// #[tokio::main]
/// async fn main() {
///     let pool: FailPool<std::io::Error> =
///         FailPool::builder("search", ["10.0.0.1:9999", "10.0.0.2:9999"])
///             .retry(2, 1, Duration::from_millis(30), Duration::from_millis(200), Backoff::DecorrelatedJittered)
///             .circuit_breaker(5, Duration::from_millis(2), Duration::from_secs(1), Backoff::Exponential)
///             .bulkhead(10, Duration::from_secs(1))
///             .build();
///
///     let result = pool
///         .execute(|resource: &Resource| {
///             let addr = resource.address().to_string();
///             async move {
///                 // issue the request against `addr`
///                 let _ = addr;
///                 Ok::<_, std::io::Error>(())
///             }
///         })
///         .await;
///     let _ = result;
/// }
/// ```
pub struct FailPool<E> {
    name: String,
    metrics: Arc<ResourceMetrics>,
    picker: Arc<dyn Picker>,
    classifier: Classifier<E>,
    retry_enabled: bool,
    max_repick: u32,
    max_retry: u32,
    retry_base_interval: Duration,
    retry_max_interval: Duration,
    retry_backoff: Backoff,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> Clone for FailPool<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            metrics: self.metrics.clone(),
            picker: self.picker.clone(),
            classifier: self.classifier.clone(),
            retry_enabled: self.retry_enabled,
            max_repick: self.max_repick,
            max_retry: self.max_retry,
            retry_base_interval: self.retry_base_interval,
            retry_max_interval: self.retry_max_interval,
            retry_backoff: self.retry_backoff.clone(),
            sleeper: self.sleeper.clone(),
        }
    }
}

impl<E> std::fmt::Debug for FailPool<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailPool")
            .field("name", &self.name)
            .field("resources", &self.metrics.resources().len())
            .field("retry_enabled", &self.retry_enabled)
            .field("max_repick", &self.max_repick)
            .field("max_retry", &self.max_retry)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}

/// Snapshot of one resource's health, as reported by [`FailPool::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStats {
    pub address: String,
    /// Whether the resource currently passes the breaker and bulkhead filters.
    pub available: bool,
    pub active_requests: u64,
    pub successive_failures: u64,
}

impl<E> FailPool<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Start building a pool over the given backend addresses.
    ///
    /// Addresses keep their order; a resource's identity is its position in
    /// this list. `name` tags every log event the pool emits.
    pub fn builder<I, S>(name: impl Into<String>, addresses: I) -> FailPoolBuilder<E>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FailPoolBuilder::new(name, addresses)
    }

    /// The pool's human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full resource list in construction order.
    pub fn resources(&self) -> &ResourceList {
        self.metrics.resources()
    }

    /// Dispatch `operation` against the pool.
    ///
    /// The operation receives the chosen resource and is invoked up to
    /// `(max_repick + 1) * (max_retry + 1)` times in total. Returns the
    /// operation's value on the first success, the operation's error verbatim
    /// when classification ends the call, or one of the two pool sentinels.
    ///
    /// Resources needed inside the returned future must be cloned out of the
    /// `&Resource` argument before the `async move` block.
    pub async fn execute<T, Fut, Op>(&self, mut operation: Op) -> Result<T, FailPoolError<E>>
    where
        T: Send,
        Fut: Future<Output = Result<T, E>> + Send,
        Op: FnMut(&Resource) -> Fut + Send,
    {
        let mut repick_count: u32 = 0;
        let mut current: Option<Resource> = None;

        while repick_count <= self.max_repick {
            repick_count += 1;

            let eligible = self.metrics.available();
            current = self.picker.pick(&self.metrics, current.as_ref(), &eligible);
            let Some(resource) = current.clone() else {
                tracing::error!(pool = %self.name, pick = repick_count, "all resources down");
                return Err(FailPoolError::AllResourcesDown);
            };

            let _guard = ActiveGuard::new(&self.metrics, &resource);
            let mut retry_count: u32 = 0;
            while retry_count <= self.max_retry {
                retry_count += 1;
                let started = Instant::now();
                match operation(&resource).await {
                    Ok(value) => {
                        self.metrics.record_success(&resource);
                        tracing::debug!(
                            pool = %self.name,
                            resource = %resource.address(),
                            elapsed_us = started.elapsed().as_micros() as u64,
                            "attempt succeeded"
                        );
                        return Ok(value);
                    }
                    Err(err) => {
                        let class = (self.classifier)(&err);
                        tracing::warn!(
                            pool = %self.name,
                            resource = %resource.address(),
                            pick = repick_count,
                            attempt = retry_count,
                            class = ?class,
                            elapsed_us = started.elapsed().as_micros() as u64,
                            error = %err,
                            "attempt failed"
                        );
                        if class.is_breakable() {
                            self.metrics.record_failure(&resource);
                        }
                        if !self.retry_enabled || !class.is_retriable() {
                            return Err(FailPoolError::Inner(err));
                        }
                        let delay = self.retry_backoff.delay(
                            self.retry_base_interval,
                            self.retry_max_interval,
                            retry_count,
                        );
                        if !delay.is_zero() {
                            self.sleeper.sleep(delay).await;
                        }
                    }
                }
            }
            // retry budget exhausted on this resource; the guard releases it
            // and the outer loop repicks immediately
        }

        Err(FailPoolError::MaxRetry)
    }

    /// Health snapshot of every resource, in pool order.
    pub fn stats(&self) -> Vec<ResourceStats> {
        self.metrics
            .resources()
            .iter()
            .map(|resource| ResourceStats {
                address: resource.address().to_string(),
                available: self.metrics.is_eligible(resource),
                active_requests: self.metrics.observed_active(resource),
                successive_failures: self.metrics.fail_count(resource),
            })
            .collect()
    }

    /// Emit one info event per resource with its JSON-encoded stats record.
    /// The caller owns the cadence; nothing is spawned.
    pub fn log_stats(&self) {
        for stats in self.stats() {
            if let Ok(status) = serde_json::to_string(&stats) {
                tracing::info!(pool = %self.name, status = %status, "resource status");
            }
        }
    }
}

/// Scoped active-count acquisition: increments on creation, decrements on
/// drop, so the release fires on every exit path.
struct ActiveGuard<'a> {
    metrics: &'a ResourceMetrics,
    resource: &'a Resource,
}

impl<'a> ActiveGuard<'a> {
    fn new(metrics: &'a ResourceMetrics, resource: &'a Resource) -> Self {
        metrics.inc_active(resource);
        Self { metrics, resource }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.metrics.desc_active(self.resource);
    }
}

/// Builder for [`FailPool`]. All three policies start disabled.
pub struct FailPoolBuilder<E> {
    name: String,
    resources: ResourceList,
    metric_config: MetricConfig,
    retry_enabled: bool,
    max_repick: u32,
    max_retry: u32,
    retry_base_interval: Duration,
    retry_max_interval: Duration,
    retry_backoff: Backoff,
    classifier: Classifier<E>,
    picker: Arc<dyn Picker>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> FailPoolBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn new<I, S>(name: impl Into<String>, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            resources: ResourceList::from_addresses(addresses),
            metric_config: MetricConfig::default(),
            retry_enabled: false,
            max_repick: 0,
            max_retry: 0,
            retry_base_interval: Duration::ZERO,
            retry_max_interval: Duration::ZERO,
            retry_backoff: Backoff::DecorrelatedJittered,
            classifier: Arc::new(|err: &E| network_error_classification(err)),
            picker: Arc::new(P2cPicker::new()),
            clock: Arc::new(MonotonicClock::new()),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Enable the circuit breaker: after `failure_threshold` successive
    /// breakable failures a resource is excluded for a blackout window that
    /// starts at `tripped_base_time` and grows through `tripped_backoff` with
    /// each further failure, capped at `tripped_timeout_max`.
    pub fn circuit_breaker(
        mut self,
        failure_threshold: u64,
        tripped_base_time: Duration,
        tripped_timeout_max: Duration,
        tripped_backoff: Backoff,
    ) -> Self {
        self.metric_config.breaker_enabled = true;
        self.metric_config.failure_threshold = failure_threshold;
        self.metric_config.tripped_base_time = tripped_base_time;
        self.metric_config.tripped_timeout_max = tripped_timeout_max;
        self.metric_config.tripped_backoff = tripped_backoff;
        self
    }

    /// Enable the bulkhead: a resource whose observed in-flight count is at
    /// or above `active_threshold` is excluded at pick time. A nonzero count
    /// untouched for longer than `active_req_count_window` is no longer
    /// trusted and resets to zero.
    pub fn bulkhead(mut self, active_threshold: u64, active_req_count_window: Duration) -> Self {
        self.metric_config.bulkhead_enabled = true;
        self.metric_config.active_threshold = active_threshold;
        self.metric_config.active_req_count_window = active_req_count_window;
        self
    }

    /// Enable retry: up to `max_retry_per_resource` retries on the picked
    /// resource (spaced by `retry_backoff` over the base/max interval), then
    /// up to `max_repick` further picks. Without this option every error ends
    /// the call after a single attempt.
    pub fn retry(
        mut self,
        max_repick: u32,
        max_retry_per_resource: u32,
        retry_base_interval: Duration,
        retry_max_interval: Duration,
        retry_backoff: Backoff,
    ) -> Self {
        self.retry_enabled = true;
        self.max_repick = max_repick;
        self.max_retry = max_retry_per_resource;
        self.retry_base_interval = retry_base_interval;
        self.retry_max_interval = retry_max_interval;
        self.retry_backoff = retry_backoff;
        self
    }

    /// Replace the default network-error classifier.
    pub fn classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&E) -> ResponseClass + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Replace the default Power-of-Two-Choices picker.
    pub fn picker<P>(mut self, picker: P) -> Self
    where
        P: Picker + 'static,
    {
        self.picker = Arc::new(picker);
        self
    }

    /// Override the time source for breaker and bulkhead windows.
    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Override how backoff delays are waited out.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn build(self) -> FailPool<E> {
        let metrics =
            Arc::new(ResourceMetrics::new(self.resources, self.metric_config, self.clock));
        FailPool {
            name: self.name,
            metrics,
            picker: self.picker,
            classifier: self.classifier,
            retry_enabled: self.retry_enabled,
            max_repick: self.max_repick,
            max_retry: self.max_retry,
            retry_base_interval: self.retry_base_interval,
            retry_max_interval: self.retry_max_interval,
            retry_backoff: self.retry_backoff,
            sleeper: self.sleeper,
        }
    }
}
