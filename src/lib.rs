#![forbid(unsafe_code)]

//! # failpool
//!
//! Client-side fault tolerance for a pool of equivalent backend replicas:
//! **retry** (in place and by switching resources), **bulkhead** (per-resource
//! concurrency ceiling), and **circuit breaker** (temporal eviction on
//! successive failures), coordinated by a pluggable resource picker
//! (Power-of-Two-Choices by default).
//!
//! You supply the transport: the pool hands your async operation a
//! [`Resource`] (a stable index plus the address you registered) and turns
//! one call into a bounded sequence of attempts across the pool, classifying
//! each failure to decide whether it trips the breaker, permits a retry, or
//! ends the call.
//!
//! ```no_run
//! use std::time::Duration;
//! use failpool::{Backoff, FailPool, Resource};
//!
//! #[tokio::main]
//! async fn main() {
//!     let pool: FailPool<std::io::Error> =
//!         FailPool::builder("kv", ["10.0.0.1:9999", "10.0.0.2:9999"])
//!             .retry(
//!                 2,
//!                 1,
//!                 Duration::from_millis(30),
//!                 Duration::from_millis(200),
//!                 Backoff::DecorrelatedJittered,
//!             )
//!             .circuit_breaker(
//!                 5,
//!                 Duration::from_millis(2),
//!                 Duration::from_secs(1),
//!                 Backoff::Exponential,
//!             )
//!             .bulkhead(10, Duration::from_secs(1))
//!             .build();
//!
//!     let reply = pool
//!         .execute(|resource: &Resource| {
//!             let addr = resource.address().to_string();
//!             async move {
//!                 // connect to `addr`, send the request, read the reply
//!                 let _ = addr;
//!                 Ok::<_, std::io::Error>("hit")
//!             }
//!         })
//!         .await;
//!     let _ = reply;
//! }
//! ```

pub mod backoff;
pub mod classify;
pub mod clock;
pub mod error;
pub mod metric;
pub mod picker;
pub mod pool;
pub mod resource;
pub mod sleeper;

pub use backoff::{Backoff, BackoffFn};
pub use classify::{network_error_classification, Classifier, ResponseClass};
pub use clock::{Clock, MonotonicClock};
pub use error::FailPoolError;
pub use metric::ResourceMetrics;
pub use picker::{P2cPicker, Picker, RandomPicker};
pub use pool::{FailPool, FailPoolBuilder, ResourceStats};
pub use resource::{Resource, ResourceList};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
