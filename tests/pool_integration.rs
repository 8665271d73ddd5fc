//! End-to-end scenarios for the pool: retry budgets, breaker trips, blackout
//! growth, and classification-driven repicks.

use failpool::{Backoff, Clock, FailPool, InstantSleeper, Resource};
use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    fn new() -> Self {
        Self::default()
    }

    fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

fn timeout_error() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded")
}

#[tokio::test]
async fn retry_budget_is_exhausted_across_three_resources() {
    let pool: FailPool<io::Error> = FailPool::builder("s1", ["1", "2", "3"])
        .retry(
            2,
            2,
            Duration::from_millis(20),
            Duration::from_millis(100),
            Backoff::DecorrelatedJittered,
        )
        .with_sleeper(InstantSleeper)
        .build();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();

    let result = pool
        .execute(|_: &Resource| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(timeout_error())
            }
        })
        .await;

    assert!(result.unwrap_err().is_max_retry());
    // (2 repicks + 1) * (2 retries + 1)
    assert_eq!(calls.load(Ordering::SeqCst), 9);
}

#[tokio::test]
async fn without_breaker_the_user_error_keeps_coming_back() {
    let pool: FailPool<io::Error> = FailPool::builder("s2", ["1"]).build();

    for _ in 0..4 {
        let result = pool
            .execute(|_: &Resource| async { Err::<(), _>(timeout_error()) })
            .await;
        let err = result.unwrap_err();
        let inner = err.as_inner().expect("user error, not a sentinel");
        assert_eq!(inner.kind(), io::ErrorKind::TimedOut);
    }
}

#[tokio::test]
async fn breaker_trips_then_resets_on_success_after_blackout() {
    let clock = ManualClock::new();
    let pool: FailPool<io::Error> = FailPool::builder("s3", ["1"])
        .circuit_breaker(
            3,
            Duration::from_millis(2),
            Duration::from_secs(3),
            Backoff::Exponential,
        )
        .with_clock(clock.clone())
        .build();

    for _ in 0..3 {
        let result = pool
            .execute(|_: &Resource| async { Err::<(), _>(timeout_error()) })
            .await;
        assert!(result.unwrap_err().is_inner());
    }

    // threshold reached, blackout active
    let result = pool
        .execute(|_: &Resource| async { Ok::<_, io::Error>(()) })
        .await;
    assert!(result.unwrap_err().is_all_resources_down());

    clock.advance(Duration::from_secs(2));
    let result = pool
        .execute(|_: &Resource| async { Ok::<_, io::Error>(()) })
        .await;
    assert!(result.is_ok());
    assert_eq!(pool.stats()[0].successive_failures, 0);

    // the count restarts from zero: three more failures before the next trip
    for _ in 0..3 {
        let result = pool
            .execute(|_: &Resource| async { Err::<(), _>(timeout_error()) })
            .await;
        assert!(result.unwrap_err().is_inner());
    }
    let result = pool
        .execute(|_: &Resource| async { Ok::<_, io::Error>(()) })
        .await;
    assert!(result.unwrap_err().is_all_resources_down());
}

#[tokio::test]
async fn blackout_doubles_with_each_failure_past_threshold() {
    let clock = ManualClock::new();
    let pool: FailPool<io::Error> = FailPool::builder("s4", ["1"])
        .circuit_breaker(
            3,
            Duration::from_millis(2),
            Duration::from_secs(10),
            Backoff::Exponential,
        )
        .with_clock(clock.clone())
        .build();

    let calls = Arc::new(AtomicUsize::new(0));
    let fail = |calls: &Arc<AtomicUsize>| {
        let calls = calls.clone();
        move |_: &Resource| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(timeout_error())
            }
        }
    };

    for _ in 0..3 {
        let result = pool.execute(fail(&calls)).await;
        assert!(result.unwrap_err().is_inner());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // 2ms blackout: still dark after 1ms
    clock.advance(Duration::from_millis(1));
    let result = pool.execute(fail(&calls)).await;
    assert!(result.unwrap_err().is_all_resources_down());
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // blackout over at 3ms: the attempt runs, fails, and doubles the window
    clock.advance(Duration::from_millis(2));
    let result = pool.execute(fail(&calls)).await;
    assert!(result.unwrap_err().is_inner());
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    // 4ms blackout now
    clock.advance(Duration::from_millis(3));
    let result = pool.execute(fail(&calls)).await;
    assert!(result.unwrap_err().is_all_resources_down());

    clock.advance(Duration::from_millis(1));
    let result = pool.execute(fail(&calls)).await;
    assert!(result.unwrap_err().is_inner());
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    // 8ms blackout now
    clock.advance(Duration::from_millis(7));
    let result = pool.execute(fail(&calls)).await;
    assert!(result.unwrap_err().is_all_resources_down());
    clock.advance(Duration::from_millis(1));
    let result = pool.execute(fail(&calls)).await;
    assert!(result.unwrap_err().is_inner());
    assert_eq!(calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn blackout_growth_halts_at_the_configured_max() {
    let clock = ManualClock::new();
    let pool: FailPool<io::Error> = FailPool::builder("s4-cap", ["1"])
        .circuit_breaker(
            1,
            Duration::from_millis(2),
            Duration::from_millis(4),
            Backoff::Exponential,
        )
        .with_clock(clock.clone())
        .build();

    // pile up failures well past the threshold
    for _ in 0..6 {
        let _ = pool
            .execute(|_: &Resource| async { Err::<(), _>(timeout_error()) })
            .await;
        clock.advance(Duration::from_millis(10));
    }

    let _ = pool
        .execute(|_: &Resource| async { Err::<(), _>(timeout_error()) })
        .await;

    // window is capped at 4ms no matter how many failures piled up
    clock.advance(Duration::from_millis(3));
    let result = pool
        .execute(|_: &Resource| async { Ok::<_, io::Error>(()) })
        .await;
    assert!(result.unwrap_err().is_all_resources_down());

    clock.advance(Duration::from_millis(2));
    let result = pool
        .execute(|_: &Resource| async { Ok::<_, io::Error>(()) })
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn classifier_drives_a_repick_onto_a_fresh_resource() {
    let pool: FailPool<io::Error> = FailPool::builder("s6", ["1", "2"])
        .retry(
            1,
            0,
            Duration::from_millis(20),
            Duration::from_millis(100),
            Backoff::None,
        )
        .build();

    let visited: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let visited_clone = visited.clone();

    let result = pool
        .execute(|resource: &Resource| {
            let visited = visited_clone.clone();
            let addr = resource.address().to_string();
            async move {
                let mut visited = visited.lock().unwrap();
                visited.push(addr);
                if visited.len() == 1 {
                    Err(io::Error::new(
                        io::ErrorKind::ConnectionRefused,
                        "connection refused",
                    ))
                } else {
                    Ok(())
                }
            }
        })
        .await;

    assert!(result.is_ok());
    let visited = visited.lock().unwrap();
    assert_eq!(visited.len(), 2);
    assert_ne!(visited[0], visited[1], "repick must land on the other resource");

    for stats in pool.stats() {
        if stats.address == visited[0] {
            assert_eq!(stats.successive_failures, 1);
        } else {
            assert_eq!(stats.successive_failures, 0);
        }
    }
}

#[tokio::test]
async fn zero_budgets_mean_exactly_one_attempt() {
    let pool: FailPool<io::Error> = FailPool::builder("bounds", ["1", "2"])
        .retry(
            0,
            0,
            Duration::from_millis(1),
            Duration::from_millis(5),
            Backoff::None,
        )
        .build();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();

    let result = pool
        .execute(|_: &Resource| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(timeout_error())
            }
        })
        .await;

    assert!(result.unwrap_err().is_max_retry());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn zero_bulkhead_ceiling_rejects_without_invoking() {
    let pool: FailPool<io::Error> = FailPool::builder("bounds", ["1"])
        .bulkhead(0, Duration::from_secs(1))
        .build();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();

    let result = pool
        .execute(|_: &Resource| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, io::Error>(())
            }
        })
        .await;

    assert!(result.unwrap_err().is_all_resources_down());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn identical_successful_calls_leave_counters_untouched() {
    let pool: FailPool<io::Error> = FailPool::builder("idem", ["1", "2"]).build();

    for _ in 0..2 {
        let result = pool
            .execute(|_: &Resource| async { Ok::<_, io::Error>(()) })
            .await;
        assert!(result.is_ok());
        for stats in pool.stats() {
            assert_eq!(stats.successive_failures, 0);
            assert_eq!(stats.active_requests, 0);
        }
    }
}
