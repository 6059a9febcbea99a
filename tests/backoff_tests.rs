use std::time::Duration;

use anyhow::Result;
use llm_breaker::{models::retry::RetryConfig, utils::ExponentialBackoff};
use tokio::time::{Instant, timeout};
use tokio_test::assert_err;
use tokio_util::sync::CancellationToken;

fn backoff(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64, factor: f64) -> ExponentialBackoff {
    ExponentialBackoff::new(RetryConfig {
        max_retries,
        initial_delay_ms,
        max_delay_ms,
        backoff_factor: factor,
        ..RetryConfig::default()
    })
}

/// Test: No retry is granted once the attempt index reaches the budget
#[test]
fn test_should_retry_false_at_max_retries() {
    let policy = backoff(3, 100, 1000, 2.0);

    for status in [None, Some(429), Some(500), Some(503), Some(400)] {
        assert!(!policy.should_retry(3, status), "status {:?}", status);
        assert!(!policy.should_retry(4, status), "status {:?}", status);
    }
}

/// Test: Zero retries means the first failure is final
#[test]
fn test_zero_max_retries_never_retries() {
    let policy = backoff(0, 100, 1000, 2.0);

    assert!(!policy.should_retry(0, None));
    assert!(!policy.should_retry(0, Some(503)));
}

/// Test: Only statuses in the retryable set are retried
#[test]
fn test_retryable_status_membership() {
    let policy = backoff(3, 100, 1000, 2.0);

    for status in [429, 500, 502, 503, 504] {
        assert!(policy.should_retry(0, Some(status)), "{} should be retried", status);
    }
    for status in [400, 401, 404, 422, 501] {
        assert!(!policy.should_retry(0, Some(status)), "{} should not be retried", status);
    }
}

/// Test: Failures without a status code are always retryable
#[test]
fn test_missing_status_is_retryable() {
    let policy = backoff(3, 100, 1000, 2.0);

    assert!(policy.should_retry(0, None));
    assert!(policy.should_retry(2, None));
}

/// Test: An empty retryable set retries every status
#[test]
fn test_empty_status_set_retries_everything() {
    let policy = ExponentialBackoff::new(RetryConfig {
        retryable_status_codes: Vec::new(),
        ..RetryConfig::default()
    });

    assert!(policy.should_retry(0, Some(400)));
    assert!(policy.should_retry(1, Some(404)));
    assert!(policy.should_retry(2, None));
}

/// Test: Delays grow geometrically from the initial delay
#[test]
fn test_delay_grows_exponentially() {
    let policy = backoff(5, 100, 10_000, 2.0);

    assert_eq!(policy.compute_delay(0), Duration::from_millis(100));
    assert_eq!(policy.compute_delay(1), Duration::from_millis(200));
    assert_eq!(policy.compute_delay(2), Duration::from_millis(400));
    assert_eq!(policy.compute_delay(3), Duration::from_millis(800));
}

/// Test: Max delay cap is respected
#[test]
fn test_delay_capped_at_max() {
    let policy = backoff(10, 100, 300, 2.0);

    assert_eq!(policy.compute_delay(1), Duration::from_millis(200));
    assert_eq!(policy.compute_delay(2), Duration::from_millis(300));
    assert_eq!(policy.compute_delay(9), Duration::from_millis(300));
    assert_eq!(policy.compute_delay(u32::MAX), Duration::from_millis(300));
}

/// Test: A factor of one keeps the delay constant
#[test]
fn test_unit_factor_gives_constant_delay() {
    let policy = backoff(5, 250, 30_000, 1.0);

    for attempt in 0..5 {
        assert_eq!(policy.compute_delay(attempt), Duration::from_millis(250));
    }
}

/// Test: Delay never decreases and never exceeds the cap
#[test]
fn test_delay_monotonic_and_bounded() {
    for factor in [1.0, 1.5, 2.0, 3.0, 10.0] {
        let policy = backoff(64, 7, 5_000, factor);
        let mut previous = Duration::ZERO;

        for attempt in 0..64 {
            let delay = policy.compute_delay(attempt);
            assert!(delay >= previous, "factor {} attempt {}", factor, attempt);
            assert!(delay <= Duration::from_millis(5_000), "factor {} attempt {}", factor, attempt);
            previous = delay;
        }
    }
}

/// Test: Jitter is applied to delays and stays within the cap
#[test]
fn test_jitter_applied_to_delays() {
    let policy = ExponentialBackoff::new(RetryConfig {
        initial_delay_ms: 1_000,
        max_delay_ms: 1_200,
        backoff_factor: 1.0,
        jitter_ratio: 0.5,
        ..RetryConfig::default()
    });

    let delays: Vec<Duration> = (0..50).map(|_| policy.jittered_delay(0)).collect();

    for delay in &delays {
        assert!(*delay >= Duration::from_millis(500));
        assert!(*delay <= Duration::from_millis(1_200));
    }

    let min_delay = delays.iter().min().copied().unwrap_or_default();
    let max_delay = delays.iter().max().copied().unwrap_or_default();
    assert!(
        max_delay > min_delay,
        "Delays should vary due to jitter (min: {:?}, max: {:?})",
        min_delay,
        max_delay
    );
}

/// Test: Out-of-range jitter ratios never panic and never exceed the cap
#[test]
fn test_invalid_jitter_ratio_is_tolerated() {
    for ratio in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1.0, 1.5, 25.0, -0.3] {
        let policy = ExponentialBackoff::new(RetryConfig {
            initial_delay_ms: 1_000,
            max_delay_ms: 1_500,
            backoff_factor: 2.0,
            jitter_ratio: ratio,
            ..RetryConfig::default()
        });

        for attempt in 0..4 {
            let delay = policy.jittered_delay(attempt);
            assert!(delay > Duration::ZERO, "ratio {} attempt {}", ratio, attempt);
            assert!(
                delay <= Duration::from_millis(1_500),
                "ratio {} attempt {} gave {:?}",
                ratio,
                attempt,
                delay
            );
        }
    }

    let non_finite = ExponentialBackoff::new(RetryConfig {
        jitter_ratio: f64::NAN,
        ..RetryConfig::default()
    });
    assert_eq!(non_finite.jittered_delay(1), non_finite.compute_delay(1));
}

/// Test: Without jitter the wait delay equals the computed delay
#[test]
fn test_zero_jitter_is_deterministic() {
    let policy = backoff(3, 100, 1_000, 2.0);

    for attempt in 0..3 {
        assert_eq!(policy.jittered_delay(attempt), policy.compute_delay(attempt));
    }
}

/// Test: Waiting suspends for at least the computed delay
#[tokio::test]
async fn test_wait_sleeps_for_delay() -> Result<()> {
    let policy = backoff(3, 60, 1_000, 2.0);

    let start = Instant::now();
    policy.wait(0).await;

    assert!(start.elapsed() >= Duration::from_millis(60));

    Ok(())
}

/// Test: A cancelled token interrupts a long backoff wait
#[tokio::test]
async fn test_wait_interrupted_by_cancellation() -> Result<()> {
    let policy = backoff(3, 10_000, 30_000, 2.0);
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });

    let result = timeout(Duration::from_secs(2), policy.wait_or_cancel(0, &token)).await?;
    let error = assert_err!(result);
    assert!(error.is_cancelled());

    Ok(())
}
