use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{error::UpstreamError, models::retry::RetryConfig};

const MAX_JITTER_RATIO: f64 = 0.99;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over the built-in filter when set.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "llm_breaker=info,tower_http=info".into());

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Retry decisions and delays for one breaker.
///
/// Attempt indices are zero-based: attempt `0` is the first request, so the
/// delay computed for index `n` is the pause after the `n`-th failure.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: RetryConfig,
}

impl ExponentialBackoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn should_retry(&self, attempt: u32, status_code: Option<u16>) -> bool {
        if attempt >= self.config.max_retries {
            return false;
        }

        match status_code {
            Some(status) if !self.config.retryable_status_codes.is_empty() => {
                self.config.retryable_status_codes.contains(&status)
            }
            _ => true,
        }
    }

    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = self.config.initial_delay_ms as f64 * self.config.backoff_factor.powi(exponent);

        Duration::from_millis(self.cap(delay_ms))
    }

    /// Delay for `attempt` with the configured jitter spread applied.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.compute_delay(attempt);
        let ratio = self.config.jitter_ratio;

        if !ratio.is_finite() || ratio <= 0.0 {
            return base;
        }

        // Keeps the jittered delay strictly positive.
        let ratio = ratio.min(MAX_JITTER_RATIO);

        let jitter = rand::random_range(-ratio..=ratio);
        let jittered_ms = base.as_millis() as f64 * (1.0 + jitter);

        Duration::from_millis(self.cap(jittered_ms))
    }

    pub async fn wait(&self, attempt: u32) {
        let delay = self.jittered_delay(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off before retry");
        sleep(delay).await;
    }

    /// Like [`wait`](Self::wait), but gives up as soon as `token` fires.
    pub async fn wait_or_cancel(
        &self,
        attempt: u32,
        token: &CancellationToken,
    ) -> Result<(), UpstreamError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(UpstreamError::Cancelled),
            _ = self.wait(attempt) => Ok(()),
        }
    }

    fn cap(&self, delay_ms: f64) -> u64 {
        let max = self.config.max_delay_ms as f64;
        if delay_ms.is_nan() || delay_ms <= 0.0 {
            0
        } else if delay_ms >= max {
            self.config.max_delay_ms
        } else {
            delay_ms.round() as u64
        }
    }
}
