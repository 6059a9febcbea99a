use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    /// Statuses worth another attempt. Empty means every failure is retried.
    pub retryable_status_codes: Vec<u16>,
    /// Random spread applied to each wait, as a fraction of the delay.
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            retryable_status_codes: vec![429, 500, 502, 503, 504],
            jitter_ratio: 0.0,
        }
    }
}
