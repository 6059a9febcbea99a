use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::{circuit_breaker::CircuitBreakerConfig, retry::RetryConfig};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,
    #[serde(default)]
    pub upstream_api_key: Option<String>,

    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_failure_threshold")]
    pub circuit_breaker_failure_threshold: u32,
    #[serde(default = "default_reset_timeout_ms")]
    pub circuit_breaker_reset_timeout_ms: u64,
    #[serde(default = "default_success_threshold")]
    pub circuit_breaker_success_threshold: u32,
    #[serde(default = "default_attempt_timeout_ms")]
    pub circuit_breaker_attempt_timeout_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_retry_backoff_factor")]
    pub retry_backoff_factor: f64,
    #[serde(default = "default_retry_status_codes")]
    pub retry_status_codes: Vec<u16>,
    #[serde(default)]
    pub retry_jitter_ratio: f64,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        Self::from_vars(std::env::vars())
    }

    /// Builds the config from explicit `(NAME, value)` pairs instead of the
    /// process environment.
    pub fn from_vars<I>(vars: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Self>(vars)
            .map_err(|e| anyhow!("Invalid environmental variable: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.circuit_breaker_failure_threshold == 0 {
            return Err(anyhow!("CIRCUIT_BREAKER_FAILURE_THRESHOLD must be at least 1"));
        }
        if self.circuit_breaker_success_threshold == 0 {
            return Err(anyhow!("CIRCUIT_BREAKER_SUCCESS_THRESHOLD must be at least 1"));
        }
        if self.circuit_breaker_attempt_timeout_ms == 0 {
            return Err(anyhow!("CIRCUIT_BREAKER_ATTEMPT_TIMEOUT_MS must be positive"));
        }
        if !self.retry_backoff_factor.is_finite() || self.retry_backoff_factor < 1.0 {
            return Err(anyhow!(
                "RETRY_BACKOFF_FACTOR must be a finite number >= 1, got {}",
                self.retry_backoff_factor
            ));
        }
        if self.initial_retry_delay_ms > self.max_retry_delay_ms {
            return Err(anyhow!(
                "INITIAL_RETRY_DELAY_MS ({}) exceeds MAX_RETRY_DELAY_MS ({})",
                self.initial_retry_delay_ms,
                self.max_retry_delay_ms
            ));
        }
        if !(0.0..1.0).contains(&self.retry_jitter_ratio) {
            return Err(anyhow!(
                "RETRY_JITTER_RATIO must be in [0, 1), got {}",
                self.retry_jitter_ratio
            ));
        }

        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_factor: self.retry_backoff_factor,
            retryable_status_codes: self.retry_status_codes.clone(),
            jitter_ratio: self.retry_jitter_ratio,
        }
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker_failure_threshold,
            reset_timeout_ms: self.circuit_breaker_reset_timeout_ms,
            success_threshold: self.circuit_breaker_success_threshold,
            attempt_timeout_ms: self.circuit_breaker_attempt_timeout_ms,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let breaker = CircuitBreakerConfig::default();
        let retry = RetryConfig::default();

        Self {
            service_name: default_service_name(),
            upstream_url: default_upstream_url(),
            upstream_api_key: None,
            server_port: default_server_port(),
            log_json: false,
            circuit_breaker_failure_threshold: breaker.failure_threshold,
            circuit_breaker_reset_timeout_ms: breaker.reset_timeout_ms,
            circuit_breaker_success_threshold: breaker.success_threshold,
            circuit_breaker_attempt_timeout_ms: breaker.attempt_timeout_ms,
            max_retries: retry.max_retries,
            initial_retry_delay_ms: retry.initial_delay_ms,
            max_retry_delay_ms: retry.max_delay_ms,
            retry_backoff_factor: retry.backoff_factor,
            retry_status_codes: retry.retryable_status_codes,
            retry_jitter_ratio: retry.jitter_ratio,
        }
    }
}

fn default_service_name() -> String {
    "llm".to_string()
}

fn default_upstream_url() -> String {
    "http://localhost:8080/v1/chat/completions".to_string()
}

fn default_server_port() -> u16 {
    3000
}

fn default_failure_threshold() -> u32 {
    CircuitBreakerConfig::default().failure_threshold
}

fn default_reset_timeout_ms() -> u64 {
    CircuitBreakerConfig::default().reset_timeout_ms
}

fn default_success_threshold() -> u32 {
    CircuitBreakerConfig::default().success_threshold
}

fn default_attempt_timeout_ms() -> u64 {
    CircuitBreakerConfig::default().attempt_timeout_ms
}

fn default_max_retries() -> u32 {
    RetryConfig::default().max_retries
}

fn default_initial_retry_delay_ms() -> u64 {
    RetryConfig::default().initial_delay_ms
}

fn default_max_retry_delay_ms() -> u64 {
    RetryConfig::default().max_delay_ms
}

fn default_retry_backoff_factor() -> f64 {
    RetryConfig::default().backoff_factor
}

fn default_retry_status_codes() -> Vec<u16> {
    RetryConfig::default().retryable_status_codes
}
