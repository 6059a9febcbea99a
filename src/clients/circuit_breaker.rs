use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::{BreakerError, UpstreamError},
    models::{
        circuit_breaker::{CircuitBreakerConfig, CircuitSnapshot, CircuitState},
        request::LlmRequest,
        retry::RetryConfig,
    },
    utils::ExponentialBackoff,
};

/// Guards one upstream service with retries and a three-state circuit.
///
/// The breaker is `Sync`; share it behind an `Arc` to protect concurrent
/// callers. The permission check and both outcome handlers run under a single
/// lock, which is never held across an await point.
pub struct CircuitBreaker {
    service_name: String,
    http_client: Client,
    config: CircuitBreakerConfig,
    backoff: ExponentialBackoff,
    state: Mutex<CircuitSnapshot>,
}

impl CircuitBreaker {
    pub fn new(
        service_name: impl Into<String>,
        config: CircuitBreakerConfig,
        retry_config: RetryConfig,
    ) -> Self {
        Self::with_http_client(service_name, Client::new(), config, retry_config)
    }

    pub fn with_http_client(
        service_name: impl Into<String>,
        http_client: Client,
        config: CircuitBreakerConfig,
        retry_config: RetryConfig,
    ) -> Self {
        let service_name = service_name.into();
        info!(service = %service_name, "Circuit breaker initialized");

        Self {
            service_name,
            http_client,
            config,
            backoff: ExponentialBackoff::new(retry_config),
            state: Mutex::new(CircuitSnapshot::default()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.service_name.clone(),
            config.circuit_breaker_config(),
            config.retry_config(),
        )
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn backoff(&self) -> &ExponentialBackoff {
        &self.backoff
    }

    pub fn state(&self) -> CircuitSnapshot {
        self.lock_state().clone()
    }

    /// Sends `request` through the breaker and decodes a successful body as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::CircuitOpen`] without touching the network when
    /// the circuit is open and its cooldown has not elapsed. Returns
    /// [`BreakerError::Upstream`] with the last attempt's failure once retries
    /// are exhausted or a non-retryable failure occurs.
    pub async fn call<T>(&self, request: LlmRequest) -> Result<T, BreakerError>
    where
        T: DeserializeOwned,
    {
        if let Err(retry_at) = self.try_acquire() {
            warn!(service = %self.service_name, "Circuit breaker is open, rejecting request");
            return Err(BreakerError::CircuitOpen {
                service: self.service_name.clone(),
                retry_at,
            });
        }

        let cancellation = request
            .cancellation
            .clone()
            .unwrap_or_else(CancellationToken::new);
        let max_retries = self.backoff.config().max_retries;
        let mut attempt = 0;

        let last_error = loop {
            match self.send_with_deadline::<T>(&request, &cancellation).await {
                Ok(value) => {
                    self.on_success();
                    if attempt > 0 {
                        info!(
                            service = %self.service_name,
                            attempts = attempt + 1,
                            "Upstream call succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let status = error.status_code();
                    let retry = !error.is_cancelled()
                        && attempt < max_retries
                        && self.backoff.should_retry(attempt, status);

                    if !retry {
                        break error;
                    }

                    debug!(
                        service = %self.service_name,
                        attempt,
                        max_retries,
                        status = ?status,
                        error = %error,
                        "Upstream attempt failed, backing off"
                    );

                    if let Err(cancelled) = self.backoff.wait_or_cancel(attempt, &cancellation).await {
                        break cancelled;
                    }
                    attempt += 1;
                }
            }
        };

        self.on_failure();
        warn!(
            service = %self.service_name,
            attempts = attempt + 1,
            error = %last_error,
            "Upstream call failed"
        );

        Err(BreakerError::Upstream {
            service: self.service_name.clone(),
            attempts: attempt + 1,
            source: last_error,
        })
    }

    /// Admits or rejects a call. An expired open circuit moves to half-open
    /// here, before the probe is sent.
    fn try_acquire(&self) -> Result<(), Option<DateTime<Utc>>> {
        let mut state = self.lock_state();

        match state.status {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => match state.next_attempt_at {
                Some(next_attempt_at) if Utc::now() > next_attempt_at => {
                    state.status = CircuitState::HalfOpen;
                    state.next_attempt_at = None;
                    info!(service = %self.service_name, "Circuit breaker attempting reset");
                    Ok(())
                }
                next_attempt_at => Err(next_attempt_at),
            },
        }
    }

    fn on_success(&self) {
        let mut state = self.lock_state();

        match state.status {
            CircuitState::HalfOpen => {
                state.success_count += 1;
                debug!(
                    service = %self.service_name,
                    successes = state.success_count,
                    threshold = self.config.success_threshold,
                    "Circuit breaker success recorded"
                );

                if state.success_count >= self.config.success_threshold {
                    *state = CircuitSnapshot::default();
                    info!(service = %self.service_name, "Circuit breaker closed after successful recovery");
                }
            }
            CircuitState::Closed => state.failure_count = 0,
            // A call admitted before a concurrent failure tripped the circuit.
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let now = Utc::now();
        let mut state = self.lock_state();

        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure_at = Some(now);

        match state.status {
            CircuitState::HalfOpen => {
                state.status = CircuitState::Open;
                state.success_count = 0;
                state.next_attempt_at = Some(self.reopen_at(now));
                warn!(service = %self.service_name, "Circuit breaker reopened after failed recovery attempt");
            }
            CircuitState::Closed if state.failure_count >= self.config.failure_threshold => {
                state.status = CircuitState::Open;
                state.next_attempt_at = Some(self.reopen_at(now));
                warn!(
                    service = %self.service_name,
                    failures = state.failure_count,
                    "Circuit breaker opened due to consecutive failures"
                );
            }
            CircuitState::Closed => {
                debug!(
                    service = %self.service_name,
                    failures = state.failure_count,
                    threshold = self.config.failure_threshold,
                    "Circuit breaker failure recorded"
                );
            }
            CircuitState::Open => {}
        }
    }

    fn reopen_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        i64::try_from(self.config.reset_timeout_ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .and_then(|cooldown| now.checked_add_signed(cooldown))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// One transport attempt raced against its deadline and the caller's token.
    async fn send_with_deadline<T>(
        &self,
        request: &LlmRequest,
        cancellation: &CancellationToken,
    ) -> Result<T, UpstreamError>
    where
        T: DeserializeOwned,
    {
        let deadline = Duration::from_millis(self.config.attempt_timeout_ms);

        tokio::select! {
            biased;
            _ = cancellation.cancelled() => Err(UpstreamError::Cancelled),
            outcome = timeout(deadline, self.send_once::<T>(request)) => match outcome {
                Ok(result) => result,
                Err(_) => Err(UpstreamError::Timeout(self.config.attempt_timeout_ms)),
            },
        }
    }

    async fn send_once<T>(&self, request: &LlmRequest) -> Result<T, UpstreamError>
    where
        T: DeserializeOwned,
    {
        let mut builder = self
            .http_client
            .request(request.method.clone(), &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            response.json::<T>().await.map_err(UpstreamError::Decode)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CircuitSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
