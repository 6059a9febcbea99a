use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use tracing::debug;

use crate::{
    clients::circuit_breaker::CircuitBreaker,
    models::{
        circuit_breaker::CircuitState,
        health::{HealthCheckResponse, HealthStatus, ServiceHealth},
    },
};

pub struct HealthChecker {
    breakers: Vec<Arc<CircuitBreaker>>,
}

impl HealthChecker {
    pub fn new(breakers: Vec<Arc<CircuitBreaker>>) -> Self {
        Self { breakers }
    }

    pub fn check_all(&self) -> HealthCheckResponse {
        let checks: HashMap<String, ServiceHealth> = self
            .breakers
            .iter()
            .map(|breaker| {
                (
                    breaker.service_name().to_string(),
                    self.check_circuit_breaker(breaker),
                )
            })
            .collect();

        let overall_status = self.determine_overall_status(&checks);

        HealthCheckResponse {
            status: overall_status,
            timestamp: Utc::now(),
            checks,
        }
    }

    fn check_circuit_breaker(&self, breaker: &CircuitBreaker) -> ServiceHealth {
        let snapshot = breaker.state();
        let state_str = snapshot.status.as_str().to_string();

        debug!(
            service = breaker.service_name(),
            circuit_state = %state_str,
            "Circuit breaker state checked"
        );

        let health = match snapshot.status {
            CircuitState::Closed => ServiceHealth::healthy(),
            CircuitState::HalfOpen => {
                ServiceHealth::degraded("Circuit breaker in recovery mode".to_string())
            }
            CircuitState::Open => ServiceHealth::unhealthy("Circuit breaker is open".to_string())
                .with_retry_at(snapshot.next_attempt_at),
        };

        health.with_circuit_breaker(state_str, snapshot.failure_count)
    }

    fn determine_overall_status(&self, checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
        let has_unhealthy = checks
            .values()
            .any(|health| health.status == HealthStatus::Unhealthy);

        let has_degraded = checks
            .values()
            .any(|health| health.status == HealthStatus::Degraded);

        if has_unhealthy {
            HealthStatus::Unhealthy
        } else if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}
