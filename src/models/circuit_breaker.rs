use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failed calls while closed before the circuit opens.
    pub failure_threshold: u32,
    /// How long an open circuit rejects calls before admitting a probe.
    pub reset_timeout_ms: u64,
    /// Consecutive half-open successes needed to close the circuit.
    pub success_threshold: u32,
    /// Deadline applied to every single transport attempt.
    pub attempt_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
            success_threshold: 3,
            attempt_timeout_ms: 10_000,
        }
    }
}

/// Point-in-time view of a breaker's health state.
///
/// The breaker keeps one of these behind its lock and hands out clones, so a
/// snapshot never changes after it has been returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub status: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl Default for CircuitSnapshot {
    fn default() -> Self {
        Self {
            status: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_at: None,
            next_attempt_at: None,
        }
    }
}
