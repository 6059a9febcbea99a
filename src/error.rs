use chrono::{DateTime, Utc};
use thiserror::Error;

/// Terminal outcome of a failed [`CircuitBreaker::call`](crate::clients::circuit_breaker::CircuitBreaker::call).
#[derive(Debug, Error)]
pub enum BreakerError {
    /// The circuit refused the call; the transport was never touched.
    #[error("Circuit breaker is open for {service}")]
    CircuitOpen {
        service: String,
        retry_at: Option<DateTime<Utc>>,
    },

    /// Every permitted attempt failed, or the first non-retryable one did.
    #[error("Upstream {service} failed after {attempts} attempt(s): {source}")]
    Upstream {
        service: String,
        attempts: u32,
        #[source]
        source: UpstreamError,
    },
}

impl BreakerError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, BreakerError::CircuitOpen { .. })
    }

    pub fn upstream(&self) -> Option<&UpstreamError> {
        match self {
            BreakerError::Upstream { source, .. } => Some(source),
            BreakerError::CircuitOpen { .. } => None,
        }
    }
}

/// A single failed transport attempt.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Request was cancelled by the caller")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode upstream response: {0}")]
    Decode(#[source] reqwest::Error),
}

impl UpstreamError {
    /// HTTP status carried by the failure, if the upstream answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            UpstreamError::Transport(e) => e.status().map(|s| s.as_u16()),
            UpstreamError::Timeout(_) | UpstreamError::Cancelled | UpstreamError::Decode(_) => {
                None
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, UpstreamError::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, UpstreamError::Timeout(_))
    }
}
