use std::sync::Arc;

use anyhow::{Error, Result};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    clients::{circuit_breaker::CircuitBreaker, health::HealthChecker},
    config::Config,
    error::BreakerError,
    models::{health::HealthStatus, request::LlmRequest, response::ApiResponse},
};

pub struct AppState {
    breaker: Arc<CircuitBreaker>,
    health_checker: HealthChecker,
    upstream_url: String,
    upstream_api_key: Option<String>,
}

impl AppState {
    pub fn new(config: &Config, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            health_checker: HealthChecker::new(vec![Arc::clone(&breaker)]),
            breaker,
            upstream_url: config.upstream_url.clone(),
            upstream_api_key: config.upstream_api_key.clone(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/circuit", get(circuit_state))
        .route("/v1/invoke", post(invoke))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(config: Config) -> Result<(), Error> {
    let breaker = Arc::new(CircuitBreaker::from_config(&config));
    let state = Arc::new(AppState::new(&config, breaker));

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = TcpListener::bind(&addr).await?;

    info!(
        address = %addr,
        upstream = %config.upstream_url,
        service = %config.service_name,
        "Relay server started"
    );

    axum::serve(listener, router(state)).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all();

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn circuit_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.breaker.state())
}

async fn invoke(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> impl IntoResponse {
    let mut request = LlmRequest::new(state.upstream_url.clone()).with_body(body);
    if let Some(api_key) = &state.upstream_api_key {
        request = request.with_bearer_token(api_key);
    }

    match state.breaker.call::<Value>(request).await {
        Ok(data) => (
            StatusCode::OK,
            Json(ApiResponse::success(data, "Upstream call succeeded".to_string())),
        ),
        Err(e) => {
            let status_code = match &e {
                BreakerError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
                BreakerError::Upstream { source, .. } if source.is_timeout() => {
                    StatusCode::GATEWAY_TIMEOUT
                }
                BreakerError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            };

            (
                status_code,
                Json(ApiResponse::error(e.to_string(), "Upstream call failed".to_string())),
            )
        }
    }
}
