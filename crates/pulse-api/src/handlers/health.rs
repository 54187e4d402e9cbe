//! Health check handlers.

use axum::Json;
use axum::extract::State;

use pulse_realtime::broadcast::sampling::SAMPLER_COMPONENT;
use pulse_realtime::connection::manager::DELIVERY_BREAKER_PREFIX;
use pulse_resilience::CircuitState;

use crate::dto::response::{ApiResponse, DetailedHealthResponse, HealthResponse};
use crate::state::AppState;

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
    }))
}

/// GET /api/health/detailed
pub async fn health_detailed(
    State(state): State<AppState>,
) -> Json<ApiResponse<DetailedHealthResponse>> {
    let realtime = &state.realtime;
    let sampler_circuit = realtime
        .breakers
        .get(SAMPLER_COMPONENT)
        .map(|breaker| breaker.state())
        .unwrap_or(CircuitState::Closed);

    let status = if realtime.is_shutting_down() {
        "shutting_down"
    } else if sampler_circuit != CircuitState::Closed {
        "degraded"
    } else {
        "ok"
    };

    Json(ApiResponse::ok(DetailedHealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        connections: realtime.connections.connection_count(),
        max_connections: realtime.config().max_connections,
        sampler_circuit,
        metrics: realtime.metrics.snapshot(),
        breakers: realtime
            .breakers
            .stats_matching(|name| !name.starts_with(DELIVERY_BREAKER_PREFIX)),
    }))
}
