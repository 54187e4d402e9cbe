//! Circuit breaker inspection.

use axum::Json;
use axum::extract::{Path, State};

use pulse_core::error::AppError;
use pulse_resilience::CircuitBreakerStats;

use crate::dto::response::ApiResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/breakers
pub async fn list_breakers(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<CircuitBreakerStats>>> {
    Json(ApiResponse::ok(state.realtime.breakers.stats()))
}

/// GET /api/breakers/{name}
pub async fn get_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<CircuitBreakerStats>>, ApiError> {
    let breaker = state
        .realtime
        .breakers
        .get(&name)
        .ok_or_else(|| AppError::not_found(format!("Breaker '{name}' not found")))?;
    Ok(Json(ApiResponse::ok(breaker.stats())))
}
