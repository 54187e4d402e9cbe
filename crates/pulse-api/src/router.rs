//! Route definitions for the Pulse HTTP API.
//!
//! JSON routes are mounted under `/api`; the metrics stream lives at `/ws`.

use axum::Router;
use axum::routing::get;

use crate::handlers;
use crate::state::AppState;

/// Build the router with all routes, threading `AppState` through them.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(health_routes())
        .merge(breaker_routes());

    let ws_routes = Router::new().route("/ws", get(handlers::ws::ws_upgrade));

    Router::new()
        .nest("/api", api_routes)
        .merge(ws_routes)
        .with_state(state)
}

/// Liveness and engine status
fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/health/detailed", get(handlers::health::health_detailed))
}

/// Circuit breaker inspection
fn breaker_routes() -> Router<AppState> {
    Router::new()
        .route("/breakers", get(handlers::breakers::list_breakers))
        .route("/breakers/{name}", get(handlers::breakers::get_breaker))
}
