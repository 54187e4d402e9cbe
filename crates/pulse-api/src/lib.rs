//! # pulse-api
//!
//! HTTP surface for Pulse built on Axum.
//!
//! Provides the `/ws` metrics stream endpoint, health and breaker status
//! routes, CORS and request logging middleware, error mapping, and the
//! server bootstrap with ordered graceful shutdown.

pub mod app;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::{build_app, run_server, serve, shutdown_signal};
pub use state::AppState;
