//! Application builder: wires router, middleware and state into an Axum app,
//! and runs it with an ordered graceful shutdown.

use std::future::{Future, IntoFuture};
use std::sync::Arc;

use axum::Router;
use axum::middleware as axum_middleware;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use pulse_auth::JwtAuthenticator;
use pulse_core::config::AppConfig;
use pulse_core::error::AppError;
use pulse_realtime::server::RealtimeEngine;
use pulse_sampler::SystemSampler;

use crate::middleware::cors::build_cors_layer;
use crate::middleware::logging::request_logging;
use crate::router::build_router;
use crate::state::AppState;

/// Builds the complete Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.server.cors);
    build_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn(request_logging))
}

/// Runs the Pulse server with production collaborators until `shutdown` resolves.
pub async fn run_server(
    config: AppConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AppError> {
    info!("Starting Pulse server...");

    let authenticator = Arc::new(JwtAuthenticator::new(&config.auth));
    let sampler = Arc::new(SystemSampler::new(config.sampler.clone()));
    let realtime = Arc::new(RealtimeEngine::new(&config, authenticator, sampler));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

    serve(listener, AppState::new(config, realtime), shutdown).await
}

/// Serves `state` on `listener` until `shutdown` resolves.
///
/// On shutdown the broadcast stops first, then open streams are drained,
/// then in-flight HTTP requests are given `server.shutdown_grace_seconds`.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AppError> {
    let realtime = Arc::clone(&state.realtime);
    let grace = std::time::Duration::from_secs(state.config.server.shutdown_grace_seconds);
    let addr = listener
        .local_addr()
        .map_err(|e| AppError::internal(format!("Listener has no address: {e}")))?;

    realtime.start();
    let app = build_app(state);

    info!(%addr, "Pulse server listening");

    let drain = Arc::clone(&realtime);
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown.await;
        info!("Shutdown signal received, starting graceful shutdown...");
        if let Err(e) = drain.shutdown().await {
            error!(error = %e, "Real-time engine shutdown failed");
        }
    });

    tokio::select! {
        result = server.into_future() => {
            result.map_err(|e| AppError::internal(format!("Server error: {e}")))?;
        }
        _ = async {
            realtime.stopped().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                grace_seconds = grace.as_secs(),
                "HTTP connections still open after grace period, exiting anyway"
            );
        }
    }

    info!("Pulse server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
