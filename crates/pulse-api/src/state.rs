//! Application state shared across all handlers and middleware.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use pulse_core::config::AppConfig;
use pulse_realtime::server::RealtimeEngine;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Real-time broadcast engine
    pub realtime: Arc<RealtimeEngine>,
    /// When the server started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Creates the state for a freshly built engine.
    pub fn new(config: AppConfig, realtime: Arc<RealtimeEngine>) -> Self {
        Self {
            config: Arc::new(config),
            realtime,
            started_at: Utc::now(),
        }
    }

    /// Seconds since startup.
    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}
