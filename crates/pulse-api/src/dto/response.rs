//! Response DTOs.

use serde::{Deserialize, Serialize};

use pulse_realtime::metrics::MetricsSnapshot;
use pulse_resilience::{CircuitBreakerStats, CircuitState};

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Version.
    pub version: String,
    /// Uptime.
    pub uptime_seconds: u64,
}

/// Detailed health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedHealthResponse {
    /// `ok`, `degraded` while the sampler circuit is not closed, or `shutting_down`.
    pub status: String,
    /// Version.
    pub version: String,
    /// Uptime.
    pub uptime_seconds: u64,
    /// Live stream connections.
    pub connections: usize,
    /// Connection limit.
    pub max_connections: usize,
    /// State of the sampler breaker.
    pub sampler_circuit: CircuitState,
    /// Engine counters.
    pub metrics: MetricsSnapshot,
    /// Shared breakers, sorted by name. Per-connection delivery breakers are omitted.
    pub breakers: Vec<CircuitBreakerStats>,
}
