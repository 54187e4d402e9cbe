//! Server health and breaker status.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use pulse_api::dto::response::{ApiResponse, DetailedHealthResponse};
use pulse_core::error::AppError;
use pulse_resilience::CircuitBreakerStats;

use crate::output::{self, OutputFormat};

/// Arguments for the status command
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Server base URL
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub url: String,
}

/// A breaker as a table row.
#[derive(Debug, Serialize, Tabled)]
pub struct BreakerRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "State")]
    pub state: String,
    #[tabled(rename = "Failures")]
    pub failures: String,
    #[tabled(rename = "Reset (ms)")]
    pub reset_timeout_ms: u64,
}

impl From<&CircuitBreakerStats> for BreakerRow {
    fn from(stats: &CircuitBreakerStats) -> Self {
        Self {
            name: stats.name.clone(),
            state: stats.state.to_string(),
            failures: format!("{}/{}", stats.failure_count, stats.max_failures),
            reset_timeout_ms: stats.reset_timeout_ms,
        }
    }
}

/// Execute the status command
pub async fn execute(args: &StatusArgs, format: OutputFormat) -> Result<(), AppError> {
    let url = format!("{}/api/health/detailed", args.url.trim_end_matches('/'));
    let response = reqwest::get(&url)
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| AppError::external_service(format!("Request to {url} failed: {e}")))?;
    let health = response
        .json::<ApiResponse<DetailedHealthResponse>>()
        .await
        .map_err(|e| AppError::external_service(format!("Unexpected response: {e}")))?
        .data;

    if format == OutputFormat::Json {
        output::print_item(&health, format);
        return Ok(());
    }

    output::print_kv("Status", &health.status);
    output::print_kv("Version", &health.version);
    output::print_kv("Uptime", &format!("{}s", health.uptime_seconds));
    output::print_kv(
        "Connections",
        &format!("{}/{}", health.connections, health.max_connections),
    );
    output::print_kv("Sampler circuit", &health.sampler_circuit.to_string());
    output::print_kv(
        "Ticks",
        &format!(
            "{} ({} skipped)",
            health.metrics.ticks_total, health.metrics.ticks_skipped
        ),
    );
    output::print_kv(
        "Deliveries",
        &format!(
            "{} ok, {} failed, {} dropped",
            health.metrics.deliveries_succeeded,
            health.metrics.deliveries_failed,
            health.metrics.messages_dropped
        ),
    );
    output::print_kv(
        "Evicted",
        &health.metrics.connections_evicted.to_string(),
    );
    println!();

    let rows: Vec<BreakerRow> = health.breakers.iter().map(BreakerRow::from).collect();
    output::print_list(&rows, format);
    Ok(())
}
