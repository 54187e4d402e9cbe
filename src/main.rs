//! Pulse Server: real-time system metrics over WebSocket.
//!
//! Main entry point that loads configuration, initialises logging and runs
//! the server until Ctrl+C or SIGTERM.

use tracing_subscriber::{EnvFilter, fmt};

use pulse_core::config::AppConfig;
use pulse_core::error::AppError;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    tracing::info!("Starting Pulse v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = pulse_api::run_server(config, pulse_api::shutdown_signal()).await {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }
}

/// Load configuration from `PULSE_CONFIG`, or the layered files for `PULSE_ENV`.
fn load_configuration() -> Result<AppConfig, AppError> {
    match std::env::var("PULSE_CONFIG") {
        Ok(path) => AppConfig::from_file(&path),
        Err(_) => {
            let env = std::env::var("PULSE_ENV").unwrap_or_else(|_| "development".to_string());
            AppConfig::load(&env)
        }
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}
