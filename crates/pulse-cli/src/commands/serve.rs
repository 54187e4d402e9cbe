//! Start the Pulse server.

use clap::Args;
use tracing::info;

use pulse_core::error::AppError;

/// Arguments for the serve command
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Override the server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Override the server host
    #[arg(long)]
    pub host: Option<String>,

    /// Override the broadcast interval in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

/// Execute the serve command
pub async fn execute(args: &ServeArgs, config_path: Option<&str>) -> Result<(), AppError> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ref host) = args.host {
        config.server.host = host.clone();
    }
    if let Some(interval) = args.interval_ms {
        config.realtime.broadcast_interval_ms = interval;
    }

    info!(
        host = %config.server.host,
        port = config.server.port,
        interval_ms = config.realtime.broadcast_interval_ms,
        "Serve overrides applied"
    );

    println!("Starting Pulse server...");
    println!("  Host: {}", config.server.host);
    println!("  Port: {}", config.server.port);
    println!("  Interval: {} ms", config.realtime.broadcast_interval_ms);

    pulse_api::run_server(config, pulse_api::shutdown_signal()).await
}
