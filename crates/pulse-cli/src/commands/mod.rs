//! CLI command definitions and dispatch.

pub mod config;
pub mod serve;
pub mod status;
pub mod token;
pub mod watch;

use clap::{Parser, Subcommand};

use pulse_core::config::AppConfig;
use pulse_core::error::AppError;

use crate::output::OutputFormat;

/// Pulse: real-time system metrics over WebSocket
#[derive(Debug, Parser)]
#[command(name = "pulse", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file; defaults to `config/default` plus the `PULSE_ENV` overlay
    #[arg(short, long)]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the Pulse server
    Serve(serve::ServeArgs),
    /// Mint access tokens
    Token(token::TokenArgs),
    /// Stream live metrics from a server
    Watch(watch::WatchArgs),
    /// Show server health and breaker states
    Status(status::StatusArgs),
    /// Configuration management
    Config(config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let config_path = self.config.as_deref();
        match &self.command {
            Commands::Serve(args) => serve::execute(args, config_path).await,
            Commands::Token(args) => token::execute(args, config_path, self.format).await,
            Commands::Watch(args) => watch::execute(args, self.format).await,
            Commands::Status(args) => status::execute(args, self.format).await,
            Commands::Config(args) => config::execute(args, config_path, self.format).await,
        }
    }
}

/// Helper: load configuration from an explicit file or the environment layers
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig, AppError> {
    match config_path {
        Some(path) => AppConfig::from_file(path),
        None => {
            let env = std::env::var("PULSE_ENV").unwrap_or_else(|_| "development".to_string());
            AppConfig::load(&env)
        }
    }
}
