//! Configuration management CLI commands.

use clap::{Args, Subcommand};

use pulse_core::config::AppConfig;
use pulse_core::error::AppError;

use crate::output::{self, OutputFormat};

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (secrets masked)
    Show,
    /// Validate the configuration
    Validate,
}

/// Execute config commands
pub async fn execute(
    args: &ConfigArgs,
    config_path: Option<&str>,
    format: OutputFormat,
) -> Result<(), AppError> {
    match &args.command {
        ConfigCommand::Show => {
            let mut config = super::load_config(config_path)?;
            config.auth.jwt_secret = mask_secret(&config.auth.jwt_secret);
            output::print_item(&config, format);
        }
        ConfigCommand::Validate => match super::load_config(config_path) {
            Ok(config) => {
                output::print_success("Configuration is valid");
                output::print_kv(
                    "Server",
                    &format!("{}:{}", config.server.host, config.server.port),
                );
                output::print_kv(
                    "Broadcast interval",
                    &format!("{} ms", config.realtime.broadcast_interval_ms),
                );
                output::print_kv(
                    "Max connections",
                    &config.realtime.max_connections.to_string(),
                );
                if config.auth.jwt_secret == AppConfig::default().auth.jwt_secret {
                    output::print_warning("auth.jwt_secret is still the default value");
                }
            }
            Err(e) => {
                output::print_error(&format!("Configuration invalid: {e}"));
                return Err(e);
            }
        },
    }

    Ok(())
}

/// Keep only a short prefix of a secret for display.
fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(2).collect();
    format!("{visible}****")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("supersecret"), "su****");
        assert_eq!(mask_secret(""), "****");
    }
}
