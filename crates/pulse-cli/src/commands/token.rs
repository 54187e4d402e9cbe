//! Access token commands.

use clap::{Args, Subcommand};
use uuid::Uuid;

use pulse_auth::JwtEncoder;
use pulse_core::error::AppError;

use crate::output::{self, OutputFormat};

/// Arguments for token commands
#[derive(Debug, Args)]
pub struct TokenArgs {
    /// Token subcommand
    #[command(subcommand)]
    pub command: TokenCommand,
}

/// Token subcommands
#[derive(Debug, Subcommand)]
pub enum TokenCommand {
    /// Issue a token signed with the configured secret
    Issue {
        /// User ID; a random one is generated when omitted
        #[arg(long)]
        user_id: Option<Uuid>,
        /// Username carried in the token
        #[arg(short, long)]
        username: String,
        /// Lifetime in minutes; defaults to `auth.token_ttl_minutes`
        #[arg(long)]
        ttl_minutes: Option<i64>,
    },
}

/// Execute token commands
pub async fn execute(
    args: &TokenArgs,
    config_path: Option<&str>,
    format: OutputFormat,
) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let encoder = JwtEncoder::new(&config.auth);

    match &args.command {
        TokenCommand::Issue {
            user_id,
            username,
            ttl_minutes,
        } => {
            if username.trim().is_empty() {
                return Err(AppError::validation("Username must not be empty"));
            }
            let user_id = user_id.unwrap_or_else(Uuid::new_v4);
            let issued = match ttl_minutes {
                Some(minutes) if *minutes <= 0 => {
                    return Err(AppError::validation("TTL must be positive"));
                }
                Some(minutes) => encoder.issue_with_ttl(
                    user_id,
                    username,
                    chrono::Duration::minutes(*minutes),
                )?,
                None => encoder.issue(user_id, username)?,
            };

            match format {
                OutputFormat::Json => output::print_item(&issued, format),
                OutputFormat::Table => {
                    output::print_success(&format!("Token issued for '{username}'"));
                    output::print_kv("User ID", &user_id.to_string());
                    output::print_kv("Expires", &issued.expires_at.to_rfc3339());
                    println!("{}", issued.token);
                }
            }
        }
    }

    Ok(())
}
