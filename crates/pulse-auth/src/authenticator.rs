//! JWT-backed [`Authenticator`].

use async_trait::async_trait;
use tracing::debug;

use pulse_core::config::AuthConfig;
use pulse_core::result::AppResult;
use pulse_core::traits::Authenticator;
use pulse_core::types::Principal;

use crate::jwt::JwtDecoder;

/// Resolves bearer tokens by validating them as HS256 JWTs.
#[derive(Debug, Clone)]
pub struct JwtAuthenticator {
    decoder: JwtDecoder,
}

impl JwtAuthenticator {
    /// Creates an authenticator from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            decoder: JwtDecoder::new(config),
        }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, token: &str) -> AppResult<Principal> {
        let claims = self.decoder.decode(token)?;
        debug!(user_id = %claims.sub, username = %claims.username, "Token accepted");
        Ok(claims.principal())
    }
}
