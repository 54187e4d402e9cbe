//! Connection authentication. Resolves the token offered with the upgrade request.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use pulse_core::traits::Authenticator;
use pulse_core::types::Principal;
use pulse_resilience::Failure;

use crate::metrics::EngineMetrics;

/// Authenticates stream connections through the configured [`Authenticator`].
#[derive(Clone)]
pub struct WsAuthenticator {
    inner: Arc<dyn Authenticator>,
    handshake_timeout: Duration,
    metrics: Arc<EngineMetrics>,
}

impl std::fmt::Debug for WsAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsAuthenticator")
            .field("handshake_timeout", &self.handshake_timeout)
            .finish()
    }
}

/// Picks the token from the `token` query parameter, falling back to an
/// `Authorization: Bearer` header value.
pub fn extract_token(query_token: Option<&str>, authorization: Option<&str>) -> Option<String> {
    if let Some(token) = query_token.map(str::trim).filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }
    authorization
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

impl WsAuthenticator {
    /// Creates a new WebSocket authenticator.
    pub fn new(
        inner: Arc<dyn Authenticator>,
        handshake_timeout: Duration,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            inner,
            handshake_timeout,
            metrics,
        }
    }

    /// Resolve `token` to a principal within the handshake timeout.
    ///
    /// A missing token is an [`Failure::AuthFailure`]; so is any rejection
    /// by the underlying authenticator.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<Principal, Failure> {
        let result = self.resolve(token).await;
        match &result {
            Ok(principal) => info!(
                user_id = %principal.user_id,
                username = %principal.username,
                "Connection authenticated"
            ),
            Err(failure) => {
                EngineMetrics::inc(&self.metrics.auth_failures);
                warn!(error = %failure, "Connection authentication failed");
            }
        }
        result
    }

    async fn resolve(&self, token: Option<&str>) -> Result<Principal, Failure> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Failure::AuthFailure("Missing authentication token".into()))?;

        match tokio::time::timeout(self.handshake_timeout, self.inner.authenticate(token)).await {
            Ok(Ok(principal)) => Ok(principal),
            Ok(Err(e)) => Err(Failure::AuthFailure(e.message)),
            Err(_) => Err(Failure::Timeout(self.handshake_timeout)),
        }
    }
}
