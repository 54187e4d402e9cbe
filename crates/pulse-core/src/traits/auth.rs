//! Authentication collaborator.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::Principal;

/// Resolves a bearer token to a principal.
///
/// Called exactly once per connection attempt, before registration.
/// An invalid or expired token is reported as an `Authentication` error.
#[async_trait]
pub trait Authenticator: Send + Sync + std::fmt::Debug + 'static {
    /// Validate `token` and return the principal it identifies.
    async fn authenticate(&self, token: &str) -> AppResult<Principal>;
}
