//! Authenticated identity attached to a connection.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The identity an [`Authenticator`](crate::traits::Authenticator) vouches for.
///
/// A connection handle can only be built from a `Principal`, so the registry
/// never admits an unauthenticated connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// User ID.
    pub user_id: Uuid,
    /// Username (cached for logs).
    pub username: String,
}

impl Principal {
    /// Create a new principal.
    pub fn new(user_id: Uuid, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }
}
