//! # pulse-auth
//!
//! Token handling for metrics stream connections.
//!
//! - `jwt`: HS256 token creation and validation
//! - `authenticator`: the [`pulse_core::traits::Authenticator`] implementation

pub mod authenticator;
pub mod jwt;

pub use authenticator::JwtAuthenticator;
pub use jwt::{Claims, IssuedToken, JwtDecoder, JwtEncoder};
