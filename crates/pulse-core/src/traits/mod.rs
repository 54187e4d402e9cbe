//! Collaborator traits defined in `pulse-core` and implemented by other crates.

pub mod auth;
pub mod sampler;

pub use auth::Authenticator;
pub use sampler::MetricsSampler;
