//! Circuit breakers guarding unreliable collaborators.

pub mod breaker;
pub mod registry;

pub use breaker::{
    BreakerPermit, CallError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats,
    CircuitOpenError, CircuitState,
};
pub use registry::CircuitBreakerRegistry;
