//! # pulse-resilience
//!
//! Failure containment primitives shared by the broadcast layer:
//!
//! - [`circuit_breaker`]: per-resource Closed/Open/HalfOpen state machines
//! - [`backpressure`]: bounded FIFO buffers with an overflow policy
//! - [`recovery`]: failure classification and the recovery decision table

pub mod backpressure;
pub mod circuit_breaker;
pub mod recovery;

pub use backpressure::{BackpressureHandler, BackpressureState, OfferOutcome, OverflowPolicy};
pub use circuit_breaker::{
    BreakerPermit, CallError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry,
    CircuitBreakerStats, CircuitOpenError, CircuitState,
};
pub use recovery::{
    ErrorContext, ErrorKind, Failure, RecoveryAction, RecoveryPolicy, RetryError, Severity,
    retry_with_policy,
};
