//! Sampler calls wrapped in a timeout, retries, and a circuit breaker.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use pulse_core::traits::MetricsSampler;
use pulse_core::types::Snapshot;
use pulse_resilience::{
    CircuitBreaker, CircuitBreakerRegistry, Failure, RecoveryAction, RecoveryPolicy, RetryError,
    retry_with_policy,
};

/// Component and breaker name of the sampler.
pub const SAMPLER_COMPONENT: &str = "metrics_sampler";

/// Produces at most one snapshot per call.
///
/// Each attempt must pass the `metrics_sampler` breaker and finish within the
/// sampling ceiling. Transient failures are retried with backoff. Exhausted
/// retries escalate with [`RecoveryAction::OpenCircuit`], and the breaker is
/// tripped so the following ticks are skipped without calling the sampler.
#[derive(Debug)]
pub struct GuardedSampler {
    sampler: Arc<dyn MetricsSampler>,
    breaker: Arc<CircuitBreaker>,
    policy: RecoveryPolicy,
    ceiling: Duration,
}

impl GuardedSampler {
    /// Wrap `sampler`, registering its breaker in `breakers`.
    pub fn new(
        sampler: Arc<dyn MetricsSampler>,
        breakers: &CircuitBreakerRegistry,
        policy: RecoveryPolicy,
        ceiling: Duration,
    ) -> Self {
        Self {
            sampler,
            breaker: breakers.get_or_create(SAMPLER_COMPONENT),
            policy,
            ceiling,
        }
    }

    /// The sampler's breaker.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Take a snapshot, or explain why this tick has none.
    pub async fn next_snapshot(&self) -> Result<Snapshot, RetryError> {
        let result = retry_with_policy(&self.policy, SAMPLER_COMPONENT, move |_| self.attempt()).await;

        if let Err(err) = &result {
            if err.action == RecoveryAction::OpenCircuit {
                self.breaker.trip();
            }
        }
        result
    }

    async fn attempt(&self) -> Result<Snapshot, Failure> {
        let permit = match self.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(open) => {
                debug!(retry_in_ms = open.retry_in.as_millis() as u64, "Sampler circuit open");
                return Err(Failure::CircuitOpen(open));
            }
        };

        match tokio::time::timeout(self.ceiling, self.sampler.sample()).await {
            Ok(Ok(snapshot)) => {
                permit.success();
                Ok(snapshot)
            }
            Ok(Err(e)) => {
                permit.failure();
                Err(Failure::from(e))
            }
            Err(_) => {
                permit.failure();
                Err(Failure::Timeout(self.ceiling))
            }
        }
    }
}
