//! Metric sampling collaborator.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::Snapshot;

/// Produces a fresh [`Snapshot`] of system resource usage on demand.
///
/// Called once per broadcast tick. Callers bound the call with their own
/// deadline, so implementations need not enforce one.
#[async_trait]
pub trait MetricsSampler: Send + Sync + std::fmt::Debug + 'static {
    /// Take one sample.
    async fn sample(&self) -> AppResult<Snapshot>;
}
