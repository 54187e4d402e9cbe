//! Single-resource circuit breaker.
//!
//! A breaker starts `Closed`. Each failure increments a consecutive-failure
//! counter and once it reaches `max_failures` the breaker moves to `Open`,
//! rejecting calls without touching the resource. After `reset_timeout` has
//! elapsed since the last failure, the next call attempt moves it to
//! `HalfOpen` and is admitted as the single probe; its success closes the
//! breaker, its failure re-opens it.

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use pulse_core::config::BreakerSettings;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow through and failures are counted.
    Closed,
    /// Calls are rejected until the reset timeout elapses.
    Open,
    /// One probe call is in flight.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Thresholds for one breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    pub max_failures: u32,
    /// How long the breaker stays open after the last failure.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::from(&BreakerSettings::default())
    }
}

impl From<&BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &BreakerSettings) -> Self {
        Self {
            max_failures: settings.max_failures.max(1),
            reset_timeout: settings.reset_timeout(),
        }
    }
}

/// Returned when a call is rejected without reaching the resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit '{name}' is {state}, retry in {retry_in:?}")]
pub struct CircuitOpenError {
    /// Breaker name.
    pub name: String,
    /// State at rejection time (`Open`, or `HalfOpen` with a probe in flight).
    pub state: CircuitState,
    /// Time until a probe will be admitted.
    pub retry_in: Duration,
}

/// Error from [`CircuitBreaker::call`].
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The breaker rejected the call.
    #[error(transparent)]
    Open(CircuitOpenError),
    /// The call ran and failed.
    #[error("{0}")]
    Inner(E),
}

/// Point-in-time view of a breaker, used by health endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    /// Breaker name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures recorded.
    pub failure_count: u32,
    /// Failures that open the breaker.
    pub max_failures: u32,
    /// Open-state cool-down in milliseconds.
    pub reset_timeout_ms: u64,
    /// Milliseconds since the last recorded failure.
    pub last_failure_ms_ago: Option<u64>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    /// Bumped on every state change so permits issued under an older state
    /// cannot move the current one.
    generation: u64,
}

/// A circuit breaker for one named resource.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
                generation: 0,
            }),
        }
    }

    /// Breaker name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Breaker thresholds.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state.
    ///
    /// An open breaker whose timeout has elapsed still reports `Open` until
    /// the next call attempt moves it to `HalfOpen`.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Consecutive failures recorded.
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Ask to call the resource.
    ///
    /// The returned permit must be settled with [`BreakerPermit::success`] or
    /// [`BreakerPermit::failure`]; dropping it unsettled counts as a failure.
    pub fn try_acquire(&self) -> Result<BreakerPermit<'_>, CircuitOpenError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(BreakerPermit::new(self, inner.generation)),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_time
                    .map(|at| at.elapsed())
                    .unwrap_or(self.config.reset_timeout);
                if elapsed >= self.config.reset_timeout {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    debug!(breaker = %self.name, "Admitting half-open probe");
                    Ok(BreakerPermit::new(self, inner.generation))
                } else {
                    Err(CircuitOpenError {
                        name: self.name.clone(),
                        state: CircuitState::Open,
                        retry_in: self.config.reset_timeout - elapsed,
                    })
                }
            }
            CircuitState::HalfOpen => Err(CircuitOpenError {
                name: self.name.clone(),
                state: CircuitState::HalfOpen,
                retry_in: Duration::ZERO,
            }),
        }
    }

    /// Run `f` through the breaker, recording its outcome.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.try_acquire().map_err(CallError::Open)?;
        match f().await {
            Ok(value) => {
                permit.success();
                Ok(value)
            }
            Err(e) => {
                permit.failure();
                Err(CallError::Inner(e))
            }
        }
    }

    /// Force the breaker open, as if `max_failures` had just been reached.
    pub fn trip(&self) {
        let mut inner = self.lock();
        inner.failure_count = inner.failure_count.max(self.config.max_failures);
        inner.last_failure_time = Some(Instant::now());
        if inner.state != CircuitState::Open {
            self.transition(&mut inner, CircuitState::Open);
        }
    }

    /// Force the breaker closed and clear its failure count.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.failure_count = 0;
        inner.last_failure_time = None;
        if inner.state != CircuitState::Closed {
            self.transition(&mut inner, CircuitState::Closed);
        }
    }

    /// Snapshot for reporting.
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.lock();
        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            max_failures: self.config.max_failures,
            reset_timeout_ms: self.config.reset_timeout.as_millis() as u64,
            last_failure_ms_ago: inner
                .last_failure_time
                .map(|at| at.elapsed().as_millis() as u64),
        }
    }

    fn record_success(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }
        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.failure_count = 0;
                inner.last_failure_time = None;
                self.transition(&mut inner, CircuitState::Closed);
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_time = Some(Instant::now());
        match inner.state {
            CircuitState::Closed if inner.failure_count >= self.config.max_failures => {
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::HalfOpen => self.transition(&mut inner, CircuitState::Open),
            _ => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.generation = inner.generation.wrapping_add(1);
        if to == CircuitState::Open {
            warn!(
                breaker = %self.name,
                from = %from,
                to = %to,
                failure_count = inner.failure_count,
                "Circuit breaker opened"
            );
        } else {
            info!(
                breaker = %self.name,
                from = %from,
                to = %to,
                "Circuit breaker state transition"
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Admission to call a guarded resource once.
#[derive(Debug)]
#[must_use = "an unsettled permit counts as a failure when dropped"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl<'a> BreakerPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, generation: u64) -> Self {
        Self {
            breaker,
            generation,
            settled: false,
        }
    }

    /// The call succeeded.
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success(self.generation);
    }

    /// The call failed.
    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure(self.generation);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.record_failure(self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(max_failures: u32, reset_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                max_failures,
                reset_timeout: Duration::from_millis(reset_ms),
            },
        )
    }

    fn fail(b: &CircuitBreaker) {
        b.try_acquire().unwrap().failure();
    }

    #[test]
    fn test_opens_after_max_failures() {
        let b = breaker(3, 1000);
        fail(&b);
        fail(&b);
        assert_eq!(b.state(), CircuitState::Closed);
        fail(&b);
        assert_eq!(b.state(), CircuitState::Open);

        let err = b.try_acquire().unwrap_err();
        assert_eq!(err.state, CircuitState::Open);
        assert_eq!(err.name, "test");
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let b = breaker(3, 1000);
        fail(&b);
        fail(&b);
        b.try_acquire().unwrap().success();
        assert_eq!(b.failure_count(), 0);
        fail(&b);
        fail(&b);
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_success_closes() {
        let b = breaker(1, 500);
        fail(&b);
        assert!(b.try_acquire().is_err());

        tokio::time::advance(Duration::from_millis(500)).await;
        let probe = b.try_acquire().unwrap();
        assert_eq!(b.state(), CircuitState::HalfOpen);

        // Only one probe at a time.
        assert_eq!(b.try_acquire().unwrap_err().state, CircuitState::HalfOpen);

        probe.success();
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_failure_reopens_and_restarts_timer() {
        let b = breaker(1, 500);
        fail(&b);
        tokio::time::advance(Duration::from_millis(600)).await;

        b.try_acquire().unwrap().failure();
        assert_eq!(b.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(300)).await;
        let err = b.try_acquire().unwrap_err();
        assert_eq!(err.retry_in, Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_stays_open_until_next_attempt() {
        let b = breaker(1, 100);
        fail(&b);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(b.state(), CircuitState::Open);
        let _probe = b.try_acquire().unwrap();
        assert_eq!(b.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_dropped_permit_counts_as_failure() {
        let b = breaker(1, 1000);
        {
            let _permit = b.try_acquire().unwrap();
        }
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[test]
    fn test_stale_permit_does_not_move_new_state() {
        let b = breaker(1, 1000);
        let stale = b.try_acquire().unwrap();
        fail(&b);
        assert_eq!(b.state(), CircuitState::Open);
        stale.success();
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_call_records_outcome() {
        let b = breaker(2, 1000);
        let ok: Result<u32, CallError<&str>> = b.call(|| async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        for _ in 0..2 {
            let err = b.call(|| async { Err::<u32, _>("boom") }).await;
            assert!(matches!(err, Err(CallError::Inner("boom"))));
        }
        let rejected = b.call(|| async { Ok::<u32, &str>(1) }).await;
        assert!(matches!(rejected, Err(CallError::Open(_))));
    }

    #[test]
    fn test_trip_and_reset() {
        let b = breaker(5, 1000);
        b.trip();
        assert_eq!(b.state(), CircuitState::Open);
        assert_eq!(b.stats().failure_count, 5);
        b.reset();
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.try_acquire().is_ok());
    }
}
