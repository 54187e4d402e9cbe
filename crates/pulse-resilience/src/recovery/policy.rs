//! The recovery decision table.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use pulse_core::config::RetryConfig;

use super::failure::Failure;

/// Failure category after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Retryable I/O failure or timeout.
    Transient,
    /// A buffer or limit was full.
    ResourceExhausted,
    /// Credentials were rejected.
    PermissionDenied,
    /// Malformed input from a peer.
    InvalidInput,
    /// A circuit breaker is rejecting calls.
    Unavailable,
    /// Not recognised.
    Unknown,
}

/// How bad a failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A classified failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub error_kind: ErrorKind,
    pub severity: Severity,
    /// Component that observed the failure, e.g. `metrics_sampler`.
    pub source_component: String,
    pub timestamp: DateTime<Utc>,
    /// Retries already made for this operation.
    pub retry_count: u32,
    pub message: String,
}

/// What to do about a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Try again after the given delay.
    Retry(Duration),
    /// Retries are exhausted: open the resource's circuit breaker and escalate.
    OpenCircuit,
    /// Discard the work item and record the drop.
    DropAndLog,
    /// Report at error level for operator attention.
    Escalate,
}

impl RecoveryAction {
    /// Whether the action is reported at error level for operator attention.
    ///
    /// Exhausted retries ([`OpenCircuit`](Self::OpenCircuit)) escalate as well.
    pub fn is_escalation(&self) -> bool {
        matches!(self, Self::OpenCircuit | Self::Escalate)
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retry(delay) => write!(f, "retry({}ms)", delay.as_millis()),
            Self::OpenCircuit => write!(f, "open_circuit"),
            Self::DropAndLog => write!(f, "drop_and_log"),
            Self::Escalate => write!(f, "escalate"),
        }
    }
}

/// Bounded exponential backoff and the classification/decision table.
///
/// `decide` is a pure function of its input, so the same context always
/// yields the same action.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryPolicy {
    max_attempts: u32,
    base_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

impl RecoveryPolicy {
    /// Build from configuration.
    pub fn new(config: &RetryConfig) -> Self {
        let base_backoff = Duration::from_millis(config.base_backoff_ms);
        Self {
            max_attempts: config.max_attempts,
            base_backoff,
            max_backoff: Duration::from_millis(config.max_backoff_ms).max(base_backoff),
            multiplier: if config.multiplier.is_finite() && config.multiplier >= 1.0 {
                config.multiplier
            } else {
                1.0
            },
        }
    }

    /// Retries allowed after the first failure.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Classify `failure` seen by `source_component` after `retry_count` retries.
    pub fn classify(&self, failure: &Failure, source_component: &str, retry_count: u32) -> ErrorContext {
        let (error_kind, severity) = match failure {
            Failure::AuthFailure(_) => (ErrorKind::PermissionDenied, Severity::Medium),
            Failure::TransientIo(_) | Failure::Timeout(_) => {
                let severity = if retry_count == 0 {
                    Severity::Low
                } else if retry_count < self.max_attempts {
                    Severity::Medium
                } else {
                    Severity::High
                };
                (ErrorKind::Transient, severity)
            }
            Failure::CapacityExceeded(_) => (ErrorKind::ResourceExhausted, Severity::Low),
            Failure::ProtocolViolation(_) => (ErrorKind::InvalidInput, Severity::Medium),
            Failure::CircuitOpen(_) => (ErrorKind::Unavailable, Severity::Medium),
            Failure::Unclassified(_) => (ErrorKind::Unknown, Severity::High),
            Failure::TaskPanicked(_) => (ErrorKind::Unknown, Severity::Critical),
        };

        ErrorContext {
            error_kind,
            severity,
            source_component: source_component.to_string(),
            timestamp: Utc::now(),
            retry_count,
            message: failure.to_string(),
        }
    }

    /// Map a classified failure to exactly one action.
    pub fn decide(&self, ctx: &ErrorContext) -> RecoveryAction {
        if ctx.severity == Severity::Critical {
            return RecoveryAction::Escalate;
        }
        match ctx.error_kind {
            ErrorKind::Transient if ctx.retry_count < self.max_attempts => {
                RecoveryAction::Retry(self.backoff(ctx.retry_count))
            }
            ErrorKind::Transient => RecoveryAction::OpenCircuit,
            ErrorKind::ResourceExhausted
            | ErrorKind::PermissionDenied
            | ErrorKind::InvalidInput
            | ErrorKind::Unavailable => RecoveryAction::DropAndLog,
            ErrorKind::Unknown => RecoveryAction::Escalate,
        }
    }

    /// Delay before retry number `retry_count + 1`.
    ///
    /// `base * multiplier^retry_count`, capped at the configured maximum.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let millis = self.base_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let cap = self.max_backoff.as_millis() as f64;
        if !millis.is_finite() || millis >= cap {
            self.max_backoff
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    /// Emit the structured log event for a decision.
    pub fn report(&self, ctx: &ErrorContext, action: &RecoveryAction) {
        match action {
            RecoveryAction::Retry(_) => debug!(
                component = %ctx.source_component,
                kind = ?ctx.error_kind,
                severity = ?ctx.severity,
                retry_count = ctx.retry_count,
                action = %action,
                "{}", ctx.message
            ),
            RecoveryAction::DropAndLog => warn!(
                component = %ctx.source_component,
                kind = ?ctx.error_kind,
                severity = ?ctx.severity,
                retry_count = ctx.retry_count,
                action = %action,
                "{}", ctx.message
            ),
            RecoveryAction::OpenCircuit | RecoveryAction::Escalate => error!(
                component = %ctx.source_component,
                kind = ?ctx.error_kind,
                severity = ?ctx.severity,
                retry_count = ctx.retry_count,
                action = %action,
                escalated = true,
                "{}", ctx.message
            ),
        }
    }

    /// Classify, decide, and report in one step.
    pub fn handle(&self, failure: &Failure, source_component: &str, retry_count: u32) -> (ErrorContext, RecoveryAction) {
        let ctx = self.classify(failure, source_component, retry_count);
        let action = self.decide(&ctx);
        self.report(&ctx, &action);
        (ctx, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitOpenError, CircuitState};

    fn policy() -> RecoveryPolicy {
        RecoveryPolicy::new(&RetryConfig {
            max_attempts: 3,
            base_backoff_ms: 100,
            max_backoff_ms: 1000,
            multiplier: 2.0,
        })
    }

    fn decide(failure: Failure, retry_count: u32) -> RecoveryAction {
        let p = policy();
        p.decide(&p.classify(&failure, "test", retry_count))
    }

    #[test]
    fn test_transient_retries_then_escalates_with_open_circuit() {
        let io = || Failure::TransientIo("reset".into());
        assert_eq!(decide(io(), 0), RecoveryAction::Retry(Duration::from_millis(100)));
        assert_eq!(decide(io(), 1), RecoveryAction::Retry(Duration::from_millis(200)));
        assert_eq!(decide(io(), 2), RecoveryAction::Retry(Duration::from_millis(400)));

        let exhausted = decide(io(), 3);
        assert_eq!(exhausted, RecoveryAction::OpenCircuit);
        assert!(exhausted.is_escalation());
        assert_eq!(
            decide(Failure::Timeout(Duration::from_secs(1)), 3),
            RecoveryAction::OpenCircuit
        );
    }

    #[test]
    fn test_only_exhausted_or_unknown_failures_escalate() {
        let io = Failure::TransientIo("reset".into());
        assert!(!decide(io.clone(), 0).is_escalation());
        assert!(decide(io, 3).is_escalation());
        assert!(!decide(Failure::CapacityExceeded("x".into()), 0).is_escalation());
        assert!(decide(Failure::Unclassified("?".into()), 0).is_escalation());
    }

    #[test]
    fn test_non_retryable_kinds_drop() {
        assert_eq!(decide(Failure::AuthFailure("x".into()), 0), RecoveryAction::DropAndLog);
        assert_eq!(decide(Failure::CapacityExceeded("x".into()), 0), RecoveryAction::DropAndLog);
        assert_eq!(decide(Failure::ProtocolViolation("x".into()), 0), RecoveryAction::DropAndLog);
        let open = Failure::CircuitOpen(CircuitOpenError {
            name: "sampler".into(),
            state: CircuitState::Open,
            retry_in: Duration::from_secs(1),
        });
        assert_eq!(decide(open, 0), RecoveryAction::DropAndLog);
    }

    #[test]
    fn test_unknown_and_critical_escalate() {
        assert_eq!(decide(Failure::Unclassified("?".into()), 0), RecoveryAction::Escalate);
        assert_eq!(decide(Failure::TaskPanicked("boom".into()), 0), RecoveryAction::Escalate);
    }

    #[test]
    fn test_critical_severity_overrides_kind() {
        let p = policy();
        let mut ctx = p.classify(&Failure::TransientIo("x".into()), "test", 0);
        ctx.severity = Severity::Critical;
        assert_eq!(p.decide(&ctx), RecoveryAction::Escalate);
    }

    #[test]
    fn test_transient_severity_grows_with_retries() {
        let p = policy();
        let io = Failure::TransientIo("x".into());
        assert_eq!(p.classify(&io, "c", 0).severity, Severity::Low);
        assert_eq!(p.classify(&io, "c", 2).severity, Severity::Medium);
        assert_eq!(p.classify(&io, "c", 3).severity, Severity::High);
    }

    #[test]
    fn test_decide_is_deterministic() {
        let p = policy();
        let ctx = p.classify(&Failure::TransientIo("x".into()), "c", 1);
        assert_eq!(p.decide(&ctx), p.decide(&ctx.clone()));
    }

    #[test]
    fn test_backoff_is_capped() {
        let p = policy();
        assert_eq!(p.backoff(4), Duration::from_millis(1000));
        assert_eq!(p.backoff(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn test_sub_unit_multiplier_is_clamped() {
        let p = RecoveryPolicy::new(&RetryConfig {
            max_attempts: 2,
            base_backoff_ms: 50,
            max_backoff_ms: 500,
            multiplier: 0.1,
        });
        assert_eq!(p.backoff(3), Duration::from_millis(50));
    }
}
