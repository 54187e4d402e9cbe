//! Retry loop driven by the recovery policy.

use std::future::Future;

use thiserror::Error;

use super::failure::Failure;
use super::policy::{ErrorContext, RecoveryAction, RecoveryPolicy};

/// The operation gave up; carries the last failure and the decision.
#[derive(Debug, Clone, Error)]
#[error("{} gave up after {} retries ({action}): {failure}", context.source_component, context.retry_count)]
pub struct RetryError {
    pub failure: Failure,
    pub context: ErrorContext,
    /// The non-retry action the policy chose.
    pub action: RecoveryAction,
}

/// Run `op` until it succeeds or the policy stops retrying.
///
/// `op` receives the number of retries already made. Each failure is
/// classified and reported; only [`RecoveryAction::Retry`] loops.
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RecoveryPolicy,
    source_component: &str,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Failure>>,
{
    let mut retry_count = 0;
    loop {
        match op(retry_count).await {
            Ok(value) => return Ok(value),
            Err(failure) => {
                let (context, action) = policy.handle(&failure, source_component, retry_count);
                match action {
                    RecoveryAction::Retry(delay) => {
                        tokio::time::sleep(delay).await;
                        retry_count += 1;
                    }
                    _ => {
                        return Err(RetryError {
                            failure,
                            context,
                            action,
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use pulse_core::config::RetryConfig;

    use super::*;

    fn policy() -> RecoveryPolicy {
        RecoveryPolicy::new(&RetryConfig {
            max_attempts: 2,
            base_backoff_ms: 10,
            max_backoff_ms: 100,
            multiplier: 2.0,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_with_policy(&policy(), "sampler", |attempt| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if attempt < 2 {
                    Err(Failure::TransientIo("flaky".into()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_escalate() {
        let started = tokio::time::Instant::now();
        let err = retry_with_policy(&policy(), "sampler", |_| async {
            Err::<(), _>(Failure::Timeout(Duration::from_millis(5)))
        })
        .await
        .unwrap_err();
        assert_eq!(err.action, RecoveryAction::OpenCircuit);
        assert!(err.action.is_escalation());
        assert_eq!(err.context.retry_count, 2);
        // 10ms + 20ms of backoff.
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let calls = AtomicU32::new(0);
        let err = retry_with_policy(&policy(), "auth", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Failure::AuthFailure("expired".into())) }
        })
        .await
        .unwrap_err();
        assert_eq!(err.action, RecoveryAction::DropAndLog);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
