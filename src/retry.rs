use std::future::Future;
use std::time::Duration;

use crate::error::AnalysisError;

/// Whole-run retry policy: exponential backoff between attempts, an extra
/// pause after rate limiting, and no retries for fatal errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub rate_limit_pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(4),
            max_backoff: Duration::from_secs(10),
            rate_limit_pause: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// No waiting at all; for tests and offline runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            rate_limit_pause: Duration::ZERO,
        }
    }

    /// Delay after the given (1-based) failed attempt: 4, 8, 10, 10, ...
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails fatally, or the attempt budget is
    /// spent. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, AnalysisError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AnalysisError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                tracing::warn!(attempt, kind = err.kind().label(), error = %err, "run failed; not retrying");
                return Err(err);
            }

            if attempt >= max_attempts {
                tracing::error!(attempts = attempt, error = %err, "run retry budget exhausted");
                return Err(AnalysisError::RunExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let backoff = self.backoff_for(attempt);
            tracing::warn!(
                attempt,
                max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                kind = err.kind().label(),
                error = %err,
                "run failed; retrying"
            );

            if err.is_rate_limited() && !self.rate_limit_pause.is_zero() {
                tracing::info!(
                    pause_ms = self.rate_limit_pause.as_millis() as u64,
                    "rate limited; pausing before retry"
                );
                tokio::time::sleep(self.rate_limit_pause).await;
            }
            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn backoff_doubles_from_four_and_caps_at_ten() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_secs(4));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(8));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(10));
        assert_eq!(policy.backoff_for(30), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn transient_failures_exhaust_after_three_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = RetryPolicy::immediate(3)
            .run(move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AnalysisError::CapabilityTransient("429".to_string()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(AnalysisError::RunExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, AnalysisError::CapabilityTransient(_)));
            }
            other => panic!("expected RunExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fatal_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = RetryPolicy::immediate(3)
            .run(move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AnalysisError::CapabilityFatal("credit balance is too low".to_string()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(AnalysisError::CapabilityFatal(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_attempts_pause_before_each_backoff() {
        let started = Instant::now();
        let result: Result<(), _> = RetryPolicy::default()
            .run(|_| async { Err(AnalysisError::CapabilityTransient("429".to_string())) })
            .await;

        assert!(matches!(
            result,
            Err(AnalysisError::RunExhausted { attempts: 3, .. })
        ));
        // pause + 4s, then pause + 8s; nothing after the final attempt.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(60 + 4 + 60 + 8), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(60 + 4 + 60 + 8 + 1), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn generic_failures_only_back_off() {
        let started = Instant::now();
        let result: Result<(), _> = RetryPolicy::default()
            .run(|_| async { Err(AnalysisError::CapabilityFailed("reset".to_string())) })
            .await;

        assert!(matches!(
            result,
            Err(AnalysisError::RunExhausted { attempts: 3, .. })
        ));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(4 + 8), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(4 + 8 + 1), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_failures_return_without_waiting() {
        let started = Instant::now();
        let result: Result<(), _> = RetryPolicy::default()
            .run(|_| async { Err(AnalysisError::CapabilityFatal("billing".to_string())) })
            .await;

        assert!(matches!(result, Err(AnalysisError::CapabilityFatal(_))));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn recovers_when_a_later_attempt_succeeds() {
        let result = RetryPolicy::immediate(3)
            .run(|attempt| async move {
                if attempt < 2 {
                    Err(AnalysisError::CapabilityFailed("connection reset".to_string()))
                } else {
                    Ok(attempt)
                }
            })
            .await
            .expect("second attempt should succeed");
        assert_eq!(result, 2);
    }
}
