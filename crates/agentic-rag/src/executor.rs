//! Bounded retry with backoff for calls that can fail transiently
//!
//! Only errors classified as transient are retried. Input faults surface on
//! the first attempt. Every wait honours the caller's cancellation token.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// How often and how patiently an operation is retried
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
    max_backoff: Duration,
    exponential: bool,
    attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Fixed backoff between at most `max_attempts` tries. Zero attempts is rejected.
    pub fn new(max_attempts: u32, backoff: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(Error::invalid_field(
                "max_attempts",
                "max_attempts must be at least 1",
            ));
        }
        Ok(Self {
            max_attempts,
            backoff,
            max_backoff: backoff,
            exponential: false,
            attempt_timeout: None,
        })
    }

    /// A single attempt, no waiting
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            exponential: false,
            attempt_timeout: None,
        }
    }

    /// Cap for exponential growth. Never below the base backoff.
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff.max(self.backoff);
        self
    }

    /// Double the wait after each failed attempt
    pub fn with_exponential(mut self, exponential: bool) -> Self {
        self.exponential = exponential;
        self
    }

    /// Give up on a single attempt after `timeout`, counting it as transient
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }

    /// Wait after the `attempt`-th failure (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if !self.exponential {
            return self.backoff;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of attempts.
///
/// Exhaustion yields one `RetriesExhausted` error carrying the last cause.
/// Cancellation interrupts both the attempt and the wait.
pub async fn run_with_retry<T, F, Fut>(
    name: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(name.to_string()));
        }
        attempt += 1;
        tracing::debug!("{}: attempt {}/{}", name, attempt, policy.max_attempts);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled(name.to_string())),
            result = run_attempt(name, policy.attempt_timeout, operation()) => result,
        };

        let err = match outcome {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("{} succeeded on attempt {}/{}", name, attempt, policy.max_attempts);
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => err,
        };

        if attempt >= policy.max_attempts {
            tracing::warn!("{} failed after {} attempt(s): {}", name, attempt, err);
            return Err(Error::RetriesExhausted {
                operation: name.to_string(),
                attempts: attempt,
                source: Box::new(err),
            });
        }

        let delay = policy.delay_for(attempt);
        tracing::warn!(
            "{} failed (attempt {}/{}), retrying in {:?}: {}",
            name,
            attempt,
            policy.max_attempts,
            delay,
            err
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled(name.to_string())),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn run_attempt<T, Fut>(name: &str, timeout: Option<Duration>, attempt: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, attempt)
            .await
            .map_err(|_| Error::Timeout(format!("{} exceeded {:?}", name, limit)))?,
        None => attempt.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1)).unwrap()
    }

    #[test]
    fn test_policy_rejects_zero_attempts() {
        let err = RetryPolicy::new(0, Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100))
            .unwrap()
            .with_exponential(true)
            .with_max_backoff(Duration::from_millis(350));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for(40), Duration::from_millis(350));

        let fixed = RetryPolicy::new(3, Duration::from_millis(100)).unwrap();
        assert_eq!(fixed.delay_for(3), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_succeeds_on_last_attempt() {
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;
        let cancel = CancellationToken::new();

        let value = run_with_retry("flaky", &fast(4), &cancel, move || async move {
            let n = calls_ref.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 4 {
                Err(Error::Connection("refused".into()))
            } else {
                Ok(n)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_exhaustion_yields_single_error() {
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;
        let cancel = CancellationToken::new();

        let err = run_with_retry("always-down", &fast(3), &cancel, move || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::Timeout("store".into()))
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            Error::RetriesExhausted {
                operation,
                attempts,
                source,
            } => {
                assert_eq!(operation, "always-down");
                assert_eq!(attempts, 3);
                assert!(matches!(*source, Error::Timeout(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_input_faults_are_not_retried() {
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;
        let cancel = CancellationToken::new();

        let err = run_with_retry("lookup", &fast(5), &cancel, move || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::not_found("Conversation", "abc"))
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_attempt_timeout_counts_as_transient() {
        let policy = fast(2).with_attempt_timeout(Duration::from_millis(20));
        let cancel = CancellationToken::new();

        let err = run_with_retry("slow", &policy, &cancel, || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::RetriesExhausted { attempts: 2, .. }));
        assert_eq!(err.user_message(), "Request timed out. Please try again.");
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let calls = AtomicU32::new(0);
        let calls_ref = &calls;
        let err = run_with_retry("never", &fast(3), &cancel, move || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Cancelled(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let policy = RetryPolicy::new(3, Duration::from_secs(60)).unwrap();
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let counter = Arc::clone(&calls);
        let started = std::time::Instant::now();
        let err = run_with_retry("waiting", &policy, &cancel, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Connection("down".into()))
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Cancelled(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
