//! Single-retry policy around external calls.
//!
//! One attempt, one retry after a fixed delay when the failure is transient,
//! then either a substitute value or the error. No backoff ladder: a stalled
//! call costs the meeting at most one delay.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::llm::GenerationError;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Failure classification used to decide whether a retry is worth it.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for GenerationError {
    fn is_transient(&self) -> bool {
        GenerationError::is_transient(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAY)
    }
}

impl RetryPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op`, retrying once on a transient failure. The last error is
    /// returned unchanged.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: Transient + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let first = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !first.is_transient() {
            warn!("{} failed: {}", label, first);
            return Err(first);
        }

        warn!(
            "{} failed ({}), retrying in {}s",
            label,
            first,
            self.delay.as_secs_f32()
        );
        sleep(self.delay).await;

        match op().await {
            Ok(value) => {
                info!("{} succeeded on retry", label);
                Ok(value)
            }
            Err(e) => {
                warn!("{} failed again: {}", label, e);
                Err(e)
            }
        }
    }

    /// Like [`RetryPolicy::run`], but a failure that survives the policy is
    /// turned into a substitute value by `fallback`.
    pub async fn run_or_else<T, E, F, Fut, G>(&self, label: &str, op: F, fallback: G) -> T
    where
        E: Transient + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce(&E) -> T,
    {
        match self.run(label, op).await {
            Ok(value) => value,
            Err(e) => {
                info!("{} using fallback", label);
                fallback(&e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let calls = &AtomicUsize::new(0);
        let result: Result<&str, GenerationError> = policy()
            .run("test", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("ok")
            })
            .await;
        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_success_beats_fallback() {
        let calls = &AtomicUsize::new(0);
        let value = policy()
            .run_or_else(
                "test",
                || async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(GenerationError::RateLimited)
                    } else {
                        Ok("second".to_string())
                    }
                },
                |_| "fallback".to_string(),
            )
            .await;
        assert_eq!(value, "second");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_failure_propagates_unchanged() {
        let calls = &AtomicUsize::new(0);
        let result: Result<(), GenerationError> = policy()
            .run("test", || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(GenerationError::Unavailable(format!("attempt {n}")))
            })
            .await;
        assert_eq!(
            result,
            Err(GenerationError::Unavailable("attempt 1".to_string()))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_transient_skips_retry() {
        let calls = &AtomicUsize::new(0);
        let result: Result<(), GenerationError> = policy()
            .run("test", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GenerationError::InvalidRequest("bad".to_string()))
            })
            .await;
        assert!(matches!(result, Err(GenerationError::InvalidRequest(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_transient_goes_to_fallback() {
        let calls = &AtomicUsize::new(0);
        let value = policy()
            .run_or_else(
                "test",
                || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<String, _>(GenerationError::Authentication("key".to_string()))
                },
                |e| format!("fallback after {e}"),
            )
            .await;
        assert_eq!(value, "fallback after authentication failed: key");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallback_after_two_transient_failures() {
        let calls = &AtomicUsize::new(0);
        let value = policy()
            .run_or_else(
                "test",
                || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<u8, _>(GenerationError::EmptyResult)
                },
                |_| 3,
            )
            .await;
        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_waits_configured_delay_before_retry() {
        let policy = RetryPolicy::new(Duration::from_millis(40));
        let calls = &AtomicUsize::new(0);
        let start = std::time::Instant::now();
        let _: Result<(), GenerationError> = policy
            .run("test", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GenerationError::RateLimited)
            })
            .await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_default_delay() {
        assert_eq!(RetryPolicy::default().delay(), Duration::from_secs(10));
    }
}
