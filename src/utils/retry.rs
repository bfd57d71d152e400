//! Bounded retry with a fixed backoff
//!
//! A single loop with a decrementing budget. Only errors the caller's
//! predicate marks retryable are retried; anything else ends the loop at once.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,

    /// Fixed delay before each retry
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }
}

/// Tagged result of a retried operation
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// Operation succeeded; `attempts` counts every call made
    Succeeded { value: T, attempts: u32 },
    /// Every attempt failed with a retryable error
    Exhausted { error: E, attempts: u32 },
    /// A non-retryable error stopped the loop
    Terminal { error: E, attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Terminal { attempts, .. } => *attempts,
        }
    }
}

/// Execute an operation, retrying while `should_retry` accepts the error
///
/// # Example
///
/// ```no_run
/// use shelf_rotation::utils::retry::{retry_if, RetryOutcome, RetryPolicy};
///
/// # async fn example() {
/// let outcome = retry_if(
///     &RetryPolicy::default(),
///     || async { Ok::<_, String>(42) },
///     |e: &String| e.contains("429"),
/// )
/// .await;
/// assert!(matches!(outcome, RetryOutcome::Succeeded { value: 42, .. }));
/// # }
/// ```
pub async fn retry_if<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    mut operation: F,
    should_retry: P,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut budget = policy.max_retries;
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    debug!(attempts, "Operation succeeded after retry");
                }
                return RetryOutcome::Succeeded { value, attempts };
            }
            Err(error) if !should_retry(&error) => {
                return RetryOutcome::Terminal { error, attempts };
            }
            Err(error) if budget == 0 => {
                warn!(attempts, error = %error, "Retry budget exhausted");
                return RetryOutcome::Exhausted { error, attempts };
            }
            Err(error) => {
                budget -= 1;
                debug!(
                    attempts,
                    remaining = budget,
                    delay_ms = policy.backoff.as_millis() as u64,
                    error = %error,
                    "Retrying operation after delay"
                );
                if !policy.backoff.is_zero() {
                    tokio::time::sleep(policy.backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let outcome = retry_if(&fast(3), || async { Ok::<_, String>(42) }, |_| true).await;
        assert!(matches!(outcome, RetryOutcome::Succeeded { value: 42, attempts: 1 }));
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let outcome = retry_if(
            &fast(3),
            move || {
                let calls = Arc::clone(&calls_clone);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("429".to_string())
                    } else {
                        Ok(7)
                    }
                }
            },
            |e| e == "429",
        )
        .await;

        assert_eq!(outcome.attempts(), 3);
        assert!(matches!(outcome, RetryOutcome::Succeeded { value: 7, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted_counts_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let outcome: RetryOutcome<(), String> = retry_if(
            &fast(3),
            move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async { Err("429".to_string()) }
            },
            |_| true,
        )
        .await;

        assert!(matches!(outcome, RetryOutcome::Exhausted { attempts: 4, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_terminal_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let outcome: RetryOutcome<(), String> = retry_if(
            &fast(3),
            move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async { Err("validation".to_string()) }
            },
            |e| e == "429",
        )
        .await;

        assert!(matches!(outcome, RetryOutcome::Terminal { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_applied_between_attempts() {
        let policy = RetryPolicy::new(2, Duration::from_secs(2));
        let start = tokio::time::Instant::now();

        let outcome: RetryOutcome<(), String> =
            retry_if(&policy, || async { Err("429".to_string()) }, |_| true).await;

        assert_eq!(outcome.attempts(), 3);
        assert!(start.elapsed() >= Duration::from_secs(4));
    }
}
