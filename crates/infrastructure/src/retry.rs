//! Bounded-retry reconciliation for eventually-consistent control planes.

use std::future::Future;
use std::time::Duration;

use keygate_core::{AppError, AppResult};
use tokio::time::Instant;

/// Backoff schedule for one bounded retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    initial_delay: Duration,
    max_elapsed: Duration,
}

impl RetryPolicy {
    /// Creates a policy with an explicit initial delay and elapsed budget.
    #[must_use]
    pub fn new(initial_delay: Duration, max_elapsed: Duration) -> Self {
        Self {
            initial_delay,
            max_elapsed,
        }
    }

    /// Creates the adapters' standard policy: Fibonacci delays starting at
    /// one second within the given elapsed budget.
    #[must_use]
    pub fn fibonacci(max_elapsed: Duration) -> Self {
        Self::new(Duration::from_secs(1), max_elapsed)
    }
}

/// Retries an operation on retryable errors with Fibonacci backoff.
///
/// Errors the predicate rejects fail immediately. Once the elapsed budget
/// would be exceeded by the next backoff sleep, the loop gives up and returns
/// a timeout carrying the last error verbatim. Sleeps run on `tokio::time`,
/// so dropping the returned future cancels the wait mid-backoff.
pub async fn retry_with_backoff<T, F, Fut, P>(
    policy: RetryPolicy,
    is_retryable: P,
    mut operation: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
    P: Fn(&AppError) -> bool,
{
    let started = Instant::now();
    let mut previous_delay = Duration::ZERO;
    let mut delay = policy.initial_delay;

    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if is_retryable(&error) => error,
            Err(error) => return Err(error),
        };

        if started.elapsed() + delay > policy.max_elapsed {
            return Err(AppError::Timeout(format!(
                "retry budget of {}s exhausted: {error}",
                policy.max_elapsed.as_secs()
            )));
        }

        tokio::time::sleep(delay).await;

        let next_delay = previous_delay + delay;
        previous_delay = delay;
        delay = next_delay;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use keygate_core::AppError;
    use tokio::time::Instant;

    use super::{RetryPolicy, retry_with_backoff};

    #[tokio::test]
    async fn first_success_returns_without_retrying() {
        let attempts = AtomicU32::new(0);

        let result = retry_with_backoff(
            RetryPolicy::fibonacci(Duration::from_secs(120)),
            AppError::is_conflict,
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Ok(42_u32)
            },
        )
        .await;

        assert!(matches!(result, Ok(42)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fatal_error_is_never_retried() {
        let attempts = AtomicU32::new(0);

        let result: Result<u32, _> = retry_with_backoff(
            RetryPolicy::fibonacci(Duration::from_secs(120)),
            AppError::is_conflict,
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Validation("malformed arguments".to_owned()))
            },
        )
        .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_errors_resolve_on_later_success() {
        let attempts = AtomicU32::new(0);

        let result = retry_with_backoff(
            RetryPolicy::fibonacci(Duration::from_secs(120)),
            AppError::is_conflict,
            || async {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 {
                    Err(AppError::Conflict("still in progress".to_owned()))
                } else {
                    Ok("done")
                }
            },
        )
        .await;

        assert!(matches!(result, Ok("done")));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_returns_timeout_with_last_error() {
        let attempts = AtomicU32::new(0);

        // With a 10s budget the Fibonacci schedule sleeps 1+1+2+3 = 7s and
        // refuses the next 5s delay, so exactly five attempts run.
        let result: Result<u32, _> = retry_with_backoff(
            RetryPolicy::fibonacci(Duration::from_secs(10)),
            AppError::is_conflict,
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Conflict("still in progress".to_owned()))
            },
        )
        .await;

        assert!(matches!(
            &result,
            Err(AppError::Timeout(message)) if message.contains("still in progress")
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn delays_follow_the_fibonacci_schedule() {
        let attempts = AtomicU32::new(0);
        let started = Instant::now();

        let _result: Result<u32, _> = retry_with_backoff(
            RetryPolicy::fibonacci(Duration::from_secs(10)),
            AppError::is_conflict,
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Conflict("still in progress".to_owned()))
            },
        )
        .await;

        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }
}
