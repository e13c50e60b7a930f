//! Retry with quadratic backoff.
//!
//! Every transient step of a run (mesh readiness, pod availability, each
//! probe) goes through [`retry`]. Callers do not layer their own retry loops
//! on top of it.
//!
//! Between attempt `i` (0-indexed) and the next one the executor sleeps
//! `unit * (1 + i*i)`: 1, 2, 5, 10, 17, ... units. No sleep follows the final
//! attempt.
//!
//! # Example
//!
//! ```ignore
//! use nsm_conncheck::retry::{retry, RetryPolicy};
//!
//! let pods = retry(&RetryPolicy::default(), "pods_running", || async {
//!     check_availability(&api, &namespace, &selector).await
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

/// Default attempt budget for transient steps
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Attempt budget and backoff unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of invocations (values below 1 are treated as 1)
    pub max_attempts: u32,
    /// Time unit the quadratic schedule is multiplied by
    pub unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget and a one second unit
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Delay slept after the failed attempt with 0-based index `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = attempt.saturating_mul(attempt).saturating_add(1);
        self.unit.saturating_mul(factor)
    }
}

/// Execute an async operation until it succeeds or the attempt budget runs out.
///
/// Returns the first `Ok`, or the error from the last attempt.
pub async fn retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt + 1 >= max_attempts {
                    error!(
                        operation = %operation_name,
                        attempts = max_attempts,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    operation = %operation_name,
                    attempt = attempt + 1,
                    error = %e,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            unit: Duration::from_secs(1),
        }
    }

    /// Operation that fails `failures` times, then succeeds with the attempt count.
    fn flaky(
        count: Arc<AtomicU32>,
        failures: u32,
    ) -> impl FnMut() -> std::future::Ready<Result<u32, String>> {
        move || {
            let n = count.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= failures {
                std::future::ready(Err(format!("failure {}", n)))
            } else {
                std::future::ready(Ok(n))
            }
        }
    }

    // ==========================================================================
    // Story: The backoff schedule is quadratic
    // ==========================================================================

    #[test]
    fn delays_follow_one_plus_i_squared() {
        let p = policy(10);
        let delays: Vec<u64> = (0..6).map(|i| p.delay_for(i).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 5, 10, 17, 26]);
    }

    #[test]
    fn delay_scales_with_unit() {
        let p = RetryPolicy {
            max_attempts: 3,
            unit: Duration::from_millis(10),
        };
        assert_eq!(p.delay_for(2), Duration::from_millis(50));
    }

    #[test]
    fn huge_attempt_index_saturates_instead_of_overflowing() {
        let p = policy(10);
        assert_eq!(p.delay_for(u32::MAX), Duration::from_secs(u32::MAX as u64));
    }

    // ==========================================================================
    // Story: Success stops the loop immediately
    // ==========================================================================

    #[tokio::test(start_paused = true)]
    async fn succeeds_immediately_without_sleeping() {
        let start = Instant::now();
        let result: Result<i32, &str> = retry(&policy(3), "op", || async { Ok(42) }).await;
        assert_eq!(result, Ok(42));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_k_failures_with_k_plus_one_invocations() {
        let count = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = retry(&policy(10), "op", flaky(count.clone(), 3)).await;

        assert_eq!(result, Ok(4));
        assert_eq!(count.load(Ordering::SeqCst), 4);
        // 1 + 2 + 5 units between the four attempts
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(8), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(9), "elapsed {:?}", elapsed);
    }

    // ==========================================================================
    // Story: Exhaustion surfaces the last error
    // ==========================================================================

    #[tokio::test(start_paused = true)]
    async fn exhausts_budget_and_returns_nth_error() {
        let count = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = retry(&policy(3), "op", flaky(count.clone(), u32::MAX)).await;

        assert_eq!(result, Err("failure 3".to_string()));
        assert_eq!(count.load(Ordering::SeqCst), 3);
        // n-1 delays: 1 + 2, nothing after the last attempt
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(4), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_exactly_budget_times_is_still_a_failure() {
        let count = Arc::new(AtomicU32::new(0));
        let result = retry(&policy(2), "op", flaky(count.clone(), 2)).await;
        assert_eq!(result, Err("failure 2".to_string()));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_budget_still_runs_once() {
        let count = Arc::new(AtomicU32::new(0));
        let result = retry(&policy(0), "op", flaky(count.clone(), u32::MAX)).await;
        assert!(result.is_err());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
