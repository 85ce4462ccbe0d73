// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded exponential backoff with rate-limit and quota awareness.
//!
//! The schedule is `base_delay * backoff_factor^n`, optionally scaled by a
//! random factor in `[0.5, 1.5)`. A rate-limit error that names its own
//! delay is honoured instead, without advancing the schedule. Quota errors
//! stop immediately; errors that are not retryable at all never consume an
//! attempt.

use std::future::Future;
use std::time::Duration;

use threadline_core::{RetryClass, ThreadlineError};
use tracing::warn;

/// Errors the retry loop knows how to classify.
pub trait Retryable {
    fn retry_class(&self) -> RetryClass;
}

impl Retryable for ThreadlineError {
    fn retry_class(&self) -> RetryClass {
        ThreadlineError::retry_class(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total calls allowed, first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64, jitter: bool) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff_factor,
            jitter,
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter {
            scale(delay, 0.5 + rand::random::<f64>())
        } else {
            delay
        }
    }
}

/// `delay * factor`, saturating at `Duration::MAX`.
fn scale(delay: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// Run `op` under `policy`, logging each retry.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_with(policy, op, |err: &E, attempt, delay| {
        warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "call failed, retrying"
        );
    })
    .await
}

/// Run `op` under `policy`, calling `on_retry(error, attempt, delay)` before
/// each sleep. On exhaustion the last error is returned.
pub async fn retry_with<T, E, F, Fut, R>(policy: &RetryPolicy, mut op: F, mut on_retry: R) -> Result<T, E>
where
    E: Retryable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(&E, u32, Duration),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.base_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let wait = match err.retry_class() {
            RetryClass::Fatal | RetryClass::Abort => return Err(err),
            _ if attempt >= max_attempts => return Err(err),
            RetryClass::Backoff => {
                let wait = policy.jittered(delay);
                delay = scale(delay, policy.backoff_factor);
                wait
            }
            RetryClass::After(suggested) => policy.jittered(suggested),
        };

        on_retry(&err, attempt, wait);
        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;
    use tracing_test::traced_test;

    use super::*;

    fn transient() -> ThreadlineError {
        ThreadlineError::Transient {
            message: "503".into(),
            source: None,
        }
    }

    fn fixed(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_secs(1), 2.0, false)
    }

    #[tokio::test(start_paused = true)]
    async fn backs_off_exponentially_then_succeeds() {
        let calls = AtomicU32::new(0);
        let sleeps = RefCell::new(Vec::new());
        let started = Instant::now();

        let result = retry_with(
            &fixed(3),
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok("ok")
                }
            },
            |_, _, delay| sleeps.borrow_mut().push(delay),
        )
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *sleeps.borrow(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_rate_limit_delay_overrides_schedule() {
        let calls = AtomicU32::new(0);
        let sleeps = RefCell::new(Vec::new());

        let result = retry_with(
            &fixed(4),
            || async {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(ThreadlineError::RateLimited {
                        message: "429".into(),
                        retry_after: Some(Duration::from_secs(5)),
                    }),
                    1 => Err(transient()),
                    _ => Ok(42),
                }
            },
            |_, _, delay| sleeps.borrow_mut().push(delay),
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        // The rate limit did not advance the schedule: the next backoff is still 1s.
        assert_eq!(
            *sleeps.borrow(),
            vec![Duration::from_secs(5), Duration::from_secs(1)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_without_delay_uses_schedule() {
        let sleeps = RefCell::new(Vec::new());
        let result: Result<(), _> = retry_with(
            &fixed(2),
            || async {
                Err(ThreadlineError::RateLimited {
                    message: "429".into(),
                    retry_after: None,
                })
            },
            |_, _, delay| sleeps.borrow_mut().push(delay),
        )
        .await;

        assert!(matches!(result, Err(ThreadlineError::RateLimited { .. })));
        assert_eq!(*sleeps.borrow(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_exhaustion_aborts_on_first_call() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(&fixed(3), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ThreadlineError::QuotaExhausted {
                message: "insufficient_quota".into(),
            })
        })
        .await;

        assert!(matches!(result, Err(ThreadlineError::QuotaExhausted { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(&fixed(5), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ThreadlineError::Parse("bad json".into()))
        })
        .await;

        assert!(matches!(result, Err(ThreadlineError::Parse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn exhaustion_returns_last_error_and_logs_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(&fixed(3), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Err(ThreadlineError::Transient {
                message: format!("attempt {n}"),
                source: None,
            })
        })
        .await;

        match result {
            Err(ThreadlineError::Transient { message, .. }) => assert_eq!(message, "attempt 2"),
            other => panic!("expected last transient error, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(logs_contain("call failed, retrying"));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_backoff_factor_saturates() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_secs(1), 1e20, false);

        let result = retry(&policy, || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(transient())
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn scaling_saturates_instead_of_overflowing() {
        assert_eq!(scale(Duration::from_secs(2), 1.5), Duration::from_secs(3));
        assert_eq!(scale(Duration::from_secs(1), 1e20), Duration::MAX);
        assert_eq!(scale(Duration::MAX, 2.0), Duration::MAX);

        let policy = RetryPolicy::new(3, Duration::from_secs(1), 2.0, true);
        assert!(policy.jittered(Duration::MAX) >= Duration::MAX / 2);
    }

    #[test]
    fn jitter_stays_within_half_to_one_and_a_half() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2), 2.0, true);
        for _ in 0..200 {
            let d = policy.jittered(Duration::from_secs(2));
            assert!(d >= Duration::from_secs(1) && d < Duration::from_secs(3));
        }
    }
}
