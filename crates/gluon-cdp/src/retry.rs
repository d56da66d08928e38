//! Fixed-interval polling used by discovery and target acquisition.

use std::future::Future;
use std::time::Duration;

/// How often and how many times to poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between attempts.
    pub interval: Duration,
    /// Stop after this many attempts (`None` = poll forever).
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Poll forever with a fixed pause.
    pub const fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    /// Bound the number of attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_millis(200))
    }
}

/// Run `attempt` until it yields a value.
///
/// `Ok(Some(v))` finishes with `v`; `Ok(None)` sleeps for the policy interval
/// and tries again; `Err(e)` stops immediately. Returns `Ok(None)` once
/// `max_attempts` is exhausted. The attempt closure receives the 1-based
/// attempt number.
pub async fn poll_with_backoff<T, E, F, Fut>(policy: RetryPolicy, mut attempt: F) -> Result<Option<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let mut n: u32 = 0;
    loop {
        n = n.saturating_add(1);
        if let Some(value) = attempt(n).await? {
            return Ok(Some(value));
        }
        if policy.max_attempts.is_some_and(|max| n >= max) {
            return Ok(None);
        }
        tokio::time::sleep(policy.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn returns_first_ready_value() {
        let out: Result<Option<u32>, ()> =
            poll_with_backoff(RetryPolicy::default(), |n| async move { Ok((n == 3).then_some(n)) })
                .await;
        assert_eq!(out, Ok(Some(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_interval_between_attempts() {
        let start = tokio::time::Instant::now();
        let policy = RetryPolicy::fixed(Duration::from_millis(200));
        let _: Result<Option<()>, ()> =
            poll_with_backoff(policy, |n| async move { Ok((n == 4).then_some(())) }).await;
        assert_eq!(start.elapsed(), Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let mut calls = 0;
        let policy = RetryPolicy::default().with_max_attempts(Some(5));
        let out: Result<Option<()>, ()> = poll_with_backoff(policy, |_| {
            calls += 1;
            async { Ok(None) }
        })
        .await;
        assert_eq!(out, Ok(None));
        assert_eq!(calls, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn error_stops_immediately() {
        let mut calls = 0;
        let out: Result<Option<()>, &str> = poll_with_backoff(RetryPolicy::default(), |_| {
            calls += 1;
            async { Err("boom") }
        })
        .await;
        assert_eq!(out, Err("boom"));
        assert_eq!(calls, 1);
    }
}
