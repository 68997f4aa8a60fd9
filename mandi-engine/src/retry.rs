use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Jittered exponential backoff for store operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total tries, including the first
    pub max_attempts: usize,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Fraction of the delay randomly added or removed
    pub jitter: f64,
}

impl RetryPolicy {
    /// A policy with its inputs clamped to sane bounds
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration, jitter: f64) -> Self {
        let base_delay = base_delay.max(Duration::from_millis(1));
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Never retry
    pub fn none() -> Self {
        Self::new(1, Duration::from_millis(1), Duration::from_millis(1), 0.0)
    }

    fn next_delay(&self, retry: usize) -> Duration {
        let factor = 2_u32.saturating_pow(retry.min(31) as u32);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if self.jitter > 0.0 {
            let spread = delay.as_secs_f64() * self.jitter;
            let offset = rand::rng().random_range(-spread..=spread);
            Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.0))
        } else {
            delay
        }
    }

    /// Run `op` until it succeeds, returns an error `retryable` refuses, or
    /// the attempts are used up.
    pub async fn run<F, Fut, T, E>(&self, mut op: F, retryable: impl Fn(&E) -> bool) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !retryable(&err) {
                        return Err(err);
                    }
                    let delay = self.next_delay(attempt - 1);
                    tracing::warn!(attempt, ?delay, error = %err, "retrying");
                    sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(4, Duration::from_millis(100), Duration::from_secs(2), 0.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn new_clamps_input_parameters() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO, 2.0);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay, Duration::from_millis(1));
        assert_eq!(policy.max_delay, Duration::from_millis(1));
        assert_eq!(policy.jitter, 1.0);
    }

    #[test]
    fn next_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(
            5,
            Duration::from_millis(100),
            Duration::from_millis(500),
            0.0,
        );
        let delays: Vec<_> = (0..5).map(|retry| policy.next_delay(retry)).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[2], Duration::from_millis(400));
        assert_eq!(delays[3], Duration::from_millis(500));
        assert_eq!(delays[4], Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(10), 0.0);
        let calls = Arc::new(AtomicUsize::new(0));

        let result: Result<&str, &str> = policy
            .run(
                || {
                    let calls = calls.clone();
                    async move {
                        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err("boom")
                        } else {
                            Ok("ok")
                        }
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let result: Result<(), &str> = policy
            .run(
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err("invalid")
                    }
                },
                |_| false,
            )
            .await;

        assert_eq!(result, Err("invalid"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
