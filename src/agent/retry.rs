//! Retry policy for remote calls
//!
//! Only rate limiting is retried. Every other failure ends the call on the
//! attempt that produced it.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RemoteConfig;

/// Failure classes of a single remote round trip
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("rate limited by the remote endpoint")]
    RateLimited,
    #[error("remote endpoint returned status {0}")]
    Status(u16),
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("no API key configured")]
    MissingCredential,
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RemoteError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16) -> Self {
        if status == 429 {
            RemoteError::RateLimited
        } else {
            RemoteError::Status(status)
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::RateLimited)
    }
}

/// Bounded exponential backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            factor: 2,
        }
    }
}

impl From<&RemoteConfig> for RetryPolicy {
    fn from(config: &RemoteConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.backoff_base_ms),
            factor: config.backoff_factor.max(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, factor: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            factor: factor.max(2),
        }
    }

    /// Wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        self.base_delay
            .saturating_mul(self.factor.saturating_pow(exponent))
    }

    /// Every wait the policy may perform, in order
    ///
    /// There is no wait after the final attempt.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|a| self.delay_after(a)).collect()
    }

    /// Run `op` until it succeeds, fails terminally, or the budget is spent
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, RemoteError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let wait = self.delay_after(attempt);
                    warn!("Attempt {}/{} rate limited, retrying in {:?}", attempt, self.max_attempts, wait);
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!("Giving up after attempt {}: {}", attempt, e);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    #[test]
    fn test_classify_status() {
        assert_eq!(RemoteError::from_status(429), RemoteError::RateLimited);
        assert_eq!(RemoteError::from_status(500), RemoteError::Status(500));
        assert!(RemoteError::RateLimited.is_retryable());
        assert!(!RemoteError::Status(503).is_retryable());
        assert!(!RemoteError::Timeout.is_retryable());
    }

    #[test]
    fn test_schedule_strictly_increases() {
        let policy = RetryPolicy::default();
        let schedule = policy.schedule();
        assert_eq!(schedule, vec![Duration::from_secs(1), Duration::from_secs(2)]);
        assert!(schedule.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_budget() {
        let policy = RetryPolicy::new(3, Duration::from_millis(5), 2);
        let calls = AtomicU32::new(0);

        let started = Instant::now();
        let result: Result<(), _> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RemoteError::RateLimited) }
            })
            .await;

        assert_eq!(result, Err(RemoteError::RateLimited));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 5ms + 10ms of backoff, none after the last attempt
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn test_terminal_status_not_retried() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), 2);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RemoteError::Status(500)) }
            })
            .await;

        assert_eq!(result, Err(RemoteError::Status(500)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_rate_limit() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), 2);

        let result = policy
            .run(|attempt| async move {
                if attempt < 2 {
                    Err(RemoteError::RateLimited)
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result, Ok(2));
    }
}
