use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, warn};

use super::errors::BackendError;
use crate::config::NetworkConfig;

/// Retry behavior with exponential backoff and a bounded per-attempt timeout
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub max_attempts: u32,
    /// First retry waits this long
    pub base_delay_ms: u64,
    /// Caps exponential growth
    pub max_delay_ms: u64,
    /// Each attempt is abandoned after this and counted as a transient failure
    pub attempt_timeout: Duration,
    /// Total budget for all attempts combined
    pub total_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
            attempt_timeout: Duration::from_secs(8),
            total_timeout: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
            ..Default::default()
        }
    }

    pub fn from_config(network: &NetworkConfig) -> Self {
        Self {
            max_attempts: network.max_retries,
            base_delay_ms: network.base_delay_ms,
            max_delay_ms: network.max_delay_ms,
            attempt_timeout: Duration::from_secs(network.request_timeout_secs),
            total_timeout: Duration::from_secs(network.request_timeout_secs)
                .saturating_mul(network.max_retries.saturating_add(1)),
        }
    }

    /// Single attempt, no retries. Used for writes that must not repeat.
    pub fn once(attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: 0,
            attempt_timeout,
            total_timeout: attempt_timeout,
            ..Default::default()
        }
    }

    /// min(base_delay * 2^attempt, max_delay)
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Run `f` until it succeeds, fails permanently, or the attempts run out.
    /// Returns the last error seen.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut f: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let start_time = Instant::now();
        let mut last_error = None;

        for attempt in 0..=self.max_attempts {
            if attempt > 0 && start_time.elapsed() >= self.total_timeout {
                warn!(
                    "{}: Exceeded total timeout of {:?} after {} attempts",
                    operation_name, self.total_timeout, attempt
                );
                break;
            }

            if attempt > 0 {
                debug!(
                    "{}: Retry attempt {} of {}",
                    operation_name, attempt, self.max_attempts
                );
            }

            let outcome = match timeout(self.attempt_timeout, f()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(BackendError::Timeout(self.attempt_timeout)),
            };

            match outcome {
                Ok(result) => {
                    if attempt > 0 {
                        debug!("{}: Succeeded after {} retries", operation_name, attempt);
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if !err.is_transient() {
                        debug!("{}: Non-transient error, not retrying: {}", operation_name, err);
                        return Err(err);
                    }

                    debug!("{}: Transient error: {}", operation_name, err);
                    let retry_after = err.retry_after();
                    last_error = Some(err);

                    if attempt < self.max_attempts {
                        let delay = match retry_after {
                            Some(seconds) => Duration::from_secs(seconds)
                                .min(Duration::from_millis(self.max_delay_ms)),
                            None => self.calculate_delay(attempt),
                        };
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            BackendError::Other(format!(
                "{}: all attempts failed with no error captured",
                operation_name
            ))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
            attempt_timeout: Duration::from_millis(50),
            total_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_calculate_delay() {
        let policy = RetryPolicy::new(3, 100, 10_000);
        assert_eq!(policy.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = RetryPolicy::new(3, 1000, 5000);
        assert_eq!(policy.calculate_delay(10), Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let attempts = Arc::new(AtomicU32::new(0));

        let result = fast_policy(3)
            .execute("videos", || {
                let attempts = attempts.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(BackendError::Network("connection refused".into()))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_on_permission_error() {
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = fast_policy(3)
            .execute("videos", || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(BackendError::Permission {
                        status: 403,
                        message: "rls".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(BackendError::Permission { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hung_attempt_times_out() {
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = fast_policy(1)
            .execute("channels", || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_secs(10)).await;
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(BackendError::Timeout(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
