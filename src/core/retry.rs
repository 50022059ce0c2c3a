// ! Retry logic for authentication operations
// !
// ! Module provides the single backoff utility used by every retryable path:
// ! - Retry decisions taken only from the error's retryable flag
// ! - Exponential backoff with jitter, bounded by a maximum delay
// ! - Server-requested delays (Retry-After) take precedence, up to a ceiling

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error};

use crate::core::error::AuthResult;
use crate::core::logging::{ErrorContext, ErrorLogger};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for computed delays
    pub max_delay: Duration,
    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
    /// Whether to add random jitter to delays
    pub enable_jitter: bool,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
    /// Ceiling for server-requested delays
    pub max_retry_after: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            enable_jitter: true,
            jitter_factor: 0.1,
            max_retry_after: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Default schedule bounded by the given number of retries
    pub fn from_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Disable retries entirely
    pub fn no_retry() -> Self {
        Self::from_max_retries(0)
    }

    /// Set the initial and maximum delay
    pub fn with_delays(mut self, initial_delay: Duration, max_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self.max_delay = max_delay;
        self
    }

    /// Set the ceiling for server-requested delays
    pub fn with_max_retry_after(mut self, max_retry_after: Duration) -> Self {
        self.max_retry_after = max_retry_after;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, enable_jitter: bool) -> Self {
        self.enable_jitter = enable_jitter;
        self
    }

    /// Backoff delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_delay =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped_delay = base_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.enable_jitter {
            let jitter_range = capped_delay * self.jitter_factor;
            let jitter = (fastrand::f64() - 0.5) * 2.0 * jitter_range;
            (capped_delay + jitter).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}

/// Retry policy driven by [`AuthError::is_retryable`](crate::core::error::AuthError::is_retryable)
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The policy configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation, retrying retryable failures with backoff
    ///
    /// Non-retryable errors are returned immediately without another attempt.
    pub async fn execute<F, Fut, T>(&self, context: ErrorContext, mut operation: F) -> AuthResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AuthResult<T>>,
    {
        let start_time = Instant::now();
        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        ErrorLogger::log_retry_success(&context, attempt);
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let will_retry = error.is_retryable() && attempt < max_attempts;
                    ErrorLogger::log_retry_attempt(&error, attempt, max_attempts, will_retry, &context);

                    if !will_retry {
                        if error.is_retryable() {
                            error!(
                                "Operation '{}' failed after {} attempts in {:?}",
                                context.operation,
                                attempt,
                                start_time.elapsed()
                            );
                        }
                        return Err(error);
                    }

                    let delay = match error.retry_after() {
                        Some(requested) => requested.min(self.config.max_retry_after),
                        None => self.config.delay_for(attempt),
                    };
                    debug!(
                        "Retrying {} in {:?} (attempt {}/{})",
                        context.operation, delay, attempt, max_attempts
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::AuthError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(
            RetryConfig::from_max_retries(max_retries)
                .with_delays(Duration::from_millis(1), Duration::from_millis(5))
                .with_jitter(false),
        )
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let config = RetryConfig::default()
            .with_delays(Duration::from_millis(100), Duration::from_millis(350))
            .with_jitter(false);

        assert_eq!(config.delay_for(1), Duration::from_millis(100));
        assert_eq!(config.delay_for(2), Duration::from_millis(200));
        assert_eq!(config.delay_for(3), Duration::from_millis(350));
        assert_eq!(config.delay_for(10), Duration::from_millis(350));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = RetryConfig::default()
            .with_delays(Duration::from_millis(1000), Duration::from_secs(10));

        for _ in 0..50 {
            let delay = config.delay_for(1);
            assert!(delay >= Duration::from_millis(899), "{delay:?}");
            assert!(delay <= Duration::from_millis(1101), "{delay:?}");
        }
    }

    #[tokio::test]
    async fn test_retries_retryable_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = fast_policy(3)
            .execute(ErrorContext::new("test"), || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(AuthError::server("503"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_errors_fail_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: AuthResult<()> = fast_policy(5)
            .execute(ErrorContext::new("test"), || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(AuthError::credentials("401")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: AuthResult<()> = fast_policy(2)
            .execute(ErrorContext::new("test"), || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(AuthError::network("refused")) }
            })
            .await;

        assert_eq!(result.unwrap_err().category(), "network");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_server_requested_delay_is_capped() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let policy = RetryPolicy::new(
            RetryConfig::from_max_retries(1).with_max_retry_after(Duration::from_millis(20)),
        );
        let started = Instant::now();

        let result: AuthResult<()> = policy
            .execute(ErrorContext::new("test"), || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(AuthError::rate_limited("slow down", Duration::from_secs(3600))) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
