//! Retry with exponential backoff for the backend client's non-streaming
//! `complete()` call.
//!
//! Mid-stream errors are never retried here — per the error handling
//! design, the feeder terminates and `on_stream_complete` still runs so
//! the policy can emit a tail; retrying a half-delivered stream would
//! double-send chunks already at the client.
//!
//! # Examples
//!
//! ```rust,no_run
//! use luthien_core::retry::{retry_with_backoff, RetryConfig};
//!
//! # async fn example() -> Result<(), luthien_core::Error> {
//! let config = RetryConfig::default()
//!     .with_max_attempts(3)
//!     .with_initial_delay(std::time::Duration::from_secs(1));
//!
//! let result = retry_with_backoff(config, || async {
//!     Ok::<_, luthien_core::Error>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay_ms = self.initial_delay.as_millis() as f64;
        let exponential_delay = base_delay_ms * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = exponential_delay.min(self.max_delay.as_millis() as f64);
        let jitter_range = capped_delay * self.jitter_factor;
        let jitter = rand::random::<f64>() * jitter_range;
        let final_delay = capped_delay + jitter - (jitter_range / 2.0);
        Duration::from_millis(final_delay.max(0.0) as u64)
    }
}

/// Retry an async operation with exponential backoff, unconditionally.
pub async fn retry_with_backoff<F, Fut, T>(config: RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                last_error = Some(err);
                if attempt < config.max_attempts - 1 {
                    sleep(config.calculate_delay(attempt)).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or(Error::BackendTimeout))
}

/// Returns true for transient backend failures (network errors, timeouts,
/// 5xx responses) and false for anything a retry cannot fix.
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Http(_) => true,
        Error::BackendTimeout => true,
        Error::BackendError { status, .. } => {
            status.map(|s| (500..600).contains(&s)).unwrap_or(false)
        }
        _ => false,
    }
}

/// Retry an async operation with exponential backoff, but only for errors
/// `is_retryable_error` considers transient.
pub async fn retry_with_backoff_conditional<F, Fut, T>(
    config: RetryConfig,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !is_retryable_error(&err) {
                    return Err(err);
                }
                last_error = Some(err);
                if attempt < config.max_attempts - 1 {
                    sleep(config.calculate_delay(attempt)).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or(Error::BackendTimeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_retry_config_builder_sets_all_fields() {
        let config = RetryConfig::new()
            .with_max_attempts(5)
            .with_initial_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(30))
            .with_backoff_multiplier(1.5)
            .with_jitter_factor(0.2);

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_delay, Duration::from_millis(500));
        assert_eq!(config.backoff_multiplier, 1.5);
    }

    #[test]
    fn test_calculate_delay_grows_exponentially() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_backoff_multiplier(2.0)
            .with_jitter_factor(0.0);

        let delay0 = config.calculate_delay(0);
        let delay1 = config.calculate_delay(1);
        let delay2 = config.calculate_delay(2);
        assert!(delay1 > delay0);
        assert!(delay2 > delay1);
    }

    #[tokio::test]
    async fn test_succeeds_on_first_attempt_without_sleeping() {
        let config = RetryConfig::new().with_max_attempts(3);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result = retry_with_backoff(config, move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async { Ok::<i32, Error>(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let config = RetryConfig::new()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(5));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result = retry_with_backoff(config, move || {
            let count = calls_clone.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if count < 3 {
                    Err(Error::BackendTimeout)
                } else {
                    Ok::<i32, Error>(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_configured_attempts_then_fails() {
        let config = RetryConfig::new()
            .with_max_attempts(2)
            .with_initial_delay(Duration::from_millis(5));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result = retry_with_backoff(config, move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, Error>(Error::BackendTimeout) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_is_retryable_error_distinguishes_5xx_from_4xx() {
        assert!(is_retryable_error(&Error::BackendTimeout));
        assert!(is_retryable_error(&Error::backend(Some(503), "unavailable")));
        assert!(!is_retryable_error(&Error::backend(Some(400), "bad request")));
        assert!(!is_retryable_error(&Error::config("bad config")));
    }

    #[tokio::test]
    async fn test_conditional_retry_stops_immediately_on_non_retryable_error() {
        let config = RetryConfig::new().with_max_attempts(3);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result: Result<i32> = retry_with_backoff_conditional(config, move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::backend(Some(400), "bad request")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
