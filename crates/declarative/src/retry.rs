//! Retry logic with backoff for transient control-plane errors.
//!
//! Only `ApiError`s classified as transient (rate limit, timeout) are
//! retried; everything else is returned on the first attempt.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    /// One retry after a short pause
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Outcome of a retried operation and the number of attempts it took
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, ApiError>,
    pub attempts: u32,
}

/// Execute a control-plane call with retry.
///
/// `label` names the call in log output.
pub fn with_retry<T, F>(config: &RetryConfig, label: &str, mut operation: F) -> Attempted<T>
where
    F: FnMut() -> Result<T, ApiError>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation() {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = config.delay_for_attempt(attempt - 1);
                log::warn!(
                    "{label}: attempt {attempt}/{max_attempts} failed: {e}. Retrying in {}ms",
                    delay.as_millis()
                );
                thread::sleep(delay);
            }
            Err(e) => {
                return Attempted {
                    result: Err(e),
                    attempts: attempt,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig::new(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_success_first_try() {
        let out = with_retry(&RetryConfig::no_retry(), "describe", || Ok::<_, ApiError>(42));
        assert_eq!(out.result.unwrap(), 42);
        assert_eq!(out.attempts, 1);
    }

    #[test]
    fn test_non_transient_error_is_not_retried() {
        let calls = Cell::new(0);
        let out: Attempted<()> = with_retry(&fast(2), "create", || {
            calls.set(calls.get() + 1);
            Err(ApiError::Rejected("invalid size".into()))
        });
        assert!(out.result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_transient_error_retried_once() {
        let calls = Cell::new(0);
        let out = with_retry(&fast(2), "create", || {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Err(ApiError::RateLimited)
            } else {
                Ok("done")
            }
        });
        assert_eq!(out.result.unwrap(), "done");
        assert_eq!(out.attempts, 2);
    }

    #[test]
    fn test_transient_error_surfaces_after_last_attempt() {
        let calls = Cell::new(0);
        let out: Attempted<()> = with_retry(&fast(2), "update", || {
            calls.set(calls.get() + 1);
            Err(ApiError::Timeout)
        });
        assert_eq!(out.result.unwrap_err(), ApiError::Timeout);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_delay_backoff_is_capped() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(3),
            ..RetryConfig::new(5, Duration::from_secs(1))
        };
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(3));
    }
}
