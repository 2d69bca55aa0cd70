//! Backoff for transient storage failures.
//!
//! The resolver retries one backend on this schedule before falling through
//! to the next. Only errors for which [`Error::is_transient`] holds are
//! retried; a write in an unknown state never is.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use weavegate_common::{Error, Result};

use crate::config::RetrySettings;

/// Backoff schedule for a single backend.
///
/// Built from [`RetrySettings`]; the default matches the default config file.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Spread each delay uniformly over +/- 25%.
    pub jitter: bool,
}

impl RetryConfig {
    /// Constant delay without jitter.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Delay before retry number `retry`, counting from 1.
    pub fn delay_before(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let mut secs = (self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent))
            .min(self.max_delay.as_secs_f64());
        if self.jitter {
            secs *= 0.75 + rand::random::<f64>() * 0.5;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_multiplier: settings.backoff_multiplier,
            jitter: settings.jitter,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

/// Runs an operation on a [`RetryConfig`] schedule.
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `operation` until it succeeds, fails permanently, or the retry
    /// budget is spent. The error of the last attempt is returned.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0;
        loop {
            let err = match operation().await {
                Ok(value) => {
                    if retry > 0 {
                        debug!(retries = retry, "Succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => err,
            };

            if retry == self.config.max_retries {
                warn!(attempts = retry + 1, error = %err, "Retry budget spent");
                return Err(err);
            }
            retry += 1;

            let delay = self.config.delay_before(retry);
            warn!(
                retry,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient failure, backing off"
            );
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use weavegate_common::BackendErrorKind;

    fn timeout_error() -> Error {
        Error::backend("arweave", BackendErrorKind::NetworkTimeout, "connect failed")
    }

    fn exponential(multiplier: f64) -> RetryConfig {
        RetryConfig {
            max_retries: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: multiplier,
            jitter: false,
        }
    }

    #[test]
    fn test_delay_doubles_per_retry() {
        let config = exponential(2.0);
        assert_eq!(config.delay_before(1), Duration::from_secs(1));
        assert_eq!(config.delay_before(2), Duration::from_secs(2));
        assert_eq!(config.delay_before(3), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_capped() {
        let config = exponential(10.0);
        assert_eq!(config.delay_before(6), Duration::from_secs(10));
        assert_eq!(config.delay_before(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_bounds() {
        let config = RetryConfig {
            jitter: true,
            ..exponential(2.0)
        };
        for _ in 0..50 {
            let delay = config.delay_before(1);
            assert!(delay >= Duration::from_millis(750));
            assert!(delay <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn test_built_from_settings() {
        let settings = RetrySettings {
            max_retries: 4,
            initial_delay_ms: 250,
            max_delay_ms: 2_000,
            backoff_multiplier: 3.0,
            jitter: false,
        };
        let config = RetryConfig::from(&settings);
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.delay_before(2), Duration::from_millis(750));
        assert_eq!(RetryConfig::default().max_retries, RetrySettings::default().max_retries);
    }

    #[tokio::test]
    async fn test_transient_error_retried_until_success() {
        let tries = AtomicU32::new(0);
        let counter = &tries;
        let executor = RetryExecutor::new(RetryConfig::fixed(3, Duration::from_millis(1)));

        let result: Result<i32> = executor
            .execute(move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(timeout_error())
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(tries.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_not_retried() {
        let executor = RetryExecutor::new(RetryConfig::fixed(3, Duration::from_millis(1)));

        let tries = AtomicU32::new(0);
        let counter = &tries;
        let result: Result<()> = executor
            .execute(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::backend(
                    "arweave",
                    BackendErrorKind::InsufficientBalance,
                    "402",
                ))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(tries.load(Ordering::SeqCst), 1);

        let tries = AtomicU32::new(0);
        let counter = &tries;
        let result: Result<()> = executor
            .execute(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::WriteStatusUnknown {
                    backend: "arweave".to_string(),
                    message: "timed out".to_string(),
                })
            })
            .await;
        assert!(matches!(result, Err(Error::WriteStatusUnknown { .. })));
        assert_eq!(tries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_spent() {
        let tries = AtomicU32::new(0);
        let counter = &tries;
        let executor = RetryExecutor::new(RetryConfig::fixed(2, Duration::from_millis(1)));

        let result: Result<i32> = executor
            .execute(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(timeout_error())
            })
            .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(tries.load(Ordering::SeqCst), 3);
    }
}
