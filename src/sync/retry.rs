//! Retry policy with exponential backoff and additive jitter
//!
//! One configurable policy covers every retried call site instead of
//! duplicating ad hoc retry loops per path. Jitter desynchronizes retry
//! storms when many deployments poll the same upstream feed.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::RetryableError;

/// Configurable retry policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new policy from the given configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute an async operation, retrying retryable errors
    ///
    /// The operation runs once plus up to `max_retries` additional attempts.
    /// Non-retryable errors return immediately.
    pub async fn run<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError + std::fmt::Display,
    {
        let mut attempt = 0u32;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if !err.is_retryable() || attempt >= self.config.max_retries {
                        if attempt >= self.config.max_retries {
                            warn!(
                                attempts = attempt + 1,
                                max_retries = self.config.max_retries,
                                "Retries exhausted"
                            );
                        }
                        return Err(err);
                    }

                    let delay = self.delay_for(attempt);
                    debug!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "Retrying after transient error"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Delay before the retry following the given attempt number
    ///
    /// Exponential growth `initial * multiplier^attempt`, capped at the
    /// configured maximum, plus a uniformly random additive jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.config.initial_backoff_secs as f64
            * self.config.backoff_multiplier.powi(attempt as i32);
        let capped = backoff.min(self.config.max_backoff_secs as f64);

        let jitter = if self.config.jitter_max_secs > self.config.jitter_min_secs {
            rand::thread_rng()
                .gen_range(self.config.jitter_min_secs as f64..=self.config.jitter_max_secs as f64)
        } else {
            self.config.jitter_min_secs as f64
        };

        Duration::from_secs_f64(capped + jitter)
    }

    /// Number of retries allowed after the initial attempt
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}
