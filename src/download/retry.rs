//! Retry logic for requests and chunk downloads

use crate::error::SigtubeError;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

/// Boxed future returned by retried operations
pub type RetryFuture<T> = Pin<Box<dyn Future<Output = Result<T, SigtubeError>> + Send>>;

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `initial_delay * attempt`; the first retry is immediate
    Linear,
    /// `initial_delay * multiplier^attempt`
    Exponential,
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Base delay
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    pub backoff: Backoff,
    /// Exponential growth factor
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            backoff: Backoff::Exponential,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Linear schedule without jitter: 0, step, 2*step, ...
    pub fn linear(max_retries: u32, step: Duration) -> Self {
        Self {
            max_retries,
            initial_delay: step,
            max_delay: step * max_retries.max(1),
            backoff: Backoff::Linear,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Delay before retry number `attempt` (0-based), jitter excluded
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            Backoff::Linear => self.initial_delay * attempt,
            Backoff::Exponential => Duration::from_millis(
                (self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32))
                    as u64,
            ),
        };
        delay.min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return delay;
        }
        let jitter_range = delay.as_millis() as f64 * self.jitter_factor;
        let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
        delay + Duration::from_millis(jitter.abs() as u64)
    }
}

/// Retry executor
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new() -> Self {
        Self::with_config(RetryConfig::default())
    }

    pub fn with_config(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute a function, retrying errors that report themselves retryable
    pub async fn execute<F, T>(&self, func: F) -> Result<T, SigtubeError>
    where
        F: FnMut() -> RetryFuture<T>,
    {
        self.execute_with_error_handler(func, SigtubeError::is_retryable)
            .await
    }

    /// Execute a function, retrying errors accepted by `error_handler`
    pub async fn execute_with_error_handler<F, T, E>(
        &self,
        mut func: F,
        error_handler: E,
    ) -> Result<T, SigtubeError>
    where
        F: FnMut() -> RetryFuture<T>,
        E: Fn(&SigtubeError) -> bool,
    {
        let mut attempt = 0;
        loop {
            match func().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if !error_handler(&error) || attempt >= self.config.max_retries {
                        return Err(error);
                    }

                    let delay = self.config.jittered(self.config.delay_for(attempt));
                    debug!(
                        "attempt {} failed ({}), retrying in {:?}",
                        attempt + 1,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new()
    }
}
