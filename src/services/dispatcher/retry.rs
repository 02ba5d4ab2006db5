//! Exponential backoff for retryable transport failures.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, TransportError};
use crate::domain::models::RetryConfig;

/// Errors that know whether another attempt could succeed.
pub trait Retryable: std::fmt::Display {
    /// Whether another attempt could succeed.
    fn is_retryable(&self) -> bool;
}

impl Retryable for TransportError {
    fn is_retryable(&self) -> bool {
        TransportError::is_retryable(self)
    }
}

impl Retryable for DomainError {
    fn is_retryable(&self) -> bool {
        match self {
            DomainError::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Exponential backoff retry: `base * 2^attempt` between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_base: Duration,
}

impl RetryPolicy {
    /// Policy with `max_retries` retries after the first attempt.
    pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
        }
    }

    /// Policy that makes exactly one attempt.
    pub fn single_attempt() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Retries after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before retry number `attempt + 1`.
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }

    fn should_retry<E: Retryable>(&self, err: &E, attempt: u32) -> bool {
        attempt < self.max_retries && err.is_retryable()
    }

    /// Run `operation` until it succeeds, fails permanently or runs out of retries.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "Operation succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if self.should_retry(&err, attempt) {
                        let backoff = self.calculate_backoff(attempt);
                        warn!(
                            attempt = attempt + 1,
                            error = %err,
                            backoff_ms = backoff.as_millis() as u64,
                            "Transient failure, retrying"
                        );
                        sleep(backoff).await;
                        attempt += 1;
                    } else {
                        if err.is_retryable() {
                            warn!(attempts = attempt + 1, error = %err, "Giving up after retries");
                        } else {
                            debug!(error = %err, "Permanent failure, not retrying");
                        }
                        return Err(err);
                    }
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, Duration::from_millis(config.backoff_base_ms))
    }
}
