//! Bounded retry with exponential backoff.
//!
//! Transient failures against the cluster API are retried a fixed number of
//! times with growing delays. Exhaustion returns the last error to the caller,
//! which degrades the enclosing unit of work instead of aborting the run.

use std::future::Future;
use std::time::Duration;

/// Configuration for operations that may fail transiently.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between retries.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

/// Execute an async operation, retrying errors accepted by `should_retry`
/// until `max_attempts` is exhausted.
pub async fn retry_with_backoff<T, E, P, F, Fut>(
    config: &RetryConfig, operation_name: &str, mut should_retry: P, mut operation: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    P: FnMut(&E) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delay = config.initial_delay;
    let mut attempt = 1u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < config.max_attempts && should_retry(&err) => {
                tracing::warn!(error = %err, attempt, delay = ?delay, "transient failure in {}, retrying", operation_name);
                tokio::time::sleep(delay).await;
                let next = delay.as_secs_f64() * config.backoff_multiplier;
                delay = config.max_delay.min(Duration::from_secs_f64(next));
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
