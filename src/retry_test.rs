use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::Result;

use crate::retry::{retry_with_backoff, RetryConfig};

fn quick_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        backoff_multiplier: 2.0,
    }
}

#[tokio::test(start_paused = true)]
async fn retries_transient_failures_until_success() -> Result<()> {
    let attempts = AtomicU32::new(0);

    let result: Result<u32, String> = retry_with_backoff(&quick_config(), "flaky_op", |_| true, || {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if attempt < 3 {
                Err(format!("transient failure {}", attempt))
            } else {
                Ok(attempt)
            }
        }
    })
    .await;

    assert!(result == Ok(3), "expected success on the third attempt, got {:?}", result);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn non_retryable_errors_return_immediately() -> Result<()> {
    let attempts = AtomicU32::new(0);

    let result: Result<u32, String> = retry_with_backoff(&quick_config(), "fatal_op", |_| false, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err("fatal failure".to_string()) }
    })
    .await;

    assert!(result == Err("fatal failure".to_string()), "expected the fatal error surfaced, got {:?}", result);
    assert!(attempts.load(Ordering::SeqCst) == 1, "expected a single attempt, got {}", attempts.load(Ordering::SeqCst));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_return_the_last_error() -> Result<()> {
    let attempts = AtomicU32::new(0);

    let result: Result<u32, String> = retry_with_backoff(&quick_config(), "doomed_op", |_| true, || {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        async move { Err(format!("transient failure {}", attempt)) }
    })
    .await;

    assert!(
        result == Err("transient failure 3".to_string()),
        "expected the last error after 3 attempts, got {:?}",
        result
    );
    assert!(attempts.load(Ordering::SeqCst) == 3, "expected 3 attempts, got {}", attempts.load(Ordering::SeqCst));
    Ok(())
}
