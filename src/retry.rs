//! Retry utilities with exponential backoff and jitter.
//!
//! Used for the shared rule set write loop, where concurrent reconciliations of
//! different components race on a single ConfigMap. Only errors the caller
//! classifies as retryable are retried; everything else returns immediately.
//!
//! # Example
//!
//! ```ignore
//! use app_autoscaler::retry::{retry_with_backoff_when, RetryConfig};
//!
//! let outcome = retry_with_backoff_when(
//!     &RetryConfig::for_conflicts(5),
//!     "sync_rule_set",
//!     Error::is_conflict,
//!     || merge_rule_once(&store, &config, &rule),
//! ).await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Backoff configuration for operations that may fail transiently.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, at least one
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Short, bounded backoff for optimistic-concurrency conflicts.
    ///
    /// Conflicts resolve as soon as the competing writer finishes, so delays
    /// stay small.
    pub fn for_conflicts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
        }
    }
}

/// Execute an async operation, retrying only errors accepted by `should_retry`.
///
/// Errors rejected by `should_retry` are returned on the attempt that produced
/// them. When `max_attempts` is exhausted the last error is returned.
pub async fn retry_with_backoff_when<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !should_retry(&e) => return Err(e),
            Err(e) => {
                if attempt >= config.max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                // Add jitter: 0.5x to 1.5x of the delay
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(jittered_delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}
