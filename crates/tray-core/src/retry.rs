//! Backoff for the initial connection to a tag.
//!
//! Nothing else in the crate retries: repair after a failed read is a single
//! reconnect and never goes through [`with_retry`].
//!
//! # Example
//!
//! ```
//! use tray_core::{Error, RetryConfig, with_retry};
//!
//! # async fn example() -> Result<(), Error> {
//! // Up to four attempts, waiting 50ms, 100ms, 200ms in between
//! let config = RetryConfig::for_connect();
//!
//! let value = with_retry(&config, "connect", || async { Ok::<_, Error>(42) }).await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Doubling backoff schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first. Zero behaves like one.
    pub attempts: u32,
    /// Wait after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single wait.
    pub max_delay: Duration,
    /// Stretch each wait by up to a quarter, at random.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::for_connect()
    }
}

impl RetryConfig {
    /// A single attempt.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            ..Self::for_connect()
        }
    }

    /// Schedule used when a tag is first connected: four attempts, 50ms
    /// doubling, no jitter.
    pub fn for_connect() -> Self {
        Self {
            attempts: 4,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            jitter: false,
        }
    }

    /// Set the total number of attempts.
    #[must_use]
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Set the wait after the first failure.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the upper bound for a single wait.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable random stretching of waits.
    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Wait before attempt `failed + 1`, after `failed` failures (1-based).
    fn wait_after(&self, failed: u32) -> Duration {
        let doubled = self
            .initial_delay
            .saturating_mul(1u32 << failed.saturating_sub(1).min(16));
        let wait = doubled.min(self.max_delay);

        if self.jitter {
            wait.mul_f64(1.0 + rand::rng().random_range(0.0..0.25))
        } else {
            wait
        }
    }
}

/// Run `operation` until it succeeds, fails with an error that is not
/// [retryable](is_retryable), or runs out of attempts.
///
/// The last error is returned unchanged.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: &str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = config.attempts.max(1);
    let mut failed = 0;

    loop {
        match attempt().await {
            Ok(value) => {
                if failed > 0 {
                    debug!(operation, failed, "Succeeded after retrying");
                }
                return Ok(value);
            }
            Err(e) => {
                failed += 1;
                if failed >= attempts || !is_retryable(&e) {
                    return Err(e);
                }
                let wait = config.wait_after(failed);
                warn!(
                    operation,
                    attempt = failed,
                    of = attempts,
                    wait = ?wait,
                    error = %e,
                    "Attempt failed, backing off"
                );
                sleep(wait).await;
            }
        }
    }
}

/// Whether an error is transient radio trouble that a later attempt may not
/// hit.
pub fn is_retryable(error: &Error) -> bool {
    matches!(
        error,
        Error::Timeout { .. }
            | Error::Bluetooth(_)
            | Error::ConnectionFailed { .. }
            | Error::NotConnected
            | Error::Io(_)
    )
}
