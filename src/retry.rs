//! Retry controller for transfers.
//!
//! In [`RetryMode::Single`] a failure is returned as-is. In
//! [`RetryMode::Continuous`] a retryable failure (timeout or NAK) sleeps
//! for the backoff and restarts the whole transfer from the handshake.
//! Non-retryable failures are always returned immediately.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration_ms;
use crate::error::{LinkError, Result};

/// Default pause between attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(1500);

/// Default cap on attempts in continuous mode.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Whether a failed transfer is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryMode {
    /// Report the first failure.
    #[default]
    Single,
    /// Restart after every retryable failure.
    Continuous,
}

/// Retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retry mode.
    pub mode: RetryMode,
    /// Pause between attempts.
    #[serde(rename = "backoff_ms", with = "duration_ms")]
    pub backoff: Duration,
    /// Attempt cap in continuous mode. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            mode: RetryMode::Single,
            backoff: DEFAULT_BACKOFF,
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
        }
    }
}

impl RetryPolicy {
    /// Fail on the first error.
    pub fn single() -> Self {
        Self::default()
    }

    /// Retry retryable failures with the default backoff and cap.
    pub fn continuous() -> Self {
        Self {
            mode: RetryMode::Continuous,
            ..Self::default()
        }
    }

    /// Set the pause between attempts.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the attempt cap. `None` retries forever.
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Check the values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == Some(0) {
            return Err(LinkError::Config("max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    /// Run `attempt` until it succeeds or the policy gives up.
    ///
    /// `attempt` receives the 1-based attempt number. When the cap is hit
    /// the last error is wrapped in [`LinkError::RetriesExhausted`].
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut number = 0u32;
        loop {
            number += 1;
            let err = match attempt(number).await {
                Ok(value) => {
                    if number > 1 {
                        tracing::info!("Transfer succeeded on attempt {}", number);
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if self.mode == RetryMode::Single || !err.is_retryable() {
                return Err(err);
            }

            if let Some(max) = self.max_attempts {
                if number >= max {
                    return Err(LinkError::RetriesExhausted {
                        attempts: number,
                        last: Box::new(err),
                    });
                }
            }

            tracing::warn!(
                "Attempt {} failed: {}. Retrying in {} ms",
                number,
                err,
                self.backoff.as_millis()
            );
            tokio::time::sleep(self.backoff).await;
        }
    }
}
