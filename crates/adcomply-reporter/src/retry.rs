//! Bounded retry with jittered exponential backoff

use adcomply_core::Error;
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::notifier::{Notification, Notifier};

/// Delivery retry settings for one environment
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per recipient, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Cap on any single delay
    pub max_delay: Duration,
    /// Total time budget per recipient
    pub max_elapsed: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_elapsed: Duration::from_secs(300),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `failed`-th failed attempt (1-indexed).
    ///
    /// `base_delay × 2^(failed-1)` capped at `max_delay`; with jitter the
    /// delay is drawn uniformly from its upper half.
    pub fn backoff_for_attempt(&self, failed: u32) -> Duration {
        let exponent = failed.saturating_sub(1).min(31);
        let capped = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        if !self.jitter || capped.is_zero() {
            return capped;
        }
        let millis = capped.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(millis / 2..=millis))
    }
}

/// Result of delivering to one recipient
#[derive(Debug, Clone)]
pub enum RetryOutcome {
    Delivered { attempts: u32 },
    /// Attempts exhausted, elapsed budget spent, or a non-retryable error
    Failed { attempts: u32, error: Error },
    /// Aborted by the caller; nothing was recorded
    Cancelled { attempts: u32 },
}

/// Send to one recipient, retrying retryable failures under `policy`
pub async fn send_with_retry(
    notifier: &dyn Notifier,
    recipient: &str,
    notification: &Notification,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> RetryOutcome {
    let started = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return RetryOutcome::Cancelled { attempts: attempts - 1 },
            result = notifier.send(recipient, notification) => result,
        };

        let error = match result {
            Ok(()) => return RetryOutcome::Delivered { attempts },
            Err(e) if !e.is_retryable() => return RetryOutcome::Failed { attempts, error: e },
            Err(e) => e,
        };
        if attempts >= max_attempts {
            return RetryOutcome::Failed { attempts, error };
        }

        let delay = policy.backoff_for_attempt(attempts);
        if started.elapsed() + delay > policy.max_elapsed {
            return RetryOutcome::Failed { attempts, error };
        }
        warn!(
            recipient,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Notification delivery failed, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return RetryOutcome::Cancelled { attempts },
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
