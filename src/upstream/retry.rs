//! The single retry policy used for every upstream call.
//!
//! Exponential backoff with full jitter, capped at a maximum delay, aborting
//! early for errors that retrying cannot fix. A server-provided retry-after
//! hint overrides the computed backoff.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::UpstreamError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
  /// Total attempts, including the first.
  pub max_attempts: u32,
  /// Delay before the second attempt; doubles each retry.
  pub base_delay: Duration,
  /// Backoff ceiling.
  pub max_delay: Duration,
}

impl RetryPolicy {
  pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
    Self {
      max_attempts: max_attempts.max(1),
      base_delay,
      max_delay,
    }
  }

  /// Backoff for a given attempt (1-based), before jitter.
  fn backoff(&self, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    self.base_delay.saturating_mul(factor).min(self.max_delay)
  }

  /// Backoff with jitter applied, honoring an optional server hint.
  fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
    if let Some(hinted) = hint {
      return hinted.min(self.max_delay);
    }

    let backoff = self.backoff(attempt);
    // Full jitter halves the thundering-herd window without starving anyone.
    let fraction: f64 = rand::rng().random_range(0.5..=1.0);
    backoff.mul_f64(fraction)
  }

  /// Run `op` until it succeeds, fails with a non-retryable error, or the
  /// attempt ceiling is reached.
  pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, UpstreamError>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
  {
    let mut attempt = 1;
    loop {
      match op().await {
        Ok(value) => return Ok(value),
        Err(err) if err.is_retryable() && attempt < self.max_attempts => {
          let delay = self.delay_for(attempt, err.retry_after());
          warn!(
            call = what,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "upstream call failed, retrying"
          );
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(err) => return Err(err),
      }
    }
  }
}
