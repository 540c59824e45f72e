//! Error taxonomy for the upstream client and the sync engine.
//!
//! The split matters for retry behavior: transport-level failures are
//! retryable, structured errors returned by the upstream service are not.
//! Row-level validation problems are not errors in the Result sense at all;
//! they are collected into the sync report and never abort a sync.

use std::time::Duration;

/// Failure modes of a single upstream call.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
  /// Transport failure (connection refused, DNS, broken pipe). Retryable.
  #[error("network error: {0}")]
  Network(String),

  /// The request exceeded its deadline. Retryable.
  #[error("request timed out after {0:?}")]
  Timeout(Duration),

  /// The service told us to slow down. Retryable, honoring the hint.
  #[error("rate limited by upstream")]
  RateLimited { retry_after: Option<Duration> },

  /// The service returned a structured error payload. Not retryable:
  /// retrying an invalid request only burns the rate budget.
  #[error("upstream error {code}: {message}")]
  Api { code: i64, message: String },

  /// The response body did not match any known shape. Not retryable.
  #[error("unparseable upstream response: {0}")]
  InvalidResponse(String),
}

impl UpstreamError {
  /// Whether the retry policy should attempt this call again.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. }
    )
  }

  /// Server-provided backoff hint, if any.
  pub fn retry_after(&self) -> Option<Duration> {
    match self {
      Self::RateLimited { retry_after } => *retry_after,
      _ => None,
    }
  }
}

/// A record that failed validation during sync. Non-fatal: the record is
/// skipped and the failure is reported to the caller.
#[derive(Debug, Clone)]
pub struct ValidationError {
  pub entity: &'static str,
  pub detail: String,
}

impl std::fmt::Display for ValidationError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}: {}", self.entity, self.detail)
  }
}

/// Failure modes of a whole-entity sync.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
  /// The fetch phase failed before a transaction was opened; prior data is
  /// untouched.
  #[error(transparent)]
  Upstream(#[from] UpstreamError),

  /// Every fetched record was rejected, so the transaction was rolled back
  /// and the table left as it was.
  #[error("sync saved nothing ({} row errors)", errors.len())]
  NothingSaved { errors: Vec<ValidationError> },

  /// The local store itself failed mid-transaction. Rolled back.
  #[error("storage error during sync: {0}")]
  Storage(#[from] rusqlite::Error),

  /// A sync for this entity is already in flight.
  #[error("a sync for {0} is already running")]
  AlreadyRunning(&'static str),

  /// Everything else (poisoned locks, unreadable sync state).
  #[error("sync failed: {0}")]
  Internal(String),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_transport_errors_are_retryable() {
    assert!(UpstreamError::Network("refused".into()).is_retryable());
    assert!(UpstreamError::Timeout(Duration::from_secs(30)).is_retryable());
    assert!(UpstreamError::RateLimited { retry_after: None }.is_retryable());
  }

  #[test]
  fn test_api_errors_are_not_retryable() {
    let err = UpstreamError::Api {
      code: 4,
      message: "unknown method".into(),
    };
    assert!(!err.is_retryable());
    assert!(!UpstreamError::InvalidResponse("html".into()).is_retryable());
  }

  #[test]
  fn test_retry_after_hint_only_from_rate_limit() {
    let hinted = UpstreamError::RateLimited {
      retry_after: Some(Duration::from_secs(7)),
    };
    assert_eq!(hinted.retry_after(), Some(Duration::from_secs(7)));
    assert_eq!(UpstreamError::Network("x".into()).retry_after(), None);
  }
}
