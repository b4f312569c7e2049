//! Error taxonomy for the synchronization layer.

use thiserror::Error;

/// Errors produced by fetches, queries and mutations.
///
/// The type is `Clone` because a single in-flight fetch is shared by every
/// caller that asked for the same signature, and each of them receives the
/// outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
  /// The fetcher could not complete the call (connection refused, timeout, ...).
  /// Never retried automatically.
  #[error("network failure: {0}")]
  Network(String),

  /// The server rejected the request payload (4xx). The message is the
  /// server's own, surfaced verbatim.
  #[error("request rejected ({status}): {message}")]
  Validation { status: u16, message: String },

  /// The server failed while handling the request (5xx).
  #[error("server error ({status}): {message}")]
  Server { status: u16, message: String },

  /// The payload did not have the expected shape.
  #[error("failed to decode payload: {0}")]
  Decode(String),

  /// A response arrived for an interest that no longer exists (superseded
  /// filter generation, or a cache reset while the request was in flight).
  /// Callers discard it; it is never shown to the user.
  #[error("stale response discarded: {0}")]
  StaleResponse(String),
}

impl SyncError {
  /// Whether this error only signals a discarded response.
  pub fn is_stale(&self) -> bool {
    matches!(self, SyncError::StaleResponse(_))
  }
}

impl From<serde_json::Error> for SyncError {
  fn from(e: serde_json::Error) -> Self {
    SyncError::Decode(e.to_string())
  }
}
