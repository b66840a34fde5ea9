//! Crate-wide error type for the sync core.
//!
//! `SyncEngine` never panics or throws for the outcomes catalogued in the
//! error-handling design: every operation returns a tagged [`SyncError`] (or
//! succeeds, possibly with a `flagged` field riding along on the `Ok` value).
//! `Flagged` is deliberately not a variant here -- a flagged sync still
//! commits and is not an error.

use thiserror::Error;

/// Outcome of a `SyncEngine` operation.
pub type SyncOutcome<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
  #[error("document failed validation: {errors:?}")]
  ValidationFailed { errors: Vec<String> },

  #[error("player not found")]
  PlayerNotFound,

  #[error("server {requesting_server} is not the session owner (owned by {active_server})")]
  NotSessionOwner { active_server: String, requesting_server: String },

  #[error("invalid sync sequence, expected at least {expected_seq}")]
  InvalidSyncSeq { expected_seq: i64 },

  #[error("player is active on another server")]
  ActiveElsewhere { active_server: String, active_since: chrono::DateTime<chrono::Utc>, wait_ms: u64 },

  #[error("unauthenticated")]
  Unauthenticated,

  #[error("game server is deactivated")]
  ServerInactive,

  #[error("transient failure, retry is safe: {0}")]
  Internal(String),
}

impl SyncError {
  /// A stable, wire-safe tag for this error kind, used in ack/error frames
  /// and in the HTTP surface's JSON error body.
  #[must_use]
  pub fn kind(&self) -> &'static str {
    match self {
      SyncError::ValidationFailed { .. } => "ValidationFailed",
      SyncError::PlayerNotFound => "PlayerNotFound",
      SyncError::NotSessionOwner { .. } => "NotSessionOwner",
      SyncError::InvalidSyncSeq { .. } => "InvalidSyncSeq",
      SyncError::ActiveElsewhere { .. } => "ActiveElsewhere",
      SyncError::Unauthenticated => "Unauthenticated",
      SyncError::ServerInactive => "Unauthenticated",
      SyncError::Internal(_) => "Transient",
    }
  }

  #[must_use]
  pub fn validation(errors: Vec<String>) -> Self {
    SyncError::ValidationFailed { errors }
  }
}

impl From<sqlx::Error> for SyncError {
  fn from(err: sqlx::Error) -> Self {
    match err {
      sqlx::Error::RowNotFound => SyncError::PlayerNotFound,
      other => SyncError::Internal(other.to_string()),
    }
  }
}

impl From<serde_json::Error> for SyncError {
  fn from(err: serde_json::Error) -> Self {
    SyncError::ValidationFailed { errors: vec![err.to_string()] }
  }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
  fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
    SyncError::Internal(err.to_string())
  }
}
