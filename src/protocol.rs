//! The WebSocket wire catalog (SPEC_FULL.md §6.1): one request/response pair
//! per Connector event. Frames are plain JSON objects; the event name itself
//! travels on the Socket.IO-compatible transport envelope, not inside the
//! payload, so these types model only the `data` side.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::document::PlayerDocument;
use crate::engine::{BatchRecoveryResult, ConnectResult, DisconnectResult, RecoveryResult, SyncResult};
use crate::error::SyncError;

/// Default number of `ActiveElsewhere` retries a Connector attempts before
/// giving up and surfacing the contention to the game server operator.
pub const DEFAULT_MAX_CONNECT_RETRIES: u32 = 5;
/// Upper bound on entries accepted by a single `player:batch-crash-recovery`
/// frame (SPEC_FULL.md §5).
pub const MAX_BATCH_SIZE: usize = 100;

pub mod event {
  pub const PLAYER_CONNECT: &str = "player:connect";
  pub const PLAYER_SYNC: &str = "player:sync";
  pub const PLAYER_DISCONNECT: &str = "player:disconnect";
  pub const PLAYER_CRASH_RECOVERY: &str = "player:crash-recovery";
  pub const PLAYER_BATCH_CRASH_RECOVERY: &str = "player:batch-crash-recovery";

  pub const AUTH_SUCCESS: &str = "auth:success";
  pub const SERVER_INFO: &str = "server:info";
  pub const PLAYER_DATA: &str = "player:data";
  pub const PLAYER_WAIT: &str = "player:wait";
  pub const PLAYER_ERROR: &str = "player:error";
  pub const SYNC_ACK: &str = "sync:ack";
  pub const SYNC_ERROR: &str = "sync:error";
  pub const DISCONNECT_ACK: &str = "disconnect:ack";
  pub const DISCONNECT_ERROR: &str = "disconnect:error";
  pub const RECOVERY_ACK: &str = "recovery:ack";
  pub const RECOVERY_ERROR: &str = "recovery:error";
  pub const BATCH_RECOVERY_COMPLETE: &str = "batch-recovery:complete";
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
  pub steam_id: String,
  #[serde(default)]
  pub eos_id: Option<String>,
  #[serde(default)]
  pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchCrashRecoveryRequest {
  pub players: Vec<PlayerDocument>,
}

/// One shared error shape for every `*:error` frame.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorFrame {
  pub steam_id: String,
  pub error: &'static str,
  pub errors: Option<Vec<String>>,
}

impl ErrorFrame {
  #[must_use]
  pub fn from_error(steam_id: &str, err: &SyncError) -> Self {
    let errors = match err {
      SyncError::ValidationFailed { errors } => Some(errors.clone()),
      _ => None,
    };
    ErrorFrame { steam_id: steam_id.to_string(), error: err.kind(), errors }
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged, rename_all = "camelCase")]
pub enum ConnectFrame {
  Data { steam_id: String, data: PlayerDocument, sync_seq: i64 },
  Wait { steam_id: String, active_server: String, retry_after_ms: u64, max_retries: u32 },
  Error(ErrorFrame),
}

impl ConnectFrame {
  #[must_use]
  pub fn from_outcome(steam_id: &str, outcome: Result<ConnectResult, SyncError>) -> Self {
    match outcome {
      Ok(result) => {
        let sync_seq = result.document.sync_seq;
        ConnectFrame::Data { steam_id: steam_id.to_string(), data: result.document, sync_seq }
      }
      Err(SyncError::ActiveElsewhere { active_server, wait_ms, .. }) => {
        ConnectFrame::Wait { steam_id: steam_id.to_string(), active_server, retry_after_ms: wait_ms, max_retries: DEFAULT_MAX_CONNECT_RETRIES }
      }
      Err(err) => ConnectFrame::Error(ErrorFrame::from_error(steam_id, &err)),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged, rename_all = "camelCase")]
pub enum SyncFrame {
  Ack { steam_id: String, sync_seq: i64, flagged: bool },
  Error(ErrorFrame),
}

impl SyncFrame {
  #[must_use]
  pub fn from_outcome(steam_id: &str, outcome: Result<SyncResult, SyncError>) -> Self {
    match outcome {
      Ok(result) => SyncFrame::Ack { steam_id: steam_id.to_string(), sync_seq: result.sync_seq, flagged: result.flagged },
      Err(err) => SyncFrame::Error(ErrorFrame::from_error(steam_id, &err)),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged, rename_all = "camelCase")]
pub enum DisconnectFrame {
  Ack { steam_id: String, sync_seq: i64 },
  Error(ErrorFrame),
}

impl DisconnectFrame {
  #[must_use]
  pub fn from_outcome(steam_id: &str, outcome: Result<DisconnectResult, SyncError>) -> Self {
    match outcome {
      Ok(result) => DisconnectFrame::Ack { steam_id: steam_id.to_string(), sync_seq: result.sync_seq },
      Err(err) => DisconnectFrame::Error(ErrorFrame::from_error(steam_id, &err)),
    }
  }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(untagged, rename_all = "camelCase")]
pub enum RecoveryFrame {
  Ack { steam_id: String, sync_seq: i64, skipped: Option<bool>, flagged: Option<bool> },
  Error(ErrorFrame),
}

impl RecoveryFrame {
  #[must_use]
  pub fn from_outcome(steam_id: &str, outcome: Result<RecoveryResult, SyncError>) -> Self {
    match outcome {
      Ok(result) => RecoveryFrame::Ack {
        steam_id: steam_id.to_string(),
        sync_seq: result.sync_seq,
        skipped: Some(result.skipped),
        flagged: Some(result.flagged),
      },
      Err(err) => RecoveryFrame::Error(ErrorFrame::from_error(steam_id, &err)),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecoveryCompleteFrame {
  pub total: usize,
  pub successful: usize,
  pub failed: usize,
}

impl From<&BatchRecoveryResult> for BatchRecoveryCompleteFrame {
  fn from(result: &BatchRecoveryResult) -> Self {
    BatchRecoveryCompleteFrame { total: result.total, successful: result.successful, failed: result.failed }
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSuccessFrame {
  pub server_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfoFrame {
  pub server_id: String,
  pub connected_players: usize,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn connect_frame_serializes_wait_without_data_field() {
    let err = SyncError::ActiveElsewhere {
      active_server: "serverB".to_string(),
      active_since: chrono::Utc::now(),
      wait_ms: 30_000,
    };
    let frame = ConnectFrame::from_outcome("76561198000000001", Err(err));
    let json = serde_json::to_value(&frame).unwrap();
    assert_eq!(json["activeServer"], "serverB");
    assert!(json.get("data").is_none());
  }

  #[test]
  fn error_frame_carries_validation_errors() {
    let err = SyncError::validation(vec!["v: expected 2, got 1".to_string()]);
    let frame = ErrorFrame::from_error("76561198000000001", &err);
    assert_eq!(frame.error, "ValidationFailed");
    assert_eq!(frame.errors.unwrap().len(), 1);
  }
}
