//! Connector (SPEC_FULL.md §4.4): one outbound WebSocket client task per
//! configured game server. Dials out, presents a token, demultiplexes
//! inbound frames onto `SyncEngine` calls, and serializes acks back over the
//! same socket. Grounded in the teacher's `processor.rs` dispatch loop,
//! narrowed from one-task-many-connections to one-task-per-connection since
//! each Connector owns exactly one outbound socket.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{error, info, instrument, warn};

use crate::audit::AuditSink;
use crate::config::GameServerTarget;
use crate::document::PlayerDocument;
use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncOutcome};
use crate::protocol::{
  event, AuthSuccessFrame, BatchCrashRecoveryRequest, BatchRecoveryCompleteFrame, ConnectFrame, ConnectRequest,
  DisconnectFrame, ErrorFrame, RecoveryFrame, ServerInfoFrame, SyncFrame, MAX_BATCH_SIZE,
};
use crate::registry::Registry;
use crate::store::Store;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// One wire entry: `[event, data]`, the Socket.IO-compatible envelope
/// SPEC_FULL.md §6.1 describes -- the event name travels outside the payload.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope(String, serde_json::Value);

/// Exponential reconnect backoff, doubling from `initial` to `max`.
/// `max_attempts = 0` means retry forever, matching the default in
/// SPEC_FULL.md §5 ("caps retries at infinity with a maximum delay of 30s").
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
  pub initial: Duration,
  pub max: Duration,
  pub max_attempts: u32,
}

impl Backoff {
  #[must_use]
  pub fn from_config(config: &crate::config::Config) -> Self {
    Backoff {
      initial: Duration::from_millis(config.reconnect_delay_ms),
      max: Duration::from_millis(config.reconnect_delay_max_ms),
      max_attempts: config.reconnect_attempts,
    }
  }

  fn delay_for(&self, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
    self.initial.saturating_mul(factor).min(self.max)
  }
}

/// Drives one game server's connection for the life of the process: connect,
/// authenticate, serve frames until the socket drops, back off, repeat.
/// Returns only if `backoff.max_attempts` is exhausted.
#[instrument(skip(registry, engine, backoff), fields(url = %target.url))]
pub async fn run<S: Store + 'static, A: AuditSink + 'static>(
  target: GameServerTarget,
  registry: Arc<Registry<S>>,
  engine: Arc<SyncEngine<S, A>>,
  backoff: Backoff,
  request_timeout: Duration,
) {
  let mut attempt = 0u32;
  loop {
    match serve_once(&target, &registry, &engine, request_timeout).await {
      Ok(()) => {
        info!("connector session ended cleanly");
        attempt = 0;
      }
      Err(err) => {
        warn!(error = %err, attempt, "connector session failed");
        attempt += 1;
        if backoff.max_attempts != 0 && attempt >= backoff.max_attempts {
          error!(attempts = attempt, "giving up on game server after exhausting reconnect attempts");
          return;
        }
      }
    }
    sleep(backoff.delay_for(attempt)).await;
  }
}

/// One connection's full lifetime: dial, handshake, serve, and on exit
/// sweep whatever session locks this server held.
async fn serve_once<S: Store + 'static, A: AuditSink + 'static>(
  target: &GameServerTarget,
  registry: &Arc<Registry<S>>,
  engine: &Arc<SyncEngine<S, A>>,
  request_timeout: Duration,
) -> SyncOutcome<()> {
  let (stream, _response) = tokio_tungstenite::connect_async(target.url.as_str()).await?;
  let (mut write, mut read) = stream.split();

  let server = registry.authenticate(&target.token).await?;
  registry.register_connection(&server.server_id).await?;
  info!(server_id = %server.server_id, "connector authenticated");

  let handshake_result = handshake(&mut write, registry, &server.server_id).await;
  let result = match handshake_result {
    Ok(()) => serve_frames(&mut write, &mut read, engine, &server, request_timeout).await,
    Err(err) => Err(err),
  };

  let released = registry.unregister_connection(&server.server_id).await?;
  info!(server_id = %server.server_id, released = released.len(), "connector session closed, session locks swept");
  result
}

async fn handshake<S: Store>(write: &mut WsWrite, registry: &Arc<Registry<S>>, server_id: &str) -> SyncOutcome<()> {
  send_frame(write, event::AUTH_SUCCESS, &AuthSuccessFrame { server_id: server_id.to_string() }).await?;
  let connected_players = registry.player_count(server_id).await? as usize;
  send_frame(
    write,
    event::SERVER_INFO,
    &ServerInfoFrame { server_id: server_id.to_string(), connected_players },
  )
  .await
}

async fn serve_frames<S: Store + 'static, A: AuditSink + 'static>(
  write: &mut WsWrite,
  read: &mut WsRead,
  engine: &Arc<SyncEngine<S, A>>,
  server: &crate::domain::GameServer,
  request_timeout: Duration,
) -> SyncOutcome<()> {
  while let Some(message) = read.next().await {
    match message? {
      Message::Text(text) => {
        if let Err(err) = dispatch(write, engine, server, &text, request_timeout).await {
          warn!(server_id = %server.server_id, error = %err, "failed to dispatch frame");
        }
      }
      Message::Close(_) => break,
      Message::Ping(payload) => {
        write.send(Message::Pong(payload)).await?;
      }
      _ => {}
    }
  }
  Ok(())
}

/// Bounds how long a single request is allowed to wait on the engine's
/// response, per SPEC_FULL.md §5 ("per-request wait on a game-server
/// response is bounded, default 10s"). An elapsed timeout becomes an
/// `Internal` error so the caller still gets an ack/error frame rather than
/// hanging forever on a stuck transaction.
async fn with_timeout<T>(request_timeout: Duration, fut: impl std::future::Future<Output = SyncOutcome<T>>) -> SyncOutcome<T> {
  match timeout(request_timeout, fut).await {
    Ok(result) => result,
    Err(_) => Err(SyncError::Internal(format!("request timed out after {}ms", request_timeout.as_millis()))),
  }
}

async fn dispatch<S: Store + 'static, A: AuditSink + 'static>(
  write: &mut WsWrite,
  engine: &Arc<SyncEngine<S, A>>,
  server: &crate::domain::GameServer,
  text: &str,
  request_timeout: Duration,
) -> SyncOutcome<()> {
  let Envelope(evt, data) = serde_json::from_str(text)?;

  match evt.as_str() {
    event::PLAYER_CONNECT => {
      let req: ConnectRequest = serde_json::from_value(data)?;
      let outcome =
        with_timeout(request_timeout, engine.connect(server, &req.steam_id, req.eos_id.as_deref(), req.name.as_deref())).await;
      let event_name = match &outcome {
        Ok(_) => event::PLAYER_DATA,
        Err(SyncError::ActiveElsewhere { .. }) => event::PLAYER_WAIT,
        Err(_) => event::PLAYER_ERROR,
      };
      send_frame(write, event_name, &ConnectFrame::from_outcome(&req.steam_id, outcome)).await
    }
    event::PLAYER_SYNC => {
      let doc: PlayerDocument = serde_json::from_value(data)?;
      let steam_id = doc.steam_id.clone();
      let outcome = with_timeout(request_timeout, engine.periodic_sync(server, &doc)).await;
      let event_name = if outcome.is_ok() { event::SYNC_ACK } else { event::SYNC_ERROR };
      send_frame(write, event_name, &SyncFrame::from_outcome(&steam_id, outcome)).await
    }
    event::PLAYER_DISCONNECT => {
      let doc: PlayerDocument = serde_json::from_value(data)?;
      let steam_id = doc.steam_id.clone();
      let outcome = with_timeout(request_timeout, engine.disconnect(server, &doc)).await;
      let event_name = if outcome.is_ok() { event::DISCONNECT_ACK } else { event::DISCONNECT_ERROR };
      send_frame(write, event_name, &DisconnectFrame::from_outcome(&steam_id, outcome)).await
    }
    event::PLAYER_CRASH_RECOVERY => {
      let doc: PlayerDocument = serde_json::from_value(data)?;
      let steam_id = doc.steam_id.clone();
      let outcome = with_timeout(request_timeout, engine.crash_recovery(server, &doc)).await;
      let event_name = if outcome.is_ok() { event::RECOVERY_ACK } else { event::RECOVERY_ERROR };
      send_frame(write, event_name, &RecoveryFrame::from_outcome(&steam_id, outcome)).await
    }
    event::PLAYER_BATCH_CRASH_RECOVERY => {
      let batch: BatchCrashRecoveryRequest = serde_json::from_value(data)?;
      if batch.players.len() > MAX_BATCH_SIZE {
        let err = ErrorFrame {
          steam_id: String::new(),
          error: "ValidationFailed",
          errors: Some(vec![format!("batch exceeds {MAX_BATCH_SIZE} entries")]),
        };
        return send_frame(write, event::PLAYER_ERROR, &err).await;
      }
      let summary = match timeout(request_timeout, engine.batch_crash_recovery(server, &batch.players)).await {
        Ok(summary) => summary,
        Err(_) => {
          let err = ErrorFrame { steam_id: String::new(), error: "Internal", errors: None };
          return send_frame(write, event::PLAYER_ERROR, &err).await;
        }
      };
      send_frame(write, event::BATCH_RECOVERY_COMPLETE, &BatchRecoveryCompleteFrame::from(&summary)).await
    }
    other => {
      warn!(server_id = %server.server_id, event = other, "unrecognized frame, ignoring");
      Ok(())
    }
  }
}

async fn send_frame<T: Serialize>(write: &mut WsWrite, event: &str, data: &T) -> SyncOutcome<()> {
  let payload = Envelope(event.to_string(), serde_json::to_value(data)?);
  let text = serde_json::to_string(&payload)?;
  write.send(Message::Text(text.into())).await?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn backoff_doubles_until_capped() {
    let backoff = Backoff { initial: Duration::from_millis(100), max: Duration::from_secs(30), max_attempts: 0 };
    assert_eq!(backoff.delay_for(0), Duration::from_millis(100));
    assert_eq!(backoff.delay_for(1), Duration::from_millis(200));
    assert_eq!(backoff.delay_for(2), Duration::from_millis(400));
    assert_eq!(backoff.delay_for(20), Duration::from_secs(30));
  }

  #[test]
  fn envelope_round_trips_through_json() {
    let payload = Envelope("player:sync".to_string(), serde_json::json!({"steamId": "1"}));
    let text = serde_json::to_string(&payload).unwrap();
    let Envelope(evt, data) = serde_json::from_str(&text).unwrap();
    assert_eq!(evt, "player:sync");
    assert_eq!(data["steamId"], "1");
  }

  #[tokio::test]
  async fn with_timeout_passes_through_a_fast_result() {
    let result = with_timeout(Duration::from_millis(50), async { Ok::<_, SyncError>(42) }).await;
    assert_eq!(result.unwrap(), 42);
  }

  #[tokio::test]
  async fn with_timeout_converts_an_elapsed_wait_to_internal_error() {
    let result = with_timeout(Duration::from_millis(1), async {
      sleep(Duration::from_millis(50)).await;
      Ok::<_, SyncError>(())
    })
    .await;
    assert!(matches!(result, Err(SyncError::Internal(_))));
  }
}
