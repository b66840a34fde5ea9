//! Connection registry (SPEC_FULL.md §4.1/§5): resolves a game server's
//! bearer token to its identity, tracks which server ids currently hold a
//! live connection, and sweeps a server's session locks when it drops.

use std::collections::HashSet;
use std::sync::RwLock;

use base64::{engine::general_purpose, Engine as _};
use rand::Rng;
use tracing::{info, warn};

use crate::domain::GameServer;
use crate::error::{SyncError, SyncOutcome};
use crate::store::Store;

/// Generates a fresh, cryptographically random bearer token for a game
/// server, the same way the reference repo mints session keys: 256 bits from
/// the OS RNG, URL-safe base64, no padding.
#[must_use]
pub fn generate_token() -> String {
  general_purpose::URL_SAFE_NO_PAD.encode(rand::thread_rng().gen::<[u8; 32]>())
}

/// Tracks which `server_id`s are presently connected. Purely in-process --
/// restarting the sync core drops this set and every server must
/// reconnect and re-handshake.
pub struct Registry<S: Store> {
  store: std::sync::Arc<S>,
  connected: RwLock<HashSet<String>>,
}

impl<S: Store> Registry<S> {
  #[must_use]
  pub fn new(store: std::sync::Arc<S>) -> Self {
    Registry { store, connected: RwLock::new(HashSet::new()) }
  }

  /// Resolves a bearer token from the WebSocket handshake to the game
  /// server it belongs to. Rejects tokens for deactivated servers. A
  /// flagged server is logged but non-blocking (SPEC_FULL.md §4.1) -- it
  /// still authenticates.
  pub async fn authenticate(&self, token: &str) -> SyncOutcome<GameServer> {
    let server = self.store.find_server_by_token(token).await?.ok_or(SyncError::Unauthenticated)?;
    if !server.active {
      return Err(SyncError::ServerInactive);
    }
    if server.flagged {
      warn!(server_id = %server.server_id, reason = server.flag_reason.as_deref(), "authenticated flagged game server");
    }
    Ok(server)
  }

  pub async fn find_by_server_id(&self, server_id: &str) -> SyncOutcome<Option<GameServer>> {
    self.store.find_server_by_id(server_id).await
  }

  /// Current player count for `server:info`.
  pub async fn player_count(&self, server_id: &str) -> SyncOutcome<i64> {
    self.store.count_players_on_server(server_id).await
  }

  /// Marks `server_id` as connected and bumps its `last_seen` timestamp.
  pub async fn register_connection(&self, server_id: &str) -> SyncOutcome<()> {
    self.connected.write().unwrap().insert(server_id.to_string());
    self.store.touch_server_last_seen(server_id).await?;
    info!(server_id, "game server connected");
    Ok(())
  }

  /// Called when a server's WebSocket connection drops, whether cleanly or
  /// not. Releases every session lock that server held and returns the
  /// steam ids that were freed, so the caller can log or audit the release.
  pub async fn unregister_connection(&self, server_id: &str) -> SyncOutcome<Vec<String>> {
    self.connected.write().unwrap().remove(server_id);
    let released = self.store.sweep_server(server_id).await?;
    if !released.is_empty() {
      warn!(server_id, count = released.len(), "released session locks on disconnect");
    }
    Ok(released)
  }

  #[must_use]
  pub fn is_connected(&self, server_id: &str) -> bool {
    self.connected.read().unwrap().contains(server_id)
  }

  #[must_use]
  pub fn connected_servers(&self) -> Vec<String> {
    self.connected.read().unwrap().iter().cloned().collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::FakeStore;

  #[test]
  fn generates_distinct_tokens() {
    assert_ne!(generate_token(), generate_token());
  }

  #[tokio::test]
  async fn authenticate_rejects_unknown_token() {
    let store = std::sync::Arc::new(FakeStore::new());
    let registry = Registry::new(store);
    let err = registry.authenticate("no-such-token").await.unwrap_err();
    assert!(matches!(err, SyncError::Unauthenticated));
  }

  #[tokio::test]
  async fn authenticate_rejects_inactive_server() {
    let store = std::sync::Arc::new(FakeStore::new());
    store.seed_server("serverA", "tok-a", false);
    let registry = Registry::new(store);
    let err = registry.authenticate("tok-a").await.unwrap_err();
    assert!(matches!(err, SyncError::ServerInactive));
  }

  #[tokio::test]
  async fn authenticate_logs_but_admits_flagged_server() {
    let store = std::sync::Arc::new(FakeStore::new());
    store.seed_flagged_server("serverA", "tok-a", "excessive reconnect rate");
    let registry = Registry::new(store);
    let server = registry.authenticate("tok-a").await.unwrap();
    assert!(server.flagged);
  }

  #[tokio::test]
  async fn register_and_unregister_tracks_connection_state() {
    let store = std::sync::Arc::new(FakeStore::new());
    store.seed_server("serverA", "tok-a", true);
    let registry = Registry::new(store);

    registry.register_connection("serverA").await.unwrap();
    assert!(registry.is_connected("serverA"));

    registry.unregister_connection("serverA").await.unwrap();
    assert!(!registry.is_connected("serverA"));
  }
}
