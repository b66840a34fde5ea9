//! End-to-end scenarios (SPEC_FULL.md §8) against the in-memory Store/Sink,
//! exercising `SyncEngine` the way a Connector would: full documents in,
//! tagged outcomes out.

use std::sync::Arc;

use sync_core::audit::FakeAuditSink;
use sync_core::document::{PlayerDocument, SkinsDoc, StatsDoc, TrackingDoc};
use sync_core::domain::GameServer;
use sync_core::engine::SyncEngine;
use sync_core::error::SyncError;
use sync_core::registry::Registry;
use sync_core::store::FakeStore;

fn server(id: &str) -> GameServer {
  GameServer { id: 1, server_id: id.to_string(), token: format!("tok-{id}"), active: true, flagged: false, flag_reason: None, last_seen: None }
}

fn engine() -> SyncEngine<FakeStore, FakeAuditSink> {
  SyncEngine::new(Arc::new(FakeStore::new()), Arc::new(FakeAuditSink::new()))
}

fn base_doc(steam_id: &str, seq: i64) -> PlayerDocument {
  PlayerDocument {
    v: 2,
    steam_id: steam_id.to_string(),
    eos_id: None,
    name: None,
    server_id: Some("serverA".to_string()),
    last_sync: chrono::Utc::now(),
    sync_seq: seq,
    stats: StatsDoc::default(),
    skins: SkinsDoc::default(),
    loadout: vec![],
    perks: vec![],
    perma_unlocks: vec![],
    supporter_status: vec![],
    tracking: None,
  }
}

const PLAYER_X: &str = "76561198000000001";

#[tokio::test]
async fn fresh_player_connects_with_defaults() {
  let engine = engine();
  let result = engine.connect(&server("serverA"), PLAYER_X, None, None).await.unwrap();
  assert_eq!(result.document.sync_seq, 0);
  assert_eq!(result.document.stats.currency, 0);
  assert!(result.document.tracking.is_none(), "Connect never returns tracking data");
}

#[tokio::test]
async fn server_hop_contention_rejects_second_server() {
  let engine = engine();
  engine.connect(&server("serverA"), PLAYER_X, None, None).await.unwrap();

  let err = engine.connect(&server("serverB"), PLAYER_X, None, None).await.unwrap_err();
  match err {
    SyncError::ActiveElsewhere { active_server, .. } => assert_eq!(active_server, "serverA"),
    other => panic!("expected ActiveElsewhere, got {other:?}"),
  }

  // A's view is untouched by B's failed attempt.
  let err = engine.periodic_sync(&server("serverB"), &base_doc(PLAYER_X, 1)).await.unwrap_err();
  assert!(matches!(err, SyncError::NotSessionOwner { .. }));
}

#[tokio::test]
async fn periodic_sync_then_disconnect_persists_tracking_and_releases_lock() {
  let engine = engine();
  engine.connect(&server("serverA"), PLAYER_X, None, None).await.unwrap();

  let mut sync_doc = base_doc(PLAYER_X, 1);
  sync_doc.stats.currency = 100;
  let ack = engine.periodic_sync(&server("serverA"), &sync_doc).await.unwrap();
  assert_eq!(ack.sync_seq, 1);
  assert!(!ack.flagged);

  let mut disconnect_doc = base_doc(PLAYER_X, 2);
  disconnect_doc.stats.currency = 200;
  let mut tracking = TrackingDoc::default();
  tracking.kills.insert("76561198000000099".to_string(), 5);
  disconnect_doc.tracking = Some(tracking);

  let ack = engine.disconnect(&server("serverA"), &disconnect_doc).await.unwrap();
  assert_eq!(ack.sync_seq, 2);

  // The session lock is released -- a different server can now claim the player.
  let reconnect = engine.connect(&server("serverB"), PLAYER_X, None, None).await.unwrap();
  assert_eq!(reconnect.document.stats.currency, 200);
}

#[tokio::test]
async fn stale_crash_recovery_is_skipped_without_writes() {
  let engine = engine();
  engine.connect(&server("serverA"), PLAYER_X, None, None).await.unwrap();
  engine.periodic_sync(&server("serverA"), &base_doc(PLAYER_X, 10)).await.unwrap();

  let result = engine.crash_recovery(&server("serverA"), &base_doc(PLAYER_X, 7)).await.unwrap();
  assert!(result.skipped);
  assert_eq!(result.skip_reason.as_deref(), Some("stale_data"));
  assert_eq!(result.sync_seq, 10, "stale recovery must not move the stored sequence backward");
}

#[tokio::test]
async fn large_delta_flags_but_still_commits() {
  let engine = engine();
  engine.connect(&server("serverA"), PLAYER_X, None, None).await.unwrap();

  let mut doc = base_doc(PLAYER_X, 1);
  doc.stats.currency_total = 60_000;
  let ack = engine.periodic_sync(&server("serverA"), &doc).await.unwrap();
  assert!(ack.flagged);
  assert!(ack.flag_reason.as_deref().unwrap().contains("Currency gain"));

  // The sync still committed despite being flagged.
  let reconnect_attempt = engine.periodic_sync(&server("serverA"), &base_doc(PLAYER_X, 2)).await;
  assert!(reconnect_attempt.is_ok());
}

#[tokio::test]
async fn currency_delta_boundary_exactly_at_limit_does_not_flag() {
  let engine = engine();
  engine.connect(&server("serverA"), PLAYER_X, None, None).await.unwrap();

  let mut doc = base_doc(PLAYER_X, 1);
  doc.stats.currency_total = 50_000;
  let ack = engine.periodic_sync(&server("serverA"), &doc).await.unwrap();
  assert!(!ack.flagged, "exactly the limit must not flag, only exceeding it should");
}

#[tokio::test]
async fn session_sweep_releases_every_player_on_server_drop() {
  let store = Arc::new(FakeStore::new());
  let audit = Arc::new(FakeAuditSink::new());
  let engine = SyncEngine::new(store.clone(), audit);
  store.seed_server("serverA", "tok-a", true);
  let registry = Registry::new(store.clone());

  let steam_ids = [
    "76561198000000001",
    "76561198000000002",
    "76561198000000003",
    "76561198000000004",
    "76561198000000005",
  ];
  for steam_id in steam_ids {
    engine.connect(&server("serverA"), steam_id, None, None).await.unwrap();
  }

  let released = registry.unregister_connection("serverA").await.unwrap();
  assert_eq!(released.len(), 5);

  for steam_id in steam_ids {
    let player = store.player_by_steam_id(steam_id).unwrap();
    assert!(player.active_server_id.is_none());
  }
}

#[tokio::test]
async fn batch_crash_recovery_reports_per_player_outcomes() {
  let engine = engine();
  engine.connect(&server("serverA"), PLAYER_X, None, None).await.unwrap();

  let unknown = "76561198000000099".to_string();
  let docs = vec![base_doc(PLAYER_X, 1), PlayerDocument { steam_id: unknown.clone(), ..base_doc(PLAYER_X, 1) }];
  let summary = engine.batch_crash_recovery(&server("serverA"), &docs).await;

  assert_eq!(summary.total, 2);
  assert_eq!(summary.successful, 1);
  assert_eq!(summary.failed, 1);
  let failed_entry = summary.per_player_results.iter().find(|e| e.steam_id == unknown).unwrap();
  assert!(!failed_entry.ok);
  assert!(failed_entry.error.is_some());
}
