//! `SyncEngine` (SPEC_FULL.md §4.2): the four session operations plus batch
//! crash recovery, each running inside one Store transaction and leaving an
//! audit trail behind regardless of outcome.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::audit::{AuditRecord, AuditSink};
use crate::document::{self, PlayerDocument};
use crate::domain::{AuditKind, GameServer, PlayerStats};
use crate::error::{SyncError, SyncOutcome};
use crate::store::{SkinsUpsert, StatsUpsert, Store};

/// Session ownership expires this long after `activeSince` with no writes.
pub const ACTIVE_SERVER_TIMEOUT_SECS: i64 = 30;
/// Maximum forward jump of `syncSeq` a normal sync may make in one call.
pub const SEQ_TOLERANCE_NORMAL: i64 = 10;
/// Same, widened for crash recovery since the originating session is dead.
pub const SEQ_TOLERANCE_RECOVERY: i64 = 100;

pub struct ConnectResult {
  pub document: PlayerDocument,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
  pub sync_seq: i64,
  pub flagged: bool,
  pub flag_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectResult {
  pub sync_seq: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryResult {
  pub sync_seq: i64,
  pub skipped: bool,
  pub skip_reason: Option<String>,
  pub flagged: bool,
  pub flag_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecoveryEntry {
  pub steam_id: String,
  pub ok: bool,
  pub result: Option<RecoveryResult>,
  pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecoveryResult {
  pub total: usize,
  pub successful: usize,
  pub failed: usize,
  pub per_player_results: Vec<BatchRecoveryEntry>,
}

pub struct SyncEngine<S: Store, A: AuditSink> {
  store: Arc<S>,
  audit: Arc<A>,
}

impl<S: Store, A: AuditSink> SyncEngine<S, A> {
  #[must_use]
  pub fn new(store: Arc<S>, audit: Arc<A>) -> Self {
    SyncEngine { store, audit }
  }

  /// Timestamp of the player's most recent audited operation, for the HTTP
  /// `status` endpoint. Read-only, no transaction needed.
  pub async fn last_sync_time(&self, steam_id: &str) -> SyncOutcome<Option<DateTime<Utc>>> {
    self.store.last_audit_time(steam_id).await
  }

  /// Full current document for the HTTP `get_player` endpoint, including
  /// tracking state. Read-only: opens a transaction only because
  /// `find_player_full` is defined against `Store::Tx`, and always rolls
  /// back rather than committing.
  pub async fn fetch_player(&self, steam_id: &str) -> SyncOutcome<Option<document::PlayerDocument>> {
    let mut tx = self.store.begin().await?;
    let full = self.store.find_player_full(&mut tx, steam_id).await;
    let _ = self.store.rollback(tx).await;
    Ok(full?.map(|full| full.to_document(true)))
  }

  #[instrument(skip(self), fields(steam_id, server_id = %server.server_id))]
  pub async fn connect(
    &self,
    server: &GameServer,
    steam_id: &str,
    eos_id: Option<&str>,
    name: Option<&str>,
  ) -> SyncOutcome<ConnectResult> {
    if !document::is_steam_id(steam_id) {
      return Err(SyncError::validation(vec![format!("steamId: must be 17 decimal digits, got {steam_id:?}")]));
    }

    let mut tx = self.store.begin().await?;
    let result = self.connect_inner(&mut tx, server, steam_id, eos_id, name).await;
    match result {
      Ok(outcome) => {
        self.store.commit(tx).await?;
        Ok(outcome)
      }
      Err(err) => {
        self.store.rollback(tx).await?;
        Err(err)
      }
    }
  }

  async fn connect_inner(
    &self,
    tx: &mut S::Tx,
    server: &GameServer,
    steam_id: &str,
    eos_id: Option<&str>,
    name: Option<&str>,
  ) -> SyncOutcome<ConnectResult> {
    let full = self.store.find_or_create_player(tx, steam_id).await?;
    let now = Utc::now();

    if let Some(active_server) = full.player.active_server_id.clone() {
      if active_server != server.server_id {
        let active_since = full.player.active_since.unwrap_or(now);
        if (now - active_since).num_seconds() < ACTIVE_SERVER_TIMEOUT_SECS {
          return Err(SyncError::ActiveElsewhere {
            active_server,
            active_since,
            wait_ms: (ACTIVE_SERVER_TIMEOUT_SECS * 1000) as u64,
          });
        }
      }
    }

    let swapped = self
      .store
      .try_set_active_server(tx, full.player.id, full.player.active_server_id.as_deref(), Some(&server.server_id), Some(now))
      .await?;
    if !swapped {
      // Lost the optimistic race -- re-read and report whoever actually won.
      let current = self.store.find_player_full(tx, steam_id).await?.ok_or(SyncError::PlayerNotFound)?;
      let active_server = current.player.active_server_id.unwrap_or_default();
      let active_since = current.player.active_since.unwrap_or(now);
      return Err(SyncError::ActiveElsewhere {
        active_server,
        active_since,
        wait_ms: (ACTIVE_SERVER_TIMEOUT_SECS * 1000) as u64,
      });
    }

    if eos_id.is_some() || name.is_some() {
      self.store.update_player_identity(tx, full.player.id, eos_id, name, full.player.sync_seq).await?;
    }

    let seq_after = full.player.sync_seq;
    self
      .store
      .insert_audit_entry(
        tx,
        &server.server_id,
        steam_id,
        AuditKind::Connect,
        None,
        Some(seq_after),
        serde_json::Value::Null,
        full.audit_summary(),
        false,
        None,
        0,
      )
      .await?;
    self
      .audit
      .record(AuditRecord {
        server_id: server.server_id.clone(),
        player_steam_id: steam_id.to_string(),
        kind: AuditKind::Connect,
        seq_before: None,
        seq_after: Some(seq_after),
        before_summary: serde_json::Value::Null,
        after_summary: full.audit_summary(),
        flagged: false,
        flag_reason: None,
        duration_ms: 0,
      })
      .await;

    info!(steam_id, server_id = %server.server_id, "player connected");
    Ok(ConnectResult { document: full.to_document(false) })
  }

  #[instrument(skip(self, doc), fields(steam_id = %doc.steam_id, server_id = %server.server_id))]
  pub async fn periodic_sync(&self, server: &GameServer, doc: &PlayerDocument) -> SyncOutcome<SyncResult> {
    self.apply_sync(server, doc, AuditKind::Periodic, true, false).await
  }

  #[instrument(skip(self, doc), fields(steam_id = %doc.steam_id, server_id = %server.server_id))]
  pub async fn disconnect(&self, server: &GameServer, doc: &PlayerDocument) -> SyncOutcome<DisconnectResult> {
    let result = self.apply_sync(server, doc, AuditKind::Disconnect, true, true).await?;
    Ok(DisconnectResult { sync_seq: result.sync_seq })
  }

  /// Shared writer for PeriodicSync and Disconnect (SPEC_FULL.md §4.2.2/3).
  /// `release_session` clears the session lock after writes, as Disconnect
  /// requires; `enforce_tolerance` toggles the normal (10) vs recovery (100)
  /// sequence tolerance.
  async fn apply_sync(
    &self,
    server: &GameServer,
    doc: &PlayerDocument,
    kind: AuditKind,
    reject_on_seq_violation: bool,
    release_session: bool,
  ) -> SyncOutcome<SyncResult> {
    let started = Utc::now();
    let errors = document::validate(doc);
    if !errors.is_empty() {
      return Err(SyncError::validation(errors));
    }

    let mut tx = self.store.begin().await?;
    let result = self
      .apply_sync_inner(&mut tx, server, doc, kind, reject_on_seq_violation, release_session, started)
      .await;
    match result {
      Ok(outcome) => {
        self.store.commit(tx).await?;
        Ok(outcome)
      }
      Err(err) => {
        self.store.rollback(tx).await?;
        Err(err)
      }
    }
  }

  #[allow(clippy::too_many_arguments)]
  async fn apply_sync_inner(
    &self,
    tx: &mut S::Tx,
    server: &GameServer,
    doc: &PlayerDocument,
    kind: AuditKind,
    reject_on_seq_violation: bool,
    release_session: bool,
    started: DateTime<Utc>,
  ) -> SyncOutcome<SyncResult> {
    let full = self.store.find_player_full(tx, &doc.steam_id).await?.ok_or(SyncError::PlayerNotFound)?;

    if full.player.active_server_id.as_deref() != Some(server.server_id.as_str()) {
      return Err(SyncError::NotSessionOwner {
        active_server: full.player.active_server_id.clone().unwrap_or_default(),
        requesting_server: server.server_id.clone(),
      });
    }

    let stored_seq = full.player.sync_seq;
    let tolerance = if reject_on_seq_violation { SEQ_TOLERANCE_NORMAL } else { SEQ_TOLERANCE_RECOVERY };
    if doc.sync_seq < stored_seq || doc.sync_seq - stored_seq > tolerance {
      return Err(SyncError::InvalidSyncSeq { expected_seq: stored_seq });
    }

    let flag_reason = check_deltas(&full.associations.stats, doc);
    let flagged = flag_reason.is_some();
    if flagged {
      warn!(steam_id = %doc.steam_id, server_id = %server.server_id, reason = flag_reason.as_deref(), "sync flagged");
    }

    let before_summary = full.audit_summary();
    self.write_document(tx, full.player.id, doc).await?;
    self.store.update_player_identity(tx, full.player.id, doc.eos_id.as_deref(), doc.name.as_deref(), doc.sync_seq).await?;

    if release_session {
      self.store.try_set_active_server(tx, full.player.id, Some(server.server_id.as_str()), None, None).await?;
    }

    let after = self.store.find_player_full(tx, &doc.steam_id).await?.ok_or(SyncError::PlayerNotFound)?;
    let duration_ms = (Utc::now() - started).num_milliseconds();
    self
      .store
      .insert_audit_entry(
        tx,
        &server.server_id,
        &doc.steam_id,
        kind,
        Some(stored_seq),
        Some(doc.sync_seq),
        before_summary.clone(),
        after.audit_summary(),
        flagged,
        flag_reason.as_deref(),
        duration_ms,
      )
      .await?;
    self
      .audit
      .record(AuditRecord {
        server_id: server.server_id.clone(),
        player_steam_id: doc.steam_id.clone(),
        kind,
        seq_before: Some(stored_seq),
        seq_after: Some(doc.sync_seq),
        before_summary,
        after_summary: after.audit_summary(),
        flagged,
        flag_reason: flag_reason.clone(),
        duration_ms,
      })
      .await;

    Ok(SyncResult { sync_seq: doc.sync_seq, flagged, flag_reason })
  }

  #[instrument(skip(self, doc), fields(steam_id = %doc.steam_id, server_id = %server.server_id))]
  pub async fn crash_recovery(&self, server: &GameServer, doc: &PlayerDocument) -> SyncOutcome<RecoveryResult> {
    let started = Utc::now();
    let errors = document::validate(doc);
    if !errors.is_empty() {
      return Err(SyncError::validation(errors));
    }

    let mut tx = self.store.begin().await?;
    let result = self.crash_recovery_inner(&mut tx, server, doc, started).await;
    match result {
      Ok(outcome) => {
        self.store.commit(tx).await?;
        Ok(outcome)
      }
      Err(err) => {
        self.store.rollback(tx).await?;
        Err(err)
      }
    }
  }

  async fn crash_recovery_inner(
    &self,
    tx: &mut S::Tx,
    server: &GameServer,
    doc: &PlayerDocument,
    started: DateTime<Utc>,
  ) -> SyncOutcome<RecoveryResult> {
    let full = self.store.find_player_full(tx, &doc.steam_id).await?.ok_or(SyncError::PlayerNotFound)?;
    let stored_seq = full.player.sync_seq;

    if doc.sync_seq < stored_seq {
      let duration_ms = (Utc::now() - started).num_milliseconds();
      self
        .store
        .insert_audit_entry(
          tx,
          &server.server_id,
          &doc.steam_id,
          AuditKind::CrashRecovery,
          Some(stored_seq),
          Some(stored_seq),
          full.audit_summary(),
          full.audit_summary(),
          false,
          Some("stale_data"),
          duration_ms,
        )
        .await?;
      self
        .audit
        .record(AuditRecord {
          server_id: server.server_id.clone(),
          player_steam_id: doc.steam_id.clone(),
          kind: AuditKind::CrashRecovery,
          seq_before: Some(stored_seq),
          seq_after: Some(stored_seq),
          before_summary: full.audit_summary(),
          after_summary: full.audit_summary(),
          flagged: false,
          flag_reason: Some("stale_data".to_string()),
          duration_ms,
        })
        .await;
      return Ok(RecoveryResult {
        sync_seq: stored_seq,
        skipped: true,
        skip_reason: Some("stale_data".to_string()),
        flagged: false,
        flag_reason: None,
      });
    }

    let mut flag_reason = check_deltas(&full.associations.stats, doc);
    if doc.sync_seq - stored_seq > SEQ_TOLERANCE_RECOVERY {
      let seq_note = format!("syncSeq jumped {} above stored {}", doc.sync_seq, stored_seq);
      flag_reason = Some(match flag_reason {
        Some(existing) => format!("{existing}; {seq_note}"),
        None => seq_note,
      });
    }
    let flagged = flag_reason.is_some();

    self.store.try_set_active_server(tx, full.player.id, full.player.active_server_id.as_deref(), None, None).await?;

    let before_summary = full.audit_summary();
    self.write_document(tx, full.player.id, doc).await?;
    self.store.update_player_identity(tx, full.player.id, doc.eos_id.as_deref(), doc.name.as_deref(), doc.sync_seq).await?;

    let after = self.store.find_player_full(tx, &doc.steam_id).await?.ok_or(SyncError::PlayerNotFound)?;
    let duration_ms = (Utc::now() - started).num_milliseconds();
    self
      .store
      .insert_audit_entry(
        tx,
        &server.server_id,
        &doc.steam_id,
        AuditKind::CrashRecovery,
        Some(stored_seq),
        Some(doc.sync_seq),
        before_summary.clone(),
        after.audit_summary(),
        flagged,
        flag_reason.as_deref(),
        duration_ms,
      )
      .await?;
    self
      .audit
      .record(AuditRecord {
        server_id: server.server_id.clone(),
        player_steam_id: doc.steam_id.clone(),
        kind: AuditKind::CrashRecovery,
        seq_before: Some(stored_seq),
        seq_after: Some(doc.sync_seq),
        before_summary,
        after_summary: after.audit_summary(),
        flagged,
        flag_reason: flag_reason.clone(),
        duration_ms,
      })
      .await;

    Ok(RecoveryResult { sync_seq: doc.sync_seq, skipped: false, skip_reason: None, flagged, flag_reason })
  }

  /// Processes each document independently; one entry's failure never
  /// aborts the others (SPEC_FULL.md §4.2.5). Callers are expected to have
  /// already rejected batches over the 100-entry cap (§5).
  pub async fn batch_crash_recovery(&self, server: &GameServer, docs: &[PlayerDocument]) -> BatchRecoveryResult {
    let mut per_player_results = Vec::with_capacity(docs.len());
    let mut successful = 0;
    let mut failed = 0;

    for doc in docs {
      match self.crash_recovery(server, doc).await {
        Ok(result) => {
          successful += 1;
          per_player_results.push(BatchRecoveryEntry {
            steam_id: doc.steam_id.clone(),
            ok: true,
            result: Some(result),
            error: None,
          });
        }
        Err(err) => {
          failed += 1;
          per_player_results.push(BatchRecoveryEntry {
            steam_id: doc.steam_id.clone(),
            ok: false,
            result: None,
            error: Some(err.to_string()),
          });
        }
      }
    }

    BatchRecoveryResult { total: docs.len(), successful, failed, per_player_results }
  }

  /// Writes every table PeriodicSync/Disconnect/CrashRecovery touch, in the
  /// upsert/replace semantics SPEC_FULL.md §4.2.2 lays out.
  async fn write_document(&self, tx: &mut S::Tx, player_id: i64, doc: &PlayerDocument) -> SyncOutcome<()> {
    self
      .store
      .upsert_stats(
        tx,
        player_id,
        &StatsUpsert {
          currency: doc.stats.currency,
          currency_total: doc.stats.currency_total,
          currency_spent: doc.stats.currency_spent,
          xp: doc.stats.xp,
          xp_total: doc.stats.xp_total,
          prestige: doc.stats.prestige,
          perma_tokens: doc.stats.perma_tokens,
          daily_claims: doc.stats.daily_claims,
          games_played: doc.stats.games_played,
          time_played: doc.stats.time_played,
          join_time: doc.stats.join_time,
          daily_claim_time: doc.stats.daily_claim_time,
        },
      )
      .await?;

    self
      .store
      .upsert_skins(
        tx,
        player_id,
        &SkinsUpsert { indfor: doc.skins.indfor.clone(), blufor: doc.skins.blufor.clone(), redfor: doc.skins.redfor.clone() },
      )
      .await?;

    self.store.upsert_supporter_status(tx, player_id, &doc.supporter_status).await?;

    let slots = doc
      .loadout
      .iter()
      .map(|l| crate::domain::LoadoutSlot { player_id, slot: l.slot, family: l.family.clone(), item: l.item.clone(), count: l.count })
      .collect::<Vec<_>>();
    self.store.replace_loadout(tx, player_id, &slots).await?;
    self.store.replace_perks(tx, player_id, &doc.perks).await?;
    self.store.upsert_permanent_unlocks(tx, player_id, &doc.perma_unlocks).await?;

    if let Some(tracking) = &doc.tracking {
      self.store.upsert_tracking(tx, player_id, tracking).await?;
    }

    Ok(())
  }
}

/// Flags (never rejects) a sync whose stat deltas exceed the limits in
/// SPEC_FULL.md §4.2.2. Returns the combined human-readable reason, if any.
fn check_deltas(prev: &PlayerStats, new: &crate::document::StatsDoc) -> Option<String> {
  let mut reasons = Vec::new();

  let currency_earned = new.currency_total - prev.currency_total;
  if currency_earned > 50_000 {
    reasons.push(format!("Currency gain {currency_earned} exceeds 50000"));
  }
  let currency_spent_delta = new.currency_spent - prev.currency_spent;
  if currency_spent_delta > 50_000 {
    reasons.push(format!("currency spent {currency_spent_delta} exceeds 50000"));
  }
  let xp_delta = new.xp_total - prev.xp_total;
  if xp_delta > 100_000 {
    reasons.push(format!("xp gain {xp_delta} exceeds 100000"));
  }
  let prestige_delta = i64::from(new.prestige) - i64::from(prev.prestige);
  if prestige_delta > 1 {
    reasons.push(format!("prestige jump {prestige_delta} exceeds 1"));
  }
  let perma_tokens_delta = new.perma_tokens - prev.perma_tokens;
  if perma_tokens_delta > 10 {
    reasons.push(format!("permaTokens gain {perma_tokens_delta} exceeds 10"));
  }
  let time_played_delta = new.time_played - prev.time_played;
  if time_played_delta > 7_200 {
    reasons.push(format!("timePlayed gain {time_played_delta}s exceeds 7200s"));
  }

  (!reasons.is_empty()).then(|| reasons.join("; "))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::audit::FakeAuditSink;
  use crate::domain::GameServer;
  use crate::store::FakeStore;

  fn server(id: &str) -> GameServer {
    GameServer { id: 1, server_id: id.to_string(), token: "tok".to_string(), active: true, flagged: false, flag_reason: None, last_seen: None }
  }

  fn engine() -> SyncEngine<FakeStore, FakeAuditSink> {
    SyncEngine::new(Arc::new(FakeStore::new()), Arc::new(FakeAuditSink::new()))
  }

  const STEAM_ID: &str = "76561198000000001";

  fn doc(seq: i64) -> PlayerDocument {
    PlayerDocument {
      v: 2,
      steam_id: STEAM_ID.to_string(),
      eos_id: None,
      name: None,
      server_id: Some("serverA".to_string()),
      last_sync: Utc::now(),
      sync_seq: seq,
      stats: crate::document::StatsDoc::default(),
      skins: crate::document::SkinsDoc::default(),
      loadout: vec![],
      perks: vec![],
      perma_unlocks: vec![],
      supporter_status: vec![],
      tracking: None,
    }
  }

  #[tokio::test]
  async fn connect_creates_player_and_claims_session() {
    let engine = engine();
    let result = engine.connect(&server("serverA"), STEAM_ID, None, None).await.unwrap();
    assert_eq!(result.document.sync_seq, 0);
    assert!(result.document.tracking.is_none());
  }

  #[tokio::test]
  async fn second_server_contends_within_timeout() {
    let engine = engine();
    engine.connect(&server("serverA"), STEAM_ID, None, None).await.unwrap();
    let err = engine.connect(&server("serverB"), STEAM_ID, None, None).await.unwrap_err();
    assert!(matches!(err, SyncError::ActiveElsewhere { .. }));
  }

  #[tokio::test]
  async fn periodic_sync_rejects_non_owner() {
    let engine = engine();
    engine.connect(&server("serverA"), STEAM_ID, None, None).await.unwrap();
    let err = engine.periodic_sync(&server("serverB"), &doc(1)).await.unwrap_err();
    assert!(matches!(err, SyncError::NotSessionOwner { .. }));
  }

  #[tokio::test]
  async fn periodic_sync_rejects_seq_regression() {
    let engine = engine();
    engine.connect(&server("serverA"), STEAM_ID, None, None).await.unwrap();
    engine.periodic_sync(&server("serverA"), &doc(5)).await.unwrap();
    let err = engine.periodic_sync(&server("serverA"), &doc(2)).await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidSyncSeq { .. }));
  }

  #[tokio::test]
  async fn periodic_sync_rejects_seq_jump_past_tolerance() {
    let engine = engine();
    engine.connect(&server("serverA"), STEAM_ID, None, None).await.unwrap();
    let err = engine.periodic_sync(&server("serverA"), &doc(SEQ_TOLERANCE_NORMAL + 1)).await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidSyncSeq { .. }));
  }

  #[tokio::test]
  async fn periodic_sync_flags_without_rejecting_on_large_delta() {
    let engine = engine();
    engine.connect(&server("serverA"), STEAM_ID, None, None).await.unwrap();
    let mut d = doc(1);
    d.stats.currency_total = 60_000;
    let result = engine.periodic_sync(&server("serverA"), &d).await.unwrap();
    assert!(result.flagged);
    assert_eq!(result.sync_seq, 1);
  }

  #[tokio::test]
  async fn disconnect_releases_session_lock() {
    let engine = engine();
    engine.connect(&server("serverA"), STEAM_ID, None, None).await.unwrap();
    engine.disconnect(&server("serverA"), &doc(1)).await.unwrap();
    let reconnect = engine.connect(&server("serverB"), STEAM_ID, None, None).await.unwrap();
    assert_eq!(reconnect.document.steam_id, STEAM_ID);
  }

  #[tokio::test]
  async fn crash_recovery_skips_stale_data() {
    let engine = engine();
    engine.connect(&server("serverA"), STEAM_ID, None, None).await.unwrap();
    engine.periodic_sync(&server("serverA"), &doc(5)).await.unwrap();
    let result = engine.crash_recovery(&server("serverA"), &doc(2)).await.unwrap();
    assert!(result.skipped);
    assert_eq!(result.skip_reason.as_deref(), Some("stale_data"));
  }

  #[tokio::test]
  async fn crash_recovery_releases_session_lock() {
    let engine = engine();
    engine.connect(&server("serverA"), STEAM_ID, None, None).await.unwrap();
    engine.crash_recovery(&server("serverA"), &doc(1)).await.unwrap();
    let reconnect = engine.connect(&server("serverB"), STEAM_ID, None, None).await.unwrap();
    assert_eq!(reconnect.document.steam_id, STEAM_ID);
  }

  #[tokio::test]
  async fn batch_crash_recovery_isolates_failures() {
    let engine = engine();
    engine.connect(&server("serverA"), STEAM_ID, None, None).await.unwrap();
    let unknown_steam_id = "76561198000000099".to_string();
    let docs = vec![doc(1), PlayerDocument { steam_id: unknown_steam_id, ..doc(1) }];
    let summary = engine.batch_crash_recovery(&server("serverA"), &docs).await;
    assert_eq!(summary.total, 2);
    assert_eq!(summary.successful, 1);
    assert_eq!(summary.failed, 1);
  }

  #[tokio::test]
  async fn last_sync_time_reflects_most_recent_audited_operation() {
    let engine = engine();
    assert!(engine.last_sync_time(STEAM_ID).await.unwrap().is_none());
    engine.connect(&server("serverA"), STEAM_ID, None, None).await.unwrap();
    assert!(engine.last_sync_time(STEAM_ID).await.unwrap().is_some());
  }

  #[tokio::test]
  async fn fetch_player_returns_full_document_with_tracking() {
    let engine = engine();
    engine.connect(&server("serverA"), STEAM_ID, None, None).await.unwrap();
    let mut disconnect_doc = doc(1);
    let mut tracking = crate::document::TrackingDoc::default();
    tracking.kills.insert("76561198000000099".to_string(), 3);
    disconnect_doc.tracking = Some(tracking);
    engine.disconnect(&server("serverA"), &disconnect_doc).await.unwrap();

    let fetched = engine.fetch_player(STEAM_ID).await.unwrap().unwrap();
    assert_eq!(fetched.sync_seq, 1);
    assert!(fetched.tracking.is_some(), "fetch_player includes tracking, unlike Connect");
  }

  #[tokio::test]
  async fn fetch_player_returns_none_for_unknown_steam_id() {
    let engine = engine();
    assert!(engine.fetch_player("76561198099999999").await.unwrap().is_none());
  }
}
