//! In-memory [`Store`] used by SyncEngine unit tests, mirroring the reference
//! repo's `MockAuthenticator` -- same trait the production type implements,
//! no database required.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::document::TrackingDoc;
use crate::domain::{
  AuditEntry, AuditKind, GameServer, LoadoutSlot, Player, PlayerAssociations, PlayerFull, PlayerPerk, PlayerSkins,
  PlayerStats, SupporterStatus,
};
use crate::error::{SyncError, SyncOutcome};

use super::{SkinsUpsert, StatsUpsert, Store};

#[derive(Clone, Default)]
struct FakeDb {
  next_player_id: i64,
  next_audit_id: i64,
  servers: HashMap<String, GameServer>,
  players: HashMap<String, Player>,
  stats: HashMap<i64, PlayerStats>,
  skins: HashMap<i64, PlayerSkins>,
  supporter: HashMap<i64, SupporterStatus>,
  loadout: HashMap<i64, Vec<LoadoutSlot>>,
  perks: HashMap<i64, Vec<PlayerPerk>>,
  perma_unlocks: HashMap<i64, Vec<crate::domain::PermanentUnlock>>,
  rewards: HashMap<i64, HashMap<String, i64>>,
  kills: HashMap<i64, HashMap<String, i64>>,
  vehicle_kills: HashMap<i64, HashMap<String, i64>>,
  purchases: HashMap<i64, HashMap<String, i64>>,
  weapon_xp: HashMap<i64, HashMap<String, i64>>,
  audit: Vec<AuditEntry>,
}

/// Snapshot-based transaction: `begin` clones the whole database, every
/// mutation lands on the clone, `commit` swaps it back into the shared store,
/// `rollback` just drops it. Fine for tests; would be absurd at production
/// scale, which is exactly why [`PgStore`](super::PgStore) exists.
pub struct FakeTx {
  snapshot: FakeDb,
}

pub struct FakeStore {
  inner: Mutex<FakeDb>,
}

impl Default for FakeStore {
  fn default() -> Self {
    FakeStore { inner: Mutex::new(FakeDb::default()) }
  }
}

impl FakeStore {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Test helper: registers a game server so `Registry` can authenticate it.
  pub fn seed_server(&self, server_id: &str, token: &str, active: bool) {
    let mut db = self.inner.lock().unwrap();
    let id = db.servers.len() as i64 + 1;
    db.servers.insert(
      server_id.to_string(),
      GameServer {
        id,
        server_id: server_id.to_string(),
        token: token.to_string(),
        active,
        flagged: false,
        flag_reason: None,
        last_seen: None,
      },
    );
  }

  /// Test helper: registers a flagged, active game server.
  pub fn seed_flagged_server(&self, server_id: &str, token: &str, flag_reason: &str) {
    let mut db = self.inner.lock().unwrap();
    let id = db.servers.len() as i64 + 1;
    db.servers.insert(
      server_id.to_string(),
      GameServer {
        id,
        server_id: server_id.to_string(),
        token: token.to_string(),
        active: true,
        flagged: true,
        flag_reason: Some(flag_reason.to_string()),
        last_seen: None,
      },
    );
  }

  /// Test helper: inspect committed audit entries.
  pub fn audit_entries(&self) -> Vec<AuditEntry> {
    self.inner.lock().unwrap().audit.clone()
  }

  /// Test helper: read back the committed player row.
  pub fn player_by_steam_id(&self, steam_id: &str) -> Option<Player> {
    self.inner.lock().unwrap().players.get(steam_id).cloned()
  }

  fn associations_for(db: &FakeDb, player_id: i64) -> PlayerAssociations {
    PlayerAssociations {
      stats: db.stats.get(&player_id).cloned().unwrap_or(PlayerStats { player_id, ..PlayerStats::default() }),
      skins: db.skins.get(&player_id).cloned().unwrap_or(PlayerSkins { player_id, ..PlayerSkins::default() }),
      supporter_status: db.supporter.get(&player_id).cloned(),
      loadout: db.loadout.get(&player_id).cloned().unwrap_or_default(),
      perks: db.perks.get(&player_id).cloned().unwrap_or_default(),
      perma_unlocks: db.perma_unlocks.get(&player_id).cloned().unwrap_or_default(),
      rewards: db
        .rewards
        .get(&player_id)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|(reward_type, count)| crate::domain::Reward { player_id, reward_type, count })
        .collect(),
      kills: db
        .kills
        .get(&player_id)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|(victim_steam_id, count)| crate::domain::Kill { player_id, victim_steam_id, count })
        .collect(),
      vehicle_kills: db
        .vehicle_kills
        .get(&player_id)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|(vehicle_name, count)| crate::domain::VehicleKill { player_id, vehicle_name, count })
        .collect(),
      purchases: db
        .purchases
        .get(&player_id)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|(item_name, count)| crate::domain::Purchase { player_id, item_name, count })
        .collect(),
      weapon_xp: db
        .weapon_xp
        .get(&player_id)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|(weapon_name, xp)| crate::domain::WeaponXp { player_id, weapon_name, xp })
        .collect(),
    }
  }
}

#[async_trait]
impl Store for FakeStore {
  type Tx = FakeTx;

  async fn begin(&self) -> SyncOutcome<Self::Tx> {
    Ok(FakeTx { snapshot: self.inner.lock().unwrap().clone() })
  }

  async fn commit(&self, tx: Self::Tx) -> SyncOutcome<()> {
    *self.inner.lock().unwrap() = tx.snapshot;
    Ok(())
  }

  async fn rollback(&self, _tx: Self::Tx) -> SyncOutcome<()> {
    Ok(())
  }

  async fn find_server_by_token(&self, token: &str) -> SyncOutcome<Option<GameServer>> {
    Ok(self.inner.lock().unwrap().servers.values().find(|s| s.token == token).cloned())
  }

  async fn find_server_by_id(&self, server_id: &str) -> SyncOutcome<Option<GameServer>> {
    Ok(self.inner.lock().unwrap().servers.get(server_id).cloned())
  }

  async fn touch_server_last_seen(&self, server_id: &str) -> SyncOutcome<()> {
    if let Some(server) = self.inner.lock().unwrap().servers.get_mut(server_id) {
      server.last_seen = Some(Utc::now());
    }
    Ok(())
  }

  async fn last_audit_time(&self, steam_id: &str) -> SyncOutcome<Option<DateTime<Utc>>> {
    Ok(self.inner.lock().unwrap().audit.iter().filter(|e| e.player_steam_id == steam_id).map(|e| e.created_at).max())
  }

  async fn sweep_server(&self, server_id: &str) -> SyncOutcome<Vec<String>> {
    let mut db = self.inner.lock().unwrap();
    let mut released = Vec::new();
    for player in db.players.values_mut() {
      if player.active_server_id.as_deref() == Some(server_id) {
        player.active_server_id = None;
        player.active_since = None;
        released.push(player.steam_id.clone());
      }
    }
    Ok(released)
  }

  async fn count_players_on_server(&self, server_id: &str) -> SyncOutcome<i64> {
    Ok(
      self
        .inner
        .lock()
        .unwrap()
        .players
        .values()
        .filter(|p| p.active_server_id.as_deref() == Some(server_id))
        .count() as i64,
    )
  }

  async fn find_or_create_player(&self, tx: &mut Self::Tx, steam_id: &str) -> SyncOutcome<PlayerFull> {
    if let Some(player) = tx.snapshot.players.get(steam_id).cloned() {
      let associations = Self::associations_for(&tx.snapshot, player.id);
      return Ok(PlayerFull { player, associations });
    }

    tx.snapshot.next_player_id += 1;
    let player = Player {
      id: tx.snapshot.next_player_id,
      steam_id: steam_id.to_string(),
      eos_id: None,
      name: None,
      sync_seq: 0,
      active_server_id: None,
      active_since: None,
    };
    tx.snapshot.players.insert(steam_id.to_string(), player.clone());
    tx.snapshot
      .stats
      .insert(player.id, PlayerStats { player_id: player.id, ..PlayerStats::default() });
    tx.snapshot
      .skins
      .insert(player.id, PlayerSkins { player_id: player.id, ..PlayerSkins::default() });

    let associations = Self::associations_for(&tx.snapshot, player.id);
    Ok(PlayerFull { player, associations })
  }

  async fn find_player_full(&self, tx: &mut Self::Tx, steam_id: &str) -> SyncOutcome<Option<PlayerFull>> {
    let Some(player) = tx.snapshot.players.get(steam_id).cloned() else { return Ok(None) };
    let associations = Self::associations_for(&tx.snapshot, player.id);
    Ok(Some(PlayerFull { player, associations }))
  }

  async fn try_set_active_server(
    &self,
    tx: &mut Self::Tx,
    player_id: i64,
    expected_current: Option<&str>,
    new_server_id: Option<&str>,
    active_since: Option<DateTime<Utc>>,
  ) -> SyncOutcome<bool> {
    let Some(player) = tx.snapshot.players.values_mut().find(|p| p.id == player_id) else {
      return Err(SyncError::PlayerNotFound);
    };
    if player.active_server_id.as_deref() != expected_current {
      return Ok(false);
    }
    player.active_server_id = new_server_id.map(ToString::to_string);
    player.active_since = active_since;
    Ok(true)
  }

  async fn update_player_identity(
    &self,
    tx: &mut Self::Tx,
    player_id: i64,
    eos_id: Option<&str>,
    name: Option<&str>,
    sync_seq: i64,
  ) -> SyncOutcome<()> {
    let Some(player) = tx.snapshot.players.values_mut().find(|p| p.id == player_id) else {
      return Err(SyncError::PlayerNotFound);
    };
    if let Some(eos_id) = eos_id {
      player.eos_id = Some(eos_id.to_string());
    }
    if let Some(name) = name {
      player.name = Some(name.to_string());
    }
    player.sync_seq = sync_seq;
    Ok(())
  }

  async fn upsert_stats(&self, tx: &mut Self::Tx, player_id: i64, stats: &StatsUpsert) -> SyncOutcome<()> {
    tx.snapshot.stats.insert(
      player_id,
      PlayerStats {
        player_id,
        currency: stats.currency,
        currency_total: stats.currency_total,
        currency_spent: stats.currency_spent,
        xp: stats.xp,
        xp_total: stats.xp_total,
        prestige: stats.prestige,
        perma_tokens: stats.perma_tokens,
        daily_claims: stats.daily_claims,
        games_played: stats.games_played,
        time_played: stats.time_played,
        join_time: stats.join_time,
        daily_claim_time: stats.daily_claim_time,
      },
    );
    Ok(())
  }

  async fn upsert_skins(&self, tx: &mut Self::Tx, player_id: i64, skins: &SkinsUpsert) -> SyncOutcome<()> {
    tx.snapshot.skins.insert(
      player_id,
      PlayerSkins { player_id, indfor: skins.indfor.clone(), blufor: skins.blufor.clone(), redfor: skins.redfor.clone() },
    );
    Ok(())
  }

  async fn upsert_supporter_status(&self, tx: &mut Self::Tx, player_id: i64, tiers: &[String]) -> SyncOutcome<()> {
    if let Some(tier) = tiers.first() {
      tx.snapshot
        .supporter
        .insert(player_id, SupporterStatus { player_id, tier: tier.clone(), expires_at: None });
    }
    Ok(())
  }

  async fn replace_loadout(&self, tx: &mut Self::Tx, player_id: i64, slots: &[LoadoutSlot]) -> SyncOutcome<()> {
    tx.snapshot.loadout.insert(player_id, slots.to_vec());
    Ok(())
  }

  async fn replace_perks(&self, tx: &mut Self::Tx, player_id: i64, perk_names: &[String]) -> SyncOutcome<()> {
    tx.snapshot.perks.insert(
      player_id,
      perk_names.iter().map(|perk_name| PlayerPerk { player_id, perk_name: perk_name.clone() }).collect(),
    );
    Ok(())
  }

  async fn upsert_permanent_unlocks(&self, tx: &mut Self::Tx, player_id: i64, weapon_names: &[String]) -> SyncOutcome<()> {
    let existing = tx.snapshot.perma_unlocks.entry(player_id).or_default();
    for weapon_name in weapon_names {
      if !existing.iter().any(|u| &u.weapon_name == weapon_name) {
        existing.push(crate::domain::PermanentUnlock { player_id, weapon_name: weapon_name.clone(), unlocked_at: Utc::now() });
      }
    }
    Ok(())
  }

  async fn upsert_tracking(&self, tx: &mut Self::Tx, player_id: i64, tracking: &TrackingDoc) -> SyncOutcome<()> {
    tx.snapshot.kills.entry(player_id).or_default().extend(tracking.kills.clone());
    tx.snapshot.vehicle_kills.entry(player_id).or_default().extend(tracking.vehicle_kills.clone());
    tx.snapshot.purchases.entry(player_id).or_default().extend(tracking.purchases.clone());
    tx.snapshot.weapon_xp.entry(player_id).or_default().extend(tracking.weapon_xp.clone());
    tx.snapshot.rewards.entry(player_id).or_default().extend(tracking.rewards.clone());
    Ok(())
  }

  async fn insert_audit_entry(
    &self,
    tx: &mut Self::Tx,
    server_id: &str,
    player_steam_id: &str,
    kind: AuditKind,
    seq_before: Option<i64>,
    seq_after: Option<i64>,
    before_summary: serde_json::Value,
    after_summary: serde_json::Value,
    flagged: bool,
    flag_reason: Option<&str>,
    duration_ms: i64,
  ) -> SyncOutcome<()> {
    tx.snapshot.next_audit_id += 1;
    tx.snapshot.audit.push(AuditEntry {
      id: tx.snapshot.next_audit_id,
      server_id: server_id.to_string(),
      player_steam_id: player_steam_id.to_string(),
      kind,
      seq_before,
      seq_after,
      before_summary,
      after_summary,
      flagged,
      flag_reason: flag_reason.map(ToString::to_string),
      duration_ms,
      created_at: Utc::now(),
    });
    Ok(())
  }
}
