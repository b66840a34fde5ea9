//! Relational row types mirroring the ~10 tables of SPEC_FULL.md §3, plus the
//! aggregate view ([`PlayerFull`]) the Store hands back to the SyncEngine and
//! the conversions to/from the wire [`PlayerDocument`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::document::{LoadoutEntry, PlayerDocument, SkinsDoc, StatsDoc, TrackingDoc, DOCUMENT_VERSION};

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Player {
  pub id: i64,
  pub steam_id: String,
  pub eos_id: Option<String>,
  pub name: Option<String>,
  pub sync_seq: i64,
  pub active_server_id: Option<String>,
  pub active_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, sqlx::FromRow)]
pub struct PlayerStats {
  pub player_id: i64,
  pub currency: i64,
  pub currency_total: i64,
  pub currency_spent: i64,
  pub xp: i64,
  pub xp_total: i64,
  pub prestige: i32,
  pub perma_tokens: i64,
  pub daily_claims: i64,
  pub games_played: i64,
  pub time_played: i64,
  pub join_time: Option<DateTime<Utc>>,
  pub daily_claim_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, sqlx::FromRow)]
pub struct PlayerSkins {
  pub player_id: i64,
  pub indfor: Option<String>,
  pub blufor: Option<String>,
  pub redfor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SupporterStatus {
  pub player_id: i64,
  pub tier: String,
  pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct LoadoutSlot {
  pub player_id: i64,
  pub slot: i32,
  pub family: Option<String>,
  pub item: String,
  pub count: i32,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PlayerPerk {
  pub player_id: i64,
  pub perk_name: String,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PermanentUnlock {
  pub player_id: i64,
  pub weapon_name: String,
  pub unlocked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Reward {
  pub player_id: i64,
  pub reward_type: String,
  pub count: i64,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Kill {
  pub player_id: i64,
  pub victim_steam_id: String,
  pub count: i64,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct VehicleKill {
  pub player_id: i64,
  pub vehicle_name: String,
  pub count: i64,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Purchase {
  pub player_id: i64,
  pub item_name: String,
  pub count: i64,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct WeaponXp {
  pub player_id: i64,
  pub weapon_name: String,
  pub xp: i64,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DiscordLink {
  pub player_id: i64,
  pub discord_id: String,
  pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct GameServer {
  pub id: i64,
  pub server_id: String,
  pub token: String,
  pub active: bool,
  pub flagged: bool,
  pub flag_reason: Option<String>,
  pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum AuditKind {
  Connect,
  Periodic,
  Disconnect,
  CrashRecovery,
}

impl AuditKind {
  #[must_use]
  pub fn as_str(self) -> &'static str {
    match self {
      AuditKind::Connect => "connect",
      AuditKind::Periodic => "periodic",
      AuditKind::Disconnect => "disconnect",
      AuditKind::CrashRecovery => "crash_recovery",
    }
  }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditEntry {
  pub id: i64,
  pub server_id: String,
  pub player_steam_id: String,
  pub kind: AuditKind,
  pub seq_before: Option<i64>,
  pub seq_after: Option<i64>,
  pub before_summary: serde_json::Value,
  pub after_summary: serde_json::Value,
  pub flagged: bool,
  pub flag_reason: Option<String>,
  pub duration_ms: i64,
  pub created_at: DateTime<Utc>,
}

/// One consistent snapshot of a player and all its associations, as returned
/// by `Store::find_player_full`.
#[derive(Debug, Clone, Default)]
pub struct PlayerAssociations {
  pub stats: PlayerStats,
  pub skins: PlayerSkins,
  pub supporter_status: Option<SupporterStatus>,
  pub loadout: Vec<LoadoutSlot>,
  pub perks: Vec<PlayerPerk>,
  pub perma_unlocks: Vec<PermanentUnlock>,
  pub rewards: Vec<Reward>,
  pub kills: Vec<Kill>,
  pub vehicle_kills: Vec<VehicleKill>,
  pub purchases: Vec<Purchase>,
  pub weapon_xp: Vec<WeaponXp>,
}

#[derive(Debug, Clone)]
pub struct PlayerFull {
  pub player: Player,
  pub associations: PlayerAssociations,
}

impl PlayerFull {
  /// Renders the aggregate as the v2 wire document. When `include_tracking`
  /// is false the `tracking` field is omitted, matching the Connect response
  /// contract (§4.2.1) -- the game server rebuilds tracking fresh each
  /// session.
  #[must_use]
  pub fn to_document(&self, include_tracking: bool) -> PlayerDocument {
    let a = &self.associations;
    PlayerDocument {
      v: DOCUMENT_VERSION,
      steam_id: self.player.steam_id.clone(),
      eos_id: self.player.eos_id.clone(),
      name: self.player.name.clone(),
      server_id: self.player.active_server_id.clone(),
      last_sync: Utc::now(),
      sync_seq: self.player.sync_seq,
      stats: StatsDoc {
        currency: a.stats.currency,
        currency_total: a.stats.currency_total,
        currency_spent: a.stats.currency_spent,
        xp: a.stats.xp,
        xp_total: a.stats.xp_total,
        prestige: a.stats.prestige,
        perma_tokens: a.stats.perma_tokens,
        daily_claims: a.stats.daily_claims,
        games_played: a.stats.games_played,
        time_played: a.stats.time_played,
        join_time: a.stats.join_time,
        daily_claim_time: a.stats.daily_claim_time,
      },
      skins: SkinsDoc { indfor: a.skins.indfor.clone(), blufor: a.skins.blufor.clone(), redfor: a.skins.redfor.clone() },
      loadout: a
        .loadout
        .iter()
        .map(|l| LoadoutEntry { slot: l.slot, family: l.family.clone(), item: l.item.clone(), count: l.count })
        .collect(),
      perks: a.perks.iter().map(|p| p.perk_name.clone()).collect(),
      perma_unlocks: a.perma_unlocks.iter().map(|u| u.weapon_name.clone()).collect(),
      supporter_status: a.supporter_status.iter().map(|s| s.tier.clone()).collect(),
      tracking: include_tracking.then(|| TrackingDoc {
        kills: a.kills.iter().map(|k| (k.victim_steam_id.clone(), k.count)).collect(),
        vehicle_kills: a.vehicle_kills.iter().map(|k| (k.vehicle_name.clone(), k.count)).collect(),
        purchases: a.purchases.iter().map(|p| (p.item_name.clone(), p.count)).collect(),
        weapon_xp: a.weapon_xp.iter().map(|w| (w.weapon_name.clone(), w.xp)).collect(),
        rewards: a.rewards.iter().map(|r| (r.reward_type.clone(), r.count)).collect(),
      }),
    }
  }

  /// Small JSON summary used in `AuditEntry.before_summary`/`after_summary` --
  /// deliberately not the full document, just the fields operators care about
  /// when reviewing a flagged sync.
  #[must_use]
  pub fn audit_summary(&self) -> serde_json::Value {
    serde_json::json!({
      "syncSeq": self.player.sync_seq,
      "currencyTotal": self.associations.stats.currency_total,
      "xpTotal": self.associations.stats.xp_total,
      "prestige": self.associations.stats.prestige,
      "permaTokens": self.associations.stats.perma_tokens,
      "timePlayed": self.associations.stats.time_played,
    })
  }
}
