//! The Store boundary (SPEC_FULL.md §4.3): a narrow, typed interface hiding
//! SQL behind upsert/fetch primitives. The Store never opens a transaction on
//! its own -- `begin`/`commit`/`rollback` hand the caller (always the
//! `SyncEngine`) an owned transaction handle that every other method takes by
//! mutable reference, so a whole operation's writes share one atomic
//! boundary.

mod fake;
mod postgres;

pub use fake::FakeStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::document::TrackingDoc;
use crate::domain::{GameServer, LoadoutSlot, PlayerFull};
use crate::error::SyncOutcome;

/// A single upsert for the `PlayerStats` 1:1 table.
#[derive(Debug, Clone)]
pub struct StatsUpsert {
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

#[derive(Debug, Clone, Default)]
pub struct SkinsUpsert {
  pub indfor: Option<String>,
  pub blufor: Option<String>,
  pub redfor: Option<String>,
}

#[async_trait]
pub trait Store: Send + Sync {
  /// An in-flight, not-yet-committed unit of work. Production implementations
  /// wrap `sqlx::Transaction<'static, Postgres>`; the in-memory fake used in
  /// tests wraps a snapshot token it can roll back to.
  type Tx: Send;

  async fn begin(&self) -> SyncOutcome<Self::Tx>;
  async fn commit(&self, tx: Self::Tx) -> SyncOutcome<()>;
  async fn rollback(&self, tx: Self::Tx) -> SyncOutcome<()>;

  // -- Registry-facing reads, outside the per-sync transaction --

  async fn find_server_by_token(&self, token: &str) -> SyncOutcome<Option<GameServer>>;
  async fn find_server_by_id(&self, server_id: &str) -> SyncOutcome<Option<GameServer>>;
  async fn touch_server_last_seen(&self, server_id: &str) -> SyncOutcome<()>;

  /// Timestamp of the most recent audit entry for a player, used by the
  /// HTTP status endpoint. `None` if the player has never synced.
  async fn last_audit_time(&self, steam_id: &str) -> SyncOutcome<Option<DateTime<Utc>>>;

  /// Clears `active_server_id`/`active_since` on every player currently
  /// pinned to `server_id`. Returns the steam ids that were released.
  async fn sweep_server(&self, server_id: &str) -> SyncOutcome<Vec<String>>;

  /// Number of players currently pinned to `server_id`, for `server:info`.
  async fn count_players_on_server(&self, server_id: &str) -> SyncOutcome<i64>;

  // -- Player lifecycle, inside the caller's transaction --

  async fn find_or_create_player(&self, tx: &mut Self::Tx, steam_id: &str) -> SyncOutcome<PlayerFull>;
  async fn find_player_full(&self, tx: &mut Self::Tx, steam_id: &str) -> SyncOutcome<Option<PlayerFull>>;

  /// Optimistic check-and-set: succeeds only if the player's current
  /// `active_server_id` equals `expected_current` (both `None` meaning
  /// "unowned"). Returns `false` without writing if the precondition no
  /// longer holds -- the caller re-reads and resolves the race as
  /// `ActiveElsewhere`.
  async fn try_set_active_server(
    &self,
    tx: &mut Self::Tx,
    player_id: i64,
    expected_current: Option<&str>,
    new_server_id: Option<&str>,
    active_since: Option<DateTime<Utc>>,
  ) -> SyncOutcome<bool>;

  async fn update_player_identity(
    &self,
    tx: &mut Self::Tx,
    player_id: i64,
    eos_id: Option<&str>,
    name: Option<&str>,
    sync_seq: i64,
  ) -> SyncOutcome<()>;

  // -- Side tables --

  async fn upsert_stats(&self, tx: &mut Self::Tx, player_id: i64, stats: &StatsUpsert) -> SyncOutcome<()>;
  async fn upsert_skins(&self, tx: &mut Self::Tx, player_id: i64, skins: &SkinsUpsert) -> SyncOutcome<()>;
  async fn upsert_supporter_status(&self, tx: &mut Self::Tx, player_id: i64, tiers: &[String]) -> SyncOutcome<()>;

  /// Delete-then-insert replace semantics (§9 design notes).
  async fn replace_loadout(&self, tx: &mut Self::Tx, player_id: i64, slots: &[LoadoutSlot]) -> SyncOutcome<()>;
  async fn replace_perks(&self, tx: &mut Self::Tx, player_id: i64, perk_names: &[String]) -> SyncOutcome<()>;

  /// Additive upsert keyed by (player, weaponName); existing rows keep their
  /// original `unlocked_at`.
  async fn upsert_permanent_unlocks(&self, tx: &mut Self::Tx, player_id: i64, weapon_names: &[String]) -> SyncOutcome<()>;

  /// Upserts all five tracking maps by compound key, storing the document's
  /// absolute counters (not deltas) as the newest value.
  async fn upsert_tracking(&self, tx: &mut Self::Tx, player_id: i64, tracking: &TrackingDoc) -> SyncOutcome<()>;

  // -- Audit --

  #[allow(clippy::too_many_arguments)]
  async fn insert_audit_entry(
    &self,
    tx: &mut Self::Tx,
    server_id: &str,
    player_steam_id: &str,
    kind: crate::domain::AuditKind,
    seq_before: Option<i64>,
    seq_after: Option<i64>,
    before_summary: serde_json::Value,
    after_summary: serde_json::Value,
    flagged: bool,
    flag_reason: Option<&str>,
    duration_ms: i64,
  ) -> SyncOutcome<()>;
}
