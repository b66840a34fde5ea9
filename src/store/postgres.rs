use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::document::TrackingDoc;
use crate::domain::{
  AuditKind, GameServer, LoadoutSlot, Player, PlayerAssociations, PlayerFull, PlayerPerk, PlayerSkins, PlayerStats,
  SupporterStatus,
};
use crate::error::SyncOutcome;

use super::{SkinsUpsert, StatsUpsert, Store};

/// Production [`Store`] backed by PostgreSQL via `sqlx`.
pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  #[must_use]
  pub fn new(pool: PgPool) -> Self {
    PgStore { pool }
  }

  /// Runs the embedded schema migrations. Called once at startup.
  ///
  /// # Errors
  /// Returns an error if a migration fails to apply.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(&self.pool).await
  }

  async fn load_associations(
    tx: &mut Transaction<'static, Postgres>,
    player_id: i64,
  ) -> SyncOutcome<PlayerAssociations> {
    let stats = sqlx::query_as::<_, PlayerStats>("SELECT * FROM player_stats WHERE player_id = $1")
      .bind(player_id)
      .fetch_optional(tx.as_mut())
      .await?
      .unwrap_or(PlayerStats { player_id, ..PlayerStats::default() });

    let skins = sqlx::query_as::<_, PlayerSkins>("SELECT * FROM player_skins WHERE player_id = $1")
      .bind(player_id)
      .fetch_optional(tx.as_mut())
      .await?
      .unwrap_or(PlayerSkins { player_id, ..PlayerSkins::default() });

    let supporter_status = sqlx::query_as::<_, SupporterStatus>("SELECT * FROM supporter_status WHERE player_id = $1")
      .bind(player_id)
      .fetch_optional(tx.as_mut())
      .await?;

    let loadout = sqlx::query_as::<_, LoadoutSlot>("SELECT * FROM loadout_slots WHERE player_id = $1 ORDER BY slot")
      .bind(player_id)
      .fetch_all(tx.as_mut())
      .await?;

    let perks = sqlx::query_as::<_, PlayerPerk>("SELECT * FROM player_perks WHERE player_id = $1")
      .bind(player_id)
      .fetch_all(tx.as_mut())
      .await?;

    let perma_unlocks =
      sqlx::query_as::<_, crate::domain::PermanentUnlock>("SELECT * FROM permanent_unlocks WHERE player_id = $1")
        .bind(player_id)
        .fetch_all(tx.as_mut())
        .await?;

    let rewards = sqlx::query_as::<_, crate::domain::Reward>("SELECT * FROM rewards WHERE player_id = $1")
      .bind(player_id)
      .fetch_all(tx.as_mut())
      .await?;

    let kills = sqlx::query_as::<_, crate::domain::Kill>("SELECT * FROM kills WHERE player_id = $1")
      .bind(player_id)
      .fetch_all(tx.as_mut())
      .await?;

    let vehicle_kills = sqlx::query_as::<_, crate::domain::VehicleKill>("SELECT * FROM vehicle_kills WHERE player_id = $1")
      .bind(player_id)
      .fetch_all(tx.as_mut())
      .await?;

    let purchases = sqlx::query_as::<_, crate::domain::Purchase>("SELECT * FROM purchases WHERE player_id = $1")
      .bind(player_id)
      .fetch_all(tx.as_mut())
      .await?;

    let weapon_xp = sqlx::query_as::<_, crate::domain::WeaponXp>("SELECT * FROM weapon_xp WHERE player_id = $1")
      .bind(player_id)
      .fetch_all(tx.as_mut())
      .await?;

    Ok(PlayerAssociations {
      stats,
      skins,
      supporter_status,
      loadout,
      perks,
      perma_unlocks,
      rewards,
      kills,
      vehicle_kills,
      purchases,
      weapon_xp,
    })
  }
}

#[async_trait]
impl Store for PgStore {
  type Tx = Transaction<'static, Postgres>;

  async fn begin(&self) -> SyncOutcome<Self::Tx> {
    Ok(self.pool.begin().await?)
  }

  async fn commit(&self, tx: Self::Tx) -> SyncOutcome<()> {
    tx.commit().await?;
    Ok(())
  }

  async fn rollback(&self, tx: Self::Tx) -> SyncOutcome<()> {
    tx.rollback().await?;
    Ok(())
  }

  async fn find_server_by_token(&self, token: &str) -> SyncOutcome<Option<GameServer>> {
    Ok(
      sqlx::query_as::<_, GameServer>("SELECT * FROM game_servers WHERE token = $1")
        .bind(token)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn find_server_by_id(&self, server_id: &str) -> SyncOutcome<Option<GameServer>> {
    Ok(
      sqlx::query_as::<_, GameServer>("SELECT * FROM game_servers WHERE server_id = $1")
        .bind(server_id)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn touch_server_last_seen(&self, server_id: &str) -> SyncOutcome<()> {
    sqlx::query("UPDATE game_servers SET last_seen = now() WHERE server_id = $1")
      .bind(server_id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  async fn last_audit_time(&self, steam_id: &str) -> SyncOutcome<Option<DateTime<Utc>>> {
    let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
      "SELECT created_at FROM audit_entries WHERE player_steam_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(steam_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(row.map(|(t,)| t))
  }

  async fn sweep_server(&self, server_id: &str) -> SyncOutcome<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
      "UPDATE players SET active_server_id = NULL, active_since = NULL \
       WHERE active_server_id = $1 RETURNING steam_id",
    )
    .bind(server_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(rows.into_iter().map(|(s,)| s).collect())
  }

  async fn count_players_on_server(&self, server_id: &str) -> SyncOutcome<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM players WHERE active_server_id = $1")
      .bind(server_id)
      .fetch_one(&self.pool)
      .await?;
    Ok(count)
  }

  async fn find_or_create_player(&self, tx: &mut Self::Tx, steam_id: &str) -> SyncOutcome<PlayerFull> {
    let existing = sqlx::query_as::<_, Player>("SELECT * FROM players WHERE steam_id = $1")
      .bind(steam_id)
      .fetch_optional(tx.as_mut())
      .await?;

    let player = if let Some(player) = existing {
      player
    } else {
      let player = sqlx::query_as::<_, Player>(
        "INSERT INTO players (steam_id, sync_seq) VALUES ($1, 0) RETURNING *",
      )
      .bind(steam_id)
      .fetch_one(tx.as_mut())
      .await?;

      sqlx::query("INSERT INTO player_stats (player_id) VALUES ($1)")
        .bind(player.id)
        .execute(tx.as_mut())
        .await?;
      sqlx::query("INSERT INTO player_skins (player_id) VALUES ($1)")
        .bind(player.id)
        .execute(tx.as_mut())
        .await?;

      player
    };

    let associations = Self::load_associations(tx, player.id).await?;
    Ok(PlayerFull { player, associations })
  }

  async fn find_player_full(&self, tx: &mut Self::Tx, steam_id: &str) -> SyncOutcome<Option<PlayerFull>> {
    let player = sqlx::query_as::<_, Player>("SELECT * FROM players WHERE steam_id = $1")
      .bind(steam_id)
      .fetch_optional(tx.as_mut())
      .await?;

    let Some(player) = player else { return Ok(None) };
    let associations = Self::load_associations(tx, player.id).await?;
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
    let result = sqlx::query(
      "UPDATE players SET active_server_id = $1, active_since = $2 \
       WHERE id = $3 AND active_server_id IS NOT DISTINCT FROM $4",
    )
    .bind(new_server_id)
    .bind(active_since)
    .bind(player_id)
    .bind(expected_current)
    .execute(tx.as_mut())
    .await?;

    Ok(result.rows_affected() == 1)
  }

  async fn update_player_identity(
    &self,
    tx: &mut Self::Tx,
    player_id: i64,
    eos_id: Option<&str>,
    name: Option<&str>,
    sync_seq: i64,
  ) -> SyncOutcome<()> {
    sqlx::query(
      "UPDATE players SET \
         eos_id = COALESCE($1, eos_id), \
         name = COALESCE($2, name), \
         sync_seq = $3 \
       WHERE id = $4",
    )
    .bind(eos_id)
    .bind(name)
    .bind(sync_seq)
    .bind(player_id)
    .execute(tx.as_mut())
    .await?;
    Ok(())
  }

  async fn upsert_stats(&self, tx: &mut Self::Tx, player_id: i64, stats: &StatsUpsert) -> SyncOutcome<()> {
    sqlx::query(
      "INSERT INTO player_stats \
         (player_id, currency, currency_total, currency_spent, xp, xp_total, prestige, \
          perma_tokens, daily_claims, games_played, time_played, join_time, daily_claim_time) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
       ON CONFLICT (player_id) DO UPDATE SET \
         currency = EXCLUDED.currency, currency_total = EXCLUDED.currency_total, \
         currency_spent = EXCLUDED.currency_spent, xp = EXCLUDED.xp, xp_total = EXCLUDED.xp_total, \
         prestige = EXCLUDED.prestige, perma_tokens = EXCLUDED.perma_tokens, \
         daily_claims = EXCLUDED.daily_claims, games_played = EXCLUDED.games_played, \
         time_played = EXCLUDED.time_played, join_time = EXCLUDED.join_time, \
         daily_claim_time = EXCLUDED.daily_claim_time",
    )
    .bind(player_id)
    .bind(stats.currency)
    .bind(stats.currency_total)
    .bind(stats.currency_spent)
    .bind(stats.xp)
    .bind(stats.xp_total)
    .bind(stats.prestige)
    .bind(stats.perma_tokens)
    .bind(stats.daily_claims)
    .bind(stats.games_played)
    .bind(stats.time_played)
    .bind(stats.join_time)
    .bind(stats.daily_claim_time)
    .execute(tx.as_mut())
    .await?;
    Ok(())
  }

  async fn upsert_skins(&self, tx: &mut Self::Tx, player_id: i64, skins: &SkinsUpsert) -> SyncOutcome<()> {
    sqlx::query(
      "INSERT INTO player_skins (player_id, indfor, blufor, redfor) VALUES ($1, $2, $3, $4) \
       ON CONFLICT (player_id) DO UPDATE SET indfor = EXCLUDED.indfor, blufor = EXCLUDED.blufor, redfor = EXCLUDED.redfor",
    )
    .bind(player_id)
    .bind(&skins.indfor)
    .bind(&skins.blufor)
    .bind(&skins.redfor)
    .execute(tx.as_mut())
    .await?;
    Ok(())
  }

  async fn upsert_supporter_status(&self, tx: &mut Self::Tx, player_id: i64, tiers: &[String]) -> SyncOutcome<()> {
    let Some(tier) = tiers.first() else { return Ok(()) };
    sqlx::query(
      "INSERT INTO supporter_status (player_id, tier) VALUES ($1, $2) \
       ON CONFLICT (player_id) DO UPDATE SET tier = EXCLUDED.tier",
    )
    .bind(player_id)
    .bind(tier)
    .execute(tx.as_mut())
    .await?;
    Ok(())
  }

  async fn replace_loadout(&self, tx: &mut Self::Tx, player_id: i64, slots: &[LoadoutSlot]) -> SyncOutcome<()> {
    sqlx::query("DELETE FROM loadout_slots WHERE player_id = $1").bind(player_id).execute(tx.as_mut()).await?;
    for slot in slots {
      sqlx::query("INSERT INTO loadout_slots (player_id, slot, family, item, count) VALUES ($1, $2, $3, $4, $5)")
        .bind(player_id)
        .bind(slot.slot)
        .bind(&slot.family)
        .bind(&slot.item)
        .bind(slot.count)
        .execute(tx.as_mut())
        .await?;
    }
    Ok(())
  }

  async fn replace_perks(&self, tx: &mut Self::Tx, player_id: i64, perk_names: &[String]) -> SyncOutcome<()> {
    sqlx::query("DELETE FROM player_perks WHERE player_id = $1").bind(player_id).execute(tx.as_mut()).await?;
    for perk_name in perk_names {
      sqlx::query("INSERT INTO player_perks (player_id, perk_name) VALUES ($1, $2)")
        .bind(player_id)
        .bind(perk_name)
        .execute(tx.as_mut())
        .await?;
    }
    Ok(())
  }

  async fn upsert_permanent_unlocks(&self, tx: &mut Self::Tx, player_id: i64, weapon_names: &[String]) -> SyncOutcome<()> {
    for weapon_name in weapon_names {
      sqlx::query(
        "INSERT INTO permanent_unlocks (player_id, weapon_name, unlocked_at) VALUES ($1, $2, now()) \
         ON CONFLICT (player_id, weapon_name) DO NOTHING",
      )
      .bind(player_id)
      .bind(weapon_name)
      .execute(tx.as_mut())
      .await?;
    }
    Ok(())
  }

  async fn upsert_tracking(&self, tx: &mut Self::Tx, player_id: i64, tracking: &TrackingDoc) -> SyncOutcome<()> {
    for (victim_steam_id, count) in &tracking.kills {
      sqlx::query(
        "INSERT INTO kills (player_id, victim_steam_id, count) VALUES ($1, $2, $3) \
         ON CONFLICT (player_id, victim_steam_id) DO UPDATE SET count = EXCLUDED.count",
      )
      .bind(player_id)
      .bind(victim_steam_id)
      .bind(count)
      .execute(tx.as_mut())
      .await?;
    }
    for (vehicle_name, count) in &tracking.vehicle_kills {
      sqlx::query(
        "INSERT INTO vehicle_kills (player_id, vehicle_name, count) VALUES ($1, $2, $3) \
         ON CONFLICT (player_id, vehicle_name) DO UPDATE SET count = EXCLUDED.count",
      )
      .bind(player_id)
      .bind(vehicle_name)
      .bind(count)
      .execute(tx.as_mut())
      .await?;
    }
    for (item_name, count) in &tracking.purchases {
      sqlx::query(
        "INSERT INTO purchases (player_id, item_name, count) VALUES ($1, $2, $3) \
         ON CONFLICT (player_id, item_name) DO UPDATE SET count = EXCLUDED.count",
      )
      .bind(player_id)
      .bind(item_name)
      .bind(count)
      .execute(tx.as_mut())
      .await?;
    }
    for (weapon_name, xp) in &tracking.weapon_xp {
      sqlx::query(
        "INSERT INTO weapon_xp (player_id, weapon_name, xp) VALUES ($1, $2, $3) \
         ON CONFLICT (player_id, weapon_name) DO UPDATE SET xp = EXCLUDED.xp",
      )
      .bind(player_id)
      .bind(weapon_name)
      .bind(xp)
      .execute(tx.as_mut())
      .await?;
    }
    for (reward_type, count) in &tracking.rewards {
      sqlx::query(
        "INSERT INTO rewards (player_id, reward_type, count) VALUES ($1, $2, $3) \
         ON CONFLICT (player_id, reward_type) DO UPDATE SET count = EXCLUDED.count",
      )
      .bind(player_id)
      .bind(reward_type)
      .bind(count)
      .execute(tx.as_mut())
      .await?;
    }
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
    sqlx::query(
      "INSERT INTO audit_entries \
         (server_id, player_steam_id, kind, seq_before, seq_after, before_summary, after_summary, \
          flagged, flag_reason, duration_ms) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(server_id)
    .bind(player_steam_id)
    .bind(kind)
    .bind(seq_before)
    .bind(seq_after)
    .bind(before_summary)
    .bind(after_summary)
    .bind(flagged)
    .bind(flag_reason)
    .bind(duration_ms)
    .execute(tx.as_mut())
    .await?;
    Ok(())
  }
}
