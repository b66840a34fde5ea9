//! The v2 wire document (SPEC_FULL.md §6.2) and its validation rules.
//!
//! Everything that crosses the wire as a full player document is parsed into
//! [`PlayerDocument`] at the boundary. The five tracking maps are the only
//! place an untyped `HashMap` is allowed to propagate inward -- they are
//! genuinely open-keyed (steam ids, weapon names, reward types chosen by the
//! game content, not by this service).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

pub const DOCUMENT_VERSION: u32 = 2;

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDocument {
  pub v: u32,
  pub steam_id: String,
  pub eos_id: Option<String>,
  pub name: Option<String>,
  pub server_id: Option<String>,
  pub last_sync: DateTime<Utc>,
  pub sync_seq: i64,
  pub stats: StatsDoc,
  pub skins: SkinsDoc,
  #[serde(default)]
  pub loadout: Vec<LoadoutEntry>,
  #[serde(default)]
  pub perks: Vec<String>,
  #[serde(default)]
  pub perma_unlocks: Vec<String>,
  #[serde(default)]
  pub supporter_status: Vec<String>,
  #[serde(default)]
  pub tracking: Option<TrackingDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StatsDoc {
  #[serde(default)]
  pub currency: i64,
  #[serde(default)]
  pub currency_total: i64,
  #[serde(default)]
  pub currency_spent: i64,
  #[serde(default)]
  pub xp: i64,
  #[serde(default)]
  pub xp_total: i64,
  #[serde(default)]
  pub prestige: i32,
  #[serde(default)]
  pub perma_tokens: i64,
  #[serde(default)]
  pub daily_claims: i64,
  #[serde(default)]
  pub games_played: i64,
  #[serde(default)]
  pub time_played: i64,
  #[serde(default)]
  pub join_time: Option<DateTime<Utc>>,
  #[serde(default)]
  pub daily_claim_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SkinsDoc {
  #[serde(default)]
  pub indfor: Option<String>,
  #[serde(default)]
  pub blufor: Option<String>,
  #[serde(default)]
  pub redfor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadoutEntry {
  pub slot: i32,
  #[serde(default)]
  pub family: Option<String>,
  pub item: String,
  #[serde(default)]
  pub count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrackingDoc {
  #[serde(default)]
  pub kills: HashMap<String, i64>,
  #[serde(default)]
  pub vehicle_kills: HashMap<String, i64>,
  #[serde(default)]
  pub purchases: HashMap<String, i64>,
  #[serde(default)]
  pub weapon_xp: HashMap<String, i64>,
  #[serde(default)]
  pub rewards: HashMap<String, i64>,
}

/// Validates a [`PlayerDocument`] against the §6.2 rules. Returns the list of
/// human-readable violations; an empty return means the document is valid.
#[must_use]
pub fn validate(doc: &PlayerDocument) -> Vec<String> {
  let mut errors = Vec::new();

  if doc.v != DOCUMENT_VERSION {
    errors.push(format!("v: expected {DOCUMENT_VERSION}, got {}", doc.v));
  }

  if !is_steam_id(&doc.steam_id) {
    errors.push(format!("steamId: must be exactly 17 decimal digits, got {:?}", doc.steam_id));
  }

  if doc.sync_seq < 0 {
    errors.push("syncSeq: must be non-negative".to_string());
  }

  validate_stats(&doc.stats, &mut errors);

  for (i, entry) in doc.loadout.iter().enumerate() {
    if entry.item.is_empty() {
      errors.push(format!("loadout[{i}].item: must not be empty"));
    }
    if entry.count < 0 {
      errors.push(format!("loadout[{i}].count: must be non-negative"));
    }
  }

  if let Some(tracking) = &doc.tracking {
    validate_counter_map("tracking.kills", &tracking.kills, &mut errors);
    validate_counter_map("tracking.vehicleKills", &tracking.vehicle_kills, &mut errors);
    validate_counter_map("tracking.purchases", &tracking.purchases, &mut errors);
    validate_counter_map("tracking.weaponXp", &tracking.weapon_xp, &mut errors);
    validate_counter_map("tracking.rewards", &tracking.rewards, &mut errors);
  }

  errors
}

fn validate_stats(stats: &StatsDoc, errors: &mut Vec<String>) {
  if stats.currency < 0 {
    errors.push("stats.currency: must be non-negative".to_string());
  }
  if stats.currency_total < 0 {
    errors.push("stats.currencyTotal: must be non-negative".to_string());
  }
  if stats.currency_spent < 0 {
    errors.push("stats.currencySpent: must be non-negative".to_string());
  }
  if stats.xp < 0 {
    errors.push("stats.xp: must be non-negative".to_string());
  }
  if stats.xp_total < 0 {
    errors.push("stats.xpTotal: must be non-negative".to_string());
  }
  if !(0..=100).contains(&stats.prestige) {
    errors.push(format!("stats.prestige: must be in [0,100], got {}", stats.prestige));
  }
  if stats.perma_tokens < 0 {
    errors.push("stats.permaTokens: must be non-negative".to_string());
  }
  if stats.daily_claims < 0 {
    errors.push("stats.dailyClaims: must be non-negative".to_string());
  }
  if stats.games_played < 0 {
    errors.push("stats.gamesPlayed: must be non-negative".to_string());
  }
  if stats.time_played < 0 {
    errors.push("stats.timePlayed: must be non-negative".to_string());
  }
}

fn validate_counter_map(field: &str, map: &HashMap<String, i64>, errors: &mut Vec<String>) {
  for (key, value) in map {
    if *value < 0 {
      errors.push(format!("{field}[{key}]: must be non-negative"));
    }
  }
}

#[must_use]
pub fn is_steam_id(s: &str) -> bool {
  s.len() == 17 && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn base_doc() -> PlayerDocument {
    PlayerDocument {
      v: 2,
      steam_id: "76561198000000001".to_string(),
      eos_id: None,
      name: None,
      server_id: Some("serverA".to_string()),
      last_sync: Utc::now(),
      sync_seq: 1,
      stats: StatsDoc::default(),
      skins: SkinsDoc::default(),
      loadout: vec![],
      perks: vec![],
      perma_unlocks: vec![],
      supporter_status: vec![],
      tracking: None,
    }
  }

  #[test]
  fn accepts_well_formed_document() {
    assert!(validate(&base_doc()).is_empty());
  }

  #[test]
  fn rejects_bad_steam_id_length() {
    let mut doc = base_doc();
    doc.steam_id = "7656119800000000".to_string(); // 16 digits
    assert!(!validate(&doc).is_empty());

    doc.steam_id = "765611980000000012".to_string(); // 18 digits
    assert!(!validate(&doc).is_empty());
  }

  #[test]
  fn rejects_prestige_over_100() {
    let mut doc = base_doc();
    doc.stats.prestige = 101;
    let errors = validate(&doc);
    assert!(errors.iter().any(|e| e.contains("prestige")));
  }

  #[test]
  fn accepts_prestige_at_boundary() {
    let mut doc = base_doc();
    doc.stats.prestige = 100;
    assert!(validate(&doc).is_empty());
  }

  #[test]
  fn rejects_negative_tracking_counters() {
    let mut doc = base_doc();
    let mut tracking = TrackingDoc::default();
    tracking.kills.insert("76561198000000099".to_string(), -1);
    doc.tracking = Some(tracking);
    let errors = validate(&doc);
    assert!(errors.iter().any(|e| e.contains("tracking.kills")));
  }

  #[test]
  fn rejects_wrong_version() {
    let mut doc = base_doc();
    doc.v = 1;
    let errors = validate(&doc);
    assert!(errors.iter().any(|e| e.contains("v:")));
  }
}
