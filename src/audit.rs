//! Append-only audit log (SPEC_FULL.md §4.4): every completed sync operation,
//! flagged or not, leaves a row behind summarizing before/after state. The
//! durable, queryable trail is `Store::insert_audit_entry` -- it runs inside
//! the same transaction as the data it describes, satisfying §5's ordering
//! guarantee. `AuditSink` is a separate, non-transactional fan-out for
//! observability: it must never be the only place an audit entry lands, and
//! it must never write to the same table `Store` does, or every operation
//! would produce two identical rows.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::AuditKind;

/// One row the `SyncEngine` hands off after an operation completes.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
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
}

/// Where audit records go once an operation has already been durably
/// committed via `Store::insert_audit_entry`. Kept separate from `Store` so
/// a deployment can fan the same record out to a genuinely different
/// channel (a log aggregator, a metrics pipeline, a message queue) without
/// touching the relational layer or double-writing `audit_entries`.
#[async_trait]
pub trait AuditSink: Send + Sync {
  async fn record(&self, entry: AuditRecord);
}

/// Emits one structured log line per audit record, the same way the rest of
/// the ambient stack reports operational events. Never touches Postgres --
/// the RDBMS row for this entry was already written by `Store` in the same
/// transaction as the data it describes.
#[derive(Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
  #[must_use]
  pub fn new() -> Self {
    TracingAuditSink
  }
}

#[async_trait]
impl AuditSink for TracingAuditSink {
  async fn record(&self, entry: AuditRecord) {
    if entry.flagged {
      warn!(
        server_id = %entry.server_id,
        steam_id = %entry.player_steam_id,
        kind = entry.kind.as_str(),
        seq_before = entry.seq_before,
        seq_after = entry.seq_after,
        reason = entry.flag_reason.as_deref(),
        duration_ms = entry.duration_ms,
        "sync flagged"
      );
    } else {
      info!(
        server_id = %entry.server_id,
        steam_id = %entry.player_steam_id,
        kind = entry.kind.as_str(),
        seq_before = entry.seq_before,
        seq_after = entry.seq_after,
        duration_ms = entry.duration_ms,
        "sync audited"
      );
    }
  }
}

/// In-memory sink for tests -- keeps every record so assertions can inspect
/// flag reasons and before/after summaries directly.
#[derive(Default)]
pub struct FakeAuditSink {
  entries: std::sync::Mutex<Vec<AuditRecord>>,
}

impl FakeAuditSink {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  pub fn entries(&self) -> Vec<AuditRecord> {
    self.entries.lock().unwrap().clone()
  }

  pub fn last(&self) -> Option<AuditRecord> {
    self.entries.lock().unwrap().last().cloned()
  }
}

#[async_trait]
impl AuditSink for FakeAuditSink {
  async fn record(&self, entry: AuditRecord) {
    self.entries.lock().unwrap().push(entry);
  }
}
