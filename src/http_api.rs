//! Minimal HTTP surface (SPEC_FULL.md §6.3) for offline tooling: a shared-secret
//! `X-API-Key` header gates everything but `/api/sync/health`. Every handler
//! delegates to the same `SyncEngine` operations the Connector uses.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::warn;

use crate::audit::AuditSink;
use crate::document::PlayerDocument;
use crate::domain::GameServer;
use crate::engine::SyncEngine;
use crate::error::SyncError;
use crate::protocol::{BatchCrashRecoveryRequest, MAX_BATCH_SIZE};
use crate::store::Store;

/// Identifies audit entries and Connector-less syncs originating from the
/// HTTP surface rather than a live game-server connection.
pub const HTTP_API_SERVER_ID: &str = "http-api";

fn http_api_server() -> GameServer {
  GameServer {
    id: 0,
    server_id: HTTP_API_SERVER_ID.to_string(),
    token: String::new(),
    active: true,
    flagged: false,
    flag_reason: None,
    last_seen: None,
  }
}

pub struct AppState<S: Store, A: AuditSink> {
  pub engine: Arc<SyncEngine<S, A>>,
  pub api_key: String,
}

pub fn router<S: Store + 'static, A: AuditSink + 'static>(state: Arc<AppState<S, A>>) -> Router {
  Router::new()
    .route("/api/sync/health", get(health))
    .route("/api/sync/player", post(upsert_player::<S, A>))
    .route("/api/sync/batch", post(upsert_batch::<S, A>))
    .route("/api/sync/status/:steam_id", get(status::<S, A>))
    .route("/api/sync/player/:steam_id", get(get_player::<S, A>))
    .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
  status: &'static str,
  service: &'static str,
  timestamp: chrono::DateTime<chrono::Utc>,
}

async fn health() -> Json<HealthResponse> {
  Json(HealthResponse { status: "ok", service: "sync-core", timestamp: chrono::Utc::now() })
}

#[derive(Serialize)]
struct ApiError {
  error: &'static str,
  errors: Option<Vec<String>>,
}

impl From<&SyncError> for ApiError {
  fn from(err: &SyncError) -> Self {
    let errors = match err {
      SyncError::ValidationFailed { errors } => Some(errors.clone()),
      _ => None,
    };
    ApiError { error: err.kind(), errors }
  }
}

fn sync_error_response(err: &SyncError) -> Response {
  let status = match err {
    SyncError::ValidationFailed { .. } => StatusCode::BAD_REQUEST,
    SyncError::PlayerNotFound => StatusCode::NOT_FOUND,
    SyncError::Unauthenticated | SyncError::ServerInactive => StatusCode::UNAUTHORIZED,
    SyncError::NotSessionOwner { .. } | SyncError::ActiveElsewhere { .. } => StatusCode::CONFLICT,
    SyncError::InvalidSyncSeq { .. } => StatusCode::CONFLICT,
    SyncError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
  };
  (status, Json(ApiError::from(err))).into_response()
}

fn check_api_key<S: Store, A: AuditSink>(state: &AppState<S, A>, headers: &HeaderMap) -> Result<(), Response> {
  let provided = headers.get("X-API-Key").and_then(|v| v.to_str().ok());
  if provided != Some(state.api_key.as_str()) {
    warn!("rejected HTTP request with missing or invalid API key");
    return Err((StatusCode::UNAUTHORIZED, Json(ApiError { error: "Unauthenticated", errors: None })).into_response());
  }
  Ok(())
}

async fn upsert_player<S: Store + 'static, A: AuditSink + 'static>(
  State(state): State<Arc<AppState<S, A>>>,
  headers: HeaderMap,
  Json(doc): Json<PlayerDocument>,
) -> Response {
  if let Err(resp) = check_api_key(&state, &headers) {
    return resp;
  }
  match state.engine.crash_recovery(&http_api_server(), &doc).await {
    Ok(result) => Json(result).into_response(),
    Err(err) => sync_error_response(&err),
  }
}

async fn upsert_batch<S: Store + 'static, A: AuditSink + 'static>(
  State(state): State<Arc<AppState<S, A>>>,
  headers: HeaderMap,
  Json(batch): Json<BatchCrashRecoveryRequest>,
) -> Response {
  if let Err(resp) = check_api_key(&state, &headers) {
    return resp;
  }
  if batch.players.len() > MAX_BATCH_SIZE {
    let err = ApiError { error: "ValidationFailed", errors: Some(vec![format!("batch exceeds {MAX_BATCH_SIZE} entries")]) };
    return (StatusCode::BAD_REQUEST, Json(err)).into_response();
  }
  let summary = state.engine.batch_crash_recovery(&http_api_server(), &batch.players).await;
  Json(summary).into_response()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
  steam_id: String,
  last_sync: Option<chrono::DateTime<chrono::Utc>>,
}

async fn status<S: Store + 'static, A: AuditSink + 'static>(
  State(state): State<Arc<AppState<S, A>>>,
  headers: HeaderMap,
  Path(steam_id): Path<String>,
) -> Response {
  if let Err(resp) = check_api_key(&state, &headers) {
    return resp;
  }
  match state.engine.last_sync_time(&steam_id).await {
    Ok(last_sync) => Json(StatusResponse { steam_id, last_sync }).into_response(),
    Err(err) => sync_error_response(&err),
  }
}

async fn get_player<S: Store + 'static, A: AuditSink + 'static>(
  State(state): State<Arc<AppState<S, A>>>,
  headers: HeaderMap,
  Path(steam_id): Path<String>,
) -> Response {
  if let Err(resp) = check_api_key(&state, &headers) {
    return resp;
  }
  match state.engine.fetch_player(&steam_id).await {
    Ok(Some(doc)) => Json(doc).into_response(),
    Ok(None) => sync_error_response(&SyncError::PlayerNotFound),
    Err(err) => sync_error_response(&err),
  }
}
