//! Entrypoint (SPEC_FULL.md §6.4): load config, init logging, stand up the
//! Postgres pool and run migrations, wire `Store`/`AuditSink`/`Registry`/
//! `SyncEngine`, dial every configured game server with a `Connector`, and
//! serve the offline-tooling HTTP surface alongside it.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::{error, info};

use sync_core::audit::TracingAuditSink;
use sync_core::config::Config;
use sync_core::connector::{self, Backoff};
use sync_core::engine::SyncEngine;
use sync_core::http_api::{self, AppState};
use sync_core::logging;
use sync_core::registry::Registry;
use sync_core::store::PgStore;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
  color_eyre::install()?;
  let config = Config::load()?;
  logging::init(&config);

  let pool = PgPoolOptions::new()
    .max_connections(config.db_pool_max)
    .min_connections(config.db_pool_min)
    .connect(&config.database_url())
    .await?;

  let store = Arc::new(PgStore::new(pool));
  store.migrate().await?;
  info!("database migrations applied");

  let audit = Arc::new(TracingAuditSink::new());
  let registry = Arc::new(Registry::new(store.clone()));
  let engine = Arc::new(SyncEngine::new(store.clone(), audit));

  let targets = config.game_server_targets()?;
  let backoff = Backoff::from_config(&config);
  let request_timeout = std::time::Duration::from_millis(config.reconnect_timeout_ms);
  for target in targets {
    let registry = registry.clone();
    let engine = engine.clone();
    tokio::spawn(async move {
      connector::run(target, registry, engine, backoff, request_timeout).await;
    });
  }

  let app_state = Arc::new(AppState { engine: engine.clone(), api_key: config.sync_api_key.clone() });
  let router = http_api::router(app_state);

  let listener = TcpListener::bind(&config.http_bind_addr).await?;
  info!(addr = %config.http_bind_addr, "http api listening");
  axum::serve(listener, router).await.map_err(|err| {
    error!(error = %err, "http server exited");
    err
  })?;

  Ok(())
}
