//! Structured logging init (SPEC_FULL.md §10.1): `tracing` spans keyed by
//! `steam_id`/`server_id`, with the output shape switched by `LOG_FORMAT`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::Config;

/// Installs the global `tracing` subscriber. `LOG_FORMAT=json` emits one
/// structured object per line for log aggregators; anything else (the
/// default `pretty`) emits human-readable output for local development.
pub fn init(config: &Config) {
  let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

  let fmt_layer: Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync> = if config.log_format == "json" {
    Box::new(tracing_subscriber::fmt::layer().json().with_target(true).with_current_span(true))
  } else {
    Box::new(tracing_subscriber::fmt::layer().pretty())
  };

  tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}
