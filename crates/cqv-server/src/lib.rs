//! Server wiring for competency-question validation.
//!
//! Owns the on-disk configuration shape and turns it into a running
//! [`Engine`] behind the JSON API.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::Router;
use cqv_core::{
  engine::{Engine, EngineConfig},
  graph::GraphStore,
  retry::RetryPolicy,
  store::ValidationStore,
};
use cqv_graph::{AnyGraphStore, HttpConfig, OxigraphStore, SparqlHttpStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:             String,
  #[serde(default = "default_port")]
  pub port:             u16,
  pub store_path:       PathBuf,
  #[serde(default)]
  pub graph:            GraphConfig,
  #[serde(default = "default_query_timeout_ms")]
  pub query_timeout_ms: u64,
  #[serde(default = "default_preview_rows")]
  pub preview_rows:     usize,
  #[serde(default)]
  pub retry:            RetryPolicy,
  #[serde(default)]
  pub ontology_base:    Option<String>,
  /// Notifications buffered on the change feed before senders wait.
  #[serde(default = "default_feed_capacity")]
  pub feed_capacity:    usize,
}

/// Where microtheory content lives.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GraphConfig {
  /// In-process and volatile; graphs vanish on restart.
  #[default]
  Memory,
  Oxigraph { path: PathBuf },
  Http(HttpConfig),
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8640 }

fn default_query_timeout_ms() -> u64 { EngineConfig::default().query_timeout_ms }

fn default_preview_rows() -> usize { EngineConfig::default().preview_rows }

fn default_feed_capacity() -> usize { 256 }

impl ServerConfig {
  pub fn engine(&self) -> EngineConfig {
    EngineConfig {
      query_timeout_ms: self.query_timeout_ms,
      preview_rows:     self.preview_rows,
      retry:            self.retry,
      ontology_base:    self.ontology_base.clone(),
    }
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Wiring ───────────────────────────────────────────────────────────────────

/// Open the configured graph backend.
pub fn open_graph(cfg: &GraphConfig) -> cqv_graph::Result<AnyGraphStore> {
  Ok(match cfg {
    GraphConfig::Memory => OxigraphStore::in_memory()?.into(),
    GraphConfig::Oxigraph { path } => OxigraphStore::open(expand_tilde(path))?.into(),
    GraphConfig::Http(http) => SparqlHttpStore::new(http.clone())?.into(),
  })
}

/// The API router with request tracing.
pub fn app<S, G>(engine: Arc<Engine<S, G>>) -> Router
where
  S: ValidationStore + 'static,
  G: GraphStore + 'static,
{
  cqv_api::api_router(engine).layer(TraceLayer::new_for_http())
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
