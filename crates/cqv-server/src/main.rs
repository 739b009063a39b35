//! cqv server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite metadata store and the configured graph store, and serves the JSON
//! API over HTTP.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use cqv_core::engine::Engine;
use cqv_server::{GraphConfig, ServerConfig, expand_tilde, open_graph};
use cqv_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Competency-question validation server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration. Nested keys use a double underscore in the
  // environment: `CQV_RETRY__MAX_ATTEMPTS`.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("CQV")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Open SQLite store.
  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  // Open graph store.
  let graph = open_graph(&server_cfg.graph).context("failed to open graph store")?;
  if matches!(server_cfg.graph, GraphConfig::Memory) {
    tracing::warn!("graph store is in memory; microtheory content is lost on restart");
  }

  let engine = Arc::new(Engine::new(Arc::new(store), Arc::new(graph), server_cfg.engine()));
  let feed = engine.start_change_feed(server_cfg.feed_capacity);
  let app = cqv_server::app(engine);
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  if let Some(feed) = feed {
    feed.abort();
  }
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::warn!(error = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutting down");
}
