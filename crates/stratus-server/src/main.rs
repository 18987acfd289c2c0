//! stratus-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite store, seeds the built-in policies, and serves the decision-engine
//! API over HTTP.

mod config;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use stratus_api::AppState;
use stratus_engine::{policy, risk::HeuristicRiskAssessor, scenarios};
use stratus_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

#[derive(Parser)]
#[command(author, version, about = "Stratus decision-engine server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = ::config::Config::builder()
    .add_source(::config::File::from(cli.config).required(false))
    .add_source(::config::Environment::with_prefix("STRATUS"))
    .build()
    .context("failed to read configuration")?;
  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store = SqliteStore::open(
    &server_cfg.database_path,
    server_cfg.evidence_root.clone(),
  )
  .await
  .with_context(|| {
    format!("failed to open store at {:?}", server_cfg.database_path)
  })?;

  let seeded = policy::seed_builtin_policies(&store)
    .await
    .context("failed to seed built-in policies")?;
  tracing::info!(new_policies = seeded, "policy bootstrap complete");

  let source = scenarios::source_for(&server_cfg.scenario)
    .with_context(|| {
      format!("unknown scenario {:?} in configuration", server_cfg.scenario)
    })?;

  let state = AppState {
    store:    Arc::new(store),
    source:   Arc::new(source),
    assessor: Arc::new(HeuristicRiskAssessor),
    config:   server_cfg.engine_config(),
  };

  let app = stratus_api::api_router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
