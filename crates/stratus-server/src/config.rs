//! Server configuration.
//!
//! Loaded from a TOML file plus `STRATUS_*` environment overrides. The
//! database path and evidence root are required in production; everything
//! else has a sensible default.

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host: String,

  #[serde(default = "default_port")]
  pub port: u16,

  /// SQLite database file.
  pub database_path: PathBuf,

  /// Directory for content-addressed evidence payloads.
  pub evidence_root: PathBuf,

  /// Which canned scenario the scripted signal source replays. The real
  /// FAA/NWS/METAR/TAF/ADS-B clients live outside this system; a deployment
  /// that has them points this server at their gateway instead.
  #[serde(default = "default_scenario")]
  pub scenario: String,

  #[serde(default = "default_fetch_concurrency")]
  pub fetch_concurrency: usize,

  #[serde(default = "default_signal_timeout")]
  pub signal_timeout_secs: u64,

  #[serde(default = "default_assessor_timeout")]
  pub assessor_timeout_secs: u64,

  #[serde(default = "default_webhook_timeout")]
  pub webhook_timeout_secs: u64,
}

fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 8084 }
fn default_scenario() -> String { "clear_skies".to_owned() }
fn default_fetch_concurrency() -> usize { 6 }
fn default_signal_timeout() -> u64 { 10 }
fn default_assessor_timeout() -> u64 { 30 }
fn default_webhook_timeout() -> u64 { 5 }

impl ServerConfig {
  pub fn engine_config(&self) -> stratus_engine::EngineConfig {
    stratus_engine::EngineConfig {
      fetch_concurrency: self.fetch_concurrency.clamp(1, 16),
      signal_timeout_secs: self.signal_timeout_secs,
      assessor_timeout_secs: self.assessor_timeout_secs,
      webhook_timeout_secs: self.webhook_timeout_secs,
      ..stratus_engine::EngineConfig::default()
    }
  }
}
