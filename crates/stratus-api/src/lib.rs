//! JSON REST API for Stratus.
//!
//! Exposes an axum [`Router`] backed by any store implementing the three
//! store traits, plus the two external capabilities. Auth, TLS, and
//! transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = stratus_api::api_router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod cases;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod packets;
pub mod simulation;
pub mod webhooks;

use std::sync::Arc;

use axum::{
  routing::{get, post},
  Router,
};
use stratus_core::signal::{RiskAssessor, SignalSource};
use stratus_engine::{DecisionStore, EngineConfig};

pub use error::ApiError;

/// Shared handler state. Cloning is cheap; everything is reference-counted.
pub struct AppState<S, Src, Ra> {
  pub store:    Arc<S>,
  pub source:   Arc<Src>,
  pub assessor: Arc<Ra>,
  pub config:   EngineConfig,
}

impl<S, Src, Ra> Clone for AppState<S, Src, Ra> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      source:   Arc::clone(&self.source),
      assessor: Arc::clone(&self.assessor),
      config:   self.config.clone(),
    }
  }
}

/// Build a fully-materialised API router for the given state.
pub fn api_router<S, Src, Ra>(state: AppState<S, Src, Ra>) -> Router<()>
where
  S: DecisionStore + 'static,
  Src: SignalSource + 'static,
  Ra: RiskAssessor + 'static,
{
  Router::new()
    // Cases
    .route("/cases", post(cases::create::<S, Src, Ra>))
    .route("/cases/{id}/run", post(cases::run::<S, Src, Ra>))
    .route("/cases/{id}/run/stream", get(cases::run_stream::<S, Src, Ra>))
    // Ingestion
    .route("/ingest/airport/{icao}", post(ingest::airport::<S, Src, Ra>))
    // Packets
    .route("/packets/{case_id}", get(packets::get_one::<S, Src, Ra>))
    // Graph
    .route(
      "/graph/bitemporal/beliefs",
      post(graph::bitemporal_beliefs::<S, Src, Ra>),
    )
    .route("/graph/cascade/{icao}", get(graph::cascade::<S, Src, Ra>))
    // Simulation
    .route(
      "/simulation/seed/airport/{icao}",
      post(simulation::seed::<S, Src, Ra>)
        .delete(simulation::unseed::<S, Src, Ra>),
    )
    .route("/simulation/scenarios", get(simulation::list_scenarios))
    .route(
      "/simulation/run/{id}",
      post(simulation::run_scenario::<S, Src, Ra>),
    )
    // Webhooks
    .route("/webhooks/register", post(webhooks::register::<S, Src, Ra>))
    .with_state(state)
}
