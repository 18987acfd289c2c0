//! Handlers for the `/simulation` endpoints: graph seeding and canned
//! scenario runs against the scripted signal source.

use std::sync::Arc;

use axum::{
  extract::{Path, Query, State},
  Json,
};
use serde::Deserialize;
use serde_json::json;
use stratus_core::{
  case::{CaseScope, CaseType},
  signal::{RiskAssessor, SignalSource},
  store::{CaseStore, GraphStore},
};
use stratus_engine::{
  orchestrator::Orchestrator, risk::HeuristicRiskAssessor, scenarios,
  DecisionStore,
};

use crate::{error::ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct SeedParams {
  #[serde(default)]
  pub refresh: bool,
}

/// `POST /simulation/seed/airport/:icao[?refresh=true]`
pub async fn seed<S, Src, Ra>(
  State(state): State<AppState<S, Src, Ra>>,
  Path(icao): Path<String>,
  Query(params): Query<SeedParams>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: DecisionStore + 'static,
  Src: SignalSource + 'static,
  Ra: RiskAssessor + 'static,
{
  let summary =
    scenarios::seed_airport(state.store.as_ref(), &icao, params.refresh)
      .await?;
  Ok(Json(json!({
    "seed_used": summary.seed_used,
    "nodes_created": summary.nodes_created,
    "cleared": summary.cleared,
  })))
}

/// `DELETE /simulation/seed/airport/:icao`
pub async fn unseed<S, Src, Ra>(
  State(state): State<AppState<S, Src, Ra>>,
  Path(icao): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: DecisionStore + 'static,
  Src: SignalSource + 'static,
  Ra: RiskAssessor + 'static,
{
  let (edges_deleted, nodes_deleted) = state
    .store
    .purge_airport_subgraph(&icao)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(json!({
    "edges_deleted": edges_deleted,
    "nodes_deleted": nodes_deleted,
  })))
}

/// `GET /simulation/scenarios`
pub async fn list_scenarios() -> Json<serde_json::Value> {
  Json(json!({ "scenarios": scenarios::scenarios() }))
}

/// `POST /simulation/run/:id` — seed the scenario airport, open a case, and
/// run it against the scripted source with the deterministic assessor.
pub async fn run_scenario<S, Src, Ra>(
  State(state): State<AppState<S, Src, Ra>>,
  Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: DecisionStore + 'static,
  Src: SignalSource + 'static,
  Ra: RiskAssessor + 'static,
{
  let scenario = scenarios::scenarios()
    .into_iter()
    .find(|s| s.id == id)
    .ok_or_else(|| ApiError::NotFound(format!("unknown scenario {id:?}")))?;
  let source = scenarios::source_for(&id)
    .ok_or_else(|| ApiError::NotFound(format!("unknown scenario {id:?}")))?;

  scenarios::seed_airport(state.store.as_ref(), &scenario.airport, false)
    .await?;
  let case = state
    .store
    .create_case(
      CaseType::AirportDisruption,
      CaseScope::airport(&scenario.airport),
    )
    .await
    .map_err(ApiError::store)?;

  let orchestrator = Orchestrator::new(
    Arc::clone(&state.store),
    Arc::new(source),
    Arc::new(HeuristicRiskAssessor),
    state.config.clone(),
  );
  let outcome = orchestrator.run(case.case_id).await?;

  Ok(Json(json!({
    "scenario": scenario.id,
    "case_id": case.case_id,
    "status": outcome.final_status,
    "posture": outcome.packet.posture.posture,
    "packet": outcome.packet,
  })))
}
