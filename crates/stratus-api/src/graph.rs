//! Handlers for the graph read endpoints.

use axum::{
  extract::{Path, State},
  Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use stratus_core::{
  graph::GraphView,
  signal::{RiskAssessor, SignalSource},
  store::GraphStore,
};
use stratus_engine::{packet, DecisionStore};

use crate::{error::ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct BitemporalBody {
  pub event_time:  DateTime<Utc>,
  pub ingest_time: DateTime<Utc>,
}

/// `POST /graph/bitemporal/beliefs` — the canonical as-of view: what the
/// system believed about `event_time`, as known at `ingest_time`.
pub async fn bitemporal_beliefs<S, Src, Ra>(
  State(state): State<AppState<S, Src, Ra>>,
  Json(body): Json<BitemporalBody>,
) -> Result<Json<GraphView>, ApiError>
where
  S: DecisionStore + 'static,
  Src: SignalSource + 'static,
  Ra: RiskAssessor + 'static,
{
  let view = state
    .store
    .as_of(body.event_time, body.ingest_time)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(view))
}

/// `GET /graph/cascade/:icao` — downstream flights / shipments / bookings
/// and the summed SLA exposure.
pub async fn cascade<S, Src, Ra>(
  State(state): State<AppState<S, Src, Ra>>,
  Path(icao): Path<String>,
) -> Result<Json<stratus_core::packet::CascadeImpact>, ApiError>
where
  S: DecisionStore + 'static,
  Src: SignalSource + 'static,
  Ra: RiskAssessor + 'static,
{
  let impact = packet::cascade_impact(state.store.as_ref(), &icao).await?;
  Ok(Json(impact))
}
