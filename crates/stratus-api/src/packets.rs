//! Handler for `GET /packets/:case_id`.

use axum::{
  extract::{Path, State},
  Json,
};
use stratus_core::{
  signal::{RiskAssessor, SignalSource},
  store::CaseStore,
};
use stratus_engine::DecisionStore;
use uuid::Uuid;

use crate::{error::ApiError, AppState};

/// `GET /packets/:case_id` — the sealed Decision Packet, verbatim.
pub async fn get_one<S, Src, Ra>(
  State(state): State<AppState<S, Src, Ra>>,
  Path(case_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: DecisionStore + 'static,
  Src: SignalSource + 'static,
  Ra: RiskAssessor + 'static,
{
  let packet = state
    .store
    .get_packet(case_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| {
      ApiError::NotFound(format!("no packet for case {case_id}"))
    })?;
  Ok(Json(packet))
}
