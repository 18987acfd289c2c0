//! Handlers for `/cases` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/cases` | Body: `{"case_type":..., "scope":...}`; suggests a playbook |
//! | `POST` | `/cases/:id/run` | Runs orchestration; returns when COMPLETE/BLOCKED |
//! | `GET`  | `/cases/:id/run/stream` | Server-sent progress events |

use std::{convert::Infallible, sync::Arc};

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::{
    sse::{Event, KeepAlive, Sse},
    IntoResponse,
  },
  Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use stratus_core::{
  case::{CaseScope, CaseStatus, CaseType},
  signal::{RiskAssessor, SignalSource},
  store::CaseStore,
};
use stratus_engine::{
  orchestrator::Orchestrator, playbooks, DecisionStore,
};
use tokio_stream::{wrappers::ReceiverStream, StreamExt as _};
use uuid::Uuid;

use crate::{error::ApiError, AppState};

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub case_type: CaseType,
  pub scope:     CaseScope,
}

#[derive(Debug, Serialize)]
pub struct CreateResponse {
  pub case_id:            Uuid,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub playbook_suggested: Option<PlaybookSuggestion>,
}

#[derive(Debug, Serialize)]
pub struct PlaybookSuggestion {
  pub playbook_id: Uuid,
  pub name:        String,
  pub score:       f64,
}

/// `POST /cases` — body: `{"case_type":"AIRPORT_DISRUPTION","scope":{"airport":"KJFK"}}`
pub async fn create<S, Src, Ra>(
  State(state): State<AppState<S, Src, Ra>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DecisionStore + 'static,
  Src: SignalSource + 'static,
  Ra: RiskAssessor + 'static,
{
  if body.scope.airport.is_none() && body.scope.lane.is_none() {
    return Err(ApiError::BadRequest(
      "scope must name an airport or a lane".into(),
    ));
  }

  let case = state
    .store
    .create_case(body.case_type, body.scope.clone())
    .await
    .map_err(ApiError::store)?;

  let playbook_suggested =
    playbooks::retrieve_best(state.store.as_ref(), body.case_type, &body.scope)
      .await?
      .map(|(playbook, score)| PlaybookSuggestion {
        playbook_id: playbook.playbook_id,
        name: playbook.name,
        score,
      });

  Ok((
    StatusCode::CREATED,
    Json(CreateResponse { case_id: case.case_id, playbook_suggested }),
  ))
}

// ─── Run ──────────────────────────────────────────────────────────────────────

/// `POST /cases/:id/run` — synchronous; returns the sealed packet.
pub async fn run<S, Src, Ra>(
  State(state): State<AppState<S, Src, Ra>>,
  Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: DecisionStore + 'static,
  Src: SignalSource + 'static,
  Ra: RiskAssessor + 'static,
{
  let case = state
    .store
    .get_case(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("case {id} not found")))?;
  if case.status == CaseStatus::Resolved {
    return Err(ApiError::Conflict(format!("case {id} is already resolved")));
  }

  let orchestrator = Orchestrator::new(
    Arc::clone(&state.store),
    Arc::clone(&state.source),
    Arc::clone(&state.assessor),
    state.config.clone(),
  );
  let outcome = orchestrator.run(id).await?;

  Ok(Json(json!({
    "case_id": id,
    "status": outcome.final_status,
    "packet": outcome.packet,
  })))
}

/// `GET /cases/:id/run/stream` — server-sent events: `started`,
/// `state_transition`, `progress`, `completed`, `error`.
pub async fn run_stream<S, Src, Ra>(
  State(state): State<AppState<S, Src, Ra>>,
  Path(id): Path<Uuid>,
) -> Result<
  Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>,
  ApiError,
>
where
  S: DecisionStore + 'static,
  Src: SignalSource + 'static,
  Ra: RiskAssessor + 'static,
{
  let case = state
    .store
    .get_case(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("case {id} not found")))?;
  if case.status == CaseStatus::Resolved {
    return Err(ApiError::Conflict(format!("case {id} is already resolved")));
  }

  let (tx, rx) = tokio::sync::mpsc::channel(32);
  let orchestrator = Orchestrator::new(
    Arc::clone(&state.store),
    Arc::clone(&state.source),
    Arc::clone(&state.assessor),
    state.config.clone(),
  )
  .with_progress(tx);

  tokio::spawn(async move {
    if let Err(error) = orchestrator.run(id).await {
      tracing::warn!(case_id = %id, error = %error, "streamed run failed");
    }
  });

  let stream = ReceiverStream::new(rx).map(|event| {
    let data =
      serde_json::to_string(&event).unwrap_or_else(|e| {
        json!({"event": "error", "error": e.to_string()}).to_string()
      });
    Ok(Event::default().data(data))
  });

  Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
