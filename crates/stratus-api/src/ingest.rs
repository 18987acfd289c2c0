//! Handler for `POST /ingest/airport/:icao` — pre-seed evidence for an
//! airport outside any case run.

use axum::{
  extract::{Path, State},
  Json,
};
use serde::Serialize;
use serde_json::json;
use stratus_core::{
  evidence::NewEvidence,
  signal::{RiskAssessor, SignalKind, SignalSource, SourceError},
  store::EvidenceStore,
};
use stratus_engine::DecisionStore;

use crate::{error::ApiError, AppState};

#[derive(Debug, Serialize)]
pub struct IngestResponse {
  pub sources_succeeded: Vec<String>,
  pub sources_failed:    Vec<String>,
  pub errors:            Vec<String>,
}

/// Fetch all five sources for one airport and persist whatever arrives.
/// Per-source failures are reported, never fatal.
pub async fn airport<S, Src, Ra>(
  State(state): State<AppState<S, Src, Ra>>,
  Path(icao): Path<String>,
) -> Result<Json<IngestResponse>, ApiError>
where
  S: DecisionStore + 'static,
  Src: SignalSource + 'static,
  Ra: RiskAssessor + 'static,
{
  let timeout =
    std::time::Duration::from_secs(state.config.signal_timeout_secs);
  let mut response = IngestResponse {
    sources_succeeded: Vec::new(),
    sources_failed:    Vec::new(),
    errors:            Vec::new(),
  };

  for kind in SignalKind::ALL {
    let fetched =
      match tokio::time::timeout(timeout, state.source.fetch(kind, &icao))
        .await
      {
        Ok(inner) => inner,
        Err(_) => Err(SourceError::Timeout(timeout.as_secs())),
      };

    match fetched {
      Ok(fetch) => {
        state
          .store
          .put_evidence(NewEvidence {
            source_system: kind.source_system().into(),
            source_ref: icao.clone(),
            content_type: fetch.content_type,
            payload: fetch.bytes,
            event_time_start: fetch.event_time_start,
            event_time_end: fetch.event_time_end,
            meta: json!({"preseeded": true}),
          })
          .await
          .map_err(ApiError::store)?;
        response.sources_succeeded.push(kind.source_system().into());
      }
      Err(error) => {
        response.sources_failed.push(kind.source_system().into());
        response
          .errors
          .push(format!("{}: {error}", kind.source_system()));
      }
    }
  }

  Ok(Json(response))
}
