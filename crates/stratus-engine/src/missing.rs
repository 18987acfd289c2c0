//! Missing-evidence tracking: knowing what the system doesn't know.
//!
//! Failed fetches become first-class rows instead of silent gaps.
//! Resolution is explicit: each run starts by re-checking open requests
//! against evidence that arrived after them, rather than auto-resolving at
//! ingest time.

use serde_json::json;

use stratus_core::{
  case::{Criticality, MissingEvidenceRequest},
  signal::{SignalKind, SourceError},
  store::{CaseStore, EvidenceStore, NewMissingEvidence},
};
use uuid::Uuid;

use crate::{EngineError, Result};

/// Record one failed fetch, with criticality per the fixed source table.
pub async fn record_failed_fetch<S: CaseStore>(
  store: &S,
  case_id: Uuid,
  kind: SignalKind,
  icao: &str,
  error: &SourceError,
) -> Result<MissingEvidenceRequest> {
  let retryable = !matches!(error, SourceError::Permanent(_));
  store
    .record_missing_evidence(NewMissingEvidence {
      case_id,
      source_system: kind.source_system().into(),
      request_type: "signal_fetch".into(),
      params: json!({"icao": icao, "retryable": retryable}),
      reason: error.to_string(),
      criticality: kind.criticality(),
    })
    .await
    .map_err(EngineError::store)
}

/// Re-check every open request for a case against evidence ingested after
/// it from the same source, and resolve the matches. Returns how many were
/// resolved.
pub async fn resolve_open_requests<S>(
  store: &S,
  case_id: Uuid,
  icao: Option<&str>,
) -> Result<usize>
where
  S: CaseStore + EvidenceStore,
{
  let open = store
    .missing_for_case(case_id, true)
    .await
    .map_err(EngineError::store)?;

  let mut resolved = 0usize;
  for request in open {
    let candidates = store
      .evidence_by_source(&request.source_system, icao)
      .await
      .map_err(EngineError::store)?;

    // Newest-first; the first row ingested after the request answers it.
    if let Some(evidence) = candidates
      .iter()
      .find(|e| e.retrieved_at > request.created_at)
    {
      store
        .resolve_missing_evidence(request.request_id, evidence.evidence_id)
        .await
        .map_err(EngineError::store)?;
      resolved += 1;
    }
  }
  Ok(resolved)
}

/// Whether any open request forces the case to stay BLOCKED.
pub fn has_blocking(open: &[MissingEvidenceRequest]) -> bool {
  open
    .iter()
    .any(|r| r.is_open() && r.criticality == Criticality::Blocking)
}
