//! Guardrails: hard checks that run between orchestrator states.
//!
//! A failed gate is not an error path to be smoothed over — it blocks the
//! case and leaves a GUARDRAIL_FAIL trace event saying why.

use serde_json::json;

use stratus_core::{
  case::{Case, Criticality, NewTraceEvent, TraceEvent, TraceEventKind},
  graph::{Claim, ClaimStatus, Edge, EdgeStatus},
  store::{CaseStore, EvidenceStore, GraphStore, NewMissingEvidence},
};
use uuid::Uuid;

use crate::{planner::PlannedAction, EngineError, Result};

/// Outcome of a gate check.
#[derive(Debug, Clone)]
pub enum GateOutcome {
  Pass,
  Blocked { reason: String, request_id: Option<Uuid> },
}

impl GateOutcome {
  pub fn passed(&self) -> bool {
    matches!(self, Self::Pass)
  }
}

/// Evidence-binding gate: no promoted claim or edge may lack evidence. The
/// store enforces this on write; the gate re-verifies before the case moves
/// on, because a violation here means the store was bypassed.
pub async fn evidence_binding_gate<S>(
  store: &S,
  case_id: Uuid,
  claims: &[Claim],
  edges: &[Edge],
) -> Result<GateOutcome>
where
  S: GraphStore + CaseStore,
{
  for claim in claims.iter().filter(|c| c.status == ClaimStatus::Fact) {
    let bound = GraphStore::claim_evidence(store, claim.claim_id)
      .await
      .map_err(EngineError::store)?;
    if bound.is_empty() {
      return fail_gate(
        store,
        case_id,
        "evidence_binding",
        format!("FACT claim {} has no bound evidence", claim.claim_id),
        None,
      )
      .await;
    }
  }

  for edge in edges.iter().filter(|e| e.status == EdgeStatus::Fact) {
    let bound = GraphStore::edge_evidence(store, edge.edge_id)
      .await
      .map_err(EngineError::store)?;
    if bound.is_empty() {
      return fail_gate(
        store,
        case_id,
        "evidence_binding",
        format!("FACT edge {} has no bound evidence", edge.edge_id),
        None,
      )
      .await;
    }
  }

  Ok(GateOutcome::Pass)
}

/// Booking-required gate: a shipment-typed action without booking evidence
/// converts into a BLOCKING missing-evidence request and blocks the case.
pub async fn booking_required_gate<S>(
  store: &S,
  case_id: Uuid,
  planned: &[PlannedAction],
) -> Result<GateOutcome>
where
  S: EvidenceStore + CaseStore,
{
  let shipment_actions: Vec<&PlannedAction> = planned
    .iter()
    .filter(|a| a.action_type.is_shipment_level())
    .collect();
  if shipment_actions.is_empty() {
    return Ok(GateOutcome::Pass);
  }

  for action in shipment_actions {
    let shipment_ref = action
      .args
      .get("shipment")
      .and_then(|s| s.as_str())
      .map(str::to_owned);

    let bookings = store
      .evidence_by_source("BOOKING", shipment_ref.as_deref())
      .await
      .map_err(EngineError::store)?;

    if bookings.is_empty() {
      let request = store
        .record_missing_evidence(NewMissingEvidence {
          case_id,
          source_system: "BOOKING".into(),
          request_type: "booking_confirmation".into(),
          params: json!({
            "shipment": shipment_ref,
            "action_type": action.action_type.as_str(),
          }),
          reason: format!(
            "{} planned without booking evidence",
            action.action_type.as_str()
          ),
          criticality: Criticality::Blocking,
        })
        .await
        .map_err(EngineError::store)?;

      return fail_gate(
        store,
        case_id,
        "booking_required",
        format!(
          "{} requires booking evidence",
          action.action_type.as_str()
        ),
        Some(request.request_id),
      )
      .await;
    }
  }

  Ok(GateOutcome::Pass)
}

async fn fail_gate<S: CaseStore>(
  store: &S,
  case_id: Uuid,
  gate: &str,
  reason: String,
  request_id: Option<Uuid>,
) -> Result<GateOutcome> {
  store
    .record_trace(NewTraceEvent::new(
      case_id,
      TraceEventKind::GuardrailFail,
      json!({"gate": gate, "reason": reason, "request_id": request_id}),
    ))
    .await
    .map_err(EngineError::store)?;
  Ok(GateOutcome::Blocked { reason, request_id })
}

// ─── Non-workflow check ──────────────────────────────────────────────────────

/// The ordered state path a case took, e.g.
/// `INIT>INVESTIGATE>QUANTIFY_RISK>...`.
pub fn trace_path_signature(trace: &[TraceEvent]) -> String {
  trace
    .iter()
    .filter(|t| t.kind == TraceEventKind::StateEnter)
    .filter_map(|t| {
      t.meta.get("state").and_then(|s| s.as_str()).map(str::to_owned)
    })
    .collect::<Vec<_>>()
    .join(">")
}

/// Anti-replay sanity check: if the last few resolved cases with different
/// scopes all took exactly this trace path, the "agent" has degenerated into
/// a fixed workflow. Diagnostic — records a GUARDRAIL_FAIL but does not
/// block.
pub async fn non_workflow_check<S: CaseStore>(
  store: &S,
  case: &Case,
  own_signature: &str,
) -> Result<bool> {
  const WINDOW: usize = 3;

  let recent = store
    .recent_resolved_cases(8)
    .await
    .map_err(EngineError::store)?;
  let mut identical = 0usize;
  let mut compared = 0usize;

  for other in recent
    .iter()
    .filter(|c| c.case_id != case.case_id && c.scope != case.scope)
    .take(WINDOW)
  {
    let trace = store
      .trace_for_case(other.case_id)
      .await
      .map_err(EngineError::store)?;
    compared += 1;
    if trace_path_signature(&trace) == own_signature {
      identical += 1;
    }
  }

  let degenerate = compared >= WINDOW && identical == compared;
  if degenerate {
    store
      .record_trace(NewTraceEvent::new(
        case.case_id,
        TraceEventKind::GuardrailFail,
        json!({
          "gate": "non_workflow",
          "reason": "identical trace path across differently-scoped cases",
          "compared": compared,
        }),
      ))
      .await
      .map_err(EngineError::store)?;
  }
  Ok(!degenerate)
}
