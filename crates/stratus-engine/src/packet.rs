//! Decision Packet assembly.
//!
//! Reads the case's rows back out of the store and seals them into the
//! immutable audit artifact. Given the same ordered evidence, policy set,
//! and a deterministic assessor, two runs produce identical packets modulo
//! timestamps.

use chrono::{DateTime, Utc};

use stratus_core::{
  case::Case,
  evidence::EvidenceRecord,
  graph::{Claim, Contradiction},
  packet::{
    ActionSummary, BlockedSection, CascadeImpact, ClaimSummary,
    ContradictionSummary, DecisionPacket, EvidenceSummary, OutcomeSummary,
    PacketMetrics, PolicyApplied, PostureDecision, TraceEntry,
  },
  policy::PolicyResult,
  signal::RiskRecord,
  store::{CaseStore, GraphStore},
};

use crate::{edge_types, node_types, EngineError, Result};

/// Everything the orchestrator hands over for sealing.
pub struct PacketInputs<'a> {
  pub case:               &'a Case,
  pub posture:            stratus_core::case::Posture,
  pub rationale:          String,
  pub risk:               &'a RiskRecord,
  pub policy:             &'a PolicyResult,
  pub evidence:           &'a [EvidenceRecord],
  pub claims:             &'a [Claim],
  pub contradictions:    &'a [Contradiction],
  pub blocked_reason:     Option<String>,
  pub first_signal_at:    Option<DateTime<Utc>>,
  pub investigate_passes: u32,
}

/// Build and persist the packet for a finished (resolved or blocked) case.
pub async fn build_and_seal<S>(
  store: &S,
  inputs: PacketInputs<'_>,
) -> Result<DecisionPacket>
where
  S: CaseStore + GraphStore,
{
  let case_id = inputs.case.case_id;
  let now = Utc::now();

  let actions = store
    .actions_for_case(case_id)
    .await
    .map_err(EngineError::store)?;
  let outcomes = store
    .outcomes_for_case(case_id)
    .await
    .map_err(EngineError::store)?;
  let missing = store
    .missing_for_case(case_id, false)
    .await
    .map_err(EngineError::store)?;
  let trace = store
    .trace_for_case(case_id)
    .await
    .map_err(EngineError::store)?;

  let mut claim_summaries = Vec::with_capacity(inputs.claims.len());
  for claim in inputs.claims {
    let evidence_ids = GraphStore::claim_evidence(store, claim.claim_id)
      .await
      .map_err(EngineError::store)?;
    claim_summaries.push(ClaimSummary {
      claim_id: claim.claim_id,
      text: claim.text.clone(),
      status: claim.status,
      confidence: claim.confidence,
      evidence_ids,
    });
  }

  let open_missing: Vec<_> =
    missing.iter().filter(|r| r.is_open()).cloned().collect();
  let is_blocked = inputs.blocked_reason.is_some();

  let cascade = match inputs.case.scope.airport.as_deref() {
    Some(icao) => cascade_impact(store, icao).await?,
    None => CascadeImpact::default(),
  };

  let pdl_seconds = inputs
    .first_signal_at
    .map(|first| (now - first).num_milliseconds() as f64 / 1000.0);

  let packet = DecisionPacket {
    case_id,
    case_type: inputs.case.case_type,
    scope: inputs.case.scope.clone(),
    posture: PostureDecision {
      posture:      inputs.posture,
      airport:      inputs.case.scope.airport.clone(),
      effective_at: now,
      rationale:    inputs.rationale,
    },
    claims: claim_summaries,
    evidence: inputs
      .evidence
      .iter()
      .map(|e| EvidenceSummary {
        evidence_id:   e.evidence_id,
        source_system: e.source_system.clone(),
        retrieved_at:  e.retrieved_at,
        excerpt:       e.excerpt.clone(),
      })
      .collect(),
    contradictions: inputs
      .contradictions
      .iter()
      .map(|c| ContradictionSummary {
        contradiction_id: c.contradiction_id,
        left_ref:         c.left_ref,
        right_ref:        c.right_ref,
        kind:             c.kind.clone(),
        status:           c.status,
      })
      .collect(),
    policies_applied: inputs
      .policy
      .effects
      .iter()
      .map(|e| PolicyApplied {
        citation: e.citation.clone(),
        text:     e.text.clone(),
        effect:   e.effect.clone(),
      })
      .collect(),
    actions_proposed: actions
      .iter()
      .map(|a| ActionSummary {
        action_id:   a.action_id,
        action_type: a.action_type,
        args:        a.args.clone(),
        state:       a.state,
        risk:        a.risk,
      })
      .collect(),
    actions_executed: outcomes
      .iter()
      .map(|o| OutcomeSummary {
        action_id: o.action_id,
        success:   o.success,
        payload:   o.payload.clone(),
      })
      .collect(),
    blocked_section: BlockedSection {
      is_blocked,
      reason: inputs.blocked_reason,
      missing_evidence_requests: open_missing,
    },
    workflow_trace: trace
      .iter()
      .map(|t| TraceEntry {
        seq:      t.seq,
        kind:     t.kind,
        ref_type: t.ref_type.clone(),
        ref_id:   t.ref_id,
        meta:     t.meta.clone(),
        at:       t.created_at,
      })
      .collect(),
    confidence_breakdown: inputs.risk.breakdown.clone(),
    cascade_impact: cascade,
    created_at: inputs.case.created_at,
    completed_at: now,
    metrics: PacketMetrics {
      first_signal_at: inputs.first_signal_at,
      posture_emitted_at: now,
      pdl_seconds,
      evidence_count: inputs.evidence.len(),
      claim_count: inputs.claims.len(),
      contradiction_count: inputs.contradictions.len(),
      action_count: actions.len(),
      investigate_passes: inputs.investigate_passes,
    },
  };

  store
    .put_packet(case_id, serde_json::to_value(&packet)?)
    .await
    .map_err(EngineError::store)?;
  Ok(packet)
}

/// Downstream flights / shipments / bookings behind an airport, with the
/// summed SLA exposure from booking edge attributes.
pub async fn cascade_impact<S: GraphStore>(
  store: &S,
  icao: &str,
) -> Result<CascadeImpact> {
  let Some(airport) = store
    .get_node(node_types::AIRPORT, icao)
    .await
    .map_err(EngineError::store)?
  else {
    return Ok(CascadeImpact::default());
  };

  let chain = [
    edge_types::HAS_FLIGHT.to_owned(),
    edge_types::CARRIES_SHIPMENT.to_owned(),
    edge_types::HAS_BOOKING.to_owned(),
  ];
  let subset = store
    .traverse(airport.node_id, &chain, 4)
    .await
    .map_err(EngineError::store)?;

  let count_nodes = |ty: &str| -> usize {
    subset.nodes.iter().filter(|n| n.node_type == ty).count()
  };

  let booking_edges: Vec<_> = subset
    .edges
    .iter()
    .filter(|e| e.edge_type == edge_types::HAS_BOOKING)
    .collect();
  let sla_exposure_usd: f64 = booking_edges
    .iter()
    .filter_map(|e| e.attrs.get("sla_value_usd").and_then(|v| v.as_f64()))
    .sum();
  let premium_shipments = booking_edges
    .iter()
    .filter(|e| {
      e.attrs.get("service_tier").and_then(|t| t.as_str()) == Some("PREMIUM")
    })
    .count();

  Ok(CascadeImpact {
    flights: count_nodes(node_types::FLIGHT),
    shipments: count_nodes(node_types::SHIPMENT),
    bookings: count_nodes(node_types::BOOKING),
    sla_exposure_usd,
    premium_shipments,
  })
}

/// Identifiers of premium shipments currently routed behind an airport,
/// sorted so downstream planning stays deterministic.
pub async fn premium_shipments_at_risk<S: GraphStore>(
  store: &S,
  icao: &str,
) -> Result<Vec<String>> {
  let Some(airport) = store
    .get_node(node_types::AIRPORT, icao)
    .await
    .map_err(EngineError::store)?
  else {
    return Ok(Vec::new());
  };

  let chain = [
    edge_types::HAS_FLIGHT.to_owned(),
    edge_types::CARRIES_SHIPMENT.to_owned(),
    edge_types::HAS_BOOKING.to_owned(),
  ];
  let subset = store
    .traverse(airport.node_id, &chain, 4)
    .await
    .map_err(EngineError::store)?;

  let mut shipments: Vec<String> = subset
    .edges
    .iter()
    .filter(|e| {
      e.edge_type == edge_types::HAS_BOOKING
        && e.attrs.get("service_tier").and_then(|t| t.as_str())
          == Some("PREMIUM")
    })
    .filter_map(|e| {
      subset
        .nodes
        .iter()
        .find(|n| n.node_id == e.src)
        .map(|n| n.identifier.clone())
    })
    .collect();
  shipments.sort();
  shipments.dedup();
  Ok(shipments)
}
