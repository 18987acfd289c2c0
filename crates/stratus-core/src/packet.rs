//! The Decision Packet — the immutable audit artifact emitted per case.
//!
//! A packet is a read-only projection over the case's rows. Once persisted it
//! is never mutated; consumers reference it by case id only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  action::{ActionState, ActionType, RiskLevel},
  case::{CaseScope, CaseType, Posture},
  graph::{ClaimStatus, ContradictionStatus},
  signal::ConfidenceBreakdown,
};

// ─── Sections ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostureDecision {
  pub posture:      Posture,
  pub airport:      Option<String>,
  pub effective_at: DateTime<Utc>,
  pub rationale:    String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimSummary {
  pub claim_id:     Uuid,
  pub text:         String,
  pub status:       ClaimStatus,
  pub confidence:   f64,
  pub evidence_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceSummary {
  pub evidence_id:   Uuid,
  pub source_system: String,
  pub retrieved_at:  DateTime<Utc>,
  pub excerpt:       String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContradictionSummary {
  pub contradiction_id: Uuid,
  pub left_ref:         Uuid,
  pub right_ref:        Uuid,
  pub kind:             String,
  pub status:           ContradictionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyApplied {
  pub citation: String,
  pub text:     String,
  pub effect:   String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSummary {
  pub action_id:   Uuid,
  pub action_type: ActionType,
  pub args:        serde_json::Value,
  pub state:       ActionState,
  pub risk:        RiskLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeSummary {
  pub action_id: Uuid,
  pub success:   bool,
  pub payload:   serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockedSection {
  pub is_blocked:                bool,
  pub reason:                    Option<String>,
  pub missing_evidence_requests: Vec<crate::case::MissingEvidenceRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
  pub seq:      i64,
  pub kind:     crate::case::TraceEventKind,
  pub ref_type: Option<String>,
  pub ref_id:   Option<Uuid>,
  pub meta:     serde_json::Value,
  pub at:       DateTime<Utc>,
}

/// Downstream exposure behind the scoped airport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CascadeImpact {
  pub flights:            usize,
  pub shipments:          usize,
  pub bookings:           usize,
  /// Sum of booking SLA exposure, in dollars.
  pub sla_exposure_usd:   f64,
  pub premium_shipments:  usize,
}

/// Operational metrics. PDL — Posture Decision Latency — is wall-clock from
/// the first signal ingested to the posture emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketMetrics {
  pub first_signal_at:     Option<DateTime<Utc>>,
  pub posture_emitted_at:  DateTime<Utc>,
  pub pdl_seconds:         Option<f64>,
  pub evidence_count:      usize,
  pub claim_count:         usize,
  pub contradiction_count: usize,
  pub action_count:        usize,
  pub investigate_passes:  u32,
}

// ─── Packet ──────────────────────────────────────────────────────────────────

/// The case-sealed audit artifact. Every claim cites evidence; every policy
/// effect is listed; the full workflow trace rides along for replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionPacket {
  pub case_id:              Uuid,
  pub case_type:            CaseType,
  pub scope:                CaseScope,
  pub posture:              PostureDecision,
  pub claims:               Vec<ClaimSummary>,
  pub evidence:             Vec<EvidenceSummary>,
  pub contradictions:       Vec<ContradictionSummary>,
  pub policies_applied:     Vec<PolicyApplied>,
  pub actions_proposed:     Vec<ActionSummary>,
  pub actions_executed:     Vec<OutcomeSummary>,
  pub blocked_section:      BlockedSection,
  pub workflow_trace:       Vec<TraceEntry>,
  pub confidence_breakdown: ConfidenceBreakdown,
  pub cascade_impact:       CascadeImpact,
  pub created_at:           DateTime<Utc>,
  pub completed_at:         DateTime<Utc>,
  pub metrics:              PacketMetrics,
}
