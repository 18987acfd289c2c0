//! Policies and the belief state they are evaluated against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  action::{ActionType, RiskLevel},
  case::Posture,
  signal::FlightCategory,
};

// ─── Policy rows ─────────────────────────────────────────────────────────────

/// A governance rule. `text` is the unique key; `conditions` and `effects`
/// are structured JSON matched against a [`BeliefState`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
  pub policy_id:      Uuid,
  /// Rule family: `evidence_requirement`, `approval_requirement`,
  /// `posture_constraint`, `threshold`, `operational`.
  pub policy_type:    String,
  pub text:           String,
  pub conditions:     serde_json::Value,
  pub effects:        serde_json::Value,
  pub effective_from: DateTime<Utc>,
  pub effective_to:   Option<DateTime<Utc>>,
}

impl Policy {
  pub fn is_effective_at(&self, at: DateTime<Utc>) -> bool {
    self.effective_from <= at
      && self.effective_to.map_or(true, |until| until > at)
  }
}

/// Seed definition used by the idempotent bootstrap loader.
#[derive(Debug, Clone)]
pub struct PolicySeed {
  pub policy_type: &'static str,
  pub text:        &'static str,
  pub conditions:  serde_json::Value,
  pub effects:     serde_json::Value,
}

// ─── Evaluation results ──────────────────────────────────────────────────────

/// Merged policy verdict. BLOCK dominates REQUIRE_APPROVAL dominates ALLOW.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
  Allow,
  RequireApproval,
  Block,
}

/// One policy's contribution to the merged result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEffect {
  /// First 12 hex chars of SHA-256 over the policy text.
  pub citation: String,
  pub text:     String,
  pub effect:   String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyResult {
  pub verdict:       Verdict,
  pub effects:       Vec<PolicyEffect>,
  /// Text hashes of every policy that contributed.
  pub citations:     Vec<String>,
  pub block_reasons: Vec<String>,
}

// ─── Belief state ────────────────────────────────────────────────────────────

/// The structured summary of graph + missing-evidence state consumed by the
/// policy engine and the planner. Assembled by the orchestrator from graph
/// reads; never free-form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeliefState {
  pub case_id:              Uuid,
  pub airport:              Option<String>,
  pub risk_level:           RiskLevel,
  pub proposed_posture:     Posture,
  pub evidence_sources:     Vec<String>,
  pub evidence_count:       usize,
  pub has_contradictions:   bool,
  pub has_stale_evidence:   bool,
  pub proposed_actions:     Vec<ActionType>,
  /// Whether every shipment the proposed actions touch has booking
  /// evidence on file.
  pub has_booking_evidence: bool,
  /// Identifiers of premium shipments currently routed behind the scoped
  /// airport, sorted.
  pub at_risk_shipments:    Vec<String>,
  pub estimated_cost:       f64,
  pub service_tier:         Option<String>,
  pub hours_until_deadline: Option<f64>,
  pub flight_category:      Option<FlightCategory>,
  /// FAA status flag from the latest derivation pass:
  /// `NORMAL` / `DELAY` / `GROUND_STOP` / `CLOSURE`.
  pub faa_disruption_kind:  Option<String>,
  pub severe_alert_count:   usize,
  pub movement_collapsed:   bool,
  pub open_contradictions:  usize,
  /// Open missing-evidence requests by criticality label.
  pub missing_blocking:     usize,
  pub missing_degraded:     usize,
  pub missing_informational: usize,
}

impl BeliefState {
  pub fn new(case_id: Uuid) -> Self {
    Self {
      case_id,
      airport: None,
      risk_level: RiskLevel::Low,
      proposed_posture: Posture::Hold,
      evidence_sources: Vec::new(),
      evidence_count: 0,
      has_contradictions: false,
      has_stale_evidence: false,
      proposed_actions: Vec::new(),
      has_booking_evidence: false,
      at_risk_shipments: Vec::new(),
      estimated_cost: 0.0,
      service_tier: None,
      hours_until_deadline: None,
      flight_category: None,
      faa_disruption_kind: None,
      severe_alert_count: 0,
      movement_collapsed: false,
      open_contradictions: 0,
      missing_blocking: 0,
      missing_degraded: 0,
      missing_informational: 0,
    }
  }

  pub fn has_missing_evidence(&self) -> bool {
    self.missing_blocking + self.missing_degraded + self.missing_informational
      > 0
  }
}
