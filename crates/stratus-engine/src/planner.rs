//! Deterministic beam-search planner over the fixed action library.
//!
//! Width 4, depth 4. All scoring terms come from the lookup tables below —
//! no external call is ever made while planning, which keeps plans
//! reproducible and testable. Investigation candidates are scored by
//! `information_gain − cost`, interventions by
//! `action_value − cost − risk_penalty`.

use serde_json::json;

use stratus_core::{
  action::{ActionType, RiskLevel},
  case::{Criticality, Posture},
  policy::BeliefState,
  signal::{RiskRecord, SignalKind},
};

pub const BEAM_WIDTH: usize = 4;
pub const MAX_DEPTH: usize = 4;

// ─── Score tables ────────────────────────────────────────────────────────────

fn action_value(action: ActionType) -> f64 {
  use ActionType::*;
  match action {
    SetPosture => 1.0,
    RebookFlight => 0.8,
    SwitchGateway | EscalateOps => 0.7,
    PublishGatewayAdvisory | HoldCargo | NotifyCustomer => 0.6,
    UpdateBookingRules | ReleaseCargo | UpgradeService | FileClaim => 0.5,
    TriggerReevaluation => 0.4,
  }
}

fn intervention_cost(action: ActionType) -> f64 {
  use ActionType::*;
  match action {
    SetPosture => 0.0,
    PublishGatewayAdvisory | TriggerReevaluation => 0.1,
    UpdateBookingRules | EscalateOps => 0.2,
    ReleaseCargo => 0.3,
    HoldCargo => 0.5,
    NotifyCustomer => 0.6,
    UpgradeService => 0.7,
    SwitchGateway | FileClaim => 0.8,
    RebookFlight => 0.9,
  }
}

fn risk_penalty(risk: RiskLevel) -> f64 {
  match risk {
    RiskLevel::Low => 0.0,
    RiskLevel::Medium => 0.1,
    RiskLevel::High => 0.3,
    RiskLevel::Critical => 0.5,
  }
}

/// Nominal dollar exposure per action type, for the cost-approval policy.
pub fn nominal_cost_usd(action: ActionType) -> f64 {
  use ActionType::*;
  match action {
    RebookFlight => 12_000.0,
    SwitchGateway => 8_000.0,
    UpgradeService => 4_000.0,
    FileClaim => 2_500.0,
    HoldCargo | ReleaseCargo | NotifyCustomer => 500.0,
    _ => 0.0,
  }
}

/// How much resolving a missing source is worth, by its criticality.
fn information_gain(criticality: Criticality) -> f64 {
  match criticality {
    Criticality::Blocking => 1.0,
    Criticality::Degraded => 0.7,
    Criticality::Informational => 0.5,
  }
}

fn fetch_cost(kind: SignalKind) -> f64 {
  match kind {
    // ADS-B is rate-limited and slow relative to the aviation feeds.
    SignalKind::Adsb => 0.3,
    _ => 0.1,
  }
}

// ─── Candidates ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Candidate {
  /// Re-fetch a missing source on a later pass.
  Investigate { kind: SignalKind, criticality: Criticality },
  Intervene(PlannedAction),
}

impl Candidate {
  fn score(&self) -> f64 {
    match self {
      Self::Investigate { kind, criticality } => {
        information_gain(*criticality) - fetch_cost(*kind)
      }
      Self::Intervene(action) => action.score,
    }
  }

  /// Dedup key so a sequence never repeats the same move.
  fn key(&self) -> String {
    match self {
      Self::Investigate { kind, .. } => format!("fetch:{:?}", kind),
      Self::Intervene(action) => action.action_type.as_str().to_owned(),
    }
  }
}

/// One intervention the planner proposes for governance.
#[derive(Debug, Clone)]
pub struct PlannedAction {
  pub action_type:           ActionType,
  pub args:                  serde_json::Value,
  pub score:                 f64,
  pub risk:                  RiskLevel,
  pub requires_approval:     bool,
  pub requires_notification: bool,
}

fn intervention(
  action_type: ActionType,
  args: serde_json::Value,
) -> Candidate {
  let risk = action_type.default_risk();
  let mut score =
    action_value(action_type) - intervention_cost(action_type) - risk_penalty(risk);
  let requires_approval = action_type.default_requires_approval();
  if requires_approval {
    score -= 0.1;
  }
  Candidate::Intervene(PlannedAction {
    action_type,
    args,
    score,
    risk,
    requires_approval,
    requires_notification: action_type.requires_notification(),
  })
}

fn generate_candidates(
  belief: &BeliefState,
  risk: &RiskRecord,
) -> Vec<Candidate> {
  let posture = risk.recommended_posture;
  let airport = belief.airport.clone();
  let mut candidates = vec![intervention(
    ActionType::SetPosture,
    json!({"posture": posture.as_str(), "airport": airport}),
  )];

  if posture != Posture::Accept {
    candidates.push(intervention(
      ActionType::PublishGatewayAdvisory,
      json!({"posture": posture.as_str(), "airport": belief.airport}),
    ));
  }
  if matches!(posture, Posture::Restrict | Posture::Hold) {
    candidates.push(intervention(
      ActionType::UpdateBookingRules,
      json!({"restriction_level": posture.as_str()}),
    ));
  }
  if posture == Posture::Escalate {
    candidates.push(intervention(
      ActionType::EscalateOps,
      json!({"reason": "automated escalation", "airport": belief.airport}),
    ));
  }
  // Holding the gateway puts premium shipments behind it on hold too.
  if matches!(posture, Posture::Hold | Posture::Escalate) {
    if let Some(shipment) = belief.at_risk_shipments.first() {
      candidates.push(intervention(
        ActionType::HoldCargo,
        json!({"shipment": shipment, "airport": belief.airport}),
      ));
    }
  }
  if belief.open_contradictions > 0 {
    candidates.push(intervention(
      ActionType::TriggerReevaluation,
      json!({"reason": "unresolved contradictions"}),
    ));
  }

  // Missing sources become investigation candidates for the next pass.
  for kind in SignalKind::ALL {
    let system = kind.source_system();
    if !belief.evidence_sources.iter().any(|s| s == system)
      && belief.evidence_count > 0
    {
      candidates.push(Candidate::Investigate {
        kind,
        criticality: kind.criticality(),
      });
    }
  }

  candidates
}

// ─── Beam search ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct Sequence {
  moves:       Vec<Candidate>,
  total_score: f64,
}

/// Plan the intervention set for a belief + risk record. Returns the best
/// sequence's interventions with non-negative scores, in sequence order.
pub fn plan_actions(
  belief: &BeliefState,
  risk: &RiskRecord,
) -> Vec<PlannedAction> {
  let candidates = generate_candidates(belief, risk);
  let mut beam = vec![Sequence::default()];

  for _ in 0..MAX_DEPTH {
    let mut expanded: Vec<Sequence> = Vec::new();
    for sequence in &beam {
      let used: Vec<String> =
        sequence.moves.iter().map(Candidate::key).collect();
      let mut extended = false;
      for candidate in &candidates {
        if used.contains(&candidate.key()) {
          continue;
        }
        let mut next = sequence.clone();
        next.total_score += candidate.score();
        next.moves.push(candidate.clone());
        expanded.push(next);
        extended = true;
      }
      if !extended {
        expanded.push(sequence.clone());
      }
    }

    // Deterministic ranking: score, then the move-key path as tiebreak.
    expanded.sort_by(|a, b| {
      b.total_score
        .partial_cmp(&a.total_score)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| {
          let ka: Vec<String> = a.moves.iter().map(Candidate::key).collect();
          let kb: Vec<String> = b.moves.iter().map(Candidate::key).collect();
          ka.cmp(&kb)
        })
    });
    expanded.truncate(BEAM_WIDTH);
    beam = expanded;
  }

  let best = beam.into_iter().next().unwrap_or_default();
  best
    .moves
    .into_iter()
    .filter(|m| m.score() >= 0.0)
    .filter_map(|m| match m {
      Candidate::Intervene(action) => Some(action),
      Candidate::Investigate { .. } => None,
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use stratus_core::signal::ConfidenceBreakdown;
  use uuid::Uuid;

  use super::*;

  fn risk(posture: Posture, level: RiskLevel) -> RiskRecord {
    RiskRecord {
      risk_level:          level,
      recommended_posture: posture,
      breakdown:           ConfidenceBreakdown::default(),
    }
  }

  fn belief() -> BeliefState {
    let mut b = BeliefState::new(Uuid::new_v4());
    b.airport = Some("KJFK".into());
    b.evidence_count = 5;
    b.evidence_sources = SignalKind::ALL
      .iter()
      .map(|k| k.source_system().to_owned())
      .collect();
    b
  }

  #[test]
  fn accept_plans_only_set_posture() {
    let plan = plan_actions(&belief(), &risk(Posture::Accept, RiskLevel::Low));
    let types: Vec<ActionType> =
      plan.iter().map(|a| a.action_type).collect();
    assert_eq!(types, vec![ActionType::SetPosture]);
    assert_eq!(plan[0].args["posture"], "ACCEPT");
  }

  #[test]
  fn hold_plans_posture_advisory_and_booking_rules() {
    let plan = plan_actions(&belief(), &risk(Posture::Hold, RiskLevel::High));
    let types: Vec<ActionType> =
      plan.iter().map(|a| a.action_type).collect();
    assert!(types.contains(&ActionType::SetPosture));
    assert!(types.contains(&ActionType::PublishGatewayAdvisory));
    assert!(types.contains(&ActionType::UpdateBookingRules));
    // SET_POSTURE has the best score, so it leads the sequence.
    assert_eq!(types[0], ActionType::SetPosture);
  }

  #[test]
  fn hold_with_premium_shipments_at_risk_plans_hold_cargo() {
    let mut b = belief();
    b.at_risk_shipments = vec!["TRK-9999".into()];
    let plan = plan_actions(&b, &risk(Posture::Hold, RiskLevel::High));
    let hold = plan
      .iter()
      .find(|a| a.action_type == ActionType::HoldCargo)
      .expect("premium shipment put on hold");
    assert_eq!(hold.args["shipment"], "TRK-9999");

    // Nothing shipment-level is planned when the gateway stays open.
    let accept = plan_actions(&b, &risk(Posture::Accept, RiskLevel::Low));
    assert!(accept.iter().all(|a| !a.action_type.is_shipment_level()));
  }

  #[test]
  fn contradictions_add_reevaluation_trigger() {
    let mut b = belief();
    b.open_contradictions = 1;
    let plan = plan_actions(&b, &risk(Posture::Restrict, RiskLevel::Medium));
    assert!(plan
      .iter()
      .any(|a| a.action_type == ActionType::TriggerReevaluation));
  }

  #[test]
  fn planning_is_deterministic() {
    let b = belief();
    let r = risk(Posture::Hold, RiskLevel::High);
    let first: Vec<ActionType> =
      plan_actions(&b, &r).iter().map(|a| a.action_type).collect();
    for _ in 0..10 {
      let again: Vec<ActionType> =
        plan_actions(&b, &r).iter().map(|a| a.action_type).collect();
      assert_eq!(first, again);
    }
  }

  #[test]
  fn no_plan_exceeds_beam_depth() {
    let mut b = belief();
    b.open_contradictions = 3;
    let plan = plan_actions(&b, &risk(Posture::Escalate, RiskLevel::Critical));
    assert!(plan.len() <= MAX_DEPTH);
  }
}
