//! Deterministic communication drafting.
//!
//! DRAFT_COMMS renders NOTIFY_CUSTOMER / ESCALATE_OPS payloads from fixed
//! templates over the belief state. No external call; the drafts ride along
//! as action args.

use serde_json::json;

use stratus_core::{action::ActionType, policy::BeliefState, signal::RiskRecord};

use crate::planner::PlannedAction;

/// Fill in the notification payloads for any planned action that needs one.
pub fn draft_communications(
  belief: &BeliefState,
  risk: &RiskRecord,
  planned: &mut [PlannedAction],
) -> usize {
  let airport = belief.airport.as_deref().unwrap_or("the gateway");
  let mut drafted = 0usize;

  for action in planned.iter_mut().filter(|a| a.requires_notification) {
    let draft = match action.action_type {
      ActionType::NotifyCustomer => json!({
        "subject": format!("Service update for shipments via {airport}"),
        "body": format!(
          "Operations at {airport} are under a {} posture ({} risk). Your \
           shipment may be delayed; we will update you as conditions \
           change.",
          risk.recommended_posture.as_str(),
          risk.risk_level.as_str(),
        ),
      }),
      ActionType::EscalateOps => json!({
        "channel": "duty-manager",
        "summary": format!(
          "{airport}: {} risk, recommended posture {}. {} open \
           contradiction(s), {} evidence row(s).",
          risk.risk_level.as_str(),
          risk.recommended_posture.as_str(),
          belief.open_contradictions,
          belief.evidence_count,
        ),
      }),
      _ => json!({
        "notice": format!(
          "{} scheduled under {} posture at {airport}",
          action.action_type.as_str(),
          risk.recommended_posture.as_str(),
        ),
      }),
    };

    if let Some(args) = action.args.as_object_mut() {
      args.insert("communication".into(), draft);
      drafted += 1;
    }
  }

  drafted
}

#[cfg(test)]
mod tests {
  use stratus_core::{
    action::RiskLevel,
    case::Posture,
    signal::ConfidenceBreakdown,
  };
  use uuid::Uuid;

  use super::*;

  #[test]
  fn escalation_draft_names_the_airport_and_risk() {
    let mut belief = BeliefState::new(Uuid::new_v4());
    belief.airport = Some("KORD".into());
    let risk = RiskRecord {
      risk_level:          RiskLevel::Critical,
      recommended_posture: Posture::Escalate,
      breakdown:           ConfidenceBreakdown::default(),
    };
    let mut planned = vec![PlannedAction {
      action_type:           ActionType::EscalateOps,
      args:                  serde_json::json!({"reason": "x"}),
      score:                 0.5,
      risk:                  RiskLevel::Low,
      requires_approval:     false,
      requires_notification: true,
    }];

    assert_eq!(draft_communications(&belief, &risk, &mut planned), 1);
    let summary = planned[0].args["communication"]["summary"]
      .as_str()
      .unwrap();
    assert!(summary.contains("KORD"));
    assert!(summary.contains("CRITICAL"));
  }
}
