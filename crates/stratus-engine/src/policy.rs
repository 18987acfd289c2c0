//! The policy engine: a stateless evaluator over a belief state.
//!
//! Loads the policies effective "now", tests each condition set against the
//! belief, and merges effects with BLOCK > REQUIRE_APPROVAL > ALLOW. Every
//! contributing policy is cited by the 12-hex prefix of the SHA-256 over its
//! normalized text — the same hashes playbook snapshots carry.

use chrono::{DateTime, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};

use stratus_core::{
  case::Posture,
  policy::{BeliefState, Policy, PolicyEffect, PolicyResult, PolicySeed, Verdict},
  store::CaseStore,
};

use crate::{EngineError, Result};

// ─── Text hashing ────────────────────────────────────────────────────────────

/// First 12 hex chars of SHA-256 over the normalized policy text. Collision
/// risk is negligible below a few hundred policies.
pub fn policy_text_hash(text: &str) -> String {
  let normalized = normalize_text(text);
  let mut encoded = hex::encode(Sha256::digest(normalized.as_bytes()));
  encoded.truncate(12);
  encoded
}

/// Trim and collapse internal whitespace so formatting edits don't change
/// the hash.
fn normalize_text(text: &str) -> String {
  text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sorted snapshot of the active policy set, for playbook drift scoring.
pub fn policy_snapshot(policies: &[Policy]) -> Vec<String> {
  let mut hashes: Vec<String> =
    policies.iter().map(|p| policy_text_hash(&p.text)).collect();
  hashes.sort();
  hashes
}

// ─── Seed policies ───────────────────────────────────────────────────────────

/// The 13 governance rules that must exist on bootstrap, keyed by their
/// unique text.
pub fn builtin_policies() -> Vec<PolicySeed> {
  vec![
    // ── Evidence & contradiction rules ──────────────────────────────────
    PolicySeed {
      policy_type: "evidence_requirement",
      text: "Open contradictions require evidence resolution before posture \
             decision",
      conditions: json!({
        "has_contradictions": true,
        "proposed_posture": "ACCEPT",
      }),
      effects: json!({
        "action": "block",
        "description": "Resolve contradicting signals before accepting",
      }),
    },
    PolicySeed {
      policy_type: "evidence_requirement",
      text: "Posture changes require at least 2 evidence sources",
      conditions: json!({"min_evidence": 2}),
      effects: json!({
        "action": "block",
        "description": "Insufficient evidence for a posture decision",
      }),
    },
    PolicySeed {
      policy_type: "evidence_requirement",
      text: "Shipment-level actions require booking evidence",
      conditions: json!({"action_type": "shipment"}),
      effects: json!({
        "action": "block_without_booking",
        "description": "Cannot modify shipments without booking data",
      }),
    },
    PolicySeed {
      policy_type: "posture_constraint",
      text: "Open contradictions with stale evidence require RESTRICT posture",
      conditions: json!({
        "has_contradictions": true,
        "has_stale_evidence": true,
        "proposed_posture": "ACCEPT",
      }),
      effects: json!({
        "action": "block",
        "description": "Cannot ACCEPT with open contradictions and stale \
                        evidence",
      }),
    },
    // ── Approval thresholds ─────────────────────────────────────────────
    PolicySeed {
      policy_type: "approval_requirement",
      text: "HIGH or CRITICAL risk actions require human approval",
      conditions: json!({"risk_level": ["HIGH", "CRITICAL"]}),
      effects: json!({
        "action": "require_approval",
        "description": "Escalate to duty manager for approval",
      }),
    },
    PolicySeed {
      policy_type: "approval_requirement",
      text: "Premium SLA posture changes within 48h require approval",
      conditions: json!({
        "service_tier": "PREMIUM",
        "hours_until_deadline": {"op": "<", "value": 48},
        "action_type": "SET_POSTURE",
      }),
      effects: json!({"action": "require_approval"}),
    },
    PolicySeed {
      policy_type: "approval_requirement",
      text: "Actions with cost exposure above $10,000 require approval",
      conditions: json!({"estimated_cost": {"op": ">", "value": 10000}}),
      effects: json!({"action": "require_approval"}),
    },
    // ── Risk-posture thresholds ─────────────────────────────────────────
    PolicySeed {
      policy_type: "threshold",
      text: "CRITICAL risk level prohibits ACCEPT posture",
      conditions: json!({"risk_level": "CRITICAL", "posture": "ACCEPT"}),
      effects: json!({
        "action": "block",
        "description": "Cannot accept new bookings during critical \
                        disruptions",
      }),
    },
    PolicySeed {
      policy_type: "threshold",
      text: "HIGH risk recommends HOLD or ESCALATE posture",
      conditions: json!({"risk_level": "HIGH"}),
      effects: json!({
        "action": "allow",
        "description": "Hold tendering until the situation clarifies",
      }),
    },
    // ── Operational rules ───────────────────────────────────────────────
    PolicySeed {
      policy_type: "operational",
      text: "LOW risk allows ACCEPT posture for normal operations",
      conditions: json!({"risk_level": "LOW"}),
      effects: json!({
        "action": "allow",
        "description": "Normal operations, accept new bookings",
      }),
    },
    PolicySeed {
      policy_type: "operational",
      text: "MEDIUM risk allows RESTRICT posture",
      conditions: json!({"risk_level": "MEDIUM"}),
      effects: json!({
        "action": "allow",
        "description": "Restrict premium SLAs, allow standard bookings",
      }),
    },
    PolicySeed {
      policy_type: "operational",
      text: "Weather data must be available for disruption assessment",
      conditions: json!({"has_weather": true}),
      effects: json!({
        "action": "allow",
        "description": "Weather conditions verified",
      }),
    },
    PolicySeed {
      policy_type: "operational",
      text: "IFR/LIFR weather conditions trigger posture review",
      conditions: json!({"flight_category": ["IFR", "LIFR"]}),
      effects: json!({
        "action": "allow",
        "description": "Weather impact assessed in the posture decision",
      }),
    },
  ]
}

/// Idempotently load the built-in rules; returns how many were new.
pub async fn seed_builtin_policies<S: CaseStore>(store: &S) -> Result<usize> {
  store
    .seed_policies(&builtin_policies())
    .await
    .map_err(EngineError::store)
}

// ─── Condition matching ──────────────────────────────────────────────────────

fn string_matches(condition: &serde_json::Value, actual: &str) -> bool {
  match condition {
    serde_json::Value::String(s) => s == actual,
    serde_json::Value::Array(options) => {
      options.iter().any(|o| o.as_str() == Some(actual))
    }
    _ => false,
  }
}

fn comparison_matches(condition: &serde_json::Value, actual: f64) -> bool {
  let Some(op) = condition.get("op").and_then(|o| o.as_str()) else {
    return false;
  };
  let Some(value) = condition.get("value").and_then(|v| v.as_f64()) else {
    return false;
  };
  match op {
    "<" => actual < value,
    "<=" => actual <= value,
    ">" => actual > value,
    ">=" => actual >= value,
    _ => false,
  }
}

/// Whether every key in a policy's condition set holds for the belief.
fn conditions_match(conditions: &serde_json::Value, belief: &BeliefState) -> bool {
  let Some(map) = conditions.as_object() else { return false };
  if map.is_empty() {
    return false;
  }

  map.iter().all(|(key, expected)| match key.as_str() {
    "has_contradictions" => {
      expected.as_bool() == Some(belief.has_contradictions)
    }
    "has_stale_evidence" => {
      expected.as_bool() == Some(belief.has_stale_evidence)
    }
    "proposed_posture" | "posture" => {
      string_matches(expected, belief.proposed_posture.as_str())
    }
    "risk_level" => string_matches(expected, belief.risk_level.as_str()),
    // Fires when the belief has FEWER evidence rows than required.
    "min_evidence" => expected
      .as_u64()
      .is_some_and(|min| (belief.evidence_count as u64) < min),
    "action_type" => match expected.as_str() {
      Some("shipment") => belief
        .proposed_actions
        .iter()
        .any(|a| a.is_shipment_level()),
      Some(name) => {
        belief.proposed_actions.iter().any(|a| a.as_str() == name)
      }
      None => false,
    },
    "service_tier" => belief
      .service_tier
      .as_deref()
      .is_some_and(|tier| string_matches(expected, tier)),
    "hours_until_deadline" => belief
      .hours_until_deadline
      .is_some_and(|hours| comparison_matches(expected, hours)),
    "estimated_cost" => comparison_matches(expected, belief.estimated_cost),
    "flight_category" => belief
      .flight_category
      .is_some_and(|cat| string_matches(expected, cat.as_str())),
    "has_weather" => {
      let has = belief.evidence_sources.iter().any(|s| s == "METAR");
      expected.as_bool() == Some(has)
    }
    _ => false,
  })
}

fn effect_verdict(effects: &serde_json::Value, belief: &BeliefState) -> Verdict {
  match effects.get("action").and_then(|a| a.as_str()) {
    Some("block") | Some("needs_evidence") => Verdict::Block,
    Some("block_without_booking") => {
      if belief.has_booking_evidence {
        Verdict::Allow
      } else {
        Verdict::Block
      }
    }
    Some("require_approval") | Some("requires_approval") => {
      Verdict::RequireApproval
    }
    _ => Verdict::Allow,
  }
}

// ─── Evaluation ──────────────────────────────────────────────────────────────

/// Evaluate the belief against the policies effective at `now`.
pub async fn evaluate<S: CaseStore>(
  store: &S,
  belief: &BeliefState,
  now: DateTime<Utc>,
) -> Result<PolicyResult> {
  let policies = store
    .active_policies(now)
    .await
    .map_err(EngineError::store)?;
  Ok(evaluate_against(&policies, belief))
}

/// Pure evaluation core, separated for testability.
pub fn evaluate_against(
  policies: &[Policy],
  belief: &BeliefState,
) -> PolicyResult {
  let mut verdict = Verdict::Allow;
  let mut effects = Vec::new();
  let mut citations = Vec::new();
  let mut block_reasons = Vec::new();

  for policy in policies {
    if !conditions_match(&policy.conditions, belief) {
      continue;
    }

    let contribution = effect_verdict(&policy.effects, belief);
    let effect_name = policy
      .effects
      .get("action")
      .and_then(|a| a.as_str())
      .unwrap_or("allow")
      .to_owned();
    let citation = policy_text_hash(&policy.text);

    // The safety override: "shipment without booking" must not block a
    // plan that contains no shipment-typed action. Applied after rule
    // matching, before the merge.
    let is_booking_rule = effect_name == "block_without_booking";
    let any_shipment = belief
      .proposed_actions
      .iter()
      .any(|a| a.is_shipment_level());
    let contribution = if is_booking_rule && !any_shipment {
      Verdict::Allow
    } else {
      contribution
    };

    if contribution == Verdict::Block {
      block_reasons.push(policy.text.clone());
    }
    verdict = verdict.max(contribution);
    citations.push(citation.clone());
    effects.push(PolicyEffect {
      citation,
      text: policy.text.clone(),
      effect: effect_name,
    });
  }

  PolicyResult { verdict, effects, citations, block_reasons }
}

/// The posture a blocked-ACCEPT proposal is demoted to before one
/// re-evaluation pass.
pub fn demoted_posture(proposed: Posture) -> Option<Posture> {
  match proposed {
    Posture::Accept => Some(Posture::Restrict),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use stratus_core::{
    action::{ActionType, RiskLevel},
    policy::{BeliefState, Policy},
  };
  use uuid::Uuid;

  use super::*;

  fn materialize(seeds: Vec<PolicySeed>) -> Vec<Policy> {
    seeds
      .into_iter()
      .map(|seed| Policy {
        policy_id:      Uuid::new_v4(),
        policy_type:    seed.policy_type.to_owned(),
        text:           seed.text.to_owned(),
        conditions:     seed.conditions,
        effects:        seed.effects,
        effective_from: Utc::now() - chrono::Duration::hours(1),
        effective_to:   None,
      })
      .collect()
  }

  fn benign_belief() -> BeliefState {
    let mut belief = BeliefState::new(Uuid::new_v4());
    belief.proposed_posture = Posture::Accept;
    belief.risk_level = RiskLevel::Low;
    belief.evidence_count = 5;
    belief.evidence_sources =
      vec!["FAA_NAS".into(), "METAR".into(), "TAF".into()];
    belief
  }

  #[test]
  fn clear_skies_allows_accept() {
    let policies = materialize(builtin_policies());
    let result = evaluate_against(&policies, &benign_belief());
    assert_eq!(result.verdict, Verdict::Allow);
    assert!(!result.citations.is_empty());
  }

  #[test]
  fn critical_risk_blocks_accept() {
    let policies = materialize(builtin_policies());
    let mut belief = benign_belief();
    belief.risk_level = RiskLevel::Critical;

    let result = evaluate_against(&policies, &belief);
    assert_eq!(result.verdict, Verdict::Block);
    assert!(result
      .block_reasons
      .iter()
      .any(|r| r.contains("CRITICAL risk")));
  }

  #[test]
  fn contradictions_block_accept_but_not_restrict() {
    let policies = materialize(builtin_policies());
    let mut belief = benign_belief();
    belief.has_contradictions = true;

    let accept = evaluate_against(&policies, &belief);
    assert_eq!(accept.verdict, Verdict::Block);

    belief.proposed_posture = Posture::Restrict;
    let restrict = evaluate_against(&policies, &belief);
    assert_ne!(restrict.verdict, Verdict::Block);
  }

  #[test]
  fn high_risk_requires_approval() {
    let policies = materialize(builtin_policies());
    let mut belief = benign_belief();
    belief.risk_level = RiskLevel::High;
    belief.proposed_posture = Posture::Hold;

    let result = evaluate_against(&policies, &belief);
    assert_eq!(result.verdict, Verdict::RequireApproval);
  }

  #[test]
  fn shipment_without_booking_blocks() {
    let policies = materialize(builtin_policies());
    let mut belief = benign_belief();
    belief.proposed_actions = vec![ActionType::HoldCargo];
    belief.has_booking_evidence = false;

    let result = evaluate_against(&policies, &belief);
    assert_eq!(result.verdict, Verdict::Block);
  }

  #[test]
  fn booking_rule_overridden_when_no_shipment_action_proposed() {
    let policies = materialize(builtin_policies());
    let mut belief = benign_belief();
    belief.proposed_actions = vec![ActionType::SetPosture];
    belief.has_booking_evidence = false;

    let result = evaluate_against(&policies, &belief);
    assert_ne!(result.verdict, Verdict::Block);
  }

  #[test]
  fn sparse_evidence_blocks() {
    let policies = materialize(builtin_policies());
    let mut belief = benign_belief();
    belief.evidence_count = 1;

    let result = evaluate_against(&policies, &belief);
    assert_eq!(result.verdict, Verdict::Block);
  }

  #[test]
  fn merge_is_monotone_under_added_block_rules() {
    let mut policies = materialize(builtin_policies());
    let mut belief = benign_belief();
    belief.risk_level = RiskLevel::Critical;

    let before = evaluate_against(&policies, &belief);
    assert_eq!(before.verdict, Verdict::Block);

    // Adding another BLOCK-producing rule cannot soften the verdict.
    policies.push(Policy {
      policy_id:      Uuid::new_v4(),
      policy_type:    "threshold".into(),
      text:           "Another blocking rule".into(),
      conditions:     serde_json::json!({"risk_level": "CRITICAL"}),
      effects:        serde_json::json!({"action": "block"}),
      effective_from: Utc::now() - chrono::Duration::hours(1),
      effective_to:   None,
    });
    let after = evaluate_against(&policies, &belief);
    assert_eq!(after.verdict, Verdict::Block);
  }

  #[test]
  fn text_hash_is_stable_under_whitespace() {
    let a = policy_text_hash("HIGH  or CRITICAL\nrisk");
    let b = policy_text_hash("HIGH or CRITICAL risk");
    assert_eq!(a, b);
    assert_eq!(a.len(), 12);
  }
}
