//! Playbook learning: mine resolved cases, retrieve with decay and
//! policy-drift scoring.
//!
//! The scoring math lives in `stratus_core::playbook`; this module owns the
//! mining (pattern + action template extraction) and the retrieval ranking.

use chrono::Utc;
use serde_json::json;

use stratus_core::{
  case::{Case, CaseScope, CaseType},
  playbook::{aged_score, Playbook, PlaybookDomain},
  policy::BeliefState,
  signal::RiskRecord,
  store::{CaseStore, NewPlaybook},
};

use crate::{policy::policy_snapshot, EngineError, Result};

/// Minimum aged score for a playbook to be suggested at all.
const SUGGESTION_FLOOR: f64 = 0.05;

/// Which decay domain a case belongs to. Customs playbooks would come from
/// lane cases with customs evidence; until such a source exists everything
/// non-weather is operational.
pub fn infer_domain(belief: &BeliefState) -> PlaybookDomain {
  let weather_driven = belief
    .flight_category
    .is_some_and(|c| c.is_instrument())
    || belief.severe_alert_count > 0;
  if weather_driven {
    PlaybookDomain::Weather
  } else {
    PlaybookDomain::Operational
  }
}

/// Mine a resolved case into a retrievable playbook and link it back to the
/// case that produced it.
pub async fn mine_case<S: CaseStore>(
  store: &S,
  case: &Case,
  belief: &BeliefState,
  risk: &RiskRecord,
  contradiction_kinds: &[String],
) -> Result<Playbook> {
  let actions = store
    .actions_for_case(case.case_id)
    .await
    .map_err(EngineError::store)?;
  let executed: Vec<serde_json::Value> = actions
    .iter()
    .filter(|a| a.state.is_terminal())
    .map(|a| {
      json!({
        "type": a.action_type.as_str(),
        "args": a.args,
        "risk": a.risk.as_str(),
      })
    })
    .collect();

  let policies = store
    .active_policies(Utc::now())
    .await
    .map_err(EngineError::store)?;

  let domain = infer_domain(belief);
  let pattern = json!({
    "case_type": case.case_type,
    "scope": case.scope,
    "evidence_sources": belief.evidence_sources,
    "contradiction_kinds": contradiction_kinds,
    "risk_level": risk.risk_level.as_str(),
  });

  let name = format!(
    "{}-{}-{}",
    belief.airport.as_deref().unwrap_or("lane"),
    risk.recommended_posture.as_str().to_lowercase(),
    domain.as_str(),
  );

  let playbook = store
    .insert_playbook(NewPlaybook {
      name,
      pattern,
      action_template: json!({"action_sequence": executed}),
      policy_snapshot: policy_snapshot(&policies),
      domain,
    })
    .await
    .map_err(EngineError::store)?;

  store
    .link_playbook_case(playbook.playbook_id, case.case_id)
    .await
    .map_err(EngineError::store)?;

  // The resolved case that produced the playbook counts as its first
  // successful use; a 0/0 playbook could never clear the suggestion floor.
  store
    .record_playbook_use(playbook.playbook_id, true)
    .await
    .map_err(EngineError::store)?;

  Ok(playbook)
}

/// Whether a mined pattern matches a new case's type and scope.
fn pattern_matches(
  pattern: &serde_json::Value,
  case_type: CaseType,
  scope: &CaseScope,
) -> bool {
  let type_matches = pattern
    .get("case_type")
    .map(|t| {
      serde_json::from_value::<CaseType>(t.clone())
        .map(|parsed| parsed == case_type)
        .unwrap_or(false)
    })
    .unwrap_or(false);

  let airport_matches = match (
    pattern.get("scope").and_then(|s| s.get("airport")).and_then(|a| a.as_str()),
    scope.airport.as_deref(),
  ) {
    (Some(mined), Some(wanted)) => mined == wanted,
    (None, _) => true,
    (Some(_), None) => false,
  };

  type_matches && airport_matches
}

/// The best-scoring matching playbook for a new case, if any clears the
/// suggestion floor. Scoring:
/// `success_rate × decay × policy_alignment × sample_confidence`.
pub async fn retrieve_best<S: CaseStore>(
  store: &S,
  case_type: CaseType,
  scope: &CaseScope,
) -> Result<Option<(Playbook, f64)>> {
  let now = Utc::now();
  let playbooks = store.list_playbooks().await.map_err(EngineError::store)?;
  if playbooks.is_empty() {
    return Ok(None);
  }

  let current = policy_snapshot(
    &store
      .active_policies(now)
      .await
      .map_err(EngineError::store)?,
  );

  let mut best: Option<(Playbook, f64)> = None;
  for playbook in playbooks {
    if !pattern_matches(&playbook.pattern, case_type, scope) {
      continue;
    }
    let score = aged_score(&playbook, &current, now);
    if score < SUGGESTION_FLOOR {
      continue;
    }
    match &best {
      Some((_, top)) if *top >= score => {}
      _ => best = Some((playbook, score)),
    }
  }
  Ok(best)
}
