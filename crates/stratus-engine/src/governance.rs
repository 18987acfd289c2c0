//! Action governance: the propose → approve → execute → rollback driver.
//!
//! Legality of each transition (and the approval invariants) is enforced by
//! the store; this module sequences the transitions, dispatches per-type
//! execution handlers, and emits a trace event for every state change.

use serde_json::json;

use stratus_core::{
  action::{Action, ActionState, ActionType, NewAction, Outcome, RiskLevel},
  case::{CaseStatus, Criticality, NewTraceEvent, TraceEventKind},
  policy::{PolicyResult, Verdict},
  store::CaseStore,
};
use uuid::Uuid;

use crate::{planner::PlannedAction, EngineError, Result};

pub struct ActionGovernor<'a, S> {
  store: &'a S,
}

impl<'a, S: CaseStore> ActionGovernor<'a, S> {
  pub fn new(store: &'a S) -> Self {
    Self { store }
  }

  async fn trace_transition(
    &self,
    action: &Action,
    from: ActionState,
    note: Option<&str>,
  ) -> Result<()> {
    self
      .store
      .record_trace(
        NewTraceEvent::new(
          action.case_id,
          TraceEventKind::StateEnter,
          json!({
            "from_state": from.as_str(),
            "to_state": action.state.as_str(),
            "action_type": action.action_type.as_str(),
            "note": note,
          }),
        )
        .with_ref("action", action.action_id),
      )
      .await
      .map_err(EngineError::store)?;
    Ok(())
  }

  /// Insert a planned action at PROPOSED, with the approval requirement
  /// merged from the plan, the policy verdict, and the risk floor.
  pub async fn propose(
    &self,
    case_id: Uuid,
    planned: &PlannedAction,
    policy: &PolicyResult,
  ) -> Result<Action> {
    let requires_approval = planned.requires_approval
      || policy.verdict == Verdict::RequireApproval
      || planned.risk >= RiskLevel::High;

    let action = self
      .store
      .insert_action(NewAction {
        case_id,
        action_type: planned.action_type,
        args: planned.args.clone(),
        risk: planned.risk,
        requires_approval,
      })
      .await
      .map_err(EngineError::store)?;

    self
      .trace_transition(&action, ActionState::Proposed, Some("proposed"))
      .await?;
    Ok(action)
  }

  /// Record an approval. Allowed from PROPOSED or PENDING_APPROVAL; a
  /// second approval is a no-op.
  pub async fn approve(&self, action_id: Uuid, actor: &str) -> Result<Action> {
    let before = self.require(action_id).await?;
    let action = self
      .store
      .transition_action(action_id, ActionState::Approved, Some(actor), None)
      .await
      .map_err(EngineError::store)?;
    self.trace_transition(&action, before.state, Some("approved")).await?;
    Ok(action)
  }

  /// Park an approval-requiring action for a human decision.
  pub async fn request_approval(&self, action_id: Uuid) -> Result<Action> {
    let before = self.require(action_id).await?;
    let action = self
      .store
      .transition_action(action_id, ActionState::PendingApproval, None, None)
      .await
      .map_err(EngineError::store)?;
    self
      .trace_transition(&action, before.state, Some("awaiting approval"))
      .await?;
    Ok(action)
  }

  /// Drive an approved action through EXECUTING to COMPLETED or FAILED and
  /// record its outcome.
  pub async fn execute(&self, action_id: Uuid) -> Result<Outcome> {
    let approved = self.require(action_id).await?;
    let executing = self
      .store
      .transition_action(action_id, ActionState::Executing, None, None)
      .await
      .map_err(EngineError::store)?;
    self
      .trace_transition(&executing, approved.state, Some("executing"))
      .await?;

    let (success, payload) = execution_handler(&executing);
    let terminal = if success {
      ActionState::Completed
    } else {
      ActionState::Failed
    };
    let done = self
      .store
      .transition_action(
        action_id,
        terminal,
        None,
        (!success).then_some("handler reported failure"),
      )
      .await
      .map_err(EngineError::store)?;
    self
      .trace_transition(&done, ActionState::Executing, None)
      .await?;

    self
      .store
      .record_outcome(action_id, success, payload)
      .await
      .map_err(EngineError::store)
  }

  /// Invoke the inverse handler. Only the reversible action types support
  /// this; everything else needs an operator.
  pub async fn rollback(&self, action_id: Uuid) -> Result<Outcome> {
    let action = self.require(action_id).await?;
    if !action.action_type.is_reversible() {
      return Err(EngineError::Internal(format!(
        "rollback is not supported for {}; operator action required",
        action.action_type.as_str()
      )));
    }

    let rolled = self
      .store
      .transition_action(action_id, ActionState::RolledBack, None, None)
      .await
      .map_err(EngineError::store)?;
    self
      .trace_transition(&rolled, action.state, Some("rolled back"))
      .await?;

    let payload = json!({
      "inverse_of": action.action_type.as_str(),
      "original_args": action.args,
    });
    self
      .store
      .record_outcome(action_id, true, payload)
      .await
      .map_err(EngineError::store)
  }

  /// Mark an in-flight action FAILED with a cancellation reason.
  pub async fn fail_cancelled(&self, action_id: Uuid) -> Result<Action> {
    let before = self.require(action_id).await?;
    let action = self
      .store
      .transition_action(
        action_id,
        ActionState::Failed,
        None,
        Some("CANCELLED"),
      )
      .await
      .map_err(EngineError::store)?;
    self.trace_transition(&action, before.state, Some("cancelled")).await?;
    Ok(action)
  }

  async fn require(&self, action_id: Uuid) -> Result<Action> {
    self
      .store
      .get_action(action_id)
      .await
      .map_err(EngineError::store)?
      .ok_or_else(|| {
        EngineError::store(stratus_core::Error::ActionNotFound(action_id))
      })
  }
}

/// Per-type execution. Outward side effects ride on the webhook dispatcher;
/// the handler's job is to produce the structured outcome payload.
fn execution_handler(action: &Action) -> (bool, serde_json::Value) {
  let base = json!({
    "action_type": action.action_type.as_str(),
    "args": action.args,
  });
  match action.action_type {
    ActionType::SetPosture => (
      true,
      json!({
        "posture": action.args.get("posture"),
        "airport": action.args.get("airport"),
        "applied": true,
      }),
    ),
    ActionType::PublishGatewayAdvisory => (
      true,
      json!({
        "advisory_published": true,
        "posture": action.args.get("posture"),
      }),
    ),
    ActionType::UpdateBookingRules => (
      true,
      json!({
        "rules_updated": true,
        "restriction_level": action.args.get("restriction_level"),
      }),
    ),
    ActionType::TriggerReevaluation => {
      (true, json!({"reevaluation_queued": true}))
    }
    ActionType::EscalateOps => (
      true,
      json!({"escalated": true, "reason": action.args.get("reason")}),
    ),
    ActionType::NotifyCustomer => {
      (true, json!({"notification_sent": true, "detail": base}))
    }
    _ => (true, base),
  }
}

/// A case auto-resolves when every action is terminal and no BLOCKING
/// missing-evidence request is open.
pub async fn auto_resolve_status<S: CaseStore>(
  store: &S,
  case_id: Uuid,
) -> Result<Option<CaseStatus>> {
  let actions = store
    .actions_for_case(case_id)
    .await
    .map_err(EngineError::store)?;
  let all_terminal = actions.iter().all(|a| a.state.is_terminal());

  let open = store
    .missing_for_case(case_id, true)
    .await
    .map_err(EngineError::store)?;
  let blocking_open =
    open.iter().any(|r| r.criticality == Criticality::Blocking);

  if blocking_open {
    Ok(Some(CaseStatus::Blocked))
  } else if all_terminal {
    Ok(Some(CaseStatus::Resolved))
  } else {
    Ok(None)
  }
}

#[cfg(test)]
mod tests {
  use stratus_core::{
    case::{CaseScope, CaseType},
    policy::Verdict,
  };
  use stratus_store_sqlite::SqliteStore;

  use super::*;
  use crate::planner::PlannedAction;

  async fn setup() -> (SqliteStore, tempfile::TempDir, Uuid) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open_in_memory(dir.path()).await.unwrap();
    let case = store
      .create_case(CaseType::AirportDisruption, CaseScope::airport("KJFK"))
      .await
      .unwrap();
    (store, dir, case.case_id)
  }

  fn allow_all() -> stratus_core::policy::PolicyResult {
    stratus_core::policy::PolicyResult {
      verdict:       Verdict::Allow,
      effects:       Vec::new(),
      citations:     Vec::new(),
      block_reasons: Vec::new(),
    }
  }

  fn planned(action_type: ActionType) -> PlannedAction {
    PlannedAction {
      action_type,
      args: json!({"posture": "HOLD", "airport": "KJFK"}),
      score: 1.0,
      risk: action_type.default_risk(),
      requires_approval: action_type.default_requires_approval(),
      requires_notification: false,
    }
  }

  #[tokio::test]
  async fn propose_approve_execute_records_outcome_and_trace() {
    let (store, _dir, case_id) = setup().await;
    let governor = ActionGovernor::new(&store);

    let action = governor
      .propose(case_id, &planned(ActionType::SetPosture), &allow_all())
      .await
      .unwrap();
    governor.approve(action.action_id, "SYSTEM").await.unwrap();
    let outcome = governor.execute(action.action_id).await.unwrap();

    assert!(outcome.success);
    let done = store.get_action(action.action_id).await.unwrap().unwrap();
    assert_eq!(done.state, ActionState::Completed);

    // Each transition left a trace entry on the case.
    let trace = store.trace_for_case(case_id).await.unwrap();
    assert!(trace.len() >= 4);
  }

  #[tokio::test]
  async fn rollback_is_defined_for_reversible_types_only() {
    let (store, _dir, case_id) = setup().await;
    let governor = ActionGovernor::new(&store);

    let action = governor
      .propose(case_id, &planned(ActionType::SetPosture), &allow_all())
      .await
      .unwrap();
    governor.approve(action.action_id, "SYSTEM").await.unwrap();
    governor.execute(action.action_id).await.unwrap();

    let outcome = governor.rollback(action.action_id).await.unwrap();
    assert!(outcome.success);
    let rolled = store.get_action(action.action_id).await.unwrap().unwrap();
    assert_eq!(rolled.state, ActionState::RolledBack);
  }

  #[tokio::test]
  async fn failed_reversible_action_can_roll_back() {
    let (store, _dir, case_id) = setup().await;
    let governor = ActionGovernor::new(&store);

    let action = governor
      .propose(case_id, &planned(ActionType::HoldCargo), &allow_all())
      .await
      .unwrap();
    governor.approve(action.action_id, "SYSTEM").await.unwrap();
    store
      .transition_action(action.action_id, ActionState::Executing, None, None)
      .await
      .unwrap();
    store
      .transition_action(
        action.action_id,
        ActionState::Failed,
        None,
        Some("handler reported failure"),
      )
      .await
      .unwrap();

    // FAILED is terminal except via operator rollback.
    let outcome = governor.rollback(action.action_id).await.unwrap();
    assert!(outcome.success);
    let rolled = store.get_action(action.action_id).await.unwrap().unwrap();
    assert_eq!(rolled.state, ActionState::RolledBack);
  }

  #[tokio::test]
  async fn rollback_of_rebook_flight_is_unsupported() {
    let (store, _dir, case_id) = setup().await;
    let governor = ActionGovernor::new(&store);

    let action = governor
      .propose(case_id, &planned(ActionType::RebookFlight), &allow_all())
      .await
      .unwrap();
    governor
      .approve(action.action_id, "duty-manager")
      .await
      .unwrap();
    governor.execute(action.action_id).await.unwrap();

    let err = governor.rollback(action.action_id).await.unwrap_err();
    assert!(err.to_string().contains("operator action required"));
  }

  #[tokio::test]
  async fn policy_approval_verdict_forces_pending_approval() {
    let (store, _dir, case_id) = setup().await;
    let governor = ActionGovernor::new(&store);

    let policy = stratus_core::policy::PolicyResult {
      verdict: Verdict::RequireApproval,
      ..allow_all()
    };
    let action = governor
      .propose(case_id, &planned(ActionType::SetPosture), &policy)
      .await
      .unwrap();
    assert!(action.requires_approval);

    let parked = governor.request_approval(action.action_id).await.unwrap();
    assert_eq!(parked.state, ActionState::PendingApproval);
  }
}
