//! Actions and the governance state machine vocabulary.
//!
//! The action type set is closed. Each type carries fixed properties (risk,
//! approval, reversibility); the legal state transitions are a fixed table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Risk ────────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
  Low,
  Medium,
  High,
  Critical,
}

impl RiskLevel {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Low => "LOW",
      Self::Medium => "MEDIUM",
      Self::High => "HIGH",
      Self::Critical => "CRITICAL",
    }
  }
}

// ─── Action types ────────────────────────────────────────────────────────────

/// The closed set of things a case may do.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
  // ── Shipment-level (require booking evidence) ───────────────────────────
  HoldCargo,
  ReleaseCargo,
  SwitchGateway,
  RebookFlight,
  UpgradeService,
  NotifyCustomer,
  FileClaim,

  // ── Posture-level ────────────────────────────────────────────────────────
  SetPosture,

  // ── Operational (system-to-system) ───────────────────────────────────────
  PublishGatewayAdvisory,
  UpdateBookingRules,
  TriggerReevaluation,
  EscalateOps,
}

impl ActionType {
  pub const ALL: [ActionType; 12] = [
    Self::HoldCargo,
    Self::ReleaseCargo,
    Self::SwitchGateway,
    Self::RebookFlight,
    Self::UpgradeService,
    Self::NotifyCustomer,
    Self::FileClaim,
    Self::SetPosture,
    Self::PublishGatewayAdvisory,
    Self::UpdateBookingRules,
    Self::TriggerReevaluation,
    Self::EscalateOps,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::HoldCargo => "HOLD_CARGO",
      Self::ReleaseCargo => "RELEASE_CARGO",
      Self::SwitchGateway => "SWITCH_GATEWAY",
      Self::RebookFlight => "REBOOK_FLIGHT",
      Self::UpgradeService => "UPGRADE_SERVICE",
      Self::NotifyCustomer => "NOTIFY_CUSTOMER",
      Self::FileClaim => "FILE_CLAIM",
      Self::SetPosture => "SET_POSTURE",
      Self::PublishGatewayAdvisory => "PUBLISH_GATEWAY_ADVISORY",
      Self::UpdateBookingRules => "UPDATE_BOOKING_RULES",
      Self::TriggerReevaluation => "TRIGGER_REEVALUATION",
      Self::EscalateOps => "ESCALATE_OPS",
    }
  }

  /// Shipment-level actions require booking evidence before execution.
  pub fn is_shipment_level(&self) -> bool {
    matches!(
      self,
      Self::HoldCargo
        | Self::ReleaseCargo
        | Self::SwitchGateway
        | Self::RebookFlight
        | Self::UpgradeService
        | Self::NotifyCustomer
        | Self::FileClaim
    )
  }

  pub fn default_risk(&self) -> RiskLevel {
    match self {
      Self::SwitchGateway | Self::RebookFlight | Self::FileClaim => {
        RiskLevel::High
      }
      Self::HoldCargo
      | Self::UpgradeService
      | Self::NotifyCustomer
      | Self::UpdateBookingRules => RiskLevel::Medium,
      _ => RiskLevel::Low,
    }
  }

  /// Whether this type needs human sign-off regardless of the policy
  /// verdict. HIGH-risk types always do.
  pub fn default_requires_approval(&self) -> bool {
    self.default_risk() >= RiskLevel::High || matches!(self, Self::UpgradeService)
  }

  /// Rollback is only defined for these types; everything else needs an
  /// operator.
  pub fn is_reversible(&self) -> bool {
    matches!(
      self,
      Self::SetPosture
        | Self::PublishGatewayAdvisory
        | Self::UpdateBookingRules
        | Self::TriggerReevaluation
        | Self::HoldCargo
    )
  }

  pub fn requires_notification(&self) -> bool {
    matches!(
      self,
      Self::HoldCargo
        | Self::SwitchGateway
        | Self::RebookFlight
        | Self::UpgradeService
        | Self::NotifyCustomer
        | Self::FileClaim
        | Self::EscalateOps
    )
  }
}

// ─── Action state machine ────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionState {
  Proposed,
  PendingApproval,
  Approved,
  Executing,
  Completed,
  Failed,
  RolledBack,
}

impl ActionState {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Proposed => "PROPOSED",
      Self::PendingApproval => "PENDING_APPROVAL",
      Self::Approved => "APPROVED",
      Self::Executing => "EXECUTING",
      Self::Completed => "COMPLETED",
      Self::Failed => "FAILED",
      Self::RolledBack => "ROLLED_BACK",
    }
  }

  /// Terminal states end the action's life (ROLLED_BACK via operator aside).
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Completed | Self::Failed | Self::RolledBack)
  }

  /// The fixed legal-transition table. FAILED is terminal except via
  /// operator rollback.
  pub fn can_transition_to(self, to: ActionState) -> bool {
    use ActionState::*;
    matches!(
      (self, to),
      (Proposed, PendingApproval)
        | (Proposed, Approved)
        | (PendingApproval, Approved)
        | (PendingApproval, Failed)
        | (Approved, Executing)
        | (Executing, Completed)
        | (Executing, Failed)
        | (Completed, RolledBack)
        | (Failed, RolledBack)
    )
  }
}

// ─── Action rows ─────────────────────────────────────────────────────────────

/// A governed action bound to a case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
  pub action_id:         Uuid,
  pub case_id:           Uuid,
  pub action_type:       ActionType,
  pub args:              serde_json::Value,
  pub risk:              RiskLevel,
  pub requires_approval: bool,
  pub state:             ActionState,
  pub approved_by:       Option<String>,
  pub approved_at:       Option<DateTime<Utc>>,
  pub failure_reason:    Option<String>,
  pub created_at:        DateTime<Utc>,
}

/// Input to [`crate::store::CaseStore::insert_action`]. The store rejects
/// HIGH risk without `requires_approval`.
#[derive(Debug, Clone)]
pub struct NewAction {
  pub case_id:           Uuid,
  pub action_type:       ActionType,
  pub args:              serde_json::Value,
  pub risk:              RiskLevel,
  pub requires_approval: bool,
}

impl NewAction {
  pub fn new(
    case_id: Uuid,
    action_type: ActionType,
    args: serde_json::Value,
  ) -> Self {
    Self {
      case_id,
      action_type,
      args,
      risk: action_type.default_risk(),
      requires_approval: action_type.default_requires_approval(),
    }
  }
}

/// Result of executing an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
  pub outcome_id:  Uuid,
  pub action_id:   Uuid,
  pub success:     bool,
  pub payload:     serde_json::Value,
  pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn high_risk_types_default_to_approval() {
    for ty in ActionType::ALL {
      if ty.default_risk() >= RiskLevel::High {
        assert!(ty.default_requires_approval(), "{ty:?}");
      }
    }
  }

  #[test]
  fn transition_table_rejects_skipping_execution() {
    assert!(!ActionState::Proposed.can_transition_to(ActionState::Completed));
    assert!(!ActionState::Approved.can_transition_to(ActionState::Completed));
    assert!(!ActionState::Failed.can_transition_to(ActionState::Executing));
  }

  #[test]
  fn completed_can_roll_back_but_not_resume() {
    assert!(ActionState::Completed.can_transition_to(ActionState::RolledBack));
    assert!(
      !ActionState::RolledBack.can_transition_to(ActionState::Executing)
    );
  }

  #[test]
  fn failed_is_terminal_except_via_rollback() {
    assert!(ActionState::Failed.can_transition_to(ActionState::RolledBack));
    assert!(!ActionState::Failed.can_transition_to(ActionState::Executing));
    assert!(!ActionState::Failed.can_transition_to(ActionState::Approved));
  }
}
