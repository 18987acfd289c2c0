//! Error types for `stratus-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::action::ActionState;

/// A hard rule enforced at the store layer. Callers must never catch one of
/// these and continue; the offending row id is carried for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
  /// A claim or edge was promoted to (or inserted at) FACT with no bound
  /// evidence row.
  #[error("{row_kind} {id} cannot hold status FACT without bound evidence")]
  EvidenceBindingRequired { row_kind: &'static str, id: Uuid },

  /// An attempt was made to mutate a node row in place.
  #[error("node {0} is immutable; record a new version instead")]
  NodeImmutable(Uuid),

  /// A HIGH-risk action was proposed without the approval requirement.
  #[error("action {0} is HIGH risk and must require approval")]
  ApprovalRequired(Uuid),

  /// An action that requires approval was moved to EXECUTING before any
  /// approval was recorded.
  #[error("action {0} may not execute before approval")]
  UnapprovedExecution(Uuid),
}

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Invariant(#[from] InvariantViolation),

  #[error("node not found: {0}")]
  NodeNotFound(Uuid),

  #[error("edge not found: {0}")]
  EdgeNotFound(Uuid),

  #[error("claim not found: {0}")]
  ClaimNotFound(Uuid),

  #[error("evidence not found: {0}")]
  EvidenceNotFound(Uuid),

  #[error("case not found: {0}")]
  CaseNotFound(Uuid),

  #[error("action not found: {0}")]
  ActionNotFound(Uuid),

  #[error("illegal action transition {from:?} -> {to:?} for {action}")]
  IllegalTransition {
    action: Uuid,
    from:   ActionState,
    to:     ActionState,
  },

  #[error("row {0} is already superseded")]
  AlreadySuperseded(Uuid),

  #[error("case {0} is already resolved")]
  CaseClosed(Uuid),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
