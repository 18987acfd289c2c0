//! Engine error taxonomy.
//!
//! Retries with jittered backoff are local to outbound I/O; everything else
//! propagates to the orchestrator, which is the single point that decides
//! RESOLVED / BLOCKED / FAILED for a case.

use thiserror::Error;
use uuid::Uuid;

use stratus_core::signal::{AssessorError, SourceError};

#[derive(Debug, Error)]
pub enum EngineError {
  /// A signal source failed; converted to a missing-evidence request with
  /// criticality per the source table.
  #[error(transparent)]
  Source(#[from] SourceError),

  /// The risk assessor failed; handled by the HIGH-risk fallback path.
  #[error(transparent)]
  Assessor(#[from] AssessorError),

  #[error("case not found: {0}")]
  CaseNotFound(Uuid),

  /// A webhook URL failed the private-address guard.
  #[error("webhook url rejected: {0}")]
  WebhookRejected(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// Unexpected failure; the case is marked FAILED and no packet is emitted.
  #[error("internal error: {0}")]
  Internal(String),
}

impl EngineError {
  pub fn store<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
