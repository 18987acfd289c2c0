//! Evidence records — the immutable, content-addressed ground truth.
//!
//! Every derived fact in the graph cites one or more of these rows. Rows and
//! the raw bytes behind them are never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An ingested payload. Identity is `(source_system, source_ref,
/// content_sha256)`; re-ingesting identical bytes returns the existing row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRecord {
  pub evidence_id:      Uuid,
  /// Originating system, e.g. `FAA_NAS`, `AVIATION_WEATHER`, `BOOKING`.
  pub source_system:    String,
  /// Source-local reference, e.g. the ICAO code or a request URL.
  pub source_ref:       String,
  /// Lowercase hex SHA-256 over the raw payload bytes.
  pub content_sha256:   String,
  pub content_type:     String,
  pub retrieved_at:     DateTime<Utc>,
  /// Best-effort window in which the payload is true in the world; falls
  /// back to the retrieval time when the source carries no event time.
  pub event_time_start: Option<DateTime<Utc>>,
  pub event_time_end:   Option<DateTime<Utc>>,
  /// PII-stripped preview of the payload, at most 500 characters.
  pub excerpt:          String,
  pub meta:             serde_json::Value,
}

/// Input to [`crate::store::EvidenceStore::put_evidence`]. The hash, excerpt,
/// and retrieval timestamp are computed by the store.
#[derive(Debug, Clone)]
pub struct NewEvidence {
  pub source_system:    String,
  pub source_ref:       String,
  pub content_type:     String,
  pub payload:          Vec<u8>,
  pub event_time_start: Option<DateTime<Utc>>,
  pub event_time_end:   Option<DateTime<Utc>>,
  pub meta:             serde_json::Value,
}

impl NewEvidence {
  pub fn new(
    source_system: impl Into<String>,
    source_ref: impl Into<String>,
    content_type: impl Into<String>,
    payload: Vec<u8>,
  ) -> Self {
    Self {
      source_system: source_system.into(),
      source_ref: source_ref.into(),
      content_type: content_type.into(),
      payload,
      event_time_start: None,
      event_time_end: None,
      meta: serde_json::Value::Null,
    }
  }
}
