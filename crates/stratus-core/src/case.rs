//! Cases, postures, trace events, and missing-evidence requests.
//!
//! A case is the unit of work: one disruption investigation for one scope.
//! Everything a case does is recorded as an ordered trace; everything it
//! could not learn is recorded as a missing-evidence request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Posture ─────────────────────────────────────────────────────────────────

/// The gateway directive a case emits. The primary output of the system.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Posture {
  /// Accept new bookings.
  Accept,
  /// Restrict specific service tiers / SLAs.
  Restrict,
  /// Hold tendering until evidence clears.
  Hold,
  /// Escalate to the duty manager.
  Escalate,
}

impl Posture {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Accept => "ACCEPT",
      Self::Restrict => "RESTRICT",
      Self::Hold => "HOLD",
      Self::Escalate => "ESCALATE",
    }
  }
}

// ─── Case ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseType {
  AirportDisruption,
  LaneDisruption,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
  Open,
  Blocked,
  Resolved,
}

/// What a case is about: an airport gateway or an origin/destination lane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseScope {
  /// ICAO code, e.g. `KJFK`.
  pub airport: Option<String>,
  /// Lane identifier, e.g. `KJFK-EDDF`.
  pub lane:    Option<String>,
}

impl CaseScope {
  pub fn airport(icao: impl Into<String>) -> Self {
    Self { airport: Some(icao.into()), lane: None }
  }
}

/// A disruption investigation. Append-only once RESOLVED.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
  pub case_id:     Uuid,
  pub case_type:   CaseType,
  pub scope:       CaseScope,
  pub status:      CaseStatus,
  pub created_at:  DateTime<Utc>,
  pub resolved_at: Option<DateTime<Utc>>,
}

// ─── Missing evidence ────────────────────────────────────────────────────────

/// How badly a failed fetch hurts the decision.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Criticality {
  /// The case cannot decide without this; forces status BLOCKED.
  Blocking,
  /// The case may decide, with a confidence penalty.
  Degraded,
  /// Nice to have; no effect on case resolution.
  Informational,
}

/// First-class record of what could not be fetched, why, and how much that
/// matters. A BLOCKING request with no resolution prevents case auto-resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingEvidenceRequest {
  pub request_id:           Uuid,
  pub case_id:              Uuid,
  pub source_system:        String,
  pub request_type:         String,
  pub params:               serde_json::Value,
  pub reason:               String,
  pub criticality:          Criticality,
  pub created_at:           DateTime<Utc>,
  pub resolved_by_evidence: Option<Uuid>,
}

impl MissingEvidenceRequest {
  pub fn is_open(&self) -> bool { self.resolved_by_evidence.is_none() }
}

// ─── Trace events ────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceEventKind {
  StateEnter,
  StateExit,
  ToolCall,
  ToolResult,
  Handoff,
  GuardrailFail,
  Blocked,
}

/// One entry in a case's ordered trace. `seq` is strictly increasing within
/// a case and assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
  pub trace_id:   Uuid,
  pub case_id:    Uuid,
  pub seq:        i64,
  pub kind:       TraceEventKind,
  /// What `ref_id` points at: "action", "evidence", "claim", ...
  pub ref_type:   Option<String>,
  pub ref_id:     Option<Uuid>,
  pub meta:       serde_json::Value,
  pub created_at: DateTime<Utc>,
}

/// Input to [`crate::store::CaseStore::record_trace`]; `seq` and timestamps
/// are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewTraceEvent {
  pub case_id:  Uuid,
  pub kind:     TraceEventKind,
  pub ref_type: Option<String>,
  pub ref_id:   Option<Uuid>,
  pub meta:     serde_json::Value,
}

impl NewTraceEvent {
  pub fn new(
    case_id: Uuid,
    kind: TraceEventKind,
    meta: serde_json::Value,
  ) -> Self {
    Self { case_id, kind, ref_type: None, ref_id: None, meta }
  }

  pub fn with_ref(
    mut self,
    ref_type: impl Into<String>,
    ref_id: Uuid,
  ) -> Self {
    self.ref_type = Some(ref_type.into());
    self.ref_id = Some(ref_id);
    self
  }
}
