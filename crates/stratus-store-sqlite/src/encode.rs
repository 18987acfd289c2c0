//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 UTC strings. Structured fields are
//! stored as compact JSON. UUIDs are stored as hyphenated lowercase strings.
//! Enum columns use the same SCREAMING_SNAKE_CASE tags as the wire format.

use chrono::{DateTime, Utc};
use stratus_core::{
  action::{Action, ActionState, ActionType, Outcome, RiskLevel},
  case::{
    Case, CaseScope, CaseStatus, CaseType, Criticality,
    MissingEvidenceRequest, TraceEvent, TraceEventKind,
  },
  evidence::EvidenceRecord,
  graph::{
    Claim, ClaimStatus, Contradiction, ContradictionStatus, Edge, EdgeStatus,
    Node, NodeVersion,
  },
  playbook::{Playbook, PlaybookDomain, PlaybookStats},
  policy::Policy,
  webhook::{WebhookEndpoint, WebhookEventType},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<&str>) -> Result<Option<Uuid>> {
  s.map(decode_uuid).transpose()
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn encode_opt_dt(dt: Option<DateTime<Utc>>) -> Option<String> {
  dt.map(encode_dt)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

// ─── JSON ────────────────────────────────────────────────────────────────────

pub fn encode_json(v: &serde_json::Value) -> String { v.to_string() }

pub fn decode_json(s: &str) -> Result<serde_json::Value> {
  Ok(serde_json::from_str(s)?)
}

// ─── Status enums ────────────────────────────────────────────────────────────

pub fn encode_edge_status(s: EdgeStatus) -> &'static str {
  match s {
    EdgeStatus::Draft => "DRAFT",
    EdgeStatus::Fact => "FACT",
    EdgeStatus::Retracted => "RETRACTED",
  }
}

pub fn decode_edge_status(s: &str) -> Result<EdgeStatus> {
  match s {
    "DRAFT" => Ok(EdgeStatus::Draft),
    "FACT" => Ok(EdgeStatus::Fact),
    "RETRACTED" => Ok(EdgeStatus::Retracted),
    other => Err(Error::UnknownEnum(other.to_owned())),
  }
}

pub fn encode_claim_status(s: ClaimStatus) -> &'static str {
  match s {
    ClaimStatus::Draft => "DRAFT",
    ClaimStatus::Hypothesis => "HYPOTHESIS",
    ClaimStatus::Fact => "FACT",
    ClaimStatus::Retracted => "RETRACTED",
  }
}

pub fn decode_claim_status(s: &str) -> Result<ClaimStatus> {
  match s {
    "DRAFT" => Ok(ClaimStatus::Draft),
    "HYPOTHESIS" => Ok(ClaimStatus::Hypothesis),
    "FACT" => Ok(ClaimStatus::Fact),
    "RETRACTED" => Ok(ClaimStatus::Retracted),
    other => Err(Error::UnknownEnum(other.to_owned())),
  }
}

pub fn encode_contradiction_status(s: ContradictionStatus) -> &'static str {
  match s {
    ContradictionStatus::Open => "OPEN",
    ContradictionStatus::Resolved => "RESOLVED",
    ContradictionStatus::Ignored => "IGNORED",
  }
}

pub fn decode_contradiction_status(s: &str) -> Result<ContradictionStatus> {
  match s {
    "OPEN" => Ok(ContradictionStatus::Open),
    "RESOLVED" => Ok(ContradictionStatus::Resolved),
    "IGNORED" => Ok(ContradictionStatus::Ignored),
    other => Err(Error::UnknownEnum(other.to_owned())),
  }
}

pub fn encode_case_type(t: CaseType) -> &'static str {
  match t {
    CaseType::AirportDisruption => "AIRPORT_DISRUPTION",
    CaseType::LaneDisruption => "LANE_DISRUPTION",
  }
}

pub fn decode_case_type(s: &str) -> Result<CaseType> {
  match s {
    "AIRPORT_DISRUPTION" => Ok(CaseType::AirportDisruption),
    "LANE_DISRUPTION" => Ok(CaseType::LaneDisruption),
    other => Err(Error::UnknownEnum(other.to_owned())),
  }
}

pub fn encode_case_status(s: CaseStatus) -> &'static str {
  match s {
    CaseStatus::Open => "OPEN",
    CaseStatus::Blocked => "BLOCKED",
    CaseStatus::Resolved => "RESOLVED",
  }
}

pub fn decode_case_status(s: &str) -> Result<CaseStatus> {
  match s {
    "OPEN" => Ok(CaseStatus::Open),
    "BLOCKED" => Ok(CaseStatus::Blocked),
    "RESOLVED" => Ok(CaseStatus::Resolved),
    other => Err(Error::UnknownEnum(other.to_owned())),
  }
}

pub fn encode_criticality(c: Criticality) -> &'static str {
  match c {
    Criticality::Blocking => "BLOCKING",
    Criticality::Degraded => "DEGRADED",
    Criticality::Informational => "INFORMATIONAL",
  }
}

pub fn decode_criticality(s: &str) -> Result<Criticality> {
  match s {
    "BLOCKING" => Ok(Criticality::Blocking),
    "DEGRADED" => Ok(Criticality::Degraded),
    "INFORMATIONAL" => Ok(Criticality::Informational),
    other => Err(Error::UnknownEnum(other.to_owned())),
  }
}

pub fn encode_trace_kind(k: TraceEventKind) -> &'static str {
  match k {
    TraceEventKind::StateEnter => "STATE_ENTER",
    TraceEventKind::StateExit => "STATE_EXIT",
    TraceEventKind::ToolCall => "TOOL_CALL",
    TraceEventKind::ToolResult => "TOOL_RESULT",
    TraceEventKind::Handoff => "HANDOFF",
    TraceEventKind::GuardrailFail => "GUARDRAIL_FAIL",
    TraceEventKind::Blocked => "BLOCKED",
  }
}

pub fn decode_trace_kind(s: &str) -> Result<TraceEventKind> {
  match s {
    "STATE_ENTER" => Ok(TraceEventKind::StateEnter),
    "STATE_EXIT" => Ok(TraceEventKind::StateExit),
    "TOOL_CALL" => Ok(TraceEventKind::ToolCall),
    "TOOL_RESULT" => Ok(TraceEventKind::ToolResult),
    "HANDOFF" => Ok(TraceEventKind::Handoff),
    "GUARDRAIL_FAIL" => Ok(TraceEventKind::GuardrailFail),
    "BLOCKED" => Ok(TraceEventKind::Blocked),
    other => Err(Error::UnknownEnum(other.to_owned())),
  }
}

pub fn decode_action_type(s: &str) -> Result<ActionType> {
  ActionType::ALL
    .into_iter()
    .find(|t| t.as_str() == s)
    .ok_or_else(|| Error::UnknownEnum(s.to_owned()))
}

pub fn decode_action_state(s: &str) -> Result<ActionState> {
  match s {
    "PROPOSED" => Ok(ActionState::Proposed),
    "PENDING_APPROVAL" => Ok(ActionState::PendingApproval),
    "APPROVED" => Ok(ActionState::Approved),
    "EXECUTING" => Ok(ActionState::Executing),
    "COMPLETED" => Ok(ActionState::Completed),
    "FAILED" => Ok(ActionState::Failed),
    "ROLLED_BACK" => Ok(ActionState::RolledBack),
    other => Err(Error::UnknownEnum(other.to_owned())),
  }
}

pub fn decode_risk(s: &str) -> Result<RiskLevel> {
  match s {
    "LOW" => Ok(RiskLevel::Low),
    "MEDIUM" => Ok(RiskLevel::Medium),
    "HIGH" => Ok(RiskLevel::High),
    "CRITICAL" => Ok(RiskLevel::Critical),
    other => Err(Error::UnknownEnum(other.to_owned())),
  }
}

pub fn decode_domain(s: &str) -> Result<PlaybookDomain> {
  match s {
    "weather" => Ok(PlaybookDomain::Weather),
    "operational" => Ok(PlaybookDomain::Operational),
    "customs" => Ok(PlaybookDomain::Customs),
    other => Err(Error::UnknownEnum(other.to_owned())),
  }
}

pub fn decode_webhook_event(s: &str) -> Result<WebhookEventType> {
  match s {
    "POSTURE_CHANGE" => Ok(WebhookEventType::PostureChange),
    "ACTION_EXECUTED" => Ok(WebhookEventType::ActionExecuted),
    "CASE_RESOLVED" => Ok(WebhookEventType::CaseResolved),
    "SLA_BREACH_IMMINENT" => Ok(WebhookEventType::SlaBreachImminent),
    other => Err(Error::UnknownEnum(other.to_owned())),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `evidence` row.
pub struct RawEvidence {
  pub evidence_id:      String,
  pub source_system:    String,
  pub source_ref:       String,
  pub content_sha256:   String,
  pub content_type:     String,
  pub retrieved_at:     String,
  pub event_time_start: Option<String>,
  pub event_time_end:   Option<String>,
  pub excerpt:          String,
  pub meta:             String,
}

impl RawEvidence {
  pub fn into_record(self) -> Result<EvidenceRecord> {
    Ok(EvidenceRecord {
      evidence_id:      decode_uuid(&self.evidence_id)?,
      source_system:    self.source_system,
      source_ref:       self.source_ref,
      content_sha256:   self.content_sha256,
      content_type:     self.content_type,
      retrieved_at:     decode_dt(&self.retrieved_at)?,
      event_time_start: decode_opt_dt(self.event_time_start.as_deref())?,
      event_time_end:   decode_opt_dt(self.event_time_end.as_deref())?,
      excerpt:          self.excerpt,
      meta:             decode_json(&self.meta)?,
    })
  }
}

pub struct RawNode {
  pub node_id:    String,
  pub node_type:  String,
  pub identifier: String,
  pub created_at: String,
}

impl RawNode {
  pub fn into_node(self) -> Result<Node> {
    Ok(Node {
      node_id:    decode_uuid(&self.node_id)?,
      node_type:  self.node_type,
      identifier: self.identifier,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawNodeVersion {
  pub version_id: String,
  pub node_id:    String,
  pub attrs:      String,
  pub valid_from: String,
  pub valid_to:   Option<String>,
  pub supersedes: Option<String>,
  pub created_at: String,
}

impl RawNodeVersion {
  pub fn into_version(self) -> Result<NodeVersion> {
    Ok(NodeVersion {
      version_id: decode_uuid(&self.version_id)?,
      node_id:    decode_uuid(&self.node_id)?,
      attrs:      decode_json(&self.attrs)?,
      valid_from: decode_dt(&self.valid_from)?,
      valid_to:   decode_opt_dt(self.valid_to.as_deref())?,
      supersedes: decode_opt_uuid(self.supersedes.as_deref())?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawEdge {
  pub edge_id:          String,
  pub src:              String,
  pub dst:              String,
  pub edge_type:        String,
  pub attrs:            String,
  pub status:           String,
  pub supersedes:       Option<String>,
  pub event_time_start: Option<String>,
  pub event_time_end:   Option<String>,
  pub ingested_at:      String,
  pub valid_from:       Option<String>,
  pub valid_to:         Option<String>,
  pub source_system:    String,
  pub confidence:       f64,
}

impl RawEdge {
  pub const COLUMNS: &'static str = "edge_id, src, dst, edge_type, attrs, \
     status, supersedes, event_time_start, event_time_end, ingested_at, \
     valid_from, valid_to, source_system, confidence";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      edge_id:          row.get(0)?,
      src:              row.get(1)?,
      dst:              row.get(2)?,
      edge_type:        row.get(3)?,
      attrs:            row.get(4)?,
      status:           row.get(5)?,
      supersedes:       row.get(6)?,
      event_time_start: row.get(7)?,
      event_time_end:   row.get(8)?,
      ingested_at:      row.get(9)?,
      valid_from:       row.get(10)?,
      valid_to:         row.get(11)?,
      source_system:    row.get(12)?,
      confidence:       row.get(13)?,
    })
  }

  pub fn into_edge(self) -> Result<Edge> {
    Ok(Edge {
      edge_id:          decode_uuid(&self.edge_id)?,
      src:              decode_uuid(&self.src)?,
      dst:              decode_uuid(&self.dst)?,
      edge_type:        self.edge_type,
      attrs:            decode_json(&self.attrs)?,
      status:           decode_edge_status(&self.status)?,
      supersedes:       decode_opt_uuid(self.supersedes.as_deref())?,
      event_time_start: decode_opt_dt(self.event_time_start.as_deref())?,
      event_time_end:   decode_opt_dt(self.event_time_end.as_deref())?,
      ingested_at:      decode_dt(&self.ingested_at)?,
      valid_from:       decode_opt_dt(self.valid_from.as_deref())?,
      valid_to:         decode_opt_dt(self.valid_to.as_deref())?,
      source_system:    self.source_system,
      confidence:       self.confidence,
    })
  }
}

pub struct RawClaim {
  pub claim_id:         String,
  pub subject_node_id:  String,
  pub text:             String,
  pub status:           String,
  pub confidence:       f64,
  pub supersedes:       Option<String>,
  pub event_time_start: Option<String>,
  pub event_time_end:   Option<String>,
  pub ingested_at:      String,
}

impl RawClaim {
  pub const COLUMNS: &'static str = "claim_id, subject_node_id, text, \
     status, confidence, supersedes, event_time_start, event_time_end, \
     ingested_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      claim_id:         row.get(0)?,
      subject_node_id:  row.get(1)?,
      text:             row.get(2)?,
      status:           row.get(3)?,
      confidence:       row.get(4)?,
      supersedes:       row.get(5)?,
      event_time_start: row.get(6)?,
      event_time_end:   row.get(7)?,
      ingested_at:      row.get(8)?,
    })
  }

  pub fn into_claim(self) -> Result<Claim> {
    Ok(Claim {
      claim_id:         decode_uuid(&self.claim_id)?,
      subject_node_id:  decode_uuid(&self.subject_node_id)?,
      text:             self.text,
      status:           decode_claim_status(&self.status)?,
      confidence:       self.confidence,
      supersedes:       decode_opt_uuid(self.supersedes.as_deref())?,
      event_time_start: decode_opt_dt(self.event_time_start.as_deref())?,
      event_time_end:   decode_opt_dt(self.event_time_end.as_deref())?,
      ingested_at:      decode_dt(&self.ingested_at)?,
    })
  }
}

pub struct RawContradiction {
  pub contradiction_id:  String,
  pub left_ref:          String,
  pub right_ref:         String,
  pub kind:              String,
  pub explanation:       String,
  pub detected_at:       String,
  pub status:            String,
  pub resolved_by_claim: Option<String>,
}

impl RawContradiction {
  pub fn into_contradiction(self) -> Result<Contradiction> {
    Ok(Contradiction {
      contradiction_id:  decode_uuid(&self.contradiction_id)?,
      left_ref:          decode_uuid(&self.left_ref)?,
      right_ref:         decode_uuid(&self.right_ref)?,
      kind:              self.kind,
      explanation:       self.explanation,
      detected_at:       decode_dt(&self.detected_at)?,
      status:            decode_contradiction_status(&self.status)?,
      resolved_by_claim: decode_opt_uuid(self.resolved_by_claim.as_deref())?,
    })
  }
}

pub struct RawCase {
  pub case_id:     String,
  pub case_type:   String,
  pub scope:       String,
  pub status:      String,
  pub created_at:  String,
  pub resolved_at: Option<String>,
}

impl RawCase {
  pub fn into_case(self) -> Result<Case> {
    let scope: CaseScope = serde_json::from_str(&self.scope)?;
    Ok(Case {
      case_id:     decode_uuid(&self.case_id)?,
      case_type:   decode_case_type(&self.case_type)?,
      scope,
      status:      decode_case_status(&self.status)?,
      created_at:  decode_dt(&self.created_at)?,
      resolved_at: decode_opt_dt(self.resolved_at.as_deref())?,
    })
  }
}

pub struct RawTrace {
  pub trace_id:   String,
  pub case_id:    String,
  pub seq:        i64,
  pub kind:       String,
  pub ref_type:   Option<String>,
  pub ref_id:     Option<String>,
  pub meta:       String,
  pub created_at: String,
}

impl RawTrace {
  pub fn into_trace(self) -> Result<TraceEvent> {
    Ok(TraceEvent {
      trace_id:   decode_uuid(&self.trace_id)?,
      case_id:    decode_uuid(&self.case_id)?,
      seq:        self.seq,
      kind:       decode_trace_kind(&self.kind)?,
      ref_type:   self.ref_type,
      ref_id:     decode_opt_uuid(self.ref_id.as_deref())?,
      meta:       decode_json(&self.meta)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawAction {
  pub action_id:         String,
  pub case_id:           String,
  pub action_type:       String,
  pub args:              String,
  pub risk:              String,
  pub requires_approval: bool,
  pub state:             String,
  pub approved_by:       Option<String>,
  pub approved_at:       Option<String>,
  pub failure_reason:    Option<String>,
  pub created_at:        String,
}

impl RawAction {
  pub const COLUMNS: &'static str = "action_id, case_id, action_type, args, \
     risk, requires_approval, state, approved_by, approved_at, \
     failure_reason, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      action_id:         row.get(0)?,
      case_id:           row.get(1)?,
      action_type:       row.get(2)?,
      args:              row.get(3)?,
      risk:              row.get(4)?,
      requires_approval: row.get(5)?,
      state:             row.get(6)?,
      approved_by:       row.get(7)?,
      approved_at:       row.get(8)?,
      failure_reason:    row.get(9)?,
      created_at:        row.get(10)?,
    })
  }

  pub fn into_action(self) -> Result<Action> {
    Ok(Action {
      action_id:         decode_uuid(&self.action_id)?,
      case_id:           decode_uuid(&self.case_id)?,
      action_type:       decode_action_type(&self.action_type)?,
      args:              decode_json(&self.args)?,
      risk:              decode_risk(&self.risk)?,
      requires_approval: self.requires_approval,
      state:             decode_action_state(&self.state)?,
      approved_by:       self.approved_by,
      approved_at:       decode_opt_dt(self.approved_at.as_deref())?,
      failure_reason:    self.failure_reason,
      created_at:        decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawOutcome {
  pub outcome_id:  String,
  pub action_id:   String,
  pub success:     bool,
  pub payload:     String,
  pub recorded_at: String,
}

impl RawOutcome {
  pub fn into_outcome(self) -> Result<Outcome> {
    Ok(Outcome {
      outcome_id:  decode_uuid(&self.outcome_id)?,
      action_id:   decode_uuid(&self.action_id)?,
      success:     self.success,
      payload:     decode_json(&self.payload)?,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

pub struct RawMissing {
  pub request_id:           String,
  pub case_id:              String,
  pub source_system:        String,
  pub request_type:         String,
  pub params:               String,
  pub reason:               String,
  pub criticality:          String,
  pub created_at:           String,
  pub resolved_by_evidence: Option<String>,
}

impl RawMissing {
  pub fn into_request(self) -> Result<MissingEvidenceRequest> {
    Ok(MissingEvidenceRequest {
      request_id:           decode_uuid(&self.request_id)?,
      case_id:              decode_uuid(&self.case_id)?,
      source_system:        self.source_system,
      request_type:         self.request_type,
      params:               decode_json(&self.params)?,
      reason:               self.reason,
      criticality:          decode_criticality(&self.criticality)?,
      created_at:           decode_dt(&self.created_at)?,
      resolved_by_evidence: decode_opt_uuid(
        self.resolved_by_evidence.as_deref(),
      )?,
    })
  }
}

pub struct RawPolicy {
  pub policy_id:      String,
  pub policy_type:    String,
  pub text:           String,
  pub conditions:     String,
  pub effects:        String,
  pub effective_from: String,
  pub effective_to:   Option<String>,
}

impl RawPolicy {
  pub fn into_policy(self) -> Result<Policy> {
    Ok(Policy {
      policy_id:      decode_uuid(&self.policy_id)?,
      policy_type:    self.policy_type,
      text:           self.text,
      conditions:     decode_json(&self.conditions)?,
      effects:        decode_json(&self.effects)?,
      effective_from: decode_dt(&self.effective_from)?,
      effective_to:   decode_opt_dt(self.effective_to.as_deref())?,
    })
  }
}

pub struct RawPlaybook {
  pub playbook_id:     String,
  pub name:            String,
  pub pattern:         String,
  pub action_template: String,
  pub use_count:       i64,
  pub success_count:   i64,
  pub policy_snapshot: String,
  pub domain:          String,
  pub created_at:      String,
  pub last_used_at:    Option<String>,
}

impl RawPlaybook {
  pub fn into_playbook(self) -> Result<Playbook> {
    let snapshot: Vec<String> = serde_json::from_str(&self.policy_snapshot)?;
    Ok(Playbook {
      playbook_id:     decode_uuid(&self.playbook_id)?,
      name:            self.name,
      pattern:         decode_json(&self.pattern)?,
      action_template: decode_json(&self.action_template)?,
      stats:           PlaybookStats {
        use_count:     self.use_count as u32,
        success_count: self.success_count as u32,
      },
      policy_snapshot: snapshot,
      domain:          decode_domain(&self.domain)?,
      created_at:      decode_dt(&self.created_at)?,
      last_used_at:    decode_opt_dt(self.last_used_at.as_deref())?,
    })
  }
}

pub struct RawEndpoint {
  pub webhook_id: String,
  pub name:       String,
  pub url:        String,
  pub events:     String,
  pub enabled:    bool,
  pub created_at: String,
}

impl RawEndpoint {
  pub fn into_endpoint(self) -> Result<WebhookEndpoint> {
    let tags: Vec<String> = serde_json::from_str(&self.events)?;
    let events = tags
      .iter()
      .map(|t| decode_webhook_event(t))
      .collect::<Result<Vec<_>>>()?;
    Ok(WebhookEndpoint {
      webhook_id: decode_uuid(&self.webhook_id)?,
      name:       self.name,
      url:        self.url,
      events,
      enabled:    self.enabled,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
