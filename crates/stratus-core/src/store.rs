//! Store traits and supporting input types.
//!
//! The traits are implemented by storage backends (e.g.
//! `stratus-store-sqlite`). Higher layers (`stratus-engine`, `stratus-api`)
//! depend on these abstractions, not on any concrete backend.
//!
//! The three binding invariants live behind these traits, in the backend:
//! evidence binding for FACT rows, node immutability, and action governance.
//! Caller-side enforcement would be bypassed; store-side enforcement is the
//! whole point.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  action::{Action, ActionState, NewAction, Outcome},
  case::{
    Case, CaseScope, CaseStatus, CaseType, Criticality,
    MissingEvidenceRequest, NewTraceEvent, TraceEvent,
  },
  evidence::{EvidenceRecord, NewEvidence},
  graph::{
    Claim, Contradiction, ContradictionStatus, Direction, Edge, GraphSubset,
    GraphView, NewClaim, NewEdge, Node, NodeVersion,
  },
  playbook::{Playbook, PlaybookDomain},
  policy::{Policy, PolicySeed},
  webhook::{WebhookDelivery, WebhookEndpoint, WebhookEventType},
};

// ─── Input types ─────────────────────────────────────────────────────────────

/// Input to [`CaseStore::record_missing_evidence`].
#[derive(Debug, Clone)]
pub struct NewMissingEvidence {
  pub case_id:       Uuid,
  pub source_system: String,
  pub request_type:  String,
  pub params:        serde_json::Value,
  pub reason:        String,
  pub criticality:   Criticality,
}

/// Input to [`CaseStore::insert_playbook`].
#[derive(Debug, Clone)]
pub struct NewPlaybook {
  pub name:            String,
  pub pattern:         serde_json::Value,
  pub action_template: serde_json::Value,
  pub policy_snapshot: Vec<String>,
  pub domain:          PlaybookDomain,
}

// ─── EvidenceStore ───────────────────────────────────────────────────────────

/// Immutable, content-addressed payload storage.
///
/// Rows dedup on `(source_system, source_ref, content_sha256)`; `put` of
/// identical bytes is idempotent and returns the existing row. Rows and raw
/// bytes are never updated or deleted.
pub trait EvidenceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist payload bytes and an index row; idempotent on the identity
  /// triple. A write failure is fatal for this put — the caller must treat
  /// the failed ingestion as a missing-evidence request.
  fn put_evidence(
    &self,
    input: NewEvidence,
  ) -> impl Future<Output = Result<EvidenceRecord, Self::Error>> + Send + '_;

  /// Fetch a row and its raw bytes. `None` only for an unknown id.
  fn get_evidence(
    &self,
    evidence_id: Uuid,
  ) -> impl Future<Output = Result<Option<(EvidenceRecord, Vec<u8>)>, Self::Error>>
  + Send
  + '_;

  /// All rows for a source system, newest first, optionally filtered by
  /// source ref.
  fn evidence_by_source<'a>(
    &'a self,
    source_system: &'a str,
    source_ref: Option<&'a str>,
  ) -> impl Future<Output = Result<Vec<EvidenceRecord>, Self::Error>> + Send + 'a;
}

// ─── GraphStore ──────────────────────────────────────────────────────────────

/// Append-only storage for nodes, versions, edges, claims, and
/// contradictions. Enforces node identity, node immutability, and the
/// FACT-requires-evidence rule at this layer.
pub trait GraphStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Nodes ─────────────────────────────────────────────────────────────

  /// Insert a node, or return the existing row when `(type, identifier)`
  /// is already taken.
  fn upsert_node<'a>(
    &'a self,
    node_type: &'a str,
    identifier: &'a str,
  ) -> impl Future<Output = Result<Node, Self::Error>> + Send + 'a;

  fn get_node<'a>(
    &'a self,
    node_type: &'a str,
    identifier: &'a str,
  ) -> impl Future<Output = Result<Option<Node>, Self::Error>> + Send + 'a;

  /// Append a new attribute version: closes the current version's window at
  /// now, opens the new one, and chains `supersedes`. The node row itself
  /// never changes.
  fn new_node_version(
    &self,
    node_id: Uuid,
    attrs: serde_json::Value,
  ) -> impl Future<Output = Result<NodeVersion, Self::Error>> + Send + '_;

  fn current_node_version(
    &self,
    node_id: Uuid,
  ) -> impl Future<Output = Result<Option<NodeVersion>, Self::Error>> + Send + '_;

  // ── Edges ─────────────────────────────────────────────────────────────

  /// Insert an edge; when `input.status` is FACT the listed evidence is
  /// bound in the same transaction and must be non-empty.
  fn insert_edge(
    &self,
    input: NewEdge,
  ) -> impl Future<Output = Result<Edge, Self::Error>> + Send + '_;

  fn bind_edge_evidence(
    &self,
    edge_id: Uuid,
    evidence_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Promote DRAFT → FACT; rejected unless at least one evidence binding
  /// exists at the moment of promotion.
  fn promote_edge(
    &self,
    edge_id: Uuid,
  ) -> impl Future<Output = Result<Edge, Self::Error>> + Send + '_;

  fn retract_edge(
    &self,
    edge_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn edge_evidence(
    &self,
    edge_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  // ── Claims ────────────────────────────────────────────────────────────

  fn insert_claim(
    &self,
    input: NewClaim,
  ) -> impl Future<Output = Result<Claim, Self::Error>> + Send + '_;

  fn bind_claim_evidence(
    &self,
    claim_id: Uuid,
    evidence_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Promote DRAFT/HYPOTHESIS → FACT under the evidence-binding invariant.
  fn promote_claim(
    &self,
    claim_id: Uuid,
  ) -> impl Future<Output = Result<Claim, Self::Error>> + Send + '_;

  /// Record a replacement claim and chain `supersedes`; the old claim is
  /// left in place for audit.
  fn supersede_claim(
    &self,
    old_claim_id: Uuid,
    replacement: NewClaim,
  ) -> impl Future<Output = Result<Claim, Self::Error>> + Send + '_;

  fn claim_evidence(
    &self,
    claim_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  fn claims_for_subject(
    &self,
    subject_node_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Claim>, Self::Error>> + Send + '_;

  // ── Contradictions ────────────────────────────────────────────────────

  fn insert_contradiction<'a>(
    &'a self,
    left_ref: Uuid,
    right_ref: Uuid,
    kind: &'a str,
    explanation: &'a str,
  ) -> impl Future<Output = Result<Contradiction, Self::Error>> + Send + 'a;

  /// Contradictions whose refs intersect the given edge/claim ids.
  fn contradictions_involving<'a>(
    &'a self,
    refs: &'a [Uuid],
  ) -> impl Future<Output = Result<Vec<Contradiction>, Self::Error>> + Send + 'a;

  fn resolve_contradiction(
    &self,
    contradiction_id: Uuid,
    status: ContradictionStatus,
    resolved_by_claim: Option<Uuid>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Edges touching a node, honoring validity windows as of now.
  fn neighbors<'a>(
    &'a self,
    node_id: Uuid,
    edge_type: Option<&'a str>,
    direction: Direction,
  ) -> impl Future<Output = Result<Vec<Edge>, Self::Error>> + Send + 'a;

  /// Bounded breadth-first traversal over the named edge types; cycle-safe.
  fn traverse<'a>(
    &'a self,
    root: Uuid,
    edge_types: &'a [String],
    max_depth: u32,
  ) -> impl Future<Output = Result<GraphSubset, Self::Error>> + Send + 'a;

  /// The canonical bi-temporal read: rows whose event-time window contains
  /// `event_time`, ingested at or before `ingest_time`, and not superseded
  /// by anything ingested by then. All audit reads go through this.
  fn as_of(
    &self,
    event_time: DateTime<Utc>,
    ingest_time: DateTime<Utc>,
  ) -> impl Future<Output = Result<GraphView, Self::Error>> + Send + '_;

  /// Remove an airport's seeded subgraph. Simulation-only escape hatch;
  /// production rows are append-only.
  fn purge_airport_subgraph<'a>(
    &'a self,
    icao: &'a str,
  ) -> impl Future<Output = Result<(usize, usize), Self::Error>> + Send + 'a;
}

// ─── CaseStore ───────────────────────────────────────────────────────────────

/// Cases, actions, traces, missing evidence, policies, playbooks, packets,
/// and webhook registrations. Enforces the action-governance invariants and
/// the per-case trace ordering.
pub trait CaseStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Cases ─────────────────────────────────────────────────────────────

  fn create_case(
    &self,
    case_type: CaseType,
    scope: CaseScope,
  ) -> impl Future<Output = Result<Case, Self::Error>> + Send + '_;

  fn get_case(
    &self,
    case_id: Uuid,
  ) -> impl Future<Output = Result<Option<Case>, Self::Error>> + Send + '_;

  /// Move a case to OPEN / BLOCKED / RESOLVED. Rejected once RESOLVED.
  fn set_case_status(
    &self,
    case_id: Uuid,
    status: CaseStatus,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Most recently resolved cases, newest first.
  fn recent_resolved_cases(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Case>, Self::Error>> + Send + '_;

  // ── Trace ─────────────────────────────────────────────────────────────

  /// Append a trace event; `seq` is assigned here and strictly increases
  /// within the case.
  fn record_trace(
    &self,
    input: NewTraceEvent,
  ) -> impl Future<Output = Result<TraceEvent, Self::Error>> + Send + '_;

  fn trace_for_case(
    &self,
    case_id: Uuid,
  ) -> impl Future<Output = Result<Vec<TraceEvent>, Self::Error>> + Send + '_;

  // ── Actions ───────────────────────────────────────────────────────────

  /// Insert at PROPOSED. Rejects HIGH risk without `requires_approval`.
  fn insert_action(
    &self,
    input: NewAction,
  ) -> impl Future<Output = Result<Action, Self::Error>> + Send + '_;

  fn get_action(
    &self,
    action_id: Uuid,
  ) -> impl Future<Output = Result<Option<Action>, Self::Error>> + Send + '_;

  fn actions_for_case(
    &self,
    case_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Action>, Self::Error>> + Send + '_;

  /// Apply one legal transition. EXECUTING is rejected while approval is
  /// required but absent; APPROVED stamps `approved_by` / `approved_at`.
  /// Re-applying the current state is a no-op (idempotent re-delivery).
  fn transition_action<'a>(
    &'a self,
    action_id: Uuid,
    to: ActionState,
    actor: Option<&'a str>,
    reason: Option<&'a str>,
  ) -> impl Future<Output = Result<Action, Self::Error>> + Send + 'a;

  fn record_outcome(
    &self,
    action_id: Uuid,
    success: bool,
    payload: serde_json::Value,
  ) -> impl Future<Output = Result<Outcome, Self::Error>> + Send + '_;

  fn outcomes_for_case(
    &self,
    case_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Outcome>, Self::Error>> + Send + '_;

  // ── Missing evidence ──────────────────────────────────────────────────

  fn record_missing_evidence(
    &self,
    input: NewMissingEvidence,
  ) -> impl Future<Output = Result<MissingEvidenceRequest, Self::Error>> + Send + '_;

  /// Explicit resolution: link the request to the evidence row that finally
  /// answered it.
  fn resolve_missing_evidence(
    &self,
    request_id: Uuid,
    evidence_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn missing_for_case(
    &self,
    case_id: Uuid,
    open_only: bool,
  ) -> impl Future<Output = Result<Vec<MissingEvidenceRequest>, Self::Error>>
  + Send
  + '_;

  // ── Policies ──────────────────────────────────────────────────────────

  /// Idempotent bootstrap, keyed by the unique policy text. Returns how
  /// many rows were newly inserted.
  fn seed_policies<'a>(
    &'a self,
    seeds: &'a [PolicySeed],
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  fn active_policies(
    &self,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Policy>, Self::Error>> + Send + '_;

  // ── Playbooks ─────────────────────────────────────────────────────────

  fn insert_playbook(
    &self,
    input: NewPlaybook,
  ) -> impl Future<Output = Result<Playbook, Self::Error>> + Send + '_;

  fn list_playbooks(
    &self,
  ) -> impl Future<Output = Result<Vec<Playbook>, Self::Error>> + Send + '_;

  /// Bump use/success counters and stamp `last_used_at`.
  fn record_playbook_use(
    &self,
    playbook_id: Uuid,
    success: bool,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn link_playbook_case(
    &self,
    playbook_id: Uuid,
    case_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Packets ───────────────────────────────────────────────────────────

  /// Persist the sealed packet for a case. Write-once.
  fn put_packet(
    &self,
    case_id: Uuid,
    packet: serde_json::Value,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_packet(
    &self,
    case_id: Uuid,
  ) -> impl Future<Output = Result<Option<serde_json::Value>, Self::Error>>
  + Send
  + '_;

  // ── Webhooks ──────────────────────────────────────────────────────────

  /// Persist a registration. URL vetting (SSRF guard) happens upstream in
  /// the dispatcher before this is called.
  fn register_webhook<'a>(
    &'a self,
    name: &'a str,
    url: &'a str,
    events: &'a [WebhookEventType],
  ) -> impl Future<Output = Result<WebhookEndpoint, Self::Error>> + Send + 'a;

  fn webhooks_for_event(
    &self,
    event: WebhookEventType,
  ) -> impl Future<Output = Result<Vec<WebhookEndpoint>, Self::Error>> + Send + '_;

  fn log_webhook_delivery(
    &self,
    delivery: WebhookDelivery,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
