//! The bi-temporal context graph: nodes, versions, edges, claims, and
//! contradictions.
//!
//! Nodes are immutable; attribute changes append versions. Edges and claims
//! are append-only and carry both an event-time window (when the fact is true
//! in the world) and an ingest timestamp (when the system learned it).
//! Status FACT requires bound evidence — enforced by the store, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Nodes ───────────────────────────────────────────────────────────────────

/// An entity in the graph. Identity `(node_type, identifier)` is unique;
/// a second insertion returns the existing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
  pub node_id:    Uuid,
  /// E.g. `AIRPORT`, `CONDITION`, `FLIGHT`, `SHIPMENT`, `BOOKING`.
  pub node_type:  String,
  /// Human-readable identity within the type, e.g. `KJFK` or `TRK-1234`.
  pub identifier: String,
  pub created_at: DateTime<Utc>,
}

/// One version of a node's attributes with a `[valid_from, valid_to)`
/// window; an open end means current. Versions chain via `supersedes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeVersion {
  pub version_id: Uuid,
  pub node_id:    Uuid,
  pub attrs:      serde_json::Value,
  pub valid_from: DateTime<Utc>,
  pub valid_to:   Option<DateTime<Utc>>,
  pub supersedes: Option<Uuid>,
  pub created_at: DateTime<Utc>,
}

// ─── Edges ───────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeStatus {
  Draft,
  Fact,
  Retracted,
}

/// A directed typed link between two nodes, bi-temporally stamped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
  pub edge_id:          Uuid,
  pub src:              Uuid,
  pub dst:              Uuid,
  pub edge_type:        String,
  pub attrs:            serde_json::Value,
  pub status:           EdgeStatus,
  pub supersedes:       Option<Uuid>,
  /// When the fact is true in the world.
  pub event_time_start: Option<DateTime<Utc>>,
  pub event_time_end:   Option<DateTime<Utc>>,
  /// When the system learned it. Assigned by the store.
  pub ingested_at:      DateTime<Utc>,
  pub valid_from:       Option<DateTime<Utc>>,
  pub valid_to:         Option<DateTime<Utc>>,
  pub source_system:    String,
  /// In `[0, 1]`.
  pub confidence:       f64,
}

/// Input to [`crate::store::GraphStore::insert_edge`]. An insert at status
/// FACT must carry at least one evidence id; the store binds the listed
/// evidence in the same transaction as the row.
#[derive(Debug, Clone)]
pub struct NewEdge {
  pub src:              Uuid,
  pub dst:              Uuid,
  pub edge_type:        String,
  pub attrs:            serde_json::Value,
  pub status:           EdgeStatus,
  pub evidence:         Vec<Uuid>,
  pub supersedes:       Option<Uuid>,
  pub event_time_start: Option<DateTime<Utc>>,
  pub event_time_end:   Option<DateTime<Utc>>,
  pub valid_from:       Option<DateTime<Utc>>,
  pub valid_to:         Option<DateTime<Utc>>,
  pub source_system:    String,
  pub confidence:       f64,
}

impl NewEdge {
  pub fn draft(
    src: Uuid,
    dst: Uuid,
    edge_type: impl Into<String>,
    source_system: impl Into<String>,
  ) -> Self {
    Self {
      src,
      dst,
      edge_type: edge_type.into(),
      attrs: serde_json::Value::Null,
      status: EdgeStatus::Draft,
      evidence: Vec::new(),
      supersedes: None,
      event_time_start: None,
      event_time_end: None,
      valid_from: None,
      valid_to: None,
      source_system: source_system.into(),
      confidence: 0.5,
    }
  }
}

// ─── Claims ──────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
  Draft,
  Hypothesis,
  Fact,
  Retracted,
}

/// A textual assertion about a subject node. FACT claims require bound
/// evidence; supersession is recorded, never destructive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
  pub claim_id:         Uuid,
  pub subject_node_id:  Uuid,
  pub text:             String,
  pub status:           ClaimStatus,
  pub confidence:       f64,
  pub supersedes:       Option<Uuid>,
  pub event_time_start: Option<DateTime<Utc>>,
  pub event_time_end:   Option<DateTime<Utc>>,
  pub ingested_at:      DateTime<Utc>,
}

/// Input to [`crate::store::GraphStore::insert_claim`].
#[derive(Debug, Clone)]
pub struct NewClaim {
  pub subject_node_id:  Uuid,
  pub text:             String,
  pub status:           ClaimStatus,
  pub confidence:       f64,
  pub evidence:         Vec<Uuid>,
  pub supersedes:       Option<Uuid>,
  pub event_time_start: Option<DateTime<Utc>>,
  pub event_time_end:   Option<DateTime<Utc>>,
}

impl NewClaim {
  pub fn draft(subject_node_id: Uuid, text: impl Into<String>) -> Self {
    Self {
      subject_node_id,
      text: text.into(),
      status: ClaimStatus::Draft,
      confidence: 0.5,
      evidence: Vec::new(),
      supersedes: None,
      event_time_start: None,
      event_time_end: None,
    }
  }
}

// ─── Contradictions ──────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContradictionStatus {
  Open,
  Resolved,
  Ignored,
}

/// Two rows that cannot both be right. The refs point at the conflicting
/// edges or claims; resolution may cite the claim that settled the matter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
  pub contradiction_id:   Uuid,
  pub left_ref:           Uuid,
  pub right_ref:          Uuid,
  /// E.g. `FAA_WEATHER_MISMATCH`, `STALE_FAA_DATA`.
  pub kind:               String,
  pub explanation:        String,
  pub detected_at:        DateTime<Utc>,
  pub status:             ContradictionStatus,
  pub resolved_by_claim:  Option<Uuid>,
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// Edge direction filter for neighbourhood reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
  Out,
  In,
  Both,
}

/// The slice of the graph visible at one `(event_time, ingest_time)` point.
/// This is the canonical audit read; every UI view specialises it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphView {
  pub event_time:  Option<DateTime<Utc>>,
  pub ingest_time: Option<DateTime<Utc>>,
  pub edges:       Vec<Edge>,
  pub claims:      Vec<Claim>,
}

/// Result of a bounded traversal from a root node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSubset {
  pub nodes: Vec<Node>,
  pub edges: Vec<Edge>,
}

impl GraphSubset {
  pub fn node_by_id(&self, node_id: Uuid) -> Option<&Node> {
    self.nodes.iter().find(|n| n.node_id == node_id)
  }

  pub fn edges_from(&self, node_id: Uuid) -> Vec<&Edge> {
    self.edges.iter().filter(|e| e.src == node_id).collect()
  }
}
