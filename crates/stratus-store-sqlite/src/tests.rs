//! Integration tests for `SqliteStore` against an in-memory database.

use stratus_core::{
  action::{ActionState, ActionType, NewAction, RiskLevel},
  case::{CaseScope, CaseStatus, CaseType, Criticality, NewTraceEvent, TraceEventKind},
  evidence::NewEvidence,
  graph::{ClaimStatus, Direction, EdgeStatus, NewClaim, NewEdge},
  policy::PolicySeed,
  store::{CaseStore, EvidenceStore, GraphStore, NewMissingEvidence},
};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> (SqliteStore, tempfile::TempDir) {
  let dir = tempfile::tempdir().expect("evidence dir");
  let store = SqliteStore::open_in_memory(dir.path())
    .await
    .expect("in-memory store");
  (store, dir)
}

fn payload_evidence(payload: &[u8]) -> NewEvidence {
  NewEvidence::new("FAA_NAS", "KJFK", "application/json", payload.to_vec())
}

// ─── Evidence ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn evidence_put_is_idempotent() {
  let (s, _dir) = store().await;

  let first = s
    .put_evidence(payload_evidence(b"{\"delay\":true}"))
    .await
    .unwrap();
  let second = s
    .put_evidence(payload_evidence(b"{\"delay\":true}"))
    .await
    .unwrap();

  assert_eq!(first.evidence_id, second.evidence_id);
  assert_eq!(first.content_sha256, second.content_sha256);
}

#[tokio::test]
async fn evidence_distinct_content_gets_distinct_rows() {
  let (s, _dir) = store().await;

  let a = s.put_evidence(payload_evidence(b"{\"x\":1}")).await.unwrap();
  let b = s.put_evidence(payload_evidence(b"{\"x\":2}")).await.unwrap();

  assert_ne!(a.evidence_id, b.evidence_id);
  assert_ne!(a.content_sha256, b.content_sha256);
}

#[tokio::test]
async fn evidence_bytes_round_trip() {
  let (s, _dir) = store().await;

  let record = s
    .put_evidence(payload_evidence(b"{\"visibility\":0.5}"))
    .await
    .unwrap();
  let (fetched, bytes) = s
    .get_evidence(record.evidence_id)
    .await
    .unwrap()
    .expect("stored evidence");

  assert_eq!(fetched.evidence_id, record.evidence_id);
  assert_eq!(bytes, b"{\"visibility\":0.5}");
}

#[tokio::test]
async fn evidence_excerpt_is_redacted() {
  let (s, _dir) = store().await;

  let record = s
    .put_evidence(payload_evidence(
      b"contact ops@example.com or 555-123-4567, SSN 123-45-6789",
    ))
    .await
    .unwrap();

  assert!(record.excerpt.contains("[EMAIL_REDACTED]"));
  assert!(record.excerpt.contains("[PHONE_REDACTED]"));
  assert!(record.excerpt.contains("[SSN_REDACTED]"));
  assert!(!record.excerpt.contains("ops@example.com"));
}

#[tokio::test]
async fn evidence_excerpt_truncates_long_payloads() {
  let (s, _dir) = store().await;

  let long = vec![b'a'; 2000];
  let record = s.put_evidence(payload_evidence(&long)).await.unwrap();

  assert!(record.excerpt.chars().count() <= 500);
  assert!(record.excerpt.ends_with("..."));
}

// ─── Nodes ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_node_returns_existing_row() {
  let (s, _dir) = store().await;

  let first = s.upsert_node("AIRPORT", "KJFK").await.unwrap();
  let second = s.upsert_node("AIRPORT", "KJFK").await.unwrap();

  assert_eq!(first.node_id, second.node_id);
  assert_eq!(first.created_at, second.created_at);
}

#[tokio::test]
async fn node_versions_chain_and_close_windows() {
  let (s, _dir) = store().await;
  let node = s.upsert_node("AIRPORT", "KSEA").await.unwrap();

  let v1 = s
    .new_node_version(node.node_id, serde_json::json!({"baseline": 90}))
    .await
    .unwrap();
  let v2 = s
    .new_node_version(node.node_id, serde_json::json!({"baseline": 95}))
    .await
    .unwrap();

  assert_eq!(v2.supersedes, Some(v1.version_id));

  let current = s
    .current_node_version(node.node_id)
    .await
    .unwrap()
    .expect("current version");
  assert_eq!(current.version_id, v2.version_id);
  assert_eq!(current.attrs["baseline"], 95);
}

// ─── Evidence binding invariant ──────────────────────────────────────────────

#[tokio::test]
async fn fact_edge_without_evidence_is_rejected() {
  let (s, _dir) = store().await;
  let node = s.upsert_node("AIRPORT", "KJFK").await.unwrap();

  let mut input = NewEdge::draft(
    node.node_id,
    node.node_id,
    "DISRUPTED_BY",
    "FAA_NAS",
  );
  input.status = EdgeStatus::Fact;

  let err = s.insert_edge(input).await.unwrap_err();
  assert!(err.is_invariant_violation());
}

#[tokio::test]
async fn promote_edge_without_evidence_is_rejected() {
  let (s, _dir) = store().await;
  let node = s.upsert_node("AIRPORT", "KJFK").await.unwrap();

  let edge = s
    .insert_edge(NewEdge::draft(
      node.node_id,
      node.node_id,
      "HAS_WEATHER",
      "METAR",
    ))
    .await
    .unwrap();

  let err = s.promote_edge(edge.edge_id).await.unwrap_err();
  assert!(err.is_invariant_violation());
}

#[tokio::test]
async fn promote_edge_with_evidence_succeeds() {
  let (s, _dir) = store().await;
  let node = s.upsert_node("AIRPORT", "KJFK").await.unwrap();
  let evidence = s.put_evidence(payload_evidence(b"{}")).await.unwrap();

  let edge = s
    .insert_edge(NewEdge::draft(
      node.node_id,
      node.node_id,
      "HAS_WEATHER",
      "METAR",
    ))
    .await
    .unwrap();
  s.bind_edge_evidence(edge.edge_id, evidence.evidence_id)
    .await
    .unwrap();

  let promoted = s.promote_edge(edge.edge_id).await.unwrap();
  assert_eq!(promoted.status, EdgeStatus::Fact);
}

#[tokio::test]
async fn fact_claim_protocol_draft_bind_promote() {
  let (s, _dir) = store().await;
  let node = s.upsert_node("AIRPORT", "KJFK").await.unwrap();
  let evidence = s.put_evidence(payload_evidence(b"{}")).await.unwrap();

  let claim = s
    .insert_claim(NewClaim::draft(node.node_id, "WeatherRisk: LIFR at KJFK"))
    .await
    .unwrap();
  assert_eq!(claim.status, ClaimStatus::Draft);

  // Promotion before binding fails; after binding it succeeds.
  assert!(s.promote_claim(claim.claim_id).await.is_err());

  s.bind_claim_evidence(claim.claim_id, evidence.evidence_id)
    .await
    .unwrap();
  let promoted = s.promote_claim(claim.claim_id).await.unwrap();
  assert_eq!(promoted.status, ClaimStatus::Fact);
}

#[tokio::test]
async fn fact_insert_with_evidence_in_same_transaction() {
  let (s, _dir) = store().await;
  let node = s.upsert_node("AIRPORT", "KJFK").await.unwrap();
  let evidence = s.put_evidence(payload_evidence(b"{}")).await.unwrap();

  let mut input = NewEdge::draft(
    node.node_id,
    node.node_id,
    "HAS_ALERT",
    "NWS_ALERTS",
  );
  input.status = EdgeStatus::Fact;
  input.evidence = vec![evidence.evidence_id];

  let edge = s.insert_edge(input).await.unwrap();
  assert_eq!(edge.status, EdgeStatus::Fact);
  assert_eq!(s.edge_evidence(edge.edge_id).await.unwrap().len(), 1);
}

// ─── Bi-temporal reads ───────────────────────────────────────────────────────

#[tokio::test]
async fn as_of_hides_rows_ingested_later() {
  let (s, _dir) = store().await;
  let node = s.upsert_node("AIRPORT", "KJFK").await.unwrap();
  let evidence = s.put_evidence(payload_evidence(b"{}")).await.unwrap();

  let mut input = NewEdge::draft(
    node.node_id,
    node.node_id,
    "HAS_WEATHER",
    "METAR",
  );
  input.status = EdgeStatus::Fact;
  input.evidence = vec![evidence.evidence_id];
  let edge = s.insert_edge(input).await.unwrap();

  let before = edge.ingested_at - chrono::Duration::seconds(1);
  let after = edge.ingested_at + chrono::Duration::seconds(1);

  let hidden = s.as_of(after, before).await.unwrap();
  assert!(hidden.edges.is_empty());

  let visible = s.as_of(after, after).await.unwrap();
  assert_eq!(visible.edges.len(), 1);
}

#[tokio::test]
async fn as_of_respects_supersession() {
  let (s, _dir) = store().await;
  let node = s.upsert_node("AIRPORT", "KJFK").await.unwrap();
  let evidence = s.put_evidence(payload_evidence(b"{}")).await.unwrap();

  let original = s
    .insert_claim(NewClaim {
      evidence: vec![evidence.evidence_id],
      status: ClaimStatus::Fact,
      ..NewClaim::draft(node.node_id, "visibility 2mi")
    })
    .await
    .unwrap();

  let t1 = original.ingested_at + chrono::Duration::milliseconds(500);
  // Corrective claim lands later at ingest time t2 > t1.
  tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

  let corrected = s
    .supersede_claim(
      original.claim_id,
      NewClaim {
        evidence: vec![evidence.evidence_id],
        status: ClaimStatus::Fact,
        ..NewClaim::draft(node.node_id, "visibility 0.5mi")
      },
    )
    .await
    .unwrap();
  assert_eq!(corrected.supersedes, Some(original.claim_id));

  let t2 = corrected.ingested_at + chrono::Duration::seconds(1);

  // As known at t1: only the original claim.
  let view_t1 = s.as_of(t2, t1).await.unwrap();
  let texts: Vec<&str> =
    view_t1.claims.iter().map(|c| c.text.as_str()).collect();
  assert_eq!(texts, ["visibility 2mi"]);

  // As known at t2: the corrective claim replaces it.
  let view_t2 = s.as_of(t2, t2).await.unwrap();
  let texts: Vec<&str> =
    view_t2.claims.iter().map(|c| c.text.as_str()).collect();
  assert_eq!(texts, ["visibility 0.5mi"]);
}

#[tokio::test]
async fn neighbors_filters_by_type_and_direction() {
  let (s, _dir) = store().await;
  let airport = s.upsert_node("AIRPORT", "KJFK").await.unwrap();
  let flight = s.upsert_node("FLIGHT", "AA100").await.unwrap();

  s.insert_edge(NewEdge::draft(
    airport.node_id,
    flight.node_id,
    "HAS_FLIGHT",
    "SEED",
  ))
  .await
  .unwrap();

  let out = s
    .neighbors(airport.node_id, Some("HAS_FLIGHT"), Direction::Out)
    .await
    .unwrap();
  assert_eq!(out.len(), 1);

  let inbound = s
    .neighbors(airport.node_id, None, Direction::In)
    .await
    .unwrap();
  assert!(inbound.is_empty());
}

#[tokio::test]
async fn traverse_is_cycle_safe() {
  let (s, _dir) = store().await;
  let a = s.upsert_node("AIRPORT", "KJFK").await.unwrap();
  let b = s.upsert_node("FLIGHT", "AA100").await.unwrap();

  s.insert_edge(NewEdge::draft(a.node_id, b.node_id, "HAS_FLIGHT", "SEED"))
    .await
    .unwrap();
  s.insert_edge(NewEdge::draft(b.node_id, a.node_id, "HAS_FLIGHT", "SEED"))
    .await
    .unwrap();

  let subset = s
    .traverse(a.node_id, &["HAS_FLIGHT".to_owned()], 10)
    .await
    .unwrap();
  assert_eq!(subset.nodes.len(), 2);
  assert_eq!(subset.edges.len(), 2);
}

// ─── Action governance ───────────────────────────────────────────────────────

async fn open_case(s: &SqliteStore) -> Uuid {
  s.create_case(CaseType::AirportDisruption, CaseScope::airport("KJFK"))
    .await
    .unwrap()
    .case_id
}

#[tokio::test]
async fn high_risk_action_without_approval_is_rejected() {
  let (s, _dir) = store().await;
  let case_id = open_case(&s).await;

  let err = s
    .insert_action(NewAction {
      case_id,
      action_type: ActionType::SwitchGateway,
      args: serde_json::json!({}),
      risk: RiskLevel::High,
      requires_approval: false,
    })
    .await
    .unwrap_err();
  assert!(err.is_invariant_violation());
}

#[tokio::test]
async fn executing_before_approval_is_rejected() {
  let (s, _dir) = store().await;
  let case_id = open_case(&s).await;

  let action = s
    .insert_action(NewAction {
      case_id,
      action_type: ActionType::RebookFlight,
      args: serde_json::json!({"flight": "AA100"}),
      risk: RiskLevel::High,
      requires_approval: true,
    })
    .await
    .unwrap();

  s.transition_action(
    action.action_id,
    ActionState::PendingApproval,
    None,
    None,
  )
  .await
  .unwrap();

  // PENDING_APPROVAL -> EXECUTING is not even a legal edge.
  let err = s
    .transition_action(action.action_id, ActionState::Executing, None, None)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(stratus_core::Error::IllegalTransition { .. })
  ));

  let approved = s
    .transition_action(
      action.action_id,
      ActionState::Approved,
      Some("duty-manager"),
      None,
    )
    .await
    .unwrap();
  assert_eq!(approved.approved_by.as_deref(), Some("duty-manager"));
  assert!(approved.approved_at.is_some());

  let executing = s
    .transition_action(action.action_id, ActionState::Executing, None, None)
    .await
    .unwrap();
  assert_eq!(executing.state, ActionState::Executing);
}

#[tokio::test]
async fn second_approve_is_a_no_op() {
  let (s, _dir) = store().await;
  let case_id = open_case(&s).await;

  let action = s
    .insert_action(NewAction::new(
      case_id,
      ActionType::SetPosture,
      serde_json::json!({"posture": "ACCEPT"}),
    ))
    .await
    .unwrap();

  let first = s
    .transition_action(action.action_id, ActionState::Approved, Some("a"), None)
    .await
    .unwrap();
  let second = s
    .transition_action(action.action_id, ActionState::Approved, Some("b"), None)
    .await
    .unwrap();

  // Idempotent re-delivery: the original approval stands.
  assert_eq!(second.approved_by, first.approved_by);
  assert_eq!(second.approved_at, first.approved_at);
}

#[tokio::test]
async fn completed_to_executing_is_illegal() {
  let (s, _dir) = store().await;
  let case_id = open_case(&s).await;

  let action = s
    .insert_action(NewAction::new(
      case_id,
      ActionType::SetPosture,
      serde_json::json!({}),
    ))
    .await
    .unwrap();

  s.transition_action(action.action_id, ActionState::Approved, None, None)
    .await
    .unwrap();
  s.transition_action(action.action_id, ActionState::Executing, None, None)
    .await
    .unwrap();
  s.transition_action(action.action_id, ActionState::Completed, None, None)
    .await
    .unwrap();

  let err = s
    .transition_action(action.action_id, ActionState::Executing, None, None)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(stratus_core::Error::IllegalTransition { .. })
  ));
}

// ─── Trace ordering ──────────────────────────────────────────────────────────

#[tokio::test]
async fn trace_sequence_is_strictly_increasing() {
  let (s, _dir) = store().await;
  let case_id = open_case(&s).await;

  for _ in 0..5 {
    s.record_trace(NewTraceEvent::new(
      case_id,
      TraceEventKind::StateEnter,
      serde_json::json!({}),
    ))
    .await
    .unwrap();
  }

  let trace = s.trace_for_case(case_id).await.unwrap();
  let seqs: Vec<i64> = trace.iter().map(|t| t.seq).collect();
  assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
}

// ─── Cases and missing evidence ──────────────────────────────────────────────

#[tokio::test]
async fn resolved_cases_are_append_only() {
  let (s, _dir) = store().await;
  let case_id = open_case(&s).await;

  s.set_case_status(case_id, CaseStatus::Resolved).await.unwrap();

  let err = s
    .set_case_status(case_id, CaseStatus::Open)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(stratus_core::Error::CaseClosed(_))
  ));
}

#[tokio::test]
async fn missing_evidence_record_and_resolve() {
  let (s, _dir) = store().await;
  let case_id = open_case(&s).await;

  let request = s
    .record_missing_evidence(NewMissingEvidence {
      case_id,
      source_system: "ADSB".into(),
      request_type: "movement_snapshot".into(),
      params: serde_json::json!({"icao": "KDFW"}),
      reason: "fetch timed out after 10s".into(),
      criticality: Criticality::Informational,
    })
    .await
    .unwrap();

  let open = s.missing_for_case(case_id, true).await.unwrap();
  assert_eq!(open.len(), 1);
  assert!(open[0].is_open());

  let evidence = s.put_evidence(payload_evidence(b"{}")).await.unwrap();
  s.resolve_missing_evidence(request.request_id, evidence.evidence_id)
    .await
    .unwrap();

  assert!(s.missing_for_case(case_id, true).await.unwrap().is_empty());
  let all = s.missing_for_case(case_id, false).await.unwrap();
  assert_eq!(all[0].resolved_by_evidence, Some(evidence.evidence_id));
}

// ─── Policies ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn policy_seeding_is_idempotent_on_text() {
  let (s, _dir) = store().await;

  let seeds = [PolicySeed {
    policy_type: "threshold",
    text:        "CRITICAL risk level prohibits ACCEPT posture",
    conditions:  serde_json::json!({"risk_level": "CRITICAL"}),
    effects:     serde_json::json!({"action": "block"}),
  }];

  assert_eq!(s.seed_policies(&seeds).await.unwrap(), 1);
  assert_eq!(s.seed_policies(&seeds).await.unwrap(), 0);

  let active = s.active_policies(chrono::Utc::now()).await.unwrap();
  assert_eq!(active.len(), 1);
}

// ─── Packets ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn packet_is_write_once() {
  let (s, _dir) = store().await;
  let case_id = open_case(&s).await;

  s.put_packet(case_id, serde_json::json!({"posture": "HOLD"}))
    .await
    .unwrap();
  s.put_packet(case_id, serde_json::json!({"posture": "ACCEPT"}))
    .await
    .unwrap();

  let packet = s.get_packet(case_id).await.unwrap().unwrap();
  assert_eq!(packet["posture"], "HOLD");
}
