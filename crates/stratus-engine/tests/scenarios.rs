//! End-to-end orchestration scenarios against the in-memory SQLite store,
//! the scripted signal source, and the deterministic risk assessor.

use std::sync::Arc;

use stratus_core::{
  action::{ActionState, ActionType},
  case::{CaseScope, CaseStatus, CaseType, Criticality, Posture},
  graph::{ClaimStatus, Direction, EdgeStatus, NewClaim, NewEdge},
  signal::{SignalKind, SourceError},
  store::{CaseStore, GraphStore},
};
use stratus_engine::{
  governance::ActionGovernor,
  orchestrator::{Orchestrator, RunOutcome},
  playbooks, policy,
  risk::HeuristicRiskAssessor,
  scenarios::{self, ScriptedSignalSource},
  EngineConfig,
};
use stratus_store_sqlite::SqliteStore;
use uuid::Uuid;

async fn store() -> (Arc<SqliteStore>, tempfile::TempDir) {
  let dir = tempfile::tempdir().expect("evidence dir");
  let store = SqliteStore::open_in_memory(dir.path())
    .await
    .expect("in-memory store");
  policy::seed_builtin_policies(&store).await.expect("seed policies");
  (Arc::new(store), dir)
}

async fn run_scenario(
  store: &Arc<SqliteStore>,
  scenario_id: &str,
  icao: &str,
) -> (Uuid, RunOutcome) {
  scenarios::seed_airport(store.as_ref(), icao, false)
    .await
    .expect("seed airport");

  let case = store
    .create_case(CaseType::AirportDisruption, CaseScope::airport(icao))
    .await
    .expect("create case");

  let source = scenarios::source_for(scenario_id).expect("known scenario");
  let orchestrator = Orchestrator::new(
    Arc::clone(store),
    Arc::new(source),
    Arc::new(HeuristicRiskAssessor),
    EngineConfig::default(),
  );

  let outcome = orchestrator.run(case.case_id).await.expect("run completes");
  (case.case_id, outcome)
}

// ─── S1: JFK ground stop ─────────────────────────────────────────────────────

#[tokio::test]
async fn ground_stop_holds_at_high_risk() {
  let (s, _dir) = store().await;
  let (case_id, outcome) = run_scenario(&s, "ground_stop", "KJFK").await;

  let packet = &outcome.packet;
  assert_eq!(packet.posture.posture, Posture::Hold);
  assert_eq!(
    packet.confidence_breakdown.sources_missing,
    Vec::<String>::new()
  );
  assert!(packet.evidence.len() >= 4);
  assert!(packet.contradictions.is_empty());
  assert!(packet.metrics.pdl_seconds.is_some());

  // Downstream exposure is projected from the seeded subgraph.
  assert_eq!(packet.cascade_impact.flights, 3);
  assert_eq!(packet.cascade_impact.shipments, 6);
  assert_eq!(packet.cascade_impact.bookings, 6);
  assert!(packet.cascade_impact.sla_exposure_usd > 0.0);

  // HIGH risk parks every planned action behind an approval.
  let actions = s.actions_for_case(case_id).await.unwrap();
  assert!(!actions.is_empty());
  assert!(actions
    .iter()
    .all(|a| a.state == ActionState::PendingApproval));
  assert_eq!(outcome.final_status, CaseStatus::Open);

  // The sealed packet is retrievable by case id.
  assert!(s.get_packet(case_id).await.unwrap().is_some());
}

#[tokio::test]
async fn ground_stop_case_resolves_once_approved() {
  let (s, _dir) = store().await;
  let (case_id, _outcome) = run_scenario(&s, "ground_stop", "KJFK").await;

  let governor = ActionGovernor::new(s.as_ref());
  for action in s.actions_for_case(case_id).await.unwrap() {
    governor
      .approve(action.action_id, "duty-manager")
      .await
      .unwrap();
    governor.execute(action.action_id).await.unwrap();
  }

  let status =
    stratus_engine::governance::auto_resolve_status(s.as_ref(), case_id)
      .await
      .unwrap();
  assert_eq!(status, Some(CaseStatus::Resolved));
}

// ─── S2: SEA contradictions ──────────────────────────────────────────────────

#[tokio::test]
async fn contradictory_signals_open_contradictions_and_restrict() {
  let (s, _dir) = store().await;
  let (_case_id, outcome) = run_scenario(&s, "contradiction", "KSEA").await;

  let packet = &outcome.packet;
  let kinds: Vec<&str> = packet
    .contradictions
    .iter()
    .map(|c| c.kind.as_str())
    .collect();
  assert!(kinds.contains(&"FAA_WEATHER_MISMATCH"));
  assert!(kinds.contains(&"FAA_MOVEMENT_MISMATCH"));

  // Contradictions keep the gateway off ACCEPT.
  assert_ne!(packet.posture.posture, Posture::Accept);
  assert_eq!(packet.posture.posture, Posture::Restrict);
  assert_eq!(outcome.final_status, CaseStatus::Resolved);

  // The LIFR conditions also produced a promoted weather-risk claim.
  assert!(packet
    .claims
    .iter()
    .any(|c| c.text.contains("WeatherRisk") && c.status == ClaimStatus::Fact));
}

// ─── S3: DFW ADS-B timeout ───────────────────────────────────────────────────

#[tokio::test]
async fn adsb_timeout_degrades_but_completes() {
  let (s, _dir) = store().await;
  let (case_id, outcome) = run_scenario(&s, "source_timeout", "KDFW").await;

  let packet = &outcome.packet;
  assert_eq!(outcome.final_status, CaseStatus::Resolved);
  assert_eq!(packet.posture.posture, Posture::Restrict);
  assert!(!packet.blocked_section.is_blocked);

  // The failed fetch is first-class state, not a silent gap.
  let missing = s.missing_for_case(case_id, true).await.unwrap();
  assert_eq!(missing.len(), 1);
  assert_eq!(missing[0].source_system, "ADSB");
  assert_eq!(missing[0].criticality, Criticality::Informational);

  // No movement edge was derived.
  assert!(!packet
    .evidence
    .iter()
    .any(|e| e.source_system == "ADSB"));
  assert!(packet
    .confidence_breakdown
    .sources_missing
    .contains(&"ADSB".to_owned()));
  assert!(packet.confidence_breakdown.confidence < 0.85);
}

// ─── S4: LAX clear skies ─────────────────────────────────────────────────────

#[tokio::test]
async fn clear_skies_accepts_and_executes_only_set_posture() {
  let (s, _dir) = store().await;
  let (case_id, outcome) = run_scenario(&s, "clear_skies", "KLAX").await;

  let packet = &outcome.packet;
  assert_eq!(outcome.final_status, CaseStatus::Resolved);
  assert_eq!(packet.posture.posture, Posture::Accept);
  assert!(packet.contradictions.is_empty());
  assert!(packet.blocked_section.missing_evidence_requests.is_empty());

  let actions = s.actions_for_case(case_id).await.unwrap();
  let types: Vec<ActionType> =
    actions.iter().map(|a| a.action_type).collect();
  assert_eq!(types, vec![ActionType::SetPosture]);
  assert!(actions.iter().all(|a| a.state == ActionState::Completed));

  // The benign-path policies fired and are cited in the packet.
  assert!(packet
    .policies_applied
    .iter()
    .any(|p| p.text.contains("LOW risk")));
  assert!(packet.policies_applied.iter().all(|p| p.citation.len() == 12));
}

// ─── S5: shipment action without booking evidence ────────────────────────────

/// A premium shipment behind a gateway going to HOLD, with no booking
/// confirmation on file: the orchestrator itself plans HOLD_CARGO for it,
/// the booking seed policy and guardrail both fire, and the case blocks.
#[tokio::test]
async fn shipment_action_without_booking_blocks_the_case() {
  let (s, _dir) = store().await;

  // Seed the subgraph by hand — airport, one flight, one premium shipment
  // with a booking node — but deliberately no BOOKING evidence rows.
  let airport = s.upsert_node("AIRPORT", "KMIA").await.unwrap();
  s.new_node_version(
    airport.node_id,
    serde_json::json!({"movement_baseline": 110.0}),
  )
  .await
  .unwrap();
  let flight = s.upsert_node("FLIGHT", "KMIA-F01").await.unwrap();
  let shipment = s.upsert_node("SHIPMENT", "TRK-9999").await.unwrap();
  let booking = s.upsert_node("BOOKING", "BK-TRK-9999").await.unwrap();
  s.insert_edge(NewEdge::draft(
    airport.node_id,
    flight.node_id,
    "HAS_FLIGHT",
    "SEED",
  ))
  .await
  .unwrap();
  s.insert_edge(NewEdge::draft(
    flight.node_id,
    shipment.node_id,
    "CARRIES_SHIPMENT",
    "SEED",
  ))
  .await
  .unwrap();
  s.insert_edge(NewEdge {
    attrs: serde_json::json!({
      "sla_value_usd": 18_000.0,
      "service_tier": "PREMIUM",
    }),
    ..NewEdge::draft(
      shipment.node_id,
      booking.node_id,
      "HAS_BOOKING",
      "SEED",
    )
  })
  .await
  .unwrap();

  let case = s
    .create_case(CaseType::AirportDisruption, CaseScope::airport("KMIA"))
    .await
    .unwrap();
  let source = scenarios::source_for("ground_stop").expect("known scenario");
  let orchestrator = Orchestrator::new(
    Arc::clone(&s),
    Arc::new(source),
    Arc::new(HeuristicRiskAssessor),
    EngineConfig::default(),
  );
  let outcome = orchestrator.run(case.case_id).await.expect("run completes");

  assert_eq!(outcome.final_status, CaseStatus::Blocked);
  let packet = &outcome.packet;
  assert!(packet.blocked_section.is_blocked);
  assert!(packet
    .blocked_section
    .missing_evidence_requests
    .iter()
    .any(|r| {
      r.source_system == "BOOKING" && r.criticality == Criticality::Blocking
    }));

  // The orchestrator's own plan named the shipment; the blocking request
  // carries it.
  let request = packet
    .blocked_section
    .missing_evidence_requests
    .iter()
    .find(|r| r.source_system == "BOOKING")
    .unwrap();
  assert_eq!(request.params["shipment"], "TRK-9999");
  assert_eq!(request.params["action_type"], "HOLD_CARGO");

  // The booking seed policy matched the shipment plan and contributed
  // BLOCK alongside the guardrail.
  assert!(packet
    .policies_applied
    .iter()
    .any(|p| p.effect == "block_without_booking"));

  // Execution never started and the shipment subgraph is untouched.
  assert!(s.actions_for_case(case.case_id).await.unwrap().is_empty());
  let edges = s
    .neighbors(shipment.node_id, Some("HAS_BOOKING"), Direction::Out)
    .await
    .unwrap();
  assert_eq!(edges.len(), 1);
  assert_eq!(edges[0].status, EdgeStatus::Draft);

  let case = s.get_case(case.case_id).await.unwrap().unwrap();
  assert_eq!(case.status, CaseStatus::Blocked);
}

// ─── Blocking source failure ─────────────────────────────────────────────────

#[tokio::test]
async fn blocking_source_failure_blocks_instead_of_guessing() {
  let (s, _dir) = store().await;
  scenarios::seed_airport(s.as_ref(), "KBOS", false).await.unwrap();
  let case = s
    .create_case(CaseType::AirportDisruption, CaseScope::airport("KBOS"))
    .await
    .unwrap();

  // METAR (a BLOCKING source) is down; the rest respond normally.
  let source = ScriptedSignalSource::new()
    .respond(
      SignalKind::FaaNas,
      serde_json::json!({"delay": false, "ground_stop": false, "closure": false}),
    )
    .fail(SignalKind::Metar, SourceError::Transient("503".into()))
    .respond(SignalKind::NwsAlerts, serde_json::json!({"alerts": []}))
    .respond(SignalKind::Taf, serde_json::json!({"station": "KBOS"}))
    .respond(SignalKind::Adsb, serde_json::json!({"aircraft_count": 60}));

  let orchestrator = Orchestrator::new(
    Arc::clone(&s),
    Arc::new(source),
    Arc::new(HeuristicRiskAssessor),
    EngineConfig::default(),
  );
  let outcome = orchestrator.run(case.case_id).await.unwrap();

  assert_eq!(outcome.final_status, CaseStatus::Blocked);
  assert!(outcome.packet.blocked_section.is_blocked);
  assert!(outcome
    .packet
    .blocked_section
    .missing_evidence_requests
    .iter()
    .any(|r| {
      r.source_system == "METAR" && r.criticality == Criticality::Blocking
    }));

  let case = s.get_case(case.case_id).await.unwrap().unwrap();
  assert_eq!(case.status, CaseStatus::Blocked);
}

// ─── S6: point-in-time replay ────────────────────────────────────────────────

#[tokio::test]
async fn corrective_claim_is_visible_only_at_later_ingest_time() {
  let (s, _dir) = store().await;
  let (_case_id, outcome) = run_scenario(&s, "ground_stop", "KJFK").await;

  let original = outcome
    .packet
    .claims
    .iter()
    .find(|c| c.text.contains("WeatherRisk"))
    .expect("S1 produced a weather-risk claim");
  let airport = s.get_node("AIRPORT", "KJFK").await.unwrap().unwrap();
  let evidence_id = original.evidence_ids[0];

  let t1 = chrono::Utc::now();
  tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

  // Corrective METAR lands at ingest time t2 > t1.
  let corrected = s
    .supersede_claim(
      original.claim_id,
      NewClaim {
        status: ClaimStatus::Fact,
        evidence: vec![evidence_id],
        confidence: 0.95,
        ..NewClaim::draft(
          airport.node_id,
          "WeatherRisk: IFR conditions at KJFK (corrected)",
        )
      },
    )
    .await
    .unwrap();
  let t2 = corrected.ingested_at + chrono::Duration::seconds(1);

  // As known at t1: the original claim, not the correction.
  let view_t1 = s.as_of(t1, t1).await.unwrap();
  assert!(view_t1
    .claims
    .iter()
    .any(|c| c.claim_id == original.claim_id));
  assert!(!view_t1
    .claims
    .iter()
    .any(|c| c.claim_id == corrected.claim_id));

  // As known at t2: the correction supersedes the original.
  let view_t2 = s.as_of(t1, t2).await.unwrap();
  assert!(view_t2
    .claims
    .iter()
    .any(|c| c.claim_id == corrected.claim_id));
  assert!(!view_t2
    .claims
    .iter()
    .any(|c| c.claim_id == original.claim_id));
  assert_eq!(corrected.supersedes, Some(original.claim_id));
}

// ─── Playbooks ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn resolved_case_mines_a_retrievable_playbook() {
  let (s, _dir) = store().await;
  run_scenario(&s, "clear_skies", "KLAX").await;

  let playbooks_list = s.list_playbooks().await.unwrap();
  assert_eq!(playbooks_list.len(), 1);
  assert!(!playbooks_list[0].policy_snapshot.is_empty());
  assert!(playbooks_list[0]
    .policy_snapshot
    .iter()
    .all(|h| h.len() == 12));

  let suggestion = playbooks::retrieve_best(
    s.as_ref(),
    CaseType::AirportDisruption,
    &CaseScope::airport("KLAX"),
  )
  .await
  .unwrap();
  let (playbook, score) = suggestion.expect("mined playbook is retrievable");
  assert_eq!(playbook.playbook_id, playbooks_list[0].playbook_id);
  assert!(score > 0.0);
}

// ─── Determinism ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn identical_inputs_produce_identical_packets_modulo_timestamps() {
  let (s1, _d1) = store().await;
  let (_c1, first) = run_scenario(&s1, "contradiction", "KSEA").await;

  let (s2, _d2) = store().await;
  let (_c2, second) = run_scenario(&s2, "contradiction", "KSEA").await;

  let a = &first.packet;
  let b = &second.packet;
  assert_eq!(a.posture.posture, b.posture.posture);
  assert_eq!(a.evidence.len(), b.evidence.len());
  assert_eq!(a.claims.len(), b.claims.len());
  assert_eq!(a.contradictions.len(), b.contradictions.len());
  assert_eq!(
    a.policies_applied
      .iter()
      .map(|p| p.citation.clone())
      .collect::<Vec<_>>(),
    b.policies_applied
      .iter()
      .map(|p| p.citation.clone())
      .collect::<Vec<_>>(),
  );
  assert_eq!(
    a.actions_proposed
      .iter()
      .map(|x| x.action_type)
      .collect::<Vec<_>>(),
    b.actions_proposed
      .iter()
      .map(|x| x.action_type)
      .collect::<Vec<_>>(),
  );
}
