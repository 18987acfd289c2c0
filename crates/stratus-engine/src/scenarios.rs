//! Canned scenarios and graph seeding for the simulation surface.
//!
//! [`ScriptedSignalSource`] replaces the real HTTP clients with fixed
//! payloads, which is also what the end-to-end tests run against. The
//! seeder creates the airport node (with its movement baseline) and a small
//! downstream flight → shipment → booking subgraph so cascade impact has
//! something to project.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::json;

use stratus_core::{
  evidence::NewEvidence,
  graph::NewEdge,
  signal::{SignalFetch, SignalKind, SignalSource, SourceError},
  store::{EvidenceStore, GraphStore},
};

use crate::{edge_types, node_types, EngineError, Result};

// ─── Scripted source ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Script {
  Respond(serde_json::Value),
  Fail(SourceError),
}

/// A [`SignalSource`] that replays fixed payloads. Fetches for kinds with
/// no script fail as transient errors.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSignalSource {
  scripts: HashMap<SignalKind, Script>,
}

impl ScriptedSignalSource {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(mut self, kind: SignalKind, payload: serde_json::Value) -> Self {
    self.scripts.insert(kind, Script::Respond(payload));
    self
  }

  pub fn fail(mut self, kind: SignalKind, error: SourceError) -> Self {
    self.scripts.insert(kind, Script::Fail(error));
    self
  }
}

impl SignalSource for ScriptedSignalSource {
  async fn fetch(
    &self,
    kind: SignalKind,
    icao: &str,
  ) -> std::result::Result<SignalFetch, SourceError> {
    match self.scripts.get(&kind) {
      Some(Script::Respond(payload)) => Ok(SignalFetch {
        kind,
        source_ref: icao.to_owned(),
        content_type: "application/json".into(),
        bytes: payload.to_string().into_bytes(),
        retrieved_at: Utc::now(),
        event_time_start: None,
        event_time_end: None,
      }),
      Some(Script::Fail(error)) => Err(error.clone()),
      None => Err(SourceError::Transient(format!(
        "no script for {:?}",
        kind
      ))),
    }
  }
}

// ─── Canned scenarios ────────────────────────────────────────────────────────

#[derive(Debug, Clone, serde::Serialize)]
pub struct Scenario {
  pub id:          String,
  pub name:        String,
  pub airport:     String,
  pub description: String,
}

pub fn scenarios() -> Vec<Scenario> {
  vec![
    Scenario {
      id:          "ground_stop".into(),
      name:        "JFK ground stop".into(),
      airport:     "KJFK".into(),
      description: "FAA ground stop, LIFR weather, severe winter storm \
                    warning, movement collapse"
        .into(),
    },
    Scenario {
      id:          "contradiction".into(),
      name:        "SEA contradictory signals".into(),
      airport:     "KSEA".into(),
      description: "FAA reports normal while METAR shows LIFR and traffic \
                    has collapsed"
        .into(),
    },
    Scenario {
      id:          "source_timeout".into(),
      name:        "DFW ADS-B timeout".into(),
      airport:     "KDFW".into(),
      description: "Benign conditions with the movement feed timing out"
        .into(),
    },
    Scenario {
      id:          "clear_skies".into(),
      name:        "LAX clear skies".into(),
      airport:     "KLAX".into(),
      description: "All sources benign; normal operations".into(),
    },
  ]
}

fn benign_faa() -> serde_json::Value {
  json!({"delay": false, "ground_stop": false, "closure": false})
}

fn benign_metar(station: &str) -> serde_json::Value {
  json!({
    "station": station,
    "flight_category": "VFR",
    "visibility_miles": 10.0,
    "ceiling_feet": 25000.0,
    "wind_speed_kt": 8.0,
    "raw_text": format!("{station} 261753Z 27008KT 10SM FEW250 24/10 A3012"),
  })
}

fn benign_taf(station: &str) -> serde_json::Value {
  let now = Utc::now();
  json!({
    "station": station,
    "valid_from": now,
    "valid_to": now + chrono::Duration::hours(24),
    "periods": [
      {"flight_category": "VFR", "visibility_miles": 10.0}
    ],
  })
}

/// The scripted source for a scenario id.
pub fn source_for(scenario_id: &str) -> Option<ScriptedSignalSource> {
  match scenario_id {
    "ground_stop" => Some(
      ScriptedSignalSource::new()
        .respond(
          SignalKind::FaaNas,
          json!({
            "delay": true,
            "ground_stop": true,
            "closure": false,
            "delay_type": "Ground Stop",
            "reason": "SNOW / winter weather",
            "avg_delay_minutes": 95.0,
          }),
        )
        .respond(
          SignalKind::Metar,
          json!({
            "station": "KJFK",
            "flight_category": "LIFR",
            "visibility_miles": 0.25,
            "ceiling_feet": 200.0,
            "wind_speed_kt": 22.0,
            "wind_gust_kt": 31.0,
            "weather": "+SN BLSN",
            "raw_text": "KJFK 261751Z 04022G31KT 1/4SM +SN BLSN VV002 M03/M05 A2962",
          }),
        )
        .respond(SignalKind::Taf, benign_taf("KJFK"))
        .respond(
          SignalKind::NwsAlerts,
          json!({
            "alerts": [{
              "event": "Winter Storm Warning",
              "severity": "Severe",
              "certainty": "Observed",
              "urgency": "Immediate",
              "headline": "Winter Storm Warning in effect until midnight",
            }],
          }),
        )
        .respond(SignalKind::Adsb, json!({"aircraft_count": 32})),
    ),
    "contradiction" => Some(
      ScriptedSignalSource::new()
        .respond(SignalKind::FaaNas, benign_faa())
        .respond(
          SignalKind::Metar,
          json!({
            "station": "KSEA",
            "flight_category": "LIFR",
            "visibility_miles": 0.5,
            "ceiling_feet": 300.0,
            "weather": "FG",
            "raw_text": "KSEA 261753Z 00000KT 1/2SM FG VV003 12/12 A3020",
          }),
        )
        .respond(SignalKind::Taf, benign_taf("KSEA"))
        .respond(SignalKind::NwsAlerts, json!({"alerts": []}))
        .respond(SignalKind::Adsb, json!({"aircraft_count": 25})),
    ),
    "source_timeout" => Some(
      ScriptedSignalSource::new()
        .respond(SignalKind::FaaNas, benign_faa())
        .respond(SignalKind::Metar, benign_metar("KDFW"))
        .respond(SignalKind::Taf, benign_taf("KDFW"))
        .respond(SignalKind::NwsAlerts, json!({"alerts": []}))
        .fail(SignalKind::Adsb, SourceError::Timeout(10)),
    ),
    "clear_skies" => Some(
      ScriptedSignalSource::new()
        .respond(SignalKind::FaaNas, benign_faa())
        .respond(SignalKind::Metar, benign_metar("KLAX"))
        .respond(SignalKind::Taf, benign_taf("KLAX"))
        .respond(SignalKind::NwsAlerts, json!({"alerts": []}))
        .respond(SignalKind::Adsb, json!({"aircraft_count": 70})),
    ),
    _ => None,
  }
}

/// The movement baseline the seeder records per scenario airport.
pub fn baseline_for(icao: &str) -> f64 {
  match icao {
    "KJFK" => 110.0,
    "KSEA" => 90.0,
    "KDFW" => 80.0,
    "KLAX" => 100.0,
    _ => crate::derive::DEFAULT_MOVEMENT_BASELINE,
  }
}

// ─── Seeding ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, serde::Serialize)]
pub struct SeedSummary {
  pub seed_used:     String,
  pub nodes_created: usize,
  pub cleared:       Option<(usize, usize)>,
}

/// Seed an airport node (with its movement baseline) and a small downstream
/// subgraph: three flights, two shipments each, one booking per shipment.
/// Booking confirmations also land as evidence rows so shipment-level
/// actions on the seeded shipments can cite them.
pub async fn seed_airport<S: GraphStore + EvidenceStore>(
  store: &S,
  icao: &str,
  refresh: bool,
) -> Result<SeedSummary> {
  let cleared = if refresh {
    Some(
      store
        .purge_airport_subgraph(icao)
        .await
        .map_err(EngineError::store)?,
    )
  } else {
    None
  };

  let mut nodes_created = 0usize;

  let airport = store
    .upsert_node(node_types::AIRPORT, icao)
    .await
    .map_err(EngineError::store)?;
  nodes_created += 1;
  store
    .new_node_version(
      airport.node_id,
      json!({"movement_baseline": baseline_for(icao), "icao": icao}),
    )
    .await
    .map_err(EngineError::store)?;

  for flight_index in 1..=3 {
    let flight_id = format!("{icao}-F{flight_index:02}");
    let flight = store
      .upsert_node(node_types::FLIGHT, &flight_id)
      .await
      .map_err(EngineError::store)?;
    nodes_created += 1;
    store
      .insert_edge(NewEdge::draft(
        airport.node_id,
        flight.node_id,
        edge_types::HAS_FLIGHT,
        "SEED",
      ))
      .await
      .map_err(EngineError::store)?;

    for shipment_index in 1..=2 {
      let shipment_id =
        format!("TRK-{flight_index}{shipment_index}{:02}", nodes_created);
      let shipment = store
        .upsert_node(node_types::SHIPMENT, &shipment_id)
        .await
        .map_err(EngineError::store)?;
      nodes_created += 1;
      store
        .insert_edge(NewEdge::draft(
          flight.node_id,
          shipment.node_id,
          edge_types::CARRIES_SHIPMENT,
          "SEED",
        ))
        .await
        .map_err(EngineError::store)?;

      let booking = store
        .upsert_node(node_types::BOOKING, &format!("BK-{shipment_id}"))
        .await
        .map_err(EngineError::store)?;
      nodes_created += 1;
      let premium = shipment_index == 1;
      let sla_value_usd = if premium { 18_000.0 } else { 6_500.0 };
      let service_tier = if premium { "PREMIUM" } else { "STANDARD" };
      store
        .insert_edge(NewEdge {
          attrs: json!({
            "sla_value_usd": sla_value_usd,
            "service_tier": service_tier,
          }),
          ..NewEdge::draft(
            shipment.node_id,
            booking.node_id,
            edge_types::HAS_BOOKING,
            "SEED",
          )
        })
        .await
        .map_err(EngineError::store)?;

      let confirmation = json!({
        "booking_id": format!("BK-{shipment_id}"),
        "shipment": shipment_id,
        "service_tier": service_tier,
        "sla_value_usd": sla_value_usd,
      });
      store
        .put_evidence(NewEvidence {
          source_system: "BOOKING".into(),
          source_ref: shipment_id.clone(),
          content_type: "application/json".into(),
          payload: confirmation.to_string().into_bytes(),
          event_time_start: None,
          event_time_end: None,
          meta: json!({"seeded": true}),
        })
        .await
        .map_err(EngineError::store)?;
    }
  }

  Ok(SeedSummary {
    seed_used: icao.to_owned(),
    nodes_created,
    cleared,
  })
}
