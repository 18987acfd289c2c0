//! Signal derivation: evidence rows → typed graph edges and claims.
//!
//! The derivation table is fixed. Every produced edge and claim is bound to
//! the exact evidence rows that supplied its attributes, then promoted to
//! FACT where the table says so. Severity fields are derived mechanically;
//! interpretation is the risk assessor's job.

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use stratus_core::{
  evidence::EvidenceRecord,
  graph::{Claim, ClaimStatus, Edge, EdgeStatus, NewClaim, NewEdge, Node},
  signal::SignalKind,
  store::GraphStore,
};

use crate::{
  edge_types, node_types,
  sources::{
    parse_adsb, parse_faa, parse_metar, parse_nws, parse_taf, AdsbSnapshot,
    FaaNasStatus, MetarObservation,
  },
  EngineError, Result,
};

/// Fallback movement baseline when the airport node carries none.
pub const DEFAULT_MOVEMENT_BASELINE: f64 = 60.0;

/// Movement collapse is strict: a count at exactly half the baseline does
/// not trigger.
pub fn movement_collapsed(aircraft_count: u32, baseline: f64) -> bool {
  f64::from(aircraft_count) < baseline * 0.5
}

/// A persisted fetch ready for derivation.
#[derive(Debug, Clone)]
pub struct IngestedSignal {
  pub kind:     SignalKind,
  pub evidence: EvidenceRecord,
  pub bytes:    Vec<u8>,
}

// ─── Typed derivation results ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FaaSignal {
  pub edge_id:      Uuid,
  pub status:       FaaNasStatus,
  pub retrieved_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MetarSignal {
  pub edge_id:      Uuid,
  pub observation:  MetarObservation,
  pub retrieved_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MovementSignal {
  pub edge_id:      Uuid,
  pub snapshot:     AdsbSnapshot,
  pub baseline:     f64,
  pub collapsed:    bool,
  pub retrieved_at: DateTime<Utc>,
}

/// Everything one INVESTIGATE pass derived, with typed views for the
/// contradiction detector and the risk assessor.
#[derive(Debug, Clone)]
pub struct DerivedSignals {
  pub airport:  Node,
  pub edges:    Vec<Edge>,
  pub claims:   Vec<Claim>,
  pub faa:      Option<FaaSignal>,
  pub metar:    Option<MetarSignal>,
  pub movement: Option<MovementSignal>,
  /// `(edge_id, severe)` per active NWS alert.
  pub alerts:   Vec<(Uuid, bool)>,
}

// ─── Entry point ─────────────────────────────────────────────────────────────

/// Project a set of freshly ingested evidence rows into the graph for one
/// airport. A source absent from `signals` produces nothing here — the
/// missing-evidence tracker owns that path.
pub async fn derive_for_airport<S: GraphStore>(
  store: &S,
  icao: &str,
  signals: &[IngestedSignal],
) -> Result<DerivedSignals> {
  let airport = store
    .upsert_node(node_types::AIRPORT, icao)
    .await
    .map_err(EngineError::store)?;

  let baseline = movement_baseline(store, airport.node_id).await?;

  let mut out = DerivedSignals {
    airport: airport.clone(),
    edges: Vec::new(),
    claims: Vec::new(),
    faa: None,
    metar: None,
    movement: None,
    alerts: Vec::new(),
  };

  for signal in signals {
    match signal.kind {
      SignalKind::FaaNas => {
        derive_faa(store, &airport, signal, &mut out).await?
      }
      SignalKind::Metar => {
        derive_metar(store, &airport, signal, &mut out).await?
      }
      SignalKind::Taf => derive_taf(store, &airport, signal, &mut out).await?,
      SignalKind::NwsAlerts => {
        derive_nws(store, &airport, signal, &mut out).await?
      }
      SignalKind::Adsb => {
        derive_adsb(store, &airport, signal, baseline, &mut out).await?
      }
    }
  }

  Ok(out)
}

async fn movement_baseline<S: GraphStore>(
  store: &S,
  airport_node_id: Uuid,
) -> Result<f64> {
  let version = store
    .current_node_version(airport_node_id)
    .await
    .map_err(EngineError::store)?;
  Ok(
    version
      .and_then(|v| v.attrs.get("movement_baseline").and_then(|b| b.as_f64()))
      .unwrap_or(DEFAULT_MOVEMENT_BASELINE),
  )
}

/// The dst node for a derived edge: one stable entity per airport × source.
async fn signal_node<S: GraphStore>(
  store: &S,
  node_type: &str,
  icao: &str,
  suffix: &str,
) -> Result<Node> {
  store
    .upsert_node(node_type, &format!("{icao}-{suffix}"))
    .await
    .map_err(EngineError::store)
}

// ─── Per-source derivation ───────────────────────────────────────────────────

/// FAA NAS → `DISRUPTED_BY` edge. Always emitted, even for normal
/// operations — contradiction detection needs to know "FAA says normal".
async fn derive_faa<S: GraphStore>(
  store: &S,
  airport: &Node,
  signal: &IngestedSignal,
  out: &mut DerivedSignals,
) -> Result<()> {
  let status = parse_faa(&signal.bytes)?;
  let condition = signal_node(
    store,
    node_types::CONDITION,
    &airport.identifier,
    "faa",
  )
  .await?;

  let edge = store
    .insert_edge(NewEdge {
      attrs: json!({
        "kind": status.kind(),
        "magnitude": status.avg_delay_minutes,
        "end_time": status.end_time,
        "delay": status.delay,
        "ground_stop": status.ground_stop,
        "closure": status.closure,
        "reason": status.reason,
        "has_disruption": status.has_disruption(),
      }),
      status: EdgeStatus::Fact,
      evidence: vec![signal.evidence.evidence_id],
      event_time_start: signal
        .evidence
        .event_time_start
        .or(Some(signal.evidence.retrieved_at)),
      event_time_end: status.end_time,
      confidence: 0.95,
      ..NewEdge::draft(
        airport.node_id,
        condition.node_id,
        edge_types::DISRUPTED_BY,
        signal.kind.source_system(),
      )
    })
    .await
    .map_err(EngineError::store)?;

  out.faa = Some(FaaSignal {
    edge_id:      edge.edge_id,
    status,
    retrieved_at: signal.evidence.retrieved_at,
  });
  out.edges.push(edge);
  Ok(())
}

/// METAR → `HAS_WEATHER` edge, plus a `WeatherRisk` FACT claim when the
/// flight category is IFR or LIFR.
async fn derive_metar<S: GraphStore>(
  store: &S,
  airport: &Node,
  signal: &IngestedSignal,
  out: &mut DerivedSignals,
) -> Result<()> {
  let observation = parse_metar(&signal.bytes)?;
  let category = observation.category();
  let weather_node = signal_node(
    store,
    node_types::WEATHER_OBSERVATION,
    &airport.identifier,
    "metar",
  )
  .await?;

  let edge = store
    .insert_edge(NewEdge {
      attrs: json!({
        "flight_category": category.as_str(),
        "visibility_miles": observation.visibility_miles,
        "ceiling_feet": observation.ceiling_feet,
        "wind_speed_kt": observation.wind_speed_kt,
        "wind_gust_kt": observation.wind_gust_kt,
        "weather": observation.weather,
        "severity": observation.severity(),
        "raw_metar": observation.raw_text,
      }),
      status: EdgeStatus::Fact,
      evidence: vec![signal.evidence.evidence_id],
      event_time_start: observation
        .observation_time
        .or(Some(signal.evidence.retrieved_at)),
      confidence: 0.90,
      ..NewEdge::draft(
        airport.node_id,
        weather_node.node_id,
        edge_types::HAS_WEATHER,
        signal.kind.source_system(),
      )
    })
    .await
    .map_err(EngineError::store)?;

  if category.is_instrument() {
    // Claim promotion protocol: DRAFT, bind, then flip to FACT.
    let claim = store
      .insert_claim(NewClaim {
        confidence: 0.9,
        event_time_start: observation
          .observation_time
          .or(Some(signal.evidence.retrieved_at)),
        ..NewClaim::draft(
          airport.node_id,
          format!(
            "WeatherRisk: {} conditions at {}",
            category.as_str(),
            airport.identifier
          ),
        )
      })
      .await
      .map_err(EngineError::store)?;
    store
      .bind_claim_evidence(claim.claim_id, signal.evidence.evidence_id)
      .await
      .map_err(EngineError::store)?;
    let claim = store
      .promote_claim(claim.claim_id)
      .await
      .map_err(EngineError::store)?;
    out.claims.push(claim);
  }

  out.metar = Some(MetarSignal {
    edge_id:      edge.edge_id,
    observation,
    retrieved_at: signal.evidence.retrieved_at,
  });
  out.edges.push(edge);
  Ok(())
}

/// TAF → `HAS_FORECAST` edge whose validity window is the forecast window.
async fn derive_taf<S: GraphStore>(
  store: &S,
  airport: &Node,
  signal: &IngestedSignal,
  out: &mut DerivedSignals,
) -> Result<()> {
  let forecast = parse_taf(&signal.bytes)?;
  let forecast_node = signal_node(
    store,
    node_types::WEATHER_FORECAST,
    &airport.identifier,
    "taf",
  )
  .await?;

  let edge = store
    .insert_edge(NewEdge {
      attrs: json!({
        "raw_taf": forecast.raw_text,
        "periods": forecast.periods,
      }),
      status: EdgeStatus::Fact,
      evidence: vec![signal.evidence.evidence_id],
      event_time_start: forecast.valid_from,
      event_time_end: forecast.valid_to,
      valid_from: forecast.valid_from,
      valid_to: forecast.valid_to,
      confidence: 0.80,
      ..NewEdge::draft(
        airport.node_id,
        forecast_node.node_id,
        edge_types::HAS_FORECAST,
        signal.kind.source_system(),
      )
    })
    .await
    .map_err(EngineError::store)?;

  out.edges.push(edge);
  Ok(())
}

/// NWS alerts → one `HAS_ALERT` edge per alert; Severe/Extreme alerts are
/// FACT, the rest stay DRAFT (evidence bound either way).
async fn derive_nws<S: GraphStore>(
  store: &S,
  airport: &Node,
  signal: &IngestedSignal,
  out: &mut DerivedSignals,
) -> Result<()> {
  let feed = parse_nws(&signal.bytes)?;
  let alert_node =
    signal_node(store, node_types::ALERT, &airport.identifier, "nws").await?;

  for alert in &feed.alerts {
    let severe = alert.is_severe();
    let edge = store
      .insert_edge(NewEdge {
        attrs: json!({
          "event": alert.event,
          "severity": alert.severity,
          "certainty": alert.certainty,
          "urgency": alert.urgency,
          "headline": alert.headline,
        }),
        status: if severe { EdgeStatus::Fact } else { EdgeStatus::Draft },
        evidence: vec![signal.evidence.evidence_id],
        event_time_start: alert
          .effective
          .or(Some(signal.evidence.retrieved_at)),
        event_time_end: alert.expires,
        confidence: 0.85,
        ..NewEdge::draft(
          airport.node_id,
          alert_node.node_id,
          edge_types::HAS_ALERT,
          signal.kind.source_system(),
        )
      })
      .await
      .map_err(EngineError::store)?;

    out.alerts.push((edge.edge_id, severe));
    out.edges.push(edge);
  }
  Ok(())
}

/// ADS-B → `HAS_MOVEMENT` edge, plus a `MovementCollapse` FACT claim when
/// the count drops strictly below half the baseline.
async fn derive_adsb<S: GraphStore>(
  store: &S,
  airport: &Node,
  signal: &IngestedSignal,
  baseline: f64,
  out: &mut DerivedSignals,
) -> Result<()> {
  let snapshot = parse_adsb(&signal.bytes)?;
  let count = f64::from(snapshot.aircraft_count);
  let collapsed = movement_collapsed(snapshot.aircraft_count, baseline);
  let delta_percent = if baseline > 0.0 {
    ((count - baseline) / baseline * 1000.0).round() / 10.0
  } else {
    0.0
  };

  let movement_node = signal_node(
    store,
    node_types::MOVEMENT_SNAPSHOT,
    &airport.identifier,
    "adsb",
  )
  .await?;

  let edge = store
    .insert_edge(NewEdge {
      attrs: json!({
        "aircraft_count": snapshot.aircraft_count,
        "baseline": baseline,
        "delta_percent": delta_percent,
        "collapsed": collapsed,
      }),
      status: EdgeStatus::Fact,
      evidence: vec![signal.evidence.evidence_id],
      event_time_start: snapshot
        .captured_at
        .or(Some(signal.evidence.retrieved_at)),
      confidence: 0.70,
      ..NewEdge::draft(
        airport.node_id,
        movement_node.node_id,
        edge_types::HAS_MOVEMENT,
        signal.kind.source_system(),
      )
    })
    .await
    .map_err(EngineError::store)?;

  if collapsed {
    let claim = store
      .insert_claim(NewClaim {
        status: ClaimStatus::Fact,
        confidence: 0.7,
        evidence: vec![signal.evidence.evidence_id],
        event_time_start: snapshot
          .captured_at
          .or(Some(signal.evidence.retrieved_at)),
        ..NewClaim::draft(
          airport.node_id,
          format!(
            "MovementCollapse: {} aircraft vs baseline {baseline:.0} at {}",
            snapshot.aircraft_count, airport.identifier
          ),
        )
      })
      .await
      .map_err(EngineError::store)?;
    out.claims.push(claim);
  }

  out.movement = Some(MovementSignal {
    edge_id: edge.edge_id,
    snapshot,
    baseline,
    collapsed,
    retrieved_at: signal.evidence.retrieved_at,
  });
  out.edges.push(edge);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn collapse_boundary_is_strict() {
    // 55 is exactly half of 110: no collapse.
    assert!(!movement_collapsed(55, 110.0));
    assert!(movement_collapsed(54, 110.0));
    assert!(movement_collapsed(0, 110.0));
    assert!(!movement_collapsed(70, 100.0));
  }
}
