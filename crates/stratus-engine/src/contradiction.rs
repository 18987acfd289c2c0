//! Contradiction detection between derived signals.
//!
//! Runs after derivation, over the typed signal views of one INVESTIGATE
//! pass. Four fixed patterns; each hit persists an OPEN contradiction row
//! pairing the two offending edges.

use chrono::{DateTime, Duration, Utc};

use stratus_core::{graph::Contradiction, store::GraphStore};

use crate::{derive::DerivedSignals, EngineError, Result};

/// FAA data older than this while other sources are fresh is itself a
/// contradiction (the stale-FAA pattern).
pub const FAA_STALENESS_MINUTES: i64 = 15;

fn faa_staleness() -> Duration {
  Duration::minutes(FAA_STALENESS_MINUTES)
}

pub const FAA_WEATHER_MISMATCH: &str = "FAA_WEATHER_MISMATCH";
pub const FAA_MOVEMENT_MISMATCH: &str = "FAA_MOVEMENT_MISMATCH";
pub const WEATHER_MOVEMENT_MISMATCH: &str = "WEATHER_MOVEMENT_MISMATCH";
pub const STALE_FAA_DATA: &str = "STALE_FAA_DATA";

/// Detect and persist contradictions among one pass's signals. Returns the
/// OPEN rows created.
pub async fn detect_and_persist<S: GraphStore>(
  store: &S,
  signals: &DerivedSignals,
  now: DateTime<Utc>,
) -> Result<Vec<Contradiction>> {
  let mut found = Vec::new();

  let faa_normal = signals
    .faa
    .as_ref()
    .map(|f| !f.status.has_disruption())
    .unwrap_or(false);

  // FAA says normal, METAR says instrument conditions.
  if let (Some(faa), Some(metar)) = (&signals.faa, &signals.metar) {
    let category = metar.observation.category();
    if faa_normal && category.is_instrument() {
      found.push((
        faa.edge_id,
        metar.edge_id,
        FAA_WEATHER_MISMATCH,
        format!(
          "FAA reports normal operations but weather shows {} conditions",
          category.as_str()
        ),
      ));
    }
  }

  // FAA says normal, movement has collapsed.
  if let (Some(faa), Some(movement)) = (&signals.faa, &signals.movement) {
    if faa_normal && movement.collapsed {
      found.push((
        faa.edge_id,
        movement.edge_id,
        FAA_MOVEMENT_MISMATCH,
        format!(
          "FAA reports normal operations but aircraft count is {} vs \
           baseline {:.0}",
          movement.snapshot.aircraft_count, movement.baseline
        ),
      ));
    }
  }

  // Clear weather, movement has collapsed anyway.
  if let (Some(metar), Some(movement)) = (&signals.metar, &signals.movement) {
    let category = metar.observation.category();
    if category == stratus_core::signal::FlightCategory::Vfr
      && movement.collapsed
    {
      found.push((
        metar.edge_id,
        movement.edge_id,
        WEATHER_MOVEMENT_MISMATCH,
        format!(
          "Weather is VFR but aircraft count collapsed to {}",
          movement.snapshot.aircraft_count
        ),
      ));
    }
  }

  // FAA data is stale while at least one other source is fresh.
  if let Some(faa) = &signals.faa {
    let faa_age = now - faa.retrieved_at;
    let other_fresh = [
      signals.metar.as_ref().map(|m| m.retrieved_at),
      signals.movement.as_ref().map(|m| m.retrieved_at),
    ]
    .into_iter()
    .flatten()
    .any(|retrieved| now - retrieved <= faa_staleness());

    if faa_age > faa_staleness() && other_fresh {
      let fresh_edge = signals
        .metar
        .as_ref()
        .map(|m| m.edge_id)
        .or_else(|| signals.movement.as_ref().map(|m| m.edge_id))
        .unwrap_or(faa.edge_id);
      found.push((
        faa.edge_id,
        fresh_edge,
        STALE_FAA_DATA,
        format!(
          "FAA data is {} minutes old while other sources are fresh",
          faa_age.num_minutes()
        ),
      ));
    }
  }

  let mut rows = Vec::with_capacity(found.len());
  for (left, right, kind, explanation) in found {
    let row = store
      .insert_contradiction(left, right, kind, &explanation)
      .await
      .map_err(EngineError::store)?;
    rows.push(row);
  }
  Ok(rows)
}
