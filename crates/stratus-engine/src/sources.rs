//! Typed views over raw signal payloads.
//!
//! The evidence store keeps the raw bytes; these types are how the engine
//! reads them. Parsing is strict about shape but lenient about optional
//! fields — a source that omits a value simply yields `None`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stratus_core::signal::FlightCategory;

use crate::{EngineError, Result};

/// FAA NAS status flags for one airport. An all-false payload means normal
/// operations and still produces a graph edge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaaNasStatus {
  #[serde(default)]
  pub delay:             bool,
  #[serde(default)]
  pub ground_stop:       bool,
  #[serde(default)]
  pub closure:           bool,
  pub delay_type:        Option<String>,
  pub reason:            Option<String>,
  pub avg_delay_minutes: Option<f64>,
  /// When the status window is expected to end, per the FAA feed.
  pub end_time:          Option<DateTime<Utc>>,
}

impl FaaNasStatus {
  pub fn has_disruption(&self) -> bool {
    self.delay || self.ground_stop || self.closure
  }

  /// `GROUND_STOP` / `CLOSURE` / `DELAY` / `NORMAL`, strongest first.
  pub fn kind(&self) -> &'static str {
    if self.closure {
      "CLOSURE"
    } else if self.ground_stop {
      "GROUND_STOP"
    } else if self.delay {
      "DELAY"
    } else {
      "NORMAL"
    }
  }
}

/// One METAR observation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetarObservation {
  pub station:          Option<String>,
  pub flight_category:  Option<FlightCategory>,
  pub visibility_miles: Option<f64>,
  pub ceiling_feet:     Option<f64>,
  pub wind_speed_kt:    Option<f64>,
  pub wind_gust_kt:     Option<f64>,
  /// Present-weather string, e.g. `SN`, `TSRA`.
  pub weather:          Option<String>,
  pub observation_time: Option<DateTime<Utc>>,
  pub raw_text:         Option<String>,
}

impl MetarObservation {
  /// The reported category, or one derived from visibility/ceiling via the
  /// published FAA boundaries.
  pub fn category(&self) -> FlightCategory {
    self.flight_category.unwrap_or_else(|| {
      FlightCategory::from_conditions(self.visibility_miles, self.ceiling_feet)
    })
  }

  /// LOW / MEDIUM / HIGH weather severity, derived from category, dangerous
  /// phenomena, and wind.
  pub fn severity(&self) -> &'static str {
    if self.category().is_instrument() {
      return "HIGH";
    }
    let weather = self.weather.as_deref().unwrap_or("");
    if ["TS", "GR", "FC", "SS", "DS"].iter().any(|wx| weather.contains(wx)) {
      return "HIGH";
    }
    let wind = self.wind_speed_kt.unwrap_or(0.0);
    let gust = self.wind_gust_kt.unwrap_or(0.0);
    if gust >= 35.0 || wind >= 25.0 {
      return "HIGH";
    }
    if gust >= 25.0 || wind >= 15.0 {
      return "MEDIUM";
    }
    if self.category() == FlightCategory::Mvfr {
      return "MEDIUM";
    }
    "LOW"
  }
}

/// A TAF forecast with its validity window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TafForecast {
  pub station:    Option<String>,
  pub valid_from: Option<DateTime<Utc>>,
  pub valid_to:   Option<DateTime<Utc>>,
  pub raw_text:   Option<String>,
  #[serde(default)]
  pub periods:    Vec<TafPeriod>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TafPeriod {
  pub from:             Option<DateTime<Utc>>,
  pub to:               Option<DateTime<Utc>>,
  pub flight_category:  Option<FlightCategory>,
  pub visibility_miles: Option<f64>,
  pub wind_speed_kt:    Option<f64>,
}

/// The NWS alerts payload: zero or more active alerts for the area.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NwsAlertFeed {
  #[serde(default)]
  pub alerts: Vec<NwsAlert>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NwsAlert {
  pub event:     Option<String>,
  /// NWS's own categorisation: Minor / Moderate / Severe / Extreme.
  pub severity:  Option<String>,
  pub certainty: Option<String>,
  pub urgency:   Option<String>,
  pub headline:  Option<String>,
  pub effective: Option<DateTime<Utc>>,
  pub expires:   Option<DateTime<Utc>>,
}

impl NwsAlert {
  /// Severe and Extreme alerts are promoted to FACT on derivation.
  pub fn is_severe(&self) -> bool {
    matches!(self.severity.as_deref(), Some("Severe") | Some("Extreme"))
  }
}

/// An ADS-B area snapshot: how many aircraft are currently in the airport's
/// bounding box.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdsbSnapshot {
  pub aircraft_count: u32,
  pub captured_at:    Option<DateTime<Utc>>,
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

fn parse<T: for<'de> Deserialize<'de>>(bytes: &[u8], what: &str) -> Result<T> {
  serde_json::from_slice(bytes).map_err(|e| {
    EngineError::Source(stratus_core::signal::SourceError::Permanent(format!(
      "malformed {what} payload: {e}"
    )))
  })
}

pub fn parse_faa(bytes: &[u8]) -> Result<FaaNasStatus> {
  parse(bytes, "FAA NAS")
}

pub fn parse_metar(bytes: &[u8]) -> Result<MetarObservation> {
  parse(bytes, "METAR")
}

pub fn parse_taf(bytes: &[u8]) -> Result<TafForecast> {
  parse(bytes, "TAF")
}

pub fn parse_nws(bytes: &[u8]) -> Result<NwsAlertFeed> {
  parse(bytes, "NWS alerts")
}

pub fn parse_adsb(bytes: &[u8]) -> Result<AdsbSnapshot> {
  parse(bytes, "ADS-B snapshot")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn faa_kind_prefers_strongest_flag() {
    let status = FaaNasStatus {
      delay: true,
      ground_stop: true,
      ..Default::default()
    };
    assert_eq!(status.kind(), "GROUND_STOP");
    assert!(status.has_disruption());
  }

  #[test]
  fn metar_severity_from_wind() {
    let metar = MetarObservation {
      visibility_miles: Some(10.0),
      ceiling_feet: Some(5000.0),
      wind_speed_kt: Some(18.0),
      ..Default::default()
    };
    assert_eq!(metar.severity(), "MEDIUM");

    let gusty = MetarObservation { wind_gust_kt: Some(40.0), ..metar };
    assert_eq!(gusty.severity(), "HIGH");
  }

  #[test]
  fn metar_category_derived_when_missing() {
    let metar = MetarObservation {
      visibility_miles: Some(0.5),
      ..Default::default()
    };
    assert_eq!(metar.category(), FlightCategory::Lifr);
  }

  #[test]
  fn malformed_payload_is_a_permanent_source_error() {
    let err = parse_faa(b"not json").unwrap_err();
    assert!(matches!(
      err,
      EngineError::Source(stratus_core::signal::SourceError::Permanent(_))
    ));
  }
}
