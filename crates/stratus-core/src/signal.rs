//! External signal capabilities and their vocabulary.
//!
//! The HTTP clients for FAA/NWS/METAR/TAF/ADS-B and the LLM providers live
//! outside this system. They are abstracted here as [`SignalSource`] (raw
//! bytes plus a source timestamp) and [`RiskAssessor`] (belief state in,
//! structured risk record out).

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
  action::RiskLevel,
  case::{Criticality, Posture},
};

// ─── Signal kinds ────────────────────────────────────────────────────────────

/// The fixed set of disruption-signal feeds consulted per airport.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
  FaaNas,
  Metar,
  Taf,
  NwsAlerts,
  Adsb,
}

impl SignalKind {
  pub const ALL: [SignalKind; 5] = [
    Self::FaaNas,
    Self::Metar,
    Self::Taf,
    Self::NwsAlerts,
    Self::Adsb,
  ];

  /// The `source_system` tag stamped on evidence and edges from this feed.
  pub fn source_system(&self) -> &'static str {
    match self {
      Self::FaaNas => "FAA_NAS",
      Self::Metar => "METAR",
      Self::Taf => "TAF",
      Self::NwsAlerts => "NWS_ALERTS",
      Self::Adsb => "ADSB",
    }
  }

  /// How badly a failed fetch of this feed hurts the decision.
  pub fn criticality(&self) -> Criticality {
    match self {
      Self::FaaNas | Self::Metar => Criticality::Blocking,
      Self::Taf | Self::NwsAlerts => Criticality::Degraded,
      Self::Adsb => Criticality::Informational,
    }
  }
}

// ─── Flight category ─────────────────────────────────────────────────────────

/// FAA flight category, from best to worst conditions.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlightCategory {
  Vfr,
  Mvfr,
  Ifr,
  Lifr,
}

impl FlightCategory {
  /// Published FAA boundaries. Ceiling in feet AGL, visibility in statute
  /// miles; the worse of the two governs.
  pub fn from_conditions(
    visibility_miles: Option<f64>,
    ceiling_feet: Option<f64>,
  ) -> Self {
    let vis = visibility_miles.unwrap_or(10.0);
    let ceil = ceiling_feet.unwrap_or(f64::MAX);

    if vis < 1.0 || ceil < 500.0 {
      Self::Lifr
    } else if vis < 3.0 || ceil < 1000.0 {
      Self::Ifr
    } else if vis <= 5.0 || ceil <= 3000.0 {
      Self::Mvfr
    } else {
      Self::Vfr
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Vfr => "VFR",
      Self::Mvfr => "MVFR",
      Self::Ifr => "IFR",
      Self::Lifr => "LIFR",
    }
  }

  /// IFR and LIFR warrant a weather-risk claim.
  pub fn is_instrument(&self) -> bool {
    matches!(self, Self::Ifr | Self::Lifr)
  }
}

// ─── SignalSource ────────────────────────────────────────────────────────────

/// One successful fetch: raw payload bytes plus source timestamps. Parsing
/// and interpretation happen downstream, against the persisted bytes.
#[derive(Debug, Clone)]
pub struct SignalFetch {
  pub kind:             SignalKind,
  pub source_ref:       String,
  pub content_type:     String,
  pub bytes:            Vec<u8>,
  pub retrieved_at:     DateTime<Utc>,
  pub event_time_start: Option<DateTime<Utc>>,
  pub event_time_end:   Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Error)]
pub enum SourceError {
  /// Network timeout or 5xx; worth retrying on a later run.
  #[error("transient source failure: {0}")]
  Transient(String),

  /// 4xx or malformed payload; not retryable for this case.
  #[error("permanent source failure: {0}")]
  Permanent(String),

  /// Per-call deadline exceeded.
  #[error("source timed out after {0} seconds")]
  Timeout(u64),
}

/// Capability: fetch raw disruption-signal bytes for one airport.
pub trait SignalSource: Send + Sync {
  fn fetch(
    &self,
    kind: SignalKind,
    icao: &str,
  ) -> impl Future<Output = Result<SignalFetch, SourceError>> + Send;
}

// ─── RiskAssessor ────────────────────────────────────────────────────────────

/// Per-source penalty applied while computing decision confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidencePenalty {
  pub factor:  String,
  pub penalty: f64,
}

/// How confident the system is in its posture and why.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
  pub sources_ok:      Vec<String>,
  pub sources_missing: Vec<String>,
  pub penalties:       Vec<ConfidencePenalty>,
  pub confidence:      f64,
  pub explanation:     String,
}

/// Structured output of a risk assessment. Never free-form control flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskRecord {
  pub risk_level:          RiskLevel,
  pub recommended_posture: Posture,
  pub breakdown:           ConfidenceBreakdown,
}

#[derive(Debug, Clone, Error)]
pub enum AssessorError {
  #[error("risk assessor unavailable: {0}")]
  Unavailable(String),

  #[error("risk assessor timed out after {0} seconds")]
  Timeout(u64),

  #[error("risk assessor returned an unusable record: {0}")]
  Malformed(String),
}

/// Capability: turn a belief state into a structured risk record.
pub trait RiskAssessor: Send + Sync {
  fn assess(
    &self,
    belief: &crate::policy::BeliefState,
  ) -> impl Future<Output = Result<RiskRecord, AssessorError>> + Send;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn flight_category_boundaries() {
    // Exactly 1 mile / 500 ft is IFR, not LIFR.
    assert_eq!(
      FlightCategory::from_conditions(Some(1.0), Some(500.0)),
      FlightCategory::Ifr
    );
    assert_eq!(
      FlightCategory::from_conditions(Some(0.5), None),
      FlightCategory::Lifr
    );
    assert_eq!(
      FlightCategory::from_conditions(Some(4.0), Some(2500.0)),
      FlightCategory::Mvfr
    );
    assert_eq!(
      FlightCategory::from_conditions(Some(10.0), Some(5000.0)),
      FlightCategory::Vfr
    );
  }

  #[test]
  fn fetch_criticality_table() {
    assert_eq!(SignalKind::FaaNas.criticality(), Criticality::Blocking);
    assert_eq!(SignalKind::Metar.criticality(), Criticality::Blocking);
    assert_eq!(SignalKind::Taf.criticality(), Criticality::Degraded);
    assert_eq!(SignalKind::NwsAlerts.criticality(), Criticality::Degraded);
    assert_eq!(SignalKind::Adsb.criticality(), Criticality::Informational);
  }
}
