//! Deterministic risk assessment.
//!
//! [`HeuristicRiskAssessor`] is a rule table over the belief state: the
//! default assessor in scenario mode and tests, and the shape the external
//! LLM-backed assessor must produce. The orchestrator also leans on
//! [`degraded_fallback`] when the external assessor fails or times out.

use stratus_core::{
  action::RiskLevel,
  case::Posture,
  policy::BeliefState,
  signal::{
    AssessorError, ConfidenceBreakdown, ConfidencePenalty, FlightCategory,
    RiskAssessor, RiskRecord, SignalKind,
  },
};

/// Posture is capped at RESTRICT below this confidence even at LOW risk.
const ACCEPT_CONFIDENCE_FLOOR: f64 = 0.85;

/// Rule-based scoring over the belief's signal summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicRiskAssessor;

impl HeuristicRiskAssessor {
  fn score(belief: &BeliefState) -> u32 {
    let mut score = 0u32;

    score += match belief.faa_disruption_kind.as_deref() {
      Some("CLOSURE") => 5,
      Some("GROUND_STOP") => 4,
      Some("DELAY") => 2,
      _ => 0,
    };

    score += match belief.flight_category {
      Some(FlightCategory::Lifr) => 2,
      Some(FlightCategory::Ifr) => 1,
      _ => 0,
    };

    if belief.severe_alert_count > 0 {
      score += 2;
    }
    if belief.movement_collapsed {
      score += 1;
    }
    if belief.open_contradictions > 0 {
      score += 1;
    }

    score
  }

  fn risk_from_score(score: u32) -> RiskLevel {
    match score {
      0..=1 => RiskLevel::Low,
      2..=5 => RiskLevel::Medium,
      6..=9 => RiskLevel::High,
      _ => RiskLevel::Critical,
    }
  }

  fn breakdown(belief: &BeliefState) -> ConfidenceBreakdown {
    let mut confidence: f64 = 0.9;
    let mut penalties = Vec::new();

    let missing_penalty = 0.15 * belief.missing_degraded as f64
      + 0.10 * belief.missing_informational as f64
      + 0.30 * belief.missing_blocking as f64;
    if missing_penalty > 0.0 {
      penalties.push(ConfidencePenalty {
        factor:  "missing_sources".into(),
        penalty: missing_penalty,
      });
      confidence -= missing_penalty;
    }

    if belief.open_contradictions > 0 {
      let penalty = 0.05 * belief.open_contradictions as f64;
      penalties.push(ConfidencePenalty {
        factor:  "open_contradictions".into(),
        penalty,
      });
      confidence -= penalty;
    }

    let sources_ok = belief.evidence_sources.clone();
    let sources_missing: Vec<String> = SignalKind::ALL
      .iter()
      .map(|k| k.source_system().to_owned())
      .filter(|s| !sources_ok.contains(s))
      .collect();

    let explanation = if penalties.is_empty() {
      "All required sources reported; no open contradictions.".to_owned()
    } else {
      format!(
        "Confidence degraded: {} source(s) missing, {} open \
         contradiction(s).",
        sources_missing.len(),
        belief.open_contradictions
      )
    };

    ConfidenceBreakdown {
      sources_ok,
      sources_missing,
      penalties,
      confidence: confidence.clamp(0.0, 1.0),
      explanation,
    }
  }
}

impl RiskAssessor for HeuristicRiskAssessor {
  async fn assess(
    &self,
    belief: &BeliefState,
  ) -> Result<RiskRecord, AssessorError> {
    let risk_level = Self::risk_from_score(Self::score(belief));
    let breakdown = Self::breakdown(belief);

    let mut recommended_posture = match risk_level {
      RiskLevel::Low => Posture::Accept,
      RiskLevel::Medium => Posture::Restrict,
      RiskLevel::High => Posture::Hold,
      RiskLevel::Critical => Posture::Escalate,
    };

    // Thin source coverage never yields an ACCEPT recommendation.
    if recommended_posture == Posture::Accept
      && breakdown.confidence < ACCEPT_CONFIDENCE_FLOOR
    {
      recommended_posture = Posture::Restrict;
    }

    Ok(RiskRecord { risk_level, recommended_posture, breakdown })
  }
}

/// The fallback record when the external assessor is unavailable: HIGH risk,
/// HOLD, and a heavy DEGRADED penalty on confidence.
pub fn degraded_fallback(belief: &BeliefState, reason: &str) -> RiskRecord {
  let mut breakdown = HeuristicRiskAssessor::breakdown(belief);
  breakdown.penalties.push(ConfidencePenalty {
    factor:  "assessor_unavailable".into(),
    penalty: 0.4,
  });
  breakdown.confidence = (breakdown.confidence - 0.4).clamp(0.0, 1.0);
  breakdown.explanation =
    format!("Risk assessor unavailable ({reason}); defaulting to HIGH risk.");

  RiskRecord {
    risk_level:          RiskLevel::High,
    recommended_posture: Posture::Hold,
    breakdown,
  }
}

#[cfg(test)]
mod tests {
  use uuid::Uuid;

  use super::*;

  fn belief() -> BeliefState {
    let mut belief = BeliefState::new(Uuid::new_v4());
    belief.evidence_sources = SignalKind::ALL
      .iter()
      .map(|k| k.source_system().to_owned())
      .collect();
    belief.evidence_count = 5;
    belief
  }

  #[tokio::test]
  async fn ground_stop_with_lifr_and_collapse_is_high_hold() {
    let mut b = belief();
    b.faa_disruption_kind = Some("GROUND_STOP".into());
    b.flight_category = Some(FlightCategory::Lifr);
    b.severe_alert_count = 1;
    b.movement_collapsed = true;

    let record = HeuristicRiskAssessor.assess(&b).await.unwrap();
    assert_eq!(record.risk_level, RiskLevel::High);
    assert_eq!(record.recommended_posture, Posture::Hold);
  }

  #[tokio::test]
  async fn contradictory_signals_land_at_restrict() {
    let mut b = belief();
    b.faa_disruption_kind = Some("NORMAL".into());
    b.flight_category = Some(FlightCategory::Lifr);
    b.movement_collapsed = true;
    b.open_contradictions = 2;

    let record = HeuristicRiskAssessor.assess(&b).await.unwrap();
    assert_eq!(record.risk_level, RiskLevel::Medium);
    assert_eq!(record.recommended_posture, Posture::Restrict);
  }

  #[tokio::test]
  async fn benign_signals_accept_at_low_risk() {
    let mut b = belief();
    b.faa_disruption_kind = Some("NORMAL".into());
    b.flight_category = Some(FlightCategory::Vfr);

    let record = HeuristicRiskAssessor.assess(&b).await.unwrap();
    assert_eq!(record.risk_level, RiskLevel::Low);
    assert_eq!(record.recommended_posture, Posture::Accept);
  }

  #[tokio::test]
  async fn missing_informational_source_caps_posture_at_restrict() {
    let mut b = belief();
    b.faa_disruption_kind = Some("NORMAL".into());
    b.flight_category = Some(FlightCategory::Vfr);
    b.evidence_sources.retain(|s| s != "ADSB");
    b.missing_informational = 1;

    let record = HeuristicRiskAssessor.assess(&b).await.unwrap();
    assert_eq!(record.risk_level, RiskLevel::Low);
    assert_eq!(record.recommended_posture, Posture::Restrict);
    assert!(record.breakdown.confidence < 0.85);
  }

  #[test]
  fn fallback_is_high_hold_with_degraded_confidence() {
    let record = degraded_fallback(&belief(), "timeout after 30s");
    assert_eq!(record.risk_level, RiskLevel::High);
    assert_eq!(record.recommended_posture, Posture::Hold);
    assert!(record
      .breakdown
      .penalties
      .iter()
      .any(|p| p.factor == "assessor_unavailable"));
  }
}
