//! Playbooks — mined action templates — and their retrieval scoring.
//!
//! Scoring is kept as pure functions so the decay and alignment math is unit
//! testable without a store. A playbook's relevance decays exponentially with
//! a domain-specific half-life, and drops further when the active policy set
//! has drifted from the snapshot taken at mining time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Domains ─────────────────────────────────────────────────────────────────

/// Decay domain. Weather patterns change fast; customs regimes change slowly.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PlaybookDomain {
  Weather,
  Operational,
  Customs,
}

impl PlaybookDomain {
  pub fn half_life_days(&self) -> f64 {
    match self {
      Self::Weather => 30.0,
      Self::Operational => 90.0,
      Self::Customs => 180.0,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Weather => "weather",
      Self::Operational => "operational",
      Self::Customs => "customs",
    }
  }
}

// ─── Rows ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PlaybookStats {
  pub use_count:     u32,
  pub success_count: u32,
}

impl PlaybookStats {
  pub fn success_rate(&self) -> f64 {
    if self.use_count == 0 {
      0.0
    } else {
      f64::from(self.success_count) / f64::from(self.use_count)
    }
  }
}

/// A mined, retrievable action template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
  pub playbook_id:     Uuid,
  pub name:            String,
  /// Matchable context: scope signature, evidence sources, contradiction
  /// kinds, risk level.
  pub pattern:         serde_json::Value,
  pub action_template: serde_json::Value,
  pub stats:           PlaybookStats,
  /// Sorted 12-hex prefixes of SHA-256 over the normalized texts of the
  /// policies active when the playbook was mined.
  pub policy_snapshot: Vec<String>,
  pub domain:          PlaybookDomain,
  pub created_at:      DateTime<Utc>,
  pub last_used_at:    Option<DateTime<Utc>>,
}

// ─── Scoring ─────────────────────────────────────────────────────────────────

/// `0.5 ^ (age_days / half_life_days)`. Exactly 0.5 at one half-life.
pub fn decay_factor(age_days: f64, half_life_days: f64) -> f64 {
  0.5_f64.powf(age_days.max(0.0) / half_life_days)
}

/// Age in days of a playbook, referenced from the more recent of creation
/// and last use: a playbook used yesterday is still fresh however old it is.
pub fn age_days(
  created_at: DateTime<Utc>,
  last_used_at: Option<DateTime<Utc>>,
  now: DateTime<Utc>,
) -> f64 {
  let reference = last_used_at.unwrap_or(created_at);
  (now - reference).num_seconds().max(0) as f64 / 86_400.0
}

/// Jaccard similarity between the mined-time policy snapshot and the current
/// active set. A legacy playbook with no snapshot scores 0.5.
pub fn policy_alignment(snapshot: &[String], current: &[String]) -> f64 {
  if snapshot.is_empty() && current.is_empty() {
    return 1.0;
  }
  if snapshot.is_empty() {
    return 0.5;
  }

  let snap: std::collections::HashSet<&str> =
    snapshot.iter().map(String::as_str).collect();
  let cur: std::collections::HashSet<&str> =
    current.iter().map(String::as_str).collect();

  let intersection = snap.intersection(&cur).count();
  let union = snap.union(&cur).count();
  if union == 0 {
    0.0
  } else {
    intersection as f64 / union as f64
  }
}

/// Ramp on sample size: one use gives 0.2, five or more give 1.0. Stops a
/// 1-for-1 playbook from outranking a 200-for-200 one.
pub fn sample_confidence(use_count: u32) -> f64 {
  (f64::from(use_count) / 5.0).min(1.0)
}

/// `success_rate × decay × policy_alignment × sample_confidence`, in [0, 1].
pub fn aged_score(playbook: &Playbook, current_snapshot: &[String], now: DateTime<Utc>) -> f64 {
  let age = age_days(playbook.created_at, playbook.last_used_at, now);
  let decay = decay_factor(age, playbook.domain.half_life_days());
  let alignment = policy_alignment(&playbook.policy_snapshot, current_snapshot);
  playbook.stats.success_rate()
    * decay
    * alignment
    * sample_confidence(playbook.stats.use_count)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decay_is_exactly_half_at_one_half_life() {
    assert!((decay_factor(30.0, 30.0) - 0.5).abs() < 1e-12);
    assert!((decay_factor(0.0, 30.0) - 1.0).abs() < 1e-12);
  }

  #[test]
  fn alignment_is_jaccard() {
    let snap = vec!["aaa".to_string(), "bbb".to_string()];
    let cur = vec!["bbb".to_string(), "ccc".to_string()];
    assert!((policy_alignment(&snap, &cur) - 1.0 / 3.0).abs() < 1e-12);
    assert!((policy_alignment(&snap, &snap) - 1.0).abs() < 1e-12);
  }

  #[test]
  fn legacy_playbook_gets_benefit_of_the_doubt() {
    let cur = vec!["abc".to_string()];
    assert!((policy_alignment(&[], &cur) - 0.5).abs() < 1e-12);
  }

  #[test]
  fn sample_confidence_ramp() {
    assert!((sample_confidence(1) - 0.2).abs() < 1e-12);
    assert!((sample_confidence(5) - 1.0).abs() < 1e-12);
    assert!((sample_confidence(200) - 1.0).abs() < 1e-12);
  }
}
