//! Webhook endpoints and delivery records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events that can be delivered to registered endpoints.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookEventType {
  PostureChange,
  ActionExecuted,
  CaseResolved,
  SlaBreachImminent,
}

impl WebhookEventType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::PostureChange => "POSTURE_CHANGE",
      Self::ActionExecuted => "ACTION_EXECUTED",
      Self::CaseResolved => "CASE_RESOLVED",
      Self::SlaBreachImminent => "SLA_BREACH_IMMINENT",
    }
  }
}

/// A registered destination. Registration validates the URL against private
/// address ranges before this row ever exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
  pub webhook_id: Uuid,
  pub name:       String,
  pub url:        String,
  pub events:     Vec<WebhookEventType>,
  pub enabled:    bool,
  pub created_at: DateTime<Utc>,
}

/// One delivery attempt log row; at-least-once semantics, so an event may
/// produce several of these per endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
  pub delivery_id:  Uuid,
  pub webhook_id:   Uuid,
  pub event_type:   WebhookEventType,
  pub case_id:      Option<Uuid>,
  pub payload:      serde_json::Value,
  pub attempts:     u32,
  pub last_status:  Option<u16>,
  pub last_error:   Option<String>,
  pub success:      bool,
  pub delivered_at: DateTime<Utc>,
}
