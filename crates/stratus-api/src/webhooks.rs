//! Handler for `POST /webhooks/register`.
//!
//! Registration is where the SSRF guard first fires: URLs resolving to
//! private address space are rejected with 400 before anything persists.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use stratus_core::{
  signal::{RiskAssessor, SignalSource},
  webhook::WebhookEventType,
};
use stratus_engine::{webhooks::WebhookDispatcher, DecisionStore};

use crate::{error::ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
  pub name:   String,
  pub url:    String,
  pub events: Vec<WebhookEventType>,
}

/// `POST /webhooks/register` — body:
/// `{"name":"ops","url":"https://...","events":["POSTURE_CHANGE"]}`
pub async fn register<S, Src, Ra>(
  State(state): State<AppState<S, Src, Ra>>,
  Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DecisionStore + 'static,
  Src: SignalSource + 'static,
  Ra: RiskAssessor + 'static,
{
  if body.events.is_empty() {
    return Err(ApiError::BadRequest(
      "at least one event type is required".into(),
    ));
  }

  let dispatcher = WebhookDispatcher::new(state.config.webhook_timeout_secs);
  let endpoint = dispatcher
    .register(state.store.as_ref(), &body.name, &body.url, &body.events)
    .await?;

  Ok((StatusCode::CREATED, Json(endpoint)))
}
