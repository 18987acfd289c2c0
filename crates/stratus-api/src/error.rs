//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error body is the `{"detail": "..."}` shape.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;
use stratus_engine::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("engine error: {0}")]
  Engine(#[from] EngineError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn store<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Self::Store(Box::new(e))
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, detail) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Engine(EngineError::CaseNotFound(id)) => {
        (StatusCode::NOT_FOUND, format!("case {id} not found"))
      }
      ApiError::Engine(EngineError::WebhookRejected(m)) => {
        (StatusCode::BAD_REQUEST, m.clone())
      }
      ApiError::Engine(e) => {
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
      ApiError::Store(e) => {
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "detail": detail }))).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn errors_map_to_status_and_detail_shape() {
    let response = ApiError::NotFound("case x not found".into())
      .into_response();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let bytes = axum::body::to_bytes(response.into_body(), 1024)
      .await
      .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["detail"], "case x not found");
  }

  #[tokio::test]
  async fn rejected_webhook_is_a_bad_request() {
    let response =
      ApiError::Engine(EngineError::WebhookRejected("private ip".into()))
        .into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  }
}
