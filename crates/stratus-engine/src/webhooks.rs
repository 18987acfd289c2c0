//! Webhook dispatch: at-least-once POST notifications with an SSRF guard.
//!
//! Registration resolves the destination hostname and rejects private,
//! loopback, link-local, and ULA ranges. The same check runs again before
//! every POST so a DNS record that changed after registration cannot be
//! used to reach internal addresses.

use std::net::IpAddr;

use chrono::Utc;
use serde_json::json;

use stratus_core::{
  store::CaseStore,
  webhook::{WebhookDelivery, WebhookEndpoint, WebhookEventType},
};
use uuid::Uuid;

use crate::{EngineError, Result};

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 200;

pub struct WebhookDispatcher {
  client: reqwest::Client,
}

impl WebhookDispatcher {
  pub fn new(timeout_secs: u64) -> Self {
    let client = reqwest::Client::builder()
      .timeout(std::time::Duration::from_secs(timeout_secs))
      .build()
      .unwrap_or_default();
    Self { client }
  }

  /// Vet a URL and persist the registration.
  pub async fn register<S: CaseStore>(
    &self,
    store: &S,
    name: &str,
    url: &str,
    events: &[WebhookEventType],
  ) -> Result<WebhookEndpoint> {
    vet_url(url).await?;
    store
      .register_webhook(name, url, events)
      .await
      .map_err(EngineError::store)
  }

  /// Deliver one event to every subscribed endpoint. Failures are logged,
  /// never raised — a broken consumer must not fail the case.
  pub async fn dispatch<S: CaseStore>(
    &self,
    store: &S,
    event: WebhookEventType,
    case_id: Option<Uuid>,
    data: serde_json::Value,
  ) -> Result<usize> {
    let endpoints = store
      .webhooks_for_event(event)
      .await
      .map_err(EngineError::store)?;

    let payload = json!({
      "event_id": Uuid::new_v4(),
      "event_type": event.as_str(),
      "timestamp": Utc::now().to_rfc3339(),
      "case_id": case_id,
      "data": data,
    });

    let mut delivered = 0usize;
    for endpoint in endpoints {
      let delivery = self.deliver(&endpoint, event, case_id, &payload).await;
      if delivery.success {
        delivered += 1;
      } else {
        tracing::warn!(
          webhook = %endpoint.name,
          url = %endpoint.url,
          error = delivery.last_error.as_deref().unwrap_or("unknown"),
          "webhook delivery failed"
        );
      }
      store
        .log_webhook_delivery(delivery)
        .await
        .map_err(EngineError::store)?;
    }
    Ok(delivered)
  }

  async fn deliver(
    &self,
    endpoint: &WebhookEndpoint,
    event: WebhookEventType,
    case_id: Option<Uuid>,
    payload: &serde_json::Value,
  ) -> WebhookDelivery {
    let delivery_id = Uuid::new_v4();
    let mut attempts = 0u32;
    let mut last_status = None;
    let mut last_error = None;
    let mut success = false;

    // TOCTOU guard: the address is re-vetted at send time.
    if let Err(e) = vet_url(&endpoint.url).await {
      last_error = Some(e.to_string());
      attempts = 1;
    } else {
      while attempts < MAX_ATTEMPTS && !success {
        attempts += 1;
        match self.client.post(&endpoint.url).json(payload).send().await {
          Ok(response) => {
            last_status = Some(response.status().as_u16());
            if response.status().is_success() {
              success = true;
            } else {
              last_error = Some(format!("HTTP {}", response.status()));
            }
          }
          Err(e) => last_error = Some(e.to_string()),
        }

        if !success && attempts < MAX_ATTEMPTS {
          tokio::time::sleep(backoff(delivery_id, attempts)).await;
        }
      }
    }

    WebhookDelivery {
      delivery_id,
      webhook_id: endpoint.webhook_id,
      event_type: event,
      case_id,
      payload: payload.clone(),
      attempts,
      last_status,
      last_error,
      success,
      delivered_at: Utc::now(),
    }
  }
}

/// Exponential backoff with per-delivery jitter derived from the delivery
/// id, so synchronized failures don't retry in lockstep.
fn backoff(delivery_id: Uuid, attempt: u32) -> std::time::Duration {
  let base = BACKOFF_BASE_MS << attempt.min(4);
  let jitter = u64::from(delivery_id.as_bytes()[attempt as usize % 16]);
  std::time::Duration::from_millis(base + jitter)
}

// ─── SSRF guard ──────────────────────────────────────────────────────────────

/// Reject URLs that resolve (or point directly) to private address space.
pub async fn vet_url(url: &str) -> Result<()> {
  let parsed = reqwest::Url::parse(url)
    .map_err(|e| EngineError::WebhookRejected(format!("invalid url: {e}")))?;

  if !matches!(parsed.scheme(), "http" | "https") {
    return Err(EngineError::WebhookRejected(format!(
      "unsupported scheme {:?}",
      parsed.scheme()
    )));
  }

  let Some(host) = parsed.host_str() else {
    return Err(EngineError::WebhookRejected("url has no host".into()));
  };
  let port = parsed.port_or_known_default().unwrap_or(443);

  // IP literals are checked directly; hostnames are resolved and every
  // returned address must be public.
  if let Ok(ip) = host.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>()
  {
    return check_ip(ip, host);
  }

  let addresses = tokio::net::lookup_host((host, port))
    .await
    .map_err(|e| {
      EngineError::WebhookRejected(format!("cannot resolve {host}: {e}"))
    })?;

  let mut any = false;
  for address in addresses {
    any = true;
    check_ip(address.ip(), host)?;
  }
  if !any {
    return Err(EngineError::WebhookRejected(format!(
      "{host} resolved to no addresses"
    )));
  }
  Ok(())
}

fn check_ip(ip: IpAddr, host: &str) -> Result<()> {
  if is_private_address(ip) {
    return Err(EngineError::WebhookRejected(format!(
      "{host} resolves to private address {ip}"
    )));
  }
  Ok(())
}

/// 10/8, 172.16/12, 192.168/16, 127/8, link-local, unspecified, and the
/// IPv6 loopback / link-local / ULA ranges.
fn is_private_address(ip: IpAddr) -> bool {
  match ip {
    IpAddr::V4(v4) => {
      v4.is_private()
        || v4.is_loopback()
        || v4.is_link_local()
        || v4.is_unspecified()
        || v4.is_broadcast()
    }
    IpAddr::V6(v6) => {
      if let Some(mapped) = v6.to_ipv4_mapped() {
        return is_private_address(IpAddr::V4(mapped));
      }
      let segments = v6.segments();
      v6.is_loopback()
        || v6.is_unspecified()
        // fe80::/10 link-local
        || (segments[0] & 0xffc0) == 0xfe80
        // fc00::/7 unique local
        || (segments[0] & 0xfe00) == 0xfc00
    }
  }
}

/// Payload helpers for the events the orchestrator fires.
pub mod payloads {
  use serde_json::json;

  pub fn posture_change(
    airport: Option<&str>,
    new_posture: &str,
    previous: Option<&str>,
    risk_level: &str,
    confidence: f64,
    evidence_count: usize,
  ) -> serde_json::Value {
    json!({
      "airport": airport,
      "new_posture": new_posture,
      "previous_posture": previous,
      "risk_level": risk_level,
      "confidence": confidence,
      "evidence_count": evidence_count,
    })
  }

  pub fn action_executed(
    action_id: uuid::Uuid,
    action_type: &str,
    success: bool,
    result: &serde_json::Value,
  ) -> serde_json::Value {
    json!({
      "action_id": action_id,
      "action_type": action_type,
      "success": success,
      "result": result,
    })
  }

  pub fn case_resolved(
    final_posture: &str,
    status: &str,
    pdl_seconds: Option<f64>,
    evidence_count: usize,
  ) -> serde_json::Value {
    json!({
      "final_posture": final_posture,
      "status": status,
      "metrics": {
        "pdl_seconds": pdl_seconds,
        "evidence_count": evidence_count,
      },
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn rejects_private_and_loopback_literals() {
    for url in [
      "http://10.0.0.8/hook",
      "http://172.16.4.1/hook",
      "http://192.168.1.10/hook",
      "http://127.0.0.1:8080/hook",
      "http://169.254.169.254/latest/meta-data",
      "http://[::1]/hook",
      "http://[fd00::1]/hook",
      "http://[fe80::1]/hook",
    ] {
      assert!(vet_url(url).await.is_err(), "{url} should be rejected");
    }
  }

  #[tokio::test]
  async fn rejects_non_http_schemes() {
    assert!(vet_url("ftp://example.com/hook").await.is_err());
    assert!(vet_url("file:///etc/passwd").await.is_err());
  }

  #[tokio::test]
  async fn accepts_public_literals() {
    assert!(vet_url("https://93.184.216.34/hook").await.is_ok());
  }

  #[test]
  fn backoff_grows_with_attempts() {
    let id = Uuid::new_v4();
    assert!(backoff(id, 2) > backoff(id, 1));
  }
}
