use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::RetryPolicy;
use crate::error::{DeliveryError, Result};

#[derive(Debug, Clone)]
pub struct WebhookTarget {
    pub url: String,
    /// Sent as `Authorization: Bearer <token>` when present.
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub attempts: u32,
    pub status: u16,
}

/// Posts JSON payloads to a webhook with bounded retries.
///
/// Network errors, 5xx and 429 are retried with backoff up to `max_attempts`.
/// Any other non-2xx answer is permanent and returned after one attempt.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl WebhookDispatcher {
    pub fn new(policy: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(policy.request_timeout)
            .build()?;
        Ok(Self { client, policy })
    }

    pub async fn dispatch<T: Serialize + ?Sized>(
        &self,
        target: &WebhookTarget,
        payload: &T,
    ) -> std::result::Result<DeliveryReceipt, DeliveryError> {
        let body = serde_json::to_vec(payload).map_err(|e| DeliveryError::Encode(e.to_string()))?;
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let mut req = self
                .client
                .post(&target.url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
            if let Some(token) = &target.auth_token {
                req = req.bearer_auth(token);
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        info!(
                            "[WEBHOOK] delivered to {} on attempt {attempt}/{max_attempts} (HTTP {})",
                            target.url,
                            status.as_u16()
                        );
                        return Ok(DeliveryReceipt { attempts: attempt, status: status.as_u16() });
                    }
                    let retryable = status.is_server_error() || status.as_u16() == 429;
                    let text = resp.text().await.unwrap_or_default();
                    let text: String = text.chars().take(500).collect();
                    if !retryable {
                        warn!(
                            "[WEBHOOK] {} rejected payload with HTTP {}: {text}",
                            target.url,
                            status.as_u16()
                        );
                        return Err(DeliveryError::Permanent { status: status.as_u16(), body: text });
                    }
                    last_error = format!("HTTP {}: {text}", status.as_u16());
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            warn!("[WEBHOOK] attempt {attempt}/{max_attempts} to {} failed: {last_error}", target.url);
            if attempt < max_attempts {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }

        Err(DeliveryError::Exhausted { attempts: max_attempts, last_error })
    }

    fn backoff(&self, failed_attempt: u32) -> Duration {
        let idx = (failed_attempt as usize).saturating_sub(1);
        let ms = self
            .policy
            .backoff_ms
            .get(idx)
            .or(self.policy.backoff_ms.last())
            .copied()
            .unwrap_or(0);
        Duration::from_millis(ms)
    }
}
