use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::showings::ShowingsProvider;
use crate::types::{Showing, ShowingsWindow};

/// ShowMojo report-export client. Logs in with email and password, caches the
/// bearer token and logs in again once when the token is rejected.
pub struct ShowMojoClient {
    client: reqwest::Client,
    base_url: String,
    email: String,
    password: String,
    token: Mutex<Option<String>>,
}

impl ShowMojoClient {
    pub fn new(base_url: String, email: String, password: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            email,
            password,
            token: Mutex::new(None),
        })
    }

    async fn login(&self) -> Result<String> {
        let resp = self
            .client
            .post(format!("{}/auth/login", self.base_url))
            .json(&json!({ "email": self.email, "password": self.password }))
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("showmojo login: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "showmojo login returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("showmojo login body: {e}")))?;
        let token = body
            .get("token")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::UpstreamUnavailable("showmojo login returned no token".to_string()))?;

        info!("[SHOWMOJO] authenticated as {}", self.email);
        Ok(token.to_string())
    }

    /// Cached token, logging in when there is none.
    async fn token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(t) = cached.as_ref() {
            return Ok(t.clone());
        }
        let fresh = self.login().await?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    /// Drop `stale` unless another caller already replaced it.
    async fn invalidate(&self, stale: &str) {
        let mut cached = self.token.lock().await;
        if cached.as_deref() == Some(stale) {
            *cached = None;
        }
    }

    async fn request_report(
        &self,
        token: &str,
        window: ShowingsWindow,
        property_id: Option<&str>,
    ) -> Result<reqwest::Response> {
        let mut params = vec![
            ("start_date", window.start_date.format("%Y-%m-%d").to_string()),
            ("end_date", window.end_date.format("%Y-%m-%d").to_string()),
        ];
        if let Some(id) = property_id {
            params.push(("property_id", id.to_string()));
        }

        self.client
            .get(format!("{}/reports/prospect_showing_data", self.base_url))
            .bearer_auth(token)
            .query(&params)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("showmojo report: {e}")))
    }
}

#[async_trait]
impl ShowingsProvider for ShowMojoClient {
    async fn fetch_showings(
        &self,
        window: ShowingsWindow,
        property_id: Option<&str>,
    ) -> Result<Vec<Showing>> {
        let token = self.token().await?;
        let mut resp = self.request_report(&token, window, property_id).await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            warn!("[SHOWMOJO] token rejected, re-authenticating");
            self.invalidate(&token).await;
            let token = self.token().await?;
            resp = self.request_report(&token, window, property_id).await?;
        }

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let body_short: String = body.chars().take(200).collect();
            return Err(AppError::UpstreamUnavailable(format!(
                "showmojo report returned HTTP {}: {body_short}",
                status.as_u16()
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("showmojo report body: {e}")))?;
        let showings = parse_showings(&body);
        debug!(
            "[SHOWMOJO] {} showings for {}..{}",
            showings.len(),
            window.start_date,
            window.end_date
        );
        Ok(showings)
    }
}

/// The report is either a bare array or an object holding the array under
/// `showings`, `data` or `results`. Non-object items are skipped.
pub fn parse_showings(body: &Value) -> Vec<Showing> {
    let items = match body {
        Value::Array(items) => Some(items),
        Value::Object(_) => ["showings", "data", "results"]
            .iter()
            .filter_map(|k| body.get(*k).and_then(|v| v.as_array()))
            .find(|a| !a.is_empty()),
        _ => None,
    };

    items
        .into_iter()
        .flatten()
        .filter(|item| item.is_object())
        .map(parse_showing)
        .collect()
}

fn parse_showing(item: &Value) -> Showing {
    Showing {
        showing_id: text(item, &["id", "showing_id"]),
        property_id: text(item, &["property_id"]),
        property_address: text(item, &["property_address", "address"]),
        prospect_name: text(item, &["prospect_name", "name"]),
        prospect_email: text(item, &["prospect_email", "email"]),
        prospect_phone: text(item, &["prospect_phone", "phone"]),
        showing_date: text(item, &["showing_date", "date"]),
        showing_time: text(item, &["showing_time", "time"]),
        status: text(item, &["status"]),
        confirmed: item.get("confirmed").and_then(Value::as_bool).unwrap_or(false),
        attended: item.get("attended").and_then(Value::as_bool),
        cancelled: item.get("cancelled").and_then(Value::as_bool).unwrap_or(false),
        notes: text(item, &["notes"]),
        created_at: text(item, &["created_at"]),
        updated_at: text(item, &["updated_at"]),
    }
}

/// First key holding a non-empty string or a number.
fn text(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match item.get(*k)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
