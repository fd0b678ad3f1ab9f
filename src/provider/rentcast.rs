use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::PROVIDER_PAGE_LIMIT;
use crate::error::{AppError, Result};
use crate::provider::MarketDataProvider;
use crate::types::{Comparable, ComparableStatus, ListingQuery};

/// RentCast REST client. One request per call, no retries: a stale answer is
/// worse than a fast failure for a user-facing analysis.
pub struct RentCastProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RentCastProvider {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get_json(&self, path: &str, params: &[(&str, String)]) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .query(params)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("rentcast {path}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let body_short: String = body.chars().take(200).collect();
            return Err(AppError::UpstreamUnavailable(format!(
                "rentcast {path} returned HTTP {}: {body_short}",
                status.as_u16()
            )));
        }

        // A body that is not JSON is treated as an empty answer, not a failure.
        match resp.json::<serde_json::Value>().await {
            Ok(v) => Ok(v),
            Err(e) => {
                warn!("[RENTCAST] unparsable body from {path}: {e}");
                Ok(serde_json::Value::Null)
            }
        }
    }
}

#[async_trait]
impl MarketDataProvider for RentCastProvider {
    async fn fetch_candidates(&self, query: &ListingQuery, radius: f64) -> Result<Vec<Comparable>> {
        let params = [
            ("address", query.full_address()),
            ("bedrooms", query.bedrooms.to_string()),
            ("bathrooms", query.bathrooms.to_string()),
            ("propertyType", query.property_type.clone()),
            ("radius", radius.to_string()),
            ("limit", PROVIDER_PAGE_LIMIT.to_string()),
        ];
        let resp = self.get_json("/listings/rental/long-term", &params).await?;

        let Some(items) = resp.as_array() else {
            warn!("[RENTCAST] listings response was not an array, treating as empty");
            return Ok(Vec::new());
        };

        let candidates: Vec<Comparable> = items.iter().filter_map(parse_rental_listing).collect();
        debug!(
            "[RENTCAST] {} listings returned, {} parsed (radius={radius})",
            items.len(),
            candidates.len()
        );
        Ok(candidates)
    }

    async fn rent_estimate(&self, query: &ListingQuery) -> Result<Option<f64>> {
        let params = [("address", query.full_address())];
        let resp = self.get_json("/avm/rent/long-term", &params).await?;
        Ok(resp.get("rent").and_then(lenient_f64))
    }
}

/// Parse one RentCast rental listing. Returns `None` when the record lacks a field
/// the selector cannot do without (rent, rooms, property type, a known status).
/// Negative figures are upstream noise: a negative rent drops the record, a
/// negative footage is treated as unknown.
pub fn parse_rental_listing(v: &serde_json::Value) -> Option<Comparable> {
    let rent = v.get("price").and_then(lenient_f64).filter(|r| *r >= 0.0)?;
    let bedrooms = v.get("bedrooms").and_then(lenient_f64)?;
    let bathrooms = v.get("bathrooms").and_then(lenient_f64)?;
    let property_type = v.get("propertyType")?.as_str()?.to_string();
    let status = v
        .get("status")
        .and_then(|s| s.as_str())
        .and_then(ComparableStatus::from_provider)?;

    if bedrooms < 0.0 || bathrooms < 0.0 {
        return None;
    }

    let address = v
        .get("formattedAddress")
        .or_else(|| v.get("addressLine1"))
        .and_then(|a| a.as_str())
        .unwrap_or("")
        .to_string();

    let days_on_market = v
        .get("daysOnMarket")
        .and_then(lenient_f64)
        .filter(|d| *d >= 0.0)
        .map(|d| d as u32);

    Some(Comparable {
        address,
        latitude: v.get("latitude").and_then(lenient_f64),
        longitude: v.get("longitude").and_then(lenient_f64),
        distance_miles: v.get("distance").and_then(lenient_f64),
        property_type,
        bedrooms: bedrooms as u32,
        bathrooms,
        square_footage: v.get("squareFootage").and_then(lenient_f64).filter(|s| *s >= 0.0),
        rent,
        status,
        days_on_market,
        listed_date: v.get("listedDate").and_then(|d| d.as_str()).map(str::to_string),
        removed_date: v.get("removedDate").and_then(|d| d.as_str()).map(str::to_string),
    })
}

/// Numbers arrive either as JSON numbers or as numeric strings.
fn lenient_f64(v: &serde_json::Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|x: &f64| x.is_finite())
}
