use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::health::HealthSnapshot;
use crate::dispatch::DeliveryReceipt;
use crate::error::{AppError, DeliveryError};
use crate::service::{LeasingService, MarketReport, ShowingsPayload, SyndicationPayload};
use crate::syndication::CatalogEntry;
use crate::types::{ListingQuery, ShowingsRequest, SyndicationListing};

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<LeasingService>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(get_health))
        .route("/health", get(get_health))
        .route("/analyze-market", post(post_analyze_market))
        .route("/check-syndication", post(post_check_syndication))
        .route("/catalog", get(get_catalog))
        .route("/sync-showings", post(post_sync_showings))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    #[serde(flatten)]
    pub counters: HealthSnapshot,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DeliveryView {
    Delivered { attempts: u32, http_status: u16 },
    Skipped,
    Failed { error: String },
}

impl From<Option<Result<DeliveryReceipt, DeliveryError>>> for DeliveryView {
    fn from(d: Option<Result<DeliveryReceipt, DeliveryError>>) -> Self {
        match d {
            None => DeliveryView::Skipped,
            Some(Ok(r)) => DeliveryView::Delivered { attempts: r.attempts, http_status: r.status },
            Some(Err(e)) => DeliveryView::Failed { error: e.to_string() },
        }
    }
}

#[derive(Serialize)]
pub struct MarketResponse {
    pub report: MarketReport,
    pub delivery: DeliveryView,
}

#[derive(Serialize)]
pub struct SyndicationResponse {
    #[serde(flatten)]
    pub payload: SyndicationPayload,
    pub delivery: DeliveryView,
}

#[derive(Serialize)]
pub struct ShowingsResponse {
    #[serde(flatten)]
    pub payload: ShowingsPayload,
    pub delivery: DeliveryView,
}

#[derive(Serialize)]
pub struct CatalogResponse {
    pub total: usize,
    pub primary: usize,
    pub platforms: Vec<CatalogEntry>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        status: "healthy",
        counters: state.service.health().snapshot(),
    })
}

async fn post_analyze_market(
    State(state): State<ApiState>,
    Json(query): Json<ListingQuery>,
) -> Result<Json<MarketResponse>, AppError> {
    let analysis = state.service.analyze_market(query).await?;
    Ok(Json(MarketResponse {
        report: analysis.report,
        delivery: analysis.delivery.into(),
    }))
}

async fn post_check_syndication(
    State(state): State<ApiState>,
    Json(listing): Json<SyndicationListing>,
) -> Result<Json<SyndicationResponse>, AppError> {
    let analysis = state.service.check_syndication(listing).await?;
    Ok(Json(SyndicationResponse {
        payload: analysis.report,
        delivery: analysis.delivery.into(),
    }))
}

async fn post_sync_showings(
    State(state): State<ApiState>,
    Json(request): Json<ShowingsRequest>,
) -> Result<Json<ShowingsResponse>, AppError> {
    let analysis = state.service.sync_showings(request).await?;
    Ok(Json(ShowingsResponse {
        payload: analysis.report,
        delivery: analysis.delivery.into(),
    }))
}

async fn get_catalog(State(state): State<ApiState>) -> Json<CatalogResponse> {
    let catalog = state.service.prober().catalog();
    Json(CatalogResponse {
        total: catalog.len(),
        primary: catalog.primary_count(),
        platforms: catalog.entries().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_view_labels() {
        assert_eq!(DeliveryView::from(None), DeliveryView::Skipped);

        let delivered = serde_json::to_value(DeliveryView::from(Some(Ok(DeliveryReceipt {
            attempts: 2,
            status: 200,
        }))))
        .unwrap();
        assert_eq!(delivered["status"], "delivered");
        assert_eq!(delivered["attempts"], 2);

        let failed = DeliveryView::from(Some(Err(DeliveryError::Exhausted {
            attempts: 3,
            last_error: "HTTP 503: ".to_string(),
        })));
        let failed = serde_json::to_value(failed).unwrap();
        assert_eq!(failed["status"], "failed");
        assert!(failed["error"].as_str().unwrap().contains("3 attempt"));
    }
}
