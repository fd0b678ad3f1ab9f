use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::health::ServiceHealth;
use crate::comparables::{ComparableSelector, StatisticsAggregator};
use crate::config::REPORT_COMPARABLES_LIMIT;
use crate::dispatch::{DeliveryReceipt, WebhookDispatcher, WebhookTarget};
use crate::error::{DeliveryError, Result};
use crate::provider::MarketDataProvider;
use crate::recommend::RecommendationRanker;
use crate::showings::ShowingsProvider;
use crate::syndication::SyndicationProber;
use crate::types::{
    Comparable, ComparableSet, ComparableStatus, ListingQuery, MarketStats, Recommendation,
    Showing, ShowingsRequest, ShowingsWindow, SyndicationListing, SyndicationReport,
};

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparableSummary {
    pub address: String,
    pub rent: f64,
    pub rent_per_sqft: Option<f64>,
    pub bedrooms: u32,
    pub bathrooms: f64,
    pub square_footage: Option<f64>,
    pub days_on_market: Option<u32>,
    pub status: ComparableStatus,
    pub distance_miles: Option<f64>,
}

impl From<&Comparable> for ComparableSummary {
    fn from(c: &Comparable) -> Self {
        Self {
            address: c.address.clone(),
            rent: c.rent,
            rent_per_sqft: c.rent_per_sqft().map(round2),
            bedrooms: c.bedrooms,
            bathrooms: c.bathrooms,
            square_footage: c.square_footage,
            days_on_market: c.days_on_market,
            status: c.status,
            distance_miles: c.distance_miles,
        }
    }
}

/// Market analysis result attached to the originating listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketReport {
    pub listing_id: String,
    #[serde(flatten)]
    pub stats: MarketStats,
    pub rent_estimate: Option<f64>,
    pub listing_rent_per_sqft: Option<f64>,
    /// Subject rent relative to the market average, in percent.
    pub rent_vs_market_pct: Option<f64>,
    pub dom_vs_market_pct: Option<f64>,
    pub comparables: Vec<ComparableSummary>,
}

/// Syndication result attached to the originating listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyndicationPayload {
    pub listing_id: String,
    #[serde(flatten)]
    pub report: SyndicationReport,
    pub recommendations: Vec<Recommendation>,
}

/// Showings pulled for one sync request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowingsPayload {
    pub sync_timestamp: DateTime<Utc>,
    pub days_back: u32,
    pub property_id: Option<String>,
    #[serde(flatten)]
    pub window: ShowingsWindow,
    pub total_showings: usize,
    pub showings: Vec<Showing>,
}

/// `delivery` is `None` when no webhook target is configured. A delivery error
/// never invalidates `report`.
#[derive(Debug)]
pub struct Analysis<T> {
    pub report: T,
    pub delivery: Option<std::result::Result<DeliveryReceipt, DeliveryError>>,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Where each payload kind is delivered. `None` skips delivery.
#[derive(Debug, Clone, Default)]
pub struct WebhookTargets {
    pub market: Option<WebhookTarget>,
    pub syndication: Option<WebhookTarget>,
    pub showings: Option<WebhookTarget>,
}

pub struct LeasingService {
    provider: Arc<dyn MarketDataProvider>,
    showings: Arc<dyn ShowingsProvider>,
    selector: ComparableSelector,
    aggregator: StatisticsAggregator,
    prober: SyndicationProber,
    ranker: RecommendationRanker,
    dispatcher: WebhookDispatcher,
    targets: WebhookTargets,
    health: Arc<ServiceHealth>,
}

impl LeasingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        showings: Arc<dyn ShowingsProvider>,
        selector: ComparableSelector,
        aggregator: StatisticsAggregator,
        prober: SyndicationProber,
        ranker: RecommendationRanker,
        dispatcher: WebhookDispatcher,
        targets: WebhookTargets,
        health: Arc<ServiceHealth>,
    ) -> Self {
        Self {
            provider,
            showings,
            selector,
            aggregator,
            prober,
            ranker,
            dispatcher,
            targets,
            health,
        }
    }

    pub fn health(&self) -> &ServiceHealth {
        &self.health
    }

    pub fn prober(&self) -> &SyndicationProber {
        &self.prober
    }

    /// Validate → select comparables → aggregate → deliver.
    pub async fn analyze_market(&self, query: ListingQuery) -> Result<Analysis<MarketReport>> {
        self.health.inc_market_analyses();
        let result = self.compute_market_report(&query).await;
        let report = match result {
            Ok(r) => r,
            Err(e) => {
                self.health.inc_analysis_failures();
                warn!(listing_id = %query.listing_id, "Market analysis failed: {e}");
                return Err(e);
            }
        };
        self.health.set_last_completed_at_ns(now_ns());

        info!(
            listing_id = %report.listing_id,
            sample_size = report.stats.sample_size,
            confidence = %report.stats.confidence,
            radius_used = report.stats.radius_used,
            "Market analysis complete: {} comparables within {} mi, confidence {}",
            report.stats.sample_size,
            report.stats.radius_used,
            report.stats.confidence,
        );

        let delivery = self.deliver_market(&report).await;
        Ok(Analysis { report, delivery })
    }

    async fn compute_market_report(&self, query: &ListingQuery) -> Result<MarketReport> {
        query.validate(self.selector.policy())?;

        let (set, estimate) = tokio::join!(
            self.selector.select(query, self.provider.as_ref()),
            self.provider.rent_estimate(query),
        );
        let set = set?;
        if set.is_empty() {
            warn!(
                listing_id = %query.listing_id,
                "No comparables found (radii tried: {:?} mi)",
                set.radii_tried,
            );
        } else if set.was_expanded() {
            info!(
                listing_id = %query.listing_id,
                requested_radius = set.requested_radius,
                radius_used = set.radius_used,
                "Radius expanded from {} mi to {} mi ({} comparables)",
                set.requested_radius,
                set.radius_used,
                set.len(),
            );
        }
        let rent_estimate = estimate.unwrap_or_else(|e| {
            warn!(listing_id = %query.listing_id, "Rent estimate unavailable: {e}");
            None
        });

        let stats = self.aggregator.aggregate(&set)?;
        Ok(build_market_report(query, &set, stats, rent_estimate))
    }

    /// Probe every platform → rank gaps → deliver.
    pub async fn check_syndication(
        &self,
        listing: SyndicationListing,
    ) -> Result<Analysis<SyndicationPayload>> {
        self.health.inc_syndication_checks();
        if let Err(e) = listing.validate() {
            self.health.inc_analysis_failures();
            return Err(e);
        }

        let report = self.prober.probe(&listing).await;
        let recommendations = self.ranker.rank(&report, &listing).await;
        self.health.set_last_completed_at_ns(now_ns());

        info!(
            listing_id = %listing.listing_id,
            "Syndication check complete: {}/{} found, {} recommendations",
            report.found,
            report.total,
            recommendations.len(),
        );

        let payload = SyndicationPayload {
            listing_id: listing.listing_id,
            report,
            recommendations,
        };
        let delivery = self.deliver_syndication(&payload).await;
        Ok(Analysis { report: payload, delivery })
    }

    /// Fetch the showings for the request's window → deliver.
    pub async fn sync_showings(&self, request: ShowingsRequest) -> Result<Analysis<ShowingsPayload>> {
        self.health.inc_showings_syncs();
        let result = self.fetch_showings(&request).await;
        let payload = match result {
            Ok(p) => p,
            Err(e) => {
                self.health.inc_analysis_failures();
                warn!(days_back = request.days_back, "Showings sync failed: {e}");
                return Err(e);
            }
        };
        self.health.set_last_completed_at_ns(now_ns());

        info!(
            total_showings = payload.total_showings,
            "Showings sync complete: {} showings from {} to {}",
            payload.total_showings,
            payload.window.start_date,
            payload.window.end_date,
        );

        let delivery = self.deliver_showings(&payload).await;
        Ok(Analysis { report: payload, delivery })
    }

    async fn fetch_showings(&self, request: &ShowingsRequest) -> Result<ShowingsPayload> {
        request.validate()?;
        let sync_timestamp = Utc::now();
        let window = ShowingsWindow::ending_on(sync_timestamp.date_naive(), request.days_back);
        let showings = self
            .showings
            .fetch_showings(window, request.property_id.as_deref())
            .await?;

        Ok(ShowingsPayload {
            sync_timestamp,
            days_back: request.days_back,
            property_id: request.property_id.clone(),
            window,
            total_showings: showings.len(),
            showings,
        })
    }

    /// Can be called again later to re-dispatch a report whose delivery failed.
    pub async fn deliver_market(
        &self,
        report: &MarketReport,
    ) -> Option<std::result::Result<DeliveryReceipt, DeliveryError>> {
        self.deliver(self.targets.market.as_ref(), report).await
    }

    pub async fn deliver_syndication(
        &self,
        payload: &SyndicationPayload,
    ) -> Option<std::result::Result<DeliveryReceipt, DeliveryError>> {
        self.deliver(self.targets.syndication.as_ref(), payload).await
    }

    pub async fn deliver_showings(
        &self,
        payload: &ShowingsPayload,
    ) -> Option<std::result::Result<DeliveryReceipt, DeliveryError>> {
        self.deliver(self.targets.showings.as_ref(), payload).await
    }

    async fn deliver<T: Serialize>(
        &self,
        target: Option<&WebhookTarget>,
        payload: &T,
    ) -> Option<std::result::Result<DeliveryReceipt, DeliveryError>> {
        let target = target?;
        let result = self.dispatcher.dispatch(target, payload).await;
        self.health.record_delivery(result.is_ok());
        if let Err(e) = &result {
            warn!("[WEBHOOK] delivery to {} failed: {e}", target.url);
        }
        Some(result)
    }
}

pub fn build_market_report(
    query: &ListingQuery,
    set: &ComparableSet,
    stats: MarketStats,
    rent_estimate: Option<f64>,
) -> MarketReport {
    let listing_rent_per_sqft =
        (query.square_footage > 0.0).then(|| round2(query.current_rent / query.square_footage));
    let rent_vs_market_pct = stats
        .avg_rent
        .filter(|avg| *avg > 0.0)
        .map(|avg| round2((query.current_rent - avg) / avg * 100.0));
    let dom_vs_market_pct = stats
        .avg_days_on_market
        .filter(|avg| *avg > 0.0)
        .map(|avg| round2((query.days_on_market as f64 - avg) / avg * 100.0));

    MarketReport {
        listing_id: query.listing_id.clone(),
        stats,
        rent_estimate,
        listing_rent_per_sqft,
        rent_vs_market_pct,
        dom_vs_market_pct,
        comparables: set
            .comparables
            .iter()
            .take(REPORT_COMPARABLES_LIMIT)
            .map(ComparableSummary::from)
            .collect(),
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparables::selector::tests::{comp, query};
    use crate::config::{ConfidencePolicy, ContentPolicy, ProbePolicy, RetryPolicy, SelectionPolicy};
    use crate::error::AppError;
    use crate::llm::NoopTextGenerator;
    use crate::provider::rentcast::parse_rental_listing;
    use crate::syndication::catalog::tests::listing;
    use crate::syndication::checker::tests::spawn_server;
    use crate::syndication::checker::{ProbeError, PresenceCheck};
    use crate::syndication::{CatalogEntry, SyndicationCatalog};
    use crate::types::{CheckStrategy, Confidence, ProbeOutcome, Tier};
    use async_trait::async_trait;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct StubProvider {
        pool: Vec<Comparable>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketDataProvider for StubProvider {
        async fn fetch_candidates(&self, _query: &ListingQuery, radius: f64) -> Result<Vec<Comparable>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .pool
                .iter()
                .filter(|c| c.distance_miles.is_some_and(|d| d <= radius))
                .cloned()
                .collect())
        }

        async fn rent_estimate(&self, _query: &ListingQuery) -> Result<Option<f64>> {
            Err(AppError::UpstreamUnavailable("avm down".to_string()))
        }
    }

    struct NamePrefixChecker;

    #[async_trait]
    impl PresenceCheck for NamePrefixChecker {
        async fn check(
            &self,
            entry: &CatalogEntry,
            _listing: &SyndicationListing,
        ) -> std::result::Result<ProbeOutcome, ProbeError> {
            if entry.strategy == CheckStrategy::Manual {
                return Err(ProbeError::NoStrategy);
            }
            Ok(if entry.name.starts_with('Z') { ProbeOutcome::Found } else { ProbeOutcome::NotFound })
        }
    }

    struct StubShowings {
        windows: StdMutex<Vec<(ShowingsWindow, Option<String>)>>,
    }

    #[async_trait]
    impl ShowingsProvider for StubShowings {
        async fn fetch_showings(
            &self,
            window: ShowingsWindow,
            property_id: Option<&str>,
        ) -> Result<Vec<Showing>> {
            self.windows.lock().unwrap().push((window, property_id.map(str::to_string)));
            Ok(vec![
                Showing { showing_id: Some("1".to_string()), confirmed: true, ..Showing::default() },
                Showing { showing_id: Some("2".to_string()), cancelled: true, ..Showing::default() },
            ])
        }
    }

    fn service(pool: Vec<Comparable>) -> (LeasingService, Arc<StubProvider>) {
        let (svc, provider, _) = service_with(pool, WebhookTargets::default());
        (svc, provider)
    }

    fn service_with(
        pool: Vec<Comparable>,
        targets: WebhookTargets,
    ) -> (LeasingService, Arc<StubProvider>, Arc<StubShowings>) {
        let provider = Arc::new(StubProvider { pool, calls: AtomicUsize::new(0) });
        let showings = Arc::new(StubShowings { windows: StdMutex::new(Vec::new()) });
        let prober = SyndicationProber::new(
            Arc::new(SyndicationCatalog::builtin()),
            Arc::new(NamePrefixChecker),
            ProbePolicy::default(),
        );
        let svc = LeasingService::new(
            provider.clone(),
            showings.clone(),
            ComparableSelector::new(SelectionPolicy::default()),
            StatisticsAggregator::new(ConfidencePolicy::default()),
            prober,
            RecommendationRanker::new(Arc::new(NoopTextGenerator), ContentPolicy::default()),
            WebhookDispatcher::new(RetryPolicy::default()).unwrap(),
            targets,
            Arc::new(ServiceHealth::new()),
        );
        (svc, provider, showings)
    }

    #[tokio::test]
    async fn market_report_compares_subject_to_market() {
        let pool = vec![
            comp("1 St", 0.1, 1500.0),
            comp("2 St", 0.2, 1500.0),
            comp("3 St", 0.3, 1500.0),
        ];
        let (svc, _) = service(pool);

        let analysis = svc.analyze_market(query(0.5)).await.unwrap();
        let report = analysis.report;

        assert!(analysis.delivery.is_none());
        assert_eq!(report.stats.sample_size, 3);
        assert_eq!(report.stats.confidence, Confidence::Medium);
        assert_eq!(report.rent_vs_market_pct, Some(10.0));
        assert_eq!(report.dom_vs_market_pct, Some(25.0));
        assert_eq!(report.listing_rent_per_sqft, Some(1.1));
        assert_eq!(report.rent_estimate, None);
        assert_eq!(report.comparables.len(), 3);
        assert_eq!(svc.health().snapshot().market_analyses, 1);
    }

    #[tokio::test]
    async fn empty_market_reports_nulls_not_zeros() {
        let (svc, _) = service(Vec::new());

        let report = svc.analyze_market(query(0.5)).await.unwrap().report;

        assert_eq!(report.stats.sample_size, 0);
        assert_eq!(report.stats.confidence, Confidence::Low);
        assert_eq!(report.stats.radius_used, 5.0);
        assert_eq!(report.rent_vs_market_pct, None);
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["avg_rent"].is_null());
        assert!(json["avg_days_on_market"].is_null());
        assert!(json["dom_vs_market_pct"].is_null());
    }

    #[tokio::test]
    async fn malformed_provider_record_does_not_fail_analysis() {
        let bad = parse_rental_listing(&serde_json::json!({
            "addressLine1": "9 Bad St",
            "distance": 0.4,
            "propertyType": "Single Family",
            "bedrooms": 3,
            "bathrooms": 2,
            "price": 1500,
            "squareFootage": -1,
            "status": "Active"
        }))
        .unwrap();
        let pool = vec![comp("1 St", 0.1, 1500.0), comp("2 St", 0.2, 1500.0), comp("3 St", 0.3, 1500.0), bad];
        let (svc, _) = service(pool);

        let report = svc.analyze_market(query(0.5)).await.unwrap().report;

        assert_eq!(report.stats.sample_size, 4);
        assert_eq!(report.stats.avg_rent_per_sqft, Some(1.0));
        let bad = report.comparables.iter().find(|c| c.address == "9 Bad St").unwrap();
        assert_eq!(bad.rent_per_sqft, None);
    }

    #[tokio::test]
    async fn invalid_query_is_rejected_before_provider_call() {
        let (svc, provider) = service(Vec::new());
        let mut bad = query(0.5);
        bad.radius = 12.0;

        let err = svc.analyze_market(bad).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(svc.health().snapshot().analysis_failures, 1);
    }

    #[tokio::test]
    async fn identical_input_yields_identical_payloads() {
        let pool = vec![comp("1 St", 0.1, 1400.0), comp("2 St", 0.2, 1600.0), comp("3 St", 0.3, 1800.0)];
        let (svc, _) = service(pool);

        let a = svc.analyze_market(query(0.5)).await.unwrap().report;
        let b = svc.analyze_market(query(0.5)).await.unwrap().report;
        assert_eq!(a, b);

        let s1 = svc.check_syndication(listing()).await.unwrap().report;
        let s2 = svc.check_syndication(listing()).await.unwrap().report;
        assert_eq!(s1, s2);
    }

    #[tokio::test]
    async fn syndication_payload_accounts_for_every_platform() {
        let (svc, _) = service(Vec::new());

        let payload = svc.check_syndication(listing()).await.unwrap().report;

        assert_eq!(payload.listing_id, "listing-1");
        assert_eq!(payload.report.total, 29);
        // Zillow and Zumper found; the other four primaries are gaps.
        assert_eq!(payload.report.primary_found, 2);
        let top: Vec<_> = payload.recommendations.iter().take(4).map(|r| r.priority).collect();
        assert_eq!(top, vec![100, 100, 100, 100]);
        assert!(payload
            .report
            .results
            .iter()
            .filter(|r| r.tier == Tier::Secondary && r.outcome == ProbeOutcome::Unknown)
            .all(|r| r.error.as_deref() == Some("no automated check for this platform")));
    }

    #[tokio::test]
    async fn showings_sync_delivers_window_and_records() {
        let received: Arc<StdMutex<Vec<serde_json::Value>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let app = Router::new().route(
            "/showings",
            post(move |Json(body): Json<serde_json::Value>| async move {
                sink.lock().unwrap().push(body);
                StatusCode::OK
            }),
        );
        let base = spawn_server(app).await;
        let targets = WebhookTargets {
            showings: Some(WebhookTarget { url: format!("{base}/showings"), auth_token: None }),
            ..WebhookTargets::default()
        };
        let (svc, _, showings) = service_with(Vec::new(), targets);

        let request = ShowingsRequest { days_back: 7, property_id: Some("prop-9".to_string()) };
        let analysis = svc.sync_showings(request).await.unwrap();

        assert_eq!(analysis.delivery.unwrap().unwrap().attempts, 1);
        let payload = analysis.report;
        assert_eq!(payload.total_showings, 2);
        assert_eq!(payload.window.end_date - payload.window.start_date, chrono::Duration::days(7));

        let (window, property_id) = showings.windows.lock().unwrap()[0].clone();
        assert_eq!(window, payload.window);
        assert_eq!(property_id.as_deref(), Some("prop-9"));

        let body = received.lock().unwrap()[0].clone();
        assert_eq!(body["total_showings"], 2);
        assert_eq!(body["days_back"], 7);
        assert_eq!(body["start_date"], payload.window.start_date.to_string());
        assert_eq!(body["showings"][1]["cancelled"], true);
        assert_eq!(svc.health().snapshot().showings_syncs, 1);
    }

    #[tokio::test]
    async fn invalid_showings_request_is_rejected_before_fetch() {
        let (svc, _, showings) = service_with(Vec::new(), WebhookTargets::default());

        let err = svc
            .sync_showings(ShowingsRequest { days_back: 0, property_id: None })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(showings.windows.lock().unwrap().is_empty());
    }
}
