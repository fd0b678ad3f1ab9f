pub mod rentcast;

pub use rentcast::RentCastProvider;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::types::{Comparable, ListingQuery};

/// Source of raw comparable candidates for a subject listing.
///
/// Implementations return whatever the upstream produced, unfiltered. An empty or
/// partially unparsable response is `Ok` with fewer items; `Err` means the call
/// itself failed.
#[async_trait]
pub trait MarketDataProvider: Send + Sync + 'static {
    async fn fetch_candidates(&self, query: &ListingQuery, radius: f64) -> Result<Vec<Comparable>>;

    /// Point rent estimate for the subject, if the provider offers one.
    async fn rent_estimate(&self, query: &ListingQuery) -> Result<Option<f64>>;
}

/// Stand-in when no provider credentials are configured. Every call is
/// `UpstreamUnavailable`, so analyses fail fast instead of reporting an empty market.
pub struct UnconfiguredProvider;

#[async_trait]
impl MarketDataProvider for UnconfiguredProvider {
    async fn fetch_candidates(&self, _query: &ListingQuery, _radius: f64) -> Result<Vec<Comparable>> {
        Err(AppError::UpstreamUnavailable(
            "market data provider is not configured (RENTCAST_API_KEY)".to_string(),
        ))
    }

    async fn rent_estimate(&self, _query: &ListingQuery) -> Result<Option<f64>> {
        Ok(None)
    }
}
