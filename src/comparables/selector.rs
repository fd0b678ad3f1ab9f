use std::collections::HashSet;

use tracing::{info, warn};

use crate::config::SelectionPolicy;
use crate::error::Result;
use crate::provider::MarketDataProvider;
use crate::types::{Comparable, ComparableSet, ListingQuery};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SelectionStats {
    pub candidates: usize,
    pub rejected_property_type: usize,
    pub rejected_bedrooms: usize,
    pub rejected_bathrooms: usize,
    pub rejected_distance: usize,
    pub rejected_duplicate: usize,
    pub kept: usize,
}

/// Turns raw provider candidates into a usable comparable pool, widening the
/// search radius while the pool is thinner than the minimum viable sample.
pub struct ComparableSelector {
    policy: SelectionPolicy,
}

impl ComparableSelector {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    /// Query the provider at the requested radius, then at doubled radii (capped at
    /// the policy maximum) until the pool reaches the minimum viable size.
    ///
    /// Only a failure of the first provider call is an error. A failed expansion
    /// keeps the pool gathered so far.
    pub async fn select(
        &self,
        query: &ListingQuery,
        provider: &dyn MarketDataProvider,
    ) -> Result<ComparableSet> {
        let requested = query.radius;
        let mut radius = requested;
        let mut radii_tried = vec![radius];

        let candidates = provider.fetch_candidates(query, radius).await?;
        let (mut pool, stats) = self.filter_candidates(query, candidates, radius);
        log_filter_stats(&query.listing_id, radius, &stats);

        while pool.len() < self.policy.min_viable_sample && radius < self.policy.max_radius_miles {
            let next = (radius * 2.0).min(self.policy.max_radius_miles);
            radii_tried.push(next);

            let candidates = match provider.fetch_candidates(query, next).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(
                        listing_id = %query.listing_id,
                        radius = next,
                        "Radius expansion to {next} mi failed, keeping {} comparables at {radius} mi: {e}",
                        pool.len(),
                    );
                    break;
                }
            };

            let (wider, stats) = self.filter_candidates(query, candidates, next);
            log_filter_stats(&query.listing_id, next, &stats);

            // A wider query can come back thinner when the provider caps its page.
            if wider.len() >= pool.len() {
                pool = wider;
                radius = next;
            } else {
                break;
            }
        }

        Ok(ComparableSet {
            query: query.clone(),
            comparables: pool,
            requested_radius: requested,
            radius_used: radius,
            radii_tried,
        })
    }

    /// Apply the filtering policy in order: property type, bedrooms, bathrooms,
    /// distance, then drop duplicate addresses. Survivors are ordered nearest first
    /// and capped at `max_comparables`.
    pub fn filter_candidates(
        &self,
        query: &ListingQuery,
        candidates: Vec<Comparable>,
        radius: f64,
    ) -> (Vec<Comparable>, SelectionStats) {
        let mut stats = SelectionStats {
            candidates: candidates.len(),
            ..SelectionStats::default()
        };
        let subject_type = normalize(&query.property_type);
        let tolerance = self.policy.room_tolerance;
        let mut seen_addresses = HashSet::new();
        let mut kept = Vec::with_capacity(candidates.len());

        for c in candidates {
            if normalize(&c.property_type) != subject_type {
                stats.rejected_property_type += 1;
                continue;
            }
            if (c.bedrooms as f64 - query.bedrooms as f64).abs() > tolerance {
                stats.rejected_bedrooms += 1;
                continue;
            }
            if (c.bathrooms - query.bathrooms).abs() > tolerance {
                stats.rejected_bathrooms += 1;
                continue;
            }
            match c.distance_miles {
                Some(d) if d >= 0.0 && d <= radius => {}
                _ => {
                    stats.rejected_distance += 1;
                    continue;
                }
            }
            let address_key = normalize(&c.address);
            if !address_key.is_empty() && !seen_addresses.insert(address_key) {
                stats.rejected_duplicate += 1;
                continue;
            }
            kept.push(c);
        }

        kept.sort_by(|a, b| {
            let da = a.distance_miles.unwrap_or(f64::MAX);
            let db = b.distance_miles.unwrap_or(f64::MAX);
            da.total_cmp(&db).then_with(|| a.address.cmp(&b.address))
        });
        kept.truncate(self.policy.max_comparables);
        stats.kept = kept.len();

        (kept, stats)
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn log_filter_stats(listing_id: &str, radius: f64, stats: &SelectionStats) {
    info!(
        "[FILTER] {listing_id} @ {radius} mi: {} candidates, kept={} rejected: property_type={} bedrooms={} bathrooms={} distance={} duplicate={}",
        stats.candidates,
        stats.kept,
        stats.rejected_property_type,
        stats.rejected_bedrooms,
        stats.rejected_bathrooms,
        stats.rejected_distance,
        stats.rejected_duplicate,
    );
}
