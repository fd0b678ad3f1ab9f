use crate::config::ConfidencePolicy;
use crate::error::{AppError, Result};
use crate::types::{Comparable, ComparableSet, ComparableStatus, Confidence, MarketStats};

/// Reduces a comparable set into market statistics. Each metric is averaged over
/// the comparables that report it, so a missing field only drops that comparable
/// from that one metric.
pub struct StatisticsAggregator {
    policy: ConfidencePolicy,
}

impl StatisticsAggregator {
    pub fn new(policy: ConfidencePolicy) -> Self {
        Self { policy }
    }

    /// Fails only on malformed comparables (non-finite or negative rent, negative
    /// footage). An empty set yields `sample_size == 0`, all averages `None`, and
    /// `Confidence::Low`.
    pub fn aggregate(&self, set: &ComparableSet) -> Result<MarketStats> {
        validate(&set.comparables)?;
        let comps = &set.comparables;

        let rents: Vec<f64> = comps.iter().map(|c| c.rent).collect();
        let doms: Vec<f64> = comps
            .iter()
            .filter_map(|c| c.days_on_market.map(f64::from))
            .collect();
        let per_sqft: Vec<f64> = comps.iter().filter_map(Comparable::rent_per_sqft).collect();

        let active: Vec<&Comparable> = comps
            .iter()
            .filter(|c| c.status == ComparableStatus::Active)
            .collect();
        let rented: Vec<&Comparable> = comps
            .iter()
            .filter(|c| c.status == ComparableStatus::Rented)
            .collect();

        let sample_size = comps.len();
        let rent_cv = coefficient_of_variation(&rents);

        Ok(MarketStats {
            sample_size,
            avg_rent: mean(&rents),
            median_rent: median(&rents),
            rent_range_low: rents.iter().copied().reduce(f64::min),
            rent_range_high: rents.iter().copied().reduce(f64::max),
            avg_days_on_market: mean(&doms),
            median_days_on_market: median(&doms),
            avg_rent_per_sqft: mean(&per_sqft),
            active_count: active.len(),
            rented_count: rented.len(),
            active_pct: percent(active.len(), sample_size),
            rented_pct: percent(rented.len(), sample_size),
            avg_rent_active: mean_of(&active, |c| Some(c.rent)),
            avg_rent_rented: mean_of(&rented, |c| Some(c.rent)),
            avg_days_on_market_active: mean_of(&active, |c| c.days_on_market.map(f64::from)),
            avg_days_on_market_rented: mean_of(&rented, |c| c.days_on_market.map(f64::from)),
            avg_rent_per_sqft_active: mean_of(&active, Comparable::rent_per_sqft),
            avg_rent_per_sqft_rented: mean_of(&rented, Comparable::rent_per_sqft),
            rent_cv,
            confidence: self.confidence(sample_size, rent_cv),
            requested_radius: set.requested_radius,
            radius_used: set.radius_used,
            radii_tried: set.radii_tried.clone(),
        })
    }

    /// `Low` below the minimum viable sample; `High` at or above the high-confidence
    /// sample with rent CV under the dispersion threshold; `Medium` otherwise.
    pub fn confidence(&self, sample_size: usize, rent_cv: Option<f64>) -> Confidence {
        if sample_size < self.policy.min_viable_sample || sample_size == 0 {
            return Confidence::Low;
        }
        let tight = rent_cv.is_some_and(|cv| cv < self.policy.max_rent_cv);
        if sample_size >= self.policy.high_confidence_sample && tight {
            Confidence::High
        } else {
            Confidence::Medium
        }
    }
}

fn validate(comps: &[Comparable]) -> Result<()> {
    for c in comps {
        if !c.rent.is_finite() || c.rent < 0.0 {
            return Err(AppError::Validation(format!(
                "comparable {} has invalid rent {}",
                c.address, c.rent
            )));
        }
        if let Some(sqft) = c.square_footage {
            if !sqft.is_finite() || sqft < 0.0 {
                return Err(AppError::Validation(format!(
                    "comparable {} has invalid square footage {sqft}",
                    c.address
                )));
            }
        }
    }
    Ok(())
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn mean_of(comps: &[&Comparable], metric: impl Fn(&Comparable) -> Option<f64>) -> Option<f64> {
    let values: Vec<f64> = comps.iter().filter_map(|c| metric(c)).collect();
    mean(&values)
}

/// Even-length samples average the two middle values.
fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Population std-dev over mean. Undefined for an empty sample or a zero mean.
fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    if mean == 0.0 {
        return None;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt() / mean)
}

fn percent(part: usize, whole: usize) -> Option<f64> {
    if whole == 0 {
        None
    } else {
        Some(part as f64 / whole as f64 * 100.0)
    }
}
