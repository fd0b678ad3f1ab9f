use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::config::{SelectionPolicy, SHOWINGS_DEFAULT_DAYS_BACK, SHOWINGS_MAX_DAYS_BACK};
use crate::error::{AppError, Result};

// ---------------------------------------------------------------------------
// Listing query
// ---------------------------------------------------------------------------

/// Subject listing for a market analysis. Immutable once validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingQuery {
    pub listing_id: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub bedrooms: u32,
    pub bathrooms: f64,
    pub square_footage: f64,
    pub current_rent: f64,
    pub days_on_market: u32,
    #[serde(default = "default_property_type")]
    pub property_type: String,
    /// Search radius in miles.
    #[serde(default = "default_radius")]
    pub radius: f64,
}

fn default_property_type() -> String {
    "Single Family".to_string()
}

fn default_radius() -> f64 {
    0.5
}

impl ListingQuery {
    /// "street, city, state" as the provider expects it.
    pub fn full_address(&self) -> String {
        format!("{}, {}, {}", self.address, self.city, self.state)
    }

    pub fn validate(&self, policy: &SelectionPolicy) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(AppError::Validation("address must not be empty".to_string()));
        }
        if self.property_type.trim().is_empty() {
            return Err(AppError::Validation("property_type must not be empty".to_string()));
        }
        if !self.current_rent.is_finite() || self.current_rent <= 0.0 {
            return Err(AppError::Validation(format!(
                "current_rent must be a positive number (got {})",
                self.current_rent
            )));
        }
        if !self.square_footage.is_finite() || self.square_footage < 0.0 {
            return Err(AppError::Validation(format!(
                "square_footage must be non-negative (got {})",
                self.square_footage
            )));
        }
        if !self.bathrooms.is_finite() || self.bathrooms < 0.0 {
            return Err(AppError::Validation(format!(
                "bathrooms must be non-negative (got {})",
                self.bathrooms
            )));
        }
        if !self.radius.is_finite()
            || self.radius <= 0.0
            || self.radius < policy.min_radius_miles
            || self.radius > policy.max_radius_miles
        {
            return Err(AppError::Validation(format!(
                "radius must be within {}..={} miles (got {})",
                policy.min_radius_miles, policy.max_radius_miles, self.radius
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Comparables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparableStatus {
    /// Still on the market; rent is the asking price.
    Active,
    /// Leased or off-market; rent is the closing price.
    Rented,
}

impl ComparableStatus {
    /// Maps provider status labels. Unrecognized labels yield `None`.
    pub fn from_provider(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" | "for rent" | "listed" => Some(ComparableStatus::Active),
            "rented" | "leased" | "inactive" | "off market" => Some(ComparableStatus::Rented),
            _ => None,
        }
    }
}

impl std::fmt::Display for ComparableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComparableStatus::Active => write!(f, "active"),
            ComparableStatus::Rented => write!(f, "rented"),
        }
    }
}

/// One candidate property returned by the market-data provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparable {
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Distance from the subject in miles, as reported by the provider.
    pub distance_miles: Option<f64>,
    pub property_type: String,
    pub bedrooms: u32,
    pub bathrooms: f64,
    pub square_footage: Option<f64>,
    pub rent: f64,
    pub status: ComparableStatus,
    pub days_on_market: Option<u32>,
    pub listed_date: Option<String>,
    pub removed_date: Option<String>,
}

impl Comparable {
    /// Rent divided by this comparable's own footage; `None` when footage is missing or zero.
    pub fn rent_per_sqft(&self) -> Option<f64> {
        match self.square_footage {
            Some(sqft) if sqft > 0.0 => Some(self.rent / sqft),
            _ => None,
        }
    }
}

/// Filtered comparable pool for one query. Every member matches the subject's
/// property type and lies within `radius_used`.
#[derive(Debug, Clone)]
pub struct ComparableSet {
    pub query: ListingQuery,
    pub comparables: Vec<Comparable>,
    pub requested_radius: f64,
    pub radius_used: f64,
    /// Every radius queried, in order. First entry is the requested radius.
    pub radii_tried: Vec<f64>,
}

impl ComparableSet {
    pub fn len(&self) -> usize {
        self.comparables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comparables.is_empty()
    }

    pub fn was_expanded(&self) -> bool {
        self.radius_used > self.requested_radius
    }
}

// ---------------------------------------------------------------------------
// Market statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        };
        write!(f, "{s}")
    }
}

/// Aggregate over a comparable set. Every `Option` is `None` (serialized as `null`)
/// when no comparable contributes to it; zero is always a real observed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStats {
    pub sample_size: usize,
    pub avg_rent: Option<f64>,
    pub median_rent: Option<f64>,
    pub rent_range_low: Option<f64>,
    pub rent_range_high: Option<f64>,
    pub avg_days_on_market: Option<f64>,
    pub median_days_on_market: Option<f64>,
    pub avg_rent_per_sqft: Option<f64>,
    pub active_count: usize,
    pub rented_count: usize,
    /// Share of active comparables in percent.
    pub active_pct: Option<f64>,
    pub rented_pct: Option<f64>,
    pub avg_rent_active: Option<f64>,
    pub avg_rent_rented: Option<f64>,
    pub avg_days_on_market_active: Option<f64>,
    pub avg_days_on_market_rented: Option<f64>,
    pub avg_rent_per_sqft_active: Option<f64>,
    pub avg_rent_per_sqft_rented: Option<f64>,
    /// Coefficient of variation of rent (population std-dev / mean).
    pub rent_cv: Option<f64>,
    pub confidence: Confidence,
    pub requested_radius: f64,
    pub radius_used: f64,
    pub radii_tried: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Syndication
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// The highest-traffic platforms. Stricter timeouts, heavier weight.
    Primary,
    Secondary,
}

impl Tier {
    pub fn weight(self) -> f64 {
        use crate::config::tier_weights::*;
        match self {
            Tier::Primary => PRIMARY,
            Tier::Secondary => SECONDARY,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Primary => write!(f, "primary"),
            Tier::Secondary => write!(f, "secondary"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStrategy {
    /// Fetch the platform's search page and look for the street address.
    SearchPage,
    /// No automated check exists; always inconclusive.
    Manual,
}

/// Listing identity and content for a syndication check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyndicationListing {
    pub listing_id: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub bedrooms: u32,
    pub bathrooms: f64,
    pub square_footage: f64,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default, alias = "photos_count")]
    pub photo_count: u32,
}

impl SyndicationListing {
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() || self.city.trim().is_empty() {
            return Err(AppError::Validation(
                "address and city must not be empty".to_string(),
            ));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(AppError::Validation(format!(
                "price must be a non-negative number (got {})",
                self.price
            )));
        }
        if !self.square_footage.is_finite() || self.square_footage < 0.0 {
            return Err(AppError::Validation(format!(
                "square_footage must be non-negative (got {})",
                self.square_footage
            )));
        }
        Ok(())
    }
}

/// Ternary presence result. `Unknown` is never evidence of absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    Found,
    NotFound,
    Unknown,
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProbeOutcome::Found => "found",
            ProbeOutcome::NotFound => "not_found",
            ProbeOutcome::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub platform: String,
    pub tier: Tier,
    pub outcome: ProbeOutcome,
    /// Page a human can open to verify the result.
    pub url: Option<String>,
    /// Why the outcome is `Unknown`, if it is.
    pub error: Option<String>,
}

impl ProbeResult {
    /// `Some(true/false)` for conclusive checks, `None` for unknown.
    pub fn found(&self) -> Option<bool> {
        match self.outcome {
            ProbeOutcome::Found => Some(true),
            ProbeOutcome::NotFound => Some(false),
            ProbeOutcome::Unknown => None,
        }
    }
}

/// One entry per catalog platform, in catalog order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyndicationReport {
    pub results: Vec<ProbeResult>,
    pub total: usize,
    /// Total minus unknown outcomes.
    pub attempted: usize,
    pub found: usize,
    pub not_found: usize,
    pub unknown: usize,
    pub primary_total: usize,
    pub primary_found: usize,
    /// found / attempted, in percent.
    pub coverage_pct: Option<f64>,
    /// Tier-weighted found fraction over conclusive entries, 0.0..=1.0.
    pub coverage_score: Option<f64>,
}

// ---------------------------------------------------------------------------
// Recommendations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapCategory {
    MissingFromPrimary,
    PhotoCount,
    DescriptionLength,
    MissingAmenities,
    ShortTitle,
    MissingFromSecondary,
    VerifyListing,
}

impl GapCategory {
    /// Fixed priority weight. Higher ranks first.
    pub fn weight(self) -> u32 {
        match self {
            GapCategory::MissingFromPrimary => 100,
            GapCategory::PhotoCount => 80,
            GapCategory::DescriptionLength => 70,
            GapCategory::MissingAmenities => 60,
            GapCategory::ShortTitle => 50,
            GapCategory::MissingFromSecondary => 20,
            GapCategory::VerifyListing => 10,
        }
    }

    /// Whether the listing owner can act on the gap directly.
    pub fn actionable(self) -> bool {
        !matches!(self, GapCategory::VerifyListing)
    }
}

impl std::fmt::Display for GapCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GapCategory::MissingFromPrimary => "missing_from_primary",
            GapCategory::PhotoCount => "photo_count",
            GapCategory::DescriptionLength => "description_length",
            GapCategory::MissingAmenities => "missing_amenities",
            GapCategory::ShortTitle => "short_title",
            GapCategory::MissingFromSecondary => "missing_from_secondary",
            GapCategory::VerifyListing => "verify_listing",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecommendationTarget {
    Platform { name: String, tier: Tier },
    /// Listing content, independent of any platform.
    General,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// 1-based position in the ranked list.
    pub rank: usize,
    pub target: RecommendationTarget,
    pub category: GapCategory,
    pub priority: u32,
    pub rationale: String,
    pub actionable: bool,
}

// ---------------------------------------------------------------------------
// Showings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowingsRequest {
    #[serde(default = "default_days_back")]
    pub days_back: u32,
    #[serde(default)]
    pub property_id: Option<String>,
}

fn default_days_back() -> u32 {
    SHOWINGS_DEFAULT_DAYS_BACK
}

impl ShowingsRequest {
    pub fn validate(&self) -> Result<()> {
        if self.days_back == 0 || self.days_back > SHOWINGS_MAX_DAYS_BACK {
            return Err(AppError::Validation(format!(
                "days_back must be within 1..={SHOWINGS_MAX_DAYS_BACK} (got {})",
                self.days_back
            )));
        }
        if self.property_id.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(AppError::Validation("property_id must not be blank".to_string()));
        }
        Ok(())
    }
}

/// Inclusive date range of a showings report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowingsWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl ShowingsWindow {
    pub fn ending_on(end_date: NaiveDate, days_back: u32) -> Self {
        Self {
            start_date: end_date - Duration::days(i64::from(days_back)),
            end_date,
        }
    }
}

/// One prospect showing as reported by the showings provider. Every field but
/// the two flags is optional; providers omit whatever they do not track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Showing {
    pub showing_id: Option<String>,
    pub property_id: Option<String>,
    pub property_address: Option<String>,
    pub prospect_name: Option<String>,
    pub prospect_email: Option<String>,
    pub prospect_phone: Option<String>,
    pub showing_date: Option<String>,
    pub showing_time: Option<String>,
    pub status: Option<String>,
    pub confirmed: bool,
    pub attended: Option<bool>,
    pub cancelled: bool,
    pub notes: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}
