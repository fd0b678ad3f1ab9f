use std::cmp::Ordering;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::config::{ContentPolicy, MAX_RATIONALE_CHARS};
use crate::llm::TextGenerator;
use crate::types::{
    GapCategory, ProbeOutcome, Recommendation, RecommendationTarget, SyndicationListing,
    SyndicationReport, Tier,
};

const SYSTEM_PROMPT: &str = "You are an expert SEO analyst for rental property listings. \
Given a listing and one specific visibility gap, reply with two or three plain sentences \
explaining why the gap matters and exactly what the owner should do about it. \
No headings, no lists, no JSON.";

/// A detected gap before rationale text is attached.
#[derive(Debug, Clone, PartialEq)]
struct Gap {
    target: RecommendationTarget,
    category: GapCategory,
    url: Option<String>,
}

impl Gap {
    fn platform(name: &str, tier: Tier, category: GapCategory, url: Option<String>) -> Self {
        Self {
            target: RecommendationTarget::Platform { name: name.to_string(), tier },
            category,
            url,
        }
    }

    fn general(category: GapCategory) -> Self {
        Self { target: RecommendationTarget::General, category, url: None }
    }

    fn priority(&self) -> u32 {
        self.category.weight()
    }

    fn platform_name(&self) -> &str {
        match &self.target {
            RecommendationTarget::Platform { name, .. } => name,
            RecommendationTarget::General => "",
        }
    }

    /// Primary before secondary before platform-independent items.
    fn tier_rank(&self) -> u8 {
        match &self.target {
            RecommendationTarget::Platform { tier: Tier::Primary, .. } => 0,
            RecommendationTarget::Platform { tier: Tier::Secondary, .. } => 1,
            RecommendationTarget::General => 2,
        }
    }
}

/// Priority descending, then tier, then category weight, then platform name.
fn rank_order(a: &Gap, b: &Gap) -> Ordering {
    b.priority()
        .cmp(&a.priority())
        .then_with(|| a.tier_rank().cmp(&b.tier_rank()))
        .then_with(|| b.category.weight().cmp(&a.category.weight()))
        .then_with(|| a.platform_name().cmp(b.platform_name()))
}

/// Turns a syndication report and the listing's content into an ordered action list.
pub struct RecommendationRanker {
    generator: Arc<dyn TextGenerator>,
    policy: ContentPolicy,
}

impl RecommendationRanker {
    pub fn new(generator: Arc<dyn TextGenerator>, policy: ContentPolicy) -> Self {
        Self { generator, policy }
    }

    pub async fn rank(
        &self,
        report: &SyndicationReport,
        listing: &SyndicationListing,
    ) -> Vec<Recommendation> {
        let mut gaps = detect_gaps(report, listing, &self.policy);
        gaps.sort_by(rank_order);

        let rationales = join_all(gaps.iter().map(|g| self.rationale(g, listing))).await;

        gaps.into_iter()
            .zip(rationales)
            .enumerate()
            .map(|(i, (gap, rationale))| Recommendation {
                rank: i + 1,
                priority: gap.priority(),
                actionable: gap.category.actionable(),
                category: gap.category,
                target: gap.target,
                rationale,
            })
            .collect()
    }

    async fn rationale(&self, gap: &Gap, listing: &SyndicationListing) -> String {
        let prompt = build_prompt(gap, listing, &self.policy);
        match self.generator.generate(SYSTEM_PROMPT, &prompt).await {
            Ok(Some(text)) if !text.trim().is_empty() => bound(&text),
            Ok(_) => {
                debug!("[RANKER] no generated text for {}, using fallback", gap.category);
                fallback_rationale(gap, listing, &self.policy)
            }
            Err(e) => {
                warn!("[RANKER] text generation failed for {}: {e}", gap.category);
                fallback_rationale(gap, listing, &self.policy)
            }
        }
    }
}

fn detect_gaps(
    report: &SyndicationReport,
    listing: &SyndicationListing,
    policy: &ContentPolicy,
) -> Vec<Gap> {
    let mut gaps = Vec::new();

    for r in &report.results {
        let category = match (r.tier, r.outcome) {
            (Tier::Primary, ProbeOutcome::NotFound) => GapCategory::MissingFromPrimary,
            (Tier::Primary, ProbeOutcome::Unknown) => GapCategory::VerifyListing,
            (Tier::Secondary, ProbeOutcome::NotFound) => GapCategory::MissingFromSecondary,
            _ => continue,
        };
        gaps.push(Gap::platform(&r.platform, r.tier, category, r.url.clone()));
    }

    if listing.photo_count < policy.min_photos {
        gaps.push(Gap::general(GapCategory::PhotoCount));
    }
    if word_count(&listing.description) < policy.min_description_words {
        gaps.push(Gap::general(GapCategory::DescriptionLength));
    }
    if listing.amenities.iter().all(|a| a.trim().is_empty()) {
        gaps.push(Gap::general(GapCategory::MissingAmenities));
    }
    if listing.title.trim().chars().count() < policy.min_title_chars {
        gaps.push(Gap::general(GapCategory::ShortTitle));
    }

    gaps
}

fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

fn build_prompt(gap: &Gap, listing: &SyndicationListing, policy: &ContentPolicy) -> String {
    let description: String = listing.description.chars().take(500).collect();
    let amenities = listing
        .amenities
        .iter()
        .take(10)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let price_per_sqft = if listing.square_footage > 0.0 {
        format!("${:.2}", listing.price / listing.square_footage)
    } else {
        "n/a".to_string()
    };

    let gap_line = match gap.category {
        GapCategory::MissingFromPrimary => format!(
            "The listing was NOT found on {}, one of the six highest-traffic rental sites.",
            gap.platform_name()
        ),
        GapCategory::MissingFromSecondary => {
            format!("The listing was NOT found on {}, a secondary rental site.", gap.platform_name())
        }
        GapCategory::VerifyListing => format!(
            "Presence on {} could not be checked automatically.",
            gap.platform_name()
        ),
        GapCategory::PhotoCount => format!(
            "The listing has {} photos; at least {} are recommended.",
            listing.photo_count, policy.min_photos
        ),
        GapCategory::DescriptionLength => format!(
            "The description has {} words; at least {} perform better.",
            word_count(&listing.description),
            policy.min_description_words
        ),
        GapCategory::MissingAmenities => "The listing has no amenities listed.".to_string(),
        GapCategory::ShortTitle => format!(
            "The title is {} characters; at least {} are recommended.",
            listing.title.trim().chars().count(),
            policy.min_title_chars
        ),
    };

    format!(
        "LISTING DETAILS:\n\
         - Address: {}, {}, {}\n\
         - Title: {}\n\
         - Description: {}\n\
         - Price: ${:.0}/month ({} per sq ft)\n\
         - Bedrooms: {}\n\
         - Bathrooms: {}\n\
         - Square Footage: {:.0}\n\
         - Amenities: {}\n\
         - Photos: {}\n\n\
         GAP ({}):\n{}",
        listing.address,
        listing.city,
        listing.state,
        listing.title,
        description,
        listing.price,
        price_per_sqft,
        listing.bedrooms,
        listing.bathrooms,
        listing.square_footage,
        if amenities.is_empty() { "none" } else { amenities.as_str() },
        listing.photo_count,
        gap.category,
        gap_line,
    )
}

fn fallback_rationale(gap: &Gap, listing: &SyndicationListing, policy: &ContentPolicy) -> String {
    let platform = gap.platform_name();
    match gap.category {
        GapCategory::MissingFromPrimary => format!(
            "{platform} is one of the highest-traffic rental sites and this listing was not found there. \
             Confirm your syndication feed includes {platform} or post the listing directly."
        ),
        GapCategory::MissingFromSecondary => format!(
            "The listing was not found on {platform}. Adding it there widens reach for little effort."
        ),
        GapCategory::VerifyListing => format!(
            "Presence on {platform} could not be confirmed automatically. Check {} and search for the address.",
            gap.url.as_deref().unwrap_or("the site")
        ),
        GapCategory::PhotoCount => format!(
            "The listing has {} photos. Listings with at least {} photos draw noticeably more views; \
             add shots of every room, the exterior and key amenities.",
            listing.photo_count, policy.min_photos
        ),
        GapCategory::DescriptionLength => format!(
            "The description is {} words. Expand it to at least {} words covering layout, upgrades, \
             the neighborhood and lease terms.",
            word_count(&listing.description),
            policy.min_description_words
        ),
        GapCategory::MissingAmenities => "No amenities are listed. Add parking, laundry, appliances and \
             outdoor space so the listing matches renters' search filters."
            .to_string(),
        GapCategory::ShortTitle => "The title is short. Include the bedroom and bathroom count, property \
             type, neighborhood and one standout feature."
            .to_string(),
    }
}

/// Trim and cut to `MAX_RATIONALE_CHARS` characters.
fn bound(text: &str) -> String {
    text.trim().chars().take(MAX_RATIONALE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, Result};
    use crate::syndication::catalog::tests::listing;
    use crate::syndication::probe::build_report;
    use crate::types::ProbeResult;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedGenerator {
        text: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl FixedGenerator {
        fn new(text: Option<&str>) -> Self {
            Self { text: text.map(str::to_string), prompts: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, _system: &str, prompt: &str) -> Result<Option<String>> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.text.clone())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<Option<String>> {
            Err(AppError::UpstreamUnavailable("timeout".to_string()))
        }
    }

    fn result(platform: &str, tier: Tier, outcome: ProbeOutcome) -> ProbeResult {
        ProbeResult {
            platform: platform.to_string(),
            tier,
            outcome,
            url: Some(format!("https://{}.example", platform.to_lowercase())),
            error: None,
        }
    }

    fn report() -> SyndicationReport {
        build_report(vec![
            result("Zumper", Tier::Primary, ProbeOutcome::NotFound),
            result("Zillow", Tier::Primary, ProbeOutcome::Found),
            result("Redfin", Tier::Primary, ProbeOutcome::Unknown),
            result("HotPads", Tier::Primary, ProbeOutcome::NotFound),
            result("Rentler", Tier::Secondary, ProbeOutcome::NotFound),
            result("Domu", Tier::Secondary, ProbeOutcome::Unknown),
        ])
    }

    fn ranker(generator: impl TextGenerator) -> RecommendationRanker {
        RecommendationRanker::new(Arc::new(generator), ContentPolicy::default())
    }

    #[tokio::test]
    async fn primary_gaps_rank_first_then_content_gaps() {
        let recs = ranker(FixedGenerator::new(Some("canned"))).rank(&report(), &listing()).await;

        let order: Vec<(GapCategory, &str)> = recs
            .iter()
            .map(|r| {
                let name = match &r.target {
                    RecommendationTarget::Platform { name, .. } => name.as_str(),
                    RecommendationTarget::General => "",
                };
                (r.category, name)
            })
            .collect();

        assert_eq!(
            order,
            vec![
                (GapCategory::MissingFromPrimary, "HotPads"),
                (GapCategory::MissingFromPrimary, "Zumper"),
                (GapCategory::PhotoCount, ""),
                (GapCategory::DescriptionLength, ""),
                (GapCategory::ShortTitle, ""),
                (GapCategory::MissingFromSecondary, "Rentler"),
                (GapCategory::VerifyListing, "Redfin"),
            ]
        );
        let ranks: Vec<usize> = recs.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, (1..=7).collect::<Vec<_>>());
        assert!(recs.iter().all(|r| r.rationale == "canned"));
    }

    #[tokio::test]
    async fn ordering_is_deterministic() {
        let ranker = ranker(FixedGenerator::new(Some("same text")));
        let first = ranker.rank(&report(), &listing()).await;
        let second = ranker.rank(&report(), &listing()).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_text_falls_back_to_canned_rationale() {
        let recs = ranker(FixedGenerator::new(None)).rank(&report(), &listing()).await;
        assert!(recs.iter().all(|r| !r.rationale.trim().is_empty()));
        assert!(recs[0].rationale.contains("HotPads"));

        let blank = ranker(FixedGenerator::new(Some("   "))).rank(&report(), &listing()).await;
        assert!(blank.iter().all(|r| !r.rationale.trim().is_empty()));

        let failed = ranker(FailingGenerator).rank(&report(), &listing()).await;
        assert_eq!(failed.len(), recs.len());
        assert!(failed.iter().all(|r| !r.rationale.trim().is_empty()));
    }

    #[tokio::test]
    async fn long_text_is_bounded() {
        let long = "x".repeat(5_000);
        let recs = ranker(FixedGenerator::new(Some(&long))).rank(&report(), &listing()).await;
        assert!(recs.iter().all(|r| r.rationale.chars().count() == MAX_RATIONALE_CHARS));
    }

    #[tokio::test]
    async fn verify_items_are_not_actionable() {
        let recs = ranker(FixedGenerator::new(None)).rank(&report(), &listing()).await;
        let verify = recs
            .iter()
            .find(|r| r.category == GapCategory::VerifyListing)
            .unwrap();
        assert!(!verify.actionable);
        assert!(verify.rationale.contains("https://redfin.example"));
        assert!(recs.iter().filter(|r| r.category != GapCategory::VerifyListing).all(|r| r.actionable));
    }

    #[tokio::test]
    async fn complete_listing_found_everywhere_has_no_gaps() {
        let mut full = listing();
        full.title = "Sunny 3BR/2BA Single Family Home near Grand Lake".to_string();
        full.description = "word ".repeat(300);
        full.photo_count = 25;
        let found = build_report(vec![
            result("Zillow", Tier::Primary, ProbeOutcome::Found),
            result("Rentler", Tier::Secondary, ProbeOutcome::Found),
        ]);

        let recs = ranker(FixedGenerator::new(None)).rank(&found, &full).await;
        assert!(recs.is_empty());
    }

    #[tokio::test]
    async fn prompt_carries_listing_and_gap() {
        let generator = Arc::new(FixedGenerator::new(Some("ok")));
        let ranker = RecommendationRanker::new(generator.clone(), ContentPolicy::default());
        let only_photos = build_report(Vec::new());
        let mut l = listing();
        l.title = "Sunny 3BR/2BA Single Family Home near Grand Lake".to_string();
        l.description = "word ".repeat(300);

        ranker.rank(&only_photos, &l).await;

        let prompts = generator.prompts.lock().unwrap().clone();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("GAP (photo_count)"));
        assert!(prompts[0].contains("5500 Grand Lake Dr"));
        assert!(prompts[0].contains("Photos: 10"));
    }
}
