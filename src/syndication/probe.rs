use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ProbePolicy;
use crate::syndication::catalog::{CatalogEntry, SyndicationCatalog};
use crate::syndication::checker::PresenceCheck;
use crate::types::{ProbeOutcome, ProbeResult, SyndicationListing, SyndicationReport, Tier};

/// Checks listing presence on every catalog platform concurrently, one task per
/// platform, under a shared deadline.
///
/// A failed, timed-out or unfinished check becomes `ProbeOutcome::Unknown`; the
/// report always holds exactly one result per catalog entry, in catalog order.
/// Dropping the `probe` future aborts every in-flight check.
pub struct SyndicationProber {
    catalog: Arc<SyndicationCatalog>,
    checker: Arc<dyn PresenceCheck>,
    policy: ProbePolicy,
}

impl SyndicationProber {
    pub fn new(
        catalog: Arc<SyndicationCatalog>,
        checker: Arc<dyn PresenceCheck>,
        policy: ProbePolicy,
    ) -> Self {
        Self { catalog, checker, policy }
    }

    pub fn catalog(&self) -> &SyndicationCatalog {
        &self.catalog
    }

    pub async fn probe(&self, listing: &SyndicationListing) -> SyndicationReport {
        let entries = self.catalog.entries();
        let listing = Arc::new(listing.clone());
        let mut slots: Vec<Option<ProbeResult>> = vec![None; entries.len()];
        let mut tasks = JoinSet::new();

        for (idx, entry) in entries.iter().enumerate() {
            let entry = entry.clone();
            let checker = Arc::clone(&self.checker);
            let listing = Arc::clone(&listing);
            let timeout = self.timeout_for(entry.tier);
            tasks.spawn(async move {
                let started = Instant::now();
                let result = check_one(checker.as_ref(), &entry, &listing, timeout).await;
                (idx, result, started.elapsed())
            });
        }

        let deadline = tokio::time::Instant::now() + self.policy.deadline;
        let mut deadline_hit = false;
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((idx, result, elapsed)))) => {
                    debug!(
                        "[PROBE] {} -> {} in {}ms{}",
                        result.platform,
                        result.outcome,
                        elapsed.as_millis(),
                        result.error.as_deref().map(|e| format!(" ({e})")).unwrap_or_default(),
                    );
                    slots[idx] = Some(result);
                }
                Ok(Some(Err(e))) => {
                    warn!("[PROBE] check task did not complete: {e}");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "[PROBE] deadline of {}ms elapsed with {} check(s) outstanding",
                        self.policy.deadline.as_millis(),
                        tasks.len(),
                    );
                    deadline_hit = true;
                    tasks.abort_all();
                    break;
                }
            }
        }

        let results: Vec<ProbeResult> = slots
            .into_iter()
            .zip(entries)
            .map(|(slot, entry)| {
                slot.unwrap_or_else(|| {
                    let reason = if deadline_hit {
                        "overall probe deadline elapsed"
                    } else {
                        "check task aborted"
                    };
                    unknown(entry, &listing, reason.to_string())
                })
            })
            .collect();

        let report = build_report(results);
        info!(
            listing_id = %listing.listing_id,
            found = report.found,
            not_found = report.not_found,
            unknown = report.unknown,
            "[PROBE] {}: found on {}/{} conclusive platforms ({} unknown), primary {}/{}",
            listing.listing_id,
            report.found,
            report.attempted,
            report.unknown,
            report.primary_found,
            report.primary_total,
        );
        report
    }

    fn timeout_for(&self, tier: Tier) -> Duration {
        match tier {
            Tier::Primary => self.policy.primary_timeout,
            Tier::Secondary => self.policy.secondary_timeout,
        }
    }
}

async fn check_one(
    checker: &dyn PresenceCheck,
    entry: &CatalogEntry,
    listing: &SyndicationListing,
    timeout: Duration,
) -> ProbeResult {
    match tokio::time::timeout(timeout, checker.check(entry, listing)).await {
        Ok(Ok(ProbeOutcome::Unknown)) => unknown(entry, listing, "check was inconclusive".to_string()),
        Ok(Ok(outcome)) => ProbeResult {
            platform: entry.name.clone(),
            tier: entry.tier,
            outcome,
            url: Some(entry.url_for(listing)),
            error: None,
        },
        Ok(Err(e)) => unknown(entry, listing, e.to_string()),
        Err(_) => unknown(entry, listing, format!("timed out after {}ms", timeout.as_millis())),
    }
}

fn unknown(entry: &CatalogEntry, listing: &SyndicationListing, reason: String) -> ProbeResult {
    ProbeResult {
        platform: entry.name.clone(),
        tier: entry.tier,
        outcome: ProbeOutcome::Unknown,
        url: Some(entry.url_for(listing)),
        error: Some(reason),
    }
}

/// Tally results. Unknown outcomes are left out of both numerator and
/// denominator of the coverage figures.
pub fn build_report(results: Vec<ProbeResult>) -> SyndicationReport {
    let total = results.len();
    let count = |o: ProbeOutcome| results.iter().filter(|r| r.outcome == o).count();
    let found = count(ProbeOutcome::Found);
    let not_found = count(ProbeOutcome::NotFound);
    let unknown = count(ProbeOutcome::Unknown);
    let attempted = total - unknown;

    let primary_total = results.iter().filter(|r| r.tier == Tier::Primary).count();
    let primary_found = results
        .iter()
        .filter(|r| r.tier == Tier::Primary && r.outcome == ProbeOutcome::Found)
        .count();

    let (weighted_found, weighted_conclusive) = results
        .iter()
        .filter(|r| r.outcome != ProbeOutcome::Unknown)
        .fold((0.0, 0.0), |(f, c), r| {
            let w = r.tier.weight();
            let hit = if r.outcome == ProbeOutcome::Found { w } else { 0.0 };
            (f + hit, c + w)
        });

    SyndicationReport {
        total,
        attempted,
        found,
        not_found,
        unknown,
        primary_total,
        primary_found,
        coverage_pct: (attempted > 0).then(|| found as f64 / attempted as f64 * 100.0),
        coverage_score: (weighted_conclusive > 0.0).then(|| weighted_found / weighted_conclusive),
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syndication::catalog::tests::listing;
    use crate::syndication::checker::ProbeError;
    use crate::types::CheckStrategy;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Behavior {
        Found,
        NotFound,
        Fail,
        Hang,
    }

    struct ScriptedChecker {
        script: HashMap<String, Behavior>,
    }

    impl ScriptedChecker {
        fn new(script: &[(&str, Behavior)]) -> Self {
            Self {
                script: script.iter().map(|(n, b)| (n.to_string(), *b)).collect(),
            }
        }
    }

    #[async_trait]
    impl PresenceCheck for ScriptedChecker {
        async fn check(
            &self,
            entry: &CatalogEntry,
            _listing: &SyndicationListing,
        ) -> std::result::Result<ProbeOutcome, ProbeError> {
            match self.script.get(&entry.name).copied().unwrap_or(Behavior::Fail) {
                Behavior::Found => Ok(ProbeOutcome::Found),
                Behavior::NotFound => Ok(ProbeOutcome::NotFound),
                Behavior::Fail => Err(ProbeError::Status(503)),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(ProbeOutcome::Found)
                }
            }
        }
    }

    fn entry(name: &str, tier: Tier) -> CatalogEntry {
        CatalogEntry {
            name: name.to_string(),
            tier,
            strategy: CheckStrategy::SearchPage,
            search_url: None,
        }
    }

    fn catalog() -> Arc<SyndicationCatalog> {
        Arc::new(
            SyndicationCatalog::from_entries(vec![
                entry("Alpha", Tier::Primary),
                entry("Bravo", Tier::Primary),
                entry("Charlie", Tier::Secondary),
                entry("Delta", Tier::Secondary),
                entry("Echo", Tier::Secondary),
            ])
            .unwrap(),
        )
    }

    fn policy(primary_ms: u64, secondary_ms: u64, deadline_ms: u64) -> ProbePolicy {
        ProbePolicy {
            deadline: Duration::from_millis(deadline_ms),
            primary_timeout: Duration::from_millis(primary_ms),
            secondary_timeout: Duration::from_millis(secondary_ms),
        }
    }

    #[tokio::test]
    async fn timed_out_primary_is_unknown_and_excluded_from_coverage() {
        let checker = ScriptedChecker::new(&[
            ("Alpha", Behavior::Found),
            ("Bravo", Behavior::Hang),
            ("Charlie", Behavior::NotFound),
            ("Delta", Behavior::Found),
            ("Echo", Behavior::NotFound),
        ]);
        let prober = SyndicationProber::new(catalog(), Arc::new(checker), policy(50, 500, 2_000));

        let report = prober.probe(&listing()).await;

        assert_eq!(report.results.len(), 5);
        let names: Vec<_> = report.results.iter().map(|r| r.platform.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Bravo", "Charlie", "Delta", "Echo"]);

        let bravo = &report.results[1];
        assert_eq!(bravo.outcome, ProbeOutcome::Unknown);
        assert_eq!(bravo.found(), None);
        assert!(bravo.error.as_deref().unwrap().contains("timed out"));

        assert_eq!(report.total, 5);
        assert_eq!(report.attempted, 4);
        assert_eq!(report.found, 2);
        assert_eq!(report.unknown, 1);
        assert_eq!(report.coverage_pct, Some(50.0));
        // (3 + 1) / (3 + 1 + 1 + 1)
        let score = report.coverage_score.unwrap();
        assert!((score - 4.0 / 6.0).abs() < 1e-9, "got {score}");
    }

    #[tokio::test]
    async fn failing_checks_do_not_affect_others() {
        let checker = ScriptedChecker::new(&[
            ("Alpha", Behavior::Fail),
            ("Bravo", Behavior::Found),
            ("Charlie", Behavior::Fail),
            ("Delta", Behavior::Found),
            ("Echo", Behavior::Found),
        ]);
        let prober = SyndicationProber::new(catalog(), Arc::new(checker), policy(500, 500, 2_000));

        let report = prober.probe(&listing()).await;

        assert_eq!(report.found, 3);
        assert_eq!(report.unknown, 2);
        assert_eq!(report.primary_found, 1);
        assert_eq!(report.primary_total, 2);
        assert_eq!(report.coverage_score, Some(1.0));
        assert!(report.results[0].error.as_deref().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn outstanding_checks_are_unknown_when_deadline_elapses() {
        let checker = ScriptedChecker::new(&[
            ("Alpha", Behavior::Found),
            ("Bravo", Behavior::Found),
            ("Charlie", Behavior::Hang),
            ("Delta", Behavior::Hang),
            ("Echo", Behavior::NotFound),
        ]);
        let prober = SyndicationProber::new(catalog(), Arc::new(checker), policy(5_000, 10_000, 100));

        let started = Instant::now();
        let report = prober.probe(&listing()).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(report.results.len(), 5);
        for r in &report.results[2..4] {
            assert_eq!(r.outcome, ProbeOutcome::Unknown);
            assert!(r.error.as_deref().unwrap().contains("deadline"));
        }
        assert_eq!(report.attempted, 3);
        assert_eq!(report.coverage_score, Some(6.0 / 7.0));
    }

    /// Counts checks that start and checks that run to completion.
    struct SlowChecker {
        started: Arc<AtomicUsize>,
        finished: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PresenceCheck for SlowChecker {
        async fn check(
            &self,
            _entry: &CatalogEntry,
            _listing: &SyndicationListing,
        ) -> std::result::Result<ProbeOutcome, ProbeError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(ProbeOutcome::Found)
        }
    }

    #[tokio::test]
    async fn cancelled_fan_out_aborts_in_flight_checks() {
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let checker = SlowChecker { started: Arc::clone(&started), finished: Arc::clone(&finished) };
        let prober = SyndicationProber::new(catalog(), Arc::new(checker), policy(5_000, 5_000, 10_000));

        let listing = listing();
        let cut_short = tokio::time::timeout(Duration::from_millis(50), prober.probe(&listing)).await;
        assert!(cut_short.is_err());
        assert_eq!(started.load(Ordering::SeqCst), 5);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn all_unknown_has_undefined_coverage() {
        let results = vec![ProbeResult {
            platform: "Alpha".to_string(),
            tier: Tier::Primary,
            outcome: ProbeOutcome::Unknown,
            url: None,
            error: Some("x".to_string()),
        }];
        let report = build_report(results);
        assert_eq!(report.attempted, 0);
        assert_eq!(report.coverage_pct, None);
        assert_eq!(report.coverage_score, None);
    }
}
