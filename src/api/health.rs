//! Shared counters for the /health endpoint.
//! Updated by LeasingService, read by the API.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Default)]
pub struct ServiceHealth {
    pub market_analyses: AtomicU64,
    pub syndication_checks: AtomicU64,
    pub showings_syncs: AtomicU64,
    /// Analyses rejected or failed before producing a result.
    pub analysis_failures: AtomicU64,
    pub deliveries_ok: AtomicU64,
    pub deliveries_failed: AtomicU64,
    /// Nanosecond timestamp of the last completed analysis (0 = none).
    pub last_completed_at_ns: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct HealthSnapshot {
    pub market_analyses: u64,
    pub syndication_checks: u64,
    pub showings_syncs: u64,
    pub analysis_failures: u64,
    pub deliveries_ok: u64,
    pub deliveries_failed: u64,
    pub last_completed_at_ns: u64,
}

impl ServiceHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_market_analyses(&self) {
        self.market_analyses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_syndication_checks(&self) {
        self.syndication_checks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_showings_syncs(&self) {
        self.showings_syncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_analysis_failures(&self) {
        self.analysis_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self, ok: bool) {
        let counter = if ok { &self.deliveries_ok } else { &self.deliveries_failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_last_completed_at_ns(&self, ns: u64) {
        self.last_completed_at_ns.store(ns, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            market_analyses: self.market_analyses.load(Ordering::Relaxed),
            syndication_checks: self.syndication_checks.load(Ordering::Relaxed),
            showings_syncs: self.showings_syncs.load(Ordering::Relaxed),
            analysis_failures: self.analysis_failures.load(Ordering::Relaxed),
            deliveries_ok: self.deliveries_ok.load(Ordering::Relaxed),
            deliveries_failed: self.deliveries_failed.load(Ordering::Relaxed),
            last_completed_at_ns: self.last_completed_at_ns.load(Ordering::Relaxed),
        }
    }
}
