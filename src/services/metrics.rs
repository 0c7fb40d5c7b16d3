//! Counters for monitoring the hedge loop

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Point-in-time copy of the hedge counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub cycles: u64,
    pub rounds_entered: u64,
    pub rounds_skipped: u64,
    /// Bet outcomes, counted per side
    pub bets_confirmed: u64,
    pub bets_failed: u64,
    pub claims_confirmed: u64,
    pub claims_failed: u64,
    pub transfers: u64,
}

/// Thread-safe metrics collector
#[derive(Debug, Clone, Default)]
pub struct HedgeMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    cycles: AtomicU64,
    rounds_entered: AtomicU64,
    rounds_skipped: AtomicU64,
    bets_confirmed: AtomicU64,
    bets_failed: AtomicU64,
    claims_confirmed: AtomicU64,
    claims_failed: AtomicU64,
    transfers: AtomicU64,
}

impl HedgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_cycles(&self) {
        self.inner.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rounds_entered(&self) {
        self.inner.rounds_entered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rounds_skipped(&self) {
        self.inner.rounds_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bet(&self, confirmed: bool) {
        let counter = if confirmed {
            &self.inner.bets_confirmed
        } else {
            &self.inner.bets_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_claim(&self, confirmed: bool) {
        let counter = if confirmed {
            &self.inner.claims_confirmed
        } else {
            &self.inner.claims_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_transfers(&self) {
        self.inner.transfers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles: self.inner.cycles.load(Ordering::Relaxed),
            rounds_entered: self.inner.rounds_entered.load(Ordering::Relaxed),
            rounds_skipped: self.inner.rounds_skipped.load(Ordering::Relaxed),
            bets_confirmed: self.inner.bets_confirmed.load(Ordering::Relaxed),
            bets_failed: self.inner.bets_failed.load(Ordering::Relaxed),
            claims_confirmed: self.inner.claims_confirmed.load(Ordering::Relaxed),
            claims_failed: self.inner.claims_failed.load(Ordering::Relaxed),
            transfers: self.inner.transfers.load(Ordering::Relaxed),
        }
    }
}
