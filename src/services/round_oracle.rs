//! Round oracle: decides whether the current round can be hedged
//!
//! Gates, in order:
//! 1. the round has started
//! 2. we are still inside the entry window after `started_at` and the
//!    round has not locked
//! 3. both payout ratios reach the floor
//! 4. the ratios are close enough to each other
//!
//! The oracle never sleeps. When a round is missed it returns how long the
//! caller should wait before polling again.

use crate::config::HedgeTiming;
use crate::feed::RoundFeed;
use crate::services::pacer::{until, Pacer};
use crate::types::Round;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of evaluating one round snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum RoundDecision {
    /// All gates passed
    Biddable {
        round_id: u64,
        closed_at: DateTime<Utc>,
    },
    /// `now` is before `started_at`; poll again
    NotStarted { round_id: u64 },
    /// Entry window is over or the round locked; wait this long, then poll again
    EntryMissed { round_id: u64, wait: Duration },
    PayoutTooLow { round_id: u64, moon: f64, doom: f64 },
    Asymmetric { round_id: u64, relative_diff: f64 },
    /// The feed payload or the ratios could not be used
    Anomalous { reason: String },
}

impl RoundDecision {
    /// `(round_id, closed_at)` when the round can be entered
    pub fn biddable(&self) -> Option<(u64, DateTime<Utc>)> {
        match self {
            RoundDecision::Biddable {
                round_id,
                closed_at,
            } => Some((*round_id, *closed_at)),
            _ => None,
        }
    }

    /// Wait the caller should perform before the next poll
    pub fn wait(&self) -> Option<Duration> {
        match self {
            RoundDecision::EntryMissed { wait, .. } => Some(*wait),
            _ => None,
        }
    }
}

/// Eligibility thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct OracleRules {
    pub entry_window: Duration,
    pub missed_round_buffer: Duration,
    pub min_payout_ratio: f64,
    pub max_payout_asymmetry: f64,
}

impl From<&HedgeTiming> for OracleRules {
    fn from(timing: &HedgeTiming) -> Self {
        Self {
            entry_window: timing.entry_window,
            missed_round_buffer: timing.missed_round_buffer,
            min_payout_ratio: timing.min_payout_ratio,
            max_payout_asymmetry: timing.max_payout_asymmetry,
        }
    }
}

impl Default for OracleRules {
    fn default() -> Self {
        Self::from(&HedgeTiming::default())
    }
}

/// `|moon - doom| / avg(moon, doom)`, `None` when the average is zero
pub fn relative_difference(moon: f64, doom: f64) -> Option<f64> {
    let avg = (moon + doom) / 2.0;
    if avg == 0.0 || !avg.is_finite() {
        return None;
    }
    Some((moon - doom).abs() / avg)
}

/// Apply the eligibility gates to one snapshot
pub fn evaluate(round: &Round, now: DateTime<Utc>, rules: &OracleRules) -> RoundDecision {
    let round_id = round.on_chain_id;

    if now < round.started_at {
        return RoundDecision::NotStarted { round_id };
    }

    let window = match chrono::Duration::from_std(rules.entry_window) {
        Ok(w) => w,
        Err(e) => {
            return RoundDecision::Anomalous {
                reason: format!("entry window out of range: {}", e),
            }
        }
    };
    if now > round.started_at + window || now >= round.locked_at {
        let remaining = until(now, round.closed_at);
        let wait = if remaining.is_zero() {
            Duration::ZERO
        } else {
            remaining + rules.missed_round_buffer
        };
        return RoundDecision::EntryMissed { round_id, wait };
    }

    let (moon, doom) = (round.moon_payout_ratio, round.doom_payout_ratio);
    if moon.is_nan() || doom.is_nan() {
        return RoundDecision::Anomalous {
            reason: format!("round {} has non-numeric payout ratios", round_id),
        };
    }
    if moon < rules.min_payout_ratio || doom < rules.min_payout_ratio {
        return RoundDecision::PayoutTooLow {
            round_id,
            moon,
            doom,
        };
    }

    match relative_difference(moon, doom) {
        None => RoundDecision::Anomalous {
            reason: format!("round {} payout ratios average to zero", round_id),
        },
        Some(diff) if diff > rules.max_payout_asymmetry => RoundDecision::Asymmetric {
            round_id,
            relative_diff: diff,
        },
        Some(_) => RoundDecision::Biddable {
            round_id,
            closed_at: round.closed_at,
        },
    }
}

/// Pull-based oracle over a round feed
pub struct RoundOracle<F> {
    feed: F,
    rules: OracleRules,
}

impl<F: RoundFeed> RoundOracle<F> {
    pub fn new(feed: F, rules: OracleRules) -> Self {
        Self { feed, rules }
    }

    /// Fetch the latest round and decide whether it can be hedged.
    ///
    /// The clock is read once the snapshot has arrived, so a slow feed
    /// cannot stretch the entry window.
    pub async fn next_biddable_round<P: Pacer + ?Sized>(&self, pacer: &P) -> RoundDecision {
        let round = match self.feed.latest_round().await {
            Ok(round) => round,
            Err(e) => {
                warn!("[Oracle] Round feed unavailable: {}", e);
                return RoundDecision::Anomalous {
                    reason: e.to_string(),
                };
            }
        };

        let decision = evaluate(&round, pacer.now(), &self.rules);
        log_decision(&round, &decision);
        decision
    }
}

fn log_decision(round: &Round, decision: &RoundDecision) {
    match decision {
        RoundDecision::Biddable { round_id, .. } => info!(
            "[Oracle] Round {} is biddable | Moon: {:.2}x | Doom: {:.2}x",
            round_id, round.moon_payout_ratio, round.doom_payout_ratio
        ),
        RoundDecision::NotStarted { round_id } => {
            info!("[Oracle] Round {} has not started yet", round_id)
        }
        RoundDecision::EntryMissed { round_id, wait } => info!(
            "[Oracle] Round {} can no longer be entered, waiting {:.2}s for it to close",
            round_id,
            wait.as_secs_f64()
        ),
        RoundDecision::PayoutTooLow { round_id, moon, doom } => info!(
            "[Oracle] Round {} skipped: payout below floor (moon {:.2}x, doom {:.2}x)",
            round_id, moon, doom
        ),
        RoundDecision::Asymmetric {
            round_id,
            relative_diff,
        } => info!(
            "[Oracle] Round {} skipped: moon/doom differ by {:.1}%",
            round_id,
            relative_diff * 100.0
        ),
        RoundDecision::Anomalous { reason } => warn!("[Oracle] Round not usable: {}", reason),
    }
}
