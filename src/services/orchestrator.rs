//! Hedge orchestrator: the main loop
//!
//! One cycle runs Balancing -> Deciding -> Betting -> AwaitingClose ->
//! Claiming. Both accounts are driven from this single task, one
//! transaction at a time, so each nonce is fetched right before signing.

use super::balancer::{AccountBalancer, BalanceOutcome, HalfOfRicher, TransferPolicy};
use super::chain_client::HedgeChain;
use super::metrics::HedgeMetrics;
use super::pacer::{until, Dice, Pacer};
use super::retry::{with_retry, RetryConfig};
use super::round_oracle::{OracleRules, RoundOracle};
use crate::config::HedgeTiming;
use crate::error::HedgeError;
use crate::feed::RoundFeed;
use crate::types::{from_wei, Bet, CycleOutcome, Side};
use crate::wallet::Account;
use alloy::primitives::U256;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Drives both accounts through hedge cycles. `T` decides how much a
/// rebalancing transfer moves.
pub struct HedgeOrchestrator<C, F, P, D, T = HalfOfRicher> {
    chain: C,
    oracle: RoundOracle<F>,
    balancer: AccountBalancer<T>,
    pacer: P,
    dice: D,
    account_a: Account,
    account_b: Account,
    stakes: Vec<U256>,
    timing: HedgeTiming,
    retry: RetryConfig,
    metrics: HedgeMetrics,
    stop: Arc<AtomicBool>,
}

impl<C, F, P, D> HedgeOrchestrator<C, F, P, D>
where
    C: HedgeChain,
    F: RoundFeed,
    P: Pacer,
    D: Dice,
{
    pub fn new(
        chain: C,
        feed: F,
        pacer: P,
        dice: D,
        accounts: (Account, Account),
        stakes: Vec<U256>,
        timing: HedgeTiming,
    ) -> Result<Self, HedgeError> {
        if stakes.is_empty() || stakes.iter().any(|s| s.is_zero()) {
            return Err(HedgeError::Configuration(
                "stake sizes must be non-empty and positive".to_string(),
            ));
        }

        let retry = RetryConfig {
            max_attempts: timing.max_attempts,
            jitter_secs: timing.retry_jitter_secs,
        };
        let (account_a, account_b) = accounts;

        Ok(Self {
            chain,
            oracle: RoundOracle::new(feed, OracleRules::from(&timing)),
            balancer: AccountBalancer::new(retry.clone()),
            pacer,
            dice,
            account_a,
            account_b,
            stakes,
            timing,
            retry,
            metrics: HedgeMetrics::new(),
            stop: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl<C, F, P, D, T> HedgeOrchestrator<C, F, P, D, T>
where
    C: HedgeChain,
    F: RoundFeed,
    P: Pacer,
    D: Dice,
    T: TransferPolicy,
{
    /// Swap the rebalancing policy, keeping everything else
    pub fn with_transfer_policy<U: TransferPolicy>(
        self,
        policy: U,
    ) -> HedgeOrchestrator<C, F, P, D, U> {
        HedgeOrchestrator {
            chain: self.chain,
            oracle: self.oracle,
            balancer: AccountBalancer::with_policy(policy, self.retry.clone()),
            pacer: self.pacer,
            dice: self.dice,
            account_a: self.account_a,
            account_b: self.account_b,
            stakes: self.stakes,
            timing: self.timing,
            retry: self.retry,
            metrics: self.metrics,
            stop: self.stop,
        }
    }

    /// Flag checked between cycles; set it to stop `run`
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn metrics(&self) -> &HedgeMetrics {
        &self.metrics
    }

    /// Run cycles until stopped or a fatal error occurs
    pub async fn run(&mut self) -> Result<(), HedgeError> {
        info!(
            "[Hedge] Starting with {} and {}",
            self.account_a, self.account_b
        );

        while !self.stop.load(Ordering::SeqCst) {
            match self.run_cycle().await {
                Ok(outcome) => debug!("[Hedge] Cycle finished: {:?}", outcome),
                Err(e) if e.is_fatal() => {
                    error!("[Hedge] Halting: {}", e);
                    return Err(e);
                }
                Err(e) => warn!("[Hedge] Cycle aborted: {}", e),
            }
            self.pacer.sleep(self.timing.cycle_delay).await;
        }

        info!("[Hedge] Stop requested, exiting loop");
        Ok(())
    }

    /// One Balancing -> Claiming pass. Only fatal errors are returned.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, HedgeError> {
        self.metrics.inc_cycles();

        // Balancing
        let stake = self.stakes[self.dice.pick(self.stakes.len())];
        match self
            .balancer
            .ensure_funded(
                &self.chain,
                &self.account_a,
                &self.account_b,
                stake,
                &self.pacer,
                &mut self.dice,
            )
            .await
        {
            Ok(BalanceOutcome::AlreadyFunded) => {}
            Ok(BalanceOutcome::Rebalanced { .. }) => self.metrics.inc_transfers(),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("[Hedge] Balancing skipped: {}", e);
                return Ok(CycleOutcome::Skipped);
            }
        }

        // Deciding
        let decision = self.oracle.next_biddable_round(&self.pacer).await;
        let Some((round_id, closed_at)) = decision.biddable() else {
            self.metrics.inc_rounds_skipped();
            if let Some(wait) = decision.wait().filter(|w| !w.is_zero()) {
                self.pacer.sleep(wait).await;
            }
            return Ok(CycleOutcome::NoRound);
        };

        // Betting
        let side_a = if self.dice.flip() { Side::Moon } else { Side::Doom };
        info!(
            "[Hedge] Round {} | {} on {} | {} on {} | {} ETH each",
            round_id,
            self.account_a,
            side_a,
            self.account_b,
            side_a.opposite(),
            from_wei(stake)
        );
        for (account, side) in [
            (&self.account_a, side_a),
            (&self.account_b, side_a.opposite()),
        ] {
            let bet = Bet {
                round_id,
                side,
                amount: stake,
            };
            let confirmed = place_bet(&self.chain, account, &bet).await;
            self.metrics.record_bet(confirmed);
        }
        self.metrics.inc_rounds_entered();

        // AwaitingClose
        let buffer = self.dice.between(
            self.timing.settle_buffer_secs.0,
            self.timing.settle_buffer_secs.1,
        );
        let settle = until(self.pacer.now(), closed_at) + Duration::from_secs(buffer);
        info!(
            "[Hedge] Waiting {:.1}s for round {} to settle",
            settle.as_secs_f64(),
            round_id
        );
        self.pacer.sleep(settle).await;

        // Claiming
        let claimed = self.claim_round(round_id).await;
        self.metrics.record_claim(claimed);

        Ok(CycleOutcome::Hedged { round_id, claimed })
    }

    /// Claim with account A; account B is tried only if A never confirms
    async fn claim_round(&mut self, round_id: u64) -> bool {
        let chain = &self.chain;
        let (a, b) = (&self.account_a, &self.account_b);

        let claimed_a = with_retry(&self.retry, "claim", chain, a, &self.pacer, &mut self.dice, || {
            chain.claim(a, round_id)
        })
        .await;
        if claimed_a {
            info!("[Hedge] {} | Claimed round {}", a, round_id);
            return true;
        }

        warn!("[Hedge] {} | Claim failed, falling back to {}", a, b);
        let claimed_b = with_retry(&self.retry, "claim", chain, b, &self.pacer, &mut self.dice, || {
            chain.claim(b, round_id)
        })
        .await;
        if claimed_b {
            info!("[Hedge] {} | Claimed round {}", b, round_id);
        } else {
            error!("[Hedge] Round {} could not be claimed by either account", round_id);
        }
        claimed_b
    }
}

/// Submit and confirm one side of the hedge. Failures are logged only.
async fn place_bet<C: HedgeChain + ?Sized>(chain: &C, account: &Account, bet: &Bet) -> bool {
    let Some(tx_hash) = chain.enter_bet(account, bet).await else {
        error!(
            "[Hedge] {} | {} bet on round {} was not sent",
            account, bet.side, bet.round_id
        );
        return false;
    };

    if chain.confirm(account, tx_hash).await {
        info!(
            "[Hedge] {} | {} bet on round {} confirmed {:?}",
            account, bet.side, bet.round_id, tx_hash
        );
        true
    } else {
        let err = HedgeError::UnconfirmedTransaction {
            address: account.address().to_string(),
            tx_hash: format!("{:?}", tx_hash),
        };
        error!("[Hedge] {} bet on round {}: {}", bet.side, bet.round_id, err);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{round_at, ManualPacer, MockChain, ScriptedDice, StaticFeed};
    use crate::types::to_wei;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn stakes() -> Vec<U256> {
        vec![
            to_wei(dec!(0.001)).unwrap(),
            to_wei(dec!(0.002)).unwrap(),
            to_wei(dec!(0.003)).unwrap(),
        ]
    }

    struct Harness {
        chain: MockChain,
        pacer: ManualPacer,
        a: Account,
        b: Account,
    }

    fn harness(now: DateTime<Utc>) -> Harness {
        let h = Harness {
            chain: MockChain::default(),
            pacer: ManualPacer::starting_at(now),
            a: Account::random(),
            b: Account::random(),
        };
        h.chain.set_balance(&h.a, to_wei(dec!(1)).unwrap());
        h.chain.set_balance(&h.b, to_wei(dec!(1)).unwrap());
        h
    }

    fn orchestrator(
        h: &Harness,
        feed: StaticFeed,
        dice: ScriptedDice,
    ) -> HedgeOrchestrator<MockChain, StaticFeed, ManualPacer, ScriptedDice> {
        HedgeOrchestrator::new(
            h.chain.clone(),
            feed,
            h.pacer.clone(),
            dice,
            (h.a.clone(), h.b.clone()),
            stakes(),
            HedgeTiming::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_full_cycle_hedges_and_claims_with_a() {
        let h = harness(t0() + chrono::Duration::seconds(2));
        let feed = StaticFeed::new(vec![Ok(round_at(42, t0(), 1.8, 1.75))]);
        let dice = ScriptedDice::new(vec![15, 4]).with_picks(vec![1]).with_flips(vec![false]);
        let mut bot = orchestrator(&h, feed, dice);

        let outcome = bot.run_cycle().await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Hedged {
                round_id: 42,
                claimed: true
            }
        );

        let stake = to_wei(dec!(0.002)).unwrap();
        assert_eq!(
            h.chain.bets(),
            vec![
                (
                    h.a.address(),
                    Bet {
                        round_id: 42,
                        side: Side::Doom,
                        amount: stake
                    }
                ),
                (
                    h.b.address(),
                    Bet {
                        round_id: 42,
                        side: Side::Moon,
                        amount: stake
                    }
                ),
            ]
        );

        // 28s to close + 15s settle buffer, then the claim jitter
        assert_eq!(
            h.pacer.sleeps(),
            vec![Duration::from_secs(43), Duration::from_secs(4)]
        );
        assert_eq!(h.chain.claim_attempts(), vec![(h.a.address(), 42)]);

        let snap = bot.metrics().snapshot();
        assert_eq!(snap.rounds_entered, 1);
        assert_eq!(snap.bets_confirmed, 2);
        assert_eq!(snap.claims_confirmed, 1);
    }

    #[tokio::test]
    async fn test_claim_falls_back_to_b_after_three_failures() {
        let h = harness(t0() + chrono::Duration::seconds(2));
        h.chain.fail_claims_for(&h.a);
        let feed = StaticFeed::new(vec![Ok(round_at(7, t0(), 1.8, 1.75))]);
        let mut bot = orchestrator(&h, feed, ScriptedDice::new(vec![13]));

        let outcome = bot.run_cycle().await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Hedged {
                round_id: 7,
                claimed: true
            }
        );
        assert_eq!(
            h.chain.claim_attempts(),
            vec![
                (h.a.address(), 7),
                (h.a.address(), 7),
                (h.a.address(), 7),
                (h.b.address(), 7),
            ]
        );
    }

    #[tokio::test]
    async fn test_one_failed_bet_does_not_abort_round() {
        let h = harness(t0() + chrono::Duration::seconds(2));
        h.chain.fail_bets_for(&h.b);
        let feed = StaticFeed::new(vec![Ok(round_at(8, t0(), 1.8, 1.8))]);
        let mut bot = orchestrator(&h, feed, ScriptedDice::new(vec![13]));

        let outcome = bot.run_cycle().await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Hedged { round_id: 8, .. }));
        assert_eq!(h.chain.bets().len(), 1);
        assert_eq!(h.chain.claim_attempts(), vec![(h.a.address(), 8)]);

        let snap = bot.metrics().snapshot();
        assert_eq!(snap.bets_confirmed, 1);
        assert_eq!(snap.bets_failed, 1);
    }

    #[tokio::test]
    async fn test_missed_round_waits_for_close() {
        let h = harness(t0() + chrono::Duration::seconds(20));
        let feed = StaticFeed::new(vec![Ok(round_at(9, t0(), 1.8, 1.8))]);
        let mut bot = orchestrator(&h, feed, ScriptedDice::new(vec![13]));

        let outcome = bot.run_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::NoRound);
        // 10s until close + 15s buffer
        assert_eq!(h.pacer.sleeps(), vec![Duration::from_secs(25)]);
        assert!(h.chain.bets().is_empty());
    }

    #[tokio::test]
    async fn test_slow_feed_answer_counts_against_entry_window() {
        let h = harness(t0() + chrono::Duration::seconds(2));
        let feed = StaticFeed::new(vec![Ok(round_at(11, t0(), 1.8, 1.75))])
            .with_delay(h.pacer.clone(), Duration::from_secs(20));
        let mut bot = orchestrator(&h, feed, ScriptedDice::new(vec![13]));

        assert_eq!(bot.run_cycle().await.unwrap(), CycleOutcome::NoRound);
        assert!(h.chain.bets().is_empty());
        // answer lands at T+22: 8s until close + 15s buffer
        assert_eq!(
            h.pacer.sleeps(),
            vec![Duration::from_secs(20), Duration::from_secs(23)]
        );
    }

    #[tokio::test]
    async fn test_rejected_round_does_not_wait() {
        let h = harness(t0() + chrono::Duration::seconds(2));
        let feed = StaticFeed::new(vec![Ok(round_at(10, t0(), 1.4, 1.4))]);
        let mut bot = orchestrator(&h, feed, ScriptedDice::new(vec![13]));

        assert_eq!(bot.run_cycle().await.unwrap(), CycleOutcome::NoRound);
        assert!(h.pacer.sleeps().is_empty());
        assert_eq!(bot.metrics().snapshot().rounds_skipped, 1);
    }

    #[tokio::test]
    async fn test_balance_read_failure_skips_cycle() {
        let h = harness(t0());
        h.chain.fail_balance_reads(true);
        let mut bot = orchestrator(&h, StaticFeed::new(vec![]), ScriptedDice::new(vec![13]));

        assert_eq!(bot.run_cycle().await.unwrap(), CycleOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_run_halts_on_insufficient_funds() {
        let h = harness(t0());
        h.chain.set_balance(&h.a, U256::ZERO);
        h.chain.set_balance(&h.b, U256::ZERO);
        let mut bot = orchestrator(&h, StaticFeed::new(vec![]), ScriptedDice::new(vec![13]));

        let err = bot.run().await.unwrap_err();
        assert!(matches!(err, HedgeError::InsufficientFunds { .. }));
        assert!(h.chain.bets().is_empty());
        assert!(h.chain.transfers().is_empty());
    }

    #[tokio::test]
    async fn test_run_respects_stop_flag() {
        let h = harness(t0());
        let mut bot = orchestrator(&h, StaticFeed::new(vec![]), ScriptedDice::new(vec![13]));
        bot.stop_handle().store(true, Ordering::SeqCst);

        bot.run().await.unwrap();
        assert_eq!(bot.metrics().snapshot().cycles, 0);
    }

    struct FixedTransfer(U256);

    impl TransferPolicy for FixedTransfer {
        fn transfer_amount(&self, _richer: U256, _poorer: U256, _required: U256) -> Option<U256> {
            Some(self.0)
        }
    }

    #[tokio::test]
    async fn test_custom_transfer_policy_sets_amount() {
        let h = harness(t0());
        h.chain.set_balance(&h.a, U256::ZERO);
        let amount = to_wei(dec!(0.1)).unwrap();
        let mut bot = orchestrator(&h, StaticFeed::new(vec![]), ScriptedDice::new(vec![13]))
            .with_transfer_policy(FixedTransfer(amount));

        assert_eq!(bot.run_cycle().await.unwrap(), CycleOutcome::NoRound);
        assert_eq!(
            h.chain.transfers(),
            vec![(h.b.address(), h.a.address(), amount)]
        );
        assert_eq!(bot.metrics().snapshot().transfers, 1);
    }

    #[test]
    fn test_empty_stakes_rejected() {
        let h = harness(t0());
        let result = HedgeOrchestrator::new(
            h.chain.clone(),
            StaticFeed::new(vec![]),
            h.pacer.clone(),
            ScriptedDice::new(vec![]),
            (h.a.clone(), h.b.clone()),
            vec![],
            HedgeTiming::default(),
        );
        assert!(matches!(result, Err(HedgeError::Configuration(_))));
    }
}
