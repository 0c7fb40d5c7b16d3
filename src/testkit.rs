//! Deterministic stand-ins for the clock, randomness, chain and feed

use crate::error::{ChainError, FeedError};
use crate::feed::RoundFeed;
use crate::services::chain_client::HedgeChain;
use crate::services::pacer::{Dice, Pacer};
use crate::services::rpc::{BlockHeader, CallRequest, ChainRpc};
use crate::types::{Bet, Round};
use crate::wallet::Account;
use alloy::primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Round starting at `started_at`, locking 25s and closing 30s later
pub fn round_at(on_chain_id: u64, started_at: DateTime<Utc>, moon: f64, doom: f64) -> Round {
    Round {
        on_chain_id,
        started_at,
        locked_at: started_at + chrono::Duration::seconds(25),
        closed_at: started_at + chrono::Duration::seconds(30),
        moon_payout_ratio: moon,
        doom_payout_ratio: doom,
        status: "LIVE".to_string(),
    }
}

// ---- Pacer ----

/// Virtual clock; `sleep` advances it instantly and records the duration
#[derive(Debug, Clone)]
pub struct ManualPacer {
    inner: Arc<Mutex<PacerState>>,
}

#[derive(Debug)]
struct PacerState {
    now: DateTime<Utc>,
    sleeps: Vec<Duration>,
}

impl ManualPacer {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PacerState {
                now,
                sleeps: Vec::new(),
            })),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.inner.lock().unwrap().sleeps.clone()
    }
}

impl Default for ManualPacer {
    fn default() -> Self {
        Self::starting_at(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())
    }
}

#[async_trait]
impl Pacer for ManualPacer {
    fn now(&self) -> DateTime<Utc> {
        self.inner.lock().unwrap().now
    }

    async fn sleep(&self, duration: Duration) {
        let mut state = self.inner.lock().unwrap();
        state.now += chrono::Duration::from_std(duration).unwrap();
        state.sleeps.push(duration);
    }
}

// ---- Dice ----

/// Replays scripted values, cycling through each list
#[derive(Debug, Clone, Default)]
pub struct ScriptedDice {
    values: Vec<u64>,
    flips: Vec<bool>,
    picks: Vec<usize>,
    calls: (usize, usize, usize),
}

impl ScriptedDice {
    /// `values` feed `between`; flips default to true and picks to 0
    pub fn new(values: Vec<u64>) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }

    pub fn with_flips(mut self, flips: Vec<bool>) -> Self {
        self.flips = flips;
        self
    }

    pub fn with_picks(mut self, picks: Vec<usize>) -> Self {
        self.picks = picks;
        self
    }
}

fn cycle<T: Copy>(items: &[T], counter: &mut usize) -> Option<T> {
    if items.is_empty() {
        return None;
    }
    let item = items[*counter % items.len()];
    *counter += 1;
    Some(item)
}

impl Dice for ScriptedDice {
    fn between(&mut self, lo: u64, _hi: u64) -> u64 {
        cycle(&self.values, &mut self.calls.0).unwrap_or(lo)
    }

    fn flip(&mut self) -> bool {
        cycle(&self.flips, &mut self.calls.1).unwrap_or(true)
    }

    fn pick(&mut self, len: usize) -> usize {
        cycle(&self.picks, &mut self.calls.2).unwrap_or(0) % len.max(1)
    }
}

// ---- Raw RPC ----

/// Mutable knobs and recordings of `MockRpc`
#[derive(Debug)]
pub struct MockRpcState {
    pub balances: HashMap<Address, U256>,
    pub nonces: HashMap<Address, u64>,
    pub block_number: u64,
    pub base_fee: Option<u128>,
    pub priority_fees: Vec<Option<u128>>,
    pub failing_tx_indices: Vec<u64>,
    pub suggested_priority_fee: u128,
    pub gas_price: u128,
    pub gas_estimate: u64,
    pub fail_estimate: bool,
    pub fail_send: bool,
    pub receipts: VecDeque<Option<bool>>,
    pub sent: Vec<Vec<u8>>,
    pub estimates: Vec<CallRequest>,
}

impl Default for MockRpcState {
    fn default() -> Self {
        Self {
            balances: HashMap::new(),
            nonces: HashMap::new(),
            block_number: 100,
            base_fee: Some(1_000),
            priority_fees: Vec::new(),
            failing_tx_indices: Vec::new(),
            suggested_priority_fee: 2,
            gas_price: 1_000,
            gas_estimate: 21_000,
            fail_estimate: false,
            fail_send: false,
            receipts: VecDeque::new(),
            sent: Vec::new(),
            estimates: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MockRpc {
    state: Mutex<MockRpcState>,
}

impl MockRpc {
    pub fn state(&self) -> MutexGuard<'_, MockRpcState> {
        self.state.lock().unwrap()
    }

    /// Transactions of the latest block, by index
    pub fn set_priority_fees(&self, fees: Vec<Option<u128>>) {
        self.state().priority_fees = fees;
    }

    /// Receipt lookups answered in order; pending once exhausted
    pub fn push_receipts(&self, receipts: impl IntoIterator<Item = Option<bool>>) {
        self.state().receipts.extend(receipts);
    }

    pub fn sent_transactions(&self) -> Vec<Vec<u8>> {
        self.state().sent.clone()
    }

    pub fn estimate_requests(&self) -> Vec<CallRequest> {
        self.state().estimates.clone()
    }
}

#[async_trait]
impl ChainRpc for MockRpc {
    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        Ok(self.state().balances.get(&address).copied().unwrap_or_default())
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, ChainError> {
        Ok(self.state().nonces.get(&address).copied().unwrap_or(0))
    }

    async fn latest_block(&self) -> Result<BlockHeader, ChainError> {
        let state = self.state();
        Ok(BlockHeader {
            number: state.block_number,
            base_fee_per_gas: state.base_fee,
        })
    }

    async fn block_transaction_count(&self, _block: u64) -> Result<u64, ChainError> {
        Ok(self.state().priority_fees.len() as u64)
    }

    async fn transaction_priority_fee(
        &self,
        _block: u64,
        index: u64,
    ) -> Result<Option<u128>, ChainError> {
        let state = self.state();
        if state.failing_tx_indices.contains(&index) {
            return Err(ChainError::Transport("tx lookup failed".to_string()));
        }
        Ok(state.priority_fees.get(index as usize).copied().flatten())
    }

    async fn max_priority_fee(&self) -> Result<u128, ChainError> {
        Ok(self.state().suggested_priority_fee)
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        Ok(self.state().gas_price)
    }

    async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, ChainError> {
        let mut state = self.state();
        state.estimates.push(call.clone());
        if state.fail_estimate {
            return Err(ChainError::Rpc {
                code: -32000,
                message: "execution reverted".to_string(),
            });
        }
        Ok(state.gas_estimate)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, ChainError> {
        let mut state = self.state();
        if state.fail_send {
            return Err(ChainError::Rpc {
                code: -32000,
                message: "nonce too low".to_string(),
            });
        }
        state.sent.push(raw.to_vec());
        Ok(keccak256(raw))
    }

    async fn receipt_status(&self, _tx_hash: B256) -> Result<Option<bool>, ChainError> {
        Ok(self.state().receipts.pop_front().flatten())
    }
}

// ---- Hedge chain ----

#[derive(Debug, Default)]
struct ChainState {
    balances: HashMap<Address, U256>,
    fail_balance_reads: bool,
    failing_bets: HashSet<Address>,
    failing_claims: HashSet<Address>,
    confirmations: VecDeque<bool>,
    confirm_calls: Vec<B256>,
    transfers: Vec<(Address, Address, U256)>,
    bets: Vec<(Address, Bet)>,
    claim_attempts: Vec<(Address, u64)>,
    next_hash: u64,
}

impl ChainState {
    fn hash(&mut self) -> B256 {
        self.next_hash += 1;
        B256::left_padding_from(&self.next_hash.to_be_bytes())
    }
}

/// In-memory chain; transfers move balances as soon as they are sent and
/// confirmations succeed unless scripted otherwise
#[derive(Debug, Clone, Default)]
pub struct MockChain {
    inner: Arc<Mutex<ChainState>>,
}

impl MockChain {
    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.inner.lock().unwrap()
    }

    pub fn set_balance(&self, account: &Account, balance: U256) {
        self.state().balances.insert(account.address(), balance);
    }

    pub fn balance_of(&self, account: &Account) -> U256 {
        self.state()
            .balances
            .get(&account.address())
            .copied()
            .unwrap_or_default()
    }

    pub fn fail_balance_reads(&self, fail: bool) {
        self.state().fail_balance_reads = fail;
    }

    pub fn fail_bets_for(&self, account: &Account) {
        self.state().failing_bets.insert(account.address());
    }

    pub fn fail_claims_for(&self, account: &Account) {
        self.state().failing_claims.insert(account.address());
    }

    /// Outcomes of the next `confirm` calls, in order
    pub fn script_confirmations(&self, outcomes: impl IntoIterator<Item = bool>) {
        self.state().confirmations.extend(outcomes);
    }

    pub fn confirm_calls(&self) -> Vec<B256> {
        self.state().confirm_calls.clone()
    }

    pub fn transfers(&self) -> Vec<(Address, Address, U256)> {
        self.state().transfers.clone()
    }

    /// Bets that were sent
    pub fn bets(&self) -> Vec<(Address, Bet)> {
        self.state().bets.clone()
    }

    /// Every claim call, sent or not
    pub fn claim_attempts(&self) -> Vec<(Address, u64)> {
        self.state().claim_attempts.clone()
    }
}

#[async_trait]
impl HedgeChain for MockChain {
    async fn balance(&self, account: &Account) -> Result<U256, ChainError> {
        let state = self.state();
        if state.fail_balance_reads {
            return Err(ChainError::Transport("balance unavailable".to_string()));
        }
        Ok(state
            .balances
            .get(&account.address())
            .copied()
            .unwrap_or_default())
    }

    async fn transfer(&self, from: &Account, to: Address, value: U256) -> Option<B256> {
        let mut state = self.state();
        let sender = state.balances.entry(from.address()).or_default();
        *sender = sender.saturating_sub(value);
        let receiver = state.balances.entry(to).or_default();
        *receiver = receiver.saturating_add(value);
        state.transfers.push((from.address(), to, value));
        Some(state.hash())
    }

    async fn enter_bet(&self, account: &Account, bet: &Bet) -> Option<B256> {
        let mut state = self.state();
        if state.failing_bets.contains(&account.address()) {
            return None;
        }
        state.bets.push((account.address(), *bet));
        Some(state.hash())
    }

    async fn claim(&self, account: &Account, round_id: u64) -> Option<B256> {
        let mut state = self.state();
        state.claim_attempts.push((account.address(), round_id));
        if state.failing_claims.contains(&account.address()) {
            return None;
        }
        Some(state.hash())
    }

    async fn confirm(&self, _account: &Account, tx_hash: B256) -> bool {
        let mut state = self.state();
        state.confirm_calls.push(tx_hash);
        state.confirmations.pop_front().unwrap_or(true)
    }
}

// ---- Round feed ----

/// Serves scripted snapshots in order, then fails
#[derive(Debug, Default)]
pub struct StaticFeed {
    rounds: Mutex<VecDeque<Result<Round, FeedError>>>,
    delay: Option<(ManualPacer, Duration)>,
}

impl StaticFeed {
    pub fn new(rounds: Vec<Result<Round, FeedError>>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into()),
            delay: None,
        }
    }

    /// Each answer advances `pacer` by `delay` before it is returned
    pub fn with_delay(mut self, pacer: ManualPacer, delay: Duration) -> Self {
        self.delay = Some((pacer, delay));
        self
    }
}

#[async_trait]
impl RoundFeed for StaticFeed {
    async fn latest_round(&self) -> Result<Round, FeedError> {
        if let Some((pacer, delay)) = &self.delay {
            pacer.sleep(*delay).await;
        }
        self.rounds
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(FeedError::Transport("no rounds scripted".to_string())))
    }
}
