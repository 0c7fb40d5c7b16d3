//! Chain client: fee estimation, transaction assembly, submission and
//! confirmation for the hedge accounts.
//!
//! Every submission fetches a fresh nonce and fresh fee data right before
//! signing. Submission failures are logged and reported as `None`; a `None`
//! always means the transaction was not sent.

use crate::config::Config;
use crate::error::ChainError;
use crate::services::game_contract;
use crate::services::pacer::Pacer;
use crate::services::rpc::{CallRequest, ChainRpc};
use crate::types::{to_wei, Bet};
use crate::wallet::Account;
use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::signers::SignerSync;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Fixed-point precision used when applying the gas multiplier
const MULTIPLIER_SCALE: u128 = 10_000;

/// Chain operations the balancer and orchestrator depend on
#[async_trait]
pub trait HedgeChain: Send + Sync {
    /// Fresh on-chain balance in wei
    async fn balance(&self, account: &Account) -> Result<U256, ChainError>;

    async fn transfer(&self, from: &Account, to: Address, value: U256) -> Option<B256>;

    async fn enter_bet(&self, account: &Account, bet: &Bet) -> Option<B256>;

    async fn claim(&self, account: &Account, round_id: u64) -> Option<B256>;

    /// True only once a receipt with success status is observed
    async fn confirm(&self, account: &Account, tx_hash: B256) -> bool;
}

/// Caller-supplied fee fields; supplied values are used verbatim
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeOverrides {
    pub max_priority_fee_per_gas: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
}

/// Resolved gas pricing of one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasPricing {
    FeeMarket {
        max_priority_fee_per_gas: u128,
        max_fee_per_gas: u128,
    },
    Legacy {
        gas_price: u128,
    },
}

/// Chain client settings
#[derive(Debug, Clone)]
pub struct ChainSettings {
    pub chain_id: u64,
    pub uses_fee_market: bool,
    pub game_address: Address,
    pub gas_multiplier: f64,
    pub confirm_timeout: Duration,
    pub receipt_poll_interval: Duration,
    /// Value attached to claim calls, in wei
    pub claim_fee: U256,
}

impl ChainSettings {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            chain_id: config.network.chain_id,
            uses_fee_market: config.network.uses_fee_market,
            game_address: config.game_address,
            gas_multiplier: config.gas_multiplier,
            confirm_timeout: config.confirm_timeout,
            receipt_poll_interval: config.timing.receipt_poll_interval,
            claim_fee: to_wei(config.claim_fee)?,
        })
    }
}

/// Chain client shared by both hedge accounts
pub struct ChainClient<R, P> {
    rpc: R,
    pacer: P,
    settings: ChainSettings,
}

impl<R: ChainRpc, P: Pacer> ChainClient<R, P> {
    pub fn new(rpc: R, pacer: P, settings: ChainSettings) -> Self {
        Self {
            rpc,
            pacer,
            settings,
        }
    }

    pub fn settings(&self) -> &ChainSettings {
        &self.settings
    }

    /// Median `maxPriorityFeePerGas` of the latest block's transactions,
    /// falling back to the node's suggestion when none carries one
    pub async fn estimate_priority_fee(&self) -> Result<u128, ChainError> {
        let block = self.rpc.latest_block().await?;
        self.priority_fee_for_block(block.number).await
    }

    async fn priority_fee_for_block(&self, block: u64) -> Result<u128, ChainError> {
        let count = self.rpc.block_transaction_count(block).await?;

        let mut samples = Vec::with_capacity(count as usize);
        for index in 0..count {
            match self.rpc.transaction_priority_fee(block, index).await {
                Ok(Some(fee)) => samples.push(fee),
                Ok(None) => {}
                Err(e) => debug!("[Chain] Skipping tx {} of block {}: {}", index, block, e),
            }
        }

        match median(samples) {
            Some(fee) => Ok(fee),
            None => {
                debug!("[Chain] No priority fees in block {}, using node suggestion", block);
                self.rpc.max_priority_fee().await
            }
        }
    }

    /// Resolve gas pricing for the configured network
    pub async fn resolve_pricing(&self, overrides: FeeOverrides) -> Result<GasPricing, ChainError> {
        if !self.settings.uses_fee_market {
            return Ok(GasPricing::Legacy {
                gas_price: self.rpc.gas_price().await?,
            });
        }

        if let FeeOverrides {
            max_priority_fee_per_gas: Some(priority),
            max_fee_per_gas: Some(max_fee),
        } = overrides
        {
            return Ok(GasPricing::FeeMarket {
                max_priority_fee_per_gas: priority,
                max_fee_per_gas: max_fee,
            });
        }

        let block = self.rpc.latest_block().await?;
        let priority = match overrides.max_priority_fee_per_gas {
            Some(fee) => fee,
            None => self.priority_fee_for_block(block.number).await?,
        };
        let max_fee = match overrides.max_fee_per_gas {
            Some(fee) => fee,
            None => {
                let base_fee = block.base_fee_per_gas.ok_or(ChainError::Malformed {
                    method: "eth_getBlockByNumber",
                    reason: "latest block has no baseFeePerGas".to_string(),
                })?;
                scale_by(base_fee, self.settings.gas_multiplier).saturating_add(priority)
            }
        };

        Ok(GasPricing::FeeMarket {
            max_priority_fee_per_gas: priority,
            max_fee_per_gas: max_fee,
        })
    }

    /// Build, sign and submit a transaction from `account`.
    ///
    /// Returns the transaction hash, or `None` (already logged) when
    /// anything before or during submission failed.
    pub async fn build_and_submit(
        &self,
        account: &Account,
        to: Address,
        data: Option<Bytes>,
        value: Option<U256>,
        overrides: FeeOverrides,
    ) -> Option<B256> {
        match self.try_submit(account, to, data, value, overrides).await {
            Ok(tx_hash) => {
                debug!("[Chain] {} | Submitted {:?}", account, tx_hash);
                Some(tx_hash)
            }
            Err(e) => {
                error!("[Chain] {} | Transaction failed | {}", account, e);
                None
            }
        }
    }

    async fn try_submit(
        &self,
        account: &Account,
        to: Address,
        data: Option<Bytes>,
        value: Option<U256>,
        overrides: FeeOverrides,
    ) -> Result<B256, ChainError> {
        let nonce = self.rpc.transaction_count(account.address()).await?;
        let pricing = self.resolve_pricing(overrides).await?;

        let estimate = self
            .rpc
            .estimate_gas(&CallRequest {
                from: account.address(),
                to,
                value,
                data: data.clone(),
            })
            .await?;
        let gas_limit = scale_gas(estimate, self.settings.gas_multiplier);

        debug!(
            "[Chain] {} | nonce={} gas_limit={} pricing={:?}",
            account, nonce, gas_limit, pricing
        );

        let raw = sign_transaction(
            account,
            self.settings.chain_id,
            nonce,
            pricing,
            gas_limit,
            to,
            value.unwrap_or(U256::ZERO),
            data.unwrap_or_default(),
        )?;

        self.rpc.send_raw_transaction(&raw).await
    }

    /// Wait up to `timeout` for a successful receipt
    pub async fn confirm_within(&self, account: &Account, tx_hash: B256, timeout: Duration) -> bool {
        let deadline = self.pacer.now()
            + chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::zero());

        loop {
            match self.rpc.receipt_status(tx_hash).await {
                Ok(Some(true)) => return true,
                Ok(Some(false)) => {
                    error!("[Chain] {} | Transaction failed on-chain {:?}", account, tx_hash);
                    return false;
                }
                Ok(None) => {}
                Err(e) => warn!("[Chain] {} | Receipt lookup for {:?} failed: {}", account, tx_hash, e),
            }

            if self.pacer.now() >= deadline {
                error!(
                    "[Chain] {} | No receipt for {:?} within {:?}",
                    account, tx_hash, timeout
                );
                return false;
            }
            self.pacer.sleep(self.settings.receipt_poll_interval).await;
        }
    }
}

#[async_trait]
impl<R: ChainRpc, P: Pacer> HedgeChain for ChainClient<R, P> {
    async fn balance(&self, account: &Account) -> Result<U256, ChainError> {
        self.rpc.balance(account.address()).await
    }

    async fn transfer(&self, from: &Account, to: Address, value: U256) -> Option<B256> {
        self.build_and_submit(from, to, None, Some(value), FeeOverrides::default())
            .await
    }

    async fn enter_bet(&self, account: &Account, bet: &Bet) -> Option<B256> {
        info!(
            "[Chain] {} | Entering {} on round {} with {} wei",
            account, bet.side, bet.round_id, bet.amount
        );
        self.build_and_submit(
            account,
            self.settings.game_address,
            Some(game_contract::enter_calldata(bet.side, bet.round_id)),
            Some(bet.amount),
            FeeOverrides::default(),
        )
        .await
    }

    async fn claim(&self, account: &Account, round_id: u64) -> Option<B256> {
        let fee = self.settings.claim_fee;
        self.build_and_submit(
            account,
            self.settings.game_address,
            Some(game_contract::claim_calldata(round_id)),
            (!fee.is_zero()).then_some(fee),
            FeeOverrides::default(),
        )
        .await
    }

    async fn confirm(&self, account: &Account, tx_hash: B256) -> bool {
        self.confirm_within(account, tx_hash, self.settings.confirm_timeout)
            .await
    }
}

/// Statistical median; the two middle values are averaged (floor) for
/// even-length samples
pub fn median(mut samples: Vec<u128>) -> Option<u128> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_unstable();
    let mid = samples.len() / 2;
    if samples.len() % 2 == 1 {
        Some(samples[mid])
    } else {
        let (lo, hi) = (samples[mid - 1], samples[mid]);
        Some(lo + (hi - lo) / 2)
    }
}

fn multiplier_bps(multiplier: f64) -> u128 {
    (multiplier.max(0.0) * MULTIPLIER_SCALE as f64).round() as u128
}

/// `value × multiplier`, rounded down
pub fn scale_by(value: u128, multiplier: f64) -> u128 {
    value.saturating_mul(multiplier_bps(multiplier)) / MULTIPLIER_SCALE
}

/// `estimate × multiplier`, rounded up
pub fn scale_gas(estimate: u64, multiplier: f64) -> u64 {
    let scaled = (estimate as u128)
        .saturating_mul(multiplier_bps(multiplier))
        .div_ceil(MULTIPLIER_SCALE);
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

/// Sign and EIP-2718 encode a plain call/transfer transaction
#[allow(clippy::too_many_arguments)]
pub fn sign_transaction(
    account: &Account,
    chain_id: u64,
    nonce: u64,
    pricing: GasPricing,
    gas_limit: u64,
    to: Address,
    value: U256,
    input: Bytes,
) -> Result<Vec<u8>, ChainError> {
    let signer = account.signer();
    let envelope: TxEnvelope = match pricing {
        GasPricing::FeeMarket {
            max_priority_fee_per_gas,
            max_fee_per_gas,
        } => {
            let tx = TxEip1559 {
                chain_id,
                nonce,
                gas_limit,
                max_fee_per_gas,
                max_priority_fee_per_gas,
                to: TxKind::Call(to),
                value,
                input,
                ..Default::default()
            };
            let signature = signer
                .sign_hash_sync(&tx.signature_hash())
                .map_err(|e| ChainError::Signing(e.to_string()))?;
            tx.into_signed(signature).into()
        }
        GasPricing::Legacy { gas_price } => {
            let tx = TxLegacy {
                chain_id: Some(chain_id),
                nonce,
                gas_price,
                gas_limit,
                to: TxKind::Call(to),
                value,
                input,
            };
            let signature = signer
                .sign_hash_sync(&tx.signature_hash())
                .map_err(|e| ChainError::Signing(e.to_string()))?;
            tx.into_signed(signature).into()
        }
    };

    Ok(envelope.encoded_2718())
}
