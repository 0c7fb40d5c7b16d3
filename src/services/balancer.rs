//! Account balancer: makes sure both hedge accounts can cover the next stake
//!
//! Balances are read fresh from the chain on every check. When one account
//! is short and the other can spare funds, a single transfer is pushed
//! through the retry harness and both balances are re-read afterwards.

use super::chain_client::HedgeChain;
use super::pacer::{Dice, Pacer};
use super::retry::{with_retry, RetryConfig};
use crate::error::HedgeError;
use crate::types::from_wei;
use crate::wallet::Account;
use alloy::primitives::{Address, U256};
use tracing::{error, info};

/// Decides how much the richer account sends to the poorer one
pub trait TransferPolicy: Send + Sync {
    /// Amount to move, or `None` when no transfer leaves both accounts
    /// able to cover `required`
    fn transfer_amount(&self, richer: U256, poorer: U256, required: U256) -> Option<U256>;
}

/// Send half of the richer balance, raised to cover the shortfall and
/// capped so the sender keeps `required`
#[derive(Debug, Clone, Copy, Default)]
pub struct HalfOfRicher;

impl TransferPolicy for HalfOfRicher {
    fn transfer_amount(&self, richer: U256, poorer: U256, required: U256) -> Option<U256> {
        let shortfall = required.saturating_sub(poorer);
        let spare = richer.checked_sub(required)?;
        if shortfall > spare {
            return None;
        }
        let amount = (richer / U256::from(2u8)).max(shortfall).min(spare);
        (!amount.is_zero()).then_some(amount)
    }
}

/// Result of a successful `ensure_funded`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceOutcome {
    AlreadyFunded,
    Rebalanced {
        from: Address,
        to: Address,
        amount: U256,
    },
}

pub struct AccountBalancer<T = HalfOfRicher> {
    policy: T,
    retry: RetryConfig,
}

impl AccountBalancer<HalfOfRicher> {
    pub fn new(retry: RetryConfig) -> Self {
        Self::with_policy(HalfOfRicher, retry)
    }
}

impl<T: TransferPolicy> AccountBalancer<T> {
    pub fn with_policy(policy: T, retry: RetryConfig) -> Self {
        Self { policy, retry }
    }

    /// Ensure both accounts hold at least `required` wei.
    ///
    /// Fails with `InsufficientFunds` when no transfer can fix the shortfall
    /// and with `RebalanceFailed` when the transfer never confirmed.
    pub async fn ensure_funded<C, P>(
        &self,
        chain: &C,
        account_a: &Account,
        account_b: &Account,
        required: U256,
        pacer: &P,
        dice: &mut dyn Dice,
    ) -> Result<BalanceOutcome, HedgeError>
    where
        C: HedgeChain + ?Sized,
        P: Pacer + ?Sized,
    {
        let balance_a = chain.balance(account_a).await?;
        let balance_b = chain.balance(account_b).await?;

        info!(
            "[Balancer] {} = {} ETH | {} = {} ETH | stake {} ETH",
            account_a,
            from_wei(balance_a),
            account_b,
            from_wei(balance_b),
            from_wei(required)
        );

        if balance_a >= required && balance_b >= required {
            return Ok(BalanceOutcome::AlreadyFunded);
        }

        let (richer, poorer, richer_balance, poorer_balance) = if balance_a >= balance_b {
            (account_a, account_b, balance_a, balance_b)
        } else {
            (account_b, account_a, balance_b, balance_a)
        };

        let amount = match self
            .policy
            .transfer_amount(richer_balance, poorer_balance, required)
        {
            Some(amount) => amount,
            None => {
                error!(
                    "[Balancer] Not enough funds to cover {} ETH on both accounts",
                    from_wei(required)
                );
                return Err(insufficient(balance_a, balance_b, required));
            }
        };

        info!(
            "[Balancer] Transferring {} ETH from {} to {}",
            from_wei(amount),
            richer,
            poorer
        );

        let confirmed = with_retry(&self.retry, "transfer", chain, richer, pacer, dice, || {
            chain.transfer(richer, poorer.address(), amount)
        })
        .await;

        if !confirmed {
            error!("[Balancer] Transfer {} -> {} never confirmed", richer, poorer);
            return Err(HedgeError::RebalanceFailed {
                from: richer.address().to_string(),
                to: poorer.address().to_string(),
            });
        }

        let balance_a = chain.balance(account_a).await?;
        let balance_b = chain.balance(account_b).await?;
        if balance_a < required || balance_b < required {
            error!(
                "[Balancer] Still short after transfer | {} = {} ETH | {} = {} ETH",
                account_a,
                from_wei(balance_a),
                account_b,
                from_wei(balance_b)
            );
            return Err(HedgeError::RebalanceFailed {
                from: richer.address().to_string(),
                to: poorer.address().to_string(),
            });
        }

        Ok(BalanceOutcome::Rebalanced {
            from: richer.address(),
            to: poorer.address(),
            amount,
        })
    }
}

fn insufficient(balance_a: U256, balance_b: U256, required: U256) -> HedgeError {
    HedgeError::InsufficientFunds {
        balance_a: from_wei(balance_a).to_string(),
        balance_b: from_wei(balance_b).to_string(),
        required: from_wei(required).to_string(),
    }
}
