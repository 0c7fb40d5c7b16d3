//! Bounded retry for submit-and-confirm operations
//!
//! Each attempt submits, then waits for a successful receipt. Attempts are
//! separated by a random jitter so the bot does not hit the mempool on a
//! fixed beat.

use super::chain_client::HedgeChain;
use super::pacer::{Dice, Pacer};
use crate::wallet::Account;
use alloy::primitives::B256;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info};

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Jitter bounds in whole seconds, inclusive
    pub jitter_secs: (u64, u64),
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            jitter_secs: (3, 10),
        }
    }
}

/// Run `operation` until one of its transactions is confirmed.
///
/// `operation` returns the submitted hash, or `None` when nothing was sent.
/// Returns whether any attempt was confirmed; never fails outward.
pub async fn with_retry<C, P, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    chain: &C,
    account: &Account,
    pacer: &P,
    dice: &mut dyn Dice,
    mut operation: F,
) -> bool
where
    C: HedgeChain + ?Sized,
    P: Pacer + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<B256>>,
{
    for attempt in 1..=config.max_attempts {
        let jitter = Duration::from_secs(dice.between(config.jitter_secs.0, config.jitter_secs.1));

        match operation().await {
            Some(tx_hash) => {
                info!(
                    "[Retry] {} | {} sent {:?} (attempt {}/{})",
                    account, operation_name, tx_hash, attempt, config.max_attempts
                );
                if chain.confirm(account, tx_hash).await {
                    info!("[Retry] {} | {} confirmed {:?}", account, operation_name, tx_hash);
                    info!("[Retry] Sleeping {:?}", jitter);
                    pacer.sleep(jitter).await;
                    return true;
                }
                error!(
                    "[Retry] {} | {} not confirmed {:?}",
                    account, operation_name, tx_hash
                );
            }
            None => {
                error!(
                    "[Retry] {} | {} not sent (attempt {}/{})",
                    account, operation_name, attempt, config.max_attempts
                );
            }
        }

        info!("[Retry] Sleeping {:?}", jitter);
        pacer.sleep(jitter).await;
    }

    error!(
        "[Retry] {} | {} failed after {} attempts",
        account, operation_name, config.max_attempts
    );
    false
}
