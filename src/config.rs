//! Configuration management for the hedge bot

use crate::error::HedgeError;
use alloy::primitives::Address;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Chain the bot operates on. Loaded once and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub rpc_endpoint: String,
    pub chain_id: u64,
    /// EIP-1559 fee market (priority fee + max fee) instead of a flat gas price
    pub uses_fee_market: bool,
}

impl Network {
    pub fn blast() -> Self {
        Self {
            rpc_endpoint: "https://rpc.blast.io".to_string(),
            chain_id: 81457,
            uses_fee_market: true,
        }
    }
}

/// Bot configuration loaded from environment
#[derive(Debug, Clone)]
pub struct Config {
    pub network: Network,

    /// File holding exactly two private keys, one per line
    pub private_keys_path: String,

    /// GraphQL endpoint of the round-state feed
    pub feed_url: String,

    /// Contract identifier the feed filters rounds by
    pub feed_contract: String,

    /// Moon or Doom game contract
    pub game_address: Address,

    /// Stake sizes in ether; one is drawn at random per round
    pub bet_amounts: Vec<Decimal>,

    /// Safety margin applied to base fee and gas estimate
    pub gas_multiplier: f64,

    /// How long to wait for a receipt before giving up
    pub confirm_timeout: Duration,

    /// Value attached to claim calls, in ether
    pub claim_fee: Decimal,

    pub timing: HedgeTiming,
}

/// Windows, buffers and thresholds of the hedge loop
#[derive(Debug, Clone, PartialEq)]
pub struct HedgeTiming {
    /// How long after `started_at` a round can still be entered
    pub entry_window: Duration,
    /// Extra wait past `closed_at` when a round was missed
    pub missed_round_buffer: Duration,
    /// Random wait past `closed_at` before claiming, in seconds
    pub settle_buffer_secs: (u64, u64),
    /// Random wait between retry attempts, in seconds
    pub retry_jitter_secs: (u64, u64),
    pub max_attempts: u32,
    /// Pause between full cycles
    pub cycle_delay: Duration,
    /// Both payout ratios must reach this multiplier
    pub min_payout_ratio: f64,
    /// Maximum `|moon - doom| / avg(moon, doom)`
    pub max_payout_asymmetry: f64,
    pub receipt_poll_interval: Duration,
}

impl Default for HedgeTiming {
    fn default() -> Self {
        Self {
            entry_window: Duration::from_secs(12),
            missed_round_buffer: Duration::from_secs(15),
            settle_buffer_secs: (13, 18),
            retry_jitter_secs: (3, 10),
            max_attempts: 3,
            cycle_delay: Duration::from_millis(500),
            min_payout_ratio: 1.5,
            max_payout_asymmetry: 0.05,
            receipt_poll_interval: Duration::from_secs(2),
        }
    }
}

pub const DEFAULT_GAME_ADDRESS: &str = "0x693B37a9859Ce9465Fb2aAdeB03811a26A0c37C0";
pub const DEFAULT_FEED_URL: &str = "https://graphql.yologames.io/graphql";
pub const DEFAULT_FEED_CONTRACT: &str = "MOON_OR_DOOM_ETHUSD_V1_BLAST";

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, HedgeError> {
        // Load .env file if present
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, HedgeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let blast = Network::blast();

        let rpc_endpoint = lookup("RPC_URL").unwrap_or(blast.rpc_endpoint);

        let chain_id = match lookup("CHAIN_ID") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| invalid("CHAIN_ID", &v))?,
            None => blast.chain_id,
        };

        let uses_fee_market = lookup("EIP1559_TX")
            .map(|v| v.trim().to_lowercase() == "true")
            .unwrap_or(blast.uses_fee_market);

        let private_keys_path =
            lookup("PRIVATE_KEYS_PATH").unwrap_or_else(|| "private_keys.txt".to_string());

        let feed_url = lookup("ROUND_FEED_URL").unwrap_or_else(|| DEFAULT_FEED_URL.to_string());
        let feed_contract =
            lookup("ROUND_FEED_CONTRACT").unwrap_or_else(|| DEFAULT_FEED_CONTRACT.to_string());

        let game_address_raw =
            lookup("MOON_OR_DOOM_ADDRESS").unwrap_or_else(|| DEFAULT_GAME_ADDRESS.to_string());
        let game_address = Address::from_str(game_address_raw.trim())
            .map_err(|_| invalid("MOON_OR_DOOM_ADDRESS", &game_address_raw))?;

        let bet_amounts = match lookup("BET_AMOUNTS") {
            Some(v) => parse_bet_amounts(&v)?,
            None => vec![
                Decimal::new(1, 3),
                Decimal::new(2, 3),
                Decimal::new(3, 3),
            ],
        };

        let gas_multiplier = match lookup("GAS_MULTIPLIER") {
            Some(v) => v
                .trim()
                .parse::<f64>()
                .map_err(|_| invalid("GAS_MULTIPLIER", &v))?,
            None => 1.1,
        };
        if !gas_multiplier.is_finite() || gas_multiplier < 1.0 {
            return Err(HedgeError::Configuration(format!(
                "GAS_MULTIPLIER must be >= 1.0, got {}",
                gas_multiplier
            )));
        }

        let confirm_timeout_secs: u64 = match lookup("CONFIRM_TIMEOUT_SECS") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| invalid("CONFIRM_TIMEOUT_SECS", &v))?,
            None => 200,
        };

        let claim_fee = match lookup("CLAIM_FEE") {
            Some(v) => Decimal::from_str(v.trim()).map_err(|_| invalid("CLAIM_FEE", &v))?,
            None => Decimal::ZERO,
        };
        if claim_fee.is_sign_negative() {
            return Err(invalid("CLAIM_FEE", &claim_fee.to_string()));
        }

        Ok(Self {
            network: Network {
                rpc_endpoint,
                chain_id,
                uses_fee_market,
            },
            private_keys_path,
            feed_url,
            feed_contract,
            game_address,
            bet_amounts,
            gas_multiplier,
            confirm_timeout: Duration::from_secs(confirm_timeout_secs),
            claim_fee,
            timing: HedgeTiming::default(),
        })
    }
}

/// Parse a comma separated list of positive ether amounts
fn parse_bet_amounts(raw: &str) -> Result<Vec<Decimal>, HedgeError> {
    let amounts = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match Decimal::from_str(s) {
            Ok(d) if d > Decimal::ZERO => Ok(d),
            _ => Err(invalid("BET_AMOUNTS", s)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if amounts.is_empty() {
        return Err(HedgeError::Configuration(
            "BET_AMOUNTS must list at least one stake".to_string(),
        ));
    }
    Ok(amounts)
}

fn invalid(key: &str, value: &str) -> HedgeError {
    HedgeError::Configuration(format!("invalid value for {}: '{}'", key, value))
}
