//! Core types for the hedge bot

use alloy::primitives::U256;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wei per ether
const WEI_SCALE: u32 = 18;

/// The two outcomes a bet can be placed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Moon,
    Doom,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Moon => Side::Doom,
            Side::Doom => Side::Moon,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Moon => write!(f, "MOON"),
            Side::Doom => write!(f, "DOOM"),
        }
    }
}

/// Snapshot of one game round as reported by the round feed.
///
/// Never mutated; the oracle fetches a fresh snapshot on every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub on_chain_id: u64,
    pub started_at: DateTime<Utc>,
    pub locked_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub moon_payout_ratio: f64,
    pub doom_payout_ratio: f64,
    pub status: String,
}

/// Settled outcome of a round plus one player's entries in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    pub on_chain_id: u64,
    /// `None` while the round has not been settled
    pub outcome: Option<String>,
    pub payout_ratio: Option<f64>,
    pub entries: Vec<PlayerEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub side: Side,
    pub amount: String,
    pub payout_amount: Option<String>,
}

/// Payload of one `enter` submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bet {
    pub round_id: u64,
    pub side: Side,
    /// Stake in wei, attached as the transaction value
    pub amount: U256,
}

/// What one pass of the hedge loop ended with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Both sides were submitted and a claim was attempted
    Hedged { round_id: u64, claimed: bool },
    /// The oracle had no biddable round
    NoRound,
    /// A transient failure cut the cycle short
    Skipped,
}

/// Convert an ether amount to wei
pub fn to_wei(ether: Decimal) -> Result<U256> {
    if ether.is_sign_negative() {
        bail!("Negative ether amount: {}", ether);
    }
    let wei = ether
        .checked_mul(Decimal::from(10u64.pow(WEI_SCALE)))
        .context("Ether amount overflows wei conversion")?
        .trunc();
    let raw = wei.to_u128().context("Ether amount does not fit in u128 wei")?;
    Ok(U256::from(raw))
}

/// Convert wei to an ether amount (for display and logs)
pub fn from_wei(wei: U256) -> Decimal {
    u128::try_from(wei)
        .ok()
        .and_then(|raw| i128::try_from(raw).ok())
        .and_then(|raw| Decimal::try_from_i128_with_scale(raw, WEI_SCALE).ok())
        .map(|d| d.normalize())
        .unwrap_or(Decimal::MAX)
}
