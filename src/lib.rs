//! Moon or Doom Hedge Bot Library
//!
//! Two accounts bet opposite sides of the same Moon or Doom round, so one
//! side always wins, then claim and rebalance for the next round.
//!
//! The engine lives in [`services`]:
//!
//! 1. **Round oracle**: decides whether the latest round can still be
//!    entered and whether its payout ratios are worth hedging.
//! 2. **Chain client**: fee estimation, signing, submission and receipt
//!    polling over raw JSON-RPC.
//! 3. **Orchestrator**: balance, decide, bet, wait for close, claim, repeat.

pub mod config;
pub mod error;
pub mod feed;
pub mod services;
pub mod types;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testkit;

pub use config::{Config, HedgeTiming, Network};
pub use error::{ChainError, FeedError, HedgeError};
pub use feed::{GraphQlFeed, RoundFeed};
pub use types::{Bet, CycleOutcome, Round, RoundResult, Side};
pub use wallet::{load_private_keys, Account};
