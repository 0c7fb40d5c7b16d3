//! Error taxonomy for the hedge engine
//!
//! Failures scoped to one round or one transaction are absorbed by the
//! engine; only failures that stop the whole system are fatal.

use thiserror::Error;

/// Errors from the JSON-RPC chain provider
#[derive(Error, Debug, Clone)]
pub enum ChainError {
    /// Request failed before a response was read (timeout, DNS, TLS)
    #[error("RPC transport error: {0}")]
    Transport(String),

    /// Provider returned a JSON-RPC error object
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Response did not have the expected shape
    #[error("malformed RPC response for {method}: {reason}")]
    Malformed { method: &'static str, reason: String },

    #[error("failed to sign transaction: {0}")]
    Signing(String),
}

impl ChainError {
    pub fn from_network_error(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ChainError::Transport("request timed out".to_string())
        } else if err.is_connect() {
            ChainError::Transport("connection failed".to_string())
        } else {
            ChainError::Transport(err.to_string())
        }
    }
}

/// Errors from the round-state feed
#[derive(Error, Debug, Clone)]
pub enum FeedError {
    #[error("feed transport error: {0}")]
    Transport(String),

    #[error("feed returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed feed payload: {0}")]
    Malformed(String),
}

/// Engine-level failures
#[derive(Error, Debug, Clone)]
pub enum HedgeError {
    /// An RPC or feed call failed; the current step is repeated
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Submitted, but the receipt showed failure or never arrived
    #[error("transaction {tx_hash} from {address} was not confirmed")]
    UnconfirmedTransaction { address: String, tx_hash: String },

    /// Neither account can cover the stake
    #[error("insufficient funds: balances {balance_a} / {balance_b} ETH, stake {required} ETH")]
    InsufficientFunds {
        balance_a: String,
        balance_b: String,
        required: String,
    },

    /// A rebalancing transfer was never confirmed
    #[error("rebalance transfer from {from} to {to} failed after all attempts")]
    RebalanceFailed { from: String, to: String },

    /// Feed data that cannot be acted upon
    #[error("data integrity anomaly: {0}")]
    DataIntegrity(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl HedgeError {
    /// Whether the process has to stop
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HedgeError::InsufficientFunds { .. }
                | HedgeError::RebalanceFailed { .. }
                | HedgeError::Configuration(_)
        )
    }
}

impl From<ChainError> for HedgeError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Malformed { .. } => HedgeError::DataIntegrity(err.to_string()),
            other => HedgeError::TransientNetwork(other.to_string()),
        }
    }
}

impl From<FeedError> for HedgeError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::Malformed(reason) => HedgeError::DataIntegrity(reason),
            other => HedgeError::TransientNetwork(other.to_string()),
        }
    }
}
