//! Hedge engine components

pub mod balancer;
pub mod chain_client;
pub mod game_contract;
pub mod metrics;
pub mod orchestrator;
pub mod pacer;
pub mod retry;
pub mod round_oracle;
pub mod rpc;

pub use balancer::{AccountBalancer, BalanceOutcome, HalfOfRicher, TransferPolicy};
pub use chain_client::{ChainClient, ChainSettings, FeeOverrides, GasPricing, HedgeChain};
pub use metrics::{HedgeMetrics, MetricsSnapshot};
pub use orchestrator::HedgeOrchestrator;
pub use pacer::{Dice, Pacer, TokioPacer};
pub use retry::{with_retry, RetryConfig};
pub use round_oracle::{evaluate, OracleRules, RoundDecision, RoundOracle};
pub use rpc::{ChainRpc, HttpRpc};
