//! Moon or Doom Hedge Bot CLI
//!
//! Runs the dual-account hedge loop and a few read-only inspection commands.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use moon_doom_hedger::services::{
    evaluate, ChainClient, ChainSettings, HedgeChain, HedgeOrchestrator, HttpRpc, OracleRules,
    TokioPacer,
};
use moon_doom_hedger::types::{from_wei, to_wei};
use moon_doom_hedger::{load_private_keys, Account, Config, GraphQlFeed, RoundFeed};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::Ordering;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "moon-doom-hedger")]
#[command(about = "Dual-account hedge bot for Moon or Doom rounds")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the hedge loop until Ctrl+C or a fatal error
    Run,

    /// Show both accounts and their balances
    Balances,

    /// Fetch the latest round and show whether it is biddable
    Round,

    /// Show a settled round and one account's entries in it
    #[command(name = "result")]
    Settled {
        /// On-chain round id
        #[arg(short, long)]
        round: u64,

        /// Which account to look up (0 or 1)
        #[arg(short, long, default_value = "0")]
        account: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;

    match cli.command {
        Commands::Run => run_bot(&config).await?,
        Commands::Balances => show_balances(&config).await?,
        Commands::Round => show_round(&config).await?,
        Commands::Settled { round, account } => show_result(&config, round, account).await?,
    }

    Ok(())
}

fn chain_client(config: &Config) -> Result<ChainClient<HttpRpc, TokioPacer>> {
    let rpc = HttpRpc::new(config.network.rpc_endpoint.clone())?;
    let settings = ChainSettings::from_config(config)?;
    Ok(ChainClient::new(rpc, TokioPacer, settings))
}

fn feed(config: &Config) -> Result<GraphQlFeed> {
    Ok(GraphQlFeed::new(
        config.feed_url.clone(),
        config.feed_contract.clone(),
    )?)
}

async fn run_bot(config: &Config) -> Result<()> {
    let accounts = load_private_keys(&config.private_keys_path)?;
    let stakes = config
        .bet_amounts
        .iter()
        .map(|amount| to_wei(*amount))
        .collect::<Result<Vec<_>>>()
        .context("Invalid stake size")?;

    println!("\n{}", "=".repeat(70));
    println!("  MOON OR DOOM HEDGER");
    println!("  Chain: {} | RPC: {}", config.network.chain_id, config.network.rpc_endpoint);
    println!("  Account A: {}", accounts.0);
    println!("  Account B: {}", accounts.1);
    println!(
        "  Stakes: {}",
        config
            .bet_amounts
            .iter()
            .map(|a| format!("{} ETH", a))
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("{}\n", "=".repeat(70));

    let mut orchestrator = HedgeOrchestrator::new(
        chain_client(config)?,
        feed(config)?,
        TokioPacer,
        StdRng::from_entropy(),
        accounts,
        stakes,
        config.timing.clone(),
    )?;

    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received, stopping after the current cycle");
            stop.store(true, Ordering::SeqCst);
        }
    });

    println!("Starting hedge loop (Ctrl+C to stop)...\n");
    let result = orchestrator.run().await;

    let snapshot = orchestrator.metrics().snapshot();
    match serde_json::to_string(&snapshot) {
        Ok(json) => info!("Final metrics: {}", json),
        Err(e) => warn!("Could not serialize metrics: {}", e),
    }

    result.context("Hedge loop halted")
}

async fn show_balances(config: &Config) -> Result<()> {
    let (a, b) = load_private_keys(&config.private_keys_path)?;
    let client = chain_client(config)?;

    println!("\nAccounts:");
    for (label, account) in [("A", &a), ("B", &b)] {
        let balance = client
            .balance(account)
            .await
            .with_context(|| format!("Failed to read balance of {}", account))?;
        println!("  {}: {}  {} ETH", label, account, from_wei(balance));
    }
    println!();
    Ok(())
}

async fn show_round(config: &Config) -> Result<()> {
    let round = feed(config)?.latest_round().await?;
    let now = chrono::Utc::now();
    let decision = evaluate(&round, now, &OracleRules::from(&config.timing));

    println!("\nRound {} ({})", round.on_chain_id, round.status);
    println!("  Started: {}", round.started_at.format("%H:%M:%S"));
    println!("  Locked:  {}", round.locked_at.format("%H:%M:%S"));
    println!("  Closed:  {}", round.closed_at.format("%H:%M:%S"));
    println!(
        "  Moon: {:.3}x | Doom: {:.3}x",
        round.moon_payout_ratio, round.doom_payout_ratio
    );
    println!("  Decision at {}: {:?}\n", now.format("%H:%M:%S"), decision);
    Ok(())
}

async fn show_result(config: &Config, round_id: u64, index: usize) -> Result<()> {
    let (a, b) = load_private_keys(&config.private_keys_path)?;
    let account: Account = match index {
        0 => a,
        1 => b,
        other => bail!("Account index must be 0 or 1, got {}", other),
    };

    let result = feed(config)?
        .round_result(round_id, account.address())
        .await?;

    println!("\nRound {}", result.on_chain_id);
    match (&result.outcome, result.payout_ratio) {
        (Some(outcome), Some(ratio)) => println!("  Result: {} ({:.3}x)", outcome, ratio),
        (Some(outcome), None) => println!("  Result: {}", outcome),
        _ => println!("  Not settled yet"),
    }

    if result.entries.is_empty() {
        println!("  No entries for {}", account);
    } else {
        println!("  Entries for {}:", account);
        for entry in &result.entries {
            println!(
                "    {} {} -> {}",
                entry.side,
                entry.amount,
                entry.payout_amount.as_deref().unwrap_or("-")
            );
        }
    }
    println!();
    Ok(())
}
