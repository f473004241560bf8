//! Credits Wallet CLI
//!
//! Hold, send, and receive bearer-token credits from the command line.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use credits_wallet::config::{default_config_path, WalletConfig};

mod commands;

#[derive(Parser)]
#[command(name = "credits-wallet")]
#[command(about = "Credits wallet - hold and spend bearer-token credits")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Custom proof file path
    #[arg(short, long, global = true)]
    wallet: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show held balance
    Balance {
        /// Show proofs per denomination
        #[arg(long)]
        detailed: bool,
    },

    /// Create a token worth AMOUNT to hand to someone else
    Send {
        /// Amount in wallet units
        amount: u64,

        /// Note for the recipient
        #[arg(long)]
        memo: Option<String>,

        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Add a received token to the wallet
    Receive {
        /// Serialized token (cashuA...)
        token: String,
    },

    /// Ask the issuer which held proofs are still redeemable
    Check {
        /// Remove proofs reported as spent
        #[arg(long)]
        prune: bool,
    },

    /// Show spending history
    History {
        /// Maximum number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = WalletConfig::from_file(&config_path)?;
    let wallet_path = cli.wallet.unwrap_or_else(|| config.proof_file());

    let ctx = commands::Context {
        config,
        wallet_path,
    };

    match cli.command {
        Commands::Balance { detailed } => commands::balance::run(&ctx, detailed).await,
        Commands::Send { amount, memo, yes } => commands::send::run(&ctx, amount, memo, yes).await,
        Commands::Receive { token } => commands::receive::run(&ctx, &token).await,
        Commands::Check { prune } => commands::check::run(&ctx, prune).await,
        Commands::History { limit } => commands::history::run(&ctx, limit).await,
    }
}
