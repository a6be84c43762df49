//! stablepay
//!
//! Pay a fiat-denominated order with a stablecoin transfer from a wallet
//! reachable over JSON-RPC.

mod commands;
mod config;
mod rate;
mod shutdown;

use clap::{Parser, Subcommand};
use commands::App;
use config::ConfigLoader;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// stablepay - client-side stablecoin payments
#[derive(Parser, Debug)]
#[command(name = "stablepay")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "STABLEPAY_CONFIG", default_value = "./stablepay.toml")]
    config: PathBuf,

    /// Override the wallet JSON-RPC endpoint (e.g., http://127.0.0.1:8545)
    #[arg(long, env = "STABLEPAY_PROVIDER_URL")]
    provider_url: Option<url::Url>,

    /// Chain to use; the wallet is asked to switch if it is elsewhere
    #[arg(long, global = true)]
    chain: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List supported networks
    Networks {
        /// Show testnets instead of mainnets
        #[arg(long)]
        testnets: bool,
    },
    /// Show the token amount an order total converts to
    Quote {
        /// Order total in the configured fiat currency
        amount: Decimal,
        /// Keep printing a fresh quote whenever the rate is refreshed
        #[arg(long)]
        follow: bool,
    },
    /// Connect to the wallet and show account, network and fees
    Connect,
    /// Ask the wallet to switch networks, registering the network if needed
    Switch {
        chain_id: u64,
    },
    /// Show stablecoin and native balances
    Balance,
    /// Pay an order and wait for confirmation
    Pay {
        /// Order total in the configured fiat currency
        amount: Decimal,
        /// Order reference echoed in the result
        #[arg(long, default_value = "cli-order")]
        order_id: String,
    },
    /// Follow a submitted transaction until it is confirmed
    Watch {
        tx_hash: String,
        /// Required depth; defaults to the network's threshold
        #[arg(long)]
        confirmations: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::debug!("Starting stablepay v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = ConfigLoader::new(&args.config, args.provider_url.clone());
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration from {:?}: {}", args.config, e);
        e
    })?;

    let app = App::new(loaded_config)?;
    match args.command {
        Command::Networks { testnets } => {
            app.networks(testnets);
            Ok(())
        }
        Command::Quote { amount, follow } => app.quote(amount, args.chain, follow).await,
        Command::Connect => app.connect_command(args.chain).await,
        Command::Switch { chain_id } => app.switch(chain_id).await,
        Command::Balance => app.balance(args.chain).await,
        Command::Pay { amount, order_id } => app.pay(amount, order_id, args.chain).await,
        Command::Watch {
            tx_hash,
            confirmations,
        } => app.watch(&tx_hash, confirmations, args.chain).await,
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stablepay_core=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
