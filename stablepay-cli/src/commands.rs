//! Command implementations.
//!
//! Every command that talks to the wallet goes through [`App::connect`],
//! which starts the provider change watcher so account and chain switches
//! made in the wallet reach the session while the command runs.

use crate::config::LoadedConfig;
use crate::config::file::{RateSourceKind, RateSourceSection};
use crate::rate::{CoinGeckoSource, spawn_rate_refresher};
use crate::shutdown::spawn_shutdown_handler;
use anyhow::{Context, bail};
use rust_decimal::Decimal;
use stablepay_core::provider::HttpWalletProvider;
use stablepay_core::{
    MonitorOutcome, MonitorUpdate, NetworkSwitcher, PaymentCallbacks, PaymentSubmitter, RateFeed,
    TransactionMonitor, WalletSession,
};
use stablepay_sdk::config::OrchestratorConfig;
use stablepay_sdk::objects::payment::{format_tx_hash, parse_tx_hash};
use stablepay_sdk::objects::session::format_address;
use stablepay_sdk::objects::{
    ConnectionSummary, NetworkProfile, NetworkRegistry, PaymentRequest,
};
use stablepay_sdk::units::{display_amount, to_token_units, units_to_decimal};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Everything a command needs, assembled from the loaded configuration.
pub struct App {
    config: OrchestratorConfig,
    registry: Arc<NetworkRegistry>,
    provider: HttpWalletProvider,
    session: WalletSession,
    rates: RateFeed,
    rate_source: RateSourceSection,
    poll_interval: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl App {
    pub fn new(loaded: LoadedConfig) -> anyhow::Result<Self> {
        let provider = HttpWalletProvider::new(loaded.provider.url.clone(), loaded.provider.wallet)
            .context("failed to create wallet provider")?;
        let registry = Arc::new(loaded.registry);
        let session = WalletSession::new(Some(Arc::new(provider.clone())), Arc::clone(&registry));
        let rates = RateFeed::new(loaded.rate).context("invalid exchange rate")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        spawn_shutdown_handler(session.clone(), shutdown_tx);

        Ok(Self {
            config: loaded.orchestrator,
            registry,
            provider,
            session,
            rates,
            rate_source: loaded.rate_source,
            poll_interval: loaded.provider.poll_interval,
            shutdown_rx,
        })
    }

    /// Connect to the wallet and, if `chain` is given, move it there.
    async fn connect(&self, chain: Option<u64>) -> anyhow::Result<ConnectionSummary> {
        tracing::info!("Connecting to wallet at {}", self.provider.url());
        let summary = self.session.connect(None).await?;
        self.provider
            .watch_changes(self.poll_interval, self.shutdown_rx.clone());

        match chain {
            Some(chain_id) if chain_id != summary.chain_id => {
                let profile = NetworkSwitcher::new(self.session.clone())
                    .switch_to(chain_id)
                    .await?;
                println!("Switched wallet to {} ({})", profile.name, profile.chain_id);
                Ok(ConnectionSummary {
                    chain_id,
                    network_name: Some(profile.name),
                    supported: true,
                    ..summary
                })
            }
            _ => Ok(summary),
        }
    }

    /// Pull a live rate once and keep refreshing it in the background.
    async fn start_rate_source(&self) {
        if self.rate_source.kind != RateSourceKind::Coingecko {
            return;
        }
        let source = CoinGeckoSource::new(&self.rate_source.api_url, &self.rate_source.coin_id);
        if let Err(e) = source.refresh(&self.rates).await {
            tracing::warn!("Using configured rate, live refresh failed: {}", e);
        }
        spawn_rate_refresher(
            source,
            self.rates.clone(),
            Duration::from_secs(self.rate_source.refresh_secs.max(1)),
            self.shutdown_rx.clone(),
        );
    }

    // ----- commands

    pub fn networks(&self, testnets: bool) {
        println!(
            "{:>9}  {:<20} {:<6} {:>8} {:>6}  {}",
            "CHAIN ID", "NAME", "NATIVE", "DECIMALS", "CONFS", "STABLECOIN"
        );
        let profiles: Vec<&NetworkProfile> = if testnets {
            self.registry.testnets().collect()
        } else {
            self.registry.mainnets().collect()
        };
        for profile in profiles {
            let address = self
                .registry
                .stablecoin_address(profile.chain_id)
                .map(|a| format!("{a:#x}"))
                .unwrap_or_default();
            println!(
                "{:>9}  {:<20} {:<6} {:>8} {:>6}  {}",
                profile.chain_id,
                profile.name,
                profile.native_symbol,
                profile.token_decimals,
                profile.min_confirmations,
                address
            );
        }
    }

    /// Price `amount` on `chain`, or on the wallet's chain when none is given.
    /// With `follow`, print a fresh quote after every rate refresh until
    /// shutdown.
    pub async fn quote(
        &self,
        amount: Decimal,
        chain: Option<u64>,
        follow: bool,
    ) -> anyhow::Result<()> {
        self.start_rate_source().await;
        let mut watcher = self.rates.subscribe();
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            self.print_quote(amount, chain).await?;
            if !follow {
                return Ok(());
            }
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => return Ok(()),
                changed = watcher.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn print_quote(&self, amount: Decimal, chain: Option<u64>) -> anyhow::Result<()> {
        let rate = self.rates.current().await;
        let symbol = self.registry.stablecoin().symbol();

        let (units, amount_display, network, chain_id) = match chain {
            Some(chain_id) => {
                let profile = self
                    .registry
                    .profile(chain_id)
                    .with_context(|| format!("chain {chain_id} is not supported"))?;
                let units = to_token_units(amount, rate.fiat_per_token, profile.token_decimals)?;
                let display = display_amount(units, profile.token_decimals, 2);
                (units, display, profile.name.clone(), chain_id)
            }
            None => {
                self.connect(None).await?;
                let quote = self
                    .submitter()
                    .quote(&PaymentRequest::new(amount, "quote"))
                    .await?;
                self.session.disconnect().await;
                (quote.token_units, quote.token_amount, quote.network, quote.chain_id)
            }
        };
        let exact = self
            .registry
            .profile(chain_id)
            .and_then(|p| units_to_decimal(units, p.token_decimals))
            .map_or_else(|| units.to_string(), |d| d.to_string());

        println!(
            "{} {} = {} {} on {} (exact {}, rate {} {}/{} v{})",
            amount,
            rate.fiat_currency,
            amount_display,
            symbol,
            network,
            exact,
            rate.fiat_per_token,
            rate.fiat_currency,
            symbol,
            self.rates.version()
        );
        Ok(())
    }

    pub async fn connect_command(&self, chain: Option<u64>) -> anyhow::Result<()> {
        let summary = self.connect(chain).await?;
        println!("Wallet:   {}", summary.wallet_kind);
        println!("Account:  {}", format_address(&summary.account));
        println!(
            "Network:  {} ({})",
            summary.network_name.as_deref().unwrap_or("unsupported"),
            summary.chain_id
        );
        println!("Native:   {}", summary.native_balance);
        if summary.supported {
            let fee = self
                .session
                .fee_quote(self.config.gas.typical_transfer_gas)
                .await?;
            println!(
                "Gas:      {} gwei, transfer ~{} {}",
                fee.gas_price_gwei, fee.cost_native, fee.native_symbol
            );
        } else {
            println!("This network has no stablecoin deployment; switch with `stablepay switch`.");
        }
        self.session.disconnect().await;
        Ok(())
    }

    pub async fn switch(&self, chain_id: u64) -> anyhow::Result<()> {
        self.connect(None).await?;
        let profile = NetworkSwitcher::new(self.session.clone())
            .switch_to(chain_id)
            .await?;
        println!("Wallet is now on {} ({})", profile.name, profile.chain_id);
        self.session.disconnect().await;
        Ok(())
    }

    pub async fn balance(&self, chain: Option<u64>) -> anyhow::Result<()> {
        let summary = self.connect(chain).await?;
        let symbol = self.registry.stablecoin().symbol();
        let profile = self
            .session
            .current_network()
            .await
            .with_context(|| format!("chain {} is not supported", summary.chain_id))?;

        let stablecoin = self.session.stablecoin_balance().await?;
        let native = self.session.native_balance().await?;
        let decimals = self.session.token_decimals().await?;
        println!("Account:  {}", format_address(&summary.account));
        println!("Network:  {} ({})", profile.name, profile.chain_id);
        println!("{symbol}:     {stablecoin} (contract decimals {decimals})");
        println!("{}:      {}", profile.native_symbol, native);
        self.session.disconnect().await;
        Ok(())
    }

    pub async fn pay(
        &self,
        amount: Decimal,
        order_id: String,
        chain: Option<u64>,
    ) -> anyhow::Result<()> {
        self.start_rate_source().await;
        self.connect(chain).await?;
        let submitter = self.submitter();
        let request = PaymentRequest::new(amount, order_id);

        let quote = submitter.quote(&request).await?;
        println!(
            "Paying {} {} = {} {} on {}",
            quote.fiat_amount, quote.fiat_currency, quote.token_amount, quote.token_symbol, quote.network
        );

        let callbacks = PaymentCallbacks::new()
            .on_start(|| println!("Checking balances..."))
            .on_approve(|| println!("Approve the transfer in your wallet..."))
            .on_submit(|hash| println!("Submitted {}", format_tx_hash(&hash)))
            .on_confirm(|n| println!("Confirmations: {n}"))
            .on_error(|e| eprintln!("Payment error: {e}"));
        let result = submitter.pay(&request, &callbacks).await;

        println!("{}", serde_json::to_string_pretty(&result)?);
        self.session.disconnect().await;
        if !result.is_success() {
            bail!("payment {} ended with {:?}", result.order_id, result.outcome);
        }
        Ok(())
    }

    /// Follow an already-submitted transaction until it settles.
    pub async fn watch(
        &self,
        tx_hash: &str,
        confirmations: Option<u64>,
        chain: Option<u64>,
    ) -> anyhow::Result<()> {
        let tx_hash = parse_tx_hash(tx_hash).context("expected 0x followed by 64 hex digits")?;
        self.connect(chain).await?;
        let required = match confirmations {
            Some(n) => n,
            None => self
                .session
                .current_network()
                .await
                .map_or(1, |p| p.min_confirmations),
        };
        let rpc = self.session.rpc().context("no wallet provider")?;
        println!(
            "Following {} until {} confirmations (giving up after {}s)",
            format_tx_hash(&tx_hash),
            required,
            self.config.monitor.budget().as_secs()
        );

        let monitor = TransactionMonitor::new(rpc, self.config.monitor, self.session.monitors());
        let handle = monitor.watch(tx_hash, required, |update| match update {
            MonitorUpdate::Pending {
                attempt,
                max_attempts,
            } => println!("Waiting for receipt ({attempt}/{max_attempts})"),
            MonitorUpdate::Confirmations {
                confirmations,
                required,
                block_number,
            } => println!("Block {block_number}: {confirmations}/{required} confirmations"),
        })?;

        let outcome = handle.outcome().await;
        self.session.disconnect().await;
        match outcome {
            MonitorOutcome::Confirmed { confirmations, .. } => {
                println!("Confirmed with {confirmations} confirmations");
                Ok(())
            }
            MonitorOutcome::Reverted { block_number } => {
                bail!("transaction reverted in block {block_number}")
            }
            MonitorOutcome::Timeout { attempts, .. } => {
                bail!("no confirmation after {attempts} polls")
            }
            MonitorOutcome::Cancelled(reason) => bail!("monitoring cancelled: {reason:?}"),
        }
    }

    fn submitter(&self) -> PaymentSubmitter {
        PaymentSubmitter::new(self.session.clone(), self.rates.clone(), self.config.clone())
    }
}
