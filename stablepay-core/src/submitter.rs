//! Payment submitter.
//!
//! The PaymentSubmitter is responsible for:
//! - Converting the fiat order total into token base units at the current
//!   rate and the active network's token decimals
//! - Refusing early when the stablecoin or native balance is short, before
//!   anything is signed
//! - Estimating gas with a safety buffer, falling back to a fixed ceiling
//! - Handing the transfer to the wallet and reporting the hash immediately
//! - Following the transaction through the monitor until it settles
//!
//! Each attempt walks `Start -> BalanceChecked -> GasEstimated ->
//! AwaitingApproval -> Submitted -> Monitoring`, and can fail at any step.
//! Nothing is retried except gas estimation.

use crate::error::{
    ConnectionError, FundsError, MonitorError, NetworkError, PaymentError, SubmissionError,
};
use crate::monitor::{MonitorOutcome, MonitorUpdate, TransactionMonitor};
use crate::rate::RateFeed;
use crate::session::{ChainBinding, WalletSession};
use rust_decimal::Decimal;
use stablepay_sdk::config::OrchestratorConfig;
use stablepay_sdk::objects::networks::NATIVE_DECIMALS;
use stablepay_sdk::objects::payment::format_tx_hash;
use stablepay_sdk::objects::{NetworkProfile, PaymentOutcome, PaymentRequest, PaymentResult};
use stablepay_sdk::units::{display_amount, format_units, parse_units, to_token_units};
use stablepay_sdk::{TxHash, U256};
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

type Hook = Arc<dyn Fn() + Send + Sync>;
type HashHook = Arc<dyn Fn(TxHash) + Send + Sync>;
type ConfirmHook = Arc<dyn Fn(u64) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&PaymentError) + Send + Sync>;

/// Optional progress hooks for one payment.
#[derive(Clone, Default)]
pub struct PaymentCallbacks {
    on_start: Option<Hook>,
    on_approve: Option<Hook>,
    on_submit: Option<HashHook>,
    on_confirm: Option<ConfirmHook>,
    on_error: Option<ErrorHook>,
}

impl PaymentCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(f));
        self
    }

    /// Fired right before the wallet is asked to sign.
    pub fn on_approve(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_approve = Some(Arc::new(f));
        self
    }

    pub fn on_submit(mut self, f: impl Fn(TxHash) + Send + Sync + 'static) -> Self {
        self.on_submit = Some(Arc::new(f));
        self
    }

    /// Receives the confirmation depth after each poll that finds a receipt.
    pub fn on_confirm(mut self, f: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.on_confirm = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&PaymentError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    fn start(&self) {
        if let Some(f) = &self.on_start {
            f();
        }
    }

    fn approve(&self) {
        if let Some(f) = &self.on_approve {
            f();
        }
    }

    fn submit(&self, tx_hash: TxHash) {
        if let Some(f) = &self.on_submit {
            f(tx_hash);
        }
    }

    fn error(&self, e: &PaymentError) {
        if let Some(f) = &self.on_error {
            f(e);
        }
    }
}

// ---------------------------------------------------------------------------
// Public data types
// ---------------------------------------------------------------------------

/// Amount preview for an order on the current network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentQuote {
    pub fiat_amount: Decimal,
    pub fiat_currency: String,
    pub rate: Decimal,
    pub token_units: U256,
    /// Two-decimal display form, e.g. `"10.00"`.
    pub token_amount: String,
    pub token_symbol: String,
    pub chain_id: u64,
    pub network: String,
}

/// A transfer the wallet accepted and broadcast.
#[derive(Debug, Clone)]
pub struct SubmittedPayment {
    pub attempt_id: Uuid,
    pub order_id: String,
    pub tx_hash: TxHash,
    pub token_units: U256,
    pub gas_limit: u64,
    pub profile: NetworkProfile,
    pub explorer_link: String,
    /// Chain epoch the payment was submitted under.
    pub epoch: u64,
}

impl SubmittedPayment {
    fn result(&self, outcome: PaymentOutcome) -> PaymentResult {
        PaymentResult::new(&self.order_id, outcome)
            .with_transaction(
                self.tx_hash,
                self.profile.chain_id,
                &self.profile.name,
                &self.explorer_link,
            )
            .with_token_amount(format_units(self.token_units, self.profile.token_decimals))
    }
}

// ---------------------------------------------------------------------------
// PaymentSubmitter
// ---------------------------------------------------------------------------

pub struct PaymentSubmitter {
    session: WalletSession,
    rates: RateFeed,
    config: OrchestratorConfig,
}

impl PaymentSubmitter {
    pub fn new(session: WalletSession, rates: RateFeed, config: OrchestratorConfig) -> Self {
        Self {
            session,
            rates,
            config,
        }
    }

    /// Token amount `request` costs on the current network.
    pub async fn quote(&self, request: &PaymentRequest) -> Result<PaymentQuote, PaymentError> {
        let binding = self.session.binding().await?;
        self.quote_for(request, &binding).await
    }

    async fn quote_for(
        &self,
        request: &PaymentRequest,
        binding: &ChainBinding,
    ) -> Result<PaymentQuote, PaymentError> {
        let rate = self.rates.current().await;
        if rate.fiat_currency != self.config.payment.fiat_currency {
            return Err(PaymentError::CurrencyMismatch {
                rate: rate.fiat_currency,
                order: self.config.payment.fiat_currency.clone(),
            });
        }
        let decimals = binding.profile.token_decimals;
        let token_units = to_token_units(request.fiat_amount, rate.fiat_per_token, decimals)?;
        if token_units.is_zero() {
            return Err(PaymentError::AmountTooSmall);
        }
        Ok(PaymentQuote {
            fiat_amount: request.fiat_amount,
            fiat_currency: rate.fiat_currency,
            rate: rate.fiat_per_token,
            token_units,
            token_amount: display_amount(token_units, decimals, 2),
            token_symbol: self.session.registry().stablecoin().symbol().to_string(),
            chain_id: binding.chain_id,
            network: binding.profile.name.clone(),
        })
    }

    /// Run an attempt up to the point where the wallet returns a hash.
    ///
    /// `on_error` fires for every failure before it is returned.
    pub async fn submit(
        &self,
        request: &PaymentRequest,
        callbacks: &PaymentCallbacks,
    ) -> Result<SubmittedPayment, PaymentError> {
        let attempt_id = Uuid::now_v7();
        let span = info_span!("payment", %attempt_id, order_id = %request.order_id);
        let result = self
            .submit_inner(attempt_id, request, callbacks)
            .instrument(span)
            .await;
        if let Err(e) = &result {
            error!(%attempt_id, order_id = %request.order_id, error = %e, "Payment attempt failed");
            callbacks.error(e);
        }
        result
    }

    async fn submit_inner(
        &self,
        attempt_id: Uuid,
        request: &PaymentRequest,
        callbacks: &PaymentCallbacks,
    ) -> Result<SubmittedPayment, PaymentError> {
        callbacks.start();
        let binding = self.session.binding().await?;
        let quote = self.quote_for(request, &binding).await?;
        let symbol = quote.token_symbol.clone();
        let decimals = binding.profile.token_decimals;
        info!(
            chain_id = binding.chain_id,
            amount = %quote.token_amount,
            fiat = %request.fiat_amount,
            "Payment started"
        );

        // -- Balance checks -----------------------------------------------------
        let available = binding.contract.balance_of(binding.account).await?;
        if available < quote.token_units {
            return Err(FundsError::InsufficientStablecoin {
                required: format_units(quote.token_units, decimals),
                available: format_units(available, decimals),
                symbol,
            }
            .into());
        }

        let rpc = self.session.rpc().ok_or(ConnectionError::NoProviderDetected)?;
        let native = rpc.native_balance(binding.account).await?;
        let floor = parse_units(self.config.gas.min_native_balance, NATIVE_DECIMALS)?;
        if native < floor {
            return Err(FundsError::InsufficientGasCurrency {
                symbol: binding.profile.native_symbol.clone(),
                required: format_units(floor, NATIVE_DECIMALS),
                available: format_units(native, NATIVE_DECIMALS),
            }
            .into());
        }
        info!(
            balance = %format_units(available, decimals),
            native = %format_units(native, NATIVE_DECIMALS),
            "Balances checked"
        );

        // -- Gas ----------------------------------------------------------------
        let recipient = self.config.payment.recipient;
        let gas_limit = match binding
            .contract
            .estimate_transfer_gas(binding.account, recipient, quote.token_units)
            .await
        {
            Ok(estimate) => {
                let limit = self.config.gas.buffered(estimate);
                info!(estimate, limit, "Gas estimated");
                limit
            }
            Err(e) => {
                let limit = self.config.gas.fallback_gas_limit;
                warn!(error = %e, limit, "Gas estimation failed, using fallback limit");
                limit
            }
        };

        // -- Approval and send ----------------------------------------------------
        let current = self.session.chain_epoch().await;
        if current != binding.epoch {
            return Err(NetworkError::StaleChain {
                expected: binding.epoch,
                current,
            }
            .into());
        }
        info!(gas_limit, "Awaiting wallet approval");
        callbacks.approve();

        let tx_hash = binding
            .contract
            .transfer(binding.account, recipient, quote.token_units, gas_limit)
            .await
            .map_err(SubmissionError::from)?;
        info!(tx_hash = ?tx_hash, "Transaction submitted");
        callbacks.submit(tx_hash);

        let explorer_link = binding.profile.explorer_tx_link(&format_tx_hash(&tx_hash));
        Ok(SubmittedPayment {
            attempt_id,
            order_id: request.order_id.clone(),
            tx_hash,
            token_units: quote.token_units,
            gas_limit,
            profile: binding.profile,
            explorer_link,
            epoch: binding.epoch,
        })
    }

    /// Follow a submitted payment until it settles.
    pub async fn confirm(
        &self,
        submitted: &SubmittedPayment,
        callbacks: &PaymentCallbacks,
    ) -> PaymentResult {
        let Some(rpc) = self.session.rpc() else {
            return submitted.result(PaymentOutcome::Cancelled);
        };
        let monitor = TransactionMonitor::new(rpc, self.config.monitor, self.session.monitors());
        let on_confirm = callbacks.on_confirm.clone();
        let handle = match monitor.watch(
            submitted.tx_hash,
            submitted.profile.min_confirmations,
            move |update| {
                if let (MonitorUpdate::Confirmations { confirmations, .. }, Some(f)) =
                    (update, &on_confirm)
                {
                    f(confirmations);
                }
            },
        ) {
            Ok(handle) => handle,
            Err(e) => {
                let e = PaymentError::from(e);
                callbacks.error(&e);
                return submitted.result(e.outcome()).with_message(e.to_string());
            }
        };

        // The chain may have moved between submission and registration.
        if self.session.chain_epoch().await != submitted.epoch {
            handle.cancel();
        }
        info!(
            attempt_id = %submitted.attempt_id,
            tx_hash = ?submitted.tx_hash,
            budget_secs = self.config.monitor.budget().as_secs(),
            "Monitoring payment"
        );

        let required = submitted.profile.min_confirmations;
        match handle.outcome().await {
            MonitorOutcome::Confirmed {
                confirmations,
                block_number,
            } => submitted
                .result(PaymentOutcome::Success)
                .with_confirmations(Some(block_number), confirmations)
                .with_message(format!("confirmed with {confirmations}/{required} confirmations")),
            MonitorOutcome::Reverted { block_number } => {
                let e = PaymentError::from(MonitorError::Reverted(submitted.tx_hash));
                callbacks.error(&e);
                submitted
                    .result(e.outcome())
                    .with_confirmations(Some(block_number), 0)
                    .with_message(e.to_string())
            }
            MonitorOutcome::Timeout {
                attempts,
                last_confirmations,
            } => {
                let e = PaymentError::from(MonitorError::Timeout {
                    tx_hash: submitted.tx_hash,
                    attempts,
                });
                callbacks.error(&e);
                let result = submitted.result(e.outcome()).with_message(e.to_string());
                match last_confirmations {
                    Some(n) => result.with_confirmations(None, n),
                    None => result,
                }
            }
            MonitorOutcome::Cancelled(reason) => submitted
                .result(PaymentOutcome::Cancelled)
                .with_message(format!("monitoring cancelled: {reason:?}")),
        }
    }

    /// Submit and monitor. Always yields exactly one result.
    pub async fn pay(&self, request: &PaymentRequest, callbacks: &PaymentCallbacks) -> PaymentResult {
        match self.submit(request, callbacks).await {
            Ok(submitted) => self.confirm(&submitted, callbacks).await,
            Err(e) => PaymentResult::failed(&request.order_id, e.outcome(), e.to_string()),
        }
    }
}
