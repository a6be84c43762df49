//! Wallet session.
//!
//! The WalletSession is responsible for:
//! - Connecting to the wallet and binding the stablecoin contract of the
//!   chain the wallet is on
//! - Consuming provider events (account, chain and disconnect notifications)
//!   in order, on a single listener task, via the `Processor` trait
//! - Rebinding chain-scoped state atomically when the chain changes, bumping
//!   the chain epoch and cancelling monitors tied to the old chain
//! - Publishing a `SessionEvent` after every committed state change
//! - Answering balance, decimals and fee queries against the bound chain
//!
//! The session is the only mutable state shared between components; the
//! switcher and the submitter read snapshots and [`ChainBinding`]s.

use crate::contract::StablecoinContract;
use crate::error::{ConnectionError, NetworkError, PaymentError};
use crate::events::{SessionEvent, SessionEventReceiver, SessionEventSender, session_event_channel};
use crate::monitor::{CancelReason, MonitorSet};
use crate::provider::{ChainRpc, ProviderEvent, WalletProvider};
use kanau::processor::Processor;
use stablepay_sdk::objects::networks::NATIVE_DECIMALS;
use stablepay_sdk::objects::{
    ConnectionState, ConnectionSummary, FeeQuote, NetworkProfile, NetworkRegistry,
    SessionSnapshot, WalletKind,
};
use stablepay_sdk::units::{display_amount, format_units};
use stablepay_sdk::{Address, U256};
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{RwLock, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Public data types
// ---------------------------------------------------------------------------

/// Chain-scoped state captured at the start of an operation.
///
/// `epoch` lets the operation detect that the wallet moved to another chain
/// before it commits anything.
#[derive(Debug, Clone)]
pub struct ChainBinding {
    pub account: Address,
    pub chain_id: u64,
    pub contract: StablecoinContract,
    pub profile: NetworkProfile,
    pub epoch: u64,
}

/// The chain the wallet is on, as far as the registry knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub chain_id: u64,
    /// `None` for chains outside the registry.
    pub profile: Option<NetworkProfile>,
    pub stablecoin: Option<Address>,
}

impl NetworkInfo {
    pub fn supported(&self) -> bool {
        self.stablecoin.is_some()
    }
}

// ---------------------------------------------------------------------------
// WalletSession
// ---------------------------------------------------------------------------

/// The single wallet session of a host. Cheap to clone.
#[derive(Clone)]
pub struct WalletSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    provider: Option<Arc<dyn WalletProvider>>,
    registry: Arc<NetworkRegistry>,
    state: RwLock<SessionState>,
    events_tx: SessionEventSender,
    monitors: MonitorSet,
    connecting: AtomicBool,
    listener: Mutex<Option<Listener>>,
}

#[derive(Default)]
struct SessionState {
    connection: ConnectionState,
    account: Option<Address>,
    chain_id: Option<u64>,
    wallet_kind: Option<WalletKind>,
    /// Present exactly when `chain_id` has a stablecoin deployment.
    contract: Option<StablecoinContract>,
    chain_epoch: u64,
}

struct Listener {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Clears the local connect-in-flight flag when dropped.
struct ConnectingGuard<'a>(&'a AtomicBool);

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl WalletSession {
    /// Create a session. `provider` is `None` when no wallet was detected.
    pub fn new(provider: Option<Arc<dyn WalletProvider>>, registry: Arc<NetworkRegistry>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                provider,
                registry,
                state: RwLock::new(SessionState::default()),
                events_tx: session_event_channel(),
                monitors: MonitorSet::new(),
                connecting: AtomicBool::new(false),
                listener: Mutex::new(None),
            }),
        }
    }

    pub fn registry(&self) -> &NetworkRegistry {
        &self.inner.registry
    }

    pub fn provider(&self) -> Option<Arc<dyn WalletProvider>> {
        self.inner.provider.clone()
    }

    pub fn rpc(&self) -> Option<Arc<dyn ChainRpc>> {
        self.inner.provider.as_ref().map(|p| p.rpc())
    }

    /// Monitors owned by this session.
    pub fn monitors(&self) -> MonitorSet {
        self.inner.monitors.clone()
    }

    pub fn subscribe(&self) -> SessionEventReceiver {
        self.inner.events_tx.subscribe()
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Request account access and bind the session to the wallet's chain.
    ///
    /// Connecting on a chain outside the registry succeeds; the contract
    /// handle stays empty and chain queries fail with `UnsupportedNetwork`.
    pub async fn connect(
        &self,
        preferred: Option<WalletKind>,
    ) -> Result<ConnectionSummary, ConnectionError> {
        let provider = self
            .inner
            .provider
            .clone()
            .ok_or(ConnectionError::NoProviderDetected)?;
        let detected = provider.detected_kinds();
        let Some(&first) = detected.first() else {
            warn!("Wallet provider reports no wallet");
            return Err(ConnectionError::NoProviderDetected);
        };
        let wallet_kind = match preferred {
            Some(kind) if detected.contains(&kind) => kind,
            Some(kind) => {
                warn!(requested = %kind, using = %first, "Preferred wallet not detected");
                first
            }
            None => first,
        };

        if self.inner.connecting.swap(true, Ordering::AcqRel) {
            return Err(ConnectionError::RequestAlreadyPending);
        }
        let _guard = ConnectingGuard(&self.inner.connecting);

        let epoch = {
            let mut state = self.inner.state.write().await;
            if state.connection == ConnectionState::Disconnected {
                state.connection = ConnectionState::Connecting;
            }
            state.chain_epoch
        };

        let result = self.establish(provider, wallet_kind, epoch).await;
        if let Err(e) = &result {
            warn!(wallet = %wallet_kind, error = %e, "Wallet connection failed");
            let mut state = self.inner.state.write().await;
            if state.connection == ConnectionState::Connecting {
                state.connection = ConnectionState::Disconnected;
            }
        }
        result
    }

    /// Commits only if the chain epoch is still `epoch`; a disconnect or chain
    /// change in the meantime cancels the attempt.
    async fn establish(
        &self,
        provider: Arc<dyn WalletProvider>,
        wallet_kind: WalletKind,
        epoch: u64,
    ) -> Result<ConnectionSummary, ConnectionError> {
        info!(wallet = %wallet_kind, "Requesting wallet accounts");
        let accounts = provider.request_accounts().await?;
        let account = *accounts.first().ok_or(ConnectionError::NoAccounts)?;
        let chain_id = provider.chain_id().await?;
        let rpc = provider.rpc();
        let native = rpc.native_balance(account).await?;

        let contract = self.inner.bind_contract(chain_id, &rpc);
        let supported = contract.is_some();
        if !supported {
            warn!(chain_id, "Connected on a chain without a stablecoin deployment");
        }

        {
            let mut state = self.inner.state.write().await;
            if state.chain_epoch != epoch {
                info!(
                    expected = epoch,
                    current = state.chain_epoch,
                    "Session changed while connecting, dropping the connection"
                );
                return Err(ConnectionError::Cancelled);
            }
            state.connection = ConnectionState::Connected;
            state.account = Some(account);
            state.chain_id = Some(chain_id);
            state.wallet_kind = Some(wallet_kind);
            state.contract = contract;
            state.chain_epoch += 1;
            // Started under the lock so a concurrent teardown always stops it.
            self.inner.start_listener(&provider);
        }

        let network_name = self
            .inner
            .registry
            .profile(chain_id)
            .map(|p| p.name.clone());
        info!(
            account = ?account,
            chain_id,
            network = network_name.as_deref().unwrap_or("unknown"),
            wallet = %wallet_kind,
            "Wallet connected"
        );
        self.inner
            .notify(SessionEvent::Connected { account, chain_id });

        Ok(ConnectionSummary {
            account,
            chain_id,
            network_name,
            supported,
            native_balance: format_units(native, NATIVE_DECIMALS),
            wallet_kind,
        })
    }

    /// Clear the session, cancel every monitor and stop listening to the
    /// wallet. Calling it again is a no-op.
    pub async fn disconnect(&self) {
        self.inner.teardown("disconnect requested").await;
    }

    /// Move the session to `chain_id` after the wallet switched. Returns
    /// `false` if nothing changed.
    pub(crate) async fn rebind_chain(&self, chain_id: u64) -> bool {
        self.inner.rebind_chain(chain_id).await
    }

    // -- Queries ------------------------------------------------------------

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.read().await;
        SessionSnapshot {
            state: state.connection,
            account: state.account,
            chain_id: state.chain_id,
            wallet_kind: state.wallet_kind,
            contract: state.contract.as_ref().map(|c| c.address()),
            chain_epoch: state.chain_epoch,
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.snapshot().await.is_connected()
    }

    pub async fn chain_epoch(&self) -> u64 {
        self.inner.state.read().await.chain_epoch
    }

    /// Profile of the current chain, if connected to a registry chain.
    pub async fn current_network(&self) -> Option<NetworkProfile> {
        let chain_id = self.inner.state.read().await.chain_id?;
        self.inner.registry.profile(chain_id).cloned()
    }

    pub async fn network_info(&self) -> Option<NetworkInfo> {
        let chain_id = self.inner.state.read().await.chain_id?;
        Some(NetworkInfo {
            chain_id,
            profile: self.inner.registry.profile(chain_id).cloned(),
            stablecoin: self.inner.registry.stablecoin_address(chain_id),
        })
    }

    /// Account, chain and contract of the current connection.
    pub async fn binding(&self) -> Result<ChainBinding, PaymentError> {
        let state = self.inner.state.read().await;
        let (ConnectionState::Connected, Some(account), Some(chain_id)) =
            (state.connection, state.account, state.chain_id)
        else {
            return Err(ConnectionError::NotConnected.into());
        };
        let unsupported = || NetworkError::UnsupportedNetwork {
            chain_id: Some(chain_id),
        };
        let contract = state.contract.clone().ok_or_else(unsupported)?;
        let profile = self
            .inner
            .registry
            .profile(chain_id)
            .cloned()
            .ok_or_else(unsupported)?;
        Ok(ChainBinding {
            account,
            chain_id,
            contract,
            profile,
            epoch: state.chain_epoch,
        })
    }

    /// Native balance of the connected account in whole units.
    pub async fn native_balance(&self) -> Result<String, PaymentError> {
        let binding = self.binding().await?;
        let wei = self.require_rpc()?.native_balance(binding.account).await?;
        Ok(format_units(wei, NATIVE_DECIMALS))
    }

    /// Stablecoin balance of the connected account in whole tokens.
    pub async fn stablecoin_balance(&self) -> Result<String, PaymentError> {
        let binding = self.binding().await?;
        let units = binding.contract.balance_of(binding.account).await?;
        Ok(format_units(units, binding.profile.token_decimals))
    }

    /// `decimals()` as reported by the contract. A disagreement with the
    /// registry is logged; the registry value stays authoritative for
    /// payments.
    pub async fn token_decimals(&self) -> Result<u32, PaymentError> {
        let binding = self.binding().await?;
        let on_chain = binding.contract.decimals().await?;
        if on_chain != binding.profile.token_decimals {
            warn!(
                chain_id = binding.chain_id,
                registry = binding.profile.token_decimals,
                on_chain,
                "Token decimals disagree with the network registry"
            );
        }
        Ok(on_chain)
    }

    /// Current gas price and the cost of a transfer using `typical_gas`.
    pub async fn fee_quote(&self, typical_gas: u64) -> Result<FeeQuote, PaymentError> {
        let binding = self.binding().await?;
        let gas_price = self.require_rpc()?.gas_price().await?;
        let cost = gas_price.saturating_mul(U256::from(typical_gas));
        Ok(FeeQuote {
            gas_price_wei: gas_price,
            gas_price_gwei: display_amount(gas_price, 9, 2),
            estimated_gas: typical_gas,
            cost_native: format_units(cost, NATIVE_DECIMALS),
            native_symbol: binding.profile.native_symbol,
        })
    }

    fn require_rpc(&self) -> Result<Arc<dyn ChainRpc>, PaymentError> {
        self.rpc()
            .ok_or_else(|| ConnectionError::NoProviderDetected.into())
    }
}

// ---------------------------------------------------------------------------
// Session internals
// ---------------------------------------------------------------------------

impl SessionInner {
    fn bind_contract(&self, chain_id: u64, rpc: &Arc<dyn ChainRpc>) -> Option<StablecoinContract> {
        self.registry
            .stablecoin_address(chain_id)
            .map(|address| StablecoinContract::new(address, chain_id, Arc::clone(rpc)))
    }

    fn notify(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    async fn rebind_chain(&self, chain_id: u64) -> bool {
        let Some(provider) = &self.provider else {
            return false;
        };
        let supported = {
            let mut state = self.state.write().await;
            if state.connection != ConnectionState::Connected || state.chain_id == Some(chain_id) {
                return false;
            }
            let previous = state.chain_id;
            state.chain_id = Some(chain_id);
            state.contract = self.bind_contract(chain_id, &provider.rpc());
            state.chain_epoch += 1;
            info!(
                from = ?previous,
                to = chain_id,
                epoch = state.chain_epoch,
                supported = state.contract.is_some(),
                "Session rebound to new chain"
            );
            state.contract.is_some()
        };
        self.monitors.cancel_all(CancelReason::ChainChanged);
        self.notify(SessionEvent::ChainChanged {
            chain_id,
            supported,
        });
        true
    }

    async fn change_account(&self, account: Address) {
        {
            let mut state = self.state.write().await;
            if state.connection != ConnectionState::Connected || state.account == Some(account) {
                return;
            }
            state.account = Some(account);
        }
        info!(account = ?account, "Wallet account changed");
        self.notify(SessionEvent::AccountChanged(account));
    }

    async fn teardown(&self, reason: &str) {
        let was_connected = {
            let mut state = self.state.write().await;
            let was_connected = state.connection != ConnectionState::Disconnected;
            let epoch = state.chain_epoch + 1;
            *state = SessionState {
                chain_epoch: epoch,
                ..SessionState::default()
            };
            was_connected
        };
        self.monitors.cancel_all(CancelReason::Disconnected);
        self.stop_listener();
        if was_connected {
            info!(reason, "Wallet disconnected");
            self.notify(SessionEvent::Disconnected);
        }
    }

    fn start_listener(self: &Arc<Self>, provider: &Arc<dyn WalletProvider>) {
        let mut listener = self.listener.lock().unwrap_or_else(|p| p.into_inner());
        if listener.as_ref().is_some_and(|l| !l.handle.is_finished()) {
            return;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let events = provider.subscribe();
        let handle = tokio::spawn(listen(Arc::downgrade(self), events, shutdown_rx));
        *listener = Some(Listener {
            shutdown_tx,
            handle,
        });
    }

    fn stop_listener(&self) {
        let listener = self.listener.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(listener) = listener {
            let _ = listener.shutdown_tx.send(true);
        }
    }
}

/// Provider event loop. Holds only a weak reference so a dropped session
/// ends the task.
async fn listen(
    session: Weak<SessionInner>,
    mut events: broadcast::Receiver<ProviderEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!("Provider event listener started");
    loop {
        tokio::select! {
            biased;

            // Shutdown has highest priority.
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            event = events.recv() => match event {
                Ok(event) => {
                    let Some(inner) = session.upgrade() else {
                        break;
                    };
                    let _ = inner.process(event).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Provider event listener lagged");
                }
                Err(RecvError::Closed) => {
                    info!("Provider event stream closed");
                    break;
                }
            }
        }
    }
    debug!("Provider event listener stopped");
}

// ---------------------------------------------------------------------------
// Processor trait implementation
// ---------------------------------------------------------------------------

impl Processor<ProviderEvent> for SessionInner {
    type Output = ();
    type Error = Infallible;

    async fn process(&self, event: ProviderEvent) -> Result<(), Infallible> {
        debug!(?event, "Processing provider event");
        match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.first() {
                Some(&account) => self.change_account(account).await,
                None => self.teardown("wallet exposed no accounts").await,
            },
            ProviderEvent::ChainChanged(chain_id) => {
                self.rebind_chain(chain_id).await;
            }
            ProviderEvent::Disconnect => self.teardown("provider disconnected").await,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{MonitorOutcome, MonitorUpdate, TransactionMonitor};
    use crate::provider::ProviderError;
    use crate::testing::{MockWallet, account};
    use stablepay_sdk::TxHash;
    use stablepay_sdk::config::MonitorPolicy;
    use std::time::Duration;

    fn session(wallet: &MockWallet) -> WalletSession {
        WalletSession::new(Some(wallet.arc()), Arc::new(NetworkRegistry::builtin().unwrap()))
    }

    #[tokio::test]
    async fn test_connect_without_provider_returns_immediately() {
        let bare = WalletSession::new(None, Arc::new(NetworkRegistry::builtin().unwrap()));
        let result = tokio::time::timeout(Duration::from_millis(100), bare.connect(None))
            .await
            .expect("connect must not hang");
        assert_eq!(result.unwrap_err(), ConnectionError::NoProviderDetected);

        let wallet = MockWallet::new(1);
        wallet.set_kinds(vec![]);
        let session = session(&wallet);
        assert_eq!(
            session.connect(None).await.unwrap_err(),
            ConnectionError::NoProviderDetected
        );
        assert!(wallet.calls().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_while_connecting_cancels_the_attempt() {
        let wallet = MockWallet::new(137);
        let release = wallet.pause_on("eth_requestAccounts");
        let session = session(&wallet);

        let interrupt = async {
            while wallet.count("eth_requestAccounts") == 0 {
                tokio::task::yield_now().await;
            }
            assert_eq!(session.snapshot().await.state, ConnectionState::Connecting);
            assert_eq!(
                session.connect(None).await.unwrap_err(),
                ConnectionError::RequestAlreadyPending
            );
            session.disconnect().await;
            release.notify_one();
        };
        let (result, ()) = tokio::join!(session.connect(None), interrupt);
        assert_eq!(result.unwrap_err(), ConnectionError::Cancelled);
        assert_eq!(wallet.count("eth_requestAccounts"), 1);

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, ConnectionState::Disconnected);
        assert_eq!(snapshot.account, None);
        assert_eq!(snapshot.chain_id, None);
        assert_eq!(snapshot.contract, None);

        let summary = session.connect(None).await.unwrap();
        assert!(summary.supported);
        assert!(session.is_connected().await);
    }

    #[tokio::test]
    async fn test_connect_binds_contract() {
        let wallet = MockWallet::new(137);
        let session = session(&wallet);
        let mut events = session.subscribe();

        let summary = session.connect(Some(WalletKind::Coinbase)).await.unwrap();
        assert_eq!(summary.account, account());
        assert_eq!(summary.chain_id, 137);
        assert_eq!(summary.network_name.as_deref(), Some("Polygon"));
        assert!(summary.supported);
        assert_eq!(summary.native_balance, "1");
        // Coinbase was not detected, so the first detected wallet is used.
        assert_eq!(summary.wallet_kind, WalletKind::MetaMask);

        let snapshot = session.snapshot().await;
        assert!(snapshot.is_connected());
        assert_eq!(
            snapshot.contract,
            session.registry().stablecoin_address(137)
        );
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Connected {
                account: account(),
                chain_id: 137
            }
        );
    }

    #[tokio::test]
    async fn test_connect_on_unsupported_chain() {
        let wallet = MockWallet::new(8453);
        let session = session(&wallet);

        let summary = session.connect(None).await.unwrap();
        assert!(!summary.supported);
        assert_eq!(summary.network_name, None);
        assert_eq!(session.snapshot().await.contract, None);

        let err = session.stablecoin_balance().await.unwrap_err();
        assert_eq!(
            err,
            PaymentError::Network(NetworkError::UnsupportedNetwork {
                chain_id: Some(8453)
            })
        );
        assert!(session.fee_quote(65_000).await.is_err());
        assert_eq!(wallet.count("eth_call"), 0);
        assert_eq!(wallet.count("eth_gasPrice"), 0);
    }

    #[tokio::test]
    async fn test_connect_errors() {
        let wallet = MockWallet::new(1);
        let session = session(&wallet);

        wallet.set_accounts(Err(ProviderError::UserRejected));
        assert_eq!(
            session.connect(None).await.unwrap_err(),
            ConnectionError::UserRejected
        );
        assert_eq!(session.snapshot().await.state, ConnectionState::Disconnected);

        wallet.set_accounts(Err(ProviderError::RequestPending));
        assert_eq!(
            session.connect(None).await.unwrap_err(),
            ConnectionError::RequestAlreadyPending
        );

        wallet.set_accounts(Ok(vec![]));
        assert_eq!(
            session.connect(None).await.unwrap_err(),
            ConnectionError::NoAccounts
        );
        assert!(!session.is_connected().await);
    }

    #[tokio::test]
    async fn test_account_events() {
        let wallet = MockWallet::new(1);
        let session = session(&wallet);
        session.connect(None).await.unwrap();
        let mut events = session.subscribe();

        let other = Address::from_low_u64_be(0xb0b);
        wallet.emit(ProviderEvent::AccountsChanged(vec![other]));
        assert_eq!(events.recv().await.unwrap(), SessionEvent::AccountChanged(other));
        assert_eq!(session.snapshot().await.account, Some(other));

        wallet.emit(ProviderEvent::AccountsChanged(vec![]));
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Disconnected);
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, ConnectionState::Disconnected);
        assert_eq!(snapshot.account, None);
        assert_eq!(snapshot.contract, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chain_change_rebinds_and_cancels_monitors() {
        let wallet = MockWallet::new(137);
        let session = session(&wallet);
        session.connect(None).await.unwrap();
        let epoch = session.chain_epoch().await;
        let mut events = session.subscribe();

        let monitor = TransactionMonitor::new(
            wallet.rpc(),
            MonitorPolicy::default(),
            session.monitors(),
        );
        let handle = monitor.watch(TxHash::repeat_byte(1), 128, |_| {}).unwrap();

        wallet.emit(ProviderEvent::ChainChanged(56));
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::ChainChanged {
                chain_id: 56,
                supported: true
            }
        );

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.chain_id, Some(56));
        assert_eq!(snapshot.contract, session.registry().stablecoin_address(56));
        assert_eq!(snapshot.chain_epoch, epoch + 1);
        assert_eq!(
            handle.outcome().await,
            MonitorOutcome::Cancelled(CancelReason::ChainChanged)
        );

        wallet.emit(ProviderEvent::ChainChanged(8453));
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::ChainChanged {
                chain_id: 8453,
                supported: false
            }
        );
        assert_eq!(session.snapshot().await.contract, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_callbacks_after_disconnect() {
        let wallet = MockWallet::new(1);
        let session = session(&wallet);
        session.connect(None).await.unwrap();
        let mut events = session.subscribe();

        let updates = Arc::new(Mutex::new(Vec::<MonitorUpdate>::new()));
        let sink = Arc::clone(&updates);
        let monitor = TransactionMonitor::new(
            wallet.rpc(),
            MonitorPolicy::default(),
            session.monitors(),
        );
        let handle = monitor
            .watch(TxHash::repeat_byte(2), 12, move |u| sink.lock().unwrap().push(u))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        let seen = updates.lock().unwrap().len();

        session.disconnect().await;
        session.disconnect().await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(updates.lock().unwrap().len(), seen);
        assert_eq!(
            handle.outcome().await,
            MonitorOutcome::Cancelled(CancelReason::Disconnected)
        );
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Disconnected);
        assert!(events.try_recv().is_err());

        // Events after disconnect are ignored.
        wallet.emit(ProviderEvent::ChainChanged(56));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(session.snapshot().await.chain_id, None);
    }

    #[tokio::test]
    async fn test_fee_quote_and_decimals() {
        let wallet = MockWallet::new(56);
        let session = session(&wallet);
        session.connect(None).await.unwrap();

        let quote = session.fee_quote(65_000).await.unwrap();
        assert_eq!(quote.gas_price_gwei, "30.00");
        assert_eq!(quote.cost_native, "0.00195");
        assert_eq!(quote.native_symbol, "BNB");

        // Registry says 18 for BSC; the contract answers 6 by default.
        assert_eq!(session.token_decimals().await.unwrap(), 6);
        wallet.set_token_decimals(18);
        assert_eq!(session.token_decimals().await.unwrap(), 18);

        wallet.set_token_balance(U256::from(12_500_000_000_000_000_000u128));
        assert_eq!(session.stablecoin_balance().await.unwrap(), "12.5");
    }
}
