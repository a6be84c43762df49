//! Scripted in-memory wallet for unit tests.

use crate::contract::{BALANCE_OF, DECIMALS, TRANSFER, encode_word, selector_of};
use crate::provider::{
    ChainRpc, ProviderError, ProviderEvent, TransactionReceipt, TransactionRequest, WalletProvider,
};
use async_trait::async_trait;
use stablepay_sdk::objects::{AddChainParams, WalletKind};
use stablepay_sdk::{Address, TxHash, U256};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Notify, broadcast};

pub fn account() -> Address {
    Address::from_low_u64_be(0xa11ce)
}

pub fn merchant() -> Address {
    Address::from_low_u64_be(0x5e11e7)
}

pub fn sent_hash() -> TxHash {
    TxHash::repeat_byte(0xab)
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap()
}

struct MockState {
    kinds: Mutex<Vec<WalletKind>>,
    accounts: Mutex<Result<Vec<Address>, ProviderError>>,
    chain_id: Mutex<u64>,
    known_chains: Mutex<Vec<u64>>,
    switch_error: Mutex<Option<ProviderError>>,
    add_error: Mutex<Option<ProviderError>>,
    token_balance: Mutex<U256>,
    token_decimals: Mutex<u32>,
    native_balance: Mutex<U256>,
    gas_price: Mutex<U256>,
    estimate: Mutex<Result<u64, ProviderError>>,
    send_result: Mutex<Result<TxHash, ProviderError>>,
    heights: Mutex<VecDeque<u64>>,
    receipt: Mutex<Result<Option<TransactionReceipt>, ProviderError>>,
    calls: Mutex<Vec<String>>,
    sent: Mutex<Vec<TransactionRequest>>,
    paused: Mutex<Option<(&'static str, Arc<Notify>)>>,
    events_tx: broadcast::Sender<ProviderEvent>,
}

/// A wallet whose answers are set by the test and whose calls are logged.
#[derive(Clone)]
pub struct MockWallet {
    state: Arc<MockState>,
}

/// The chain side of [`MockWallet`], sharing its state.
pub struct MockChain {
    state: Arc<MockState>,
}

impl MockWallet {
    pub fn new(chain_id: u64) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            state: Arc::new(MockState {
                kinds: Mutex::new(vec![WalletKind::MetaMask]),
                accounts: Mutex::new(Ok(vec![account()])),
                chain_id: Mutex::new(chain_id),
                known_chains: Mutex::new(vec![1, chain_id]),
                switch_error: Mutex::new(None),
                add_error: Mutex::new(None),
                token_balance: Mutex::new(U256::zero()),
                token_decimals: Mutex::new(6),
                // 1 native token
                native_balance: Mutex::new(U256::exp10(18)),
                // 30 gwei
                gas_price: Mutex::new(U256::from(30_000_000_000u64)),
                estimate: Mutex::new(Ok(50_000)),
                send_result: Mutex::new(Ok(sent_hash())),
                heights: Mutex::new(VecDeque::from([100])),
                receipt: Mutex::new(Ok(None)),
                calls: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
                paused: Mutex::new(None),
                events_tx,
            }),
        }
    }

    pub fn arc(&self) -> Arc<dyn WalletProvider> {
        Arc::new(self.clone())
    }

    // -- scripting ----------------------------------------------------------

    pub fn set_kinds(&self, kinds: Vec<WalletKind>) {
        *lock(&self.state.kinds) = kinds;
    }

    pub fn set_accounts(&self, accounts: Result<Vec<Address>, ProviderError>) {
        *lock(&self.state.accounts) = accounts;
    }

    pub fn set_switch_error(&self, error: Option<ProviderError>) {
        *lock(&self.state.switch_error) = error;
    }

    pub fn set_add_error(&self, error: Option<ProviderError>) {
        *lock(&self.state.add_error) = error;
    }

    pub fn set_token_balance(&self, balance: U256) {
        *lock(&self.state.token_balance) = balance;
    }

    pub fn set_token_decimals(&self, decimals: u32) {
        *lock(&self.state.token_decimals) = decimals;
    }

    pub fn set_native_balance(&self, balance: U256) {
        *lock(&self.state.native_balance) = balance;
    }

    pub fn set_estimate(&self, estimate: Result<u64, ProviderError>) {
        *lock(&self.state.estimate) = estimate;
    }

    pub fn set_send_result(&self, result: Result<TxHash, ProviderError>) {
        *lock(&self.state.send_result) = result;
    }

    /// Block heights returned by successive `eth_blockNumber` calls; the
    /// last one repeats.
    pub fn set_heights(&self, heights: Vec<u64>) {
        *lock(&self.state.heights) = heights.into();
    }

    pub fn set_receipt(&self, receipt: Result<Option<TransactionReceipt>, ProviderError>) {
        *lock(&self.state.receipt) = receipt;
    }

    /// Park the next `method` call after it is logged until the returned
    /// `Notify` is signalled.
    pub fn pause_on(&self, method: &'static str) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        *lock(&self.state.paused) = Some((method, Arc::clone(&release)));
        release
    }

    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.state.events_tx.send(event);
    }

    // -- inspection ---------------------------------------------------------

    pub fn calls(&self) -> Vec<String> {
        lock(&self.state.calls).clone()
    }

    pub fn count(&self, method: &str) -> usize {
        lock(&self.state.calls)
            .iter()
            .filter(|c| c.starts_with(method))
            .count()
    }

    pub fn sent(&self) -> Vec<TransactionRequest> {
        lock(&self.state.sent).clone()
    }

    pub fn current_chain(&self) -> u64 {
        *lock(&self.state.chain_id)
    }
}

impl MockState {
    fn log(&self, call: impl Into<String>) {
        lock(&self.calls).push(call.into());
    }

    async fn hold(&self, method: &str) {
        let release = {
            let mut paused = lock(&self.paused);
            if paused.as_ref().is_some_and(|(m, _)| *m == method) {
                paused.take().map(|(_, release)| release)
            } else {
                None
            }
        };
        if let Some(release) = release {
            release.notified().await;
        }
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn native_balance(&self, _account: Address) -> Result<U256, ProviderError> {
        self.state.log("eth_getBalance");
        self.state.hold("eth_getBalance").await;
        Ok(*lock(&self.state.native_balance))
    }

    async fn gas_price(&self) -> Result<U256, ProviderError> {
        self.state.log("eth_gasPrice");
        Ok(*lock(&self.state.gas_price))
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        self.state.log("eth_blockNumber");
        let mut heights = lock(&self.state.heights);
        let height = if heights.len() > 1 {
            heights.pop_front()
        } else {
            heights.front().copied()
        };
        height.ok_or_else(|| ProviderError::InvalidResponse("no height scripted".into()))
    }

    async fn transaction_receipt(
        &self,
        _tx_hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, ProviderError> {
        self.state.log("eth_getTransactionReceipt");
        lock(&self.state.receipt).clone()
    }

    async fn call(&self, request: &TransactionRequest) -> Result<Vec<u8>, ProviderError> {
        match selector_of(&request.data) {
            Some(BALANCE_OF) => {
                self.state.log("eth_call(balanceOf)");
                Ok(encode_word(*lock(&self.state.token_balance)))
            }
            Some(DECIMALS) => {
                self.state.log("eth_call(decimals)");
                Ok(encode_word(U256::from(*lock(&self.state.token_decimals))))
            }
            _ => Err(ProviderError::from_rpc(-32000, "unknown selector")),
        }
    }

    async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64, ProviderError> {
        self.state.log("eth_estimateGas");
        self.state.hold("eth_estimateGas").await;
        assert_eq!(selector_of(&request.data), Some(TRANSFER));
        lock(&self.state.estimate).clone()
    }

    async fn send_transaction(&self, request: &TransactionRequest) -> Result<TxHash, ProviderError> {
        self.state.log("eth_sendTransaction");
        lock(&self.state.sent).push(request.clone());
        lock(&self.state.send_result).clone()
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    fn detected_kinds(&self) -> Vec<WalletKind> {
        lock(&self.state.kinds).clone()
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.state.log("eth_requestAccounts");
        self.state.hold("eth_requestAccounts").await;
        lock(&self.state.accounts).clone()
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        self.state.log("eth_chainId");
        Ok(*lock(&self.state.chain_id))
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError> {
        self.state.log(format!("wallet_switchEthereumChain({chain_id})"));
        if let Some(error) = lock(&self.state.switch_error).clone() {
            return Err(error);
        }
        if !lock(&self.state.known_chains).contains(&chain_id) {
            return Err(ProviderError::ChainNotConfigured);
        }
        *lock(&self.state.chain_id) = chain_id;
        self.emit(ProviderEvent::ChainChanged(chain_id));
        Ok(())
    }

    async fn add_chain(&self, params: &AddChainParams) -> Result<(), ProviderError> {
        self.state.log(format!("wallet_addEthereumChain({})", params.chain_id));
        if let Some(error) = lock(&self.state.add_error).clone() {
            return Err(error);
        }
        let chain_id = u64::from_str_radix(params.chain_id.trim_start_matches("0x"), 16).unwrap();
        lock(&self.state.known_chains).push(chain_id);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.state.events_tx.subscribe()
    }

    fn rpc(&self) -> Arc<dyn ChainRpc> {
        Arc::new(MockChain {
            state: Arc::clone(&self.state),
        })
    }
}
