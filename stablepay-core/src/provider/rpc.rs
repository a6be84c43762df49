//! JSON-RPC wallet provider.
//!
//! Speaks the EIP-1193 method set over HTTP JSON-RPC 2.0, for wallets and
//! signers that expose an endpoint (a local node with unlocked accounts, a
//! wallet bridge, a remote signer). HTTP has no push channel, so
//! [`HttpWalletProvider::watch_changes`] polls `eth_accounts` and
//! `eth_chainId` and turns differences into [`ProviderEvent`]s.

use super::{ChainRpc, ProviderError, ProviderEvent, TransactionReceipt, TransactionRequest, WalletProvider};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use stablepay_sdk::objects::{AddChainParams, WalletKind};
use stablepay_sdk::{Address, TxHash, U256};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// A wallet reached through a JSON-RPC endpoint.
#[derive(Clone)]
pub struct HttpWalletProvider {
    inner: Arc<HttpInner>,
}

struct HttpInner {
    client: reqwest::Client,
    url: url::Url,
    kind: WalletKind,
    next_id: AtomicU64,
    events_tx: broadcast::Sender<ProviderEvent>,
}

impl HttpWalletProvider {
    pub fn new(url: url::Url, kind: WalletKind) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
        Ok(Self {
            inner: Arc::new(HttpInner {
                client,
                url,
                kind,
                next_id: AtomicU64::new(1),
                events_tx,
            }),
        })
    }

    pub fn url(&self) -> &url::Url {
        &self.inner.url
    }

    /// Issue one JSON-RPC call and return its `result`.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "JSON-RPC request");

        let response = self
            .inner
            .client
            .post(self.inner.url.clone())
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Transport(format!("HTTP {status}")));
        }
        let response: RpcResponse = response.json().await?;

        if let Some(error) = response.error {
            return Err(ProviderError::from_rpc(error.code, error.message));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Poll accounts and chain id every `interval`, broadcasting changes as
    /// provider events until `shutdown_rx` flips to `true`.
    pub fn watch_changes(
        &self,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let provider = self.clone();
        tokio::spawn(async move {
            let mut last_accounts: Option<Vec<Address>> = None;
            let mut last_chain: Option<u64> = None;
            let mut ticker = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Provider change watcher received shutdown signal");
                            break;
                        }
                    }

                    _ = ticker.tick() => {
                        match provider.accounts().await {
                            Ok(accounts) => {
                                if last_accounts.as_ref().is_some_and(|prev| *prev != accounts) {
                                    provider.emit(ProviderEvent::AccountsChanged(accounts.clone()));
                                }
                                last_accounts = Some(accounts);
                            }
                            Err(ProviderError::Transport(e)) => {
                                warn!(error = %e, "Provider unreachable, emitting disconnect");
                                if last_accounts.take().is_some() {
                                    provider.emit(ProviderEvent::Disconnect);
                                }
                                last_chain = None;
                                continue;
                            }
                            Err(e) => warn!(error = %e, "Failed to poll accounts"),
                        }
                        match provider.chain_id().await {
                            Ok(chain_id) => {
                                if last_chain.is_some_and(|prev| prev != chain_id) {
                                    provider.emit(ProviderEvent::ChainChanged(chain_id));
                                }
                                last_chain = Some(chain_id);
                            }
                            Err(e) => warn!(error = %e, "Failed to poll chain id"),
                        }
                    }
                }
            }
        })
    }

    /// Accounts already exposed to this client, without prompting.
    pub async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let value = self.request("eth_accounts", json!([])).await?;
        parse_accounts(&value)
    }

    fn emit(&self, event: ProviderEvent) {
        debug!(?event, "Emitting provider event");
        let _ = self.inner.events_tx.send(event);
    }
}

// ---------------------------------------------------------------------------
// Hex helpers
// ---------------------------------------------------------------------------

fn hex_quantity(value: u64) -> String {
    format!("{value:#x}")
}

fn hex_data(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

fn as_str<'a>(value: &'a Value, what: &str) -> Result<&'a str, ProviderError> {
    value
        .as_str()
        .ok_or_else(|| ProviderError::InvalidResponse(format!("{what}: expected string, got {value}")))
}

fn parse_u64(value: &Value, what: &str) -> Result<u64, ProviderError> {
    let s = as_str(value, what)?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| ProviderError::InvalidResponse(format!("{what}: {e}")))
}

fn parse_u256(value: &Value, what: &str) -> Result<U256, ProviderError> {
    let s = as_str(value, what)?;
    let digits = s.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| ProviderError::InvalidResponse(format!("{what}: {e:?}")))
}

fn parse_bytes(value: &Value, what: &str) -> Result<Vec<u8>, ProviderError> {
    let s = as_str(value, what)?;
    hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| ProviderError::InvalidResponse(format!("{what}: {e}")))
}

fn parse_accounts(value: &Value) -> Result<Vec<Address>, ProviderError> {
    let list = value
        .as_array()
        .ok_or_else(|| ProviderError::InvalidResponse(format!("accounts: expected array, got {value}")))?;
    list.iter()
        .map(|v| {
            let s = as_str(v, "account")?;
            Address::from_str(s)
                .map_err(|e| ProviderError::InvalidResponse(format!("account {s}: {e}")))
        })
        .collect()
}

fn transaction_object(request: &TransactionRequest) -> Value {
    let mut object = json!({
        "to": format!("{:#x}", request.to),
        "data": hex_data(&request.data),
    });
    if let Some(from) = request.from {
        object["from"] = json!(format!("{from:#x}"));
    }
    if let Some(gas) = request.gas {
        object["gas"] = json!(hex_quantity(gas));
    }
    object
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl ChainRpc for HttpWalletProvider {
    async fn native_balance(&self, account: Address) -> Result<U256, ProviderError> {
        let value = self
            .request("eth_getBalance", json!([format!("{account:#x}"), "latest"]))
            .await?;
        parse_u256(&value, "eth_getBalance")
    }

    async fn gas_price(&self) -> Result<U256, ProviderError> {
        let value = self.request("eth_gasPrice", json!([])).await?;
        parse_u256(&value, "eth_gasPrice")
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        let value = self.request("eth_blockNumber", json!([])).await?;
        parse_u64(&value, "eth_blockNumber")
    }

    async fn transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, ProviderError> {
        let value = self
            .request("eth_getTransactionReceipt", json!([format!("{tx_hash:#x}")]))
            .await?;
        if value.is_null() || value["blockNumber"].is_null() {
            return Ok(None);
        }
        let block_number = parse_u64(&value["blockNumber"], "receipt.blockNumber")?;
        let status = match &value["status"] {
            Value::Null => true,
            status => parse_u64(status, "receipt.status")? == 1,
        };
        let gas_used = match &value["gasUsed"] {
            Value::Null => 0,
            gas => parse_u64(gas, "receipt.gasUsed")?,
        };
        Ok(Some(TransactionReceipt {
            block_number,
            status,
            gas_used,
        }))
    }

    async fn call(&self, request: &TransactionRequest) -> Result<Vec<u8>, ProviderError> {
        let value = self
            .request("eth_call", json!([transaction_object(request), "latest"]))
            .await?;
        parse_bytes(&value, "eth_call")
    }

    async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64, ProviderError> {
        let value = self
            .request("eth_estimateGas", json!([transaction_object(request)]))
            .await?;
        parse_u64(&value, "eth_estimateGas")
    }

    async fn send_transaction(&self, request: &TransactionRequest) -> Result<TxHash, ProviderError> {
        let value = self
            .request("eth_sendTransaction", json!([transaction_object(request)]))
            .await?;
        let s = as_str(&value, "eth_sendTransaction")?;
        stablepay_sdk::objects::payment::parse_tx_hash(s)
            .ok_or_else(|| ProviderError::InvalidResponse(format!("malformed transaction hash {s}")))
    }
}

#[async_trait]
impl WalletProvider for HttpWalletProvider {
    fn detected_kinds(&self) -> Vec<WalletKind> {
        vec![self.inner.kind]
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let value = self.request("eth_requestAccounts", json!([])).await?;
        parse_accounts(&value)
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        let value = self.request("eth_chainId", json!([])).await?;
        parse_u64(&value, "eth_chainId")
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError> {
        self.request(
            "wallet_switchEthereumChain",
            json!([{ "chainId": hex_quantity(chain_id) }]),
        )
        .await?;
        Ok(())
    }

    async fn add_chain(&self, params: &AddChainParams) -> Result<(), ProviderError> {
        let params = serde_json::to_value(params)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        self.request("wallet_addEthereumChain", json!([params])).await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.inner.events_tx.subscribe()
    }

    fn rpc(&self) -> Arc<dyn ChainRpc> {
        Arc::new(self.clone())
    }
}
