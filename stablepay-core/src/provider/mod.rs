//! Wallet provider capabilities.
//!
//! The orchestrator never talks to a concrete wallet. It depends on two
//! capability traits:
//! - [`WalletProvider`]: account access, chain activation, and the push
//!   event stream (EIP-1193 surface)
//! - [`ChainRpc`]: read and write calls against the chain the wallet is on
//!
//! [`rpc::HttpWalletProvider`] implements both over JSON-RPC.

pub mod rpc;

use async_trait::async_trait;
use stablepay_sdk::objects::{AddChainParams, WalletKind};
use stablepay_sdk::{Address, TxHash, U256};
use std::sync::Arc;
use tokio::sync::broadcast;

pub use rpc::HttpWalletProvider;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Push notifications emitted by the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// The exposed account list changed; empty means the user locked or
    /// disconnected the wallet.
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
    Disconnect,
}

/// A message call or transaction against a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub data: Vec<u8>,
    /// Gas limit; left to the wallet when `None`.
    pub gas: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub block_number: u64,
    /// `false` when the transaction was mined but reverted.
    pub status: bool,
    pub gas_used: u64,
}

/// Errors reported by a provider.
///
/// EIP-1193 codes that the orchestrator reacts to get their own variant;
/// everything else is kept as a raw code and message.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Code 4001.
    #[error("user rejected the request")]
    UserRejected,
    /// Code -32002: the wallet already shows a prompt for this site.
    #[error("a request is already pending in the wallet")]
    RequestPending,
    /// Code 4902: the wallet does not know the requested chain.
    #[error("chain is not configured in the wallet")]
    ChainNotConfigured,
    /// Codes 4900/4901.
    #[error("provider is disconnected")]
    Disconnected,
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const DISCONNECTED: i64 = 4900;
    pub const CHAIN_DISCONNECTED: i64 = 4901;
    pub const CHAIN_NOT_CONFIGURED: i64 = 4902;
    pub const REQUEST_PENDING: i64 = -32002;

    /// Classify a JSON-RPC / EIP-1193 error object.
    pub fn from_rpc(code: i64, message: impl Into<String>) -> Self {
        match code {
            Self::USER_REJECTED => ProviderError::UserRejected,
            Self::REQUEST_PENDING => ProviderError::RequestPending,
            Self::CHAIN_NOT_CONFIGURED => ProviderError::ChainNotConfigured,
            Self::DISCONNECTED | Self::CHAIN_DISCONNECTED => ProviderError::Disconnected,
            _ => ProviderError::Rpc {
                code,
                message: message.into(),
            },
        }
    }

    /// Lowercased message text used for classifying send failures.
    pub fn message_lower(&self) -> String {
        match self {
            ProviderError::Rpc { message, .. } => message.to_lowercase(),
            other => other.to_string().to_lowercase(),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Transport(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Chain access through the wallet.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn native_balance(&self, account: Address) -> Result<U256, ProviderError>;
    async fn gas_price(&self) -> Result<U256, ProviderError>;
    async fn block_number(&self) -> Result<u64, ProviderError>;
    /// `None` while the transaction is not yet mined.
    async fn transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, ProviderError>;
    async fn call(&self, request: &TransactionRequest) -> Result<Vec<u8>, ProviderError>;
    async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64, ProviderError>;
    /// Hand a transaction to the wallet for approval and broadcast.
    async fn send_transaction(&self, request: &TransactionRequest) -> Result<TxHash, ProviderError>;
}

/// The wallet itself.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Wallet families present in the host; empty when none was injected.
    fn detected_kinds(&self) -> Vec<WalletKind>;
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError>;
    async fn chain_id(&self) -> Result<u64, ProviderError>;
    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError>;
    async fn add_chain(&self, params: &AddChainParams) -> Result<(), ProviderError>;
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
    fn rpc(&self) -> Arc<dyn ChainRpc>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rpc_codes() {
        assert_eq!(ProviderError::from_rpc(4001, "denied"), ProviderError::UserRejected);
        assert_eq!(
            ProviderError::from_rpc(-32002, "already processing"),
            ProviderError::RequestPending
        );
        assert_eq!(
            ProviderError::from_rpc(4902, "Unrecognized chain ID"),
            ProviderError::ChainNotConfigured
        );
        assert_eq!(ProviderError::from_rpc(4900, "gone"), ProviderError::Disconnected);
        assert_eq!(
            ProviderError::from_rpc(-32000, "Insufficient funds for gas"),
            ProviderError::Rpc {
                code: -32000,
                message: "Insufficient funds for gas".to_string()
            }
        );
    }

    #[test]
    fn test_message_lower() {
        let err = ProviderError::from_rpc(3, "Execution Reverted: BEP20");
        assert_eq!(err.message_lower(), "execution reverted: bep20");
    }
}
