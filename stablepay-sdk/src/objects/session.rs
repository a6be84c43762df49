//! Read-only views of the wallet session, handed to observers.

use crate::{Address, U256};
use serde::{Deserialize, Serialize};

/// Browser wallet families the orchestrator can tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletKind {
    MetaMask,
    Coinbase,
    WalletConnect,
    /// Any other EIP-1193 provider.
    Injected,
}

impl WalletKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            WalletKind::MetaMask => "MetaMask",
            WalletKind::Coinbase => "Coinbase Wallet",
            WalletKind::WalletConnect => "WalletConnect",
            WalletKind::Injected => "Browser Wallet",
        }
    }
}

impl std::fmt::Display for WalletKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for WalletKind {
    type Err = UnknownWalletKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "metamask" => Ok(WalletKind::MetaMask),
            "coinbase" => Ok(WalletKind::Coinbase),
            "walletconnect" => Ok(WalletKind::WalletConnect),
            "injected" => Ok(WalletKind::Injected),
            _ => Err(UnknownWalletKind(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown wallet kind: {0}")]
pub struct UnknownWalletKind(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// What `connect` reports back once the wallet is bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub account: Address,
    pub chain_id: u64,
    /// `None` when the wallet sits on a chain outside the registry.
    pub network_name: Option<String>,
    pub supported: bool,
    /// Native balance formatted in whole units, e.g. `"0.25"`.
    pub native_balance: String,
    pub wallet_kind: WalletKind,
}

/// Point-in-time copy of the session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub account: Option<Address>,
    pub chain_id: Option<u64>,
    pub wallet_kind: Option<WalletKind>,
    /// Stablecoin contract bound for `chain_id`, if the chain is supported.
    pub contract: Option<Address>,
    /// Bumped on every chain rebind.
    pub chain_epoch: u64,
}

impl SessionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.account.is_some()
    }
}

/// Current network fee data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeQuote {
    pub gas_price_wei: U256,
    /// Gas price in gwei, two decimal places.
    pub gas_price_gwei: String,
    pub estimated_gas: u64,
    /// `gas_price * estimated_gas` in whole native units.
    pub cost_native: String,
    pub native_symbol: String,
}

/// Shortened account for display: `0x1234...abcd`.
pub fn format_address(address: &Address) -> String {
    let full = format!("{address:#x}");
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_format_address() {
        let address = Address::from_str("0x5FbDB2315678afecb367f032d93F642f64180aa3").unwrap();
        assert_eq!(format_address(&address), "0x5fbd...0aa3");
    }

    #[test]
    fn test_wallet_kind_parsing() {
        assert_eq!(WalletKind::from_str("MetaMask"), Ok(WalletKind::MetaMask));
        assert_eq!(WalletKind::from_str("injected"), Ok(WalletKind::Injected));
        assert!(WalletKind::from_str("ledger").is_err());
        assert_eq!(WalletKind::Coinbase.to_string(), "Coinbase Wallet");
    }

    #[test]
    fn test_default_snapshot_is_disconnected() {
        let snapshot = SessionSnapshot::default();
        assert_eq!(snapshot.state, ConnectionState::Disconnected);
        assert!(!snapshot.is_connected());
    }
}
