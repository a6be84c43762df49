//! TOML file configuration structures.
//!
//! These structs directly map to the `stablepay.toml` file format.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stablepay_sdk::objects::{GasLevel, WalletKind};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub payment: PaymentSection,
    #[serde(default)]
    pub gas: GasSection,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub provider: ProviderSection,
    #[serde(default)]
    pub rate_source: RateSourceSection,
    /// Extra networks, added to or replacing entries of the built-in catalogue.
    #[serde(default)]
    pub networks: Vec<NetworkSection>,
}

/// Merchant side of a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSection {
    /// Address receiving the stablecoin transfer.
    pub recipient: String,
    #[serde(default = "default_fiat_currency")]
    pub fiat_currency: String,
    /// Fiat units per whole token, used until a live source refreshes it.
    pub rate: Decimal,
}

fn default_fiat_currency() -> String {
    "VND".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasSection {
    #[serde(default = "default_buffer_percent")]
    pub buffer_percent: u32,
    #[serde(default = "default_fallback_gas_limit")]
    pub fallback_gas_limit: u64,
    /// Whole native units, e.g. `"0.001"`.
    #[serde(default = "default_min_native_balance")]
    pub min_native_balance: Decimal,
    #[serde(default = "default_typical_transfer_gas")]
    pub typical_transfer_gas: u64,
}

fn default_buffer_percent() -> u32 {
    30
}

fn default_fallback_gas_limit() -> u64 {
    100_000
}

fn default_min_native_balance() -> Decimal {
    Decimal::new(1, 3)
}

fn default_typical_transfer_gas() -> u64 {
    65_000
}

impl Default for GasSection {
    fn default() -> Self {
        Self {
            buffer_percent: default_buffer_percent(),
            fallback_gas_limit: default_fallback_gas_limit(),
            min_native_balance: default_min_native_balance(),
            typical_transfer_gas: default_typical_transfer_gas(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_interval_secs() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    60
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// JSON-RPC endpoint of the wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSection {
    #[serde(default = "default_provider_url")]
    pub url: String,
    #[serde(default)]
    pub wallet: Option<WalletKind>,
    /// How often accounts and chain id are polled for changes.
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
}

fn default_provider_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_poll_secs() -> u64 {
    2
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            url: default_provider_url(),
            wallet: None,
            poll_secs: default_poll_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateSourceKind {
    /// Keep the `[payment] rate` value.
    #[default]
    Static,
    /// Refresh from the CoinGecko simple price API.
    Coingecko,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateSourceSection {
    #[serde(default)]
    pub kind: RateSourceKind,
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
    /// CoinGecko coin id of the stablecoin.
    #[serde(default = "default_coin_id")]
    pub coin_id: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_refresh_secs() -> u64 {
    300
}

fn default_coin_id() -> String {
    "tether".to_string()
}

fn default_api_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

impl Default for RateSourceSection {
    fn default() -> Self {
        Self {
            kind: RateSourceKind::default(),
            refresh_secs: default_refresh_secs(),
            coin_id: default_coin_id(),
            api_url: default_api_url(),
        }
    }
}

/// One `[[networks]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSection {
    pub chain_id: u64,
    pub name: String,
    pub native_symbol: String,
    pub rpc_url: String,
    pub explorer_url: String,
    pub token_decimals: u32,
    pub min_confirmations: u64,
    /// Stablecoin contract on this chain.
    pub stablecoin_address: String,
    #[serde(default)]
    pub is_testnet: bool,
    #[serde(default)]
    pub gas_level: GasLevel,
}
