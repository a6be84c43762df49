use crate::TxHash;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// An order total the shopper wants to settle in stablecoin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Order total in the configured fiat currency.
    pub fiat_amount: Decimal,
    pub order_id: String,
}

impl PaymentRequest {
    pub fn new(fiat_amount: Decimal, order_id: impl Into<String>) -> Self {
        Self {
            fiat_amount,
            order_id: order_id.into(),
        }
    }
}

/// How a payment attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// The transfer reached the network's confirmation depth.
    Success,
    /// The user declined in the wallet.
    Rejected,
    InsufficientFunds,
    /// Unsupported chain, failed switch, or the chain changed underneath.
    NetworkError,
    /// The monitor ran out of attempts before the depth was reached.
    Timeout,
    /// Reverted on chain, or an unclassified provider failure.
    Failed,
    /// Monitoring was abandoned by a disconnect or chain change.
    Cancelled,
}

impl PaymentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PaymentOutcome::Success)
    }
}

/// The single explicit result every payment request ends with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    pub outcome: PaymentOutcome,
    pub order_id: String,
    /// `0x` prefixed transaction hash, once one was issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Exact token amount, e.g. `"10"` for ten USDT.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PaymentResult {
    pub fn new(order_id: impl Into<String>, outcome: PaymentOutcome) -> Self {
        Self {
            outcome,
            order_id: order_id.into(),
            tx_hash: None,
            token_amount: None,
            explorer_link: None,
            chain_id: None,
            network: None,
            block_number: None,
            confirmations: None,
            message: None,
        }
    }

    /// A result carrying only an outcome and a human-readable reason.
    pub fn failed(
        order_id: impl Into<String>,
        outcome: PaymentOutcome,
        message: impl Into<String>,
    ) -> Self {
        Self::new(order_id, outcome).with_message(message)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_transaction(
        mut self,
        tx_hash: TxHash,
        chain_id: u64,
        network: impl Into<String>,
        explorer_link: impl Into<String>,
    ) -> Self {
        self.tx_hash = Some(format_tx_hash(&tx_hash));
        self.chain_id = Some(chain_id);
        self.network = Some(network.into());
        self.explorer_link = Some(explorer_link.into());
        self
    }

    pub fn with_token_amount(mut self, amount: impl Into<String>) -> Self {
        self.token_amount = Some(amount.into());
        self
    }

    pub fn with_confirmations(mut self, block_number: Option<u64>, confirmations: u64) -> Self {
        self.block_number = block_number;
        self.confirmations = Some(confirmations);
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Full `0x`-prefixed lowercase hex of a hash.
pub fn format_tx_hash(hash: &TxHash) -> String {
    format!("{hash:#x}")
}

/// Parse a transaction hash, accepting only `0x` followed by 64 hex digits.
pub fn parse_tx_hash(input: &str) -> Option<TxHash> {
    let hex_part = input.strip_prefix("0x")?;
    if hex_part.len() != 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    TxHash::from_str(hex_part).ok()
}
