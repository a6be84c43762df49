//! Payment configuration.

use crate::Address;

/// Who gets paid and in which fiat currency order totals are quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfig {
    /// Merchant address receiving the stablecoin transfer.
    pub recipient: Address,
    /// ISO code of the order currency, e.g. `VND`.
    pub fiat_currency: String,
}

impl PaymentConfig {
    pub fn new(recipient: Address, fiat_currency: impl Into<String>) -> Self {
        Self {
            recipient,
            fiat_currency: fiat_currency.into().to_ascii_uppercase(),
        }
    }
}
