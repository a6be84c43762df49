//! Gas policy.

use rust_decimal::Decimal;

/// Limits applied around gas estimation and the native-balance check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasPolicy {
    /// Safety margin added to the estimate, in percent.
    pub buffer_percent: u32,
    /// Gas limit used when estimation fails.
    pub fallback_gas_limit: u64,
    /// Minimum native balance, in whole units, required before submitting.
    pub min_native_balance: Decimal,
    /// Gas of a typical token transfer, used for fee previews.
    pub typical_transfer_gas: u64,
}

impl GasPolicy {
    pub const MIN_BUFFER_PERCENT: u32 = 20;
    pub const MAX_BUFFER_PERCENT: u32 = 30;

    /// `estimate * (100 + buffer) / 100`, rounded down.
    pub fn buffered(&self, estimate: u64) -> u64 {
        let scaled = u128::from(estimate) * u128::from(100 + self.buffer_percent) / 100;
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }

    pub fn buffer_in_range(&self) -> bool {
        (Self::MIN_BUFFER_PERCENT..=Self::MAX_BUFFER_PERCENT).contains(&self.buffer_percent)
    }
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            buffer_percent: 30,
            fallback_gas_limit: 100_000,
            min_native_balance: Decimal::new(1, 3),
            typical_transfer_gas: 65_000,
        }
    }
}
