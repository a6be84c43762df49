//! Fiat to token base-unit conversion.
//!
//! All arithmetic happens on integers: a `Decimal` is an integer mantissa
//! over a power-of-ten scale, so `fiat / rate * 10^decimals` can be computed
//! exactly as one 256-bit division. Results are truncated, never rounded up.

use crate::U256;
use rust_decimal::Decimal;

/// Errors produced by unit conversion.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("exchange rate must be positive, got {0}")]
    NonPositiveRate(Decimal),
    #[error("fiat amount must not be negative, got {0}")]
    NegativeAmount(Decimal),
    #[error("token decimals {0} out of range")]
    DecimalsOutOfRange(u32),
    #[error("amount does not fit in 256 bits")]
    Overflow,
}

/// Largest decimals value accepted; `10^77` is the largest power of ten in a `U256`.
const MAX_DECIMALS: u32 = 77;

/// Convert a fiat amount into token base units:
/// `floor(fiat_amount / rate_per_token * 10^token_decimals)`.
pub fn to_token_units(
    fiat_amount: Decimal,
    rate_per_token: Decimal,
    token_decimals: u32,
) -> Result<U256, ConversionError> {
    if rate_per_token <= Decimal::ZERO {
        return Err(ConversionError::NonPositiveRate(rate_per_token));
    }
    if fiat_amount.is_sign_negative() && !fiat_amount.is_zero() {
        return Err(ConversionError::NegativeAmount(fiat_amount));
    }
    if token_decimals > MAX_DECIMALS {
        return Err(ConversionError::DecimalsOutOfRange(token_decimals));
    }

    // fiat = f / 10^sf, rate = r / 10^sr
    // units = f * 10^sr * 10^d / (r * 10^sf)
    let f = U256::from(fiat_amount.mantissa().unsigned_abs());
    let r = U256::from(rate_per_token.mantissa().unsigned_abs());

    let numerator = f
        .checked_mul(pow10(rate_per_token.scale())?)
        .and_then(|n| n.checked_mul(pow10(token_decimals).ok()?))
        .ok_or(ConversionError::Overflow)?;
    let denominator = r
        .checked_mul(pow10(fiat_amount.scale())?)
        .ok_or(ConversionError::Overflow)?;

    Ok(numerator / denominator)
}

/// Convert a human-readable token amount into base units, truncating digits
/// beyond `decimals`.
pub fn parse_units(amount: Decimal, decimals: u32) -> Result<U256, ConversionError> {
    to_token_units(amount, Decimal::ONE, decimals)
}

/// Exact decimal representation of `units` with `decimals` fractional digits,
/// trailing zeros removed (`10000000`, 6 → `"10"`).
pub fn format_units(units: U256, decimals: u32) -> String {
    let (int_part, frac_part) = split_units(units, decimals);
    let frac = frac_part.trim_end_matches('0');
    if frac.is_empty() {
        int_part
    } else {
        format!("{int_part}.{frac}")
    }
}

/// Display form truncated to `places` fractional digits (`"10.00"`).
pub fn display_amount(units: U256, decimals: u32, places: u32) -> String {
    let (int_part, frac_part) = split_units(units, decimals);
    if places == 0 {
        return int_part;
    }
    let mut frac: String = frac_part.chars().take(places as usize).collect();
    while frac.len() < places as usize {
        frac.push('0');
    }
    format!("{int_part}.{frac}")
}

/// `units / 10^decimals` as a `Decimal`, or `None` if it cannot be
/// represented exactly.
pub fn units_to_decimal(units: U256, decimals: u32) -> Option<Decimal> {
    if units.bits() > 96 || decimals > 28 {
        return None;
    }
    Decimal::try_from_i128_with_scale(units.as_u128() as i128, decimals).ok()
}

fn pow10(exp: u32) -> Result<U256, ConversionError> {
    if exp > MAX_DECIMALS {
        return Err(ConversionError::Overflow);
    }
    Ok(U256::exp10(exp as usize))
}

fn split_units(units: U256, decimals: u32) -> (String, String) {
    let digits = units.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return (digits, String::new());
    }
    if digits.len() <= decimals {
        let padded = format!("{}{}", "0".repeat(decimals - digits.len()), digits);
        ("0".to_string(), padded)
    } else {
        let (int_part, frac_part) = digits.split_at(digits.len() - decimals);
        (int_part.to_string(), frac_part.to_string())
    }
}
