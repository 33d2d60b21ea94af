//! Token amount types and unit conversion.

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Token amount in base units (e.g. wei-like units of an 18-decimal token).
pub type Amount = u128;

/// Decimals of the payment token.
pub const TOKEN_DECIMALS: u32 = 18;

/// Errors converting between human-readable and base-unit amounts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitsError {
    /// Not a decimal number.
    #[error("Invalid amount: {0}")]
    Invalid(String),

    /// Negative amounts cannot be expressed in base units.
    #[error("Negative amount")]
    Negative,

    /// More fractional digits than the token supports.
    #[error("Too many decimal places: {scale} > {decimals}")]
    TooPrecise { scale: u32, decimals: u32 },

    /// Result does not fit in an `Amount`.
    #[error("Amount overflows base units")]
    Overflow,
}

fn unit(decimals: u32) -> Result<Amount, UnitsError> {
    10u128.checked_pow(decimals).ok_or(UnitsError::Overflow)
}

/// Parse a human-readable amount ("100", "0.5") into base units.
pub fn parse_units(value: &str, decimals: u32) -> Result<Amount, UnitsError> {
    let parsed =
        Decimal::from_str(value.trim()).map_err(|e| UnitsError::Invalid(e.to_string()))?;

    if parsed.is_sign_negative() && !parsed.is_zero() {
        return Err(UnitsError::Negative);
    }

    let parsed = parsed.normalize();
    let scale = parsed.scale();
    if scale > decimals {
        return Err(UnitsError::TooPrecise { scale, decimals });
    }

    let mantissa: Amount = parsed.mantissa().unsigned_abs();
    mantissa
        .checked_mul(unit(decimals - scale)?)
        .ok_or(UnitsError::Overflow)
}

/// Format base units as a human-readable amount, always keeping one
/// fractional digit ("100.0", "0.25").
pub fn format_units(amount: Amount, decimals: u32) -> String {
    let Ok(unit) = unit(decimals) else {
        return amount.to_string();
    };
    if decimals == 0 {
        return amount.to_string();
    }

    let whole = amount / unit;
    let fraction = amount % unit;
    let digits = format!("{:0width$}", fraction, width = decimals as usize);
    let trimmed = digits.trim_end_matches('0');

    if trimmed.is_empty() {
        format!("{}.0", whole)
    } else {
        format!("{}.{}", whole, trimmed)
    }
}
