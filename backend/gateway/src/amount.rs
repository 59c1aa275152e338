//! Conversion of user-entered decimal amounts into integer smallest units.
//!
//! Parsing is exact: the decimal string is split into integer and fraction
//! digits and scaled with `U256` arithmetic, so `"0.1"` with 18 decimals is
//! exactly `10^17`. Fraction digits beyond the token precision are dropped,
//! which is `floor` for non-negative inputs.

use ethers::types::U256;

use crate::errors::{GatewayError, Result};

/// `10^77` is the largest power of ten that fits in a `U256`.
const MAX_DECIMALS: u8 = 77;

/// Convert `amount` into smallest units of a token with `decimals` precision.
///
/// Fails with [`GatewayError::InvalidAmount`] unless the amount is a plain
/// decimal number strictly greater than zero that survives scaling.
pub fn normalize(amount: &str, decimals: u8) -> Result<U256> {
    if decimals > MAX_DECIMALS {
        return Err(GatewayError::Config(format!(
            "Token precision of {decimals} decimals is not supported"
        )));
    }

    let trimmed = amount.trim();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if unsigned.starts_with('-') {
        return Err(GatewayError::InvalidAmount(
            "Amount must be greater than zero".to_string(),
        ));
    }

    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };

    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !is_digits(int_part) || !is_digits(frac_part)
    {
        return Err(GatewayError::InvalidAmount(format!(
            "'{trimmed}' is not a valid amount"
        )));
    }

    let precision = decimals as usize;
    let mut frac_digits: String = frac_part.chars().take(precision).collect();
    while frac_digits.len() < precision {
        frac_digits.push('0');
    }

    let too_large = || GatewayError::InvalidAmount(format!("'{trimmed}' is too large"));
    let whole = if int_part.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(int_part).map_err(|_| too_large())?
    };
    let fraction = if frac_digits.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(&frac_digits).map_err(|_| too_large())?
    };

    let units = whole
        .checked_mul(U256::exp10(precision))
        .and_then(|scaled| scaled.checked_add(fraction))
        .ok_or_else(too_large)?;

    if units.is_zero() {
        let message = if whole.is_zero() && frac_part.bytes().any(|b| b != b'0') {
            "Amount is smaller than the token's smallest unit".to_string()
        } else {
            "Amount must be greater than zero".to_string()
        };
        return Err(GatewayError::InvalidAmount(message));
    }

    Ok(units)
}

/// Whether `amount` is a well-formed decimal equal to zero (`"0"`, `"0.00"`).
pub fn is_zero(amount: &str) -> bool {
    let trimmed = amount.trim();
    let (int_part, frac_part) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    !(int_part.is_empty() && frac_part.is_empty())
        && int_part.bytes().chain(frac_part.bytes()).all(|b| b == b'0')
}

/// Minimum contribution for campaigns that split a goal between a fixed
/// number of donors: `goal / max_donors`, both sides in smallest units.
pub fn minimum_share(goal: U256, max_donors: U256) -> Result<U256> {
    if max_donors.is_zero() {
        return Err(GatewayError::Config(
            "Campaign has no donor limit to split its goal across".to_string(),
        ));
    }
    Ok(goal / max_donors)
}

/// Reject `units` when it is below `minimum`, naming the minimum in human units.
pub fn ensure_at_least(units: U256, minimum: U256, decimals: u8) -> Result<()> {
    if units < minimum {
        return Err(GatewayError::InvalidAmount(format!(
            "Minimum donation for this campaign is {}",
            format_units(minimum, decimals)
        )));
    }
    Ok(())
}

/// Render smallest units as a trimmed human decimal (`10000000`, 6 → `"10"`).
pub fn format_units(units: U256, decimals: u8) -> String {
    let digits = units.to_string();
    let precision = decimals as usize;
    if precision == 0 {
        return digits;
    }

    let padded = format!("{digits:0>width$}", width = precision + 1);
    let (whole, frac) = padded.split_at(padded.len() - precision);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{frac}")
    }
}

/// Serialize `U256` as a base-10 string instead of ethers' hex default.
pub mod dec_string {
    use ethers::types::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        U256::from_dec_str(&raw).map_err(D::Error::custom)
    }
}
