//! Conversions between `U256` and `BigUint`, plus the few big-integer
//! operations the swap math needs beyond 256 bits.

use crate::error::BotError;
use ethers::types::U256;
use ethers::utils::{format_units, parse_units};
use num_bigint::BigUint;

pub fn to_biguint(value: U256) -> BigUint {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    BigUint::from_bytes_be(&bytes)
}

pub fn to_u256(value: &BigUint) -> Result<U256, BotError> {
    let bytes = value.to_bytes_be();
    if bytes.len() > 32 {
        return Err(BotError::Arithmetic("value exceeds 256 bits"));
    }
    Ok(U256::from_big_endian(&bytes))
}

/// Floor of the integer square root.
pub fn isqrt(value: &BigUint) -> BigUint {
    value.sqrt()
}

/// Scale a human-readable amount into integer base units (e.g. 0.1 -> wei).
pub fn to_wei(amount: f64, decimals: u32) -> Result<U256, BotError> {
    let rendered = format!("{amount:.18}");
    let parsed = parse_units(rendered, decimals)
        .map_err(|e| BotError::Config(format!("cannot scale {amount}: {e}")))?;
    Ok(parsed.into())
}

/// Render wei as a native-denominated decimal string for log output.
pub fn format_native(value: U256) -> String {
    format_units(value, 18).unwrap_or_else(|_| value.to_string())
}
