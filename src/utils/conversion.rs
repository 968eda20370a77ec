//! Type conversion and formatting utilities.
//!
//! Functions for converting between raw on-chain integer units (hex strings,
//! u128) and normalized f64/USD values, with BigDecimal used wherever plain
//! f64 division would lose precision.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use once_cell::sync::Lazy;
use std::str::FromStr;

// ============================================
// Hex Decoding (raw JSON-RPC results)
// ============================================

/// Parse a `0x`-prefixed hex integer into a u128, saturating on overflow.
///
/// `eth_call` returns `uint256` results as 32-byte hex words; real-world
/// token supplies and decimals fit comfortably in u128, so values that
/// would overflow are clamped rather than rejected (see DESIGN.md OQ-1).
pub fn hex_to_u128_saturating(hex_str: &str) -> Option<u128> {
    let trimmed = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    if trimmed.is_empty() {
        return Some(0);
    }
    let big = BigInt::parse_bytes(trimmed.as_bytes(), 16)?;
    let (sign, bytes) = big.to_bytes_be();
    if sign == num_bigint::Sign::Minus {
        return None;
    }
    if bytes.len() > 16 {
        return Some(u128::MAX);
    }
    let mut buf = [0u8; 16];
    buf[16 - bytes.len()..].copy_from_slice(&bytes);
    Some(u128::from_be_bytes(buf))
}

/// Decode a `0x`-prefixed hex word as a `uint8`, range-checked.
pub fn hex_to_u8(hex_str: &str) -> Option<u8> {
    let value = hex_to_u128_saturating(hex_str)?;
    if value > u8::MAX as u128 { None } else { Some(value as u8) }
}

// ============================================
// U128 / decimal-string conversions
// ============================================

/// Convert a u128 raw integer amount to f64 with decimal-place adjustment.
///
/// Uses BigDecimal to avoid precision loss that occurs casting u128 values
/// larger than 2^53 directly to f64.
pub fn reserve_to_f64(reserve: u128, decimals: u8) -> f64 {
    let big_value = BigDecimal::from(reserve);
    let adjusted = if decimals == 0 { big_value } else { big_value / big_pow10(decimals) };
    adjusted.to_f64().unwrap_or(0.0)
}

/// Parse a decimal-string amount (as returned by `argMax`/`sum` over String
/// columns staged for the chunk) to f64 with decimal adjustment.
pub fn str_to_f64_with_decimals(value_str: &str, decimals: u8) -> Option<f64> {
    let big_value = BigDecimal::from_str(value_str).ok()?;
    let adjusted = if decimals == 0 { big_value } else { big_value / big_pow10(decimals) };
    let result = adjusted.to_f64()?;
    if result.is_finite() && result >= 0.0 { Some(result) } else { None }
}

// ============================================
// BigInt Arithmetic (minted - burned, saturating at zero)
// ============================================

/// Add two large numbers represented as decimal strings.
pub fn bigint_add(current: &str, delta: &str) -> String {
    let current_big = match BigInt::from_str(current) {
        Ok(v) => v,
        Err(_) => return current.to_string(),
    };
    let delta_big = match BigInt::from_str(delta) {
        Ok(v) => v,
        Err(_) => return current.to_string(),
    };
    let result = current_big + delta_big;
    clamp_nonnegative(result)
}

/// Subtract `delta` from `current`, saturating at `"0"` on underflow.
///
/// This is the Scenario-E semantics: `total_burned > total_minted` must
/// never produce a negative raw supply.
pub fn bigint_sub(current: &str, delta: &str) -> String {
    let current_big = match BigInt::from_str(current) {
        Ok(v) => v,
        Err(_) => return current.to_string(),
    };
    let delta_big = match BigInt::from_str(delta) {
        Ok(v) => v,
        Err(_) => return current.to_string(),
    };
    let result = current_big - delta_big;
    clamp_nonnegative(result)
}

fn clamp_nonnegative(value: BigInt) -> String {
    if value < BigInt::from(0) { "0".to_string() } else { value.to_string() }
}

// ============================================
// Internal Helpers
// ============================================

static POW10_CACHE: Lazy<[BigDecimal; 25]> =
    Lazy::new(|| std::array::from_fn(|i| BigDecimal::from(BigInt::from(10u32).pow(i as u32))));

/// Compute 10^exp as BigDecimal.
pub(crate) fn big_pow10(exp: u8) -> BigDecimal {
    if (exp as usize) < POW10_CACHE.len() {
        POW10_CACHE[exp as usize].clone()
    } else {
        BigDecimal::from(BigInt::from(10u32).pow(exp as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_decodes_uint256() {
        assert_eq!(hex_to_u128_saturating("0x0"), Some(0));
        assert_eq!(hex_to_u128_saturating("0x"), Some(0));
        assert_eq!(hex_to_u128_saturating("0x64"), Some(100));
    }

    #[test]
    fn uint8_range_check() {
        assert_eq!(hex_to_u8("0x06"), Some(6));
        assert_eq!(hex_to_u8("0xff"), Some(255));
        assert_eq!(hex_to_u8("0x100"), None);
    }

    #[test]
    fn bigint_sub_saturates_at_zero() {
        assert_eq!(bigint_sub("100", "40"), "60");
        assert_eq!(bigint_sub("40", "100"), "0");
    }

    #[test]
    fn reserve_to_f64_adjusts_decimals() {
        let v = reserve_to_f64(1_000_000_000_000_000_000u128, 18);
        assert!((v - 1.0).abs() < 1e-9);
    }
}
