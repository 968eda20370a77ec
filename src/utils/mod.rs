//! Shared conversion helpers.
//!
//! - [`conversion`] - raw-integer/hex <-> f64/BigInt conversions

mod conversion;

/// The EVM zero address, used to recognize mint/burn transfers and exclude
/// the native-wrapper token itself from discovery (spec.md §4.5).
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

pub use conversion::{bigint_add, bigint_sub, hex_to_u128_saturating, hex_to_u8, reserve_to_f64, str_to_f64_with_decimals};
