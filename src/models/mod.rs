//! Core domain types shared across every component (spec.md §3).
//!
//! Dynamic typing and duck typing in the source map to explicit tagged
//! structs here: nulls in input map to `Option::None`, never to sentinel
//! integers (spec.md §9).

mod price;
mod record;

pub use price::{PriceMethod, PriceQuote, ReferenceKind};
pub use record::TokenRecord;

use chrono::{DateTime, Utc};

/// `(token_id, chain)` — unique key of the output table.
///
/// `token_id` is case-insensitive for EVM (stored lowercased hex) and
/// case-sensitive opaque for Solana-style (Base58).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenIdentity {
    pub token_id: String,
    pub chain: String,
}

impl TokenIdentity {
    pub fn new(token_id: impl Into<String>, chain: impl Into<String>) -> Self {
        Self { token_id: token_id.into(), chain: chain.into() }
    }
}

/// `RawSupply / 10^Decimals` as a 64-bit float. Defined only when both are
/// present; see [`crate::pipeline::supply::normalize_supply`].
pub type NormalizedSupply = f64;

/// Per-token metadata fetched via RPC or on-chain event tables. All fields
/// optional; absence is never synthesized into a sentinel value.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub uri: Option<String>,
}

/// One observed pool state (post-swap balances), used for deepest-pool
/// selection in C8.
#[derive(Debug, Clone)]
pub struct PoolObservation {
    pub venue: String,
    pub base_token: String,
    pub quote_token: String,
    pub base_balance_raw: u128,
    pub quote_balance_raw: u128,
    pub block_time: DateTime<Utc>,
}

/// One observed swap, as read out of the consolidated C8 aggregation.
#[derive(Debug, Clone)]
pub struct SwapObservation {
    pub venue: String,
    pub base_token: String,
    pub quote_token: String,
    pub base_amount_raw: u128,
    pub quote_amount_raw: u128,
    pub base_pool_balance_after: u128,
    pub quote_pool_balance_after: u128,
    pub block_time: DateTime<Utc>,
}
