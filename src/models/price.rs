//! Reference-kind, price-method, and price-quote types for the cascading
//! VWAP selection described in spec.md §4.8.

use serde::{Deserialize, Serialize};

/// The kind of asset a swap was priced against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceKind {
    /// The chain's wrapped native asset (wSOL, WETH, WBNB, WMATIC, ...).
    Native,
    /// A configured stablecoin for the chain.
    Stable,
    /// Neither native nor a configured stablecoin — unpriceable this run.
    Other,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ReferenceKind::Native => "NATIVE",
            ReferenceKind::Stable => "STABLE",
            ReferenceKind::Other => "OTHER",
        })
    }
}

/// Which rung of the cascade (spec.md §4.8 "Cascading selection") produced
/// a token's price this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceMethod {
    NativeVwap5m,
    NativeVwap1h,
    NativeVwap24h,
    NativeLast,
    StableVwap5m,
    StableVwap1h,
    StableVwap24h,
    StableLast,
    None,
}

impl std::fmt::Display for PriceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PriceMethod::NativeVwap5m => "NATIVE_VWAP_5M",
            PriceMethod::NativeVwap1h => "NATIVE_VWAP_1H",
            PriceMethod::NativeVwap24h => "NATIVE_VWAP_24H",
            PriceMethod::NativeLast => "NATIVE_LAST",
            PriceMethod::StableVwap5m => "STABLE_VWAP_5M",
            PriceMethod::StableVwap1h => "STABLE_VWAP_1H",
            PriceMethod::StableVwap24h => "STABLE_VWAP_24H",
            PriceMethod::StableLast => "STABLE_LAST",
            PriceMethod::None => "NONE",
        })
    }
}

/// The cascade's output for one token: a raw price in reference units plus
/// the provenance needed to normalize it to USD (spec.md §3 `PriceQuote`).
#[derive(Debug, Clone)]
pub struct PriceQuote {
    pub raw_price: f64,
    pub method: PriceMethod,
    pub reference_kind: ReferenceKind,
    pub reference_token: String,
    pub trades_5m: u32,
    pub trades_1h: u32,
    pub trades_24h: u32,
}

impl PriceQuote {
    pub fn none() -> Self {
        Self {
            raw_price: 0.0,
            method: PriceMethod::None,
            reference_kind: ReferenceKind::Other,
            reference_token: String::new(),
            trades_5m: 0,
            trades_1h: 0,
            trades_24h: 0,
        }
    }
}
