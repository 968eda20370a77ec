//! Typed ClickHouse row shapes for C6 (first-seen), C7 (decimals-from-
//! events) and C8 (consolidated price+liquidity) queries.

use chrono::{DateTime, Utc};

/// Row produced by C6's `min(block_time)` union across transfer/swap (or
/// mint, for Solana-style) event tables, per token (spec.md §4.6).
#[derive(Debug, Clone, clickhouse::Row, serde::Deserialize)]
pub struct FirstSeenRow {
    pub token: String,
    #[serde(with = "clickhouse::serde::time::datetime")]
    pub first_seen: time::OffsetDateTime,
}

impl FirstSeenRow {
    pub fn first_seen_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.first_seen.unix_timestamp(), self.first_seen.nanosecond())
            .unwrap_or_default()
    }
}

/// Row produced by C7's `argMax(token_decimals, block_time)` over the EVM
/// transfer-event table (spec.md §4.7). Solana-style has no analogue; C7
/// is RPC-only there.
#[derive(Debug, Clone, clickhouse::Row, serde::Deserialize)]
pub struct EventDecimalsRow {
    pub token: String,
    pub decimals: u8,
}

/// One row of C8's single consolidated aggregation: pool state, first-swap
/// time, cascaded VWAP price, method, and trade counts, per token
/// (spec.md §4.8). Field names mirror the upstream `liquidity_analyzer.py`
/// query's output columns (`latest_*`, `price_raw`, ...).
#[derive(Debug, Clone, clickhouse::Row, serde::Deserialize)]
pub struct ConsolidatedPriceRow {
    pub token: String,
    #[serde(with = "clickhouse::serde::time::datetime::option")]
    pub first_swap: Option<time::OffsetDateTime>,
    pub latest_source: String,
    pub latest_base_coin: String,
    pub latest_quote_coin: String,
    /// Decimal-string raw balances; kept as strings because ClickHouse's
    /// native UInt256 doesn't round-trip losslessly through `f64`, and the
    /// staged chunk table declares all columns as String (spec.md §4.1).
    pub latest_base_balance: String,
    pub latest_quote_balance: String,
    pub price_raw: f64,
    pub price_method: String,
    pub price_reference_type: String,
    pub latest_price_reference: String,
    pub liquidity_usd: f64,
    pub trades_5m: u32,
    pub trades_1h: u32,
    pub trades_24h: u32,
}

impl ConsolidatedPriceRow {
    pub fn first_swap_utc(&self) -> Option<DateTime<Utc>> {
        self.first_swap
            .and_then(|t| DateTime::from_timestamp(t.unix_timestamp(), t.nanosecond()))
    }
}

/// Row produced by C5 token discovery: candidate token address and its
/// qualifying swap count for the window (spec.md §4.5).
#[derive(Debug, Clone, clickhouse::Row, serde::Deserialize)]
pub struct DiscoveredTokenRow {
    pub token: String,
    pub swap_count: u64,
}

/// Row produced by the Solana-style minted/burned aggregation feeding C4's
/// supply product call (spec.md §4.4 "supply... minted-burned from the
/// analytics store for Solana-style").
#[derive(Debug, Clone, clickhouse::Row, serde::Deserialize)]
pub struct MintBurnRow {
    pub mint: String,
    pub total_minted: String,
    pub total_burned: String,
}
