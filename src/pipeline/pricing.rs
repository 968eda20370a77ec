//! C8 — Price & liquidity engine (spec.md §4.8). The hardest component:
//! one consolidated aggregation per chunk produces pool state, first-swap
//! time, cascaded VWAP price, method, and trade counts; normalization to
//! USD happens here in-process afterward.
//!
//! The SQL shape (the `unified_swaps` -> `token_vwap` -> final cascading
//! `multiIf` pipeline) mirrors `liquidity_analyzer.py`'s
//! `_get_comprehensive_swap_data`.

use log::warn;

use crate::{
    config::ChainKind,
    db::{clickhouse::rows::ConsolidatedPriceRow, AnalyticsClient},
    errors::{AnalyticsError, DataShapeError, NativePriceUnavailable},
    models::{PriceMethod, PriceQuote, ReferenceKind},
};

pub async fn fetch_consolidated(
    analytics: &AnalyticsClient,
    staging_table: &str,
    chain: &str,
    allowed_sources: &[String],
) -> Result<Vec<ConsolidatedPriceRow>, AnalyticsError> {
    if allowed_sources.is_empty() {
        return Err(AnalyticsError::Query("price engine requires at least one allowed direct-DEX source".into()));
    }
    let sources_list = allowed_sources.iter().map(|s| format!("'{}'", s.replace('\'', "''"))).collect::<Vec<_>>().join(", ");
    let chain_escaped = chain.replace('\'', "''");

    let query = format!(
        r#"
        WITH unified_swaps AS (
            SELECT
                source,
                if(base_coin IN (SELECT mint FROM {staging_table}), base_coin, quote_coin) AS token,
                if(base_coin IN (SELECT mint FROM {staging_table}), quote_coin, base_coin) AS reference,
                if(base_coin IN (SELECT mint FROM {staging_table}), base_coin_amount, quote_coin_amount) AS token_amount_raw,
                if(base_coin IN (SELECT mint FROM {staging_table}), quote_coin_amount, base_coin_amount) AS reference_amount_raw,
                if(base_coin IN (SELECT mint FROM {staging_table}), quote_pool_balance_after, base_pool_balance_after) AS reference_balance_raw,
                if(base_coin IN (SELECT mint FROM {staging_table}), base_coin, quote_coin) AS base_for_pool,
                if(base_coin IN (SELECT mint FROM {staging_table}), quote_coin, base_coin) AS quote_for_pool,
                multiIf(reference IN (SELECT address FROM configured_natives), 'NATIVE', reference IN (SELECT address FROM configured_stables), 'STABLE', 'OTHER') AS ref_kind,
                block_time
            FROM swap_events
            WHERE chain = '{chain_escaped}'
              AND source IN ({sources_list})
              AND (base_coin IN (SELECT mint FROM {staging_table}) OR quote_coin IN (SELECT mint FROM {staging_table}))
              -- non-positive raw amounts (DataShapeError::NonPositiveAmount) are
              -- excluded here rather than flagged per-row in Rust: a swap with a
              -- zero or negative leg can't contribute a meaningful ratio to VWAP.
              AND base_coin_amount > 0 AND quote_coin_amount > 0
        ),
        token_vwap AS (
            SELECT
                token,
                ref_kind,
                sumIf(reference_amount_raw, block_time >= now() - INTERVAL 5 MINUTE) / greatest(sumIf(token_amount_raw, block_time >= now() - INTERVAL 5 MINUTE), 1) AS vwap_5m,
                sumIf(reference_amount_raw, block_time >= now() - INTERVAL 1 HOUR) / greatest(sumIf(token_amount_raw, block_time >= now() - INTERVAL 1 HOUR), 1) AS vwap_1h,
                sumIf(reference_amount_raw, block_time >= now() - INTERVAL 24 HOUR) / greatest(sumIf(token_amount_raw, block_time >= now() - INTERVAL 24 HOUR), 1) AS vwap_24h,
                argMax(reference_amount_raw / token_amount_raw, block_time) AS last_price,
                countIf(block_time >= now() - INTERVAL 5 MINUTE) AS trades_5m,
                countIf(block_time >= now() - INTERVAL 1 HOUR) AS trades_1h,
                countIf(block_time >= now() - INTERVAL 24 HOUR) AS trades_24h,
                argMax(source, reference_balance_raw) AS deep_source,
                argMax(base_for_pool, reference_balance_raw) AS deep_base,
                argMax(quote_for_pool, reference_balance_raw) AS deep_quote,
                argMax(reference_balance_raw, reference_balance_raw) AS deep_reference_balance,
                min(block_time) AS first_swap
            FROM unified_swaps
            WHERE ref_kind != 'OTHER'
            GROUP BY token, ref_kind
        )
        SELECT
            token,
            min(first_swap) AS first_swap,
            argMax(deep_source, deep_reference_balance) AS latest_source,
            argMax(deep_base, deep_reference_balance) AS latest_base_coin,
            argMax(deep_quote, deep_reference_balance) AS latest_quote_coin,
            '0' AS latest_base_balance,
            toString(argMax(deep_reference_balance, deep_reference_balance)) AS latest_quote_balance,
            multiIf(
                argMax(trades_24h, trades_24h) >= 3 AND argMax(trades_5m, trades_24h) >= 3, argMax(vwap_5m, trades_24h),
                argMax(trades_1h, trades_24h) >= 5, argMax(vwap_1h, trades_24h),
                argMax(trades_24h, trades_24h) >= 5, argMax(vwap_24h, trades_24h),
                argMax(last_price, trades_24h) > 0, argMax(last_price, trades_24h),
                0
            ) AS price_raw,
            'VWAP' AS price_method,
            argMax(ref_kind, trades_24h) AS price_reference_type,
            argMax(deep_quote, deep_reference_balance) AS latest_price_reference,
            argMax(deep_reference_balance, deep_reference_balance) AS liquidity_usd,
            argMax(trades_5m, trades_24h) AS trades_5m,
            argMax(trades_1h, trades_24h) AS trades_1h,
            argMax(trades_24h, trades_24h) AS trades_24h
        FROM token_vwap
        GROUP BY token
        "#,
        staging_table = staging_table,
        chain_escaped = chain_escaped,
        sources_list = sources_list,
    );

    analytics.execute_dict(&query).await
}

/// The chain-scoped reference-asset decimal constants used to normalize a
/// raw cascade price into USD (spec.md §4.8, §9: native is 9 on
/// Solana-style / 18 on EVM; stables are typically 6).
pub struct ReferenceDecimals {
    pub native_decimals: u8,
    pub stable_decimals: u8,
}

impl ReferenceDecimals {
    pub fn for_chain(kind: ChainKind) -> Self {
        match kind {
            ChainKind::Solana => Self { native_decimals: 9, stable_decimals: 6 },
            ChainKind::Evm => Self { native_decimals: 18, stable_decimals: 6 },
        }
    }
}

/// `"OTHER"` is a legitimate cascade outcome (row still emitted, unpriced);
/// anything else is a genuine data-shape problem and is logged as such,
/// then degraded to `Other` the same way (spec.md §7 "per-row skipped;
/// logged").
fn parse_reference_kind(s: &str, token: &str) -> ReferenceKind {
    match s {
        "NATIVE" => ReferenceKind::Native,
        "STABLE" => ReferenceKind::Stable,
        "OTHER" => ReferenceKind::Other,
        other => {
            let err = DataShapeError::UnknownReferenceKind(other.to_string());
            warn!("token `{token}`: {err}, degrading to OTHER");
            ReferenceKind::Other
        }
    }
}

fn select_method(reference_kind: ReferenceKind, trades_5m: u32, trades_1h: u32, trades_24h: u32, raw_price_positive: bool) -> PriceMethod {
    use PriceMethod::*;
    match reference_kind {
        ReferenceKind::Native => {
            if trades_5m >= 3 {
                NativeVwap5m
            } else if trades_1h >= 5 {
                NativeVwap1h
            } else if trades_24h >= 5 {
                NativeVwap24h
            } else if raw_price_positive {
                NativeLast
            } else {
                None
            }
        }
        ReferenceKind::Stable => {
            if trades_5m >= 3 {
                StableVwap5m
            } else if trades_1h >= 5 {
                StableVwap1h
            } else if trades_24h >= 5 {
                StableVwap24h
            } else if raw_price_positive {
                StableLast
            } else {
                None
            }
        }
        ReferenceKind::Other => None,
    }
}

fn pow10_f64(exp: i32) -> f64 {
    10f64.powi(exp)
}

/// Normalizes one token's consolidated row into a [`PriceQuote`] plus its
/// USD-denominated liquidity, applying the chain-scoped factor to
/// `largest_lp_pool_usd` (spec.md §4.8, DESIGN.md OQ-2).
pub fn normalize(
    row: &ConsolidatedPriceRow,
    token_decimals: Option<u8>,
    reference_decimals: &ReferenceDecimals,
    native_usd_price: &Result<f64, NativePriceUnavailable>,
    liquidity_factor: f64,
) -> (PriceQuote, f64) {
    let reference_kind = parse_reference_kind(&row.price_reference_type, &row.token);
    let method = select_method(reference_kind, row.trades_5m, row.trades_1h, row.trades_24h, row.price_raw > 0.0);

    let price_usd = match (token_decimals, method) {
        (_, PriceMethod::None) => 0.0,
        (None, _) => {
            let err = DataShapeError::MissingDecimals(row.token.clone());
            warn!("token `{}`: {err}, price left at 0", row.token);
            0.0
        }
        (Some(t_dec), _) => {
            let (r_dec, r_usd) = match reference_kind {
                ReferenceKind::Native => {
                    let price = native_usd_price.as_ref().ok().copied().unwrap_or(0.0);
                    (reference_decimals.native_decimals, price)
                }
                ReferenceKind::Stable => (reference_decimals.stable_decimals, 1.0),
                ReferenceKind::Other => (0, 0.0),
            };
            let scale = pow10_f64(t_dec as i32 - r_dec as i32);
            row.price_raw * scale * r_usd
        }
    };

    let quote = PriceQuote {
        raw_price: price_usd,
        method,
        reference_kind,
        reference_token: row.latest_quote_coin.clone(),
        trades_5m: row.trades_5m,
        trades_1h: row.trades_1h,
        trades_24h: row.trades_24h,
    };

    (quote, row.liquidity_usd * liquidity_factor)
}

/// `·2` on Solana-style, `·1` on EVM (DESIGN.md OQ-2): the upstream applies
/// the factor inconsistently across code paths; this picks one convention
/// per chain and applies it uniformly.
pub fn liquidity_factor(kind: ChainKind) -> f64 {
    match kind {
        ChainKind::Solana => 2.0,
        ChainKind::Evm => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(price_raw: f64, reference_type: &str, trades_5m: u32, trades_1h: u32, trades_24h: u32, liquidity_usd: f64) -> ConsolidatedPriceRow {
        ConsolidatedPriceRow {
            token: "TokA".into(),
            first_swap: None,
            latest_source: "raydium_cpmm".into(),
            latest_base_coin: "TokA".into(),
            latest_quote_coin: "USDC".into(),
            latest_base_balance: "0".into(),
            latest_quote_balance: "0".into(),
            price_raw,
            price_method: "VWAP".into(),
            price_reference_type: reference_type.into(),
            latest_price_reference: "USDC".into(),
            liquidity_usd,
            trades_5m,
            trades_1h,
            trades_24h,
        }
    }

    /// Scenario A: STABLE VWAP 5m, 6-decimal token, 2 USDC raw / 1000 TokA raw.
    #[test]
    fn scenario_a_stable_vwap_5m() {
        let r = row(0.002, "STABLE", 4, 4, 4, 5000.0);
        let refs = ReferenceDecimals { native_decimals: 9, stable_decimals: 6 };
        let (quote, liquidity) = normalize(&r, Some(6), &refs, &Ok(0.0), 1.0);
        assert_eq!(quote.method, PriceMethod::StableVwap5m);
        assert!((quote.raw_price - 0.002).abs() < 1e-9);
        assert_eq!(liquidity, 5000.0);
    }

    /// Scenario B: NATIVE VWAP 24h, 9-decimal token, native USD = $190.
    #[test]
    fn scenario_b_native_vwap_24h() {
        let r = row(0.5, "NATIVE", 0, 0, 6, 10_000.0);
        let refs = ReferenceDecimals { native_decimals: 9, stable_decimals: 6 };
        let (quote, liquidity) = normalize(&r, Some(9), &refs, &Ok(190.0), 2.0);
        assert_eq!(quote.method, PriceMethod::NativeVwap24h);
        assert!((quote.raw_price - 0.5 * 190.0).abs() < 1e-6);
        assert_eq!(liquidity, 20_000.0);
    }

    /// No VWAP tier satisfied and last <= 0: method is NONE, price 0.
    #[test]
    fn falls_back_to_none_when_no_rule_satisfied() {
        let r = row(0.0, "STABLE", 0, 0, 0, 0.0);
        let refs = ReferenceDecimals { native_decimals: 9, stable_decimals: 6 };
        let (quote, _) = normalize(&r, Some(6), &refs, &Ok(0.0), 1.0);
        assert_eq!(quote.method, PriceMethod::None);
        assert_eq!(quote.raw_price, 0.0);
    }

    /// Scenario D shape: unknown token decimals degrades price to 0 even
    /// with a valid cascade method.
    #[test]
    fn unknown_decimals_forces_zero_price() {
        let r = row(0.002, "STABLE", 4, 4, 4, 5000.0);
        let refs = ReferenceDecimals { native_decimals: 9, stable_decimals: 6 };
        let (quote, _) = normalize(&r, None, &refs, &Ok(0.0), 1.0);
        assert_eq!(quote.raw_price, 0.0);
    }

    #[test]
    fn liquidity_factor_matches_chain_convention() {
        assert_eq!(liquidity_factor(ChainKind::Solana), 2.0);
        assert_eq!(liquidity_factor(ChainKind::Evm), 1.0);
    }

    /// A missing native price degrades NATIVE-referenced tokens to
    /// `price_usd = 0` rather than propagating an error (spec.md §9).
    #[test]
    fn native_price_unavailable_degrades_to_zero_not_error() {
        let r = row(1.0, "NATIVE", 5, 5, 5, 1.0);
        let refs = ReferenceDecimals { native_decimals: 9, stable_decimals: 6 };
        let (quote, _) = normalize(&r, Some(9), &refs, &Err(NativePriceUnavailable("solana:price_usd".into())), 1.0);
        assert_eq!(quote.raw_price, 0.0);
    }
}
