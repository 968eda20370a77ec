//! C5 — Token discovery: the working set for one run (spec.md §4.5).

use chrono::{DateTime, Utc};

use crate::{
    config::ChainKind,
    db::{clickhouse::rows::DiscoveredTokenRow, AnalyticsClient},
    errors::AnalyticsError,
};

pub struct DiscoveryParams<'a> {
    pub chain: &'a str,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub min_swaps: u32,
    pub quote_assets: &'a [String],
    pub kind: ChainKind,
}

/// Single aggregate query: exactly-one-side-is-a-quote-asset swaps, grouped
/// by the other side, filtered to `count >= min_swaps`, ordered
/// descending. Returns addresses lowercased for EVM, verbatim for
/// Solana-style (spec.md §4.5).
pub async fn discover_tokens(analytics: &AnalyticsClient, params: &DiscoveryParams<'_>) -> Result<Vec<String>, AnalyticsError> {
    if params.quote_assets.is_empty() {
        return Err(AnalyticsError::Query("token discovery requires at least one configured quote asset".into()));
    }

    let quote_list = quote_in_list(params.quote_assets);
    let candidate_expr = match params.kind {
        ChainKind::Evm => "lower(if(base_coin IN (%QUOTES%), quote_coin, base_coin))",
        ChainKind::Solana => "if(base_coin IN (%QUOTES%), quote_coin, base_coin)",
    }
    .replace("%QUOTES%", &quote_list);

    let zero_address_clause = match params.kind {
        ChainKind::Evm => "candidate != '0x0000000000000000000000000000000000000000'",
        ChainKind::Solana => "candidate != ''",
    };

    let query = format!(
        r#"
        SELECT candidate AS token, count() AS swap_count
        FROM (
            SELECT {candidate_expr} AS candidate
            FROM swap_events
            WHERE chain = '{chain}'
              AND block_time >= '{start}'
              AND block_time < '{end}'
              AND ((base_coin IN ({quotes}) AND quote_coin NOT IN ({quotes}))
                OR (quote_coin IN ({quotes}) AND base_coin NOT IN ({quotes})))
        )
        WHERE {zero_address_clause} AND candidate NOT IN ({quotes})
        GROUP BY candidate
        HAVING swap_count >= {min_swaps}
        ORDER BY swap_count DESC
        "#,
        candidate_expr = candidate_expr,
        chain = escape(params.chain),
        start = params.window_start.to_rfc3339(),
        end = params.window_end.to_rfc3339(),
        quotes = quote_list,
        zero_address_clause = zero_address_clause,
        min_swaps = params.min_swaps,
    );

    let rows: Vec<DiscoveredTokenRow> = analytics.execute_dict(&query).await?;
    Ok(rows.into_iter().map(|r| r.token).collect())
}

fn quote_in_list(quotes: &[String]) -> String {
    quotes.iter().map(|q| format!("'{}'", escape(q))).collect::<Vec<_>>().join(", ")
}

fn escape(s: &str) -> String {
    s.replace('\'', "''")
}
