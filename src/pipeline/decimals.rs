//! C7 — Decimals resolver (spec.md §4.7).

use std::collections::HashMap;

use crate::{
    config::ChainKind,
    db::{clickhouse::rows::EventDecimalsRow, AnalyticsClient},
    errors::AnalyticsError,
};

/// EVM: `argMax(token_decimals, block_time)` per token from the
/// transfer-event table. Solana-style has no decimals-bearing event table,
/// so this returns an empty map and the merge step relies on C4/RPC alone.
pub async fn resolve_decimals_from_events(
    analytics: &AnalyticsClient,
    staging_table: &str,
    chain: &str,
    kind: ChainKind,
) -> Result<HashMap<String, u8>, AnalyticsError> {
    if kind == ChainKind::Solana {
        return Ok(HashMap::new());
    }

    let query = format!(
        r#"
        SELECT token_address AS token, argMax(token_decimals, block_time) AS decimals
        FROM transfer_events
        WHERE chain = '{chain}' AND token_address IN (SELECT mint FROM {staging_table})
        GROUP BY token_address
        "#,
        chain = chain.replace('\'', "''"),
        staging_table = staging_table,
    );

    let rows: Vec<EventDecimalsRow> = analytics.execute_dict(&query).await?;
    Ok(rows.into_iter().map(|r| (r.token, r.decimals)).collect())
}

/// `COALESCE(events_decimals, rpc_decimals)` — events win when both are
/// present (spec.md §4.9 step 4c).
pub fn merge_decimals(events: Option<u8>, rpc: Option<u8>) -> Option<u8> {
    events.or(rpc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_decimals_take_priority_over_rpc() {
        assert_eq!(merge_decimals(Some(6), Some(9)), Some(6));
        assert_eq!(merge_decimals(None, Some(9)), Some(9));
        assert_eq!(merge_decimals(None, None), None);
    }
}
