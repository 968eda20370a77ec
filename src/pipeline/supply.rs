//! Supply normalization and the Solana-style minted-burned aggregation
//! (spec.md §4.4 "supply... minted-burned from the analytics store for
//! Solana-style", §3 invariant 3).

use std::collections::HashMap;

use crate::{
    db::{clickhouse::rows::MintBurnRow, AnalyticsClient},
    errors::AnalyticsError,
    utils::{bigint_sub, str_to_f64_with_decimals},
};

/// `supply_raw / 10^decimals`, or `0` when either is unknown (invariant 3).
pub fn normalize_supply(supply_raw: Option<&str>, decimals: Option<u8>) -> f64 {
    match (supply_raw, decimals) {
        (Some(raw), Some(d)) => str_to_f64_with_decimals(raw, d).unwrap_or(0.0),
        _ => 0.0,
    }
}

/// For Solana-style, raw supply is `total_minted - total_burned`, clamped
/// at zero (Scenario E): there is no ERC-20-style `totalSupply()` call, so
/// this is computed from the analytics store rather than via RPC.
pub async fn resolve_solana_supply_raw(analytics: &AnalyticsClient, staging_table: &str) -> Result<HashMap<String, String>, AnalyticsError> {
    let query = format!(
        r#"
        SELECT
            mint,
            toString(sum(minted)) AS total_minted,
            toString(sum(burned)) AS total_burned
        FROM (
            SELECT mint, amount AS minted, 0 AS burned FROM mints WHERE mint IN (SELECT mint FROM {staging_table})
            UNION ALL
            SELECT mint, 0 AS minted, amount AS burned FROM burns WHERE mint IN (SELECT mint FROM {staging_table})
        )
        GROUP BY mint
        "#,
        staging_table = staging_table,
    );

    let rows: Vec<MintBurnRow> = analytics.execute_dict(&query).await?;
    Ok(rows.into_iter().map(|r| (r.mint, bigint_sub(&r.total_minted, &r.total_burned))).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_supply_requires_both_values() {
        assert_eq!(normalize_supply(None, Some(6)), 0.0);
        assert_eq!(normalize_supply(Some("1000000"), None), 0.0);
        assert_eq!(normalize_supply(Some("1000000"), Some(6)), 1.0);
    }
}
