//! C6 — First-seen resolver (spec.md §4.6).

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{
    config::ChainKind,
    db::{clickhouse::rows::FirstSeenRow, AnalyticsClient},
    errors::AnalyticsError,
};

/// `min(block_time)` across transfer/swap (or mint, for Solana-style)
/// event tables, restricted to the staged chunk. The consolidated C8 query
/// also returns a first-swap time; callers combine the two with `min`
/// (whichever resolver actually has a value) into the final
/// `first_tx_date`.
pub async fn resolve_first_seen(
    analytics: &AnalyticsClient,
    staging_table: &str,
    chain: &str,
    kind: ChainKind,
) -> Result<HashMap<String, DateTime<Utc>>, AnalyticsError> {
    let chain_escaped = chain.replace('\'', "''");

    // `mints(mint, amount, block_time)` (Solana-style, spec.md §6) carries
    // no `chain`/`token_address` columns; EVM's `transfer_events` does.
    // The two pipelines therefore need distinct first-event subqueries.
    let mint_leg = match kind {
        ChainKind::Evm => format!(
            "SELECT token_address AS token, block_time FROM transfer_events
             WHERE chain = '{chain_escaped}' AND token_address IN (SELECT mint FROM {staging_table})"
        ),
        ChainKind::Solana => {
            format!("SELECT mint AS token, block_time FROM mints WHERE mint IN (SELECT mint FROM {staging_table})")
        }
    };

    let query = format!(
        r#"
        SELECT token, min(block_time) AS first_seen FROM (
            {mint_leg}
            UNION ALL
            SELECT base_coin AS token, block_time
            FROM swap_events
            WHERE chain = '{chain_escaped}' AND base_coin IN (SELECT mint FROM {staging_table})
            UNION ALL
            SELECT quote_coin AS token, block_time
            FROM swap_events
            WHERE chain = '{chain_escaped}' AND quote_coin IN (SELECT mint FROM {staging_table})
        )
        GROUP BY token
        "#
    );

    let rows: Vec<FirstSeenRow> = analytics.execute_dict(&query).await?;
    Ok(rows.into_iter().map(|r| (r.token.clone(), r.first_seen_utc())).collect())
}
