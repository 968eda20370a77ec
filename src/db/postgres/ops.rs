//! C2 — Relational sink: batched upsert with column-preservation policy
//! (spec.md §4.2).

use tokio_postgres::types::ToSql;

use crate::{errors::SinkError, models::TokenRecord};

use super::client::PostgresClient;

const COLS_PER_ROW: usize = 12;
/// <=1000 rows per statement (spec.md §4.2); at 12 columns this stays
/// comfortably under Postgres's bound parameter limit even at the cap.
const BATCH_SIZE: usize = 1000;

fn sanitize_string(s: &str) -> String {
    s.replace('\0', "")
}

impl PostgresClient {
    /// The only write operation C2 exposes. Batches of <=1000 rows, each
    /// batch committed as its own transaction so a failing batch doesn't
    /// roll back rows already written by earlier ones (spec.md §5).
    pub async fn upsert_batch(&self, rows: &[TokenRecord], view_source: &str) -> Result<usize, SinkError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut total = 0usize;
        for chunk in rows.chunks(BATCH_SIZE) {
            total += self.upsert_chunk(chunk, view_source).await?;
        }
        Ok(total)
    }

    async fn upsert_chunk(&self, chunk: &[TokenRecord], view_source: &str) -> Result<usize, SinkError> {
        let mut client = self.pool.get().await.map_err(|e| SinkError::Connection(e.to_string()))?;
        let tx = client.transaction().await.map_err(|e| SinkError::Upsert(e.to_string()))?;

        let values_clauses: Vec<String> = (0..chunk.len())
            .map(|i| {
                let start = i * COLS_PER_ROW + 1;
                let placeholders: Vec<String> = (start..start + COLS_PER_ROW).map(|n| format!("${n}")).collect();
                format!("({})", placeholders.join(", "))
            })
            .collect();

        let query = format!(
            r#"
            INSERT INTO unverified_tokens (
                contract_address, chain, decimals, symbol, name,
                price_usd, market_cap_usd, supply, largest_lp_pool_usd,
                first_tx_date, view_source, updated_at
            ) VALUES {}
            ON CONFLICT (contract_address, chain) DO UPDATE SET
                decimals = COALESCE(unverified_tokens.decimals, EXCLUDED.decimals),
                symbol = EXCLUDED.symbol,
                name = EXCLUDED.name,
                price_usd = EXCLUDED.price_usd,
                market_cap_usd = EXCLUDED.market_cap_usd,
                supply = EXCLUDED.supply,
                largest_lp_pool_usd = EXCLUDED.largest_lp_pool_usd,
                first_tx_date = COALESCE(unverified_tokens.first_tx_date, EXCLUDED.first_tx_date),
                view_source = EXCLUDED.view_source,
                updated_at = EXCLUDED.updated_at
            "#,
            values_clauses.join(", ")
        );

        let contract_addresses: Vec<String> = chunk.iter().map(|r| sanitize_string(&r.token_id)).collect();
        let symbols: Vec<Option<String>> = chunk.iter().map(|r| r.symbol.as_deref().map(sanitize_string)).collect();
        let names: Vec<Option<String>> = chunk.iter().map(|r| r.name.as_deref().map(sanitize_string)).collect();
        let decimals: Vec<Option<i32>> = chunk.iter().map(|r| r.decimals.map(|d| d as i32)).collect();

        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(chunk.len() * COLS_PER_ROW);
        for (i, row) in chunk.iter().enumerate() {
            params.push(&contract_addresses[i]);
            params.push(&row.chain);
            params.push(&decimals[i]);
            params.push(&symbols[i]);
            params.push(&names[i]);
            params.push(&row.price_usd);
            params.push(&row.market_cap_usd);
            params.push(&row.supply);
            params.push(&row.largest_lp_pool_usd);
            params.push(&row.first_tx_date);
            params.push(&view_source);
            params.push(&row.updated_at);
        }

        tx.execute(&query, &params).await.map_err(|e| SinkError::Upsert(e.to_string()))?;
        tx.commit().await.map_err(|e| SinkError::Upsert(e.to_string()))?;
        Ok(chunk.len())
    }

    /// Creates the output table on first use (spec.md §6). `migrate()` runs
    /// `schema/postgres.sql`, which contains the same DDL; this is a
    /// convenience for callers (and tests) that skip the migration step.
    pub async fn ensure_unverified_tokens_table(&self) -> Result<(), SinkError> {
        let client = self.pool.get().await.map_err(|e| SinkError::Connection(e.to_string()))?;
        client
            .batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS unverified_tokens (
                    id BIGSERIAL PRIMARY KEY,
                    contract_address VARCHAR NOT NULL,
                    chain VARCHAR NOT NULL,
                    decimals INT NULL,
                    symbol VARCHAR NULL,
                    name VARCHAR NULL,
                    price_usd DOUBLE PRECISION NOT NULL DEFAULT 0,
                    market_cap_usd DOUBLE PRECISION NOT NULL DEFAULT 0,
                    supply DOUBLE PRECISION NOT NULL DEFAULT 0,
                    largest_lp_pool_usd DOUBLE PRECISION NOT NULL DEFAULT 0,
                    first_tx_date TIMESTAMPTZ NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    view_source VARCHAR NULL,
                    UNIQUE (contract_address, chain)
                );
                CREATE INDEX IF NOT EXISTS idx_unverified_tokens_contract_address ON unverified_tokens (contract_address);
                CREATE INDEX IF NOT EXISTS idx_unverified_tokens_chain ON unverified_tokens (chain);
                CREATE INDEX IF NOT EXISTS idx_unverified_tokens_updated_at ON unverified_tokens (updated_at DESC);
                "#,
            )
            .await
            .map_err(|e| SinkError::Migration(e.to_string()))?;
        Ok(())
    }

    /// Reads current `(decimals, first_tx_date)` for a set of keys. Exposed
    /// for tests asserting the column-preservation policy; the upsert
    /// itself performs the equivalent read-then-COALESCE atomically inside
    /// `DO UPDATE SET`.
    pub async fn get_preserved_columns(
        &self,
        keys: &[(String, String)],
    ) -> Result<Vec<(String, String, Option<i32>, Option<chrono::DateTime<chrono::Utc>>)>, SinkError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.pool.get().await.map_err(|e| SinkError::Connection(e.to_string()))?;
        let addresses: Vec<&str> = keys.iter().map(|(a, _)| a.as_str()).collect();
        let chains: Vec<&str> = keys.iter().map(|(_, c)| c.as_str()).collect();

        let rows = client
            .query(
                "SELECT contract_address, chain, decimals, first_tx_date FROM unverified_tokens
                 WHERE (contract_address, chain) IN (SELECT unnest($1::text[]), unnest($2::text[]))",
                &[&addresses, &chains],
            )
            .await
            .map_err(|e| SinkError::Upsert(e.to_string()))?;

        Ok(rows.iter().map(|r| (r.get(0), r.get(1), r.get(2), r.get(3))).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_null_bytes() {
        assert_eq!(sanitize_string("foo\0bar"), "foobar");
        assert_eq!(sanitize_string("clean"), "clean");
    }
}
