//! C9 — Orchestrator: the chunked run that ties C1-C8 together
//! (spec.md §4.9, §5).
//!
//! Sequential over chunks (bounds memory, preserves last-write-wins
//! dedup ordering); within a chunk, the analytics zone (C6/C7/C8) and the
//! RPC enrichment zone (C4) run concurrently, each on its own session.

use std::{collections::HashMap, sync::Arc};

use anyhow::Context;
use chrono::Utc;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{ChainKind, RunSpec, Settings},
    db::Database,
    models::{PriceMethod, TokenRecord},
    oracle::NativePriceOracle,
    pipeline::{decimals, discovery, first_seen, pricing, supply},
    rpc::{evm::EvmRpcClient, solana::SolanaRpcClient, EnrichedToken},
};

/// Renders a per-method price-coverage tally as `{METHOD: n, ...}`
/// (spec.md §7 "user-visible failure" reporting).
fn format_method_counts(counts: &HashMap<PriceMethod, usize>) -> String {
    let mut entries: Vec<(PriceMethod, usize)> = counts.iter().map(|(m, n)| (*m, *n)).collect();
    entries.sort_by_key(|(m, _)| m.to_string());
    let body = entries.iter().map(|(m, n)| format!("{m}: {n}")).collect::<Vec<_>>().join(", ");
    format!("{{{body}}}")
}

/// Maps a configured `evm_chains` key to the native-price-oracle chain
/// name (spec.md §4.3: `solana:price_usd`, `ethereum:price_usd`,
/// `bnb:price_usd`, `matic:price_usd`; Base shares the ETH key since it
/// settles in the same native asset).
fn price_chain_name(chain: &str) -> &str {
    match chain {
        "base" => "ethereum",
        other => other,
    }
}

/// Per-chain static context resolved once per run: the configured quote
/// assets C5 excludes candidates against, the allowlisted direct-DEX
/// sources C8 restricts to, and the C3 lookup key for the chain's native
/// asset USD price.
struct ChainContext {
    quote_assets: Vec<String>,
    allowed_sources: Vec<String>,
    native_price_key: String,
}

pub struct Orchestrator {
    db: Database,
    settings: Settings,
    native_oracle: Arc<NativePriceOracle>,
}

impl Orchestrator {
    pub fn new(db: Database, settings: Settings, native_oracle: Arc<NativePriceOracle>) -> Self {
        Self { db, settings, native_oracle }
    }

    fn chain_context(&self, spec: &RunSpec) -> anyhow::Result<ChainContext> {
        let allowed_sources = self
            .settings
            .allowed_sources
            .get(&spec.chain)
            .cloned()
            .or_else(|| (spec.kind == ChainKind::Solana).then(|| self.settings.allowed_sources.get("solana").cloned()).flatten())
            .unwrap_or_default();

        match spec.kind {
            ChainKind::Evm => {
                let chain = self
                    .settings
                    .evm_chains
                    .get(&spec.chain)
                    .with_context(|| format!("no evm_chains configuration for chain `{}`", spec.chain))?;
                let mut quote_assets = vec![chain.wrapped_native.clone()];
                quote_assets.extend(chain.stablecoins.iter().cloned());
                Ok(ChainContext {
                    quote_assets,
                    allowed_sources,
                    native_price_key: format!("{}:price_usd", price_chain_name(&spec.chain)),
                })
            }
            ChainKind::Solana => {
                let solana = self.settings.solana.as_ref().context("no solana configuration present")?;
                let mut quote_assets = vec![solana.wrapped_native.clone()];
                quote_assets.extend(solana.stablecoins.iter().cloned());
                Ok(ChainContext {
                    quote_assets,
                    allowed_sources,
                    native_price_key: "solana:price_usd".to_string(),
                })
            }
        }
    }

    /// Runs the whole chunked pipeline and returns the number of rows
    /// written (or that would be written, for a dry run).
    pub async fn run(&self, spec: RunSpec, cancellation_token: CancellationToken) -> anyhow::Result<usize> {
        self.db.analytics.ensure_temp_namespace().await.context("ensure temp namespace")?;

        let context = self.chain_context(&spec)?;

        let discovery_params = discovery::DiscoveryParams {
            chain: &spec.chain,
            window_start: spec.window_start,
            window_end: spec.window_end,
            min_swaps: spec.min_swaps,
            quote_assets: &context.quote_assets,
            kind: spec.kind,
        };

        let tokens = discovery::discover_tokens(&self.db.analytics, &discovery_params).await.context("C5 token discovery")?;
        if tokens.is_empty() {
            info!("no tokens discovered for chain `{}` in the requested window", spec.chain);
            return Ok(0);
        }
        info!("discovered {} candidate tokens for chain `{}`", tokens.len(), spec.chain);

        let mut all_records: Vec<TokenRecord> = Vec::with_capacity(tokens.len());
        let mut method_counts: HashMap<PriceMethod, usize> = HashMap::new();

        for (chunk_index, chunk) in tokens.chunks(spec.chunk_size.max(1)).enumerate() {
            if cancellation_token.is_cancelled() {
                info!("cancellation requested, stopping before chunk {chunk_index}");
                break;
            }

            match self.process_chunk(&spec, &context, chunk, chunk_index).await {
                Ok((mut records, chunk_counts)) => {
                    info!("chunk {chunk_index}: merged {} records", records.len());
                    for (method, n) in chunk_counts {
                        *method_counts.entry(method).or_insert(0) += n;
                    }
                    all_records.append(&mut records);
                }
                Err(e) => {
                    warn!("chunk {chunk_index} aborted during staged/queried/enriched phase, skipping: {e:?}");
                }
            }
        }

        // Last-write-wins dedup on (token_id, chain): later chunks (and,
        // within a chunk, later rows) override earlier ones.
        let mut by_key: HashMap<(String, String), TokenRecord> = HashMap::with_capacity(all_records.len());
        for record in all_records {
            by_key.insert((record.token_id.clone(), record.chain.clone()), record);
        }
        let deduped: Vec<TokenRecord> = by_key.into_values().collect();

        let coverage = format_method_counts(&method_counts);

        if !spec.write {
            info!("dry run: {} rows would be upserted for chain `{}`, price coverage {coverage}", deduped.len(), spec.chain);
            return Ok(deduped.len());
        }

        // merged -> appended: a failure here aborts the whole run so the
        // caller can retry the entire invocation idempotently.
        let written = self
            .db
            .sink
            .upsert_batch(&deduped, &spec.view_source)
            .await
            .context("C2 upsert failed, aborting run")?;
        info!("upserted {written} rows for chain `{}`, price coverage {coverage}", spec.chain);
        Ok(written)
    }

    async fn process_chunk(
        &self,
        spec: &RunSpec,
        context: &ChainContext,
        chunk: &[String],
        chunk_index: usize,
    ) -> anyhow::Result<(Vec<TokenRecord>, HashMap<PriceMethod, usize>)> {
        let table_name = format!("chunk_{}_{chunk_index}", spec.chain.replace(['.', '-'], "_"));
        let qualified = format!("{}.{}", self.db.analytics.temp_database(), table_name);

        // staged
        self.db.analytics.stage_chunk(&table_name, chunk).await.context("stage chunk (C1)")?;

        // queried + enriched, concurrently: the analytics zone (C6/C7/C8,
        // each its own ClickHouse session) and the RPC enrichment zone (C4,
        // its own worker pool) are independent.
        let (first_seen_result, decimals_result, consolidated_result, enriched) = tokio::join!(
            first_seen::resolve_first_seen(&self.db.analytics, &qualified, &spec.chain, spec.kind),
            decimals::resolve_decimals_from_events(&self.db.analytics, &qualified, &spec.chain, spec.kind),
            pricing::fetch_consolidated(&self.db.analytics, &qualified, &spec.chain, &context.allowed_sources),
            self.enrich_tokens(spec, chunk),
        );

        let first_seen_map = first_seen_result.context("C6 first-seen resolution")?;
        let events_decimals_map = decimals_result.context("C7 decimals-from-events resolution")?;
        let consolidated_rows = consolidated_result.context("C8 consolidated price query")?;

        let solana_supply_map = match spec.kind {
            ChainKind::Solana => supply::resolve_solana_supply_raw(&self.db.analytics, &qualified).await.context("Solana mint/burn supply resolution")?,
            ChainKind::Evm => HashMap::new(),
        };

        // merged
        let native_price = self.native_oracle.get(&context.native_price_key);
        let reference_decimals = pricing::ReferenceDecimals::for_chain(spec.kind);
        let liquidity_factor = pricing::liquidity_factor(spec.kind);
        let now = Utc::now();

        let consolidated_by_token: HashMap<String, _> = consolidated_rows.into_iter().map(|r| (r.token.clone(), r)).collect();

        let mut records = Vec::with_capacity(chunk.len());
        let mut method_counts: HashMap<PriceMethod, usize> = HashMap::new();
        for token in chunk {
            let enriched_token = enriched.get(token);
            let decimals = decimals::merge_decimals(events_decimals_map.get(token).copied(), enriched_token.and_then(|e| e.decimals));

            let supply_raw: Option<String> = match spec.kind {
                ChainKind::Evm => enriched_token.and_then(|e| e.total_supply_raw.clone()),
                ChainKind::Solana => solana_supply_map.get(token).cloned(),
            };
            let normalized_supply = supply::normalize_supply(supply_raw.as_deref(), decimals);

            let (price_quote, liquidity_usd) = match consolidated_by_token.get(token) {
                Some(row) => pricing::normalize(row, decimals, &reference_decimals, &native_price, liquidity_factor),
                None => (crate::models::PriceQuote::none(), 0.0),
            };
            *method_counts.entry(price_quote.method).or_insert(0) += 1;

            let first_tx_date = match (first_seen_map.get(token), consolidated_by_token.get(token).and_then(|r| r.first_swap_utc())) {
                (Some(a), Some(b)) => Some((*a).min(b)),
                (Some(a), None) => Some(*a),
                (None, Some(b)) => Some(b),
                (None, None) => None,
            };

            let record = TokenRecord {
                token_id: token.clone(),
                chain: spec.chain.clone(),
                decimals,
                symbol: enriched_token.and_then(|e| e.symbol.clone()),
                name: enriched_token.and_then(|e| e.name.clone()),
                price_usd: price_quote.raw_price,
                market_cap_usd: 0.0,
                supply: normalized_supply,
                largest_lp_pool_usd: liquidity_usd.max(0.0),
                first_tx_date,
                view_source: spec.view_source.clone(),
                updated_at: now,
            }
            .with_market_cap();

            records.push(record);
        }

        Ok((records, method_counts))
    }

    async fn enrich_tokens(&self, spec: &RunSpec, chunk: &[String]) -> HashMap<String, EnrichedToken> {
        match spec.kind {
            ChainKind::Evm => {
                let Some(chain_settings) = self.settings.evm_chains.get(&spec.chain) else {
                    return HashMap::new();
                };
                let client = Arc::new(EvmRpcClient::new(spec.chain.clone(), chain_settings.rpc_url.clone(), self.settings.rpc.clone()));
                client.enrich_tokens_parallel(chunk).await
            }
            ChainKind::Solana => {
                let Some(solana_settings) = self.settings.solana.as_ref() else {
                    return HashMap::new();
                };
                let client = Arc::new(SolanaRpcClient::new(solana_settings.rpc_url.clone(), self.settings.rpc.clone()));
                client
                    .enrich_tokens_parallel(&solana_settings.metaplex_program_id, chunk, self.settings.rpc.worker_pool_size)
                    .await
            }
        }
    }
}
