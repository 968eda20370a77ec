//! Typed configuration loaded from `config.yaml` (layered with environment
//! variables via the `config` crate), plus the per-invocation run
//! specification (chain, window, activity threshold, chunking) that the
//! orchestrator consumes.

use std::collections::HashMap;

use config::{Config, File};
use serde::Deserialize;

use crate::errors::ConfigError;

/// ClickHouse connection settings for the analytics client (C1).
#[derive(Debug, Deserialize, Clone)]
pub struct ClickHouseSettings {
    pub url: String,
    pub user: String,
    pub password: String,
    /// Database holding the source event tables (`swap_events`, ...).
    pub database: String,
    /// Temporary namespace used for per-chunk staging relations.
    #[serde(default = "default_temp_database")]
    pub temp_database: String,
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    #[serde(default = "default_max_execution_time_secs")]
    pub max_execution_time_secs: u64,
}

fn default_temp_database() -> String {
    "token_metrics_processing".to_string()
}

fn default_session_timeout_secs() -> u64 {
    900
}

fn default_max_execution_time_secs() -> u64 {
    900
}

/// PostgreSQL connection settings for the relational sink (C2).
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// A single EVM-family chain's RPC endpoint and numeric id.
#[derive(Debug, Deserialize, Clone)]
pub struct EvmChainSettings {
    pub chain_id: u64,
    pub rpc_url: String,
    /// Wrapped native token address (lowercased hex), e.g. WETH/WBNB/WMATIC.
    pub wrapped_native: String,
    /// Configured stablecoin addresses (lowercased hex) for this chain.
    #[serde(default)]
    pub stablecoins: Vec<String>,
}

/// Solana-style RPC settings (single namespace).
#[derive(Debug, Deserialize, Clone)]
pub struct SolanaSettings {
    pub rpc_url: String,
    pub metaplex_program_id: String,
    pub wrapped_native: String,
    #[serde(default)]
    pub stablecoins: Vec<String>,
}

/// RPC enricher (C4) concurrency and batching knobs.
#[derive(Debug, Deserialize, Clone)]
pub struct RpcSettings {
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_worker_pool_size() -> usize {
    16
}

fn default_batch_size() -> usize {
    100
}

fn default_call_timeout_secs() -> u64 {
    10
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            batch_size: default_batch_size(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

/// Root application configuration, loaded once at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub clickhouse: ClickHouseSettings,
    pub postgres: PostgresSettings,
    #[serde(default)]
    pub rpc: RpcSettings,
    #[serde(default)]
    pub evm_chains: HashMap<String, EvmChainSettings>,
    pub solana: Option<SolanaSettings>,
    /// Native-price-oracle seed values (e.g. `"ethereum:price_usd" ->
    /// "3200.50"`, `"solana:price_usd" -> "190.00"`; Base shares the
    /// Ethereum key), standing in for the external keyed store described
    /// in C3.
    #[serde(default)]
    pub native_prices: HashMap<String, String>,
    /// Allowlisted direct-DEX `source` values per chain, used by C8 to
    /// exclude aggregator/routing venues from the consolidated query.
    #[serde(default)]
    pub allowed_sources: HashMap<String, Vec<String>>,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let built = Config::builder()
            .add_source(File::with_name("config"))
            .add_source(config::Environment::with_prefix("TOKEN_METRICS").separator("__"))
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        built
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))
    }
}

/// Which of the two parallel pipelines a run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ChainKind {
    Solana,
    Evm,
}

/// The per-invocation run specification (spec.md §6 "Run specification").
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub kind: ChainKind,
    /// Selects the chain namespace and configured quote assets. For EVM
    /// this is a key into `Settings::evm_chains`; for Solana it is ignored
    /// (single namespace).
    pub chain: String,
    pub window_start: chrono::DateTime<chrono::Utc>,
    pub window_end: chrono::DateTime<chrono::Utc>,
    pub min_swaps: u32,
    pub view_source: String,
    pub chunk_size: usize,
    pub write: bool,
}

impl RunSpec {
    pub fn default_chunk_size(kind: ChainKind) -> usize {
        match kind {
            ChainKind::Evm => 200_000,
            ChainKind::Solana => 1_000_000,
        }
    }
}
