//! Raw `eth_call` batching over JSON-RPC, ported from the upstream's
//! `evm_rpc_client.py` (`EvmRpcClient`). Selector hex constants, the batch
//! request shape, and the two-branch ERC-20 string ABI decode all mirror
//! that file; the Python `ThreadPoolExecutor` fan-out becomes a bounded
//! `tokio::sync::Semaphore` over `futures::stream::buffer_unordered`.

use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use crate::{
    config::RpcSettings,
    errors::RpcError,
    utils::{hex_to_u128_saturating, hex_to_u8},
};

use super::EnrichedToken;

const SELECTOR_DECIMALS: &str = "0x313ce567";
const SELECTOR_SYMBOL: &str = "0x95d89b41";
const SELECTOR_NAME: &str = "0x06fdde03";
const SELECTOR_TOTAL_SUPPLY: &str = "0x18160ddd";

/// `to` + calldata selector, the unit of one `eth_call`.
type Call = (String, &'static str);

#[derive(Deserialize)]
struct RpcResponseItem {
    id: u64,
    result: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

pub struct EvmRpcClient {
    chain: String,
    rpc_url: String,
    http: Client,
    settings: RpcSettings,
}

impl EvmRpcClient {
    pub fn new(chain: impl Into<String>, rpc_url: impl Into<String>, settings: RpcSettings) -> Self {
        Self {
            chain: chain.into(),
            rpc_url: rpc_url.into(),
            http: Client::new(),
            settings,
        }
    }

    async fn post(&self, payload: Value) -> Result<Vec<RpcResponseItem>, RpcError> {
        let resp = tokio::time::timeout(
            Duration::from_secs(self.settings.call_timeout_secs),
            self.http.post(&self.rpc_url).json(&payload).send(),
        )
        .await
        .map_err(|_| RpcError::Timeout(Duration::from_secs(self.settings.call_timeout_secs)))?
        .map_err(|e| RpcError::Transport(format!("{} RPC request failed: {e}", self.chain)))?;

        resp.json::<Vec<RpcResponseItem>>()
            .await
            .map_err(|e| RpcError::MalformedResponse(e.to_string()))
    }

    /// Batches `calls` into groups of `settings.batch_size`, issuing one
    /// JSON-RPC array POST per group and matching results back by `id`.
    pub async fn eth_call_batch(&self, calls: &[Call]) -> HashMap<Call, Option<String>> {
        let mut results = HashMap::with_capacity(calls.len());

        for batch in calls.chunks(self.settings.batch_size.max(1)) {
            let payload: Vec<Value> = batch
                .iter()
                .enumerate()
                .map(|(idx, (to, data))| {
                    json!({
                        "jsonrpc": "2.0",
                        "id": idx,
                        "method": "eth_call",
                        "params": [{"to": to, "data": data}, "latest"],
                    })
                })
                .collect();

            let response = match self.post(json!(payload)).await {
                Ok(items) => items,
                Err(_) => {
                    for call in batch {
                        results.insert(call.clone(), None);
                    }
                    continue;
                }
            };

            let by_id: HashMap<u64, RpcResponseItem> = response.into_iter().map(|item| (item.id, item)).collect();
            for (idx, call) in batch.iter().enumerate() {
                let value = by_id
                    .get(&(idx as u64))
                    .filter(|item| item.error.is_none())
                    .and_then(|item| item.result.clone());
                results.insert(call.clone(), value);
            }
        }

        results
    }

    pub async fn get_token_metadata_batch(&self, tokens: &[String]) -> HashMap<String, EnrichedToken> {
        let tokens_lc: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        let mut calls = Vec::with_capacity(tokens_lc.len() * 3);
        for t in &tokens_lc {
            calls.push((t.clone(), SELECTOR_DECIMALS));
            calls.push((t.clone(), SELECTOR_SYMBOL));
            calls.push((t.clone(), SELECTOR_NAME));
        }

        let raw = self.eth_call_batch(&calls).await;

        tokens_lc
            .into_iter()
            .map(|t| {
                let decimals = raw
                    .get(&(t.clone(), SELECTOR_DECIMALS))
                    .and_then(|v| v.as_deref())
                    .and_then(hex_to_u8);
                let symbol = raw
                    .get(&(t.clone(), SELECTOR_SYMBOL))
                    .and_then(|v| v.as_deref())
                    .and_then(decode_erc20_string);
                let name = raw
                    .get(&(t.clone(), SELECTOR_NAME))
                    .and_then(|v| v.as_deref())
                    .and_then(decode_erc20_string);
                (t, EnrichedToken { decimals, symbol, name, total_supply_raw: None })
            })
            .collect()
    }

    pub async fn get_total_supply_batch(&self, tokens: &[String]) -> HashMap<String, Option<String>> {
        let tokens_lc: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        let calls: Vec<Call> = tokens_lc.iter().map(|t| (t.clone(), SELECTOR_TOTAL_SUPPLY)).collect();
        let raw = self.eth_call_batch(&calls).await;

        tokens_lc
            .into_iter()
            .map(|t| {
                let supply = raw
                    .get(&(t.clone(), SELECTOR_TOTAL_SUPPLY))
                    .and_then(|v| v.as_deref())
                    .and_then(hex_to_u128_saturating)
                    .map(|v| v.to_string());
                (t, supply)
            })
            .collect()
    }

    /// Fans metadata and supply batches out across a bounded worker pool
    /// (`settings.worker_pool_size`) and merges them into one
    /// [`EnrichedToken`] per address.
    pub async fn enrich_tokens_parallel(self: &Arc<Self>, tokens: &[String]) -> HashMap<String, EnrichedToken> {
        if tokens.is_empty() {
            return HashMap::new();
        }

        let tokens_lc: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        let meta_batch_size = (self.settings.batch_size / 3).clamp(10, 100);

        let semaphore = Arc::new(Semaphore::new(self.settings.worker_pool_size.max(1)));

        #[derive(Debug)]
        enum Job {
            Meta(HashMap<String, EnrichedToken>),
            Supply(HashMap<String, Option<String>>),
        }

        let meta_jobs = tokens_lc.chunks(meta_batch_size).map(|batch| {
            let client = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let batch = batch.to_vec();
            async move {
                let _permit = semaphore.acquire_owned().await.ok();
                Job::Meta(client.get_token_metadata_batch(&batch).await)
            }
        });

        let supply_jobs = tokens_lc.chunks(self.settings.batch_size.max(1)).map(|batch| {
            let client = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let batch = batch.to_vec();
            async move {
                let _permit = semaphore.acquire_owned().await.ok();
                Job::Supply(client.get_total_supply_batch(&batch).await)
            }
        });

        let jobs: Vec<_> = meta_jobs.chain(supply_jobs).collect();
        let results: Vec<Job> = stream::iter(jobs).buffer_unordered(self.settings.worker_pool_size.max(1)).collect().await;

        let mut merged: HashMap<String, EnrichedToken> = tokens_lc.iter().map(|t| (t.clone(), EnrichedToken::default())).collect();
        for job in results {
            match job {
                Job::Meta(meta) => {
                    for (token, fetched) in meta {
                        let entry = merged.entry(token).or_default();
                        entry.decimals = fetched.decimals;
                        entry.symbol = fetched.symbol;
                        entry.name = fetched.name;
                    }
                }
                Job::Supply(supply) => {
                    for (token, raw) in supply {
                        merged.entry(token).or_default().total_supply_raw = raw;
                    }
                }
            }
        }
        merged
    }
}

/// Decodes an ABI-encoded ERC-20 `string` return: either a fixed 32-byte
/// null-padded word (non-conformant but common) or the standard dynamic
/// `(offset, length, bytes)` layout.
fn decode_erc20_string(result_hex: &str) -> Option<String> {
    if result_hex.is_empty() || result_hex == "0x" {
        return None;
    }
    let hex_body = result_hex.strip_prefix("0x").unwrap_or(result_hex);
    let raw = hex::decode(hex_body).ok()?;

    if raw.len() == 32 {
        let trimmed: Vec<u8> = raw.into_iter().take_while(|b| *b != 0).collect();
        let s = String::from_utf8_lossy(&trimmed).trim().to_string();
        return if s.is_empty() { None } else { Some(s) };
    }

    if raw.len() < 64 {
        return None;
    }
    let offset = u64::from_be_bytes(raw[24..32].try_into().ok()?) as usize;
    if offset + 32 > raw.len() {
        return None;
    }
    let strlen = u64::from_be_bytes(raw[offset + 24..offset + 32].try_into().ok()?) as usize;
    let start = offset + 32;
    let end = start.checked_add(strlen)?;
    if end > raw.len() {
        return None;
    }
    let s = String::from_utf8_lossy(&raw[start..end]).trim().to_string();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

mod hex {
    pub fn decode(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 != 0 {
            return None;
        }
        (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_fixed_32_byte_string() {
        let mut bytes = b"USDC".to_vec();
        bytes.resize(32, 0);
        let hex = format!("0x{}", bytes.iter().map(|b| format!("{b:02x}")).collect::<String>());
        assert_eq!(decode_erc20_string(&hex), Some("USDC".to_string()));
    }

    #[test]
    fn decodes_dynamic_abi_string() {
        let mut raw = vec![0u8; 32];
        raw[31] = 32; // offset = 32
        let mut len_word = vec![0u8; 32];
        len_word[31] = 11; // length = 11
        raw.extend(len_word);
        let mut data = b"Wrapped SOL".to_vec();
        data.resize(32, 0);
        raw.extend(data);
        let hex = format!("0x{}", raw.iter().map(|b| format!("{b:02x}")).collect::<String>());
        assert_eq!(decode_erc20_string(&hex), Some("Wrapped SOL".to_string()));
    }

    #[test]
    fn empty_result_is_none() {
        assert_eq!(decode_erc20_string("0x"), None);
        assert_eq!(decode_erc20_string(""), None);
    }
}
