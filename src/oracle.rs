//! C3 — Native-price oracle: a narrow, memoized lookup of `reference_token
//! -> usd_price` for NATIVE-kind quotes (spec.md §4.3).
//!
//! The upstream keeps this as a thin Redis `GET` with a hardcoded fallback
//! price baked in on miss (`redis_client.py::get_sol_price`); spec.md §9
//! explicitly forbids carrying that fallback forward, so a miss here is a
//! [`NativePriceUnavailable`] the caller must handle, never a guessed
//! constant.

use std::{collections::HashMap, sync::Arc, time::Duration};

use moka::sync::Cache;

use crate::errors::NativePriceUnavailable;

/// Anything that can answer "what is the USD price of this reference
/// token, right now" for a single key. Implemented by
/// [`StaticNativePriceStore`] here; a live deployment would implement it
/// against Redis the way `redis_client.py` does against its own store.
pub trait NativePriceStore: Send + Sync {
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// A `HashMap`-backed store seeded from [`crate::config::Settings::native_prices`],
/// standing in for the external keyed store spec.md §4.3 describes.
pub struct StaticNativePriceStore {
    prices: HashMap<String, String>,
}

impl StaticNativePriceStore {
    pub fn new(prices: HashMap<String, String>) -> Self {
        Self { prices }
    }
}

impl NativePriceStore for StaticNativePriceStore {
    fn get_raw(&self, key: &str) -> Option<String> {
        self.prices.get(key).cloned()
    }
}

/// Memoizing wrapper around a [`NativePriceStore`]. Short TTL so a price
/// refreshed mid-run is picked up by the next chunk, long enough that a
/// chunk's many tokens sharing one reference asset issue a single lookup.
pub struct NativePriceOracle {
    store: Arc<dyn NativePriceStore>,
    cache: Cache<String, f64>,
}

impl NativePriceOracle {
    pub fn new(store: Arc<dyn NativePriceStore>) -> Self {
        let cache = Cache::builder().max_capacity(1_000).time_to_live(Duration::from_secs(30)).build();
        Self { store, cache }
    }

    /// Returns the USD price for `key` (e.g. `"ethereum:price_usd"` or
    /// `"solana:price_usd"`; Base shares the Ethereum key), or
    /// [`NativePriceUnavailable`] if the store has no value or it doesn't
    /// parse as a finite, non-negative float.
    pub fn get(&self, key: &str) -> Result<f64, NativePriceUnavailable> {
        if let Some(price) = self.cache.get(key) {
            return Ok(price);
        }

        let raw = self.store.get_raw(key).ok_or_else(|| NativePriceUnavailable(key.to_string()))?;
        let price: f64 = raw.parse().map_err(|_| NativePriceUnavailable(key.to_string()))?;
        if !price.is_finite() || price < 0.0 {
            return Err(NativePriceUnavailable(key.to_string()));
        }

        self.cache.insert(key.to_string(), price);
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle_with(entries: &[(&str, &str)]) -> NativePriceOracle {
        let map: HashMap<String, String> = entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        NativePriceOracle::new(Arc::new(StaticNativePriceStore::new(map)))
    }

    #[test]
    fn returns_price_for_known_key() {
        let oracle = oracle_with(&[("ethereum:price_usd", "3200.5")]);
        assert_eq!(oracle.get("ethereum:price_usd").unwrap(), 3200.5);
    }

    #[test]
    fn missing_key_is_unavailable_not_a_fallback_constant() {
        let oracle = oracle_with(&[]);
        assert!(oracle.get("solana:price_usd").is_err());
    }

    #[test]
    fn negative_or_unparseable_price_is_unavailable() {
        let oracle = oracle_with(&[("a", "-1.0"), ("b", "not-a-number")]);
        assert!(oracle.get("a").is_err());
        assert!(oracle.get("b").is_err());
    }

    #[test]
    fn repeated_lookups_are_served_from_cache() {
        let oracle = oracle_with(&[("sol", "190.0")]);
        assert_eq!(oracle.get("sol").unwrap(), 190.0);
        assert_eq!(oracle.get("sol").unwrap(), 190.0);
    }
}
