use chrono::{DateTime, Utc};

/// The output row upserted by C2 (spec.md §3, §6).
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub token_id: String,
    pub chain: String,
    pub decimals: Option<u8>,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub price_usd: f64,
    pub market_cap_usd: f64,
    pub supply: f64,
    pub largest_lp_pool_usd: f64,
    pub first_tx_date: Option<DateTime<Utc>>,
    pub view_source: String,
    pub updated_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Invariant 4: market cap is always derived, never stored independently.
    pub fn with_market_cap(mut self) -> Self {
        self.market_cap_usd = self.price_usd * self.supply;
        self
    }
}
