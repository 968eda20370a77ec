//! C4 — RPC enricher: batched metadata/supply fetch over raw JSON-RPC
//! (EVM-style) or Solana's metadata-PDA + `getAccountInfo` convention
//! (Solana-style), bounded by a worker pool (spec.md §4.4).

pub mod evm;
pub mod solana;

/// Result of enriching one token: metadata fields are independently
/// optional (a partial success still carries whatever resolved), supply is
/// the raw on-chain integer as a decimal string to avoid precision loss
/// through JSON/JS-number-shaped transports.
#[derive(Debug, Clone, Default)]
pub struct EnrichedToken {
    pub decimals: Option<u8>,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub total_supply_raw: Option<String>,
}
