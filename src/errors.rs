//! Typed error taxonomy, one concrete `E` per component (spec.md §7, §9).
//!
//! `thiserror` is used here rather than the ad-hoc `anyhow`-everywhere style
//! of the upstream scaffolder, because the component boundaries in this
//! crate must expose a concrete error type for the orchestrator to
//! pattern-match on (see DESIGN.md). `anyhow::Result` is still used at the
//! orchestrator/binary boundary, matching the upstream's own top-level
//! error handling.

use thiserror::Error;

/// Fatal at startup: missing required configuration (RPC URL, analytics
/// host, ...).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),
    #[error("missing configuration for chain `{0}`")]
    MissingChain(String),
}

/// Transport failure, query syntax error, or a locked session that could
/// not be recovered after one retry.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("failed to connect to analytics store: {0}")]
    Connection(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("session locked and retry failed: {0}")]
    SessionLocked(String),
}

/// The native-price feed had no value for the requested key. Recoverable:
/// callers degrade NATIVE-priced tokens to `price_usd = 0`.
#[derive(Debug, Error)]
#[error("native price unavailable for key `{0}`")]
pub struct NativePriceUnavailable(pub String);

/// Per-batch recoverable RPC failure. Fields default to null; the run
/// continues.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("RPC transport error: {0}")]
    Transport(String),
    #[error("RPC batch timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("malformed RPC response: {0}")]
    MalformedResponse(String),
}

/// Batch-level failure writing to the relational sink. Fails the current
/// batch; the orchestrator aborts the run so the caller can retry
/// idempotently.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to connect to relational sink: {0}")]
    Connection(String),
    #[error("upsert batch failed: {0}")]
    Upsert(String),
    #[error("migration failed: {0}")]
    Migration(String),
}

/// Per-row data problems: non-positive raw amounts, missing decimals where
/// required, unknown reference kind. Rows with this error are skipped and
/// logged, never fatal to the chunk.
#[derive(Debug, Error)]
pub enum DataShapeError {
    #[error("non-positive raw amount for token `{0}`")]
    NonPositiveAmount(String),
    #[error("missing required decimals for token `{0}`")]
    MissingDecimals(String),
    #[error("unknown reference kind `{0}`")]
    UnknownReferenceKind(String),
}
