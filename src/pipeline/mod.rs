//! C5-C8: the per-chunk analytics pipeline. Each module issues one
//! consolidated query against the analytics store, scoped to the tokens
//! currently staged in the temp namespace (spec.md §4.5-§4.8).

pub mod decimals;
pub mod discovery;
pub mod first_seen;
pub mod pricing;
pub mod supply;
