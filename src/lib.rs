pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod oracle;
pub mod pipeline;
pub mod rpc;
pub mod utils;
pub mod worker;

pub use config::Settings;
pub use db::Database;
pub use oracle::NativePriceOracle;
pub use worker::Orchestrator;
