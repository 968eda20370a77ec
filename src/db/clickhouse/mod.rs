pub mod client;
pub mod rows;

pub use client::AnalyticsClient;
