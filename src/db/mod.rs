//! C1 + C2 transports, combined into one handle the orchestrator carries
//! through a run.

use std::sync::Arc;

use crate::config::Settings;

pub mod clickhouse;
pub mod postgres;

pub use clickhouse::AnalyticsClient;
pub use postgres::PostgresClient;

/// Holds the analytics store (read-mostly, per-chunk queries) and the
/// relational sink (batched upsert at the end of each chunk). Unlike the
/// teacher's `Database`, there is no background ingestor here: this crate
/// reads from ClickHouse and writes to Postgres, it never streams writes
/// into ClickHouse.
#[derive(Clone)]
pub struct Database {
    pub analytics: Arc<AnalyticsClient>,
    pub sink: Arc<PostgresClient>,
}

impl Database {
    pub async fn connect(settings: &Settings) -> anyhow::Result<Self> {
        let analytics = AnalyticsClient::new(settings.clickhouse.clone()).await?;
        let sink = PostgresClient::new(settings.postgres.clone()).await?;
        Ok(Self {
            analytics: Arc::new(analytics),
            sink: Arc::new(sink),
        })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        self.analytics.migrate().await?;
        self.sink.migrate().await?;
        Ok(())
    }

    pub async fn health_check(&self) -> anyhow::Result<()> {
        self.analytics.health_check().await?;
        self.sink.health_check().await?;
        Ok(())
    }
}
