use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use log::{info, warn};
use tokio_postgres::NoTls;

use crate::{config::PostgresSettings, errors::SinkError};

/// Split SQL into statements, respecting dollar-quoted strings.
/// This handles PostgreSQL function definitions that use $$ ... $$ blocks.
fn split_sql_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut in_dollar_quote = false;
    let chars: Vec<char> = sql.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if i + 1 < chars.len() && chars[i] == '$' && chars[i + 1] == '$' {
            in_dollar_quote = !in_dollar_quote;
            i += 2;
            continue;
        }

        if chars[i] == ';' && !in_dollar_quote {
            let stmt = &sql[start..i];
            if !stmt.trim().is_empty() {
                statements.push(stmt);
            }
            start = i + 1;
        }
        i += 1;
    }

    if start < sql.len() {
        let stmt = &sql[start..];
        if !stmt.trim().is_empty() {
            statements.push(stmt);
        }
    }

    statements
}

/// Relational sink connection pool (C2's transport), over `tokio-postgres`
/// via `deadpool-postgres`.
#[derive(Clone)]
pub struct PostgresClient {
    pub pool: Pool,
}

impl PostgresClient {
    pub async fn new(settings: PostgresSettings) -> Result<Self, SinkError> {
        info!("Connecting to PostgreSQL relational sink");

        let mut retries = 0;
        let max_retries = 3;
        let mut last_error: Option<String> = None;

        loop {
            let mut pg_config = tokio_postgres::Config::new();
            pg_config
                .host(&settings.host)
                .port(settings.port)
                .user(&settings.user)
                .password(&settings.password)
                .dbname(&settings.database);

            let mgr_config = ManagerConfig { recycling_method: RecyclingMethod::Fast };
            let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
            let pool = Pool::builder(mgr)
                .max_size(settings.pool_size)
                .build()
                .map_err(|e| SinkError::Connection(e.to_string()))?;

            match pool.get().await {
                Ok(_conn) => {
                    info!("Connected to PostgreSQL relational sink");
                    return Ok(Self { pool });
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                    retries += 1;
                    if retries >= max_retries {
                        break;
                    }
                    let delay = std::time::Duration::from_millis(100 * 2_u64.pow(retries));
                    warn!("PostgreSQL connect attempt {retries}/{max_retries} failed, retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(SinkError::Connection(last_error.unwrap_or_else(|| "unknown error".to_string())))
    }

    pub async fn health_check(&self) -> Result<(), SinkError> {
        let client = self.pool.get().await.map_err(|e| SinkError::Connection(e.to_string()))?;
        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| SinkError::Connection(e.to_string()))?;
        Ok(())
    }

    pub async fn migrate(&self) -> Result<(), SinkError> {
        info!("Running PostgreSQL migrations");
        let client = self.pool.get().await.map_err(|e| SinkError::Connection(e.to_string()))?;

        let schema = tokio::fs::read_to_string("schema/postgres.sql")
            .await
            .map_err(|e| SinkError::Migration(format!("reading schema/postgres.sql: {e}")))?;

        for stmt in split_sql_statements(&schema) {
            let stmt = stmt.trim();
            if stmt.is_empty() {
                continue;
            }
            client.execute(stmt, &[]).await.map_err(|e| SinkError::Migration(e.to_string()))?;
        }

        info!("PostgreSQL migrations completed successfully");
        Ok(())
    }
}
