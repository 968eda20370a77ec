//! C1 — Analytics client: typed query issuance, session retry, and
//! temp-relation management (spec.md §4.1).

use std::time::Duration;

use clickhouse::Client;
use log::{info, warn};
use serde::de::DeserializeOwned;

use crate::{config::ClickHouseSettings, errors::AnalyticsError};

/// ClickHouse error code for "session is locked by another query",
/// returned when two queries share a session identifier.
const SESSION_IS_LOCKED_CODE: &str = "373";

pub struct AnalyticsClient {
    client: Client,
    temp_database: String,
    session_timeout_secs: u64,
    max_execution_time_secs: u64,
}

impl AnalyticsClient {
    pub async fn new(settings: ClickHouseSettings) -> Result<Self, AnalyticsError> {
        info!("Connecting to ClickHouse analytics store");

        let client = Client::default()
            .with_url(settings.url.clone())
            .with_user(settings.user.clone())
            .with_password(settings.password.clone())
            .with_database(settings.database.clone());

        let mut retries = 0u32;
        let max_retries = 3;
        loop {
            match client.query("SELECT 1").fetch_one::<u8>().await {
                Ok(_) => {
                    info!("Connected to ClickHouse analytics store");
                    break;
                }
                Err(e) => {
                    retries += 1;
                    if retries >= max_retries {
                        return Err(AnalyticsError::Connection(e.to_string()));
                    }
                    let delay = Duration::from_millis(100 * 2u64.pow(retries));
                    warn!("ClickHouse connect attempt {retries}/{max_retries} failed: {e}, retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Ok(Self {
            client,
            temp_database: settings.temp_database,
            session_timeout_secs: settings.session_timeout_secs,
            max_execution_time_secs: settings.max_execution_time_secs,
        })
    }

    /// Returns a clone of the underlying client, for use by components that
    /// issue their own queries on an independent session (C6/C7/C8 run
    /// concurrently, each with its own fresh session id).
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn temp_database(&self) -> &str {
        &self.temp_database
    }

    /// Builds a client scoped to a fresh session identifier with the
    /// 15-minute execution cap, per the retry contract in spec.md §4.1.
    fn scoped_client(&self) -> Client {
        let session_id = uuid_v4_like();
        self.client
            .clone()
            .with_option("session_id", session_id)
            .with_option("session_timeout", self.session_timeout_secs.to_string())
            .with_option("max_execution_time", self.max_execution_time_secs.to_string())
    }

    /// `execute(query) -> ()`, for DDL/DML statements.
    pub async fn execute(&self, query: &str) -> Result<(), AnalyticsError> {
        self.execute_retrying(query).await
    }

    /// `execute_dict(query) -> rows`, typed row fetch with column names
    /// bound by `T`'s `clickhouse::Row` derive.
    pub async fn execute_dict<T>(&self, query: &str) -> Result<Vec<T>, AnalyticsError>
    where
        T: clickhouse::Row + DeserializeOwned,
    {
        let scoped = self.scoped_client();
        match scoped.query(query).fetch_all::<T>().await {
            Ok(rows) => Ok(rows),
            Err(e) if is_session_locked(&e) => {
                warn!("ClickHouse session locked, reconnecting and retrying once");
                let retried = self.scoped_client();
                retried
                    .query(query)
                    .fetch_all::<T>()
                    .await
                    .map_err(|e| AnalyticsError::SessionLocked(e.to_string()))
            }
            Err(e) => Err(AnalyticsError::Query(e.to_string())),
        }
    }

    async fn execute_retrying(&self, query: &str) -> Result<(), AnalyticsError> {
        let scoped = self.scoped_client();
        match scoped.query(query).execute().await {
            Ok(()) => Ok(()),
            Err(e) if is_session_locked(&e) => {
                warn!("ClickHouse session locked, reconnecting and retrying once");
                let retried = self.scoped_client();
                retried
                    .query(query)
                    .execute()
                    .await
                    .map_err(|e| AnalyticsError::SessionLocked(e.to_string()))
            }
            Err(e) => Err(AnalyticsError::Query(e.to_string())),
        }
    }

    /// `CREATE DATABASE IF NOT EXISTS` for the temp namespace, called once
    /// per run by the orchestrator before any chunk is staged.
    pub async fn ensure_temp_namespace(&self) -> Result<(), AnalyticsError> {
        let stmt = format!("CREATE DATABASE IF NOT EXISTS {}", self.temp_database);
        self.execute(&stmt).await
    }

    /// `stage_chunk`: drop-if-exists, create with an in-memory engine hint
    /// and all-String columns, then bulk-insert (spec.md §4.1).
    pub async fn stage_chunk(&self, table_name: &str, token_ids: &[String]) -> Result<(), AnalyticsError> {
        let qualified = format!("{}.{}", self.temp_database, table_name);

        self.execute(&format!("DROP TABLE IF EXISTS {qualified}")).await?;
        self.execute(&format!("CREATE TABLE {qualified} (mint String) ENGINE = Memory")).await?;

        if token_ids.is_empty() {
            return Ok(());
        }

        #[derive(clickhouse::Row, serde::Serialize)]
        struct MintRow<'a> {
            mint: &'a str,
        }

        let mut insert = self
            .client
            .insert(&qualified)
            .map_err(|e| AnalyticsError::Query(e.to_string()))?;

        for token_id in token_ids {
            insert
                .write(&MintRow { mint: token_id })
                .await
                .map_err(|e| AnalyticsError::Query(e.to_string()))?;
        }

        insert.end().await.map_err(|e| AnalyticsError::Query(e.to_string()))?;
        Ok(())
    }

    pub async fn migrate(&self) -> Result<(), AnalyticsError> {
        let schema = tokio::fs::read_to_string("schema/clickhouse.sql")
            .await
            .map_err(|e| AnalyticsError::Query(format!("reading schema/clickhouse.sql: {e}")))?;

        for statement in schema.split(';') {
            let stmt = statement.trim();
            if stmt.is_empty() {
                continue;
            }
            self.execute(stmt).await?;
        }
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AnalyticsError> {
        self.client
            .query("SELECT 1")
            .fetch_one::<u8>()
            .await
            .map(|_: u8| ())
            .map_err(|e| AnalyticsError::Connection(e.to_string()))
    }
}

fn is_session_locked(err: &clickhouse::error::Error) -> bool {
    let msg = err.to_string();
    msg.contains(SESSION_IS_LOCKED_CODE) || msg.to_uppercase().contains("SESSION_IS_LOCKED")
}

/// A process-local pseudo-UUID, good enough as a ClickHouse session
/// identifier (uniqueness within one process run, not cryptographic).
fn uuid_v4_like() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    let pid = std::process::id();
    format!("{nanos:x}-{pid:x}")
}
