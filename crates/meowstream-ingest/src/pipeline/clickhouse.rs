//! ClickHouse persistence adapter.
//!
//! Maps sanitized records plus envelope metadata onto idempotent store
//! mutations:
//!
//! - `create`/`update` → insert into a `ReplacingMergeTree` keyed by `rkey`.
//!   Repeated upserts with the same key collapse to the most recently
//!   inserted row, so replays are replacement, not duplication. The row
//!   kept is the last one *inserted* — arrival order, not `time_us`.
//! - `delete` → lightweight `DELETE` by `rkey`. Deleting a missing key is
//!   a no-op.
//!
//! Untrusted values are always bound with `?` placeholders; only fixed
//! configuration (database and table names) is formatted into statements.
//!
//! # Schema Provisioning
//!
//! [`MeowStore::provision`] creates the database, table, and secondary
//! indexes at startup, retrying with a fixed backoff. Exhausting the retry
//! budget is the one error that is allowed to terminate the process.

use std::time::Duration;

use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Configuration for the ClickHouse store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// ClickHouse server URL (e.g., "http://localhost:8123")
    pub url: String,

    /// Database name
    pub database: String,

    /// Table name for records
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: "cat".to_string(),
            table: "meows".to_string(),
        }
    }
}

/// Row structure matching the meows table.
#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize, Deserialize)]
pub struct MeowRow {
    /// Record key; the replacement key of the table.
    pub rkey: String,
    /// Producer timestamp in microseconds.
    pub time_us: i64,
    /// Content hash of the record.
    pub cid: String,
    /// Publishing actor DID.
    pub did: String,
    /// Sanitized emotion, at most 50 characters.
    pub emotion: Option<String>,
    /// Canonical subject DID, or null when unresolved.
    pub subject: Option<String>,
}

/// ClickHouse-backed store for meow records.
pub struct MeowStore {
    client: Client,
    config: StoreConfig,
}

impl MeowStore {
    /// Create a new store handle. Does not touch the network; call
    /// [`provision`](Self::provision) before the first write.
    pub fn new(config: StoreConfig) -> Self {
        let client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database);

        tracing::info!(
            "ClickHouse store initialized: url={}, database={}, table={}",
            config.url,
            config.database,
            config.table
        );

        Self { client, config }
    }

    /// Ensure the database and table exist, retrying with a fixed backoff.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Provision`] once `attempts` tries have failed. The
    /// caller treats this as fatal: the daemon cannot run without its
    /// schema.
    pub async fn provision(&self, attempts: u32, backoff: Duration) -> Result<()> {
        let mut last = String::new();
        for attempt in 1..=attempts {
            match self.try_provision().await {
                Ok(()) => {
                    tracing::info!(
                        "Schema ready: {}.{}",
                        self.config.database,
                        self.config.table
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        attempts,
                        "Schema provisioning failed: {}; retrying in {:?}",
                        e,
                        backoff
                    );
                    last = e.to_string();
                    tokio::time::sleep(backoff).await;
                }
            }
        }
        Err(Error::Provision { attempts, last })
    }

    async fn try_provision(&self) -> Result<()> {
        // The configured database may not exist yet, so DDL for it runs on
        // a client bound to the server default database.
        let admin = Client::default().with_url(&self.config.url);
        admin
            .query(&format!(
                "CREATE DATABASE IF NOT EXISTS {}",
                self.config.database
            ))
            .execute()
            .await?;

        self.client
            .query(&create_table_sql(&self.config.table))
            .execute()
            .await?;

        Ok(())
    }

    /// Upsert one row by record key.
    pub async fn upsert(&self, row: &MeowRow) -> Result<()> {
        let mut insert = self.client.insert(&self.config.table)?;
        insert.write(row).await?;
        insert.end().await?;
        Ok(())
    }

    /// Delete the row with the given record key, if any.
    pub async fn delete(&self, rkey: &str) -> Result<()> {
        self.client
            .query(&format!("DELETE FROM {} WHERE rkey = ?", self.config.table))
            .bind(rkey)
            .execute()
            .await?;
        Ok(())
    }
}

/// DDL for the records table.
///
/// `ReplacingMergeTree` without a version column keeps the most recently
/// inserted row per `rkey`, which matches the pipeline's arrival-order
/// last-write-wins semantics. Readers query with `FINAL`.
fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            rkey String,
            time_us Int64,
            cid String,
            did String,
            emotion Nullable(String),
            subject Nullable(String),
            INDEX idx_{table}_did did TYPE bloom_filter GRANULARITY 4,
            INDEX idx_{table}_subject subject TYPE bloom_filter GRANULARITY 4
        )
        ENGINE = ReplacingMergeTree
        ORDER BY rkey"
    )
}
