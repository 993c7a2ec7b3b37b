//! Table-Based Usage Store
//!
//! One row per endpoint key in a SQLite table, updated in place. The minute
//! window is kept as a JSON array column so the persisted shape matches the
//! file store.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use super::{UsageRecord, UsageStore};
use crate::error::{Result, RouterError};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS usage_records (
    endpoint TEXT PRIMARY KEY,
    minute_timestamps TEXT NOT NULL,
    daily_count INTEGER NOT NULL,
    last_reset TEXT NOT NULL
)";

const UPSERT: &str = "INSERT INTO usage_records (endpoint, minute_timestamps, daily_count, last_reset)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(endpoint) DO UPDATE SET
        minute_timestamps = excluded.minute_timestamps,
        daily_count = excluded.daily_count,
        last_reset = excluded.last_reset";

/// SQLite-backed store
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the table exists.
    ///
    /// A single pooled connection serializes access within this process.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(CREATE_TABLE).execute(&pool).await?;

        Ok(Self { pool })
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<(String, UsageRecord)> {
        let endpoint: String = row.get("endpoint");
        let timestamps_json: String = row.get("minute_timestamps");
        let daily_count: i64 = row.get("daily_count");
        let last_reset: String = row.get("last_reset");

        let minute_timestamps: Vec<i64> = serde_json::from_str(&timestamps_json)
            .map_err(|e| RouterError::Storage(format!("Bad window for '{}': {}", endpoint, e)))?;
        let last_reset = NaiveDate::parse_from_str(&last_reset, "%Y-%m-%d")
            .map_err(|e| RouterError::Storage(format!("Bad date for '{}': {}", endpoint, e)))?;

        Ok((
            endpoint,
            UsageRecord {
                minute_timestamps,
                daily_count: daily_count as u32,
                last_reset,
            },
        ))
    }

    async fn upsert_all(&self, records: &HashMap<String, UsageRecord>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for (endpoint, record) in records {
            let timestamps_json = serde_json::to_string(&record.minute_timestamps)
                .map_err(|e| RouterError::Storage(format!("Failed to serialize window: {}", e)))?;

            sqlx::query(UPSERT)
                .bind(endpoint)
                .bind(timestamps_json)
                .bind(record.daily_count as i64)
                .bind(record.last_reset.format("%Y-%m-%d").to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(records = records.len(), "usage rows written");
        Ok(())
    }
}

#[async_trait]
impl UsageStore for SqliteStore {
    async fn load_all(&self) -> Result<HashMap<String, UsageRecord>> {
        let rows = sqlx::query("SELECT endpoint, minute_timestamps, daily_count, last_reset FROM usage_records")
            .fetch_all(&self.pool)
            .await?;

        let mut records = HashMap::with_capacity(rows.len());
        for row in &rows {
            let (endpoint, record) = Self::row_to_record(row)?;
            records.insert(endpoint, record);
        }
        Ok(records)
    }

    async fn save_all(&self, records: &HashMap<String, UsageRecord>) -> Result<()> {
        self.upsert_all(records).await
    }

    async fn cleanup_stale(&self) -> Result<()> {
        let mut records = self.load_all().await?;
        if records.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        for record in records.values_mut() {
            record.drop_stale(now);
        }
        self.upsert_all(&records).await
    }
}
