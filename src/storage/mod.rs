//! Usage Persistence
//!
//! Durable key -> usage-counter storage behind the `UsageStore` trait, with
//! a file-based and a table-based implementation. Stores guarantee
//! single-process safety via an internal mutex; concurrent access from
//! multiple processes is best-effort only.

pub mod file;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

pub use file::FileStore;
pub use sqlite::SqliteStore;

/// How far back a minute-window timestamp may reach before `cleanup_stale`
/// drops it
pub const STALE_CUTOFF_SECS: i64 = 3600;

/// Width of the sliding request window
pub const MINUTE_WINDOW_SECS: i64 = 60;

/// Persisted usage counters for one endpoint key (`backend:model`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Request instants (epoch seconds) within the trailing minute, oldest
    /// first
    pub minute_timestamps: Vec<i64>,

    /// Requests made since `last_reset`
    pub daily_count: u32,

    /// UTC date of the last daily reset
    pub last_reset: NaiveDate,
}

impl UsageRecord {
    /// Fresh record for an endpoint seen for the first time
    pub fn new(today: NaiveDate) -> Self {
        Self {
            minute_timestamps: Vec::new(),
            daily_count: 0,
            last_reset: today,
        }
    }

    /// Apply the lazy daily reset and prune the minute window.
    ///
    /// The daily count resets exactly once when the UTC date has moved past
    /// `last_reset`, before the date is updated. Afterwards the window holds
    /// only instants younger than 60 seconds.
    pub fn refresh(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.last_reset {
            self.daily_count = 0;
            self.last_reset = today;
        }

        let cutoff = now.timestamp() - MINUTE_WINDOW_SECS;
        self.minute_timestamps.retain(|&t| t > cutoff);
    }

    /// Count one request at `now`
    pub fn record(&mut self, now: DateTime<Utc>) {
        self.refresh(now);
        self.minute_timestamps.push(now.timestamp());
        self.daily_count += 1;
    }

    /// Drop window entries older than an hour. Maintenance only; `refresh`
    /// already ignores anything past the minute window.
    pub fn drop_stale(&mut self, now: DateTime<Utc>) {
        let cutoff = now.timestamp() - STALE_CUTOFF_SECS;
        self.minute_timestamps.retain(|&t| t > cutoff);
    }
}

/// Durable storage for usage records
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Load every persisted record
    async fn load_all(&self) -> Result<HashMap<String, UsageRecord>>;

    /// Replace the persisted state with the given records
    async fn save_all(&self, records: &HashMap<String, UsageRecord>) -> Result<()>;

    /// Drop persisted window entries older than an hour from every record.
    /// Periodic maintenance, not correctness-critical.
    async fn cleanup_stale(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_refresh_prunes_minute_window() {
        let now = at(1_700_000_000);
        let mut record = UsageRecord::new(now.date_naive());
        record.minute_timestamps = vec![
            now.timestamp() - 120,
            now.timestamp() - 61,
            now.timestamp() - 59,
            now.timestamp() - 1,
        ];

        record.refresh(now);
        assert_eq!(
            record.minute_timestamps,
            vec![now.timestamp() - 59, now.timestamp() - 1]
        );
    }

    #[test]
    fn test_refresh_resets_daily_count_on_new_day() {
        let yesterday = at(1_700_000_000);
        let mut record = UsageRecord::new(yesterday.date_naive());
        record.daily_count = 42;

        let tomorrow = yesterday + Duration::days(1);
        record.refresh(tomorrow);

        assert_eq!(record.daily_count, 0);
        assert_eq!(record.last_reset, tomorrow.date_naive());
    }

    #[test]
    fn test_refresh_same_day_keeps_count() {
        let now = at(1_700_000_000);
        let mut record = UsageRecord::new(now.date_naive());
        record.daily_count = 5;

        record.refresh(now + Duration::seconds(30));
        assert_eq!(record.daily_count, 5);
    }

    #[test]
    fn test_record_appends_and_increments() {
        let now = at(1_700_000_000);
        let mut record = UsageRecord::new(now.date_naive());

        record.record(now);
        record.record(now + Duration::seconds(1));

        assert_eq!(record.daily_count, 2);
        assert_eq!(
            record.minute_timestamps,
            vec![now.timestamp(), now.timestamp() + 1]
        );
    }

    #[test]
    fn test_drop_stale_keeps_recent_entries() {
        let now = at(1_700_000_000);
        let mut record = UsageRecord::new(now.date_naive());
        record.minute_timestamps = vec![
            now.timestamp() - 7200,
            now.timestamp() - 3601,
            now.timestamp() - 120,
        ];

        record.drop_stale(now);
        assert_eq!(record.minute_timestamps, vec![now.timestamp() - 120]);
    }

    #[test]
    fn test_record_serialization_format() {
        let record = UsageRecord {
            minute_timestamps: vec![1_700_000_000, 1_700_000_030],
            daily_count: 2,
            last_reset: NaiveDate::from_ymd_opt(2023, 11, 14).unwrap(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "minute_timestamps": [1_700_000_000i64, 1_700_000_030i64],
                "daily_count": 2,
                "last_reset": "2023-11-14"
            })
        );

        let back: UsageRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
