//! Usage Tracking
//!
//! Sliding-window RPM and calendar-day RPD accounting per endpoint, loaded
//! from a [`UsageStore`] once and persisted on every recorded request. The
//! in-memory map is the source of truth for decisions made in this process.
//!
//! `can_make_request` followed by `record_request` is deliberately not
//! atomic as a pair: two concurrent callers can both pass the check before
//! either records, so the limiter is a soft cap. Callers that need a hard
//! cap must serialize the pair themselves.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::Result;
use crate::storage::{UsageRecord, UsageStore};

/// Composite storage key for a (backend, model) pair
pub(crate) fn endpoint_key(backend: &str, model: &str) -> String {
    format!("{}:{}", backend, model)
}

/// Request accounting over a persistent store
pub struct UsageTracker {
    store: Box<dyn UsageStore>,

    // Never held across an await: persistence works on a snapshot taken
    // after this lock is released.
    records: Mutex<HashMap<String, UsageRecord>>,
}

impl UsageTracker {
    /// Load persisted usage state from the store
    pub async fn load(store: Box<dyn UsageStore>) -> Result<Self> {
        let records = store.load_all().await?;
        debug!(records = records.len(), "usage state loaded");

        Ok(Self {
            store,
            records: Mutex::new(records),
        })
    }

    /// Whether a request to this endpoint fits within its limits right now.
    ///
    /// Applies the lazy daily reset and window prune before deciding, so a
    /// record touched here reads back with up-to-date counters.
    pub fn can_make_request(&self, backend: &str, model: &str, rpm: u32, rpd: u32) -> bool {
        let key = endpoint_key(backend, model);
        let now = Utc::now();

        let mut records = self.records.lock();
        let record = records
            .entry(key)
            .or_insert_with(|| UsageRecord::new(now.date_naive()));
        record.refresh(now);

        record.minute_timestamps.len() < rpm as usize && record.daily_count < rpd
    }

    /// Count one request against this endpoint and persist the new state.
    ///
    /// Persistence is synchronous with the call; a slow store directly adds
    /// to query latency.
    pub async fn record_request(&self, backend: &str, model: &str) -> Result<()> {
        let key = endpoint_key(backend, model);
        let now = Utc::now();

        let snapshot = {
            let mut records = self.records.lock();
            let record = records
                .entry(key)
                .or_insert_with(|| UsageRecord::new(now.date_naive()));
            record.record(now);
            records.clone()
        };

        if let Err(e) = self.store.save_all(&snapshot).await {
            // In-memory counters already advanced; surface the write failure
            warn!(error = %e, "failed to persist usage state");
            return Err(e);
        }
        Ok(())
    }

    /// Drop window entries older than an hour, in memory and in the store
    pub async fn cleanup_stale(&self) -> Result<()> {
        let now = Utc::now();
        {
            let mut records = self.records.lock();
            for record in records.values_mut() {
                record.drop_stale(now);
            }
        }
        self.store.cleanup_stale().await
    }

    /// Snapshot of the current record for an endpoint, if one exists
    pub fn usage(&self, backend: &str, model: &str) -> Option<UsageRecord> {
        self.records
            .lock()
            .get(&endpoint_key(backend, model))
            .cloned()
    }
}

impl std::fmt::Debug for UsageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageTracker")
            .field("records", &self.records.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileStore;
    use chrono::Duration;

    async fn tracker_in(dir: &tempfile::TempDir) -> UsageTracker {
        let store = FileStore::new(dir.path().join("usage.json"));
        UsageTracker::load(Box::new(store)).await.unwrap()
    }

    #[tokio::test]
    async fn test_rpm_limit_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker_in(&dir).await;

        assert!(tracker.can_make_request("openai", "gpt-4", 2, 100));
        tracker.record_request("openai", "gpt-4").await.unwrap();
        assert!(tracker.can_make_request("openai", "gpt-4", 2, 100));
        tracker.record_request("openai", "gpt-4").await.unwrap();

        // Third request within the same minute window is denied
        assert!(!tracker.can_make_request("openai", "gpt-4", 2, 100));
        // A higher limit would still admit it
        assert!(tracker.can_make_request("openai", "gpt-4", 3, 100));
    }

    #[tokio::test]
    async fn test_rpd_limit_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker_in(&dir).await;

        tracker.record_request("openai", "gpt-4").await.unwrap();
        tracker.record_request("openai", "gpt-4").await.unwrap();

        assert!(!tracker.can_make_request("openai", "gpt-4", 100, 2));
    }

    #[tokio::test]
    async fn test_daily_rollover_resets_count() {
        let dir = tempfile::tempdir().unwrap();

        // Seed the store with yesterday's exhausted record
        let store = FileStore::new(dir.path().join("usage.json"));
        let yesterday = (Utc::now() - Duration::days(1)).date_naive();
        let mut seeded = HashMap::new();
        seeded.insert(
            "openai:gpt-4".to_string(),
            UsageRecord {
                minute_timestamps: Vec::new(),
                daily_count: 50,
                last_reset: yesterday,
            },
        );
        store.save_all(&seeded).await.unwrap();

        let tracker = tracker_in(&dir).await;

        // First check of the new day admits the request...
        assert!(tracker.can_make_request("openai", "gpt-4", 10, 50));

        // ...and the count reads back as zero before any record_request
        let record = tracker.usage("openai", "gpt-4").unwrap();
        assert_eq!(record.daily_count, 0);
        assert_eq!(record.last_reset, Utc::now().date_naive());
    }

    #[tokio::test]
    async fn test_endpoints_tracked_independently() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker_in(&dir).await;

        tracker.record_request("openai", "gpt-4").await.unwrap();

        assert!(!tracker.can_make_request("openai", "gpt-4", 1, 100));
        assert!(tracker.can_make_request("openai", "gpt-4o-mini", 1, 100));
        assert!(tracker.can_make_request("anthropic", "gpt-4", 1, 100));
    }

    #[tokio::test]
    async fn test_persistence_round_trip_preserves_decisions() {
        let dir = tempfile::tempdir().unwrap();

        let tracker = tracker_in(&dir).await;
        tracker.record_request("openai", "gpt-4").await.unwrap();
        tracker.record_request("openai", "gpt-4").await.unwrap();

        // A fresh tracker over the same store sees the same state
        let reloaded = tracker_in(&dir).await;
        assert_eq!(
            tracker.can_make_request("openai", "gpt-4", 2, 100),
            reloaded.can_make_request("openai", "gpt-4", 2, 100)
        );
        assert_eq!(
            tracker.usage("openai", "gpt-4").unwrap().daily_count,
            reloaded.usage("openai", "gpt-4").unwrap().daily_count
        );
    }

    #[tokio::test]
    async fn test_cleanup_stale_reaches_store() {
        let dir = tempfile::tempdir().unwrap();

        let store = FileStore::new(dir.path().join("usage.json"));
        let now = Utc::now();
        let mut seeded = HashMap::new();
        seeded.insert(
            "openai:gpt-4".to_string(),
            UsageRecord {
                minute_timestamps: vec![now.timestamp() - 7200, now.timestamp() - 5],
                daily_count: 2,
                last_reset: now.date_naive(),
            },
        );
        store.save_all(&seeded).await.unwrap();

        let tracker = tracker_in(&dir).await;
        tracker.cleanup_stale().await.unwrap();

        let persisted = FileStore::new(dir.path().join("usage.json"))
            .load_all()
            .await
            .unwrap();
        assert_eq!(
            persisted["openai:gpt-4"].minute_timestamps,
            vec![now.timestamp() - 5]
        );
    }
}
