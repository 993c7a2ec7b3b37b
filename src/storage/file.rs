//! File-Based Usage Store
//!
//! Persists all records as one JSON document, rewritten atomically via a
//! temp file and rename so a crash mid-write never leaves a torn file.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{UsageRecord, UsageStore};
use crate::error::{Result, RouterError};

/// Whole-file JSON store
pub struct FileStore {
    path: PathBuf,

    // Serializes load/save within this process. Other processes touching the
    // same file get best-effort semantics only.
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_records(&self) -> Result<HashMap<String, UsageRecord>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            RouterError::Storage(format!(
                "Failed to parse {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn write_records(&self, records: &HashMap<String, UsageRecord>) -> Result<()> {
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| RouterError::Storage(format!("Failed to serialize usage: {}", e)))?;

        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = dir {
            std::fs::create_dir_all(dir)?;
        }

        let mut tmp = tempfile::NamedTempFile::new_in(dir.unwrap_or(Path::new(".")))?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .map_err(|e| RouterError::Storage(format!("Failed to persist usage file: {}", e)))?;

        debug!(path = %self.path.display(), records = records.len(), "usage file written");
        Ok(())
    }
}

#[async_trait]
impl UsageStore for FileStore {
    async fn load_all(&self) -> Result<HashMap<String, UsageRecord>> {
        let _guard = self.lock.lock();
        self.read_records()
    }

    async fn save_all(&self, records: &HashMap<String, UsageRecord>) -> Result<()> {
        let _guard = self.lock.lock();
        self.write_records(records)
    }

    async fn cleanup_stale(&self) -> Result<()> {
        let _guard = self.lock.lock();
        let mut records = self.read_records()?;
        if records.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        for record in records.values_mut() {
            record.drop_stale(now);
        }
        self.write_records(&records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_records(ts: &[i64]) -> HashMap<String, UsageRecord> {
        let mut records = HashMap::new();
        records.insert(
            "openai:gpt-4".to_string(),
            UsageRecord {
                minute_timestamps: ts.to_vec(),
                daily_count: ts.len() as u32,
                last_reset: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            },
        );
        records
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("usage.json"));
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("usage.json"));

        let records = sample_records(&[1_700_000_000, 1_700_000_010]);
        store.save_all(&records).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded, records);
    }

    #[tokio::test]
    async fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("usage.json"));

        store.save_all(&sample_records(&[1])).await.unwrap();
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_cleanup_stale_drops_old_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("usage.json"));

        let now = Utc::now().timestamp();
        store
            .save_all(&sample_records(&[now - 7200, now - 30]))
            .await
            .unwrap();

        store.cleanup_stale().await.unwrap();

        let loaded = store.load_all().await.unwrap();
        let record = &loaded["openai:gpt-4"];
        assert_eq!(record.minute_timestamps, vec![now - 30]);
        // Daily count is untouched by maintenance
        assert_eq!(record.daily_count, 2);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(
            store.load_all().await,
            Err(RouterError::Storage(_))
        ));
    }
}
