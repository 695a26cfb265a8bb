//! # Persistent Day Cache Store
//!
//! A key → entry table holding one provider day per `(station, date)`, keyed
//! `"{pc}:{hc}:{YYYY-MM-DD}"`. Entries are replaced wholesale, never merged.
//!
//! ## Backends
//! - [`JsonFileStore`]: the whole table lives in memory and is written to one JSON
//!   file after every mutation (temp file + rename, so a crash mid-write leaves the
//!   previous file intact). A missing file is an empty table; a corrupt one is
//!   logged and discarded.
//! - [`MemoryStore`]: same behaviour without the file, for tests and throwaway runs.
//!
//! Missing keys are never errors: `get` yields `None` and `delete` is a no-op.

use crate::tide_data::TideError;
use crate::{Station, TidePoint};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Store backend failures. "Not found" is deliberately absent.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cache file IO: {0}")]
    Io(#[from] io::Error),

    #[error("cache serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<StoreError> for TideError {
    fn from(err: StoreError) -> Self {
        TideError::Store(err.to_string())
    }
}

/// One cached provider day.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub station: Station,
    pub day: NaiveDate,
    /// Raw samples as fetched; extrema are derived on read, never stored
    pub series: Vec<TidePoint>,
    pub tide_name: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        station: Station,
        day: NaiveDate,
        series: Vec<TidePoint>,
        tide_name: Option<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: station.cache_key(day),
            station,
            day,
            series,
            tide_name,
            fetched_at,
        }
    }

    /// Time since the entry was fetched.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.fetched_at
    }

    /// Serialized length, used as a size estimate.
    fn approx_size(&self) -> usize {
        serde_json::to_vec(self).map_or(0, |bytes| bytes.len())
    }
}

/// Aggregate view of a store. `approx_size_bytes` is an estimate, not storage
/// accounting.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub count: usize,
    pub approx_size_bytes: usize,
    pub newest_fetched_at: Option<DateTime<Utc>>,
    pub oldest_fetched_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError>;

    /// Insert or fully overwrite the entry under `entry.key`.
    async fn put(&self, entry: &CacheEntry) -> Result<(), StoreError>;

    /// Remove one entry; returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Remove everything; returns how many entries were dropped.
    async fn delete_all(&self) -> Result<usize, StoreError>;

    /// Remove entries fetched strictly before `cutoff`.
    async fn delete_fetched_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Newest first, at most `limit` entries.
    async fn list(&self, limit: usize) -> Result<Vec<CacheEntry>, StoreError>;

    async fn stats(&self) -> Result<CacheStats, StoreError>;

    /// Remove entries older than `max_age_days` days as of `now`.
    ///
    /// An age too large to represent as a date removes nothing.
    async fn delete_older_than(
        &self,
        max_age_days: i64,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let cutoff = Duration::try_days(max_age_days).and_then(|age| now.checked_sub_signed(age));
        match cutoff {
            Some(cutoff) => self.delete_fetched_before(cutoff).await,
            None => Ok(0),
        }
    }
}

/// The in-memory table both backends share.
#[derive(Clone, Debug, Default)]
struct Table {
    entries: BTreeMap<String, CacheEntry>,
}

impl Table {
    fn from_entries(entries: Vec<CacheEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.key.clone(), e)).collect(),
        }
    }

    fn remove_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.fetched_at >= cutoff);
        before - self.entries.len()
    }

    fn newest_first(&self, limit: usize) -> Vec<CacheEntry> {
        let mut entries: Vec<&CacheEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at).then_with(|| a.key.cmp(&b.key)));
        entries.into_iter().take(limit).cloned().collect()
    }

    fn stats(&self) -> CacheStats {
        let values = self.entries.values();
        CacheStats {
            count: self.entries.len(),
            approx_size_bytes: values.clone().map(CacheEntry::approx_size).sum(),
            newest_fetched_at: values.clone().map(|e| e.fetched_at).max(),
            oldest_fetched_at: values.map(|e| e.fetched_at).min(),
        }
    }

    fn snapshot(&self) -> Vec<&CacheEntry> {
        self.entries.values().collect()
    }
}

/// Non-persistent store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: RwLock<Table>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.table.read().await.entries.get(key).cloned())
    }

    async fn put(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        self.table
            .write()
            .await
            .entries
            .insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.table.write().await.entries.remove(key).is_some())
    }

    async fn delete_all(&self) -> Result<usize, StoreError> {
        let mut table = self.table.write().await;
        let count = table.entries.len();
        table.entries.clear();
        Ok(count)
    }

    async fn delete_fetched_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(self.table.write().await.remove_before(cutoff))
    }

    async fn list(&self, limit: usize) -> Result<Vec<CacheEntry>, StoreError> {
        Ok(self.table.read().await.newest_first(limit))
    }

    async fn stats(&self) -> Result<CacheStats, StoreError> {
        Ok(self.table.read().await.stats())
    }
}

/// Store persisted as a single JSON document.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    table: RwLock<Table>,
}

impl JsonFileStore {
    /// Open (or start) the cache file at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let table = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<CacheEntry>>(&bytes) {
                Ok(entries) => {
                    debug!(path = %path.display(), entries = entries.len(), "loaded tide cache");
                    Table::from_entries(entries)
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "discarding corrupt tide cache");
                    Table::default()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => Table::default(),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            path,
            table: RwLock::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the table to disk. Called with the write lock held so file order
    /// matches mutation order.
    async fn persist(&self, table: &Table) -> Result<(), StoreError> {
        let data = serde_json::to_vec(&table.snapshot())?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.table.read().await.entries.get(key).cloned())
    }

    async fn put(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        let mut table = self.table.write().await;
        let previous = table.entries.insert(entry.key.clone(), entry.clone());
        if let Err(err) = self.persist(&table).await {
            // Keep memory and disk in agreement.
            match previous {
                Some(old) => table.entries.insert(entry.key.clone(), old),
                None => table.entries.remove(&entry.key),
            };
            return Err(err);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut table = self.table.write().await;
        if !table.entries.contains_key(key) {
            return Ok(false);
        }
        let mut next = table.clone();
        next.entries.remove(key);
        self.persist(&next).await?;
        *table = next;
        Ok(true)
    }

    async fn delete_all(&self) -> Result<usize, StoreError> {
        let mut table = self.table.write().await;
        let count = table.entries.len();
        self.persist(&Table::default()).await?;
        table.entries.clear();
        Ok(count)
    }

    async fn delete_fetched_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut table = self.table.write().await;
        let mut next = table.clone();
        let removed = next.remove_before(cutoff);
        if removed > 0 {
            // Swap in only once the file agrees
            self.persist(&next).await?;
            *table = next;
        }
        Ok(removed)
    }

    async fn list(&self, limit: usize) -> Result<Vec<CacheEntry>, StoreError> {
        Ok(self.table.read().await.newest_first(limit))
    }

    async fn stats(&self) -> Result<CacheStats, StoreError> {
        Ok(self.table.read().await.stats())
    }
}
