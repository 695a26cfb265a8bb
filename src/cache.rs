//! # Cached Tide Day Lookup
//!
//! [`TideCache`] ties the provider, the store and a network-availability signal
//! into one "give me this station's day" call.
//!
//! ## Decision Procedure
//!
//! | cached entry | age vs TTL | network | outcome                         |
//! |--------------|------------|---------|---------------------------------|
//! | yes          | fresh      | any     | cached, `CacheHit`              |
//! | yes          | expired    | offline | cached, `StaleFallback`, stale  |
//! | yes          | expired    | online  | refetch + replace, `Fresh`      |
//! | no           | -          | offline | empty, `CacheHit`, stale        |
//! | no           | -          | online  | fetch + store, `Fresh`          |
//!
//! A fetch error is returned to the caller and leaves the stored entry exactly as
//! it was: the entry is only replaced after a fetch succeeds and parses.
//!
//! ## Concurrency
//!
//! Concurrent lookups of the same key share one in-flight fetch, so they cost a
//! single upstream request and a single write, and all of them see the same
//! result or the same error. Every upstream call is bounded by a timeout.

use crate::cache_store::{CacheEntry, CacheStats, CacheStore};
use crate::tide_data::{TideError, TideProvider};
use crate::{Station, TidePoint};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default bound on one upstream call.
pub const DEFAULT_FETCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Whether an upstream fetch may be attempted right now.
pub trait NetworkStatus: Send + Sync {
    fn is_online(&self) -> bool;
}

/// A settable online/offline switch.
#[derive(Debug)]
pub struct NetworkFlag(AtomicBool);

impl NetworkFlag {
    pub fn new(online: bool) -> Self {
        Self(AtomicBool::new(online))
    }

    pub fn set_online(&self, online: bool) {
        self.0.store(online, Ordering::SeqCst);
    }
}

impl NetworkStatus for NetworkFlag {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where a lookup result came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Provenance {
    /// Fetched from the provider during this call
    Fresh,
    /// Served from the store (or an empty day while offline with nothing cached)
    CacheHit,
    /// Expired entry served because no fetch was possible
    StaleFallback,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CacheLookupResult {
    pub series: Vec<TidePoint>,
    pub tide_name: Option<String>,
    pub provenance: Provenance,
    pub is_stale: bool,
}

impl CacheLookupResult {
    fn from_entry(entry: CacheEntry, provenance: Provenance, is_stale: bool) -> Self {
        Self {
            series: entry.series,
            tide_name: entry.tide_name,
            provenance,
            is_stale,
        }
    }
}

/// True while `now - fetched_at` is within `ttl_days` days (inclusive).
///
/// A TTL too large to represent never expires.
pub fn is_fresh(fetched_at: DateTime<Utc>, ttl_days: i64, now: DateTime<Utc>) -> bool {
    match Duration::try_days(ttl_days) {
        Some(ttl) => now - fetched_at <= ttl,
        None => ttl_days > 0,
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<CacheEntry, TideError>>>;

/// Cache-first access to provider days.
pub struct TideCache {
    provider: Arc<dyn TideProvider>,
    store: Arc<dyn CacheStore>,
    network: Arc<dyn NetworkStatus>,
    fetch_timeout: std::time::Duration,
    in_flight: Mutex<HashMap<String, SharedFetch>>,
}

impl TideCache {
    pub fn new(
        provider: Arc<dyn TideProvider>,
        store: Arc<dyn CacheStore>,
        network: Arc<dyn NetworkStatus>,
    ) -> Self {
        Self {
            provider,
            store,
            network,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Look up one day, fetching only when the cache cannot answer.
    pub async fn get_day_cached(
        &self,
        station: &Station,
        date: NaiveDate,
        ttl_days: i64,
    ) -> Result<CacheLookupResult, TideError> {
        self.get_day_cached_at(station, date, ttl_days, Utc::now())
            .await
    }

    /// [`Self::get_day_cached`] with an explicit clock.
    pub async fn get_day_cached_at(
        &self,
        station: &Station,
        date: NaiveDate,
        ttl_days: i64,
        now: DateTime<Utc>,
    ) -> Result<CacheLookupResult, TideError> {
        let key = station.cache_key(date);
        let cached = self.store.get(&key).await?;
        let online = self.network.is_online();

        match cached {
            Some(entry) if is_fresh(entry.fetched_at, ttl_days, now) => {
                debug!(%key, "tide cache hit");
                Ok(CacheLookupResult::from_entry(entry, Provenance::CacheHit, false))
            }
            Some(entry) if !online => {
                debug!(%key, age_hours = entry.age(now).num_hours(), "offline, serving stale tide day");
                Ok(CacheLookupResult::from_entry(
                    entry,
                    Provenance::StaleFallback,
                    true,
                ))
            }
            None if !online => {
                debug!(%key, "offline with nothing cached");
                Ok(CacheLookupResult {
                    series: Vec::new(),
                    tide_name: None,
                    provenance: Provenance::CacheHit,
                    is_stale: true,
                })
            }
            _ => {
                let entry = self.fetch_shared(station, date, now).await?;
                Ok(CacheLookupResult::from_entry(entry, Provenance::Fresh, false))
            }
        }
    }

    /// Fetch and replace the day regardless of its age.
    pub async fn force_refresh(
        &self,
        station: &Station,
        date: NaiveDate,
    ) -> Result<CacheLookupResult, TideError> {
        self.force_refresh_at(station, date, Utc::now()).await
    }

    /// [`Self::force_refresh`] with an explicit clock.
    pub async fn force_refresh_at(
        &self,
        station: &Station,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<CacheLookupResult, TideError> {
        if !self.network.is_online() {
            return Err(TideError::Offline);
        }
        let entry = self.fetch_shared(station, date, now).await?;
        Ok(CacheLookupResult::from_entry(entry, Provenance::Fresh, false))
    }

    pub async fn stats(&self) -> Result<CacheStats, TideError> {
        Ok(self.store.stats().await?)
    }

    pub async fn list(&self, limit: usize) -> Result<Vec<CacheEntry>, TideError> {
        Ok(self.store.list(limit).await?)
    }

    pub async fn delete_by_key(&self, key: &str) -> Result<bool, TideError> {
        Ok(self.store.delete(key).await?)
    }

    pub async fn delete_all(&self) -> Result<usize, TideError> {
        let removed = self.store.delete_all().await?;
        info!(removed, "cleared tide cache");
        Ok(removed)
    }

    pub async fn delete_older_than(&self, max_age_days: i64) -> Result<usize, TideError> {
        self.delete_older_than_at(max_age_days, Utc::now()).await
    }

    pub async fn delete_older_than_at(
        &self,
        max_age_days: i64,
        now: DateTime<Utc>,
    ) -> Result<usize, TideError> {
        let removed = self.store.delete_older_than(max_age_days, now).await?;
        info!(removed, max_age_days, "purged old tide days");
        Ok(removed)
    }

    /// Join the in-flight fetch for this key, or start one.
    async fn fetch_shared(
        &self,
        station: &Station,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<CacheEntry, TideError> {
        let key = station.cache_key(date);

        let flight = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(&key) {
                Some(flight) => {
                    debug!(%key, "joining in-flight tide fetch");
                    flight.clone()
                }
                None => {
                    let flight = fetch_and_store(
                        Arc::clone(&self.provider),
                        Arc::clone(&self.store),
                        station.clone(),
                        date,
                        now,
                        self.fetch_timeout,
                    )
                    .boxed()
                    .shared();
                    in_flight.insert(key.clone(), flight.clone());
                    flight
                }
            }
        };

        let outcome = flight.clone().await;

        let mut in_flight = self.in_flight.lock().await;
        if in_flight.get(&key).is_some_and(|f| f.ptr_eq(&flight)) {
            in_flight.remove(&key);
        }

        outcome
    }
}

async fn fetch_and_store(
    provider: Arc<dyn TideProvider>,
    store: Arc<dyn CacheStore>,
    station: Station,
    date: NaiveDate,
    now: DateTime<Utc>,
    timeout: std::time::Duration,
) -> Result<CacheEntry, TideError> {
    let fetched = tokio::time::timeout(timeout, provider.fetch_day(&station, date))
        .await
        .map_err(|_| TideError::Timeout(timeout))?;

    let day = match fetched {
        Ok(day) => day,
        Err(err) => {
            warn!(pc = %station.pc, hc = %station.hc, %date, error = %err, "tide fetch failed");
            return Err(err);
        }
    };

    let entry = CacheEntry::new(station, date, day.points, day.tide_name, now);
    store.put(&entry).await?;
    info!(key = %entry.key, points = entry.series.len(), "cached tide day");
    Ok(entry)
}
