//! # End-to-End Tide Data Tests
//!
//! These tests follow a tide day the whole way through: a provider payload is
//! parsed, cached in a JSON file, read back (possibly offline), and turned into
//! high/low waters, a phase label and a chart. Tests run without network access
//! and use temporary directories for the cache file.

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::{NamedTempFile, TempDir};
use tide_almanac_lib::cache::{NetworkFlag, Provenance, TideCache};
use tide_almanac_lib::cache_store::{CacheEntry, CacheStore, JsonFileStore};
use tide_almanac_lib::config::Config;
use tide_almanac_lib::extrema::{self, ExtractOptions};
use tide_almanac_lib::phase::{self, PhaseLabel, PhaseWindows};
use tide_almanac_lib::renderer::{draw_ascii, DayChart};
use tide_almanac_lib::series::{self, DaySeries};
use tide_almanac_lib::tide_data::{parse_day_payload, TideDay, TideError, TideProvider};
use tide_almanac_lib::{ExtremeKind, Station, TidePoint};

/// Provider that answers every request with a fixed response body.
struct CannedPayload {
    body: String,
}

#[async_trait]
impl TideProvider for CannedPayload {
    async fn fetch_day(&self, _station: &Station, date: NaiveDate) -> Result<TideDay, TideError> {
        Ok(parse_day_payload(&self.body, date)?.into_day())
    }
}

fn kst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).unwrap()
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, 24).unwrap()
}

fn station() -> Station {
    Station::new("DT_0001", "12")
}

/// Epoch milliseconds of a local KST clock time on the test day.
fn kst_millis(hour: u32, minute: u32) -> f64 {
    kst()
        .with_ymd_and_hms(2025, 7, 24, hour, minute, 0)
        .unwrap()
        .timestamp_millis() as f64
}

fn kst_instant(hour: u32, minute: u32) -> DateTime<Utc> {
    kst()
        .with_ymd_and_hms(2025, 7, 24, hour, minute, 0)
        .unwrap()
        .with_timezone(&Utc)
}

/// A charted payload (shape b) for the test day.
fn chart_payload() -> String {
    json!({
        "status": true,
        "tide": {
            "chart": {
                "2025-07-24": {
                    "tide": [
                        {"tph_time": "2025-07-24 00:00", "tph_level": "50"},
                        {"tph_time": "2025-07-24 06:00", "tph_level": "120"},
                        {"tph_time": "2025-07-24 12:00", "tph_level": "40"},
                        {"tph_time": "2025-07-24 13:00", "tph_level": "55"},
                        {"tph_time": "2025-07-24 18:00", "tph_level": "110"}
                    ],
                    "moon": {"title": "Spring tide"}
                }
            }
        }
    })
    .to_string()
}

/// Test that a charted payload is fetched, persisted and reloaded intact.
///
/// The JSON file must hold everything needed to answer the same lookup after
/// a restart, without the provider.
#[tokio::test]
async fn fetched_day_survives_restart() {
    let dir = TempDir::new().expect("Should create temp dir");
    let path = dir.path().join("cache").join("tides.json");
    let now = Utc::now();

    {
        let store = JsonFileStore::open(&path).await.expect("Should open store");
        let cache = TideCache::new(
            Arc::new(CannedPayload { body: chart_payload() }),
            Arc::new(store),
            Arc::new(NetworkFlag::new(true)),
        );
        let fetched = cache
            .get_day_cached_at(&station(), date(), 7, now)
            .await
            .expect("Should fetch day");
        assert_eq!(fetched.provenance, Provenance::Fresh);
        assert_eq!(fetched.series.len(), 5);
    }

    assert!(path.exists(), "Cache file should be written on first fetch");

    let reopened = JsonFileStore::open(&path).await.expect("Should reopen store");
    let cache = TideCache::new(
        Arc::new(CannedPayload {
            body: "not json".to_string(),
        }),
        Arc::new(reopened),
        Arc::new(NetworkFlag::new(true)),
    );
    let cached = cache
        .get_day_cached_at(&station(), date(), 7, now)
        .await
        .expect("Should answer from cache");

    assert_eq!(cached.provenance, Provenance::CacheHit);
    assert_eq!(cached.tide_name.as_deref(), Some("Spring tide"));

    let events = extrema::extract(&cached.series, &ExtractOptions::default());
    let summary: Vec<(ExtremeKind, String)> = events.iter().map(|e| (e.kind, e.clock())).collect();
    assert_eq!(
        summary,
        vec![
            (ExtremeKind::High, "06:00".to_string()),
            (ExtremeKind::Low, "12:00".to_string()),
            (ExtremeKind::High, "18:00".to_string()),
        ]
    );
}

/// Test that junk heights from upstream are dropped before they reach the
/// cache file.
///
/// A NaN height would be written as `null` and make the whole file unreadable,
/// losing every other cached day on the next start.
#[tokio::test]
async fn junk_heights_never_reach_the_cache_file() {
    let dir = TempDir::new().expect("Should create temp dir");
    let path = dir.path().join("tides.json");
    let body = json!({
        "status": true,
        "tide": {"tide": [
            {"time": "00:00", "level": "50"},
            {"time": "06:00", "level": "NaN"},
            {"time": "12:00", "level": "1e999"},
            {"time": "18:00", "level": 110}
        ]}
    })
    .to_string();
    let other_day = NaiveDate::from_ymd_opt(2025, 7, 23).unwrap();

    {
        let store = JsonFileStore::open(&path).await.expect("Should open store");
        let cache = TideCache::new(
            Arc::new(CannedPayload { body }),
            Arc::new(store),
            Arc::new(NetworkFlag::new(true)),
        );
        cache
            .get_day_cached(&station(), other_day, 7)
            .await
            .expect("Should fetch first day");
        let fetched = cache
            .get_day_cached(&station(), date(), 7)
            .await
            .expect("Should fetch second day");
        assert_eq!(fetched.series.len(), 2, "Non-finite heights should be dropped");
    }

    let reopened = JsonFileStore::open(&path).await.expect("Should reopen store");
    assert_eq!(reopened.stats().await.expect("Should read stats").count, 2);
    let kept = reopened
        .get(&station().cache_key(date()))
        .await
        .expect("Should read entry")
        .expect("Entry should survive a restart");
    assert!(kept.series.iter().all(|p| p.height_cm.is_finite()));
}

/// Test that an expired file-backed day is still usable offline, and that
/// the chart flags it.
#[tokio::test]
async fn offline_restart_serves_stale_day_with_banner() {
    let dir = TempDir::new().expect("Should create temp dir");
    let path = dir.path().join("tides.json");
    let now = Utc.with_ymd_and_hms(2025, 8, 10, 0, 0, 0).unwrap();

    let payload = parse_day_payload(&chart_payload(), date())
        .expect("Should parse payload")
        .into_day();
    {
        let store = JsonFileStore::open(&path).await.expect("Should open store");
        let entry = CacheEntry::new(
            station(),
            date(),
            payload.points,
            payload.tide_name,
            now - Duration::days(17),
        );
        store.put(&entry).await.expect("Should write entry");
    }

    let store = JsonFileStore::open(&path).await.expect("Should reopen store");
    let cache = TideCache::new(
        Arc::new(CannedPayload { body: chart_payload() }),
        Arc::new(store),
        Arc::new(NetworkFlag::new(false)),
    );
    let lookup = cache
        .get_day_cached_at(&station(), date(), 7, now)
        .await
        .expect("Offline lookup should not fail");

    assert_eq!(lookup.provenance, Provenance::StaleFallback);
    assert!(lookup.is_stale);

    let opts = ExtractOptions::default();
    let points = DaySeries::from_points(series::normalize(&lookup.series, opts.utc_offset));
    let events = extrema::extract(&lookup.series, &opts);
    let chart = draw_ascii(&DayChart {
        title: "Incheon",
        date: date(),
        points: points.points(),
        extrema: &events,
        now_minute: None,
        phase: None,
        tide_name: lookup.tide_name.as_deref(),
        stale: lookup.is_stale,
    });

    assert!(chart.contains("OFFLINE"));
    assert!(chart.contains("(Spring tide)"));
    assert!(chart.contains("Low  12:00  40 cm"));
}

/// Test that epoch-stamped samples land on the station's local clock.
///
/// The provider sometimes sends epoch milliseconds instead of clock strings;
/// with a +09:00 offset the events must read as local times, and the phase at
/// 12:40 local (just after the 12:00 low, rising) must be `RisingStart`.
#[test]
fn epoch_samples_follow_the_station_offset() {
    let day: Vec<TidePoint> = [(0, 50.0), (6, 120.0), (12, 40.0), (13, 55.0), (18, 110.0)]
        .iter()
        .map(|(hour, height)| TidePoint::at_epoch(kst_millis(*hour, 0), *height))
        .collect();
    let opts = ExtractOptions::default().with_utc_offset(kst());

    let events = extrema::extract(&day, &opts);
    let clocks: Vec<String> = events.iter().map(|e| e.clock()).collect();
    assert_eq!(clocks, vec!["06:00", "12:00", "18:00"]);

    let label = phase::classify(&day, date(), kst_instant(12, 40), &PhaseWindows::default(), &opts);
    assert_eq!(label, PhaseLabel::RisingStart);

    // The same instants read in UTC would put the low at 03:00
    let utc_events = extrema::extract(&day, &ExtractOptions::default());
    assert!(utc_events.iter().any(|e| e.kind == ExtremeKind::Low && e.clock() == "03:00"));
}

/// Test that second- and millisecond-stamped payloads agree.
#[test]
fn epoch_seconds_and_millis_agree() {
    let millis: Vec<TidePoint> = [(0, 50.0), (6, 120.0), (12, 40.0), (18, 110.0)]
        .iter()
        .map(|(hour, height)| TidePoint::at_epoch(kst_millis(*hour, 0), *height))
        .collect();
    let seconds: Vec<TidePoint> = millis
        .iter()
        .map(|p| TidePoint::at_epoch(p.epoch.unwrap() / 1000.0, p.height_cm))
        .collect();
    let opts = ExtractOptions::default().with_utc_offset(kst());

    assert_eq!(extrema::extract(&millis, &opts), extrema::extract(&seconds, &opts));
}

/// Test that the config file drives extraction tuning.
///
/// A one-per-kind cap from the file must limit the chart to the first High and
/// the first Low of the day.
#[test]
fn config_file_caps_extrema_per_kind() {
    let temp_file = NamedTempFile::new().expect("Should create temp file");
    fs::write(
        temp_file.path(),
        "[extrema]\nmax_per_kind = 1\n\n[station]\nutc_offset_minutes = 0\n",
    )
    .expect("Should write config file");

    let config = Config::load_from_path(temp_file.path());
    let opts = config.extract_options();
    let day: Vec<TidePoint> = [
        ("00:00", 50.0),
        ("03:00", 120.0),
        ("06:00", 30.0),
        ("09:00", 125.0),
        ("10:30", 70.0),
        ("12:00", 20.0),
        ("15:00", 130.0),
        ("24:00", 60.0),
    ]
    .iter()
    .map(|(t, h)| TidePoint::at_clock(*t, *h))
    .collect();

    let events = extrema::extract(&day, &opts);
    assert_eq!(events.len(), 2);
    assert_eq!((events[0].kind, events[0].clock()), (ExtremeKind::High, "03:00".to_string()));
    assert_eq!((events[1].kind, events[1].clock()), (ExtremeKind::Low, "06:00".to_string()));

    // The phase search ignores the cap and still sees the 12:00 low
    let label = phase::classify(
        &day,
        NaiveDate::from_ymd_opt(2025, 7, 24).unwrap(),
        Utc.with_ymd_and_hms(2025, 7, 24, 11, 0, 0).unwrap(),
        &config.phase,
        &opts,
    );
    assert_eq!(label, PhaseLabel::BeforeLow);
}

/// Test that an invalid config file falls back to defaults instead of failing.
#[test]
fn invalid_config_file_uses_defaults() {
    let temp_file = NamedTempFile::new().expect("Should create temp file");
    fs::write(temp_file.path(), "this is [not toml").expect("Should write config file");

    let config = Config::load_from_path(temp_file.path());
    assert_eq!(config.cache.ttl_days, 7);
    assert_eq!(config.extract_options().max_per_kind, Some(2));
}
