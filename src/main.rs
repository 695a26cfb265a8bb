//! # Tide Almanac Application Entry Point
//!
//! This binary wires the library together for terminal use: it loads the
//! configuration, builds the HTTP provider, the JSON file store and the cache,
//! then runs one subcommand.
//!
//! - `day`: show a station's day (chart, high/low waters, current phase)
//! - `stats`, `list`, `delete`, `clear`, `purge`: inspect and maintain the cache
//!
//! Logs go to stderr and are filtered with `RUST_LOG`; stdout carries only the
//! command's output.

// Test modules
#[cfg(test)]
mod tests;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tide_almanac_lib::cache::{CacheLookupResult, NetworkFlag, Provenance, TideCache};
use tide_almanac_lib::cache_store::JsonFileStore;
use tide_almanac_lib::config::Config;
use tide_almanac_lib::renderer::{draw_ascii, DayChart};
use tide_almanac_lib::series::{self, DaySeries, MINUTES_PER_DAY};
use tide_almanac_lib::tide_data::HttpTideProvider;
use tide_almanac_lib::{extrema, phase};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tide-almanac")]
#[command(about = "Cached daily tide curves, high/low waters and tide phase", long_about = None)]
struct Cli {
    /// Configuration file [default: tide-config.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show one day for the configured station
    Day {
        /// Day to show (YYYY-MM-DD), defaults to today at the station
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Override the configured cache TTL
        #[arg(long)]
        ttl_days: Option<i64>,

        /// Never touch the network
        #[arg(long)]
        offline: bool,

        /// Refetch even if the cached day is still fresh
        #[arg(long, conflicts_with = "offline")]
        refresh: bool,

        /// Print JSON instead of the chart
        #[arg(long)]
        json: bool,
    },

    /// Cache entry count, size and age range
    Stats,

    /// Cached days, newest first
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Remove one cached day by key (pc:hc:YYYY-MM-DD)
    Delete { key: String },

    /// Remove every cached day
    Clear,

    /// Remove days fetched more than N days ago
    Purge {
        /// Defaults to the configured purge_after_days
        #[arg(long)]
        days: Option<i64>,
    },
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };

    // Create Tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli.command, config))
}

async fn run(command: Commands, config: Config) -> anyhow::Result<()> {
    let offline = matches!(command, Commands::Day { offline: true, .. });
    let cache = build_cache(&config, !offline).await?;

    match command {
        Commands::Day {
            date,
            ttl_days,
            refresh,
            json,
            ..
        } => {
            let date = date.unwrap_or_else(|| {
                Utc::now()
                    .with_timezone(&config.station.utc_offset())
                    .date_naive()
            });
            let ttl_days = ttl_days.unwrap_or(config.cache.ttl_days);
            show_day(&cache, &config, date, ttl_days, refresh, json).await
        }
        Commands::Stats => {
            let stats = cache.stats().await?;
            println!("entries:  {}", stats.count);
            println!("size:     ~{} bytes", stats.approx_size_bytes);
            if let Some(newest) = stats.newest_fetched_at {
                println!("newest:   {}", newest.to_rfc3339());
            }
            if let Some(oldest) = stats.oldest_fetched_at {
                println!("oldest:   {}", oldest.to_rfc3339());
            }
            Ok(())
        }
        Commands::List { limit } => {
            let now = Utc::now();
            for entry in cache.list(limit).await? {
                println!(
                    "{:<28} {:>4} points  fetched {} ({}h ago)",
                    entry.key,
                    entry.series.len(),
                    entry.fetched_at.format("%Y-%m-%d %H:%M"),
                    entry.age(now).num_hours()
                );
            }
            Ok(())
        }
        Commands::Delete { key } => {
            if cache.delete_by_key(&key).await? {
                println!("deleted {}", key);
            } else {
                println!("no cached day with key {}", key);
            }
            Ok(())
        }
        Commands::Clear => {
            let removed = cache.delete_all().await?;
            println!("removed {} cached days", removed);
            Ok(())
        }
        Commands::Purge { days } => {
            let days = days.unwrap_or(config.cache.purge_after_days);
            let removed = cache.delete_older_than(days).await?;
            println!("removed {} days older than {} days", removed, days);
            Ok(())
        }
    }
}

async fn build_cache(config: &Config, online: bool) -> anyhow::Result<TideCache> {
    let provider = HttpTideProvider::new(&config.provider.base_url, config.provider.timeout())
        .context("building tide provider client")?;
    let store = JsonFileStore::open(&config.cache.path)
        .await
        .with_context(|| format!("opening cache at {}", config.cache.path.display()))?;
    info!(path = %store.path().display(), online, "cache ready");

    Ok(TideCache::new(
        Arc::new(provider),
        Arc::new(store),
        Arc::new(NetworkFlag::new(online)),
    )
    .with_fetch_timeout(config.provider.timeout()))
}

async fn show_day(
    cache: &TideCache,
    config: &Config,
    date: NaiveDate,
    ttl_days: i64,
    refresh: bool,
    as_json: bool,
) -> anyhow::Result<()> {
    let station = config.station.station();
    let lookup = if refresh {
        cache.force_refresh(&station, date).await?
    } else {
        cache.get_day_cached(&station, date, ttl_days).await?
    };

    let opts = config.extract_options();
    let offset = opts.utc_offset;
    let extrema = extrema::extract(&lookup.series, &opts);

    let now = Utc::now();
    let now_minute = series::minutes_since_midnight(now, date, offset)
        .filter(|m| (0..MINUTES_PER_DAY as i64).contains(m));
    let phase = now_minute.map(|_| phase::classify(&lookup.series, date, now, &config.phase, &opts));

    if as_json {
        let output = json!({
            "station": station,
            "date": date,
            "provenance": lookup.provenance,
            "is_stale": lookup.is_stale,
            "tide_name": lookup.tide_name,
            "series": lookup.series,
            "extrema": extrema,
            "phase": phase,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", describe_provenance(&lookup));
    let points = DaySeries::from_points(series::normalize(&lookup.series, offset));
    let chart = DayChart {
        title: &config.station.name,
        date,
        points: points.points(),
        extrema: &extrema,
        now_minute,
        phase,
        tide_name: lookup.tide_name.as_deref(),
        stale: lookup.is_stale,
    };
    print!("{}", draw_ascii(&chart));
    Ok(())
}

fn describe_provenance(lookup: &CacheLookupResult) -> &'static str {
    match (lookup.provenance, lookup.series.is_empty()) {
        (Provenance::Fresh, _) => "source: provider (just fetched)",
        (Provenance::CacheHit, true) if lookup.is_stale => "source: none (offline, nothing cached)",
        (Provenance::CacheHit, _) => "source: cache",
        (Provenance::StaleFallback, _) => "source: cache (expired, offline)",
    }
}
