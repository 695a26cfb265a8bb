//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the tide-config.toml file.
//! It provides a centralized way to configure the provider station, the upstream
//! endpoint, cache policy and the extrema/phase tuning.
//!
//! Every field has a default, so a partial file only overrides what it names.

use crate::extrema::ExtractOptions;
use crate::phase::PhaseWindows;
use crate::Station;
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "tide-config.toml";

/// Application configuration loaded from tide-config.toml
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Provider station configuration
    pub station: StationConfig,
    /// Upstream tide provider endpoint
    pub provider: ProviderConfig,
    /// Cache location and age policy
    pub cache: CacheConfig,
    /// High/low extraction tuning
    pub extrema: ExtremaConfig,
    /// Phase label windows
    pub phase: PhaseWindows,
}

/// Provider station configuration
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct StationConfig {
    /// Provider region code
    pub pc: String,
    /// Provider harbour code
    pub hc: String,
    /// Human-readable station name for reference
    pub name: String,
    /// Local UTC offset in minutes, used to place epoch-stamped samples
    pub utc_offset_minutes: i32,
}

/// Upstream endpoint configuration
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the day endpoint; query parameters are appended
    pub base_url: String,
    /// Upper bound on one upstream request, in seconds
    pub timeout_secs: u64,
}

/// Cache configuration
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// JSON file holding the cached days
    pub path: PathBuf,
    /// Days before a cached day counts as expired
    pub ttl_days: i64,
    /// Default age for `purge`
    pub purge_after_days: i64,
}

/// Extrema extraction tuning
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtremaConfig {
    /// Height changes at or below this are flat
    pub eps_cm: f64,
    /// Same-kind events this close are merged
    pub merge_window_min: i32,
    /// Events of each kind shown on the chart
    pub max_per_kind: usize,
}

impl Default for StationConfig {
    fn default() -> Self {
        StationConfig {
            pc: "DT_0001".to_string(),
            hc: "12".to_string(),
            name: "Incheon".to_string(),
            utc_offset_minutes: 9 * 60,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            // Local forwarding proxy in front of the provider
            base_url: "http://127.0.0.1:8787/tide".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            path: PathBuf::from("/tmp/tide_almanac_cache.json"),
            ttl_days: 7,
            purge_after_days: 30,
        }
    }
}

impl Default for ExtremaConfig {
    fn default() -> Self {
        ExtremaConfig {
            eps_cm: 1.0,
            merge_window_min: 5,
            max_per_kind: 2,
        }
    }
}

impl StationConfig {
    pub fn station(&self) -> Station {
        Station::new(self.pc.clone(), self.hc.clone())
    }

    /// Configured offset; out-of-range values fall back to UTC.
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| {
            warn!(minutes = self.utc_offset_minutes, "invalid UTC offset, using UTC");
            Utc.fix()
        })
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Config {
    /// Load configuration from tide-config.toml file
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!(station = %config.station.name, "loaded configuration");
                    config
                }
                Err(e) => {
                    warn!(error = %e, "invalid config file format, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                info!(path = %path.as_ref().display(), "no config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Extraction options for chart display (capped per kind).
    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            eps_cm: self.extrema.eps_cm,
            merge_window_min: self.extrema.merge_window_min,
            max_per_kind: Some(self.extrema.max_per_kind),
            utc_offset: self.station.utc_offset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.station.pc, "DT_0001");
        assert_eq!(config.station.utc_offset_minutes, 540);
        assert_eq!(config.cache.ttl_days, 7);
        assert_eq!(config.extrema.max_per_kind, 2);
        assert_eq!(config.phase, PhaseWindows::default());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.station.pc, parsed.station.pc);
        assert_eq!(config.cache.path, parsed.cache.path);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let parsed: Config = toml::from_str(
            r#"
[station]
pc = "DT_0042"

[phase]
after_low_min = 45
"#,
        )
        .unwrap();
        assert_eq!(parsed.station.pc, "DT_0042");
        assert_eq!(parsed.station.hc, "12");
        assert_eq!(parsed.phase.after_low_min, 45);
        assert_eq!(parsed.phase.before_low_min, 90);
        assert_eq!(parsed.provider.timeout_secs, 10);
    }

    #[test]
    fn test_out_of_range_offset_falls_back_to_utc() {
        let mut config = Config::default();
        config.station.utc_offset_minutes = 100 * 60;
        assert_eq!(config.station.utc_offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let config = Config::load_from_path("/nonexistent/path");
        assert_eq!(config.station.pc, "DT_0001");
    }

    #[test]
    fn test_extract_options_follow_config() {
        let mut config = Config::default();
        config.extrema.eps_cm = 2.5;
        config.station.utc_offset_minutes = -300;
        let opts = config.extract_options();
        assert_eq!(opts.eps_cm, 2.5);
        assert_eq!(opts.max_per_kind, Some(2));
        assert_eq!(opts.utc_offset.local_minus_utc(), -300 * 60);
    }
}
