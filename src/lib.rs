//! # Tide Almanac Core Library
//!
//! This library turns the daily tide curve published by an upstream provider into
//! something a small app can lean on: a persistent day cache that keeps working
//! offline, the day's high and low waters, and a qualitative "what is the tide
//! doing right now" label.
//!
//! ## Design Philosophy
//!
//! ### Approximate, not authoritative
//! The provider publishes a pre-computed curve of irregular samples. Nothing here
//! predicts tides; high/low events are *reconstructed* from slope reversals in
//! those samples, so they are close to, but not guaranteed to match, official
//! tables.
//!
//! ### Cache first, network second
//! Every day lookup goes through [`cache::TideCache`]:
//! 1. **Fresh entry**: served straight from the store
//! 2. **Expired entry, online**: refetched and replaced wholesale
//! 3. **Expired entry, offline**: served as stale instead of failing
//! 4. **No entry, offline**: an empty day, never an error
//!
//! A failed fetch never touches what is already cached.
//!
//! ### Pure algorithms
//! [`extrema::extract`] and [`phase::classify`] are pure functions over a day's
//! raw points. The display path and the phase path share one parameterized
//! extrema search; only the per-kind cap differs.
//!
//! ## Core Types
//!
//! - [`TidePoint`]: a raw sample with an ambiguous time reference
//! - [`NormalizedPoint`]: a sample resolved to a minute of the day
//! - [`Station`]: the provider's `pc`/`hc` station codes
//! - [`TideExtreme`]: a reconstructed high or low water

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod cache;
pub mod cache_store;
pub mod config;
pub mod extrema;
pub mod phase;
pub mod renderer;
pub mod series;
pub mod tide_data;

/// One raw observation as published by the provider.
///
/// The time reference is either a local wall-clock string (`"HH:MM"`) or an epoch
/// value whose unit is ambiguous (see [`series::epoch_to_utc`]). At least one of
/// the two must resolve for the point to take part in any computation; points
/// where neither does are dropped during normalization.
///
/// # Example
/// ```
/// use tide_almanac_lib::TidePoint;
///
/// let morning = TidePoint::at_clock("06:00", 120.0);
/// assert_eq!(morning.time.as_deref(), Some("06:00"));
/// assert!(morning.epoch.is_none());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TidePoint {
    /// Local clock string, `"HH:MM"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Epoch in seconds or milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<f64>,
    /// Tide height in centimetres
    pub height_cm: f64,
}

impl TidePoint {
    /// Point with a clock-string time reference.
    pub fn at_clock(time: impl Into<String>, height_cm: f64) -> Self {
        Self {
            time: Some(time.into()),
            epoch: None,
            height_cm,
        }
    }

    /// Point with an epoch time reference (seconds or milliseconds).
    pub fn at_epoch(epoch: f64, height_cm: f64) -> Self {
        Self {
            time: None,
            epoch: Some(epoch),
            height_cm,
        }
    }

    /// Lenient conversion from one element of the provider's tide array.
    ///
    /// The provider is loose about field names and types: heights show up as
    /// numbers or numeric strings, and the clock field goes by several names.
    /// Returns `None` when there is no usable height or no time field at all.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;

        let height_cm = ["height_cm", "tph_level", "level", "height"]
            .iter()
            .find_map(|name| obj.get(*name).and_then(number_like))?;

        let time = ["time", "tph_time", "hhmm"]
            .iter()
            .find_map(|name| obj.get(*name).and_then(Value::as_str))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let epoch = ["epoch", "timestamp", "ts"]
            .iter()
            .find_map(|name| obj.get(*name).and_then(number_like));

        if time.is_none() && epoch.is_none() {
            return None;
        }

        Some(Self {
            time,
            epoch,
            height_cm,
        })
    }
}

fn number_like(value: &Value) -> Option<f64> {
    let number: f64 = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    // NaN and infinities cannot survive a JSON round trip
    number.is_finite().then_some(number)
}

/// A sample resolved onto the day: minutes since local midnight (0..=1440).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    /// Minutes since local midnight
    pub minute_of_day: i32,
    /// Tide height in centimetres
    pub height_cm: f64,
}

impl NormalizedPoint {
    /// A sample at `minute_of_day` minutes after local midnight.
    pub fn new(minute_of_day: i32, height_cm: f64) -> Self {
        Self {
            minute_of_day,
            height_cm,
        }
    }
}

/// Provider station codes selecting one tide-prediction region.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Station {
    pub pc: String,
    pub hc: String,
}

impl Station {
    /// Station from the provider's region (`pc`) and harbour (`hc`) codes.
    ///
    /// # Example
    /// ```
    /// use tide_almanac_lib::Station;
    ///
    /// let incheon = Station::new("DT_0001", "12");
    /// assert_eq!(incheon.pc, "DT_0001");
    /// ```
    pub fn new(pc: impl Into<String>, hc: impl Into<String>) -> Self {
        Self {
            pc: pc.into(),
            hc: hc.into(),
        }
    }

    /// Cache key for one day at this station: `"{pc}:{hc}:{YYYY-MM-DD}"`.
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use tide_almanac_lib::Station;
    ///
    /// let day = NaiveDate::from_ymd_opt(2025, 7, 24).unwrap();
    /// assert_eq!(Station::new("DT_0001", "12").cache_key(day), "DT_0001:12:2025-07-24");
    /// ```
    pub fn cache_key(&self, day: NaiveDate) -> String {
        format!("{}:{}:{}", self.pc, self.hc, day.format("%Y-%m-%d"))
    }
}

/// High or low water.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtremeKind {
    High,
    Low,
}

/// A reconstructed high or low water.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TideExtreme {
    pub kind: ExtremeKind,
    /// Minutes since local midnight
    pub minute_of_day: i32,
    /// Tide height in centimetres
    pub height_cm: f64,
}

impl TideExtreme {
    /// `"HH:MM"` rendering of the event time.
    pub fn clock(&self) -> String {
        series::format_clock(self.minute_of_day)
    }
}
