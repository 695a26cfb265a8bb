//! # Day Series Normalization
//!
//! Resolves the provider's ambiguous time references onto a single day and builds
//! the ordered, de-duplicated series every algorithm in this crate works on.
//!
//! ## Time Resolution
//! 1. **Clock string first**: `"HH:MM"` (also `"H:MM"`, `"HH:MM:SS"`, or a
//!    `"YYYY-MM-DD HH:MM"` stamp whose clock part is used). `"24:00"` is minute 1440.
//! 2. **Epoch fallback**: seconds or milliseconds, decided by [`epoch_to_utc`],
//!    shifted to local wall-clock time with a fixed UTC offset.
//!
//! ## Series Shape
//! - Strictly increasing `minute_of_day`, duplicates resolved last-write-wins
//! - Optional flat boundary points at minute 0 and 1440 so the day edges never
//!   look like turning points

use crate::{NormalizedPoint, TidePoint};
use chrono::{DateTime, FixedOffset, NaiveDate, Timelike, Utc};

/// Minutes in a day; also the minute of the closing boundary point.
pub const MINUTES_PER_DAY: i32 = 1440;

/// Epoch values below this are seconds, values at or above it are milliseconds.
pub const EPOCH_MILLIS_THRESHOLD: f64 = 1e12;

/// Convert a provider epoch of ambiguous unit to a UTC instant.
///
/// Values `< 1e12` are seconds, anything else is milliseconds. `1e12` seconds is
/// the year 33658, so no real second-based stamp crosses the threshold, while
/// millisecond stamps crossed it in 2001.
pub fn epoch_to_utc(epoch: f64) -> Option<DateTime<Utc>> {
    if !epoch.is_finite() {
        return None;
    }
    let millis = if epoch < EPOCH_MILLIS_THRESHOLD {
        epoch * 1000.0
    } else {
        epoch
    };
    DateTime::from_timestamp_millis(millis.round() as i64)
}

/// Parse a wall-clock string into minutes since midnight.
pub fn parse_clock(raw: &str) -> Option<i32> {
    let clock = raw
        .trim()
        .rsplit(|c: char| c == ' ' || c == 'T')
        .next()?;

    let mut parts = clock.split(':');
    let hour: i32 = parts.next()?.trim().parse().ok()?;
    let minute: i32 = parts.next()?.trim().parse().ok()?;
    if let Some(seconds) = parts.next() {
        let seconds: i32 = seconds.trim().parse().ok()?;
        if !(0..60).contains(&seconds) {
            return None;
        }
    }
    if parts.next().is_some() {
        return None;
    }

    match (hour, minute) {
        (24, 0) => Some(MINUTES_PER_DAY),
        (0..=23, 0..=59) => Some(hour * 60 + minute),
        _ => None,
    }
}

/// Render minutes since midnight as `"HH:MM"`.
pub fn format_clock(minute_of_day: i32) -> String {
    let minute = minute_of_day.clamp(0, MINUTES_PER_DAY);
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// Minute of the local day for a raw point, clock string first.
pub fn minute_of_day(point: &TidePoint, utc_offset: FixedOffset) -> Option<i32> {
    if let Some(minute) = point.time.as_deref().and_then(parse_clock) {
        return Some(minute);
    }
    let local = epoch_to_utc(point.epoch?)?.with_timezone(&utc_offset);
    Some((local.hour() * 60 + local.minute()) as i32)
}

/// Minute of a raw point relative to the local midnight of `anchor`.
///
/// Clock strings are taken as times on the anchor day. Epochs are measured from
/// the anchor's midnight and dropped when they fall outside `[0, 1440]`.
pub fn minute_on_day(point: &TidePoint, anchor: NaiveDate, utc_offset: FixedOffset) -> Option<i32> {
    if let Some(minute) = point.time.as_deref().and_then(parse_clock) {
        return Some(minute);
    }
    let minute = minutes_since_midnight(epoch_to_utc(point.epoch?)?, anchor, utc_offset)?;
    (0..=MINUTES_PER_DAY as i64)
        .contains(&minute)
        .then_some(minute as i32)
}

/// Signed minutes between the local midnight of `anchor` and `instant`.
pub fn minutes_since_midnight(
    instant: DateTime<Utc>,
    anchor: NaiveDate,
    utc_offset: FixedOffset,
) -> Option<i64> {
    let local = instant.with_timezone(&utc_offset).naive_local();
    let midnight = anchor.and_hms_opt(0, 0, 0)?;
    Some((local - midnight).num_seconds().div_euclid(60))
}

/// Normalize raw points by their own time of day, dropping unresolvable ones.
pub fn normalize(points: &[TidePoint], utc_offset: FixedOffset) -> Vec<NormalizedPoint> {
    points
        .iter()
        .filter(|p| p.height_cm.is_finite())
        .filter_map(|p| Some(NormalizedPoint::new(minute_of_day(p, utc_offset)?, p.height_cm)))
        .collect()
}

/// Normalize raw points onto `anchor`, dropping unresolvable or off-day ones.
pub fn normalize_onto(
    points: &[TidePoint],
    anchor: NaiveDate,
    utc_offset: FixedOffset,
) -> Vec<NormalizedPoint> {
    points
        .iter()
        .filter(|p| p.height_cm.is_finite())
        .filter_map(|p| {
            Some(NormalizedPoint::new(
                minute_on_day(p, anchor, utc_offset)?,
                p.height_cm,
            ))
        })
        .collect()
}

/// Ordered, de-duplicated samples of one day.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DaySeries {
    points: Vec<NormalizedPoint>,
    synthetic_start: bool,
    synthetic_end: bool,
}

impl DaySeries {
    /// Sort by minute and collapse duplicate minutes; the later point in input
    /// order wins.
    pub fn from_points(points: impl IntoIterator<Item = NormalizedPoint>) -> Self {
        let mut sorted: Vec<NormalizedPoint> = points.into_iter().collect();
        // Stable sort keeps input order within a minute, so the last one wins below.
        sorted.sort_by_key(|p| p.minute_of_day);

        let mut points: Vec<NormalizedPoint> = Vec::with_capacity(sorted.len());
        for point in sorted {
            match points.last_mut() {
                Some(last) if last.minute_of_day == point.minute_of_day => *last = point,
                _ => points.push(point),
            }
        }

        Self {
            points,
            synthetic_start: false,
            synthetic_end: false,
        }
    }

    /// Pad the series with flat points at minute 0 and 1440 when the real samples
    /// stop short of the day edges.
    pub fn with_day_boundaries(mut self) -> Self {
        if let Some(first) = self.points.first().copied() {
            if first.minute_of_day > 0 {
                self.points
                    .insert(0, NormalizedPoint::new(0, first.height_cm));
                self.synthetic_start = true;
            }
        }
        if let Some(last) = self.points.last().copied() {
            if last.minute_of_day < MINUTES_PER_DAY {
                self.points
                    .push(NormalizedPoint::new(MINUTES_PER_DAY, last.height_cm));
                self.synthetic_end = true;
            }
        }
        self
    }

    /// Samples in strictly increasing minute order, boundary points included.
    ///
    /// # Example
    /// ```
    /// use tide_almanac_lib::series::DaySeries;
    /// use tide_almanac_lib::NormalizedPoint;
    ///
    /// let day = DaySeries::from_points([
    ///     NormalizedPoint::new(720, 40.0),
    ///     NormalizedPoint::new(360, 120.0),
    ///     NormalizedPoint::new(720, 45.0),
    /// ]);
    /// let minutes: Vec<i32> = day.points().iter().map(|p| p.minute_of_day).collect();
    /// assert_eq!(minutes, vec![360, 720]);
    /// assert_eq!(day.points()[1].height_cm, 45.0);
    /// ```
    pub fn points(&self) -> &[NormalizedPoint] {
        &self.points
    }

    /// Number of points, boundary points included.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when no usable sample survived normalization.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// True when the minute-0 point was synthesized.
    pub fn has_synthetic_start(&self) -> bool {
        self.synthetic_start
    }

    /// True when the minute-1440 point was synthesized.
    pub fn has_synthetic_end(&self) -> bool {
        self.synthetic_end
    }
}
