//! # Tide Phase Classification
//!
//! Answers "what is the tide doing at this instant" with a coarse label such as
//! "just turned rising" or "about to peak". The local trend comes from the sample
//! nearest the query; the label is then refined by how close the nearest high or
//! low water is, using the uncapped extrema search.

use crate::extrema::{extract_normalized, ExtractOptions, Trend};
use crate::series::{self, DaySeries};
use crate::{ExtremeKind, NormalizedPoint, TideExtreme, TidePoint};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Distances (minutes) that turn a plain rising/falling label into a more
/// specific one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseWindows {
    pub after_low_min: i64,
    pub before_high_min: i64,
    pub after_high_min: i64,
    pub before_low_min: i64,
}

impl Default for PhaseWindows {
    fn default() -> Self {
        Self {
            after_low_min: 60,
            before_high_min: 90,
            after_high_min: 60,
            before_low_min: 90,
        }
    }
}

/// Qualitative tide phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseLabel {
    /// Not enough data to say
    Unknown,
    /// Rising, shortly after low water
    RisingStart,
    /// Rising, high water is close
    BeforeHigh,
    Rising,
    /// Falling, shortly after high water
    FallingStart,
    /// Falling, low water is close
    BeforeLow,
    Falling,
    /// Slack, high water is the nearer event
    NearHigh,
    /// Slack, low water is the nearer event
    NearLow,
    /// Slack with no nearer event either way
    Stalled,
}

impl PhaseLabel {
    pub fn describe(&self) -> &'static str {
        match self {
            PhaseLabel::Unknown => "unknown",
            PhaseLabel::RisingStart => "rising, just past low water",
            PhaseLabel::BeforeHigh => "rising, high water soon",
            PhaseLabel::Rising => "rising",
            PhaseLabel::FallingStart => "falling, just past high water",
            PhaseLabel::BeforeLow => "falling, low water soon",
            PhaseLabel::Falling => "falling",
            PhaseLabel::NearHigh => "slack near high water",
            PhaseLabel::NearLow => "slack near low water",
            PhaseLabel::Stalled => "slack",
        }
    }
}

impl fmt::Display for PhaseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Classify the tide phase at `instant` from one day of raw points.
///
/// `anchor` is the calendar day the points belong to; `opts` supplies the flat
/// epsilon and the UTC offset (its per-kind cap is ignored, the search is always
/// uncapped). Fewer than two usable points give [`PhaseLabel::Unknown`].
pub fn classify(
    series: &[TidePoint],
    anchor: NaiveDate,
    instant: DateTime<Utc>,
    windows: &PhaseWindows,
    opts: &ExtractOptions,
) -> PhaseLabel {
    let day = DaySeries::from_points(series::normalize_onto(series, anchor, opts.utc_offset));
    if day.len() < 2 {
        return PhaseLabel::Unknown;
    }
    let Some(query) = series::minutes_since_midnight(instant, anchor, opts.utc_offset) else {
        return PhaseLabel::Unknown;
    };

    let uncapped = ExtractOptions {
        max_per_kind: None,
        ..*opts
    };
    let extrema = extract_normalized(day.points(), &uncapped);

    classify_minute(day.points(), &extrema, query, windows, opts.eps_cm)
}

fn classify_minute(
    points: &[NormalizedPoint],
    extrema: &[TideExtreme],
    query: i64,
    windows: &PhaseWindows,
    eps_cm: f64,
) -> PhaseLabel {
    let Some(nearest) = points
        .iter()
        .enumerate()
        .min_by_key(|(_, p)| (p.minute_of_day as i64 - query).abs())
        .map(|(i, _)| i)
    else {
        return PhaseLabel::Unknown;
    };

    let before = points[nearest.saturating_sub(1)];
    let after = points[(nearest + 1).min(points.len() - 1)];
    let trend = Trend::of(after.height_cm - before.height_cm, eps_cm);

    let since = |kind| preceding(extrema, kind, query).map(|e| query - e.minute_of_day as i64);
    let until = |kind| following(extrema, kind, query).map(|e| e.minute_of_day as i64 - query);

    match trend {
        Trend::Rising => {
            if since(ExtremeKind::Low).is_some_and(|m| m <= windows.after_low_min) {
                PhaseLabel::RisingStart
            } else if until(ExtremeKind::High).is_some_and(|m| m <= windows.before_high_min) {
                PhaseLabel::BeforeHigh
            } else {
                PhaseLabel::Rising
            }
        }
        Trend::Falling => {
            if since(ExtremeKind::High).is_some_and(|m| m <= windows.after_high_min) {
                PhaseLabel::FallingStart
            } else if until(ExtremeKind::Low).is_some_and(|m| m <= windows.before_low_min) {
                PhaseLabel::BeforeLow
            } else {
                PhaseLabel::Falling
            }
        }
        Trend::Flat => {
            let high = nearest_distance(extrema, ExtremeKind::High, query);
            let low = nearest_distance(extrema, ExtremeKind::Low, query);
            match (high, low) {
                (Some(h), Some(l)) if h < l => PhaseLabel::NearHigh,
                (Some(h), Some(l)) if l < h => PhaseLabel::NearLow,
                (Some(_), None) => PhaseLabel::NearHigh,
                (None, Some(_)) => PhaseLabel::NearLow,
                _ => PhaseLabel::Stalled,
            }
        }
    }
}

fn preceding(extrema: &[TideExtreme], kind: ExtremeKind, query: i64) -> Option<&TideExtreme> {
    extrema
        .iter()
        .rev()
        .find(|e| e.kind == kind && e.minute_of_day as i64 <= query)
}

fn following(extrema: &[TideExtreme], kind: ExtremeKind, query: i64) -> Option<&TideExtreme> {
    extrema
        .iter()
        .find(|e| e.kind == kind && e.minute_of_day as i64 >= query)
}

fn nearest_distance(extrema: &[TideExtreme], kind: ExtremeKind, query: i64) -> Option<i64> {
    extrema
        .iter()
        .filter(|e| e.kind == kind)
        .map(|e| (e.minute_of_day as i64 - query).abs())
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn anchor() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 24).unwrap()
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 24, hour, minute, 0).unwrap()
    }

    /// High water at 06:00, low at 12:00, high at 18:00, with a dense stretch
    /// just after the low.
    fn semidiurnal_day() -> Vec<TidePoint> {
        [
            ("00:00", 100.0),
            ("03:00", 160.0),
            ("06:00", 200.0),
            ("09:00", 120.0),
            ("12:00", 20.0),
            ("12:30", 25.0),
            ("13:00", 35.0),
            ("15:00", 90.0),
            ("18:00", 180.0),
            ("21:00", 150.0),
            ("24:00", 100.0),
        ]
        .iter()
        .map(|(t, h)| TidePoint::at_clock(*t, *h))
        .collect()
    }

    fn label_at(series: &[TidePoint], hour: u32, minute: u32) -> PhaseLabel {
        classify(
            series,
            anchor(),
            at(hour, minute),
            &PhaseWindows::default(),
            &ExtractOptions::default(),
        )
    }

    #[test]
    fn thirty_minutes_after_low_is_rising_start() {
        assert_eq!(label_at(&semidiurnal_day(), 12, 30), PhaseLabel::RisingStart);
    }

    #[test]
    fn rising_labels_follow_priority() {
        let day = semidiurnal_day();
        assert_eq!(label_at(&day, 17, 0), PhaseLabel::BeforeHigh);
        assert_eq!(label_at(&day, 14, 0), PhaseLabel::Rising);
    }

    #[test]
    fn falling_labels_follow_priority() {
        let day = semidiurnal_day();
        assert_eq!(label_at(&day, 6, 30), PhaseLabel::FallingStart);
        assert_eq!(label_at(&day, 11, 0), PhaseLabel::BeforeLow);
        assert_eq!(label_at(&day, 8, 30), PhaseLabel::Falling);
    }

    #[test]
    fn too_few_points_is_unknown() {
        let one = vec![TidePoint::at_clock("06:00", 100.0)];
        assert_eq!(label_at(&one, 6, 0), PhaseLabel::Unknown);
        assert_eq!(label_at(&[], 6, 0), PhaseLabel::Unknown);
    }

    #[test]
    fn two_points_still_give_a_trend() {
        let two = vec![
            TidePoint::at_clock("06:00", 100.0),
            TidePoint::at_clock("07:00", 150.0),
        ];
        assert_eq!(label_at(&two, 6, 30), PhaseLabel::Rising);
    }

    #[test]
    fn slack_water_picks_the_nearer_event() {
        let plateau: Vec<TidePoint> = [(0, 0.0), (300, 100.0), (360, 100.5), (420, 100.2), (720, 0.0), (1440, 0.0)]
            .iter()
            .map(|(m, h)| TidePoint::at_clock(series::format_clock(*m), *h))
            .collect();
        assert_eq!(label_at(&plateau, 6, 0), PhaseLabel::NearHigh);

        let trough: Vec<TidePoint> = plateau
            .iter()
            .map(|p| TidePoint { height_cm: -p.height_cm, ..p.clone() })
            .collect();
        assert_eq!(label_at(&trough, 6, 0), PhaseLabel::NearLow);
    }

    #[test]
    fn slack_midway_between_events_is_stalled() {
        let day: Vec<TidePoint> = [(0, 0.0), (400, 100.0), (550, 50.0), (600, 50.3), (650, 50.1), (800, 0.0), (1440, 100.0)]
            .iter()
            .map(|(m, h)| TidePoint::at_clock(series::format_clock(*m), *h))
            .collect();
        assert_eq!(label_at(&day, 10, 0), PhaseLabel::Stalled);

        let flat: Vec<TidePoint> = ["00:00", "08:00", "16:00"]
            .iter()
            .map(|t| TidePoint::at_clock(*t, 42.0))
            .collect();
        assert_eq!(label_at(&flat, 12, 0), PhaseLabel::Stalled);
    }

    #[test]
    fn labels_describe_themselves() {
        assert_eq!(PhaseLabel::BeforeHigh.to_string(), "rising, high water soon");
        assert_eq!(PhaseLabel::Unknown.describe(), "unknown");
    }
}
