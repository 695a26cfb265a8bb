//! # High/Low Water Extraction
//!
//! Reconstructs high and low waters from a day of irregular, noisy samples. One
//! parameterized search serves both the chart (capped to the first two of each
//! kind) and the phase classifier (uncapped).
//!
//! ## Pipeline
//! 1. **Normalize**: clock string first, epoch fallback; unresolvable points dropped
//! 2. **Order**: sort by minute, duplicate minutes last-write-wins
//! 3. **Guard**: fewer than three samples cannot show a reversal, so nothing is found
//! 4. **Pad**: flat boundary points at 00:00 and 24:00 when the samples stop short
//! 5. **Slopes**: height change per consecutive pair; `|Δh| <= eps_cm` counts as flat,
//!    and a flat run carries the last non-flat slope forward
//! 6. **Reversals**: rising-then-falling is a High, falling-then-rising a Low
//! 7. **Merge**: same-kind events within `merge_window_min` collapse to the more
//!    extreme one
//! 8. **Select**: keep the chronologically first `max_per_kind` of each kind
//!
//! ## Day Edges
//! A trend that runs flat into a padded boundary ends there: the sample where the
//! flat run to 24:00 starts is the turning point (rising → High, falling → Low),
//! and symmetrically for a flat run out of a padded 00:00.

use crate::series::{self, DaySeries};
use crate::{ExtremeKind, NormalizedPoint, TideExtreme, TidePoint};
use chrono::{FixedOffset, Offset, Utc};

/// Tuning knobs for [`extract`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtractOptions {
    /// Height changes at or below this many centimetres count as flat
    pub eps_cm: f64,
    /// Same-kind events at most this many minutes apart are merged
    pub merge_window_min: i32,
    /// Cap per kind; `None` keeps every event
    pub max_per_kind: Option<usize>,
    /// Offset used to place epoch-stamped samples on the local clock
    pub utc_offset: FixedOffset,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            eps_cm: 1.0,
            merge_window_min: 5,
            max_per_kind: Some(2),
            utc_offset: Utc.fix(),
        }
    }
}

impl ExtractOptions {
    /// Defaults with no per-kind cap, as used for phase classification.
    pub fn unbounded() -> Self {
        Self {
            max_per_kind: None,
            ..Self::default()
        }
    }

    pub fn with_utc_offset(mut self, utc_offset: FixedOffset) -> Self {
        self.utc_offset = utc_offset;
        self
    }
}

/// Direction of the curve between two samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trend {
    Rising,
    Falling,
    Flat,
}

impl Trend {
    /// Classify a height change, treating `|delta_cm| <= eps_cm` as flat.
    pub fn of(delta_cm: f64, eps_cm: f64) -> Self {
        if delta_cm.abs() <= eps_cm {
            Trend::Flat
        } else if delta_cm > 0.0 {
            Trend::Rising
        } else {
            Trend::Falling
        }
    }

    fn reversed(self) -> Self {
        match self {
            Trend::Rising => Trend::Falling,
            Trend::Falling => Trend::Rising,
            Trend::Flat => Trend::Flat,
        }
    }
}

/// Extract high and low waters from raw provider points.
///
/// Never fails: too few usable points simply yield an empty list.
///
/// # Example
/// ```
/// use tide_almanac_lib::extrema::{extract, ExtractOptions};
/// use tide_almanac_lib::{ExtremeKind, TidePoint};
///
/// let day = vec![
///     TidePoint::at_clock("00:00", 50.0),
///     TidePoint::at_clock("06:00", 120.0),
///     TidePoint::at_clock("12:00", 40.0),
///     TidePoint::at_clock("18:00", 110.0),
/// ];
/// let events = extract(&day, &ExtractOptions::default());
/// assert_eq!(events.len(), 3);
/// assert_eq!(events[0].kind, ExtremeKind::High);
/// assert_eq!(events[0].clock(), "06:00");
/// ```
pub fn extract(points: &[TidePoint], opts: &ExtractOptions) -> Vec<TideExtreme> {
    extract_normalized(&series::normalize(points, opts.utc_offset), opts)
}

/// [`extract`] over points already resolved to minutes of the day.
pub fn extract_normalized(points: &[NormalizedPoint], opts: &ExtractOptions) -> Vec<TideExtreme> {
    let day = DaySeries::from_points(points.iter().copied());
    if day.len() < 3 {
        return Vec::new();
    }
    let day = day.with_day_boundaries();

    let turning = find_turning_points(&day, opts.eps_cm);
    let merged = merge_shoulders(turning, opts.merge_window_min);
    select_per_kind(merged, opts.max_per_kind)
}

/// Slope-reversal scan with flat carry-forward.
fn find_turning_points(day: &DaySeries, eps_cm: f64) -> Vec<TideExtreme> {
    let points = day.points();
    let mut found = Vec::new();

    // Last non-flat slope seen, and where the current flat run began.
    let mut carried: Option<Trend> = None;
    let mut flat_from: Option<usize> = None;

    for (i, pair) in points.windows(2).enumerate() {
        let slope = Trend::of(pair[1].height_cm - pair[0].height_cm, eps_cm);
        if slope == Trend::Flat {
            flat_from.get_or_insert(i);
            continue;
        }

        match carried {
            Some(before) if before != slope && i > 0 => {
                found.push(turning_point(points[i], before));
            }
            None if i > 0 && flat_from == Some(0) && day.has_synthetic_start() => {
                found.push(turning_point(points[i], slope.reversed()));
            }
            _ => {}
        }

        carried = Some(slope);
        flat_from = None;
    }

    if day.has_synthetic_end() {
        if let (Some(before), Some(start)) = (carried, flat_from) {
            found.push(turning_point(points[start], before));
        }
    }

    found
}

fn turning_point(point: NormalizedPoint, trend_before: Trend) -> TideExtreme {
    let kind = match trend_before {
        Trend::Falling => ExtremeKind::Low,
        _ => ExtremeKind::High,
    };
    TideExtreme {
        kind,
        minute_of_day: point.minute_of_day,
        height_cm: point.height_cm,
    }
}

/// Collapse same-kind events that sit within `window_min` of the previous kept
/// event of that kind, keeping the more extreme one.
fn merge_shoulders(events: Vec<TideExtreme>, window_min: i32) -> Vec<TideExtreme> {
    let mut kept: Vec<TideExtreme> = Vec::with_capacity(events.len());

    for event in events {
        let previous = kept.iter_mut().rev().find(|e| e.kind == event.kind);
        match previous {
            Some(prev) if event.minute_of_day - prev.minute_of_day <= window_min => {
                let more_extreme = match event.kind {
                    ExtremeKind::High => event.height_cm > prev.height_cm,
                    ExtremeKind::Low => event.height_cm < prev.height_cm,
                };
                if more_extreme {
                    *prev = event;
                }
            }
            _ => kept.push(event),
        }
    }

    kept.sort_by_key(|e| e.minute_of_day);
    kept
}

/// Keep the chronologically first `max_per_kind` events of each kind.
fn select_per_kind(events: Vec<TideExtreme>, max_per_kind: Option<usize>) -> Vec<TideExtreme> {
    let Some(cap) = max_per_kind else {
        return events;
    };

    let (mut highs, mut lows) = (0usize, 0usize);
    events
        .into_iter()
        .filter(|e| {
            let seen = match e.kind {
                ExtremeKind::High => &mut highs,
                ExtremeKind::Low => &mut lows,
            };
            *seen += 1;
            *seen <= cap
        })
        .collect()
}
