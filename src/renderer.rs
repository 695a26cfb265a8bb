//! # Tide Day Rendering
//!
//! Renders one cached tide day as an ASCII chart for the terminal: the curve
//! across 24 hours, the high/low waters marked `H` and `L`, a "now" column, and
//! a banner when the data came from an expired cache entry.
//!
//! The renderer builds a `String` and never prints, so the CLI decides where the
//! chart goes and tests can inspect it directly.

use crate::phase::PhaseLabel;
use crate::series::{self, MINUTES_PER_DAY};
use crate::{ExtremeKind, NormalizedPoint, TideExtreme};
use chrono::NaiveDate;

const ROWS: usize = 12;
/// One column per half hour
const COLUMNS: usize = 48;
const Y_AXIS_WIDTH: usize = 5; // Space for Y-axis labels

/// Everything needed to draw one day.
#[derive(Clone, Debug)]
pub struct DayChart<'a> {
    pub title: &'a str,
    pub date: NaiveDate,
    pub points: &'a [NormalizedPoint],
    pub extrema: &'a [TideExtreme],
    /// Minute of the day to mark as "now", if it falls on this day
    pub now_minute: Option<i64>,
    pub phase: Option<PhaseLabel>,
    pub tide_name: Option<&'a str>,
    /// Data was served from an expired entry or nothing could be fetched
    pub stale: bool,
}

/// Format a height for labels and listings.
fn format_height(height_cm: f64) -> String {
    format!("{:.0} cm", height_cm)
}

fn column_of(minute_of_day: i64) -> usize {
    let scaled = minute_of_day * COLUMNS as i64 / MINUTES_PER_DAY as i64;
    scaled.clamp(0, COLUMNS as i64 - 1) as usize
}

/// Render a tide day to ASCII.
pub fn draw_ascii(chart: &DayChart) -> String {
    let mut out = String::new();

    if chart.stale {
        out.push_str("⚠ OFFLINE: showing cached data, may be out of date\n\n");
    }

    out.push_str(&format!("{}  {}", chart.title, chart.date.format("%Y-%m-%d")));
    if let Some(name) = chart.tide_name {
        out.push_str(&format!("  ({})", name));
    }
    out.push('\n');

    if chart.points.is_empty() {
        out.push_str("No tide data for this day\n");
        return out;
    }

    let (min_cm, max_cm) = chart
        .points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), p| {
            (min.min(p.height_cm), max.max(p.height_cm))
        });
    let range = max_cm - min_cm;

    let row_of = |height_cm: f64| {
        if range <= f64::EPSILON {
            return ROWS / 2;
        }
        let normalized = ((height_cm - min_cm) / range).clamp(0.0, 1.0);
        ((1.0 - normalized) * (ROWS as f64 - 1.0)).round() as usize
    };

    let mut grid = vec![vec![' '; COLUMNS + Y_AXIS_WIDTH]; ROWS];

    for (row, line) in grid.iter_mut().enumerate() {
        let label = match row {
            0 => format!("{:>4.0}", max_cm),
            r if r == ROWS - 1 => format!("{:>4.0}", min_cm),
            _ => String::new(),
        };
        for (i, ch) in label.chars().take(Y_AXIS_WIDTH - 1).enumerate() {
            line[i] = ch;
        }
        line[Y_AXIS_WIDTH - 1] = '│';
    }

    if let Some(now) = chart.now_minute.filter(|m| (0..=MINUTES_PER_DAY as i64).contains(m)) {
        let column = column_of(now) + Y_AXIS_WIDTH;
        for line in grid.iter_mut() {
            line[column] = '¦';
        }
    }

    for point in chart.points {
        let column = column_of(point.minute_of_day as i64) + Y_AXIS_WIDTH;
        grid[row_of(point.height_cm)][column] = '•';
    }

    // Markers go last so they stay visible over samples
    for extreme in chart.extrema {
        let column = column_of(extreme.minute_of_day as i64) + Y_AXIS_WIDTH;
        grid[row_of(extreme.height_cm)][column] = match extreme.kind {
            ExtremeKind::High => 'H',
            ExtremeKind::Low => 'L',
        };
    }

    for line in grid {
        let text: String = line.into_iter().collect();
        out.push_str(text.trim_end());
        out.push('\n');
    }

    // Tick every three hours, labelled below
    let padding = " ".repeat(Y_AXIS_WIDTH);
    let ticks: String = (0..COLUMNS)
        .map(|i| if i % 6 == 0 { '|' } else { ' ' })
        .collect();
    out.push_str(&format!("{}{}\n", padding, ticks));
    let mut labels = vec![' '; COLUMNS + 2];
    for hour in (0..=24).step_by(6) {
        let column = (hour * COLUMNS / 24).min(COLUMNS);
        for (i, ch) in format!("{:02}", hour).chars().enumerate() {
            labels[column + i] = ch;
        }
    }
    let labels: String = labels.into_iter().collect();
    out.push_str(&format!("{}{}\n", padding, labels.trim_end()));

    if !chart.extrema.is_empty() {
        out.push('\n');
        for extreme in chart.extrema {
            let kind = match extreme.kind {
                ExtremeKind::High => "High",
                ExtremeKind::Low => "Low ",
            };
            out.push_str(&format!(
                "  {} {}  {}\n",
                kind,
                extreme.clock(),
                format_height(extreme.height_cm)
            ));
        }
    }

    if let (Some(now), Some(phase)) = (chart.now_minute, chart.phase) {
        let clock = series::format_clock(now.clamp(0, MINUTES_PER_DAY as i64) as i32);
        out.push_str(&format!("\nNow {}: {}\n", clock, phase));
    }

    out
}
