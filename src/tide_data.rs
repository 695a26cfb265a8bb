//! # Upstream Tide Data Fetching
//!
//! This module talks to the tide provider: one HTTP GET per station and day, and
//! a parser that digs the day's samples and tide name out of the provider's JSON.
//!
//! ## Data Source
//!
//! ### Request
//! - **Method**: `GET {base_url}`
//! - **Query**: `pc`, `hc` (station codes), `yr`, `mn`, `dy` (date), `rg=day`
//! - **Timeout**: configurable, enforced by the HTTP client
//!
//! ### Response
//! `{"status": bool, "tide": {...}}`, with the sample array in one of two places,
//! tried in order:
//! 1. `tide.tide`: the array itself
//! 2. `tide.chart["YYYY-MM-DD"].tide`: keyed by the requested date
//!
//! The tide name (spring/neap naming) sits at `tide.chart["YYYY-MM-DD"].moon.title`
//! or, failing that, `tide.moon.title`.
//!
//! ## Error Handling
//!
//! - **Transport failure / non-2xx**: [`TideError::Network`]
//! - **Body is not JSON**: [`TideError::Parse`]
//! - **`status: false`**: [`TideError::UpstreamStatus`]
//! - **No samples in either shape**: *not* an error; the day is simply empty
//!
//! Nothing here retries. A retry is an explicit caller action (a forced refresh).

use crate::{Station, TidePoint};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while fetching or caching a tide day.
///
/// The enum is `Clone` because concurrent callers waiting on the same in-flight
/// fetch all receive the same outcome.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TideError {
    /// HTTP request failed (transport error or non-2xx status)
    #[error("network error: {0}")]
    Network(String),

    /// Upstream call did not finish in time
    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),

    /// Response body is not valid JSON
    #[error("invalid JSON from tide provider: {0}")]
    Parse(String),

    /// Provider answered with `status: false`
    #[error("tide provider reported status=false")]
    UpstreamStatus,

    /// A fetch was explicitly requested while the network is unavailable
    #[error("network unavailable")]
    Offline,

    /// Persistent cache store failed
    #[error("cache store: {0}")]
    Store(String),
}

impl From<reqwest::Error> for TideError {
    fn from(err: reqwest::Error) -> Self {
        TideError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for TideError {
    fn from(err: serde_json::Error) -> Self {
        TideError::Parse(err.to_string())
    }
}

/// One day as delivered by the provider.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TideDay {
    /// Raw samples, unprocessed
    pub points: Vec<TidePoint>,
    /// Spring/neap tide name, when the provider sends one
    pub tide_name: Option<String>,
}

/// What the provider's payload turned out to contain.
#[derive(Clone, Debug, PartialEq)]
pub enum DayPayload {
    /// Samples found in one of the known shapes
    Found(TideDay),
    /// A known shape is present but carries no samples for the date
    NotFoundForDate { tide_name: Option<String> },
    /// Neither known shape is present
    ShapeUnrecognized,
}

impl DayPayload {
    /// Collapse to a [`TideDay`]; the two "no data" cases become an empty day.
    pub fn into_day(self) -> TideDay {
        match self {
            DayPayload::Found(day) => day,
            DayPayload::NotFoundForDate { tide_name } => TideDay {
                points: Vec::new(),
                tide_name,
            },
            DayPayload::ShapeUnrecognized => TideDay::default(),
        }
    }
}

/// Source of tide days. Implemented over HTTP in production and by fakes in tests.
#[async_trait]
pub trait TideProvider: Send + Sync {
    async fn fetch_day(&self, station: &Station, date: NaiveDate) -> Result<TideDay, TideError>;
}

/// Parse a provider response body for `date`.
pub fn parse_day_payload(body: &str, date: NaiveDate) -> Result<DayPayload, TideError> {
    let root: Value = serde_json::from_str(body)?;

    if root.get("status").and_then(Value::as_bool) == Some(false) {
        return Err(TideError::UpstreamStatus);
    }

    let Some(tide) = root.get("tide") else {
        return Ok(DayPayload::ShapeUnrecognized);
    };

    let date_key = date.format("%Y-%m-%d").to_string();
    let chart_day = tide.get("chart").and_then(|chart| chart.get(&date_key));

    let tide_name = chart_day
        .and_then(moon_title)
        .or_else(|| moon_title(tide));

    let direct = tide.get("tide").and_then(Value::as_array);
    let charted = chart_day
        .and_then(|day| day.get("tide"))
        .and_then(Value::as_array);

    for raw in [direct, charted].into_iter().flatten() {
        let points: Vec<TidePoint> = raw.iter().filter_map(TidePoint::from_value).collect();
        if !points.is_empty() {
            return Ok(DayPayload::Found(TideDay { points, tide_name }));
        }
    }

    let known_shape = direct.is_some() || tide.get("chart").is_some_and(Value::is_object);
    if known_shape {
        Ok(DayPayload::NotFoundForDate { tide_name })
    } else {
        Ok(DayPayload::ShapeUnrecognized)
    }
}

fn moon_title(node: &Value) -> Option<String> {
    node.get("moon")?
        .get("title")?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// HTTP client for the tide provider.
#[derive(Clone, Debug)]
pub struct HttpTideProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTideProvider {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TideError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Full request URL for one station and day.
    pub fn request_url(&self, station: &Station, date: NaiveDate) -> Result<reqwest::Url, TideError> {
        let params = [
            ("pc", station.pc.clone()),
            ("hc", station.hc.clone()),
            ("yr", date.year().to_string()),
            ("mn", date.month().to_string()),
            ("dy", date.day().to_string()),
            ("rg", "day".to_string()),
        ];
        reqwest::Url::parse_with_params(&self.base_url, &params)
            .map_err(|e| TideError::Network(format!("bad provider URL {}: {e}", self.base_url)))
    }
}

#[async_trait]
impl TideProvider for HttpTideProvider {
    async fn fetch_day(&self, station: &Station, date: NaiveDate) -> Result<TideDay, TideError> {
        let url = self.request_url(station, date)?;
        debug!(%url, "requesting tide day");

        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.text().await?;

        match parse_day_payload(&body, date)? {
            DayPayload::Found(day) => {
                debug!(points = day.points.len(), "tide day received");
                Ok(day)
            }
            DayPayload::NotFoundForDate { tide_name } => {
                debug!(pc = %station.pc, hc = %station.hc, %date, "provider has no samples for date");
                Ok(TideDay {
                    points: Vec::new(),
                    tide_name,
                })
            }
            DayPayload::ShapeUnrecognized => {
                warn!(pc = %station.pc, hc = %station.hc, %date, "unrecognized provider payload shape");
                Ok(TideDay::default())
            }
        }
    }
}
