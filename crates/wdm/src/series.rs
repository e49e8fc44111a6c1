//! Time series values, date ranges and timestamp helpers.
//!
//! Timestamps are whole seconds since the Unix epoch, interpreted as UTC
//! wall-clock time. A [`TimeSeries`] holds strictly increasing timestamps with
//! one value each; `NaN` marks a missing value.

use crate::error::{Result, WdmError};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use std::collections::BTreeMap;

/// Timestamp in seconds since the Unix epoch (UTC).
pub type Timestamp = i64;

/// Formats accepted by [`parse_timestamp`], tried in order.
const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

/// Builds a timestamp from calendar fields.
///
/// # Errors
///
/// Returns `WdmError::InvalidArgument` if the fields do not name a valid date
/// and time.
pub fn timestamp(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> Result<Timestamp> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .map(|dt| dt.and_utc().timestamp())
        .ok_or_else(|| {
            WdmError::InvalidArgument(format!(
                "invalid date {:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            ))
        })
}

/// Converts a timestamp to calendar date and time.
///
/// # Errors
///
/// Returns `WdmError::InvalidArgument` if the timestamp is outside the
/// representable calendar range.
pub fn to_datetime(ts: Timestamp) -> Result<NaiveDateTime> {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| WdmError::InvalidArgument(format!("timestamp {} out of range", ts)))
}

/// Formats a timestamp as `YYYY-MM-DD HH:MM:SS`.
pub fn format_timestamp(ts: Timestamp) -> String {
    match to_datetime(ts) {
        Ok(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        Err(_) => ts.to_string(),
    }
}

/// Formats a timestamp as ISO-8601 `YYYY-MM-DDTHH:MM:SS`.
pub fn format_iso(ts: Timestamp) -> String {
    match to_datetime(ts) {
        Ok(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
        Err(_) => ts.to_string(),
    }
}

/// Parses a date or date-time string.
///
/// # Errors
///
/// Returns `WdmError::InvalidArgument` if no accepted format matches.
pub fn parse_timestamp(text: &str) -> Result<Timestamp> {
    let text = text.trim();
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(dt.and_utc().timestamp());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return Ok(dt.and_utc().timestamp());
            }
        }
    }
    Err(WdmError::InvalidArgument(format!(
        "unrecognised date '{}'",
        text
    )))
}

/// Returns the calendar year of a timestamp.
pub fn year_of(ts: Timestamp) -> Result<i32> {
    Ok(to_datetime(ts)?.year())
}

/// Inclusive date bounds. A missing bound defaults to the series' own extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    /// Inclusive lower bound.
    pub start: Option<Timestamp>,
    /// Inclusive upper bound.
    pub end: Option<Timestamp>,
}

impl DateRange {
    /// A range without bounds.
    pub fn all() -> Self {
        Self::default()
    }

    /// Creates a range from optional bounds.
    pub fn new(start: Option<Timestamp>, end: Option<Timestamp>) -> Self {
        Self { start, end }
    }

    /// Sets the inclusive lower bound.
    pub fn with_start(mut self, start: Timestamp) -> Self {
        self.start = Some(start);
        self
    }

    /// Sets the inclusive upper bound.
    pub fn with_end(mut self, end: Timestamp) -> Self {
        self.end = Some(end);
        self
    }

    /// Parses optional textual bounds.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        Ok(Self {
            start: start.map(parse_timestamp).transpose()?,
            end: end.map(parse_timestamp).transpose()?,
        })
    }

    /// Returns true if no bound is set.
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Returns true if the timestamp lies within the bounds.
    pub fn contains(&self, ts: Timestamp) -> bool {
        self.start.map_or(true, |start| ts >= start) && self.end.map_or(true, |end| ts <= end)
    }
}

/// An ordered series of `(timestamp, value)` pairs with strictly increasing
/// timestamps.
#[derive(Debug, Clone, Default)]
pub struct TimeSeries {
    points: Vec<(Timestamp, f64)>,
}

impl TimeSeries {
    /// Creates an empty series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a series from points.
    ///
    /// # Errors
    ///
    /// Returns `WdmError::InvalidArgument` if timestamps are not strictly
    /// increasing.
    pub fn from_points(points: Vec<(Timestamp, f64)>) -> Result<Self> {
        if let Some(pair) = points.windows(2).find(|pair| pair[1].0 <= pair[0].0) {
            return Err(WdmError::InvalidArgument(format!(
                "timestamps must be strictly increasing: {} follows {}",
                format_timestamp(pair[1].0),
                format_timestamp(pair[0].0)
            )));
        }
        Ok(Self { points })
    }

    /// Builds a series from a map, which is ordered by construction.
    pub fn from_map(points: BTreeMap<Timestamp, f64>) -> Self {
        Self {
            points: points.into_iter().collect(),
        }
    }

    /// Returns the points.
    pub fn points(&self) -> &[(Timestamp, f64)] {
        &self.points
    }

    /// Consumes the series, returning its points.
    pub fn into_points(self) -> Vec<(Timestamp, f64)> {
        self.points
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the series holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// First timestamp.
    pub fn start(&self) -> Option<Timestamp> {
        self.points.first().map(|(ts, _)| *ts)
    }

    /// Last timestamp.
    pub fn end(&self) -> Option<Timestamp> {
        self.points.last().map(|(ts, _)| *ts)
    }

    /// Iterates timestamps in order.
    pub fn timestamps(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.points.iter().map(|(ts, _)| *ts)
    }

    /// Iterates values in order.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|(_, value)| *value)
    }

    /// Looks up the value at a timestamp.
    pub fn get(&self, ts: Timestamp) -> Option<f64> {
        self.points
            .binary_search_by_key(&ts, |(point_ts, _)| *point_ts)
            .ok()
            .map(|idx| self.points[idx].1)
    }

    /// Returns the points within the inclusive range.
    pub fn clip(&self, range: &DateRange) -> Self {
        Self {
            points: self
                .points
                .iter()
                .filter(|(ts, _)| range.contains(*ts))
                .copied()
                .collect(),
        }
    }

    /// Overlays `newer` onto this series. Values from `newer` win on equal
    /// timestamps.
    pub fn merge(&self, newer: &TimeSeries) -> Self {
        let mut merged: BTreeMap<Timestamp, f64> = self.points.iter().copied().collect();
        merged.extend(newer.points.iter().copied());
        Self::from_map(merged)
    }

    /// Returns true if both series have identical timestamps.
    pub fn same_index(&self, other: &TimeSeries) -> bool {
        self.points.len() == other.points.len() && self.timestamps().eq(other.timestamps())
    }

    /// Infers the sampling frequency from the timestamp spacing.
    ///
    /// Returns `None` for series with fewer than two points. Series whose
    /// points all fall at midnight on the first day of a month map to `MS` or
    /// `AS`, on the last day of a month to `M` or `A`. Anything else uses the
    /// greatest common divisor of the spacings in the largest whole unit, so
    /// gaps are tolerated.
    pub fn infer_frequency(&self) -> Result<Option<String>> {
        if self.points.len() < 2 {
            return Ok(None);
        }

        let datetimes = self
            .points
            .iter()
            .map(|(ts, _)| to_datetime(*ts))
            .collect::<Result<Vec<_>>>()?;

        let at_midnight = datetimes
            .iter()
            .all(|dt| dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0);
        if at_midnight {
            if datetimes.iter().all(|dt| dt.day() == 1) {
                return Ok(Some(calendar_code(&datetimes, "MS", "AS")));
            }
            if datetimes.iter().all(|dt| is_month_end(dt.date())) {
                return Ok(Some(calendar_code(&datetimes, "M", "A")));
            }
        }

        let spacing = self
            .points
            .windows(2)
            .map(|pair| pair[1].0 - pair[0].0)
            .fold(0, gcd);

        let code = if spacing % 86_400 == 0 {
            with_multiplier(spacing / 86_400, "D")
        } else if spacing % 3_600 == 0 {
            with_multiplier(spacing / 3_600, "H")
        } else if spacing % 60 == 0 {
            with_multiplier(spacing / 60, "T")
        } else {
            with_multiplier(spacing, "S")
        };
        Ok(Some(code))
    }
}

impl PartialEq for TimeSeries {
    /// Missing values compare equal to each other.
    fn eq(&self, other: &Self) -> bool {
        self.points.len() == other.points.len()
            && self
                .points
                .iter()
                .zip(&other.points)
                .all(|((ts_a, a), (ts_b, b))| {
                    ts_a == ts_b && (a == b || (a.is_nan() && b.is_nan()))
                })
    }
}

fn calendar_code(datetimes: &[NaiveDateTime], month_code: &str, year_code: &str) -> String {
    let step = datetimes
        .windows(2)
        .map(|pair| month_ordinal(&pair[1]) - month_ordinal(&pair[0]))
        .fold(0, gcd);
    if step % 12 == 0 {
        with_multiplier(step / 12, year_code)
    } else {
        with_multiplier(step, month_code)
    }
}

fn month_ordinal(dt: &NaiveDateTime) -> i64 {
    i64::from(dt.year()) * 12 + i64::from(dt.month0())
}

fn is_month_end(date: NaiveDate) -> bool {
    date.succ_opt()
        .map_or(true, |next| next.month() != date.month())
}

fn with_multiplier(step: i64, code: &str) -> String {
    if step == 1 {
        code.to_string()
    } else {
        format!("{}{}", step, code)
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let rem = a % b;
        a = b;
        b = rem;
    }
    a
}
