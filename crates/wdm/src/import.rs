//! Text input parsers feeding [`Catalog::write_slot`].
//!
//! Two formats are read:
//!
//! - CSV with one value column, either `datetime,value` or
//!   `year,month,day,hour,minute,second,value`. Fields may be quoted. Blank
//!   lines and lines starting with `#` are ignored, and a first record that
//!   does not parse is taken as a header.
//! - HYDHR sequential files: an 8-character station prefix, then
//!   `yy mm dd flag` and twelve hourly values. Flag `1` covers hours 0 to 11
//!   and flag `2` hours 12 to 23.

use crate::catalog::Catalog;
use crate::container::{Dsn, StorageEngine};
use crate::error::{Result, WdmError};
use crate::series::{parse_timestamp, timestamp, DateRange, TimeSeries, Timestamp};
use std::collections::BTreeMap;
use std::io::{BufRead, Read};
use std::path::Path;
use tracing::{debug, warn};

/// Width of the station prefix on each HYDHR line.
const HYDHR_PREFIX: usize = 8;

/// Hourly values per HYDHR line.
const HYDHR_VALUES: usize = 12;

/// Parses single-series CSV input.
///
/// # Errors
///
/// Returns `WdmError::InvalidArgument` if a record has a column count other
/// than 2 or 7, or if a record after the first fails to parse, and
/// `WdmError::CsvError` for malformed CSV.
///
/// # Examples
/// ```rust,ignore
/// use alopex_wdm::import::parse_iso_csv;
///
/// let input = "Datetime,flow\n2000-01-01,1.5\n2000-01-02,2.5\n";
/// let series = parse_iso_csv(input.as_bytes())?;
/// assert_eq!(series.len(), 2);
/// ```
pub fn parse_iso_csv<R: Read>(reader: R) -> Result<TimeSeries> {
    let mut records = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut points = BTreeMap::new();
    let mut first = true;
    for record in records.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line = record.position().map_or(0, |position| position.line());

        let fields: Vec<&str> = record.iter().collect();
        if fields.len() != 2 && fields.len() != 7 {
            return Err(WdmError::InvalidArgument(
                "The input data set must contain only 1 time series".to_string(),
            ));
        }

        match parse_csv_row(&fields) {
            Ok((ts, value)) => {
                points.insert(ts, value);
            }
            Err(_) if first => debug!("Treating line {} as a header", line),
            Err(err) => {
                return Err(WdmError::InvalidArgument(format!(
                    "line {}: {}",
                    line, err
                )))
            }
        }
        first = false;
    }
    Ok(TimeSeries::from_map(points))
}

fn parse_csv_row(fields: &[&str]) -> Result<(Timestamp, f64)> {
    let (ts, value) = match fields {
        [date, value] => (parse_timestamp(date)?, value),
        [year, month, day, hour, minute, second, value] => (
            timestamp(
                parse_field(year)?,
                parse_field(month)?,
                parse_field(day)?,
                parse_field(hour)?,
                parse_field(minute)?,
                parse_field(second)?,
            )?,
            value,
        ),
        _ => {
            return Err(WdmError::InvalidArgument(format!(
                "expected 2 or 7 columns, got {}",
                fields.len()
            )))
        }
    };
    Ok((ts, parse_value(value)?))
}

fn parse_field<T: std::str::FromStr>(text: &str) -> Result<T> {
    text.parse()
        .map_err(|_| WdmError::InvalidArgument(format!("'{}' is not a number", text)))
}

/// Empty cells and `nan` are missing values.
fn parse_value(text: &str) -> Result<f64> {
    if text.is_empty() || text.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    parse_field(text)
}

/// Parses a HYDHR sequential file.
///
/// Years are two digits added to `start_century`. The century advances after
/// the afternoon line of 99-12-31. Lines whose date is not valid on the
/// calendar are logged and skipped.
///
/// # Errors
///
/// Returns `WdmError::InvalidArgument` for a line with missing or
/// non-numeric fields, or an unknown half-day flag.
pub fn parse_hydhr<R: BufRead>(reader: R, start_century: i32) -> Result<TimeSeries> {
    let mut century = start_century;
    let mut points = BTreeMap::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let Some(body) = line.get(HYDHR_PREFIX..) else {
            continue;
        };
        let words: Vec<&str> = body.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }
        if words.len() < 4 + HYDHR_VALUES {
            return Err(WdmError::InvalidArgument(format!(
                "line {}: expected date, flag and {} values",
                idx + 1,
                HYDHR_VALUES
            )));
        }

        let yy: i32 = parse_field(words[0])?;
        let month: u32 = parse_field(words[1])?;
        let day: u32 = parse_field(words[2])?;
        let flag: u32 = parse_field(words[3])?;
        let hours = match flag {
            1 => 0..12,
            2 => 12..24,
            _ => {
                return Err(WdmError::InvalidArgument(format!(
                    "line {}: half-day flag must be 1 or 2, got {}",
                    idx + 1,
                    flag
                )))
            }
        };
        let year = century + yy;
        if yy == 99 && month == 12 && day == 31 && flag == 2 {
            century += 100;
        }

        let values = words[4..4 + HYDHR_VALUES]
            .iter()
            .map(|word| parse_field::<f64>(word))
            .collect::<Result<Vec<_>>>()?;
        for (hour, value) in hours.zip(values) {
            match timestamp(year, month, day, hour, 0, 0) {
                Ok(ts) => {
                    points.insert(ts, value);
                }
                Err(err) => {
                    warn!("Skipping line {} (century {}): {}", idx + 1, century, err);
                    break;
                }
            }
        }
    }
    Ok(TimeSeries::from_map(points))
}

impl<E: StorageEngine> Catalog<E> {
    /// Parses CSV input and writes the points within `range` to a slot.
    pub fn import_csv<R: Read>(
        &self,
        path: impl AsRef<Path>,
        dsn: Dsn,
        reader: R,
        range: &DateRange,
    ) -> Result<()> {
        let series = parse_iso_csv(reader)?.clip(range);
        self.write_slot(path, dsn, &series)
    }

    /// Parses HYDHR input and writes it to a slot.
    pub fn import_hydhr<R: BufRead>(
        &self,
        path: impl AsRef<Path>,
        dsn: Dsn,
        reader: R,
        start_century: i32,
    ) -> Result<()> {
        let series = parse_hydhr(reader, start_century)?;
        self.write_slot(path, dsn, &series)
    }
}
