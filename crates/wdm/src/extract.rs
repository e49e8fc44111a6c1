//! Multi-slot extraction.
//!
//! Sources are addressed either as a base path followed by bare DSNs
//! (`file.wdm 101 102`) or as explicit pairs (`file.wdm,101 other.wdm,104`).
//! Both forms normalise to the same [`SlotAddress`] list. Each source becomes
//! one column named `{dsn}_{location}`, and the columns are outer-joined on
//! timestamp in input order.

use crate::catalog::Catalog;
use crate::container::{Dsn, StorageEngine};
use crate::error::{Result, WdmError};
use crate::series::{format_iso, DateRange, TimeSeries, Timestamp};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A `(container path, DSN)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotAddress {
    /// Container path.
    pub path: PathBuf,
    /// Slot key.
    pub dsn: Dsn,
}

impl SlotAddress {
    /// Creates an address.
    pub fn new(path: impl Into<PathBuf>, dsn: Dsn) -> Self {
        Self {
            path: path.into(),
            dsn,
        }
    }
}

impl FromStr for SlotAddress {
    type Err = WdmError;

    /// Parses a `path,dsn` pair.
    fn from_str(token: &str) -> Result<Self> {
        let mut parts = token.split(',');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(path), Some(dsn), None) if !path.is_empty() => {
                Ok(Self::new(path, parse_dsn(dsn)?))
            }
            _ => Err(WdmError::InvalidArgument(format!(
                "expected 'path,dsn', got '{}'",
                token
            ))),
        }
    }
}

impl fmt::Display for SlotAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.path.display(), self.dsn)
    }
}

fn parse_dsn(text: &str) -> Result<Dsn> {
    text.trim()
        .parse::<Dsn>()
        .map_err(|_| WdmError::InvalidArgument(format!("'{}' is not a DSN", text)))
}

/// Normalises extraction tokens into addresses.
///
/// A token containing a comma is a `path,dsn` pair. Any other token is a DSN
/// against the first token, which is then the base path; a bare token equal
/// to the first one is that base path itself and is skipped.
///
/// # Errors
///
/// Returns `WdmError::InvalidArgument` for a malformed token or a bare DSN
/// with no base path.
///
/// # Examples
/// ```rust,ignore
/// use alopex_wdm::extract::parse_addresses;
///
/// let old_form = parse_addresses(&["file.wdm", "101", "102"])?;
/// let new_form = parse_addresses(&["file.wdm,101", "file.wdm,102"])?;
/// assert_eq!(old_form, new_form);
/// ```
pub fn parse_addresses<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<SlotAddress>> {
    let Some(first) = tokens.first().map(AsRef::as_ref) else {
        return Ok(Vec::new());
    };
    let base = if first.contains(',') { None } else { Some(first) };

    let mut addresses = Vec::with_capacity(tokens.len());
    for token in tokens.iter().map(AsRef::as_ref) {
        if token.contains(',') {
            addresses.push(token.parse()?);
        } else if token == first {
            continue;
        } else {
            let path = base.ok_or_else(|| {
                WdmError::InvalidArgument(format!("DSN '{}' has no base path", token))
            })?;
            addresses.push(SlotAddress::new(path, parse_dsn(token)?));
        }
    }
    Ok(addresses)
}

/// Series outer-joined on timestamp. Missing cells are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesTable {
    columns: Vec<String>,
    rows: BTreeMap<Timestamp, Vec<Option<f64>>>,
}

impl SeriesTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Column names in join order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Timestamps in ascending order.
    pub fn index(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.rows.keys().copied()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cells of one row.
    pub fn row(&self, ts: Timestamp) -> Option<&[Option<f64>]> {
        self.rows.get(&ts).map(Vec::as_slice)
    }

    /// Iterates rows in timestamp order.
    pub fn rows(&self) -> impl Iterator<Item = (Timestamp, &[Option<f64>])> + '_ {
        self.rows.iter().map(|(ts, cells)| (*ts, cells.as_slice()))
    }

    /// Cells of one column, by name.
    pub fn column(&self, name: &str) -> Option<Vec<(Timestamp, Option<f64>)>> {
        let idx = self.columns.iter().position(|column| column == name)?;
        Some(self.rows.iter().map(|(ts, cells)| (*ts, cells[idx])).collect())
    }

    /// Outer-joins a series as a new column.
    ///
    /// # Errors
    ///
    /// Returns `WdmError::DuplicateColumn` if the name is already present.
    pub fn join(&mut self, name: impl Into<String>, series: &TimeSeries) -> Result<()> {
        let name = name.into();
        if self.columns.contains(&name) {
            return Err(WdmError::DuplicateColumn(name));
        }
        self.columns.push(name);
        let width = self.columns.len();

        for cells in self.rows.values_mut() {
            cells.push(None);
        }
        for (ts, value) in series.points() {
            let cells = self.rows.entry(*ts).or_insert_with(|| vec![None; width]);
            cells[width - 1] = if value.is_nan() { None } else { Some(*value) };
        }
        Ok(())
    }

    /// Writes the table as CSV with ISO-8601 timestamps.
    ///
    /// Fields containing commas or quotes are quoted. Missing cells are
    /// empty.
    pub fn write_iso_csv<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut out = csv::WriterBuilder::new().from_writer(writer);
        out.write_field("Datetime")?;
        for column in &self.columns {
            out.write_field(column)?;
        }
        out.write_record(None::<&[u8]>)?;

        for (ts, cells) in &self.rows {
            out.write_field(format_iso(*ts))?;
            for cell in cells {
                match cell {
                    Some(value) => out.write_field(value.to_string())?,
                    None => out.write_field("")?,
                }
            }
            out.write_record(None::<&[u8]>)?;
        }
        out.flush()?;
        Ok(())
    }
}

impl<E: StorageEngine> Catalog<E> {
    /// Reads each addressed slot clipped to `range` and outer-joins them.
    ///
    /// # Errors
    ///
    /// Returns `WdmError::DuplicateColumn` when two sources share a
    /// `{dsn}_{location}` identity, and propagates read failures.
    pub fn extract(&self, addresses: &[SlotAddress], range: &DateRange) -> Result<SeriesTable> {
        if addresses.is_empty() {
            return Err(WdmError::InvalidArgument(
                "no slots given to extract".to_string(),
            ));
        }

        let mut table = SeriesTable::new();
        for address in addresses {
            let description = self.describe_slot(&address.path, address.dsn)?;
            let series = self.read_slot(&address.path, address.dsn, range)?;
            table.join(description.column_name(), &series)?;
        }
        Ok(table)
    }

    /// Parses extraction tokens with [`parse_addresses`] and extracts them.
    pub fn extract_tokens<S: AsRef<str>>(
        &self,
        tokens: &[S],
        range: &DateRange,
    ) -> Result<SeriesTable> {
        self.extract(&parse_addresses(tokens)?, range)
    }

    /// Extracts several DSNs from one container.
    pub fn extract_dsns(
        &self,
        path: impl AsRef<Path>,
        dsns: &[Dsn],
        range: &DateRange,
    ) -> Result<SeriesTable> {
        let path = path.as_ref();
        let addresses: Vec<SlotAddress> =
            dsns.iter().map(|dsn| SlotAddress::new(path, *dsn)).collect();
        self.extract(&addresses, range)
    }
}
