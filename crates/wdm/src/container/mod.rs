//! Storage Engine contract.
//!
//! A container is a single file holding a fixed catalog space of
//! [`MAX_DSN`] slots. The catalog layer talks to it only through
//! [`StorageEngine`]; [`ContainerEngine`] is the bundled file-backed
//! implementation.

pub mod engine;
pub mod format;

pub use engine::{ContainerConfig, ContainerEngine, SyncMode};

use crate::error::{Result, WdmError};
use crate::frequency::{Frequency, TimeCode};
use crate::series::{format_timestamp, DateRange, TimeSeries, Timestamp};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Data-Set Number: the integer key of a slot.
pub type Dsn = u32;

/// Lowest valid DSN.
pub const MIN_DSN: Dsn = 1;

/// Highest valid DSN, and the number of slots in a container.
pub const MAX_DSN: Dsn = 32_000;

/// Default base year for new slots.
pub const DEFAULT_BASE_YEAR: i32 = 1900;

/// Default missing-value sentinel for new slots.
pub const DEFAULT_TSFILL: f64 = -999.0;

/// Maximum length of a series-type tag.
pub const MAX_TSTYPE_LEN: usize = 4;

/// Returns an error unless `dsn` lies in `[MIN_DSN, MAX_DSN]`.
pub fn check_dsn(dsn: Dsn) -> Result<()> {
    if (MIN_DSN..=MAX_DSN).contains(&dsn) {
        Ok(())
    } else {
        Err(WdmError::DsnOutOfRange(dsn))
    }
}

/// Returns true if both paths name the same container file.
///
/// Paths are compared after canonicalisation when both exist.
pub fn same_container(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Metadata stored with every slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotLabel {
    /// Series-type tag, at most four characters.
    pub tstype: String,
    /// Timestamps before this year are rejected.
    pub base_year: i32,
    /// Sampling unit.
    pub time_code: TimeCode,
    /// Positive multiplier of the sampling unit.
    pub tstep: u32,
    /// Station identifier.
    pub statid: String,
    /// Scenario tag.
    pub scenario: String,
    /// Location tag.
    pub location: String,
    /// Free-text description.
    pub description: String,
    /// Constituent name.
    pub constituent: String,
    /// Missing-value sentinel.
    pub tsfill: f64,
}

impl Default for SlotLabel {
    fn default() -> Self {
        Self {
            tstype: String::new(),
            base_year: DEFAULT_BASE_YEAR,
            time_code: TimeCode::Day,
            tstep: 1,
            statid: String::new(),
            scenario: String::new(),
            location: String::new(),
            description: String::new(),
            constituent: String::new(),
            tsfill: DEFAULT_TSFILL,
        }
    }
}

impl SlotLabel {
    /// Creates a label with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the series-type tag.
    pub fn with_tstype(mut self, tstype: impl Into<String>) -> Self {
        self.tstype = tstype.into();
        self
    }

    /// Sets the base year.
    pub fn with_base_year(mut self, base_year: i32) -> Self {
        self.base_year = base_year;
        self
    }

    /// Sets the time-code and timestep.
    pub fn with_frequency(mut self, time_code: TimeCode, tstep: u32) -> Self {
        self.time_code = time_code;
        self.tstep = tstep;
        self
    }

    /// Sets the station identifier.
    pub fn with_statid(mut self, statid: impl Into<String>) -> Self {
        self.statid = statid.into();
        self
    }

    /// Sets the scenario tag.
    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = scenario.into();
        self
    }

    /// Sets the location tag.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the constituent name.
    pub fn with_constituent(mut self, constituent: impl Into<String>) -> Self {
        self.constituent = constituent.into();
        self
    }

    /// Sets the missing-value sentinel.
    pub fn with_tsfill(mut self, tsfill: f64) -> Self {
        self.tsfill = tsfill;
        self
    }

    /// The slot's fixed sampling frequency.
    pub fn frequency(&self) -> Frequency {
        Frequency::new(self.time_code, self.tstep)
    }

    /// Applies creation defaults and validates the label.
    ///
    /// An empty tstype takes the first four characters of a non-empty
    /// constituent.
    ///
    /// # Errors
    ///
    /// Returns `WdmError::InvalidArgument` if the tstype is longer than four
    /// characters or the timestep is zero.
    pub fn normalized(mut self) -> Result<Self> {
        if self.tstype.is_empty() && !self.constituent.is_empty() {
            self.tstype = self.constituent.chars().take(MAX_TSTYPE_LEN).collect();
        }
        if self.tstype.chars().count() > MAX_TSTYPE_LEN {
            return Err(WdmError::InvalidArgument(format!(
                "tstype '{}' is longer than {} characters",
                self.tstype, MAX_TSTYPE_LEN
            )));
        }
        if self.tstep == 0 {
            return Err(WdmError::InvalidArgument(
                "tstep must be a positive integer".to_string(),
            ));
        }
        Ok(self)
    }
}

/// A slot's metadata as returned by description.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotDescription {
    /// The slot's key.
    pub dsn: Dsn,
    /// Stored metadata.
    pub label: SlotLabel,
    /// First stored timestamp.
    pub start: Option<Timestamp>,
    /// Last stored timestamp.
    pub end: Option<Timestamp>,
    /// Number of stored points.
    pub point_count: usize,
}

impl SlotDescription {
    /// The slot's location tag.
    pub fn location(&self) -> &str {
        &self.label.location
    }

    /// Column identity used by extraction and export: `{dsn}_{location}`.
    pub fn column_name(&self) -> String {
        format!("{}_{}", self.dsn, self.label.location)
    }
}

impl fmt::Display for SlotDescription {
    /// Renders one row of the fixed-width listing.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = self
            .start
            .map_or_else(|| "None".to_string(), format_timestamp);
        let end = self.end.map_or_else(|| "None".to_string(), format_timestamp);
        write!(
            f,
            "{:5} {:8} {:8} {:8}    {:19} {:19} {:>5}({}) {}",
            self.dsn,
            self.label.scenario,
            self.label.location,
            self.label.constituent,
            start,
            end,
            self.label.time_code.name(),
            self.label.time_code.code(),
            self.label.tstep
        )
    }
}

/// Summary of a container file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Container path.
    pub path: PathBuf,
    /// Size of the file in bytes.
    pub file_bytes: u64,
    /// Number of slots in the catalog space.
    pub capacity: Dsn,
    /// Slots currently holding a record.
    pub live_slots: u32,
    /// Blocks no longer referenced by any slot.
    pub dead_blocks: u32,
}

/// Physical storage operations the catalog layer is built on.
///
/// Every method re-derives state from the container at `path`; an engine
/// holds configuration only.
pub trait StorageEngine {
    /// Creates an empty container.
    ///
    /// Fails with `ContainerExists` if `path` exists and `overwrite` is false.
    fn create_container(&self, path: &Path, overwrite: bool) -> Result<()>;

    /// Reads the container summary.
    fn container_info(&self, path: &Path) -> Result<ContainerInfo>;

    /// Creates a slot with no data. Fails with `SlotExists` if occupied.
    fn create_slot(&self, path: &Path, dsn: Dsn, label: &SlotLabel) -> Result<()>;

    /// Describes a slot, returning `None` if it holds no record.
    fn describe_slot(&self, path: &Path, dsn: Dsn) -> Result<Option<SlotDescription>>;

    /// Reads a slot's series clipped to `range`. Fails with `SlotEmpty`.
    fn read_slot(&self, path: &Path, dsn: Dsn, range: &DateRange) -> Result<TimeSeries>;

    /// Replaces a slot's stored points. Fails with `SlotEmpty`.
    fn write_slot(&self, path: &Path, dsn: Dsn, series: &TimeSeries) -> Result<()>;

    /// Removes a slot. Fails with `SlotEmpty`.
    fn delete_slot(&self, path: &Path, dsn: Dsn) -> Result<()>;

    /// Moves a slot to a new key, metadata and data intact.
    fn rename_slot(&self, path: &Path, old: Dsn, new: Dsn) -> Result<()>;

    /// Creates `dst_dsn` in `dst` with the label of `src_dsn` in `src`.
    ///
    /// Fails with `SlotExists` if the destination is occupied and with
    /// `InvalidArgument` if both paths name the same container.
    fn copy_label(&self, src: &Path, src_dsn: Dsn, dst: &Path, dst_dsn: Dsn) -> Result<()>;

    /// Number of slots in a container's catalog space.
    fn capacity(&self) -> Dsn {
        MAX_DSN
    }

    /// Lazily yields every active slot in ascending DSN order.
    ///
    /// The default probes each key with [`describe_slot`](Self::describe_slot).
    /// Calling it again restarts the sequence. Engines with a native listing
    /// may override it.
    fn enumerate_active_slots<'a>(
        &'a self,
        path: &'a Path,
    ) -> Box<dyn Iterator<Item = SlotDescription> + 'a> {
        Box::new(SlotProbe::new(self, path))
    }
}

/// Probe-based enumeration over `1..=capacity`.
///
/// Keys that describe as empty are skipped. Keys whose description fails are
/// logged and also treated as empty.
pub struct SlotProbe<'a, E: StorageEngine + ?Sized> {
    engine: &'a E,
    path: &'a Path,
    next: Dsn,
    capacity: Dsn,
}

impl<'a, E: StorageEngine + ?Sized> SlotProbe<'a, E> {
    /// Creates a probe starting at [`MIN_DSN`].
    pub fn new(engine: &'a E, path: &'a Path) -> Self {
        Self {
            engine,
            path,
            next: MIN_DSN,
            capacity: engine.capacity(),
        }
    }
}

impl<E: StorageEngine + ?Sized> Iterator for SlotProbe<'_, E> {
    type Item = SlotDescription;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next <= self.capacity {
            let dsn = self.next;
            self.next += 1;
            match self.engine.describe_slot(self.path, dsn) {
                Ok(Some(description)) => return Some(description),
                Ok(None) => continue,
                Err(err) => {
                    warn!(
                        "Treating DSN {} in {} as empty: {}",
                        dsn,
                        self.path.display(),
                        err
                    );
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.capacity + 1).saturating_sub(self.next) as usize;
        (0, Some(remaining))
    }
}
