//! DSN Catalog Manager.
//!
//! [`Catalog`] is the session handle every catalog operation goes through. It
//! owns a [`StorageEngine`] and holds no container state between calls: each
//! operation re-derives what it needs from the container file.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_wdm::{Catalog, DateRange, SlotLabel, TimeCode};
//!
//! let catalog = Catalog::default();
//! catalog.create_container(path, false)?;
//! catalog.create_slot(path, 101, SlotLabel::new().with_frequency(TimeCode::Minute, 15))?;
//! catalog.write_slot(path, 101, &series)?;
//! let stored = catalog.read_slot(path, 101, &DateRange::all())?;
//! ```

use crate::container::{
    ContainerEngine, ContainerInfo, Dsn, SlotDescription, SlotLabel, StorageEngine,
};
use crate::error::{Result, WdmError};
use crate::frequency::{to_time_code, validate_frequency, Frequency};
use crate::series::{year_of, DateRange, TimeSeries};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Column titles of the slot listing.
const LISTING_TITLES: [&str; 8] = [
    "DSN",
    "SCENARIO",
    "LOCATION",
    "CONSTITUENT",
    "START DATE",
    "END DATE",
    "TCODE",
    "TSTEP",
];

/// Catalog-level configuration.
#[derive(Debug, Clone, Default)]
pub struct CatalogConfig {
    /// Directory under which temporary containers are created. Defaults to
    /// the system temporary directory.
    pub scratch_dir: Option<PathBuf>,
}

impl CatalogConfig {
    /// Sets the directory for temporary containers.
    pub fn with_scratch_dir(mut self, scratch_dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(scratch_dir.into());
        self
    }
}

/// Session handle for catalog operations over containers.
#[derive(Debug, Clone, Default)]
pub struct Catalog<E: StorageEngine = ContainerEngine> {
    engine: E,
    config: CatalogConfig,
}

impl<E: StorageEngine> Catalog<E> {
    /// Creates a catalog over `engine` with default configuration.
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, CatalogConfig::default())
    }

    /// Creates a catalog over `engine`.
    pub fn with_config(engine: E, config: CatalogConfig) -> Self {
        Self { engine, config }
    }

    /// Returns the storage engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Returns the catalog configuration.
    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Creates an empty container.
    ///
    /// # Errors
    ///
    /// Returns `WdmError::ContainerExists` if `path` exists and `overwrite` is
    /// false.
    pub fn create_container(&self, path: impl AsRef<Path>, overwrite: bool) -> Result<()> {
        self.engine.create_container(path.as_ref(), overwrite)
    }

    /// Reads the container summary.
    pub fn container_info(&self, path: impl AsRef<Path>) -> Result<ContainerInfo> {
        self.engine.container_info(path.as_ref())
    }

    /// Creates a slot.
    ///
    /// The label is normalised first: an empty tstype takes the first four
    /// characters of the constituent.
    ///
    /// # Errors
    ///
    /// Returns `WdmError::SlotExists` if `dsn` already holds a record.
    pub fn create_slot(&self, path: impl AsRef<Path>, dsn: Dsn, label: SlotLabel) -> Result<()> {
        let label = label.normalized()?;
        self.engine.create_slot(path.as_ref(), dsn, &label)
    }

    /// Describes a slot.
    ///
    /// # Errors
    ///
    /// Returns `WdmError::SlotEmpty` if no record exists at `dsn`.
    pub fn describe_slot(&self, path: impl AsRef<Path>, dsn: Dsn) -> Result<SlotDescription> {
        self.engine
            .describe_slot(path.as_ref(), dsn)?
            .ok_or(WdmError::SlotEmpty(dsn))
    }

    /// Describes a slot, returning `None` if it is empty.
    pub fn probe_slot(&self, path: impl AsRef<Path>, dsn: Dsn) -> Result<Option<SlotDescription>> {
        self.engine.describe_slot(path.as_ref(), dsn)
    }

    /// Lazily yields active slots in ascending DSN order.
    ///
    /// The sequence must be drained before the container is mutated.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be opened.
    pub fn slots<'a>(
        &'a self,
        path: &'a Path,
    ) -> Result<Box<dyn Iterator<Item = SlotDescription> + 'a>> {
        self.engine.container_info(path)?;
        Ok(self.engine.enumerate_active_slots(path))
    }

    /// Collects every active slot in ascending DSN order.
    pub fn enumerate_slots(&self, path: impl AsRef<Path>) -> Result<Vec<SlotDescription>> {
        Ok(self.slots(path.as_ref())?.collect())
    }

    /// Collects the keys of every active slot.
    pub fn active_dsns(&self, path: impl AsRef<Path>) -> Result<Vec<Dsn>> {
        Ok(self.slots(path.as_ref())?.map(|slot| slot.dsn).collect())
    }

    /// Renders the fixed-width table describing every active slot.
    pub fn render_listing(&self, path: impl AsRef<Path>) -> Result<String> {
        let [dsn, scenario, location, constituent, start, end, tcode, tstep] = LISTING_TITLES;
        let mut out = format!(
            "#{:<4} {:>8} {:>8} {:>8} {:<19} {:<19} {:>5} {}\n",
            dsn, scenario, location, constituent, start, end, tcode, tstep
        );
        for slot in self.slots(path.as_ref())? {
            out.push_str(&slot.to_string());
            out.push('\n');
        }
        Ok(out)
    }

    /// Deletes a slot.
    pub fn delete_slot(&self, path: impl AsRef<Path>, dsn: Dsn) -> Result<()> {
        self.engine.delete_slot(path.as_ref(), dsn)
    }

    /// Moves a slot to a new key.
    pub fn renumber_slot(&self, path: impl AsRef<Path>, old: Dsn, new: Dsn) -> Result<()> {
        self.engine.rename_slot(path.as_ref(), old, new)
    }

    /// Reads a slot's series clipped to the inclusive `range`.
    pub fn read_slot(
        &self,
        path: impl AsRef<Path>,
        dsn: Dsn,
        range: &DateRange,
    ) -> Result<TimeSeries> {
        self.engine.read_slot(path.as_ref(), dsn, range)
    }

    /// Writes a series into a slot.
    ///
    /// The series' inferred frequency must match the slot's time-code and
    /// timestep. Stored points at the same timestamps are replaced and the
    /// combined series must still match.
    ///
    /// Missing values (`NaN`) are stored as the slot's `tsfill`, so a value
    /// equal to `tsfill` reads back as `NaN`.
    ///
    /// # Errors
    ///
    /// Returns `WdmError::SlotEmpty` if the slot does not exist,
    /// `WdmError::FrequencyMismatch` or `WdmError::StepMismatch` on a
    /// frequency conflict, and `WdmError::BeforeBaseYear` for data older than
    /// the slot's base year.
    pub fn write_slot(&self, path: impl AsRef<Path>, dsn: Dsn, series: &TimeSeries) -> Result<()> {
        let path = path.as_ref();
        let description = self.describe_slot(path, dsn)?;
        if series.is_empty() {
            return Ok(());
        }

        let frequency = description.label.frequency();
        check_frequency(frequency, series)?;
        if let Some(start) = series.start() {
            let year = year_of(start)?;
            if year < description.label.base_year {
                return Err(WdmError::BeforeBaseYear {
                    dsn,
                    base_year: description.label.base_year,
                    year,
                });
            }
        }

        let merged = if description.point_count == 0 {
            series.clone()
        } else {
            let stored = self.engine.read_slot(path, dsn, &DateRange::all())?;
            let merged = stored.merge(series);
            check_frequency(frequency, &merged)?;
            merged
        };

        debug!(
            "Writing {} points ({} total) to DSN {} in {}",
            series.len(),
            merged.len(),
            dsn,
            path.display()
        );
        self.engine.write_slot(path, dsn, &merged)
    }
}

/// Checks a series' inferred frequency against a slot's. Series too short to
/// infer a spacing pass.
fn check_frequency(slot: Frequency, series: &TimeSeries) -> Result<()> {
    if let Some(inferred) = series.infer_frequency()? {
        let (time_code, step) = to_time_code(&inferred)?;
        validate_frequency(slot, Frequency::new(time_code, step))?;
    }
    Ok(())
}
