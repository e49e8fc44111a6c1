//! Homogeneous multi-series export in the SWMM5 RDII text format.
//!
//! ```text
//! SWMM5
//! RDII dump of DSNS [101, 1101] from container.wdm
//! 3600                      interval in seconds
//! 1
//! FLOW CFS
//! 2                         number of series
//! 101_SITE                  one identifier per series
//! 1101_SITE
//! Node Year Mon Day Hr Min Sec Flow
//! 101_SITE 2000 01 01 00 00 00 1.5
//! 1101_SITE 2000 01 01 00 00 00 1.5
//! ...
//! ```
//!
//! Every selected slot must share one time-code and one timestep, any
//! requested bound must lie within each slot's own extent, and the clipped
//! series must share one timestamp index.

use crate::catalog::Catalog;
use crate::container::{Dsn, SlotDescription, StorageEngine};
use crate::error::{Result, WdmError};
use crate::extract::SlotAddress;
use crate::frequency::TimeCode;
use crate::series::{to_datetime, DateRange};
use chrono::{Datelike, Timelike};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

/// Units label written in the export header.
pub const RDII_UNITS: &str = "FLOW CFS";

/// Column header preceding the data lines.
const RDII_COLUMNS: &str = "Node Year Mon Day Hr Min Sec Flow";

impl<E: StorageEngine> Catalog<E> {
    /// Writes the addressed slots to `out` in RDII format.
    ///
    /// # Errors
    ///
    /// - `WdmError::OutOfRange` if a bound lies outside a slot's extent
    /// - `WdmError::HeterogeneousSeries` if the slots differ in time-code or
    ///   timestep
    /// - `WdmError::UnsupportedFrequency` for month and year slots, which have
    ///   no interval in seconds
    /// - `WdmError::IndexMismatch` if the clipped series do not share an index
    pub fn export_rdii<W: Write>(
        &self,
        addresses: &[SlotAddress],
        range: &DateRange,
        out: &mut W,
    ) -> Result<()> {
        if addresses.is_empty() {
            return Err(WdmError::InvalidArgument(
                "no slots given to export".to_string(),
            ));
        }

        let mut time_codes = BTreeSet::new();
        let mut tsteps = BTreeSet::new();
        let mut descriptions = Vec::with_capacity(addresses.len());
        for address in addresses {
            let description = self.describe_slot(&address.path, address.dsn)?;
            check_bounds(&description, range)?;
            time_codes.insert(description.label.time_code);
            tsteps.insert(description.label.tstep);
            descriptions.push(description);
        }

        if time_codes.len() != 1 || tsteps.len() != 1 {
            return Err(WdmError::HeterogeneousSeries(format!(
                "time-codes {:?}, timesteps {:?}",
                time_codes.iter().map(|code| code.code()).collect::<Vec<_>>(),
                tsteps
            )));
        }
        let time_code = descriptions[0].label.time_code;
        let tstep = descriptions[0].label.tstep;
        let interval = interval_seconds(time_code)? * i64::from(tstep);

        let mut series = Vec::with_capacity(addresses.len());
        for address in addresses {
            series.push(self.read_slot(&address.path, address.dsn, range)?);
        }
        let reference = &series[0];
        for (idx, other) in series.iter().enumerate().skip(1) {
            if !other.same_index(reference) {
                return Err(WdmError::IndexMismatch {
                    dsn: addresses[idx].dsn,
                    reference: addresses[0].dsn,
                });
            }
        }

        let ids: Vec<String> = descriptions.iter().map(SlotDescription::column_name).collect();
        let dsns: Vec<Dsn> = addresses.iter().map(|address| address.dsn).collect();
        let mut paths: Vec<&Path> = Vec::new();
        for address in addresses {
            if !paths.contains(&address.path.as_path()) {
                paths.push(&address.path);
            }
        }
        let paths = paths
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");

        writeln!(out, "SWMM5")?;
        writeln!(out, "RDII dump of DSNS {:?} from {}", dsns, paths)?;
        writeln!(out, "{}", interval)?;
        writeln!(out, "1")?;
        writeln!(out, "{}", RDII_UNITS)?;
        writeln!(out, "{}", addresses.len())?;
        for id in &ids {
            writeln!(out, "{}", id)?;
        }
        writeln!(out, "{}", RDII_COLUMNS)?;

        for (row, ts) in reference.timestamps().enumerate() {
            let dt = to_datetime(ts)?;
            for (id, values) in ids.iter().zip(&series) {
                writeln!(
                    out,
                    "{} {} {:02} {:02} {:02} {:02} {:02} {}",
                    id,
                    dt.year(),
                    dt.month(),
                    dt.day(),
                    dt.hour(),
                    dt.minute(),
                    dt.second(),
                    format_value(values.points()[row].1)
                )?;
            }
        }
        Ok(())
    }

    /// Exports several DSNs from one container.
    pub fn export_rdii_dsns<W: Write>(
        &self,
        path: impl AsRef<Path>,
        dsns: &[Dsn],
        range: &DateRange,
        out: &mut W,
    ) -> Result<()> {
        let path = path.as_ref();
        let addresses: Vec<SlotAddress> =
            dsns.iter().map(|dsn| SlotAddress::new(path, *dsn)).collect();
        self.export_rdii(&addresses, range, out)
    }
}

fn check_bounds(description: &SlotDescription, range: &DateRange) -> Result<()> {
    if let Some(start) = range.start {
        if description.start.map_or(true, |first| start < first) {
            return Err(WdmError::OutOfRange {
                dsn: description.dsn,
                bound: "start",
            });
        }
    }
    if let Some(end) = range.end {
        if description.end.map_or(true, |last| end > last) {
            return Err(WdmError::OutOfRange {
                dsn: description.dsn,
                bound: "end",
            });
        }
    }
    Ok(())
}

fn interval_seconds(time_code: TimeCode) -> Result<i64> {
    time_code.seconds().ok_or_else(|| {
        WdmError::UnsupportedFrequency(format!(
            "{} has no fixed interval in seconds",
            time_code.unit()
        ))
    })
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        format!("{:?}", value)
    }
}
