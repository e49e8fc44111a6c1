//! Alopex WDM - DSN catalog over a binary time series container
//!
//! A container file holds up to 32000 numbered slots (DSNs). Each slot has a
//! label and a single time series on a fixed grid. This crate maps between
//! frequency strings and the container's time-codes, manages slots, copies
//! and compacts containers, and extracts or exports series.
//!
//! # Components
//!
//! - [`Catalog`]: slot creation, description, enumeration and I/O
//! - [`ContainerEngine`]: the bundled block-structured container file
//! - [`frequency`]: time-code and frequency string mapping
//! - [`lifecycle`]: slot copy and clean copy (compaction)
//! - [`extract`] / [`export`]: multi-slot table extraction and RDII export
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_wdm::{Catalog, DateRange, SlotLabel, TimeCode};
//!
//! let catalog: Catalog = Catalog::default();
//! catalog.create_container("basin.wdm", false)?;
//! catalog.create_slot(
//!     "basin.wdm",
//!     101,
//!     SlotLabel::new()
//!         .with_frequency(TimeCode::Hour, 1)
//!         .with_location("SITE"),
//! )?;
//! catalog.write_slot("basin.wdm", 101, &series)?;
//!
//! let table = catalog.extract_tokens(&["basin.wdm", "101"], &DateRange::all())?;
//! ```

#![deny(missing_docs)]

pub mod catalog;
pub mod container;
pub mod error;
pub mod export;
pub mod extract;
pub mod frequency;
pub mod import;
pub mod lifecycle;
pub mod series;

pub use catalog::{Catalog, CatalogConfig};
pub use container::{
    ContainerConfig, ContainerEngine, Dsn, SlotDescription, SlotLabel, StorageEngine, SyncMode,
};
pub use error::{Result, WdmError};
pub use extract::{SeriesTable, SlotAddress};
pub use frequency::{Frequency, TimeCode};
pub use lifecycle::{CompactionReport, SlotOutcome};
pub use series::{DateRange, TimeSeries, Timestamp};
