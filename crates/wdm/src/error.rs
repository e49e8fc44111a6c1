//! Error and Result types for catalog and container operations.

use crate::container::Dsn;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for WDM operations.
pub type Result<T> = std::result::Result<T, WdmError>;

/// The error type for catalog, container and series operations.
#[derive(Debug, Error)]
pub enum WdmError {
    /// A container already exists at the path and overwriting was not allowed.
    #[error("Container already exists: {0}")]
    ContainerExists(PathBuf),

    /// No container exists at the path.
    #[error("Container does not exist: {0}")]
    ContainerNotFound(PathBuf),

    /// The DSN is outside the container's catalog space.
    #[error("DSN {0} is outside the catalog range 1..=32000")]
    DsnOutOfRange(Dsn),

    /// The slot already holds a record.
    #[error("DSN {0} exists.")]
    SlotExists(Dsn),

    /// The slot holds no record.
    #[error("DSN {0} is empty")]
    SlotEmpty(Dsn),

    /// The frequency has no time-code representation.
    #[error("Unsupported frequency: {0}")]
    UnsupportedFrequency(String),

    /// The data's time-code differs from the slot's declared time-code.
    #[error("The DSN has a frequency of {slot}, but the data has a frequency of {data}")]
    FrequencyMismatch {
        /// Time-code declared by the slot.
        slot: u8,
        /// Time-code inferred from the data.
        data: u8,
    },

    /// The data's step multiplier differs from the slot's declared timestep.
    #[error("The DSN has a tstep of {slot}, but the data has a tstep of {data}")]
    StepMismatch {
        /// Timestep declared by the slot.
        slot: u32,
        /// Timestep inferred from the data.
        data: u32,
    },

    /// Two extracted sources produced the same column identity.
    #[error("The column {0} is duplicated. Dataset names must be unique.")]
    DuplicateColumn(String),

    /// A caller supplied an argument the operation cannot honour.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A timestamp falls before the slot's base year.
    #[error("DSN {dsn} does not accept data from {year}, before its base year {base_year}")]
    BeforeBaseYear {
        /// Target slot.
        dsn: Dsn,
        /// Base year declared by the slot.
        base_year: i32,
        /// Year of the offending timestamp.
        year: i32,
    },

    /// Slots selected for a homogeneous export differ in time-code or timestep.
    #[error("Series are not homogeneous: {0}")]
    HeterogeneousSeries(String),

    /// A requested bound lies outside a slot's own extent.
    #[error("Requested {bound} date for DSN {dsn} is outside its data extent")]
    OutOfRange {
        /// Offending slot.
        dsn: Dsn,
        /// Which bound failed ("start" or "end").
        bound: &'static str,
    },

    /// Clipped series selected for a homogeneous export do not share an index.
    #[error("DSN {dsn} does not share the timestamp index of DSN {reference}")]
    IndexMismatch {
        /// Slot whose index differs.
        dsn: Dsn,
        /// Slot whose index is walked.
        reference: Dsn,
    },

    /// An encoded slot record exceeds the configured limit.
    #[error("Record of {len} bytes exceeds the limit of {max} bytes")]
    RecordTooLarge {
        /// Encoded length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Invalid magic bytes in the container header.
    #[error("Invalid magic bytes: expected AWDM, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported container format version.
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    /// Stored checksum does not match the computed value.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Stored CRC32 checksum.
        expected: u32,
        /// Computed CRC32 checksum.
        actual: u32,
    },

    /// Container structures are inconsistent.
    #[error("Corrupt container: {0}")]
    Corrupt(String),

    /// Malformed CSV input or a failed CSV write.
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}
