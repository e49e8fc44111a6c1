//! Container file format.
//!
//! A container is a sequence of fixed-size blocks. Block 0 holds the header,
//! the rest hold directory pages and slot records.
//!
//! ## File Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Block 0: Header (536 bytes, zero padded)                    │
//! │  - Magic: "AWDM" (4 bytes)                                   │
//! │  - Version: u16 (2 bytes) = 1                                │
//! │  - Reserved: 2 bytes                                         │
//! │  - Block Size: u32 (4 bytes) = 4096                          │
//! │  - Capacity: u32 (4 bytes) = 32000                           │
//! │  - Block Count: u32 (4 bytes)                                │
//! │  - Next Block: u32 (4 bytes), append cursor                  │
//! │  - Live Slots: u32 (4 bytes)                                 │
//! │  - Dead Blocks: u32 (4 bytes)                                │
//! │  - Directory Page Table: u32 × 125 (500 bytes)               │
//! │  - Header CRC32: u32 (4 bytes)                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Directory Pages (allocated on first use)                    │
//! │  - 256 entries × 16 bytes: first block, block count,         │
//! │    byte length, record CRC32                                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Slot Records (contiguous blocks, append-only)               │
//! │  - Label, point count, timestamps, values                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Blocks freed by deleting or rewriting a slot are never reused in place;
//! they are counted as dead until the container is compacted.

use crate::container::{Dsn, SlotLabel, MAX_DSN};
use crate::error::{Result, WdmError};
use crate::frequency::TimeCode;
use crate::series::{TimeSeries, Timestamp};
use std::io::{Read, Write};

/// Magic bytes for the container header: "AWDM"
pub const CONTAINER_MAGIC: [u8; 4] = *b"AWDM";

/// Current container format version.
pub const CONTAINER_VERSION: u16 = 1;

/// Block size in bytes.
pub const BLOCK_SIZE: usize = 4096;

/// Blocks in a freshly created container (40 KiB).
pub const INITIAL_BLOCKS: u32 = 10;

/// Directory entry size in bytes.
pub const DIRECTORY_ENTRY_SIZE: usize = 16;

/// Directory entries per page.
pub const ENTRIES_PER_PAGE: usize = BLOCK_SIZE / DIRECTORY_ENTRY_SIZE;

/// Directory pages needed to cover the catalog space.
pub const DIRECTORY_PAGES: usize = (MAX_DSN as usize).div_ceil(ENTRIES_PER_PAGE);

/// Fixed part of the header preceding the page table.
const HEADER_FIXED_SIZE: usize = 32;

/// Header size in bytes.
pub const HEADER_SIZE: usize = HEADER_FIXED_SIZE + DIRECTORY_PAGES * 4 + 4;

/// Container header stored in block 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Magic bytes: "AWDM"
    pub magic: [u8; 4],
    /// File format version.
    pub version: u16,
    /// Block size in bytes.
    pub block_size: u32,
    /// Number of slots in the catalog space.
    pub capacity: u32,
    /// Blocks in the file.
    pub block_count: u32,
    /// First block never allocated.
    pub next_block: u32,
    /// Slots currently holding a record.
    pub live_slots: u32,
    /// Allocated blocks no longer referenced.
    pub dead_blocks: u32,
    /// Block holding each directory page, 0 if unallocated.
    pub directory: Vec<u32>,
}

impl ContainerHeader {
    /// Creates the header of an empty container with `block_count` blocks.
    pub fn new(block_count: u32) -> Self {
        Self {
            magic: CONTAINER_MAGIC,
            version: CONTAINER_VERSION,
            block_size: BLOCK_SIZE as u32,
            capacity: MAX_DSN,
            block_count,
            next_block: 1,
            live_slots: 0,
            dead_blocks: 0,
            directory: vec![0; DIRECTORY_PAGES],
        }
    }

    fn encode_fields(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        // Magic (4 bytes)
        buf.extend_from_slice(&self.magic);
        // Version (2 bytes)
        buf.extend_from_slice(&self.version.to_le_bytes());
        // Reserved (2 bytes)
        buf.extend_from_slice(&[0u8; 2]);
        buf.extend_from_slice(&self.block_size.to_le_bytes());
        buf.extend_from_slice(&self.capacity.to_le_bytes());
        buf.extend_from_slice(&self.block_count.to_le_bytes());
        buf.extend_from_slice(&self.next_block.to_le_bytes());
        buf.extend_from_slice(&self.live_slots.to_le_bytes());
        buf.extend_from_slice(&self.dead_blocks.to_le_bytes());
        for page in &self.directory {
            buf.extend_from_slice(&page.to_le_bytes());
        }
        buf
    }

    /// Writes the header followed by its CRC32.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let buf = self.encode_fields();
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&buf);
        writer.write_all(&buf)?;
        writer.write_all(&hasher.finalize().to_le_bytes())?;
        Ok(())
    }

    /// Reads and verifies a header.
    ///
    /// # Errors
    ///
    /// Returns `WdmError::InvalidMagic`, `WdmError::UnsupportedVersion` or
    /// `WdmError::ChecksumMismatch` for a header this version cannot trust.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        reader.read_exact(&mut buf)?;

        let magic: [u8; 4] = buf[0..4].try_into().unwrap();
        if magic != CONTAINER_MAGIC {
            return Err(WdmError::InvalidMagic(magic));
        }

        let version = u16::from_le_bytes(buf[4..6].try_into().unwrap());
        if version > CONTAINER_VERSION {
            return Err(WdmError::UnsupportedVersion(version));
        }

        let crc_offset = HEADER_SIZE - 4;
        let expected = u32::from_le_bytes(buf[crc_offset..HEADER_SIZE].try_into().unwrap());
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&buf[..crc_offset]);
        let actual = hasher.finalize();
        if expected != actual {
            return Err(WdmError::ChecksumMismatch { expected, actual });
        }

        let field = |offset: usize| u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap());
        let directory = (0..DIRECTORY_PAGES)
            .map(|page| field(HEADER_FIXED_SIZE + page * 4))
            .collect();

        let header = Self {
            magic,
            version,
            block_size: field(8),
            capacity: field(12),
            block_count: field(16),
            next_block: field(20),
            live_slots: field(24),
            dead_blocks: field(28),
            directory,
        };

        if header.block_size as usize != BLOCK_SIZE {
            return Err(WdmError::Corrupt(format!(
                "unexpected block size {}",
                header.block_size
            )));
        }
        if header.next_block > header.block_count || header.next_block == 0 {
            return Err(WdmError::Corrupt(format!(
                "allocation cursor {} outside {} blocks",
                header.next_block, header.block_count
            )));
        }

        Ok(header)
    }

    /// Returns the directory page and entry index for a DSN.
    pub fn locate(dsn: Dsn) -> (usize, usize) {
        let index = (dsn - 1) as usize;
        (index / ENTRIES_PER_PAGE, index % ENTRIES_PER_PAGE)
    }
}

/// Location of a slot record. A zero `first_block` marks an empty slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectoryEntry {
    /// First block of the record.
    pub first_block: u32,
    /// Blocks occupied by the record.
    pub block_count: u32,
    /// Encoded record length in bytes.
    pub byte_len: u32,
    /// CRC32 of the encoded record.
    pub crc32: u32,
}

impl DirectoryEntry {
    /// Returns true if the entry references no record.
    pub fn is_empty(&self) -> bool {
        self.first_block == 0
    }

    /// Encodes the entry.
    pub fn to_bytes(&self) -> [u8; DIRECTORY_ENTRY_SIZE] {
        let mut buf = [0u8; DIRECTORY_ENTRY_SIZE];
        buf[0..4].copy_from_slice(&self.first_block.to_le_bytes());
        buf[4..8].copy_from_slice(&self.block_count.to_le_bytes());
        buf[8..12].copy_from_slice(&self.byte_len.to_le_bytes());
        buf[12..16].copy_from_slice(&self.crc32.to_le_bytes());
        buf
    }

    /// Decodes an entry.
    pub fn from_bytes(buf: &[u8; DIRECTORY_ENTRY_SIZE]) -> Self {
        Self {
            first_block: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            block_count: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            byte_len: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            crc32: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
        }
    }
}

/// A slot's label and stored points.
///
/// Binary format (little-endian):
///
/// ```text
/// u8     time_code
/// u32    tstep
/// i32    base_year
/// f64    tsfill
/// str×6  tstype, statid, scenario, location, description, constituent
///        (u16 length + UTF-8 each)
/// u32    point_count
/// i64×N  timestamps
/// f64×N  values, missing values stored as tsfill
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SlotRecord {
    /// Slot metadata.
    pub label: SlotLabel,
    /// Stored points.
    pub series: TimeSeries,
}

impl SlotRecord {
    /// Creates a record.
    pub fn new(label: SlotLabel, series: TimeSeries) -> Self {
        Self { label, series }
    }

    /// Encodes the record.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let points = self.series.points();
        let mut buf = Vec::with_capacity(64 + points.len() * 16);
        let label = &self.label;

        buf.push(label.time_code.code());
        buf.extend_from_slice(&label.tstep.to_le_bytes());
        buf.extend_from_slice(&label.base_year.to_le_bytes());
        buf.extend_from_slice(&label.tsfill.to_le_bytes());
        for text in [
            &label.tstype,
            &label.statid,
            &label.scenario,
            &label.location,
            &label.description,
            &label.constituent,
        ] {
            write_str(&mut buf, text)?;
        }

        let point_count = u32::try_from(points.len()).map_err(|_| {
            WdmError::InvalidArgument(format!("{} points exceed a record", points.len()))
        })?;
        buf.extend_from_slice(&point_count.to_le_bytes());
        for (ts, _) in points {
            buf.extend_from_slice(&ts.to_le_bytes());
        }
        for (_, value) in points {
            let stored = if value.is_nan() { label.tsfill } else { *value };
            buf.extend_from_slice(&stored.to_le_bytes());
        }
        Ok(buf)
    }

    /// Decodes a record.
    ///
    /// # Errors
    ///
    /// Returns `WdmError::Corrupt` if the buffer is truncated or malformed.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut cursor = buf;

        let time_code = TimeCode::from_u8(read_array::<1>(&mut cursor)?[0])
            .ok_or_else(|| WdmError::Corrupt("unknown time-code".to_string()))?;
        let tstep = u32::from_le_bytes(read_array(&mut cursor)?);
        let base_year = i32::from_le_bytes(read_array(&mut cursor)?);
        let tsfill = f64::from_le_bytes(read_array(&mut cursor)?);
        let tstype = read_str(&mut cursor)?;
        let statid = read_str(&mut cursor)?;
        let scenario = read_str(&mut cursor)?;
        let location = read_str(&mut cursor)?;
        let description = read_str(&mut cursor)?;
        let constituent = read_str(&mut cursor)?;

        let point_count = u32::from_le_bytes(read_array(&mut cursor)?) as usize;
        if cursor.len() != point_count * 16 {
            return Err(WdmError::Corrupt(format!(
                "record holds {} bytes for {} points",
                cursor.len(),
                point_count
            )));
        }
        let (ts_bytes, value_bytes) = cursor.split_at(point_count * 8);
        let points: Vec<(Timestamp, f64)> = ts_bytes
            .chunks_exact(8)
            .zip(value_bytes.chunks_exact(8))
            .map(|(ts, value)| {
                let ts = i64::from_le_bytes(ts.try_into().unwrap());
                let value = f64::from_le_bytes(value.try_into().unwrap());
                let value = if value == tsfill { f64::NAN } else { value };
                (ts, value)
            })
            .collect();
        let series = TimeSeries::from_points(points)
            .map_err(|e| WdmError::Corrupt(format!("stored series: {}", e)))?;

        Ok(Self {
            label: SlotLabel {
                tstype,
                base_year,
                time_code,
                tstep,
                statid,
                scenario,
                location,
                description,
                constituent,
                tsfill,
            },
            series,
        })
    }
}

fn write_str(buf: &mut Vec<u8>, text: &str) -> Result<()> {
    let bytes = text.as_bytes();
    let len = u16::try_from(bytes.len()).map_err(|_| {
        WdmError::InvalidArgument(format!("label text of {} bytes is too long", bytes.len()))
    })?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn read_array<const N: usize>(cursor: &mut &[u8]) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    cursor
        .read_exact(&mut out)
        .map_err(|_| WdmError::Corrupt("truncated record".to_string()))?;
    Ok(out)
}

fn read_str(cursor: &mut &[u8]) -> Result<String> {
    let len = u16::from_le_bytes(read_array(cursor)?) as usize;
    if cursor.len() < len {
        return Err(WdmError::Corrupt("truncated label text".to_string()));
    }
    let (text, rest) = cursor.split_at(len);
    *cursor = rest;
    String::from_utf8(text.to_vec())
        .map_err(|e| WdmError::Corrupt(format!("Invalid UTF-8 in label: {}", e)))
}

/// CRC32 of an encoded record.
pub fn record_crc(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        assert_eq!(DIRECTORY_PAGES, 125);
        assert_eq!(ENTRIES_PER_PAGE, 256);
        assert_eq!(HEADER_SIZE, 536);
        assert!(HEADER_SIZE <= BLOCK_SIZE);
        let mut buf = Vec::new();
        ContainerHeader::new(INITIAL_BLOCKS).write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);
    }

    #[test]
    fn test_header_round_trip() {
        let mut header = ContainerHeader::new(12);
        header.next_block = 7;
        header.live_slots = 3;
        header.dead_blocks = 2;
        header.directory[4] = 5;

        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        let decoded = ContainerHeader::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_header_invalid_magic() {
        let mut buf = Vec::new();
        ContainerHeader::new(INITIAL_BLOCKS).write_to(&mut buf).unwrap();
        buf[0..4].copy_from_slice(b"XXXX");
        let result = ContainerHeader::read_from(&mut buf.as_slice());
        assert!(matches!(result, Err(WdmError::InvalidMagic(_))));
    }

    #[test]
    fn test_header_checksum_mismatch() {
        let mut buf = Vec::new();
        ContainerHeader::new(INITIAL_BLOCKS).write_to(&mut buf).unwrap();
        buf[24] ^= 0xFF;
        let result = ContainerHeader::read_from(&mut buf.as_slice());
        assert!(matches!(result, Err(WdmError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_locate() {
        assert_eq!(ContainerHeader::locate(1), (0, 0));
        assert_eq!(ContainerHeader::locate(256), (0, 255));
        assert_eq!(ContainerHeader::locate(257), (1, 0));
        assert_eq!(ContainerHeader::locate(32_000), (124, 255));
    }

    #[test]
    fn test_directory_entry_bytes() {
        let entry = DirectoryEntry {
            first_block: 3,
            block_count: 2,
            byte_len: 5000,
            crc32: 0xDEADBEEF,
        };
        assert_eq!(DirectoryEntry::from_bytes(&entry.to_bytes()), entry);
        assert!(DirectoryEntry::default().is_empty());
    }

    #[test]
    fn test_record_missing_values_use_fill() {
        let label = SlotLabel::new()
            .with_location("SITE")
            .with_tsfill(-1.0);
        let series = TimeSeries::from_points(vec![(0, 1.5), (60, f64::NAN)]).unwrap();
        let record = SlotRecord::new(label, series);

        let bytes = record.encode().unwrap();
        let fill_bytes = (-1.0f64).to_le_bytes();
        assert_eq!(&bytes[bytes.len() - 8..], &fill_bytes);

        let decoded = SlotRecord::decode(&bytes).unwrap();
        assert_eq!(decoded, record);
        assert!(decoded.series.points()[1].1.is_nan());
    }

    #[test]
    fn test_record_truncated() {
        let record = SlotRecord::new(SlotLabel::default(), TimeSeries::new());
        let bytes = record.encode().unwrap();
        let result = SlotRecord::decode(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(WdmError::Corrupt(_))));
    }
}
