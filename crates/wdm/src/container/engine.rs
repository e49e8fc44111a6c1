//! File-backed storage engine.
//!
//! Every operation opens the container, reads its header, performs the
//! change and syncs before returning. Mutations follow a fixed order: record
//! blocks, then the header (committing the allocation), then the directory
//! entry. A crash between steps leaks blocks but never leaves an entry
//! pointing at unallocated space.

use crate::container::format::{
    record_crc, ContainerHeader, DirectoryEntry, SlotRecord, BLOCK_SIZE, DIRECTORY_ENTRY_SIZE,
    HEADER_SIZE, INITIAL_BLOCKS,
};
use crate::container::{
    check_dsn, same_container, ContainerInfo, Dsn, SlotDescription, SlotLabel, StorageEngine,
};
use crate::error::{Result, WdmError};
use crate::series::{DateRange, TimeSeries};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

/// Default upper bound on an encoded slot record.
pub const DEFAULT_MAX_RECORD_BYTES: usize = 256 * 1024 * 1024;

/// Durability applied after each mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Fsync data and metadata (default, highest durability).
    #[default]
    Fsync,
    /// Use fdatasync (skip metadata update, faster).
    Fdatasync,
    /// No sync (fastest, lowest durability - for testing only).
    None,
}

/// Configuration for [`ContainerEngine`].
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Sync mode for durability guarantees.
    pub sync_mode: SyncMode,
    /// Blocks in a freshly created container.
    pub initial_blocks: u32,
    /// Largest encoded record accepted by a write.
    pub max_record_bytes: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::default(),
            initial_blocks: INITIAL_BLOCKS,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }
}

impl ContainerConfig {
    /// Sets the sync mode.
    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    /// Sets the number of blocks in a fresh container (at least 1).
    pub fn with_initial_blocks(mut self, initial_blocks: u32) -> Self {
        self.initial_blocks = initial_blocks.max(1);
        self
    }

    /// Sets the largest encoded record accepted by a write.
    pub fn with_max_record_bytes(mut self, max_record_bytes: usize) -> Self {
        self.max_record_bytes = max_record_bytes;
        self
    }
}

/// The bundled [`StorageEngine`], storing each container in one block file.
#[derive(Debug, Clone, Default)]
pub struct ContainerEngine {
    config: ContainerConfig,
}

impl ContainerEngine {
    /// Creates an engine with the given configuration.
    pub fn new(config: ContainerConfig) -> Self {
        Self { config }
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    fn open(&self, path: &Path, writable: bool) -> Result<OpenContainer> {
        OpenContainer::open(path, writable, self.config.clone())
    }
}

impl StorageEngine for ContainerEngine {
    fn create_container(&self, path: &Path, overwrite: bool) -> Result<()> {
        if path.exists() && !overwrite {
            return Err(WdmError::ContainerExists(path.to_path_buf()));
        }

        let block_count = self.config.initial_blocks.max(1);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        ContainerHeader::new(block_count).write_to(&mut file)?;
        file.set_len(u64::from(block_count) * BLOCK_SIZE as u64)?;
        sync(&file, self.config.sync_mode)?;

        debug!(
            "Created container {} with {} blocks",
            path.display(),
            block_count
        );
        Ok(())
    }

    fn container_info(&self, path: &Path) -> Result<ContainerInfo> {
        let container = self.open(path, false)?;
        let file_bytes = container.file.metadata()?.len();
        Ok(ContainerInfo {
            path: path.to_path_buf(),
            file_bytes,
            capacity: container.header.capacity,
            live_slots: container.header.live_slots,
            dead_blocks: container.header.dead_blocks,
        })
    }

    fn create_slot(&self, path: &Path, dsn: Dsn, label: &SlotLabel) -> Result<()> {
        check_dsn(dsn)?;
        let mut container = self.open(path, true)?;
        if !container.entry(dsn)?.is_empty() {
            return Err(WdmError::SlotExists(dsn));
        }

        let record = SlotRecord::new(label.clone(), TimeSeries::new());
        container.put_record(dsn, &record)?;
        debug!("Created DSN {} in {}", dsn, path.display());
        Ok(())
    }

    fn describe_slot(&self, path: &Path, dsn: Dsn) -> Result<Option<SlotDescription>> {
        check_dsn(dsn)?;
        let mut container = self.open(path, false)?;
        let entry = container.entry(dsn)?;
        if entry.is_empty() {
            return Ok(None);
        }

        let record = container.read_record(&entry)?;
        Ok(Some(SlotDescription {
            dsn,
            start: record.series.start(),
            end: record.series.end(),
            point_count: record.series.len(),
            label: record.label,
        }))
    }

    fn read_slot(&self, path: &Path, dsn: Dsn, range: &DateRange) -> Result<TimeSeries> {
        check_dsn(dsn)?;
        let mut container = self.open(path, false)?;
        let record = container.occupied_record(dsn)?;
        if range.is_unbounded() {
            Ok(record.series)
        } else {
            Ok(record.series.clip(range))
        }
    }

    fn write_slot(&self, path: &Path, dsn: Dsn, series: &TimeSeries) -> Result<()> {
        check_dsn(dsn)?;
        let mut container = self.open(path, true)?;
        let record = container.occupied_record(dsn)?;

        let updated = SlotRecord::new(record.label, series.clone());
        container.put_record(dsn, &updated)?;
        debug!(
            "Wrote {} points to DSN {} in {}",
            series.len(),
            dsn,
            path.display()
        );
        Ok(())
    }

    fn delete_slot(&self, path: &Path, dsn: Dsn) -> Result<()> {
        check_dsn(dsn)?;
        let mut container = self.open(path, true)?;
        let entry = container.entry(dsn)?;
        if entry.is_empty() {
            return Err(WdmError::SlotEmpty(dsn));
        }

        container.header.live_slots = container.header.live_slots.saturating_sub(1);
        container.header.dead_blocks += entry.block_count;
        container.write_header()?;
        container.set_entry(dsn, DirectoryEntry::default())?;
        container.sync()?;
        debug!("Deleted DSN {} from {}", dsn, path.display());
        Ok(())
    }

    fn rename_slot(&self, path: &Path, old: Dsn, new: Dsn) -> Result<()> {
        check_dsn(old)?;
        check_dsn(new)?;
        let mut container = self.open(path, true)?;
        let entry = container.entry(old)?;
        if entry.is_empty() {
            return Err(WdmError::SlotEmpty(old));
        }
        if old == new {
            return Ok(());
        }
        if !container.entry(new)?.is_empty() {
            return Err(WdmError::SlotExists(new));
        }

        container.ensure_page(new)?;
        container.set_entry(new, entry)?;
        container.set_entry(old, DirectoryEntry::default())?;
        container.sync()?;
        debug!("Renumbered DSN {} to {} in {}", old, new, path.display());
        Ok(())
    }

    fn copy_label(&self, src: &Path, src_dsn: Dsn, dst: &Path, dst_dsn: Dsn) -> Result<()> {
        if same_container(src, dst) {
            return Err(WdmError::InvalidArgument(format!(
                "cannot copy a label within {}; copy through a temporary container",
                src.display()
            )));
        }
        check_dsn(src_dsn)?;
        let label = self.open(src, false)?.occupied_record(src_dsn)?.label;
        self.create_slot(dst, dst_dsn, &label)
    }
}

/// An open container file and its header.
struct OpenContainer {
    file: File,
    header: ContainerHeader,
    config: ContainerConfig,
}

impl OpenContainer {
    fn open(path: &Path, writable: bool, config: ContainerConfig) -> Result<Self> {
        if !path.is_file() {
            return Err(WdmError::ContainerNotFound(path.to_path_buf()));
        }
        let mut file = OpenOptions::new().read(true).write(writable).open(path)?;
        let header = ContainerHeader::read_from(&mut file)?;

        let file_len = file.metadata()?.len();
        if file_len < u64::from(header.block_count) * BLOCK_SIZE as u64 {
            return Err(WdmError::Corrupt(format!(
                "{} is shorter than its {} blocks",
                path.display(),
                header.block_count
            )));
        }

        Ok(Self {
            file,
            header,
            config,
        })
    }

    fn block_offset(block: u32) -> u64 {
        u64::from(block) * BLOCK_SIZE as u64
    }

    fn entry(&mut self, dsn: Dsn) -> Result<DirectoryEntry> {
        let (page, index) = ContainerHeader::locate(dsn);
        let page_block = self.header.directory[page];
        if page_block == 0 {
            return Ok(DirectoryEntry::default());
        }

        let offset = Self::block_offset(page_block) + (index * DIRECTORY_ENTRY_SIZE) as u64;
        let mut buf = [0u8; DIRECTORY_ENTRY_SIZE];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        let entry = DirectoryEntry::from_bytes(&buf);

        if !entry.is_empty()
            && u64::from(entry.first_block) + u64::from(entry.block_count)
                > u64::from(self.header.next_block)
        {
            return Err(WdmError::Corrupt(format!(
                "DSN {} points past the allocated blocks",
                dsn
            )));
        }
        if u64::from(entry.byte_len) > u64::from(entry.block_count) * BLOCK_SIZE as u64 {
            return Err(WdmError::Corrupt(format!(
                "DSN {} claims {} bytes in {} blocks",
                dsn, entry.byte_len, entry.block_count
            )));
        }
        Ok(entry)
    }

    fn set_entry(&mut self, dsn: Dsn, entry: DirectoryEntry) -> Result<()> {
        let (page, index) = ContainerHeader::locate(dsn);
        let page_block = self.header.directory[page];
        if page_block == 0 {
            return Err(WdmError::Corrupt(format!(
                "directory page {} is not allocated",
                page
            )));
        }
        let offset = Self::block_offset(page_block) + (index * DIRECTORY_ENTRY_SIZE) as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&entry.to_bytes())?;
        Ok(())
    }

    fn occupied_record(&mut self, dsn: Dsn) -> Result<SlotRecord> {
        let entry = self.entry(dsn)?;
        if entry.is_empty() {
            return Err(WdmError::SlotEmpty(dsn));
        }
        self.read_record(&entry)
    }

    fn read_record(&mut self, entry: &DirectoryEntry) -> Result<SlotRecord> {
        let mut buf = vec![0u8; entry.byte_len as usize];
        self.file
            .seek(SeekFrom::Start(Self::block_offset(entry.first_block)))?;
        self.file.read_exact(&mut buf)?;

        let actual = record_crc(&buf);
        if actual != entry.crc32 {
            return Err(WdmError::ChecksumMismatch {
                expected: entry.crc32,
                actual,
            });
        }
        SlotRecord::decode(&buf)
    }

    /// Reserves `count` blocks at the cursor, growing the file when needed.
    /// The reservation is committed by the next header write.
    fn allocate(&mut self, count: u32) -> Result<u32> {
        let first = self.header.next_block;
        let next = first
            .checked_add(count)
            .ok_or_else(|| WdmError::Corrupt("container block space exhausted".to_string()))?;
        self.header.next_block = next;
        if next > self.header.block_count {
            self.header.block_count = next;
            self.file.set_len(Self::block_offset(next))?;
        }
        Ok(first)
    }

    /// Allocates and zeroes the directory page covering `dsn` if missing.
    fn ensure_page(&mut self, dsn: Dsn) -> Result<()> {
        let (page, _) = ContainerHeader::locate(dsn);
        if self.header.directory[page] != 0 {
            return Ok(());
        }
        let block = self.allocate(1)?;
        self.file.seek(SeekFrom::Start(Self::block_offset(block)))?;
        self.file.write_all(&[0u8; BLOCK_SIZE])?;
        self.header.directory[page] = block;
        self.write_header()
    }

    /// Writes a record into fresh blocks and points `dsn` at it.
    fn put_record(&mut self, dsn: Dsn, record: &SlotRecord) -> Result<()> {
        let bytes = record.encode()?;
        if bytes.len() > self.config.max_record_bytes {
            return Err(WdmError::RecordTooLarge {
                len: bytes.len(),
                max: self.config.max_record_bytes,
            });
        }
        let byte_len = u32::try_from(bytes.len()).map_err(|_| WdmError::RecordTooLarge {
            len: bytes.len(),
            max: u32::MAX as usize,
        })?;
        let block_count = bytes.len().div_ceil(BLOCK_SIZE).max(1) as u32;

        let previous = self.entry(dsn)?;
        let first_block = self.allocate(block_count)?;
        self.file
            .seek(SeekFrom::Start(Self::block_offset(first_block)))?;
        self.file.write_all(&bytes)?;

        let (page, _) = ContainerHeader::locate(dsn);
        if self.header.directory[page] == 0 {
            let page_block = self.allocate(1)?;
            self.file
                .seek(SeekFrom::Start(Self::block_offset(page_block)))?;
            self.file.write_all(&[0u8; BLOCK_SIZE])?;
            self.header.directory[page] = page_block;
        }

        if previous.is_empty() {
            self.header.live_slots += 1;
        } else {
            self.header.dead_blocks += previous.block_count;
        }
        self.write_header()?;

        self.set_entry(
            dsn,
            DirectoryEntry {
                first_block,
                block_count,
                byte_len,
                crc32: record_crc(&bytes),
            },
        )?;
        self.sync()
    }

    fn write_header(&mut self) -> Result<()> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        self.header.write_to(&mut buf)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&buf)?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        sync(&self.file, self.config.sync_mode)
    }
}

fn sync(file: &File, mode: SyncMode) -> Result<()> {
    match mode {
        SyncMode::Fsync => file.sync_all()?,
        SyncMode::Fdatasync => file.sync_data()?,
        SyncMode::None => {}
    }
    Ok(())
}
