//! Single-slot copy.
//!
//! A copy is two steps against the same destination identity: the label is
//! copied, creating the destination slot, then the full series is read and
//! written into it. A failure after the first step leaves the destination
//! slot created without data; it is not rolled back.
//!
//! The engine's label copy refuses to work within one container, so a copy
//! whose source and destination are the same file goes through a temporary
//! container: source to temporary under the destination key, then temporary
//! back into the original container. The temporary container is removed on
//! every exit path.

use crate::catalog::Catalog;
use crate::container::{same_container, Dsn, StorageEngine};
use crate::error::{Result, WdmError};
use crate::series::DateRange;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// File name of the temporary container inside its scratch directory.
const SCRATCH_CONTAINER: &str = "temp.wdm";

/// A temporary container and its enclosing directory, removed on drop.
struct ScratchContainer {
    dir: TempDir,
    path: PathBuf,
}

impl ScratchContainer {
    fn create<E: StorageEngine>(catalog: &Catalog<E>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("wdm-copy-");
        let dir = match &catalog.config().scratch_dir {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        let path = dir.path().join(SCRATCH_CONTAINER);
        catalog.engine().create_container(&path, false)?;
        debug!("Created scratch container {}", path.display());
        Ok(Self { dir, path })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the container and its directory. A failed removal is logged;
    /// the copy it served has already completed.
    fn close(self) {
        let dir = self.dir.path().to_path_buf();
        if let Err(err) = self.dir.close() {
            warn!("Failed to remove scratch container {}: {}", dir.display(), err);
        }
    }
}

impl<E: StorageEngine> Catalog<E> {
    /// Copies `src_dsn` in `src` to `dst_dsn` in `dst`, label and data.
    ///
    /// # Errors
    ///
    /// Returns `WdmError::SlotExists` if the destination slot is occupied and
    /// `WdmError::SlotEmpty` if the source slot is empty.
    pub fn copy_slot(
        &self,
        src: impl AsRef<Path>,
        src_dsn: Dsn,
        dst: impl AsRef<Path>,
        dst_dsn: Dsn,
    ) -> Result<()> {
        let (src, dst) = (src.as_ref(), dst.as_ref());
        if same_container(src, dst) {
            self.copy_within(src, src_dsn, dst_dsn)
        } else {
            self.copy_between(src, src_dsn, dst, dst_dsn)
        }
    }

    fn copy_between(&self, src: &Path, src_dsn: Dsn, dst: &Path, dst_dsn: Dsn) -> Result<()> {
        self.engine().copy_label(src, src_dsn, dst, dst_dsn)?;
        let series = self.engine().read_slot(src, src_dsn, &DateRange::all())?;
        if !series.is_empty() {
            self.engine().write_slot(dst, dst_dsn, &series)?;
        }
        Ok(())
    }

    fn copy_within(&self, path: &Path, src_dsn: Dsn, dst_dsn: Dsn) -> Result<()> {
        if self.engine().describe_slot(path, src_dsn)?.is_none() {
            return Err(WdmError::SlotEmpty(src_dsn));
        }
        if self.engine().describe_slot(path, dst_dsn)?.is_some() {
            return Err(WdmError::SlotExists(dst_dsn));
        }

        let scratch = ScratchContainer::create(self)?;
        self.copy_between(path, src_dsn, scratch.path(), dst_dsn)?;
        self.copy_between(scratch.path(), dst_dsn, path, dst_dsn)?;
        scratch.close();

        debug!(
            "Copied DSN {} to {} within {}",
            src_dsn,
            dst_dsn,
            path.display()
        );
        Ok(())
    }
}
