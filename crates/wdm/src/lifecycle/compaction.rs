//! Clean copy (compaction) of a container.
//!
//! Deleting or rewriting a slot leaves its old blocks as dead space; the only
//! way to reclaim it is to rebuild the container. [`Catalog::clean_copy`]
//! creates a fresh destination, enumerates every active slot of the source
//! and copies each under the same key. A slot that fails to copy is skipped
//! and reported, so one bad record never blocks the rest.

use crate::catalog::Catalog;
use crate::container::{same_container, Dsn, StorageEngine};
use crate::error::{Result, WdmError};
use std::path::Path;
use tracing::{debug, warn};

/// Result of copying one slot during compaction.
///
/// # Examples
/// ```rust,ignore
/// use alopex_wdm::lifecycle::compaction::SlotOutcome;
///
/// let outcome = SlotOutcome::Copied { dsn: 101 };
/// assert!(outcome.is_copied());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOutcome {
    /// The slot was copied with its label and data.
    Copied {
        /// Slot key.
        dsn: Dsn,
    },
    /// The slot could not be copied and is absent from the output.
    Skipped {
        /// Slot key.
        dsn: Dsn,
        /// The failure that caused the skip.
        reason: String,
    },
}

impl SlotOutcome {
    /// Slot key.
    pub fn dsn(&self) -> Dsn {
        match self {
            Self::Copied { dsn } | Self::Skipped { dsn, .. } => *dsn,
        }
    }

    /// Returns true if the slot was copied.
    pub fn is_copied(&self) -> bool {
        matches!(self, Self::Copied { .. })
    }
}

/// Compaction result metadata.
///
/// # Examples
/// ```rust,ignore
/// use alopex_wdm::lifecycle::compaction::CompactionReport;
///
/// let report = CompactionReport::default();
/// assert!(report.copied().is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Per-slot outcomes in ascending DSN order.
    pub outcomes: Vec<SlotOutcome>,
    /// Size of the source container in bytes.
    pub source_bytes: u64,
    /// Size of the rebuilt container in bytes.
    pub output_bytes: u64,
}

impl CompactionReport {
    /// Keys copied into the output.
    pub fn copied(&self) -> Vec<Dsn> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.is_copied())
            .map(SlotOutcome::dsn)
            .collect()
    }

    /// Keys skipped, with the reason.
    pub fn skipped(&self) -> Vec<(Dsn, &str)> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                SlotOutcome::Skipped { dsn, reason } => Some((*dsn, reason.as_str())),
                SlotOutcome::Copied { .. } => None,
            })
            .collect()
    }

    /// Bytes by which the output is smaller than the source.
    pub fn bytes_reclaimed(&self) -> u64 {
        self.source_bytes.saturating_sub(self.output_bytes)
    }
}

impl<E: StorageEngine> Catalog<E> {
    /// Rebuilds `src` into a fresh container at `dst` holding only its active
    /// slots.
    ///
    /// # Errors
    ///
    /// Returns `WdmError::InvalidArgument` if both paths name the same
    /// container, before anything is touched. Fails if the source cannot be
    /// opened or the destination cannot be created. Failures copying an
    /// individual slot are reported in the returned outcomes instead.
    ///
    /// # Examples
    /// ```rust,ignore
    /// use alopex_wdm::Catalog;
    ///
    /// let catalog: Catalog = Catalog::default();
    /// let report = catalog.clean_copy("legacy.wdm", "clean.wdm", true)?;
    /// for (dsn, reason) in report.skipped() {
    ///     eprintln!("DSN {} skipped: {}", dsn, reason);
    /// }
    /// ```
    pub fn clean_copy(
        &self,
        src: impl AsRef<Path>,
        dst: impl AsRef<Path>,
        overwrite: bool,
    ) -> Result<CompactionReport> {
        let (src, dst) = (src.as_ref(), dst.as_ref());
        if same_container(src, dst) {
            return Err(WdmError::InvalidArgument(format!(
                "The source container {} cannot be the same as the destination",
                src.display()
            )));
        }

        let source = self.container_info(src)?;
        self.create_container(dst, overwrite)?;

        // Drain the enumeration before the first write.
        let active = self.active_dsns(src)?;

        let mut report = CompactionReport {
            source_bytes: source.file_bytes,
            ..CompactionReport::default()
        };
        for dsn in active {
            match self.copy_slot(src, dsn, dst, dsn) {
                Ok(()) => report.outcomes.push(SlotOutcome::Copied { dsn }),
                Err(err) => {
                    warn!(
                        "Skipping DSN {} while compacting {}: {}",
                        dsn,
                        src.display(),
                        err
                    );
                    self.discard_partial(dst, dsn);
                    report.outcomes.push(SlotOutcome::Skipped {
                        dsn,
                        reason: err.to_string(),
                    });
                }
            }
        }

        report.output_bytes = self.container_info(dst)?.file_bytes;
        debug!(
            "Compacted {} into {}: {} copied, {} skipped, {} -> {} bytes",
            src.display(),
            dst.display(),
            report.copied().len(),
            report.skipped().len(),
            report.source_bytes,
            report.output_bytes
        );
        Ok(report)
    }

    /// Removes a slot left half-copied in the output.
    fn discard_partial(&self, dst: &Path, dsn: Dsn) {
        match self.probe_slot(dst, dsn) {
            Ok(Some(_)) => {
                if let Err(err) = self.delete_slot(dst, dsn) {
                    warn!("Failed to remove partial DSN {} from {}: {}", dsn, dst.display(), err);
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!("Failed to probe partial DSN {} in {}: {}", dsn, dst.display(), err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_helpers() {
        let report = CompactionReport {
            outcomes: vec![
                SlotOutcome::Copied { dsn: 1 },
                SlotOutcome::Skipped {
                    dsn: 2,
                    reason: "Checksum mismatch".to_string(),
                },
                SlotOutcome::Copied { dsn: 3 },
            ],
            source_bytes: 100,
            output_bytes: 40,
        };
        assert_eq!(report.copied(), vec![1, 3]);
        assert_eq!(report.skipped(), vec![(2, "Checksum mismatch")]);
        assert_eq!(report.bytes_reclaimed(), 60);
        assert_eq!(report.outcomes[1].dsn(), 2);
    }

    #[test]
    fn test_report_output_larger_than_source() {
        let report = CompactionReport {
            source_bytes: 10,
            output_bytes: 40,
            ..Default::default()
        };
        assert_eq!(report.bytes_reclaimed(), 0);
    }
}
