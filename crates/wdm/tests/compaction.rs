//! Integration tests for clean copy (compaction).
//!
//! Covers metadata and data preservation, same-path refusal, best-effort
//! handling of unreadable slots and dead-space reclamation.

use alopex_wdm::container::ContainerInfo;
use alopex_wdm::series::timestamp;
use alopex_wdm::{
    Catalog, ContainerConfig, ContainerEngine, DateRange, Dsn, Result, SlotDescription,
    SlotLabel, SlotOutcome, StorageEngine, SyncMode, TimeCode, TimeSeries, WdmError,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn engine() -> ContainerEngine {
    ContainerEngine::new(ContainerConfig::default().with_sync_mode(SyncMode::None))
}

fn catalog() -> Catalog {
    Catalog::new(engine())
}

fn daily(start: i64, count: i64) -> TimeSeries {
    TimeSeries::from_points((0..count).map(|i| (start + i * 86_400, i as f64 * 0.5)).collect())
        .unwrap()
}

/// Builds a source container with slots 101 (daily) and 500 (monthly).
fn populated_source(temp_dir: &TempDir) -> PathBuf {
    let path = temp_dir.path().join("source.wdm");
    let catalog = catalog();
    catalog.create_container(&path, false).unwrap();

    let start = timestamp(1990, 1, 1, 0, 0, 0).unwrap();
    catalog
        .create_slot(
            &path,
            101,
            SlotLabel::new()
                .with_scenario("OBSERVED")
                .with_location("RIVER")
                .with_constituent("FLOW")
                .with_description("Daily flow"),
        )
        .unwrap();
    catalog.write_slot(&path, 101, &daily(start, 365)).unwrap();

    let monthly = TimeSeries::from_points(
        (1..=12)
            .map(|month| (timestamp(1990, month, 1, 0, 0, 0).unwrap(), f64::from(month)))
            .collect(),
    )
    .unwrap();
    catalog
        .create_slot(
            &path,
            500,
            SlotLabel::new()
                .with_frequency(TimeCode::Month, 1)
                .with_location("BASIN")
                .with_constituent("PREC")
                .with_tsfill(0.0),
        )
        .unwrap();
    catalog.write_slot(&path, 500, &monthly).unwrap();
    path
}

/// Delegates to the container engine but fails reads of one slot.
struct UnreadableSlotEngine {
    inner: ContainerEngine,
    unreadable: Dsn,
}

impl StorageEngine for UnreadableSlotEngine {
    fn create_container(&self, path: &Path, overwrite: bool) -> Result<()> {
        self.inner.create_container(path, overwrite)
    }

    fn container_info(&self, path: &Path) -> Result<ContainerInfo> {
        self.inner.container_info(path)
    }

    fn create_slot(&self, path: &Path, dsn: Dsn, label: &SlotLabel) -> Result<()> {
        self.inner.create_slot(path, dsn, label)
    }

    fn describe_slot(&self, path: &Path, dsn: Dsn) -> Result<Option<SlotDescription>> {
        self.inner.describe_slot(path, dsn)
    }

    fn read_slot(&self, path: &Path, dsn: Dsn, range: &DateRange) -> Result<TimeSeries> {
        if dsn == self.unreadable {
            return Err(WdmError::Corrupt(format!("DSN {} is unreadable", dsn)));
        }
        self.inner.read_slot(path, dsn, range)
    }

    fn write_slot(&self, path: &Path, dsn: Dsn, series: &TimeSeries) -> Result<()> {
        self.inner.write_slot(path, dsn, series)
    }

    fn delete_slot(&self, path: &Path, dsn: Dsn) -> Result<()> {
        self.inner.delete_slot(path, dsn)
    }

    fn rename_slot(&self, path: &Path, old: Dsn, new: Dsn) -> Result<()> {
        self.inner.rename_slot(path, old, new)
    }

    fn copy_label(&self, src: &Path, src_dsn: Dsn, dst: &Path, dst_dsn: Dsn) -> Result<()> {
        self.inner.copy_label(src, src_dsn, dst, dst_dsn)
    }
}

// ============================================================================
// Clean Copy
// ============================================================================

#[test]
fn test_clean_copy_preserves_slots() {
    let temp_dir = TempDir::new().unwrap();
    let src = populated_source(&temp_dir);
    let dst = temp_dir.path().join("clean.wdm");
    let catalog = catalog();

    let report = catalog.clean_copy(&src, &dst, false).unwrap();
    assert_eq!(report.copied(), vec![101, 500]);
    assert!(report.skipped().is_empty());

    for dsn in [101, 500] {
        let before = catalog.describe_slot(&src, dsn).unwrap();
        let after = catalog.describe_slot(&dst, dsn).unwrap();
        assert_eq!(before, after);
        assert_eq!(
            catalog.read_slot(&src, dsn, &DateRange::all()).unwrap(),
            catalog.read_slot(&dst, dsn, &DateRange::all()).unwrap()
        );
    }
    assert_eq!(catalog.active_dsns(&dst).unwrap(), vec![101, 500]);
}

#[test]
fn test_clean_copy_onto_itself_is_refused() {
    let temp_dir = TempDir::new().unwrap();
    let src = populated_source(&temp_dir);
    let before = std::fs::read(&src).unwrap();

    let result = catalog().clean_copy(&src, &src, true);
    assert!(matches!(result, Err(WdmError::InvalidArgument(_))));
    assert_eq!(std::fs::read(&src).unwrap(), before);
}

#[test]
fn test_clean_copy_existing_destination() {
    let temp_dir = TempDir::new().unwrap();
    let src = populated_source(&temp_dir);
    let dst = temp_dir.path().join("taken.wdm");
    let catalog = catalog();
    catalog.create_container(&dst, false).unwrap();

    assert!(matches!(
        catalog.clean_copy(&src, &dst, false),
        Err(WdmError::ContainerExists(_))
    ));
    let report = catalog.clean_copy(&src, &dst, true).unwrap();
    assert_eq!(report.copied().len(), 2);
}

#[test]
fn test_clean_copy_missing_source_creates_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let src = temp_dir.path().join("missing.wdm");
    let dst = temp_dir.path().join("out.wdm");

    assert!(matches!(
        catalog().clean_copy(&src, &dst, false),
        Err(WdmError::ContainerNotFound(_))
    ));
    assert!(!dst.exists());
}

/// A slot that cannot be read is skipped; the rest are still copied and
/// the skipped key leaves nothing behind in the output.
#[test]
fn test_clean_copy_skips_unreadable_slot() {
    let temp_dir = TempDir::new().unwrap();
    let src = populated_source(&temp_dir);
    let dst = temp_dir.path().join("partial.wdm");

    let failing = Catalog::new(UnreadableSlotEngine {
        inner: engine(),
        unreadable: 101,
    });
    let report = failing.clean_copy(&src, &dst, false).unwrap();

    assert_eq!(report.copied(), vec![500]);
    let skipped = report.skipped();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].0, 101);
    assert!(skipped[0].1.contains("unreadable"));
    assert_eq!(
        report.outcomes[0],
        SlotOutcome::Skipped {
            dsn: 101,
            reason: skipped[0].1.to_string(),
        }
    );

    let catalog = catalog();
    assert!(catalog.probe_slot(&dst, 101).unwrap().is_none());
    assert_eq!(catalog.active_dsns(&dst).unwrap(), vec![500]);
}

#[test]
fn test_clean_copy_reclaims_dead_space() {
    let temp_dir = TempDir::new().unwrap();
    let src = temp_dir.path().join("bloated.wdm");
    let dst = temp_dir.path().join("compact.wdm");
    let catalog = catalog();
    catalog.create_container(&src, false).unwrap();
    catalog
        .create_slot(&src, 1, SlotLabel::new().with_frequency(TimeCode::Hour, 1))
        .unwrap();

    let start = timestamp(2000, 1, 1, 0, 0, 0).unwrap();
    let series =
        TimeSeries::from_points((0..10_000).map(|i| (start + i * 3_600, i as f64)).collect())
            .unwrap();
    for _ in 0..3 {
        catalog.write_slot(&src, 1, &series).unwrap();
    }
    assert!(catalog.container_info(&src).unwrap().dead_blocks > 0);

    let report = catalog.clean_copy(&src, &dst, false).unwrap();
    assert!(report.bytes_reclaimed() > 0);
    assert!(report.output_bytes < report.source_bytes);

    let info = catalog.container_info(&dst).unwrap();
    assert_eq!(info.dead_blocks, 0);
    assert_eq!(info.live_slots, 1);
    assert_eq!(
        catalog.read_slot(&dst, 1, &DateRange::all()).unwrap(),
        series
    );
}
