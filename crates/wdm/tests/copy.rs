//! Integration tests for single-slot copy, within and across containers.

use alopex_wdm::container::ContainerInfo;
use alopex_wdm::series::timestamp;
use alopex_wdm::{
    Catalog, CatalogConfig, ContainerConfig, ContainerEngine, DateRange, Dsn, Result,
    SlotDescription, SlotLabel, StorageEngine, SyncMode, TimeCode, TimeSeries, WdmError,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn engine() -> ContainerEngine {
    ContainerEngine::new(ContainerConfig::default().with_sync_mode(SyncMode::None))
}

fn catalog_with_scratch(scratch: &Path) -> Catalog {
    Catalog::with_config(engine(), CatalogConfig::default().with_scratch_dir(scratch))
}

/// Delegates to the container engine but refuses data writes to one file.
struct ReadOnlyDataEngine {
    inner: ContainerEngine,
    protected: PathBuf,
}

impl StorageEngine for ReadOnlyDataEngine {
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
        self.inner.read_slot(path, dsn, range)
    }

    fn write_slot(&self, path: &Path, dsn: Dsn, series: &TimeSeries) -> Result<()> {
        if path == self.protected {
            return Err(WdmError::Corrupt(format!(
                "DSN {} in {} is not writable",
                dsn,
                path.display()
            )));
        }
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

fn hourly(start: i64, count: i64) -> TimeSeries {
    TimeSeries::from_points((0..count).map(|i| (start + i * 3_600, 10.0 - i as f64)).collect())
        .unwrap()
}

fn label() -> SlotLabel {
    SlotLabel::new()
        .with_frequency(TimeCode::Hour, 1)
        .with_statid("01646500")
        .with_location("GAUGE")
        .with_constituent("FLOW")
}

fn container_with_slot(catalog: &Catalog, dir: &Path, name: &str, dsn: u32) -> PathBuf {
    let path = dir.join(name);
    catalog.create_container(&path, false).unwrap();
    catalog.create_slot(&path, dsn, label()).unwrap();
    let start = timestamp(2010, 6, 1, 0, 0, 0).unwrap();
    catalog.write_slot(&path, dsn, &hourly(start, 72)).unwrap();
    path
}

fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[test]
fn test_copy_within_same_container() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let catalog = catalog_with_scratch(scratch.path());
    let path = container_with_slot(&catalog, work.path(), "same.wdm", 101);

    catalog.copy_slot(&path, 101, &path, 1101).unwrap();

    let original = catalog.describe_slot(&path, 101).unwrap();
    let copy = catalog.describe_slot(&path, 1101).unwrap();
    assert_eq!(copy.label, original.label);
    assert_eq!(copy.start, original.start);
    assert_eq!(copy.end, original.end);
    assert_eq!(
        catalog.read_slot(&path, 1101, &DateRange::all()).unwrap(),
        catalog.read_slot(&path, 101, &DateRange::all()).unwrap()
    );
    assert_eq!(catalog.active_dsns(&path).unwrap(), vec![101, 1101]);
    assert!(is_empty_dir(scratch.path()));
}

#[test]
fn test_copy_within_rejects_occupied_destination() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let catalog = catalog_with_scratch(scratch.path());
    let path = container_with_slot(&catalog, work.path(), "occupied.wdm", 101);
    catalog.create_slot(&path, 102, SlotLabel::new()).unwrap();

    assert!(matches!(
        catalog.copy_slot(&path, 101, &path, 102),
        Err(WdmError::SlotExists(102))
    ));
    assert!(matches!(
        catalog.copy_slot(&path, 7, &path, 8),
        Err(WdmError::SlotEmpty(7))
    ));
    assert!(is_empty_dir(scratch.path()));
    assert_eq!(catalog.active_dsns(&path).unwrap(), vec![101, 102]);
}

#[test]
fn test_copy_between_containers() {
    let work = TempDir::new().unwrap();
    let catalog = catalog_with_scratch(work.path());
    let src = container_with_slot(&catalog, work.path(), "a.wdm", 101);
    let dst = work.path().join("b.wdm");
    catalog.create_container(&dst, false).unwrap();

    catalog.copy_slot(&src, 101, &dst, 5).unwrap();
    let copy = catalog.describe_slot(&dst, 5).unwrap();
    assert_eq!(copy.label.statid, "01646500");
    assert_eq!(copy.point_count, 72);
    assert_eq!(
        catalog.read_slot(&dst, 5, &DateRange::all()).unwrap(),
        catalog.read_slot(&src, 101, &DateRange::all()).unwrap()
    );

    assert!(matches!(
        catalog.copy_slot(&src, 101, &dst, 5),
        Err(WdmError::SlotExists(5))
    ));
}

#[test]
fn test_copy_from_empty_slot_fails() {
    let work = TempDir::new().unwrap();
    let catalog = catalog_with_scratch(work.path());
    let src = work.path().join("a.wdm");
    let dst = work.path().join("b.wdm");
    catalog.create_container(&src, false).unwrap();
    catalog.create_container(&dst, false).unwrap();

    assert!(matches!(
        catalog.copy_slot(&src, 42, &dst, 42),
        Err(WdmError::SlotEmpty(42))
    ));
    assert!(catalog.probe_slot(&dst, 42).unwrap().is_none());
}

/// A failure on the hop back into the original container still removes the
/// temporary container and reports the failure.
#[test]
fn test_copy_within_failure_removes_scratch() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let catalog = catalog_with_scratch(scratch.path());
    let path = container_with_slot(&catalog, work.path(), "hop.wdm", 101);

    let failing = Catalog::with_config(
        ReadOnlyDataEngine {
            inner: engine(),
            protected: path.clone(),
        },
        CatalogConfig::default().with_scratch_dir(scratch.path()),
    );
    let result = failing.copy_slot(&path, 101, &path, 1101);
    assert!(matches!(result, Err(WdmError::Corrupt(msg)) if msg.contains("not writable")));
    assert!(is_empty_dir(scratch.path()));

    // The label hop is not rolled back; the slot exists without data.
    assert_eq!(catalog.describe_slot(&path, 1101).unwrap().point_count, 0);
    assert_eq!(catalog.describe_slot(&path, 101).unwrap().point_count, 72);
}
