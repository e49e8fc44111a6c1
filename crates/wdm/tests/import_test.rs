//! Integration tests for CSV and HYDHR import into slots.

use alopex_wdm::series::timestamp;
use alopex_wdm::{
    Catalog, ContainerConfig, ContainerEngine, DateRange, SlotLabel, SyncMode, TimeCode, TimeSeries,
    WdmError,
};
use std::io::Cursor;
use tempfile::TempDir;

fn catalog() -> Catalog {
    Catalog::new(ContainerEngine::new(
        ContainerConfig::default().with_sync_mode(SyncMode::None),
    ))
}

#[test]
fn test_import_csv_into_daily_slot() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("csv.wdm");
    let catalog = catalog();
    catalog.create_container(&path, false).unwrap();
    catalog.create_slot(&path, 1, SlotLabel::new()).unwrap();

    let input = "Datetime,Flow\n2001-03-01,1.0\n2001-03-02,2.0\n2001-03-03,3.0\n2001-03-04,4.0\n";
    let range = DateRange::all().with_end(timestamp(2001, 3, 3, 0, 0, 0).unwrap());
    catalog
        .import_csv(&path, 1, Cursor::new(input), &range)
        .unwrap();

    let stored = catalog.read_slot(&path, 1, &DateRange::all()).unwrap();
    assert_eq!(stored.values().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
    assert_eq!(stored.start(), Some(timestamp(2001, 3, 1, 0, 0, 0).unwrap()));
}

#[test]
fn test_import_csv_frequency_checked() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("hourly.wdm");
    let catalog = catalog();
    catalog.create_container(&path, false).unwrap();
    catalog
        .create_slot(&path, 1, SlotLabel::new().with_frequency(TimeCode::Hour, 1))
        .unwrap();

    let input = "2001,3,1,0,0,0,1.0\n2001,3,2,0,0,0,2.0\n";
    assert!(matches!(
        catalog.import_csv(&path, 1, Cursor::new(input), &DateRange::all()),
        Err(WdmError::FrequencyMismatch { slot: 3, data: 4 })
    ));
}

#[test]
fn test_import_hydhr_into_hourly_slot() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("hydhr.wdm");
    let catalog = catalog();
    catalog.create_container(&path, false).unwrap();
    catalog
        .create_slot(&path, 10, SlotLabel::new().with_frequency(TimeCode::Hour, 1))
        .unwrap();

    let morning = (0..12).map(|i| format!("{}.0", i)).collect::<Vec<_>>().join(" ");
    let evening = (12..24).map(|i| format!("{}.0", i)).collect::<Vec<_>>().join(" ");
    let input = format!(
        "RAIN0001 99 12 31 1 {}\nRAIN0001 99 12 31 2 {}\nRAIN0001  0  1  1 1 {}\n",
        morning, evening, morning
    );
    catalog
        .import_hydhr(&path, 10, Cursor::new(input), 1900)
        .unwrap();

    let description = catalog.describe_slot(&path, 10).unwrap();
    assert_eq!(description.point_count, 36);
    assert_eq!(description.start, Some(timestamp(1999, 12, 31, 0, 0, 0).unwrap()));
    assert_eq!(description.end, Some(timestamp(2000, 1, 1, 11, 0, 0).unwrap()));

    let stored = catalog.read_slot(&path, 10, &DateRange::all()).unwrap();
    assert_eq!(stored.get(timestamp(1999, 12, 31, 23, 0, 0).unwrap()), Some(23.0));
}

/// Extracted CSV reads back into a slot, even when the column name needs
/// quoting.
#[test]
fn test_extracted_csv_reimports() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("roundtrip.wdm");
    let catalog = catalog();
    catalog.create_container(&path, false).unwrap();
    catalog
        .create_slot(&path, 101, SlotLabel::new().with_location("N,FORK"))
        .unwrap();
    catalog.create_slot(&path, 102, SlotLabel::new()).unwrap();

    let start = timestamp(2001, 3, 2, 0, 0, 0).unwrap();
    let series = TimeSeries::from_points(
        (0..3).map(|i| (start + i * 86_400, 0.5 + i as f64)).collect(),
    )
    .unwrap();
    catalog.write_slot(&path, 101, &series).unwrap();

    let table = catalog.extract_dsns(&path, &[101], &DateRange::all()).unwrap();
    let mut out = Vec::new();
    table.write_iso_csv(&mut out).unwrap();
    assert!(String::from_utf8_lossy(&out).starts_with("Datetime,\"101_N,FORK\"\n"));

    catalog
        .import_csv(&path, 102, Cursor::new(out), &DateRange::all())
        .unwrap();
    assert_eq!(
        catalog.read_slot(&path, 102, &DateRange::all()).unwrap(),
        series
    );
}
