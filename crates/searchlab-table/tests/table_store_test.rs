//! Integration tests for Searchlab Table
//!
//! Exercises tables, series and the registry against the file-backed store.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use searchlab_common::LegacyConfig;
use searchlab_storage::{LocalBackend, StorageBackend, StoragePath};
use searchlab_table::codec;
use searchlab_table::{
    CalendarWeek, ColumnDef, DataType, DecodeOptions, IndexedTable, MinuteSeriesTable, Schema,
    TableRegistry, Value, WeekSeriesTable,
};
use tempfile::TempDir;

fn local_store() -> (TempDir, LocalBackend) {
    let dir = TempDir::new().expect("temp dir should be created");
    let storage = LocalBackend::new(dir.path().to_path_buf()).expect("backend should be created");
    (dir, storage)
}

fn visits() -> IndexedTable {
    let schema = Schema::new(vec![
        ColumnDef::string("view.page"),
        ColumnDef::string("meta.agent"),
        ColumnDef::int64("data.count"),
        ColumnDef::float64("data.share"),
    ])
    .expect("schema should be valid");
    let mut table = IndexedTable::new(schema);
    let rows = [
        ("/", "curl", 4, 0.25),
        ("/search", "firefox", 9, 0.5),
        ("/", "firefox", 2, 0.125),
        ("/about", "curl;bot", 1, 0.0625),
        ("/search", "chrome", 3, 0.0625),
    ];
    for (page, agent, count, share) in rows {
        table
            .add_row(vec![
                Value::from(page),
                Value::from(agent),
                Value::Int64(count),
                Value::Float64(share),
            ])
            .expect("add_row should succeed");
    }
    table
}

#[test]
fn test_csv_file_round_trip() {
    let (_dir, storage) = local_store();
    let path = StoragePath::new("searchlab", "reports/visits.csv");
    let table = visits();

    assert!(codec::store(&storage, &path, &table));
    let loaded = codec::load(
        &storage,
        &path,
        |name| table.schema().type_of(name).unwrap_or(searchlab_table::ColumnType::String),
        &DecodeOptions::default(),
    )
    .expect("load should succeed");

    assert_eq!(loaded, table);
    assert_eq!(loaded.cell(3, 1), Some(Value::from("curl;bot")));
}

#[test]
fn test_where_eq_matches_scan() {
    let table = visits();
    for (column, value) in [
        ("view.page", "/"),
        ("view.page", "/search"),
        ("view.page", "/missing"),
        ("meta.agent", "firefox"),
        ("data.count", "9"),
        ("data.share", "0.0625"),
        ("nope", "x"),
    ] {
        let scanned = table.scan_eq(column, value);
        assert_eq!(table.where_eq(column, value), scanned, "first lookup {}={}", column, value);
        assert_eq!(table.where_eq(column, value), scanned, "cached lookup {}={}", column, value);
    }
    assert!(table.cached_index_count() >= 2);
}

#[test]
fn test_index_invalidated_by_append() {
    let mut table = visits();
    assert_eq!(table.where_eq("view.page", "/").size(), 2);

    table.append(&visits()).expect("append should succeed");
    assert_eq!(table.where_eq("view.page", "/").size(), 4);
    assert_eq!(table.where_eq("view.page", "/"), table.scan_eq("view.page", "/"));
}

#[test]
fn test_minute_series_persistence() {
    let (_dir, storage) = local_store();
    let path = StoragePath::new("searchlab", "audit/requests.csv");

    let mut table = MinuteSeriesTable::new(&["view.id"], &["meta.ip"], &["data.requests"], DataType::Int64)
        .expect("table should be created");
    let start = Utc.with_ymd_and_hms(2023, 6, 1, 8, 0, 0).unwrap().timestamp_millis();
    for i in 0..10i64 {
        let id = format!("user{}", i % 3);
        table
            .add_values(start + i * 60_000, &[id.as_str()], &["10.0.0.1"], &[i])
            .expect("add_values should succeed");
    }
    assert!(table.store(&storage, &path));

    let loaded = MinuteSeriesTable::load(&storage, &path, DataType::Int64, &LegacyConfig::default())
        .expect("load should succeed");
    assert_eq!(loaded.size(), 10);
    assert_eq!(loaded.first_coordinate(), Some(start));
    assert_eq!(loaded.last_coordinate(), Some(start + 9 * 60_000));
    assert_eq!(loaded.get_long_values(start + 4 * 60_000, &["user1"]), Some(vec![4]));
    assert_eq!(loaded.meta_where(&["user2"]), Some(vec!["10.0.0.1".to_string()]));
    assert!(storage.last_modified(&path).is_ok());
}

#[test]
fn test_week_series_persistence() {
    let (_dir, storage) = local_store();
    let path = StoragePath::new("searchlab", "reports/weekly.csv");

    let mut table = WeekSeriesTable::new(&["view.shop"], &[], &["data.revenue"], DataType::Float64)
        .expect("table should be created");
    table.init(&["s1"], &[], 2024, 2025).expect("init should succeed");
    let week = CalendarWeek::new(2024, 13).expect("week should be valid");
    assert!(table
        .set_values_where(week, &["s1"], &[], &[99.5])
        .expect("update should succeed"));
    assert!(codec::store(&storage, &path, table.table()));

    let loaded = WeekSeriesTable::load(&storage, &path, DataType::Float64, &DecodeOptions::default())
        .expect("load should succeed");
    assert_eq!(loaded.size(), 52);
    assert_eq!(loaded.get_values(week, &["s1"]), Some(vec![99.5]));
    assert_eq!(loaded.get_values(week.inc(), &["s1"]), Some(vec![0.0]));

    let last_year = week.dec_year_business();
    assert_eq!(last_year, CalendarWeek::new(2023, 14).expect("week should be valid"));
}

#[test]
fn test_registry_over_local_store() {
    let (_dir, storage) = local_store();
    let storage: Arc<dyn StorageBackend> = Arc::new(storage);

    let mut registry = TableRegistry::new();
    registry.connect_storage(storage.clone(), StoragePath::new("searchlab", "tables"));
    registry.set_table("visits", visits());
    registry.store_table("visits").expect("store should succeed");

    let mut fresh = TableRegistry::new();
    fresh.connect_storage(storage, StoragePath::new("searchlab", "tables"));
    let result = fresh
        .where_("visits", &["view.page:/search", "meta.agent:chrome"])
        .expect("query should succeed");
    assert_eq!(result.size(), 1);
    assert_eq!(result.aggregate_int("data.count"), 3);
}
