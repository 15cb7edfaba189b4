//! Searchlab Minute Series
//!
//! Minute-resolution series table. Rows carry the event instant and a
//! `yyyy-MM-dd HH:mm` rendering of it. Loading a persisted table repairs
//! legacy exports: out-of-order rows, corrupt date strings, date-only values
//! and rows written before the data migration.
//!
//! @version 0.1.0
//! @author Searchlab Development Team

use super::{DataType, Granularity, SeriesTable};
use crate::codec::{self, DecodeOptions};
use crate::column::Column;
use crate::table::IndexedTable;
use crate::types::{ColumnDef, ColumnType, Schema, Value};
use chrono::{DateTime, TimeZone, Utc};
use searchlab_common::{LegacyConfig, Result, SearchlabError};
use searchlab_storage::{StorageBackend, StoragePath};

pub const TS_TIME: &str = "ts.time";
pub const TS_DATE: &str = "ts.date";
pub const MINUTE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Render epoch milliseconds as `yyyy-MM-dd HH:mm` in UTC.
pub fn format_minute(t: &DateTime<Utc>) -> String {
    t.format(MINUTE_FORMAT).to_string()
}

// =============================================================================
// Granularity
// =============================================================================

/// Minute granularity; coordinates are epoch milliseconds.
pub struct Minute;

impl Granularity for Minute {
    type Coordinate = i64;

    const NAME: &'static str = "minute";

    fn time_columns() -> Vec<ColumnDef> {
        vec![ColumnDef::instant(TS_TIME), ColumnDef::string(TS_DATE)]
    }

    fn time_values(at: &i64) -> Result<Vec<Value>> {
        if *at <= 0 {
            return Err(SearchlabError::InvalidValue(format!(
                "minute timestamp must be positive, got {}",
                at
            )));
        }
        let t = Utc
            .timestamp_millis_opt(*at)
            .single()
            .ok_or_else(|| SearchlabError::InvalidValue(format!("timestamp {} out of range", at)))?;
        Ok(vec![Value::Instant(t), Value::String(format_minute(&t))])
    }

    fn coordinate_at(table: &IndexedTable, row: usize) -> Option<i64> {
        table.column_at(0).and_then(|c| c.get_i64(row))
    }

    fn ordinal(at: &i64) -> i64 {
        *at
    }
}

pub type MinuteSeriesTable = SeriesTable<Minute>;

// =============================================================================
// Minute Operations
// =============================================================================

impl SeriesTable<Minute> {
    /// Instant of the first row.
    pub fn first_time(&self) -> Option<DateTime<Utc>> {
        self.table.column_at(0).and_then(|c| c.get_instant(0))
    }

    /// Instant of the last row.
    pub fn last_time(&self) -> Option<DateTime<Utc>> {
        let last = self.size().checked_sub(1)?;
        self.table.column_at(0).and_then(|c| c.get_instant(last))
    }

    /// Running totals: one row per input row, with every data column
    /// replaced by its cumulative sum up to and including that row.
    pub fn aggregation(&self) -> Result<Self> {
        let mut out = self.empty_clone();
        let data_start = self.data_start();
        let mut int_sums = vec![0i64; self.data_names.len()];
        let mut float_sums = vec![0f64; self.data_names.len()];

        for row in self.table.rows() {
            let (head, data) = row.split_at(data_start);
            let mut values = head.to_vec();
            for (i, value) in data.iter().enumerate() {
                values.push(match value {
                    Value::Int64(v) => {
                        int_sums[i] += v;
                        Value::Int64(int_sums[i])
                    }
                    other => {
                        float_sums[i] += other.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0);
                        Value::Float64(float_sums[i])
                    }
                });
            }
            out.table.add_row(values)?;
        }
        Ok(out)
    }

    /// Encode and write the table; failures are logged and reported as false.
    pub fn store(&self, storage: &dyn StorageBackend, path: &StoragePath) -> bool {
        codec::store(storage, path, &self.table)
    }

    /// Load a persisted minute table and repair legacy rows.
    pub fn load(
        storage: &dyn StorageBackend,
        path: &StoragePath,
        data_type: DataType,
        legacy: &LegacyConfig,
    ) -> Result<Self> {
        let raw = codec::load(
            storage,
            path,
            |name| Self::resolve_column_type(name, data_type),
            &DecodeOptions::from(legacy),
        )?;
        let cutoff = legacy.migration_cutoff_instant()?;
        let repaired = repair_legacy_rows(raw, &legacy.recent_year_prefix)?;

        let mut table = Self::from_table(&repaired, data_type)?;
        table.delete_before(cutoff.timestamp_millis());
        Ok(table)
    }
}

// =============================================================================
// Legacy Repair
// =============================================================================

/// Repair a raw minute table: name the first two columns as time and date
/// if the export lacks them, sort by time, copy the previous valid
/// (time, date) pair into rows with a corrupt date, and re-render date-only
/// values from a plausible time.
fn repair_legacy_rows(raw: IndexedTable, recent_year_prefix: &str) -> Result<IndexedTable> {
    let mut table = ensure_time_columns(raw)?;
    table.sort_by(TS_TIME)?;

    let time_idx = table
        .column_index(TS_TIME)
        .ok_or_else(|| SearchlabError::ColumnNotFound(TS_TIME.to_string()))?;
    let date_idx = table
        .column_index(TS_DATE)
        .ok_or_else(|| SearchlabError::ColumnNotFound(TS_DATE.to_string()))?;
    let (Some(Column::Instant(times)), Some(Column::String(dates))) =
        (table.column_at(time_idx), table.column_at(date_idx))
    else {
        return Err(SearchlabError::TypeMismatch(
            "minute table needs an instant time and a string date column".to_string(),
        ));
    };

    let now = Utc::now();
    let mut times = times.clone();
    let mut dates = dates.clone();
    let mut last_time = DateTime::<Utc>::default();
    let mut last_date = String::new();
    let mut repaired = 0usize;

    for i in 0..times.len() {
        if !dates[i].starts_with(recent_year_prefix) {
            times[i] = last_time;
            dates[i] = last_date.clone();
            repaired += 1;
            continue;
        }
        if dates[i].len() == 10 {
            let t = times[i];
            if t.timestamp_millis() <= 0 || t > now {
                times[i] = last_time;
                dates[i] = last_date.clone();
            } else {
                dates[i] = format_minute(&t);
            }
            repaired += 1;
        }
        last_time = times[i];
        last_date = dates[i].clone();
    }
    if repaired > 0 {
        tracing::warn!("repaired {} legacy rows in minute table", repaired);
    }

    let mut columns: Vec<Column> = (0..table.column_count())
        .filter_map(|c| table.column_at(c).cloned())
        .collect();
    columns[time_idx] = Column::Instant(times);
    columns[date_idx] = Column::String(dates);
    IndexedTable::from_columns(table.schema().clone(), columns)
}

/// Old exports may lack the time column names; the first two columns then
/// hold time and date.
fn ensure_time_columns(raw: IndexedTable) -> Result<IndexedTable> {
    if raw.column_index(TS_TIME).is_some() && raw.column_index(TS_DATE).is_some() {
        return Ok(raw);
    }
    if raw.column_count() < 2 {
        return Err(SearchlabError::Schema(
            "minute table needs at least a time and a date column".to_string(),
        ));
    }
    tracing::warn!("minute table without time columns, using the first two columns");
    let mut defs = Vec::with_capacity(raw.column_count());
    let mut columns = Vec::with_capacity(raw.column_count());
    for (i, def) in raw.schema().columns().iter().enumerate() {
        let Some(column) = raw.column_at(i) else {
            continue;
        };
        match i {
            0 => {
                defs.push(ColumnDef::instant(TS_TIME));
                columns.push(column.coerce(ColumnType::Instant)?);
            }
            1 => {
                defs.push(ColumnDef::string(TS_DATE));
                columns.push(column.coerce(ColumnType::String)?);
            }
            _ => {
                defs.push(def.clone());
                columns.push(column.clone());
            }
        }
    }
    IndexedTable::from_columns(Schema::new(defs)?, columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use searchlab_storage::MemoryBackend;

    fn millis(text: &str) -> i64 {
        crate::types::parse_instant(text)
            .expect("instant should parse")
            .timestamp_millis()
    }

    #[test]
    fn test_add_values_and_accessors() {
        let mut table = MinuteSeriesTable::new(&["view.id"], &["meta.ip"], &["data.requests"], DataType::Int64)
            .expect("table should be created");
        let t = millis("2023-03-06 10:15");
        table
            .add_values(t, &["u1"], &["10.0.0.1"], &[3i64])
            .expect("add_values should succeed");

        assert_eq!(table.size(), 1);
        assert_eq!(table.coordinate(0), Some(t));
        assert_eq!(table.view(0), vec!["u1"]);
        assert_eq!(table.meta(0), vec!["10.0.0.1"]);
        assert_eq!(table.long_data(0), vec![3]);
        assert_eq!(table.table().cell(0, 1), Some(Value::from("2023-03-06 10:15")));
        assert_eq!(table.get_long_values(t, &["u1"]), Some(vec![3]));
        assert_eq!(table.get_long_values(t, &["u2"]), None);
        assert_eq!(table.meta_where(&["u1"]), Some(vec!["10.0.0.1".to_string()]));
    }

    #[test]
    fn test_rejects_non_positive_timestamp() {
        let mut table = MinuteSeriesTable::new(&[], &[], &["data.x"], DataType::Float64)
            .expect("table should be created");
        assert!(table.add_values(0, &[], &[], &[1.0]).is_err());
        assert!(table.add_values(-5, &[], &[], &[1.0]).is_err());
        assert_eq!(table.size(), 0);
    }

    #[test]
    #[should_panic(expected = "view has 0 values")]
    fn test_shape_mismatch_panics() {
        let mut table = MinuteSeriesTable::new(&["view.id"], &[], &["data.x"], DataType::Float64)
            .expect("table should be created");
        let _ = table.add_values(1000, &[], &[], &[1.0]);
    }

    #[test]
    fn test_prefixes_are_enforced() {
        assert!(MinuteSeriesTable::new(&["id"], &[], &[], DataType::Int64).is_err());
        assert!(MinuteSeriesTable::new(&[], &["data.x"], &[], DataType::Int64).is_err());
    }

    #[test]
    fn test_aggregation_running_sum() {
        let mut table = MinuteSeriesTable::new(&["view.v1"], &[], &["data.d1"], DataType::Int64)
            .expect("table should be created");
        table.add_values(1000, &["a"], &[], &[5i64]).expect("add_values should succeed");
        table.add_values(2000, &["a"], &[], &[7i64]).expect("add_values should succeed");

        let aggregated = table.aggregation().expect("aggregation should succeed");
        assert_eq!(aggregated.size(), 2);
        assert_eq!(aggregated.coordinate(0), Some(1000));
        assert_eq!(aggregated.long_data(0), vec![5]);
        assert_eq!(aggregated.coordinate(1), Some(2000));
        assert_eq!(aggregated.view(1), vec!["a"]);
        assert_eq!(aggregated.long_data(1), vec![12]);
    }

    #[test]
    fn test_delete_before_and_sort() {
        let mut table = MinuteSeriesTable::new(&[], &[], &["data.x"], DataType::Float64)
            .expect("table should be created");
        for t in [3000i64, 1000, 2000] {
            table.add_values(t, &[], &[], &[t as f64]).expect("add_values should succeed");
        }
        table.sort();
        assert_eq!(table.first_coordinate(), Some(1000));
        assert_eq!(table.last_coordinate(), Some(3000));

        table.table().where_eq(TS_DATE, "x");
        table.delete_before(2000);
        assert_eq!(table.size(), 2);
        assert_eq!(table.first_coordinate(), Some(2000));
        assert_eq!(table.table().cached_index_count(), 0);
    }

    #[test]
    fn test_set_values_where_first_match_only() {
        let mut table = MinuteSeriesTable::new(&["view.id"], &["meta.m"], &["data.x"], DataType::Float64)
            .expect("table should be created");
        table.add_values(1000, &["a"], &["old"], &[1.0]).expect("add_values should succeed");
        table.add_values(1000, &["a"], &["old"], &[2.0]).expect("add_values should succeed");

        assert!(table.set_values_where(1000, &["a"], &["new"], &[9.0]).expect("update should succeed"));
        assert_eq!(table.data(0), vec![9.0]);
        assert_eq!(table.meta(0), vec!["new"]);
        assert_eq!(table.data(1), vec![2.0]);

        assert!(!table.set_values_where(1000, &["b"], &["new"], &[9.0]).expect("update should succeed"));
        assert_eq!(table.size(), 2);
    }

    #[test]
    fn test_load_repairs_legacy_rows() {
        let storage = MemoryBackend::new();
        let path = StoragePath::new("bucket", "audit/requests.csv");
        let text = "\
ts.time;ts.date;view.id;data.requests
2023-01-01T10:02:00.000Z;2023-01-01 10:02;b;2
2023-01-01T10:01:00.000Z;2023-01-01 10:01;a;1
2023-01-01T10:03:00.000Z;1970-01-01 00:00;c;3
2023-01-01T10:04:00.000Z;2023-01-01;d;4
2021-01-01T00:00:00.000Z;2021-01-01 00:00;old;5
";
        storage.write(&path, text.as_bytes()).expect("write should succeed");

        let table = MinuteSeriesTable::load(&storage, &path, DataType::Int64, &LegacyConfig::default())
            .expect("load should succeed");

        // the 2021 row predates the migration cutoff
        assert_eq!(table.size(), 4);
        assert_eq!(table.view(0), vec!["a"]);
        assert_eq!(table.view(1), vec!["b"]);
        // corrupt date copies the previous valid time and date
        assert_eq!(table.coordinate(2), Some(millis("2023-01-01 10:02")));
        assert_eq!(table.table().cell(2, 1), Some(Value::from("2023-01-01 10:02")));
        // date-only value is re-rendered from its time
        assert_eq!(table.table().cell(3, 1), Some(Value::from("2023-01-01 10:04")));
        assert_eq!(table.long_data(3), vec![4]);
    }

    #[test]
    fn test_load_missing_object() {
        let storage = MemoryBackend::new();
        let result = MinuteSeriesTable::load(
            &storage,
            &StoragePath::new("bucket", "none.csv"),
            DataType::Int64,
            &LegacyConfig::default(),
        );
        assert!(result.unwrap_err().is_not_found());
    }
}
