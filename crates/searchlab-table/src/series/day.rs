//! Searchlab Day Series
//!
//! Day-resolution series table keyed by a calendar date (UTC midnight).
//!
//! @version 0.1.0
//! @author Searchlab Development Team

use super::{DataType, Granularity, SeriesTable};
use crate::codec::DecodeOptions;
use crate::table::IndexedTable;
use crate::types::{ColumnDef, Value};
use chrono::{Datelike, NaiveDate, NaiveTime};
use searchlab_common::{Result, SearchlabError};
use searchlab_storage::{StorageBackend, StoragePath};

pub const TSD_DATE: &str = "tsd.date";
pub const TSD_TIME: &str = "tsd.time";
pub const TSD_YEAR: &str = "tsd.year";
pub const TSD_MONTH: &str = "tsd.month";
pub const TSD_DAY: &str = "tsd.day";
pub const TSD_CALD: &str = "tsd.cald";

pub struct Day;

impl Granularity for Day {
    type Coordinate = NaiveDate;

    const NAME: &'static str = "day";

    fn time_columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::instant(TSD_DATE),
            ColumnDef::int64(TSD_TIME),
            ColumnDef::int64(TSD_YEAR),
            ColumnDef::int64(TSD_MONTH),
            ColumnDef::int64(TSD_DAY),
            ColumnDef::string(TSD_CALD),
        ]
    }

    fn time_values(at: &NaiveDate) -> Result<Vec<Value>> {
        let t = at.and_time(NaiveTime::MIN).and_utc();
        Ok(vec![
            Value::Instant(t),
            Value::Int64(t.timestamp_millis()),
            Value::Int64(i64::from(at.year())),
            Value::Int64(i64::from(at.month())),
            Value::Int64(i64::from(at.day())),
            Value::String(at.format("%Y-%m-%d").to_string()),
        ])
    }

    fn coordinate_at(table: &IndexedTable, row: usize) -> Option<NaiveDate> {
        table
            .column_at(0)
            .and_then(|c| c.get_instant(row))
            .map(|t| t.date_naive())
    }

    fn ordinal(at: &NaiveDate) -> i64 {
        i64::from(at.num_days_from_ce())
    }
}

pub type DaySeriesTable = SeriesTable<Day>;

impl SeriesTable<Day> {
    /// Keep only rows from January 1st of `year` on.
    pub fn delete_before_year(&mut self, year: i32) -> Result<()> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| SearchlabError::InvalidValue(format!("invalid year {}", year)))?;
        self.delete_before(start);
        Ok(())
    }

    pub fn load(
        storage: &dyn StorageBackend,
        path: &StoragePath,
        data_type: DataType,
        options: &DecodeOptions,
    ) -> Result<Self> {
        Self::load_stored(storage, path, data_type, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use searchlab_storage::MemoryBackend;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date should be valid")
    }

    #[test]
    fn test_generated_time_columns() {
        let mut table = DaySeriesTable::new(&["view.id"], &[], &["data.x"], DataType::Float64)
            .expect("table should be created");
        table
            .add_values(date(2024, 2, 29), &["a"], &[], &[2.5])
            .expect("add_values should succeed");

        let t = table.table();
        assert_eq!(t.schema().names()[..6], [TSD_DATE, TSD_TIME, TSD_YEAR, TSD_MONTH, TSD_DAY, TSD_CALD]);
        assert_eq!(t.cell(0, 3), Some(Value::Int64(2)));
        assert_eq!(t.cell(0, 5), Some(Value::from("2024-02-29")));
        assert_eq!(table.coordinate(0), Some(date(2024, 2, 29)));
        assert_eq!(table.get_values(date(2024, 2, 29), &["a"]), Some(vec![2.5]));
        assert_eq!(table.get_values(date(2024, 3, 1), &["a"]), None);
    }

    #[test]
    fn test_sort_and_delete_before_year() {
        let mut table = DaySeriesTable::new(&[], &[], &["data.x"], DataType::Int64)
            .expect("table should be created");
        for (d, v) in [(date(2024, 1, 2), 3i64), (date(2023, 6, 1), 1), (date(2024, 1, 1), 2)] {
            table.add_values(d, &[], &[], &[v]).expect("add_values should succeed");
        }
        table.sort();
        assert_eq!(table.first_coordinate(), Some(date(2023, 6, 1)));
        assert_eq!(table.last_coordinate(), Some(date(2024, 1, 2)));

        table.delete_before_year(2024).expect("delete should succeed");
        assert_eq!(table.size(), 2);
        assert_eq!(table.long_data(0), vec![2]);
        assert_eq!(table.long_data(1), vec![3]);
    }

    #[test]
    fn test_load_drops_unit_columns() {
        let storage = MemoryBackend::new();
        let path = StoragePath::new("bucket", "days.csv");
        let text = "\
tsd.date;tsd.time;tsd.year;tsd.month;tsd.day;tsd.cald;view.id;unit.x;data.x
2023-05-01T00:00:00.000Z;1682899200000;2023;5;1;2023-05-01;a;ms;1.5
";
        storage.write(&path, text.as_bytes()).expect("write should succeed");
        let table = DaySeriesTable::load(&storage, &path, DataType::Float64, &DecodeOptions::default())
            .expect("load should succeed");

        assert_eq!(table.size(), 1);
        assert_eq!(table.view_names(), ["view.id"]);
        assert!(table.table().column("unit.x").is_none());
        assert_eq!(table.get_values(date(2023, 5, 1), &["a"]), Some(vec![1.5]));
        assert!(codec::encode(table.table()).is_ok());
    }

    #[test]
    fn test_load_uses_configured_placeholder_year() {
        let storage = MemoryBackend::new();
        let path = StoragePath::new("bucket", "days.csv");
        let text = "\
tsd.date;tsd.time;tsd.year;tsd.month;tsd.day;tsd.cald;view.id;data.x
0000-05-01T00:00:00.000Z;1556668800000;2019;5;1;2019-05-01;a;1.5
";
        storage.write(&path, text.as_bytes()).expect("write should succeed");
        let options = DecodeOptions { placeholder_year: 2019 };
        let table = DaySeriesTable::load(&storage, &path, DataType::Float64, &options)
            .expect("load should succeed");

        assert_eq!(table.coordinate(0), Some(date(2019, 5, 1)));
    }
}
