//! Searchlab Week Series
//!
//! Calendar-week series table. Weekly reports are usually pre-filled with
//! one zero row per week and then updated in place as data arrives.
//!
//! @version 0.1.0
//! @author Searchlab Development Team

use super::{DataType, Granularity, SeriesTable};
use crate::calendar_week::CalendarWeek;
use crate::codec::DecodeOptions;
use crate::table::IndexedTable;
use crate::types::{ColumnDef, Value};
use chrono::{NaiveDate, TimeZone, Utc};
use searchlab_common::{Result, SearchlabError};
use searchlab_storage::{StorageBackend, StoragePath};

pub const TSCW_DATE: &str = "tscw.date";
pub const TSCW_TIME: &str = "tscw.time";
pub const TSCW_YEAR: &str = "tscw.year";
pub const TSCW_WEEK: &str = "tscw.week";
pub const TSCW_SYKW: &str = "tscw.sykw";
pub const TSCW_CALD: &str = "tscw.cald";
pub const TSCW_PRNT: &str = "tscw.prnt";

const YEAR_COLUMN: usize = 2;
const WEEK_COLUMN: usize = 3;

pub struct Week;

impl Granularity for Week {
    type Coordinate = CalendarWeek;

    const NAME: &'static str = "week";

    fn time_columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::instant(TSCW_DATE),
            ColumnDef::int64(TSCW_TIME),
            ColumnDef::int64(TSCW_YEAR),
            ColumnDef::int64(TSCW_WEEK),
            ColumnDef::string(TSCW_SYKW),
            ColumnDef::string(TSCW_CALD),
            ColumnDef::string(TSCW_PRNT),
        ]
    }

    fn time_values(at: &CalendarWeek) -> Result<Vec<Value>> {
        let millis = at.start_millis();
        let start = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| SearchlabError::InvalidValue(format!("week {} out of range", at)))?;
        Ok(vec![
            Value::Instant(start),
            Value::Int64(millis),
            Value::Int64(i64::from(at.year())),
            Value::Int64(i64::from(at.week())),
            Value::String(at.yyyyww()),
            Value::String(at.first_day_of_week().format("%Y-%m-%d").to_string()),
            Value::String(at.print_label()),
        ])
    }

    fn coordinate_at(table: &IndexedTable, row: usize) -> Option<CalendarWeek> {
        let year = table.column_at(YEAR_COLUMN)?.get_i64(row)?;
        let week = table.column_at(WEEK_COLUMN)?.get_i64(row)?;
        CalendarWeek::new(i32::try_from(year).ok()?, u32::try_from(week).ok()?).ok()
    }

    fn ordinal(at: &CalendarWeek) -> i64 {
        i64::from(at.year()) * 100 + i64::from(at.week())
    }
}

pub type WeekSeriesTable = SeriesTable<Week>;

// =============================================================================
// Week Data
// =============================================================================

/// View, meta and data values of one week row.
#[derive(Debug, Clone, PartialEq)]
pub struct WeekData {
    pub view: Vec<String>,
    pub meta: Vec<String>,
    pub data: Vec<(String, f64)>,
}

impl WeekData {
    pub fn data_by_name(&self, name: &str) -> Option<f64> {
        self.data.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

// =============================================================================
// Week Operations
// =============================================================================

impl SeriesTable<Week> {
    /// Append one zero-valued row per calendar week from the first week of
    /// `from_year` up to, not including, the first week of `to_year`.
    pub fn init(&mut self, view: &[&str], meta: &[&str], from_year: i32, to_year: i32) -> Result<()> {
        let zeros = vec![0i64; self.data_names.len()];
        let end = CalendarWeek::new(to_year, 1)?;
        let mut week = CalendarWeek::new(from_year, 1)?;
        while week < end {
            self.add_values(week, view, meta, &zeros)?;
            week = week.inc();
        }
        tracing::debug!("initialized {} week rows for {}..{}", self.size(), from_year, to_year);
        Ok(())
    }

    /// Values of the first row for the given week.
    pub fn week_data(&self, year: i32, week: u32) -> Option<WeekData> {
        let at = CalendarWeek::new(year, week).ok()?;
        let row = self.row_index(at, None)?;
        Some(WeekData {
            view: self.view(row),
            meta: self.meta(row),
            data: self.data_names.iter().cloned().zip(self.data(row)).collect(),
        })
    }

    /// Monday of the first week.
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.first_coordinate().map(|w| w.first_day_of_week())
    }

    /// Sunday of the last week.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.last_coordinate().map(|w| w.last_day_of_week())
    }

    pub fn last_week(&self) -> Option<CalendarWeek> {
        self.last_coordinate()
    }

    /// Keep only rows from the first week of `year` on.
    pub fn delete_before_year(&mut self, year: i32) -> Result<()> {
        let start = CalendarWeek::new(year, 1)?;
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

    fn week(y: i32, w: u32) -> CalendarWeek {
        CalendarWeek::new(y, w).expect("week should be valid")
    }

    #[test]
    fn test_init_and_update_in_place() {
        let mut table = WeekSeriesTable::new(&[], &[], &["data.v"], DataType::Float64)
            .expect("table should be created");
        table.init(&[], &[], 2023, 2024).expect("init should succeed");
        assert_eq!(table.size(), 52);
        assert_eq!(table.get_values(week(2023, 10), &[]), Some(vec![0.0]));

        let updated = table
            .set_values_where(week(2023, 10), &[], &[], &[42.0])
            .expect("update should succeed");
        assert!(updated);
        assert_eq!(table.size(), 52);
        assert_eq!(table.get_values(week(2023, 10), &[]), Some(vec![42.0]));
        assert_eq!(table.get_values(week(2023, 11), &[]), Some(vec![0.0]));
    }

    #[test]
    fn test_init_spans_53_week_year() {
        let mut table = WeekSeriesTable::new(&["view.shop"], &[], &["data.n"], DataType::Int64)
            .expect("table should be created");
        table.init(&["s1"], &[], 2020, 2022).expect("init should succeed");
        assert_eq!(table.size(), 53 + 52);
        assert_eq!(table.first_coordinate(), Some(week(2020, 1)));
        assert_eq!(table.last_week(), Some(week(2021, 52)));
        assert_eq!(table.first_date(), NaiveDate::from_ymd_opt(2019, 12, 30));
        assert_eq!(table.last_date(), NaiveDate::from_ymd_opt(2022, 1, 2));

        table.delete_before_year(2021).expect("delete should succeed");
        assert_eq!(table.size(), 52);
    }

    #[test]
    fn test_week_data() {
        let mut table = WeekSeriesTable::new(&["view.shop"], &["meta.city"], &["data.a", "data.b"], DataType::Float64)
            .expect("table should be created");
        table
            .add_values(week(2023, 10), &["s1"], &["Paris"], &[1.0, 2.5])
            .expect("add_values should succeed");

        let data = table.week_data(2023, 10).expect("week should be present");
        assert_eq!(data.view, vec!["s1"]);
        assert_eq!(data.meta, vec!["Paris"]);
        assert_eq!(data.data_by_name("data.b"), Some(2.5));
        assert_eq!(data.data_by_name("data.c"), None);
        assert!(table.week_data(2023, 11).is_none());
        assert!(table.week_data(2023, 53).is_none());
    }

    #[test]
    fn test_generated_columns_and_reload() {
        let storage = MemoryBackend::new();
        let path = StoragePath::new("bucket", "weeks.csv");
        let mut table = WeekSeriesTable::new(&[], &[], &["data.v"], DataType::Int64)
            .expect("table should be created");
        table.add_values(week(2023, 10), &[], &[], &[3i64]).expect("add_values should succeed");

        let t = table.table();
        assert_eq!(t.cell(0, 4), Some(Value::from("202310")));
        assert_eq!(t.cell(0, 5), Some(Value::from("2023-03-06")));
        assert_eq!(t.cell(0, 6), Some(Value::from("2023 KW10 6.3.-12.3.")));
        assert_eq!(t.cell(0, 1), Some(Value::Int64(week(2023, 10).start_millis())));

        assert!(codec::store(&storage, &path, table.table()));
        let loaded = WeekSeriesTable::load(&storage, &path, DataType::Int64, &DecodeOptions::default())
            .expect("load should succeed");
        assert_eq!(loaded.get_long_values(week(2023, 10), &[]), Some(vec![3]));
    }
}
