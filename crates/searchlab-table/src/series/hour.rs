//! Searchlab Hour Series
//!
//! Hour-resolution series table keyed by a UTC date and hour of day.
//!
//! @version 0.1.0
//! @author Searchlab Development Team

use super::{DataType, Granularity, SeriesTable};
use crate::calendar_week::CalendarWeek;
use crate::codec::DecodeOptions;
use crate::table::IndexedTable;
use crate::types::{ColumnDef, Value};
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use searchlab_common::{Result, SearchlabError};
use searchlab_storage::{StorageBackend, StoragePath};
use std::fmt;

pub const TSH_DATE: &str = "tsh.date";
pub const TSH_TIME: &str = "tsh.time";
pub const TSH_YEAR: &str = "tsh.year";
pub const TSH_MONTH: &str = "tsh.month";
pub const TSH_DAY: &str = "tsh.day";
pub const TSH_HOUR: &str = "tsh.hour";
pub const TSH_SYKW: &str = "tsh.sykw";
pub const TSH_CALD: &str = "tsh.cald";

// =============================================================================
// Hour Stamp
// =============================================================================

/// One hour bucket in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HourStamp {
    date: NaiveDate,
    hour: u32,
}

impl HourStamp {
    pub fn new(year: i32, month: u32, day: u32, hour: u32) -> Result<Self> {
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            SearchlabError::InvalidValue(format!("invalid date {}-{}-{}", year, month, day))
        })?;
        Self::from_date(date, hour)
    }

    pub fn from_date(date: NaiveDate, hour: u32) -> Result<Self> {
        if hour > 23 {
            return Err(SearchlabError::InvalidValue(format!("invalid hour {}", hour)));
        }
        Ok(Self { date, hour })
    }

    /// Hour bucket holding an instant.
    pub fn from_instant(t: &DateTime<Utc>) -> Self {
        Self {
            date: t.date_naive(),
            hour: t.hour(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    /// Start of the hour.
    pub fn instant(&self) -> DateTime<Utc> {
        self.date
            .and_hms_opt(self.hour, 0, 0)
            .unwrap_or_default()
            .and_utc()
    }

    pub fn millis(&self) -> i64 {
        self.instant().timestamp_millis()
    }
}

impl fmt::Display for HourStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}T{:02}:00", self.date.format("%Y-%m-%d"), self.hour)
    }
}

// =============================================================================
// Granularity
// =============================================================================

pub struct Hour;

impl Granularity for Hour {
    type Coordinate = HourStamp;

    const NAME: &'static str = "hour";

    fn time_columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::instant(TSH_DATE),
            ColumnDef::int64(TSH_TIME),
            ColumnDef::int64(TSH_YEAR),
            ColumnDef::int64(TSH_MONTH),
            ColumnDef::int64(TSH_DAY),
            ColumnDef::int64(TSH_HOUR),
            ColumnDef::string(TSH_SYKW),
            ColumnDef::string(TSH_CALD),
        ]
    }

    fn time_values(at: &HourStamp) -> Result<Vec<Value>> {
        let t = at.instant();
        Ok(vec![
            Value::Instant(t),
            Value::Int64(t.timestamp_millis()),
            Value::Int64(i64::from(at.date.year())),
            Value::Int64(i64::from(at.date.month())),
            Value::Int64(i64::from(at.date.day())),
            Value::Int64(i64::from(at.hour)),
            Value::String(CalendarWeek::from_date(at.date).yyyyww()),
            Value::String(t.format("%Y-%m-%dT%H:%M").to_string()),
        ])
    }

    fn coordinate_at(table: &IndexedTable, row: usize) -> Option<HourStamp> {
        table
            .column_at(0)
            .and_then(|c| c.get_instant(row))
            .map(|t| HourStamp::from_instant(&t))
    }

    fn ordinal(at: &HourStamp) -> i64 {
        at.millis()
    }
}

pub type HourSeriesTable = SeriesTable<Hour>;

impl SeriesTable<Hour> {
    /// Keep only rows from January 1st of `year` on.
    pub fn delete_before_year(&mut self, year: i32) -> Result<()> {
        let start = HourStamp::new(year, 1, 1, 0)?;
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

    fn stamp(y: i32, m: u32, d: u32, h: u32) -> HourStamp {
        HourStamp::new(y, m, d, h).expect("stamp should be valid")
    }

    #[test]
    fn test_hour_stamp_validation() {
        assert!(HourStamp::new(2023, 2, 30, 1).is_err());
        assert!(HourStamp::new(2023, 2, 3, 24).is_err());
        assert_eq!(stamp(2023, 2, 3, 7).to_string(), "2023-02-03T07:00");
    }

    #[test]
    fn test_generated_time_columns() {
        let mut table = HourSeriesTable::new(&["view.host"], &[], &["data.hits"], DataType::Int64)
            .expect("table should be created");
        let at = stamp(2023, 1, 1, 13);
        table
            .add_values(at, &["a"], &[], &[4i64])
            .expect("add_values should succeed");

        let t = table.table();
        assert_eq!(t.cell(0, 1), Some(Value::Int64(at.millis())));
        assert_eq!(t.cell(0, 2), Some(Value::Int64(2023)));
        assert_eq!(t.cell(0, 5), Some(Value::Int64(13)));
        // January 1st 2023 is a Sunday in ISO week 52 of 2022
        assert_eq!(t.cell(0, 6), Some(Value::from("202252")));
        assert_eq!(t.cell(0, 7), Some(Value::from("2023-01-01T13:00")));
        assert_eq!(table.coordinate(0), Some(at));
    }

    #[test]
    fn test_size_grows_by_one_per_row() {
        let mut table = HourSeriesTable::new(&["view.id"], &["meta.m"], &["data.x"], DataType::Float64)
            .expect("table should be created");
        for h in 0..5u32 {
            let before = table.size();
            table
                .add_values(stamp(2023, 5, 1, h), &["v"], &["m"], &[f64::from(h) * 1.5])
                .expect("add_values should succeed");
            assert_eq!(table.size(), before + 1);
            let last = table.size() - 1;
            assert_eq!(table.coordinate(last), Some(stamp(2023, 5, 1, h)));
            assert_eq!(table.data(last), vec![f64::from(h) * 1.5]);
        }
    }

    #[test]
    fn test_delete_before_year() {
        let mut table = HourSeriesTable::new(&[], &[], &["data.x"], DataType::Int64)
            .expect("table should be created");
        table.add_values(stamp(2022, 12, 31, 23), &[], &[], &[1i64]).expect("add_values should succeed");
        table.add_values(stamp(2023, 1, 1, 0), &[], &[], &[2i64]).expect("add_values should succeed");

        table.delete_before_year(2023).expect("delete should succeed");
        assert_eq!(table.size(), 1);
        assert_eq!(table.long_data(0), vec![2]);
    }

    #[test]
    fn test_store_and_load() {
        let storage = MemoryBackend::new();
        let path = StoragePath::new("bucket", "hours.csv");
        let mut table = HourSeriesTable::new(&["view.id"], &[], &["data.x"], DataType::Int64)
            .expect("table should be created");
        table.add_values(stamp(2023, 3, 4, 5), &["a"], &[], &[7i64]).expect("add_values should succeed");
        assert!(codec::store(&storage, &path, table.table()));

        let loaded = HourSeriesTable::load(&storage, &path, DataType::Int64, &DecodeOptions::default())
            .expect("load should succeed");
        assert_eq!(loaded.size(), 1);
        assert_eq!(loaded.coordinate(0), Some(stamp(2023, 3, 4, 5)));
        assert_eq!(loaded.get_long_values(stamp(2023, 3, 4, 5), &["a"]), Some(vec![7]));
    }
}
