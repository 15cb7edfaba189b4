//! Searchlab Table - Indexed Table Store
//!
//! Columnar in-memory tables with lazily built equality indexes, the
//! calendar-week arithmetic used by weekly reports, the `;`-separated text
//! codec, time-bucketed series tables and the registry that serves named
//! tables to readers.
//!
//! Key Features:
//! - Typed columns named by role prefix (`view.`, `meta.`, `data.`, `unit.`)
//! - Equality selects answered from cached per-column indexes
//! - Minute, hour, day and calendar-week series tables
//! - Atomic snapshot publication for concurrent readers
//! - Local and remote named-table registry
//!
//! @version 0.1.0
//! @author Searchlab Development Team

pub mod types;
pub mod column;
pub mod index;
pub mod table;
pub mod calendar_week;
pub mod codec;
pub mod series;
pub mod snapshot;
pub mod registry;

pub use types::{ColumnDef, ColumnRole, ColumnType, Schema, Value};
pub use column::Column;
pub use index::{ColumnIndex, IndexKey};
pub use table::IndexedTable;
pub use calendar_week::{weeks_in_year, CalendarWeek};
pub use codec::DecodeOptions;
pub use series::{
    DataType, DaySeriesTable, Granularity, HourSeriesTable, HourStamp, MinuteSeriesTable,
    SeriesNumber, SeriesTable, WeekData, WeekSeriesTable,
};
pub use snapshot::SharedTable;
pub use registry::TableRegistry;
