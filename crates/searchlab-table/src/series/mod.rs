//! Searchlab Series Tables
//!
//! Time-bucketed specializations of the indexed table. Every series table
//! starts with a fixed block of generated time columns for its granularity,
//! followed by `view.` columns (series identity), `meta.` columns
//! (descriptive attributes) and `data.` columns (numeric values of one
//! shared type).
//!
//! Key Features:
//! - One generic table shared by minute, hour, day and week granularity
//! - Append, upsert-without-insert and point lookups by time and view
//! - Truncation of rows before a time coordinate
//! - Regrouping of persisted tables by column prefix
//!
//! @version 0.1.0
//! @author Searchlab Development Team

pub mod day;
pub mod hour;
pub mod minute;
pub mod week;

pub use day::{Day, DaySeriesTable};
pub use hour::{Hour, HourSeriesTable, HourStamp};
pub use minute::{Minute, MinuteSeriesTable};
pub use week::{Week, WeekData, WeekSeriesTable};

use crate::codec::{self, DecodeOptions};
use crate::column::Column;
use crate::table::IndexedTable;
use crate::types::{ColumnDef, ColumnRole, ColumnType, Schema, Value};
use searchlab_common::{Result, SearchlabError};
use searchlab_storage::{StorageBackend, StoragePath};
use std::fmt;
use std::marker::PhantomData;

// =============================================================================
// Granularity
// =============================================================================

/// Time bucketing of a series table.
pub trait Granularity: Send + Sync + 'static {
    /// Time coordinate identifying one bucket.
    type Coordinate: Copy + PartialEq + fmt::Debug + Send + Sync;

    const NAME: &'static str;

    /// Generated leading time columns, in order.
    fn time_columns() -> Vec<ColumnDef>;

    /// Cell values of the time columns for a coordinate.
    fn time_values(at: &Self::Coordinate) -> Result<Vec<Value>>;

    /// Coordinate stored in a row of a table whose leading columns are
    /// [`time_columns`](Self::time_columns).
    fn coordinate_at(table: &IndexedTable, row: usize) -> Option<Self::Coordinate>;

    /// Monotonic ordering key of a coordinate.
    fn ordinal(at: &Self::Coordinate) -> i64;
}

// =============================================================================
// Data Type
// =============================================================================

/// Shared type of the data columns of a series table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Int64,
    Float64,
}

impl DataType {
    pub fn column_type(&self) -> ColumnType {
        match self {
            DataType::Int64 => ColumnType::Int64,
            DataType::Float64 => ColumnType::Float64,
        }
    }
}

/// Numbers accepted as data values.
pub trait SeriesNumber: Copy {
    fn to_value(self, data_type: DataType) -> Value;
}

impl SeriesNumber for i64 {
    fn to_value(self, data_type: DataType) -> Value {
        match data_type {
            DataType::Int64 => Value::Int64(self),
            DataType::Float64 => Value::Float64(self as f64),
        }
    }
}

impl SeriesNumber for f64 {
    fn to_value(self, data_type: DataType) -> Value {
        match data_type {
            DataType::Int64 => Value::Int64(self as i64),
            DataType::Float64 => Value::Float64(self),
        }
    }
}

// =============================================================================
// Series Table
// =============================================================================

/// Indexed table with generated time columns and view/meta/data groups.
pub struct SeriesTable<G: Granularity> {
    table: IndexedTable,
    view_names: Vec<String>,
    meta_names: Vec<String>,
    data_names: Vec<String>,
    data_type: DataType,
    _granularity: PhantomData<G>,
}

impl<G: Granularity> SeriesTable<G> {
    /// Create an empty table. Every name must carry the prefix of its group.
    pub fn new(view: &[&str], meta: &[&str], data: &[&str], data_type: DataType) -> Result<Self> {
        let to_owned = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        Self::with_names(to_owned(view), to_owned(meta), to_owned(data), data_type)
    }

    fn with_names(
        view_names: Vec<String>,
        meta_names: Vec<String>,
        data_names: Vec<String>,
        data_type: DataType,
    ) -> Result<Self> {
        let mut defs = G::time_columns();
        for (names, role, column_type) in [
            (&view_names, ColumnRole::View, ColumnType::String),
            (&meta_names, ColumnRole::Meta, ColumnType::String),
            (&data_names, ColumnRole::Data, data_type.column_type()),
        ] {
            for name in names {
                if ColumnRole::from_name(name) != role {
                    return Err(SearchlabError::Schema(format!(
                        "{} column '{}' must start with '{}'",
                        G::NAME,
                        name,
                        role.prefix().unwrap_or_default()
                    )));
                }
                defs.push(ColumnDef::new(name.clone(), column_type));
            }
        }
        Ok(Self {
            table: IndexedTable::new(Schema::new(defs)?),
            view_names,
            meta_names,
            data_names,
            data_type,
            _granularity: PhantomData,
        })
    }

    /// Wrap a deserialized table, regrouping its columns by name prefix.
    /// Time columns are coerced to their generated types; `unit.` and other
    /// unknown columns are dropped.
    pub fn from_table(source: &IndexedTable, data_type: DataType) -> Result<Self> {
        let schema = source.schema();
        let owned = |role| {
            schema
                .names_with_role(role)
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>()
        };
        let empty = Self::with_names(
            owned(ColumnRole::View),
            owned(ColumnRole::Meta),
            owned(ColumnRole::Data),
            data_type,
        )?;

        let target = empty.table.schema().clone();
        let mut columns = Vec::with_capacity(target.len());
        for def in target.columns() {
            let column = source.column(&def.name).ok_or_else(|| {
                SearchlabError::Schema(format!(
                    "{} table is missing column '{}'",
                    G::NAME,
                    def.name
                ))
            })?;
            columns.push(column.coerce(def.column_type)?);
        }
        Ok(Self {
            table: IndexedTable::from_columns(target, columns)?,
            ..empty
        })
    }

    /// Column type of a persisted header: generated time columns keep their
    /// type, data columns take `data_type`, everything else is a string.
    pub fn resolve_column_type(name: &str, data_type: DataType) -> ColumnType {
        if let Some(def) = G::time_columns().into_iter().find(|d| d.name == name) {
            return def.column_type;
        }
        match ColumnRole::from_name(name) {
            ColumnRole::Data => data_type.column_type(),
            _ => ColumnType::String,
        }
    }

    fn load_stored(
        storage: &dyn StorageBackend,
        path: &StoragePath,
        data_type: DataType,
        options: &DecodeOptions,
    ) -> Result<Self> {
        let raw = codec::load(
            storage,
            path,
            |name| Self::resolve_column_type(name, data_type),
            options,
        )?;
        Self::from_table(&raw, data_type)
    }

    /// Empty table with the same columns.
    pub fn empty_clone(&self) -> Self {
        Self {
            table: self.table.empty_copy(),
            view_names: self.view_names.clone(),
            meta_names: self.meta_names.clone(),
            data_names: self.data_names.clone(),
            data_type: self.data_type,
            _granularity: PhantomData,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn table(&self) -> &IndexedTable {
        &self.table
    }

    pub fn into_table(self) -> IndexedTable {
        self.table
    }

    /// Independent copy of the current rows for publication to readers.
    pub fn snapshot(&self) -> IndexedTable {
        self.table.clone()
    }

    pub fn size(&self) -> usize {
        self.table.size()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn view_names(&self) -> &[String] {
        &self.view_names
    }

    pub fn meta_names(&self) -> &[String] {
        &self.meta_names
    }

    pub fn data_names(&self) -> &[String] {
        &self.data_names
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// True if the table has exactly the given view, meta and data columns.
    pub fn has_shape(&self, view: &[&str], meta: &[&str], data: &[&str]) -> bool {
        self.view_names == view && self.meta_names == meta && self.data_names == data
    }

    fn view_start(&self) -> usize {
        self.table.column_count() - self.data_names.len() - self.meta_names.len() - self.view_names.len()
    }

    fn meta_start(&self) -> usize {
        self.view_start() + self.view_names.len()
    }

    fn data_start(&self) -> usize {
        self.meta_start() + self.meta_names.len()
    }

    fn strings(&self, start: usize, len: usize, row: usize) -> Vec<String> {
        (start..start + len)
            .map(|c| {
                self.table
                    .column_at(c)
                    .and_then(|col| col.get_str(row))
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    }

    /// Time coordinate of a row.
    pub fn coordinate(&self, row: usize) -> Option<G::Coordinate> {
        G::coordinate_at(&self.table, row)
    }

    pub fn view(&self, row: usize) -> Vec<String> {
        self.strings(self.view_start(), self.view_names.len(), row)
    }

    pub fn meta(&self, row: usize) -> Vec<String> {
        self.strings(self.meta_start(), self.meta_names.len(), row)
    }

    /// Data values of a row as doubles; non-finite values read as zero.
    pub fn data(&self, row: usize) -> Vec<f64> {
        let start = self.data_start();
        (start..start + self.data_names.len())
            .map(|c| {
                self.table
                    .column_at(c)
                    .and_then(|col| col.get_f64(row))
                    .filter(|v| v.is_finite())
                    .unwrap_or(0.0)
            })
            .collect()
    }

    /// Data values of a row as integers.
    pub fn long_data(&self, row: usize) -> Vec<i64> {
        let start = self.data_start();
        (start..start + self.data_names.len())
            .map(|c| {
                self.table
                    .column_at(c)
                    .and_then(|col| col.get_i64(row))
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Coordinate of the first row. Rows are expected in time order.
    pub fn first_coordinate(&self) -> Option<G::Coordinate> {
        self.coordinate(0)
    }

    /// Coordinate of the last row.
    pub fn last_coordinate(&self) -> Option<G::Coordinate> {
        self.size().checked_sub(1).and_then(|row| self.coordinate(row))
    }

    // -------------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------------

    fn assert_shape<N>(&self, view: &[&str], meta: &[&str], data: &[N]) {
        assert_eq!(
            view.len(),
            self.view_names.len(),
            "view has {} values, table has {} view columns",
            view.len(),
            self.view_names.len()
        );
        assert_eq!(
            meta.len(),
            self.meta_names.len(),
            "meta has {} values, table has {} meta columns",
            meta.len(),
            self.meta_names.len()
        );
        assert_eq!(
            data.len(),
            self.data_names.len(),
            "data has {} values, table has {} data columns",
            data.len(),
            self.data_names.len()
        );
    }

    /// Append one row.
    ///
    /// # Panics
    ///
    /// Panics if the lengths of `view`, `meta` or `data` differ from the
    /// table's column groups.
    pub fn add_values<N: SeriesNumber>(
        &mut self,
        at: G::Coordinate,
        view: &[&str],
        meta: &[&str],
        data: &[N],
    ) -> Result<()> {
        self.assert_shape(view, meta, data);
        let mut row = G::time_values(&at)?;
        row.extend(view.iter().map(|v| Value::from(*v)));
        row.extend(meta.iter().map(|v| Value::from(*v)));
        row.extend(data.iter().map(|v| v.to_value(self.data_type)));
        self.table.add_row(row)
    }

    /// Overwrite meta and data of the first row matching `at` and `view`.
    /// Returns false, without inserting, if no row matches. Duplicate rows
    /// for the same coordinate and view are not detected; only the first is
    /// updated.
    ///
    /// # Panics
    ///
    /// Panics if the lengths of `view`, `meta` or `data` differ from the
    /// table's column groups.
    pub fn set_values_where<N: SeriesNumber>(
        &mut self,
        at: G::Coordinate,
        view: &[&str],
        meta: &[&str],
        data: &[N],
    ) -> Result<bool> {
        self.assert_shape(view, meta, data);
        let Some(row) = self.row_index(at, Some(view)) else {
            return Ok(false);
        };
        let meta_start = self.meta_start();
        for (i, value) in meta.iter().enumerate() {
            self.table.set_cell(row, meta_start + i, Value::from(*value))?;
        }
        let data_start = self.data_start();
        for (i, value) in data.iter().enumerate() {
            self.table
                .set_cell(row, data_start + i, value.to_value(self.data_type))?;
        }
        Ok(true)
    }

    /// Keep only rows at or after `at`.
    pub fn delete_before(&mut self, at: G::Coordinate) {
        let threshold = G::ordinal(&at);
        self.table.retain_rows(|table, row| {
            G::coordinate_at(table, row)
                .map(|c| G::ordinal(&c) >= threshold)
                .unwrap_or(false)
        });
    }

    /// Stable sort by time.
    pub fn sort(&mut self) {
        self.table.sort_by_key(|table, row| {
            G::coordinate_at(table, row)
                .map(|c| G::ordinal(&c))
                .unwrap_or(i64::MIN)
        });
    }

    /// Append the rows of a table with the same columns.
    pub fn append(&mut self, other: &SeriesTable<G>) -> Result<()> {
        self.table.append(&other.table)
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    /// Position of the first row at `at` whose view values equal `view`; a
    /// `None` view matches any row at that coordinate.
    pub fn row_index(&self, at: G::Coordinate, view: Option<&[&str]>) -> Option<usize> {
        let view_start = self.view_start();
        (0..self.size()).find(|&row| {
            G::coordinate_at(&self.table, row) == Some(at)
                && view.map_or(true, |view| {
                    view.iter().enumerate().all(|(i, expected)| {
                        self.table
                            .column_at(view_start + i)
                            .and_then(|c| c.get_str(row))
                            == Some(*expected)
                    })
                })
        })
    }

    /// Data values at `at` for `view`, as doubles.
    pub fn get_values(&self, at: G::Coordinate, view: &[&str]) -> Option<Vec<f64>> {
        self.row_index(at, Some(view)).map(|row| self.data(row))
    }

    /// Data values at `at` for `view`, as integers.
    pub fn get_long_values(&self, at: G::Coordinate, view: &[&str]) -> Option<Vec<i64>> {
        self.row_index(at, Some(view)).map(|row| self.long_data(row))
    }

    /// Meta values of the most recent row with the given view values.
    pub fn meta_where(&self, view: &[&str]) -> Option<Vec<String>> {
        let view_start = self.view_start();
        (0..self.size()).rev().find_map(|row| {
            let matches = view.iter().enumerate().all(|(i, expected)| {
                self.table
                    .column_at(view_start + i)
                    .and_then(|c| c.get_str(row))
                    == Some(*expected)
            });
            matches.then(|| self.meta(row))
        })
    }

    /// Column of the given data name, if present.
    pub fn data_column(&self, name: &str) -> Option<&Column> {
        if self.data_names.iter().any(|n| n == name) {
            self.table.column(name)
        } else {
            None
        }
    }
}

impl<G: Granularity> Clone for SeriesTable<G> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            view_names: self.view_names.clone(),
            meta_names: self.meta_names.clone(),
            data_names: self.data_names.clone(),
            data_type: self.data_type,
            _granularity: PhantomData,
        }
    }
}

impl<G: Granularity> fmt::Debug for SeriesTable<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeriesTable")
            .field("granularity", &G::NAME)
            .field("view", &self.view_names)
            .field("meta", &self.meta_names)
            .field("data", &self.data_names)
            .field("rows", &self.table.size())
            .finish()
    }
}
