//! Searchlab Indexed Table
//!
//! Columnar in-memory table with lazily built secondary indexes. Rows are
//! kept in insertion order as one typed vector per column. Equality queries
//! build a value to row-positions index for the queried column on first
//! use and reuse it afterwards; every mutation drops the cached indexes.
//!
//! Key Features:
//! - Schema-checked row appends and cell updates
//! - Indexed equality selects, chained as a logical AND
//! - Facets, integer and double sums, head and sort
//! - Construction from untyped JSON records with name-based type inference
//! - Row-major and column-major JSON export
//!
//! @version 0.1.0
//! @author Searchlab Development Team

use crate::column::Column;
use crate::index::{IndexCache, IndexKey};
use crate::types::{parse_instant, ColumnDef, ColumnType, Schema, Value};
use searchlab_common::{Result, SearchlabError};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Indexed Table
// =============================================================================

/// Schema plus insertion-ordered rows plus a cache of column indexes.
pub struct IndexedTable {
    schema: Schema,
    columns: Vec<Column>,
    rows: usize,
    indexes: IndexCache,
}

impl IndexedTable {
    /// Create an empty table.
    pub fn new(schema: Schema) -> Self {
        let columns = schema
            .columns()
            .iter()
            .map(|c| Column::new(c.column_type))
            .collect();
        Self {
            schema,
            columns,
            rows: 0,
            indexes: IndexCache::new(),
        }
    }

    /// Create a table from prepared columns, which must match the schema and
    /// have equal lengths.
    pub fn from_columns(schema: Schema, columns: Vec<Column>) -> Result<Self> {
        if schema.len() != columns.len() {
            return Err(SearchlabError::Schema(format!(
                "schema has {} columns but {} were given",
                schema.len(),
                columns.len()
            )));
        }
        let rows = columns.first().map(Column::len).unwrap_or(0);
        for (def, column) in schema.columns().iter().zip(&columns) {
            if def.column_type != column.column_type() {
                return Err(SearchlabError::TypeMismatch(format!(
                    "column '{}' declared {} but holds {}",
                    def.name,
                    def.column_type,
                    column.column_type()
                )));
            }
            if column.len() != rows {
                return Err(SearchlabError::Schema(format!(
                    "column '{}' has {} rows, expected {}",
                    def.name,
                    column.len(),
                    rows
                )));
            }
        }
        Ok(Self {
            schema,
            columns,
            rows,
            indexes: IndexCache::new(),
        })
    }

    /// Empty table with the same schema.
    pub fn empty_copy(&self) -> IndexedTable {
        IndexedTable::new(self.schema.clone())
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn size(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.schema.index_of(name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    pub fn column_at(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<Value> {
        self.columns.get(column).and_then(|c| c.get(row))
    }

    pub fn row(&self, row: usize) -> Option<Vec<Value>> {
        if row >= self.rows {
            return None;
        }
        self.columns.iter().map(|c| c.get(row)).collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<Value>> + '_ {
        (0..self.rows).filter_map(move |r| self.row(r))
    }

    /// Number of column indexes currently cached.
    pub fn cached_index_count(&self) -> usize {
        self.indexes.len()
    }

    /// Number of index builds performed on this table.
    pub fn index_builds(&self) -> u64 {
        self.indexes.build_count()
    }

    // -------------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------------

    /// Append one row given in schema order.
    pub fn add_row(&mut self, values: Vec<Value>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(SearchlabError::Schema(format!(
                "row has {} values but the table has {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        for (i, value) in values.into_iter().enumerate() {
            if let Err(e) = self.columns[i].push(value) {
                for column in &mut self.columns[..i] {
                    column.pop();
                }
                return Err(SearchlabError::TypeMismatch(format!(
                    "column '{}': {}",
                    self.schema.columns()[i].name,
                    e
                )));
            }
        }
        self.rows += 1;
        self.indexes.invalidate();
        Ok(())
    }

    /// Append one row given as `(column name, value)` pairs in any order.
    pub fn add_named_row(&mut self, values: &[(&str, Value)]) -> Result<()> {
        let mut row: Vec<Option<Value>> = vec![None; self.columns.len()];
        for (name, value) in values {
            let idx = self
                .column_index(name)
                .ok_or_else(|| SearchlabError::ColumnNotFound(name.to_string()))?;
            row[idx] = Some(value.clone());
        }
        let row = row
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                v.ok_or_else(|| {
                    SearchlabError::InvalidValue(format!(
                        "missing value for column '{}'",
                        self.schema.columns()[i].name
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.add_row(row)
    }

    /// Overwrite a single cell.
    pub fn set_cell(&mut self, row: usize, column: usize, value: Value) -> Result<()> {
        let target = self
            .columns
            .get_mut(column)
            .ok_or_else(|| SearchlabError::ColumnNotFound(format!("#{}", column)))?;
        target.set(row, value)?;
        self.indexes.invalidate();
        Ok(())
    }

    /// Append all rows of a schema-compatible table; columns are matched by
    /// name.
    pub fn append(&mut self, other: &IndexedTable) -> Result<()> {
        if !self.schema.is_compatible(&other.schema) {
            return Err(SearchlabError::Schema(format!(
                "cannot append table with columns {:?} to table with columns {:?}",
                other.schema.names(),
                self.schema.names()
            )));
        }
        let mut merged = Vec::with_capacity(self.columns.len());
        for (def, column) in self.schema.columns().iter().zip(&self.columns) {
            let mut column = column.clone();
            if let Some(source) = other.column(&def.name) {
                column.extend_from(source)?;
            }
            merged.push(column);
        }
        self.columns = merged;
        self.rows += other.rows;
        self.indexes.invalidate();
        Ok(())
    }

    /// Keep only rows for which `keep(row)` holds.
    pub fn retain_rows(&mut self, mut keep: impl FnMut(&IndexedTable, usize) -> bool) {
        let positions: Vec<usize> = (0..self.rows).filter(|&r| keep(self, r)).collect();
        if positions.len() != self.rows {
            self.reorder(&positions);
        }
    }

    /// Drop rows holding an empty string or NaN in any column.
    pub fn drop_rows_with_missing_values(&mut self) {
        self.retain_rows(|table, row| {
            table
                .columns
                .iter()
                .all(|c| c.get(row).map(|v| !v.is_missing()).unwrap_or(false))
        });
    }

    /// Stable ascending sort on one column.
    pub fn sort_by(&mut self, column: &str) -> Result<()> {
        let column = self
            .column(column)
            .ok_or_else(|| SearchlabError::ColumnNotFound(column.to_string()))?;
        let mut positions: Vec<usize> = (0..self.rows).collect();
        match column {
            Column::String(v) => positions.sort_by(|&a, &b| v[a].cmp(&v[b])),
            Column::Int64(v) => positions.sort_by_key(|&r| v[r]),
            Column::Float64(v) => positions.sort_by(|&a, &b| v[a].total_cmp(&v[b])),
            Column::Instant(v) => positions.sort_by_key(|&r| v[r]),
        }
        self.reorder(&positions);
        Ok(())
    }

    /// Stable sort on a key derived from each row position.
    pub fn sort_by_key<K: Ord>(&mut self, mut key: impl FnMut(&IndexedTable, usize) -> K) {
        let mut keyed: Vec<(K, usize)> = (0..self.rows).map(|r| (key(self, r), r)).collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        let positions: Vec<usize> = keyed.into_iter().map(|(_, r)| r).collect();
        self.reorder(&positions);
    }

    fn reorder(&mut self, positions: &[usize]) {
        self.columns = self.columns.iter().map(|c| c.take(positions)).collect();
        self.rows = positions.len();
        self.indexes.invalidate();
    }

    // -------------------------------------------------------------------------
    // Selection
    // -------------------------------------------------------------------------

    /// New table holding the rows at `positions`, in that order.
    pub fn select_rows(&self, positions: &[usize]) -> IndexedTable {
        IndexedTable {
            schema: self.schema.clone(),
            columns: self.columns.iter().map(|c| c.take(positions)).collect(),
            rows: positions.len(),
            indexes: IndexCache::new(),
        }
    }

    /// Rows whose `column` equals `value`.
    ///
    /// String and integer columns are answered from a lazily built index;
    /// other columns are scanned. An unknown column, or a value that cannot
    /// denote a cell of the column's type, yields an empty table.
    pub fn where_eq(&self, column: &str, value: &str) -> IndexedTable {
        let Some(idx) = self.column_index(column) else {
            return self.empty_copy();
        };
        let column_type = self.columns[idx].column_type();
        if !IndexKey::is_indexable(column_type) {
            return self.scan_eq(column, value);
        }
        let Some(key) = IndexKey::for_query(column_type, value) else {
            return self.empty_copy();
        };
        match self.indexes.get_or_build(idx, &self.columns[idx]) {
            Some(index) => self.select_rows(index.lookup(&key)),
            None => self.scan_eq(column, value),
        }
    }

    /// Rows whose `column` equals `value`, found by a full scan.
    pub fn scan_eq(&self, column: &str, value: &str) -> IndexedTable {
        let Some(column) = self.column(column) else {
            return self.empty_copy();
        };
        let positions: Vec<usize> = match column {
            Column::String(v) => (0..self.rows).filter(|&r| v[r] == value).collect(),
            Column::Int64(v) => match value.trim().parse::<i64>() {
                Ok(needle) => (0..self.rows).filter(|&r| v[r] == needle).collect(),
                Err(_) => Vec::new(),
            },
            Column::Float64(v) => match value.trim().parse::<f64>() {
                Ok(needle) => (0..self.rows).filter(|&r| v[r] == needle).collect(),
                Err(_) => Vec::new(),
            },
            Column::Instant(v) => match parse_instant(value.trim()) {
                Some(needle) => (0..self.rows).filter(|&r| v[r] == needle).collect(),
                None => Vec::new(),
            },
        };
        self.select_rows(&positions)
    }

    /// Chained equality selects of the form `column:value`, combined with a
    /// logical AND. Selects after the first with an empty value are skipped.
    pub fn where_selects<S: AsRef<str>>(&self, selects: &[S]) -> Result<IndexedTable> {
        let mut result: Option<IndexedTable> = None;
        for (i, select) in selects.iter().enumerate() {
            let (column, value) = parse_select(select.as_ref())?;
            if i > 0 && value.is_empty() {
                continue;
            }
            let source = result.as_ref().unwrap_or(self);
            result = Some(source.where_eq(column, value));
        }
        Ok(result.unwrap_or_else(|| self.clone()))
    }

    /// Comma-separated form of [`where_selects`](Self::where_selects).
    pub fn where_list(&self, selects: &str) -> Result<IndexedTable> {
        let parts: Vec<&str> = selects.split(',').collect();
        self.where_selects(&parts)
    }

    /// The first `n` rows.
    pub fn head(&self, n: usize) -> IndexedTable {
        let positions: Vec<usize> = (0..n.min(self.rows)).collect();
        self.select_rows(&positions)
    }

    /// First string cell of `column` among rows where `select_column` equals
    /// `select_value`.
    pub fn select_string_from(
        &self,
        select_column: &str,
        select_value: &str,
        column: &str,
    ) -> Option<String> {
        let selected = self.where_eq(select_column, select_value);
        selected
            .column(column)
            .and_then(|c| c.get(0))
            .map(|v| v.render())
    }

    /// First integer cell of `column` among rows where `select_column` equals
    /// `select_value`.
    pub fn select_int_from(
        &self,
        select_column: &str,
        select_value: &str,
        column: &str,
    ) -> Option<i64> {
        let selected = self.where_eq(select_column, select_value);
        selected.column(column).and_then(|c| c.get_i64(0))
    }

    // -------------------------------------------------------------------------
    // Aggregation
    // -------------------------------------------------------------------------

    /// Count of rows per distinct rendered value of `column`.
    pub fn facet(&self, column: &str) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        if let Some(column) = self.column(column) {
            for row in 0..self.rows {
                if let Some(value) = column.get(row) {
                    *counts.entry(value.render()).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    /// Integer sum over all rows; doubles are truncated per cell. Unknown or
    /// non-numeric columns sum to zero.
    pub fn aggregate_int(&self, column: &str) -> i64 {
        match self.column(column) {
            Some(Column::Int64(v)) => v.iter().sum(),
            Some(Column::Float64(v)) => v.iter().filter(|x| x.is_finite()).map(|x| *x as i64).sum(),
            _ => 0,
        }
    }

    /// Double sum over all rows. Unknown or non-numeric columns sum to zero.
    pub fn aggregate_double(&self, column: &str) -> f64 {
        match self.column(column) {
            Some(Column::Int64(v)) => v.iter().map(|x| *x as f64).sum(),
            Some(Column::Float64(v)) => v.iter().sum(),
            _ => 0.0,
        }
    }

    // -------------------------------------------------------------------------
    // JSON
    // -------------------------------------------------------------------------

    /// Export as a row-major array of objects, or as a column-major array
    /// whose first element is the header.
    pub fn to_json(&self, as_objects: bool) -> JsonValue {
        let names = self.schema.names();
        let mut out = Vec::with_capacity(self.rows + 1);
        if as_objects {
            for row in 0..self.rows {
                let mut object = Map::new();
                for (name, column) in names.iter().zip(&self.columns) {
                    let value = column.get(row).map(|v| v.to_json()).unwrap_or(JsonValue::Null);
                    object.insert(name.to_string(), value);
                }
                out.push(JsonValue::Object(object));
            }
        } else {
            out.push(JsonValue::Array(
                names.iter().map(|n| JsonValue::String(n.to_string())).collect(),
            ));
            for row in 0..self.rows {
                out.push(JsonValue::Array(
                    self.columns
                        .iter()
                        .map(|c| c.get(row).map(|v| v.to_json()).unwrap_or(JsonValue::Null))
                        .collect(),
                ));
            }
        }
        JsonValue::Array(out)
    }

    /// Parse either JSON export form.
    pub fn from_json(json: &JsonValue) -> Result<IndexedTable> {
        let items = json.as_array().ok_or_else(|| {
            SearchlabError::Serialization("table JSON must be an array".to_string())
        })?;
        match items.first() {
            None => Ok(IndexedTable::new(Schema::default())),
            Some(JsonValue::Object(_)) => {
                let records = items
                    .iter()
                    .filter_map(|item| item.as_object().cloned())
                    .collect::<Vec<_>>();
                IndexedTable::from_records(&records)
            }
            Some(JsonValue::Array(header)) => {
                let names = header
                    .iter()
                    .map(|h| {
                        h.as_str().map(str::to_string).ok_or_else(|| {
                            SearchlabError::Serialization(format!("invalid header cell {}", h))
                        })
                    })
                    .collect::<Result<Vec<String>>>()?;
                let mut records: Vec<Map<String, JsonValue>> = Vec::with_capacity(items.len() - 1);
                for item in &items[1..] {
                    let Some(cells) = item.as_array() else {
                        tracing::warn!("skipping non-array row {} in column-major table", item);
                        continue;
                    };
                    if cells.len() != names.len() {
                        tracing::warn!(
                            "skipping row with {} cells, expected {}",
                            cells.len(),
                            names.len()
                        );
                        continue;
                    }
                    records.push(names.iter().cloned().zip(cells.iter().cloned()).collect());
                }
                let mut table = IndexedTable::from_records(&records)?;
                if table.column_count() == 0 && !names.is_empty() {
                    let defs = names
                        .iter()
                        .map(|n| {
                            ColumnDef::new(
                                n.clone(),
                                ColumnType::infer_from_name(n).unwrap_or(ColumnType::String),
                            )
                        })
                        .collect();
                    table = IndexedTable::new(Schema::new(defs)?);
                }
                Ok(table)
            }
            Some(other) => Err(SearchlabError::Serialization(format!(
                "unexpected table element {}",
                other
            ))),
        }
    }

    /// Build a table from untyped records.
    ///
    /// Column types follow the naming rules, otherwise the JSON type of the
    /// first non-null value seen (defaulting to string). Records whose cells
    /// cannot be converted are skipped with a warning.
    pub fn from_records(records: &[Map<String, JsonValue>]) -> Result<IndexedTable> {
        let mut defs: Vec<ColumnDef> = Vec::new();
        for record in records {
            for name in record.keys() {
                if defs.iter().any(|d| &d.name == name) {
                    continue;
                }
                let column_type = ColumnType::infer_from_name(name).unwrap_or_else(|| {
                    records
                        .iter()
                        .filter_map(|r| r.get(name))
                        .find(|v| !v.is_null())
                        .map(json_type)
                        .unwrap_or(ColumnType::String)
                });
                defs.push(ColumnDef::new(name.clone(), column_type));
            }
        }

        let mut table = IndexedTable::new(Schema::new(defs)?);
        for (n, record) in records.iter().enumerate() {
            let row = table
                .schema
                .columns()
                .iter()
                .map(|def| json_cell(def, record.get(&def.name)))
                .collect::<Result<Vec<Value>>>();
            match row {
                Ok(row) => table.add_row(row)?,
                Err(e) => tracing::warn!("skipping record {}: {}", n, e),
            }
        }
        Ok(table)
    }

    // -------------------------------------------------------------------------
    // Display
    // -------------------------------------------------------------------------

    /// Fixed-width text rendering for diagnostics.
    pub fn render(&self) -> String {
        let names = self.schema.names();
        let cells: Vec<Vec<String>> = (0..self.rows)
            .map(|r| {
                self.columns
                    .iter()
                    .map(|c| c.get(r).map(|v| v.render()).unwrap_or_default())
                    .collect()
            })
            .collect();
        let widths: Vec<usize> = names
            .iter()
            .enumerate()
            .map(|(i, n)| {
                cells
                    .iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(n.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let line = |values: &[String]| -> String {
            let padded: Vec<String> = values
                .iter()
                .zip(&widths)
                .map(|(v, w)| format!("{:<width$}", v, width = *w))
                .collect();
            padded.join(" | ").trim_end().to_string()
        };
        let header: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();

        let mut out = String::new();
        for values in [&header, &rule].into_iter().chain(cells.iter()) {
            out.push_str(&line(values.as_slice()));
            out.push('\n');
        }
        out
    }
}

impl Clone for IndexedTable {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            columns: self.columns.clone(),
            rows: self.rows,
            indexes: IndexCache::new(),
        }
    }
}

impl fmt::Debug for IndexedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexedTable")
            .field("columns", &self.schema.names())
            .field("rows", &self.rows)
            .finish()
    }
}

impl fmt::Display for IndexedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl PartialEq for IndexedTable {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.rows == other.rows && self.columns == other.columns
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Split `column:value` at the first colon.
fn parse_select(select: &str) -> Result<(&str, &str)> {
    match select.split_once(':') {
        Some((column, value)) if !column.is_empty() => Ok((column, value)),
        _ => Err(SearchlabError::InvalidValue(format!(
            "select '{}' is not of the form column:value",
            select
        ))),
    }
}

fn json_type(value: &JsonValue) -> ColumnType {
    match value {
        JsonValue::Number(n) if n.is_i64() || n.is_u64() => ColumnType::Int64,
        JsonValue::Number(_) => ColumnType::Float64,
        _ => ColumnType::String,
    }
}

fn json_cell(def: &ColumnDef, value: Option<&JsonValue>) -> Result<Value> {
    let value = match value {
        None | Some(JsonValue::Null) => {
            return match def.column_type {
                ColumnType::Float64 => Ok(Value::Float64(f64::NAN)),
                ColumnType::Instant => Err(SearchlabError::UnparsableDate(format!(
                    "missing value for '{}'",
                    def.name
                ))),
                other => Ok(Value::zero(other)),
            };
        }
        Some(value) => value,
    };
    match (def.column_type, value) {
        (ColumnType::String, JsonValue::String(s)) => Ok(Value::String(s.clone())),
        (ColumnType::String, other) => Ok(Value::String(other.to_string())),
        (ColumnType::Int64, JsonValue::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Value::Int64)
            .ok_or_else(|| SearchlabError::InvalidValue(format!("'{}' = {}", def.name, n))),
        (ColumnType::Float64, JsonValue::Number(n)) => n
            .as_f64()
            .map(Value::Float64)
            .ok_or_else(|| SearchlabError::InvalidValue(format!("'{}' = {}", def.name, n))),
        (ColumnType::Instant, JsonValue::Number(n)) => {
            Value::Int64(n.as_i64().unwrap_or_default()).coerce(ColumnType::Instant)
        }
        (column_type, JsonValue::String(s)) => Value::parse_as(column_type, s),
        (column_type, other) => Err(SearchlabError::TypeMismatch(format!(
            "'{}' expects {} but got {}",
            def.name, column_type, other
        ))),
    }
}
