//! Searchlab Table Columns
//!
//! Typed column vectors backing the struct-of-arrays table layout.
//!
//! @version 0.1.0
//! @author Searchlab Development Team

use crate::types::{ColumnType, Value};
use chrono::{DateTime, Utc};
use searchlab_common::{Result, SearchlabError};

// =============================================================================
// Column
// =============================================================================

/// One column of a table, stored as a vector of its native type.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    String(Vec<String>),
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    Instant(Vec<DateTime<Utc>>),
}

impl Column {
    pub fn new(column_type: ColumnType) -> Self {
        Self::with_capacity(column_type, 0)
    }

    pub fn with_capacity(column_type: ColumnType, capacity: usize) -> Self {
        match column_type {
            ColumnType::String => Column::String(Vec::with_capacity(capacity)),
            ColumnType::Int64 => Column::Int64(Vec::with_capacity(capacity)),
            ColumnType::Float64 => Column::Float64(Vec::with_capacity(capacity)),
            ColumnType::Instant => Column::Instant(Vec::with_capacity(capacity)),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Column::String(_) => ColumnType::String,
            Column::Int64(_) => ColumnType::Int64,
            Column::Float64(_) => ColumnType::Float64,
            Column::Instant(_) => ColumnType::Instant,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::String(v) => v.len(),
            Column::Int64(v) => v.len(),
            Column::Float64(v) => v.len(),
            Column::Instant(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, row: usize) -> Option<Value> {
        match self {
            Column::String(v) => v.get(row).map(|s| Value::String(s.clone())),
            Column::Int64(v) => v.get(row).map(|x| Value::Int64(*x)),
            Column::Float64(v) => v.get(row).map(|x| Value::Float64(*x)),
            Column::Instant(v) => v.get(row).map(|t| Value::Instant(*t)),
        }
    }

    pub fn get_str(&self, row: usize) -> Option<&str> {
        match self {
            Column::String(v) => v.get(row).map(String::as_str),
            _ => None,
        }
    }

    /// Integer cell; instants yield epoch milliseconds.
    pub fn get_i64(&self, row: usize) -> Option<i64> {
        match self {
            Column::Int64(v) => v.get(row).copied(),
            Column::Float64(v) => v.get(row).filter(|x| x.is_finite()).map(|x| *x as i64),
            Column::Instant(v) => v.get(row).map(|t| t.timestamp_millis()),
            Column::String(_) => None,
        }
    }

    pub fn get_f64(&self, row: usize) -> Option<f64> {
        match self {
            Column::Int64(v) => v.get(row).map(|x| *x as f64),
            Column::Float64(v) => v.get(row).copied(),
            _ => None,
        }
    }

    pub fn get_instant(&self, row: usize) -> Option<DateTime<Utc>> {
        match self {
            Column::Instant(v) => v.get(row).copied(),
            _ => None,
        }
    }

    /// Append a value of the column's type.
    pub fn push(&mut self, value: Value) -> Result<()> {
        match (self, value) {
            (Column::String(v), Value::String(x)) => v.push(x),
            (Column::Int64(v), Value::Int64(x)) => v.push(x),
            (Column::Float64(v), Value::Float64(x)) => v.push(x),
            (Column::Instant(v), Value::Instant(x)) => v.push(x),
            (column, value) => return Err(mismatch(column.column_type(), &value)),
        }
        Ok(())
    }

    /// Overwrite the cell at `row`.
    pub fn set(&mut self, row: usize, value: Value) -> Result<()> {
        let len = self.len();
        if row >= len {
            return Err(SearchlabError::InvalidValue(format!(
                "row {} out of bounds for {} rows",
                row, len
            )));
        }
        match (self, value) {
            (Column::String(v), Value::String(x)) => v[row] = x,
            (Column::Int64(v), Value::Int64(x)) => v[row] = x,
            (Column::Float64(v), Value::Float64(x)) => v[row] = x,
            (Column::Instant(v), Value::Instant(x)) => v[row] = x,
            (column, value) => return Err(mismatch(column.column_type(), &value)),
        }
        Ok(())
    }

    /// New column holding the cells at `rows`, in that order.
    pub fn take(&self, rows: &[usize]) -> Column {
        match self {
            Column::String(v) => Column::String(rows.iter().map(|&r| v[r].clone()).collect()),
            Column::Int64(v) => Column::Int64(rows.iter().map(|&r| v[r]).collect()),
            Column::Float64(v) => Column::Float64(rows.iter().map(|&r| v[r]).collect()),
            Column::Instant(v) => Column::Instant(rows.iter().map(|&r| v[r]).collect()),
        }
    }

    /// Append all cells of a column of the same type.
    pub fn extend_from(&mut self, other: &Column) -> Result<()> {
        match (self, other) {
            (Column::String(a), Column::String(b)) => a.extend(b.iter().cloned()),
            (Column::Int64(a), Column::Int64(b)) => a.extend_from_slice(b),
            (Column::Float64(a), Column::Float64(b)) => a.extend_from_slice(b),
            (Column::Instant(a), Column::Instant(b)) => a.extend_from_slice(b),
            (a, b) => {
                return Err(SearchlabError::TypeMismatch(format!(
                    "cannot append {} column to {} column",
                    b.column_type(),
                    a.column_type()
                )))
            }
        }
        Ok(())
    }

    /// Drop the last cell; used to roll back a partially appended row.
    pub(crate) fn pop(&mut self) {
        match self {
            Column::String(v) => {
                v.pop();
            }
            Column::Int64(v) => {
                v.pop();
            }
            Column::Float64(v) => {
                v.pop();
            }
            Column::Instant(v) => {
                v.pop();
            }
        }
    }

    /// Convert every cell to another type.
    pub fn coerce(&self, column_type: ColumnType) -> Result<Column> {
        if self.column_type() == column_type {
            return Ok(self.clone());
        }
        let mut converted = Column::with_capacity(column_type, self.len());
        for row in 0..self.len() {
            if let Some(value) = self.get(row) {
                converted.push(value.coerce(column_type)?)?;
            }
        }
        Ok(converted)
    }
}

fn mismatch(expected: ColumnType, value: &Value) -> SearchlabError {
    SearchlabError::TypeMismatch(format!(
        "expected {} but got {} value '{}'",
        expected,
        value.column_type(),
        value.render()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_checks_type() {
        let mut column = Column::new(ColumnType::Int64);
        column.push(Value::Int64(3)).expect("push should succeed");
        assert!(column.push(Value::from("three")).is_err());
        assert_eq!(column.len(), 1);
        assert_eq!(column.get_i64(0), Some(3));
        assert_eq!(column.get_f64(0), Some(3.0));
    }

    #[test]
    fn test_take_and_extend() {
        let column = Column::String(vec!["a".into(), "b".into(), "c".into()]);
        let taken = column.take(&[2, 0]);
        assert_eq!(taken, Column::String(vec!["c".into(), "a".into()]));

        let mut merged = taken.clone();
        merged.extend_from(&column).expect("extend should succeed");
        assert_eq!(merged.len(), 5);
        assert!(merged.extend_from(&Column::Int64(vec![1])).is_err());
    }

    #[test]
    fn test_set_and_coerce() {
        let mut column = Column::Float64(vec![1.5, 2.0]);
        column.set(1, Value::Float64(4.0)).expect("set should succeed");
        assert!(column.set(5, Value::Float64(4.0)).is_err());

        let ints = column.coerce(ColumnType::Int64).expect("coerce should succeed");
        assert_eq!(ints, Column::Int64(vec![1, 4]));
    }
}
