//! Searchlab Table Index
//!
//! Lazily built secondary indexes mapping a cell value to the positions of
//! the rows holding it. An index is built from a full column scan on the
//! first equality query against that column and reused until the owning
//! table is mutated.
//!
//! @version 0.1.0
//! @author Searchlab Development Team

use crate::column::Column;
use crate::types::ColumnType;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// =============================================================================
// Index Key
// =============================================================================

/// Hashable form of an indexable cell value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Str(String),
    Int(i64),
}

impl IndexKey {
    /// Key for a textual query value against a column of the given type.
    /// Returns `None` if the column type is not indexable or the text cannot
    /// denote a value of that type.
    pub fn for_query(column_type: ColumnType, text: &str) -> Option<IndexKey> {
        match column_type {
            ColumnType::String => Some(IndexKey::Str(text.to_string())),
            ColumnType::Int64 => text.trim().parse::<i64>().ok().map(IndexKey::Int),
            ColumnType::Float64 | ColumnType::Instant => None,
        }
    }

    pub fn is_indexable(column_type: ColumnType) -> bool {
        matches!(column_type, ColumnType::String | ColumnType::Int64)
    }
}

// =============================================================================
// Column Index
// =============================================================================

/// Value to row-positions map for a single column.
#[derive(Debug, Default)]
pub struct ColumnIndex {
    positions: HashMap<IndexKey, Vec<usize>>,
}

impl ColumnIndex {
    /// Build an index by scanning a column. Float and instant columns are not
    /// indexable.
    pub fn build(column: &Column) -> Option<Self> {
        let mut positions: HashMap<IndexKey, Vec<usize>> = HashMap::new();
        match column {
            Column::String(values) => {
                for (row, value) in values.iter().enumerate() {
                    positions
                        .entry(IndexKey::Str(value.clone()))
                        .or_default()
                        .push(row);
                }
            }
            Column::Int64(values) => {
                for (row, value) in values.iter().enumerate() {
                    positions.entry(IndexKey::Int(*value)).or_default().push(row);
                }
            }
            Column::Float64(_) | Column::Instant(_) => return None,
        }
        Some(Self { positions })
    }

    /// Ascending positions of rows holding `key`.
    pub fn lookup(&self, key: &IndexKey) -> &[usize] {
        self.positions.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn distinct_values(&self) -> usize {
        self.positions.len()
    }
}

// =============================================================================
// Index Cache
// =============================================================================

/// Per-table cache of column indexes keyed by column position.
#[derive(Debug, Default)]
pub struct IndexCache {
    indexes: RwLock<HashMap<usize, Arc<ColumnIndex>>>,
    builds: AtomicU64,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached index for `column_idx`, building it from `column` on first use.
    pub fn get_or_build(&self, column_idx: usize, column: &Column) -> Option<Arc<ColumnIndex>> {
        if let Some(index) = self.indexes.read().get(&column_idx) {
            return Some(Arc::clone(index));
        }

        let mut indexes = self.indexes.write();
        if let Some(index) = indexes.get(&column_idx) {
            return Some(Arc::clone(index));
        }
        let index = Arc::new(ColumnIndex::build(column)?);
        self.builds.fetch_add(1, Ordering::Relaxed);
        indexes.insert(column_idx, Arc::clone(&index));
        Some(index)
    }

    /// Drop all cached indexes.
    pub fn invalidate(&mut self) {
        self.indexes.get_mut().clear();
    }

    /// Number of currently cached indexes.
    pub fn len(&self) -> usize {
        self.indexes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of index builds since creation.
    pub fn build_count(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }
}
