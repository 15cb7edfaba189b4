//! Searchlab Table Snapshots
//!
//! Published, immutable versions of a table. A writer builds the next
//! version privately and replaces the current one in a single atomic
//! pointer swap, so readers never observe a partially updated table.
//!
//! @version 0.1.0
//! @author Searchlab Development Team

use crate::table::IndexedTable;
use arc_swap::ArcSwap;
use searchlab_common::Result;
use std::sync::Arc;

/// Atomically replaceable table shared between one writer and many readers.
pub struct SharedTable {
    current: ArcSwap<IndexedTable>,
}

impl SharedTable {
    pub fn new(table: IndexedTable) -> Self {
        Self {
            current: ArcSwap::from_pointee(table),
        }
    }

    /// Replace the current version.
    pub fn publish(&self, table: IndexedTable) {
        self.current.store(Arc::new(table));
    }

    /// The current version. The returned table stays valid after later
    /// publications.
    pub fn load(&self) -> Arc<IndexedTable> {
        self.current.load_full()
    }

    pub fn size(&self) -> usize {
        self.current.load().size()
    }

    /// Filter the current version with `column:value` selects.
    pub fn where_selects<S: AsRef<str>>(&self, selects: &[S]) -> Result<IndexedTable> {
        self.current.load().where_selects(selects)
    }
}

impl Default for SharedTable {
    fn default() -> Self {
        Self::new(IndexedTable::new(crate::types::Schema::default()))
    }
}

impl std::fmt::Debug for SharedTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTable")
            .field("rows", &self.size())
            .finish()
    }
}
