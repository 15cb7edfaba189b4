//! Searchlab Request Audit
//!
//! Counts requests per user and distinct visitors per audit cycle into two
//! minute series tables, persists them as `;`-separated text and publishes
//! snapshots for the table registry.
//!
//! Key Features:
//! - Non-blocking event intake from request handlers
//! - Reload of tables rewritten by another process
//! - Persistence only when a cycle added rows
//!
//! @version 0.1.0
//! @author Searchlab Development Team

use crate::buffer::EventBuffer;
use crate::task::AuditTask;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use searchlab_common::{LegacyConfig, Result, SearchlabConfig};
use searchlab_storage::{StorageBackend, StoragePath};
use searchlab_table::{DataType, MinuteSeriesTable, SharedTable};
use std::sync::Arc;

pub const REQUESTS_VIEW: [&str; 1] = ["view.id"];
pub const REQUESTS_META: [&str; 1] = ["meta.ip"];
pub const REQUESTS_DATA: [&str; 1] = ["data.requests"];
pub const VISITORS_DATA: [&str; 1] = ["data.visitors"];

// =============================================================================
// Tracked Table
// =============================================================================

/// Column layout of an audit table.
#[derive(Debug, Clone, Copy)]
struct Shape {
    view: &'static [&'static str],
    meta: &'static [&'static str],
    data: &'static [&'static str],
}

const REQUESTS_SHAPE: Shape = Shape {
    view: &REQUESTS_VIEW,
    meta: &REQUESTS_META,
    data: &REQUESTS_DATA,
};

const VISITORS_SHAPE: Shape = Shape {
    view: &[],
    meta: &[],
    data: &VISITORS_DATA,
};

/// A minute table together with its storage location and the time it was
/// last read from or written to storage.
struct TrackedTable {
    path: StoragePath,
    shape: Shape,
    table: MinuteSeriesTable,
    synced_at: DateTime<Utc>,
}

impl TrackedTable {
    fn empty(shape: Shape) -> Result<MinuteSeriesTable> {
        MinuteSeriesTable::new(shape.view, shape.meta, shape.data, DataType::Int64)
    }

    /// Stored table if present and shaped as expected, otherwise empty.
    fn open(
        storage: &dyn StorageBackend,
        path: StoragePath,
        shape: Shape,
        legacy: &LegacyConfig,
    ) -> Result<Self> {
        let table = match storage.exists(&path) {
            Ok(true) => Self::read(storage, &path, shape, legacy).unwrap_or_else(|| {
                tracing::warn!("starting {} with an empty table", path);
                Self::empty(shape)
            })?,
            Ok(false) => Self::empty(shape)?,
            Err(e) => {
                tracing::warn!("failed to check {}: {}", path, e);
                Self::empty(shape)?
            }
        };
        Ok(Self {
            path,
            shape,
            table,
            synced_at: Utc::now(),
        })
    }

    fn read(
        storage: &dyn StorageBackend,
        path: &StoragePath,
        shape: Shape,
        legacy: &LegacyConfig,
    ) -> Option<Result<MinuteSeriesTable>> {
        match MinuteSeriesTable::load(storage, path, DataType::Int64, legacy) {
            Ok(table) if table.has_shape(shape.view, shape.meta, shape.data) => {
                tracing::info!("loaded {} rows from {}", table.size(), path);
                Some(Ok(table))
            }
            Ok(_) => {
                tracing::warn!("unexpected columns in {}", path);
                None
            }
            Err(e) => {
                tracing::warn!("failed to load {}: {}", path, e);
                None
            }
        }
    }

    /// Re-read the table if storage holds a newer version. Returns whether
    /// the table was replaced.
    fn reload_if_modified(&mut self, storage: &dyn StorageBackend, legacy: &LegacyConfig) -> bool {
        let modified = match storage.last_modified(&self.path) {
            Ok(modified) => modified,
            Err(e) if e.is_not_found() => return false,
            Err(e) => {
                tracing::warn!("failed to stat {}: {}", self.path, e);
                return false;
            }
        };
        if modified <= self.synced_at {
            return false;
        }
        match Self::read(storage, &self.path, self.shape, legacy) {
            Some(Ok(table)) => {
                self.table = table;
                self.synced_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    fn store(&mut self, storage: &dyn StorageBackend) {
        if self.table.store(storage, &self.path) {
            self.synced_at = Utc::now();
        }
    }
}

// =============================================================================
// Request Audit
// =============================================================================

/// Audit task folding buffered request events into minute tables.
pub struct RequestAudit {
    storage: Arc<dyn StorageBackend>,
    legacy: LegacyConfig,
    events: EventBuffer,
    requests: Mutex<TrackedTable>,
    visitors: Mutex<TrackedTable>,
    requests_snapshot: Arc<SharedTable>,
    visitors_snapshot: Arc<SharedTable>,
}

impl RequestAudit {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        requests_path: StoragePath,
        visitors_path: StoragePath,
        legacy: LegacyConfig,
    ) -> Result<Self> {
        let requests = TrackedTable::open(storage.as_ref(), requests_path, REQUESTS_SHAPE, &legacy)?;
        let visitors = TrackedTable::open(storage.as_ref(), visitors_path, VISITORS_SHAPE, &legacy)?;
        Ok(Self {
            requests_snapshot: Arc::new(SharedTable::new(requests.table.snapshot())),
            visitors_snapshot: Arc::new(SharedTable::new(visitors.table.snapshot())),
            requests: Mutex::new(requests),
            visitors: Mutex::new(visitors),
            events: EventBuffer::new(),
            storage,
            legacy,
        })
    }

    /// Audit over the configured bucket and table paths.
    pub fn from_config(config: &SearchlabConfig, storage: Arc<dyn StorageBackend>) -> Result<Self> {
        let bucket = &config.storage.bucket;
        Self::new(
            storage,
            StoragePath::new(bucket.as_str(), &config.audit.requests_path),
            StoragePath::new(bucket.as_str(), &config.audit.visitors_path),
            config.legacy.clone(),
        )
    }

    /// Record one request by user `id` from address `ip`.
    pub fn event(&self, id: &str, ip: &str) {
        self.events.record(id, ip);
    }

    pub fn pending_users(&self) -> usize {
        self.events.len()
    }

    pub fn requests_snapshot(&self) -> Arc<SharedTable> {
        Arc::clone(&self.requests_snapshot)
    }

    pub fn visitors_snapshot(&self) -> Arc<SharedTable> {
        Arc::clone(&self.visitors_snapshot)
    }

    /// Run one audit cycle stamped with `now`.
    pub fn check_at(&self, now: DateTime<Utc>) {
        let at = now.timestamp_millis();
        let pending = self.events.drain();
        let storage = self.storage.as_ref();

        let mut requests = self.requests.lock();
        let reloaded = requests.reload_if_modified(storage, &self.legacy);
        let size_before = requests.table.size();
        for (id, observations) in &pending {
            let Some(first) = observations.first() else {
                continue;
            };
            let count = observations.len() as i64;
            if let Err(e) = requests
                .table
                .add_values(at, &[id.as_str()], &[first.attribute.as_str()], &[count])
            {
                tracing::warn!("failed to record requests of {}: {}", id, e);
            }
        }
        let grown = requests.table.size() > size_before;
        if grown {
            requests.store(storage);
        }
        if grown || reloaded {
            self.requests_snapshot.publish(requests.table.snapshot());
        }
        drop(requests);

        let mut visitors = self.visitors.lock();
        let reloaded = visitors.reload_if_modified(storage, &self.legacy);
        let size_before = visitors.table.size();
        if !pending.is_empty() {
            if let Err(e) = visitors.table.add_values(at, &[], &[], &[pending.len() as i64]) {
                tracing::warn!("failed to record visitors: {}", e);
            }
        }
        let grown = visitors.table.size() > size_before;
        if grown {
            visitors.store(storage);
        }
        if grown || reloaded {
            self.visitors_snapshot.publish(visitors.table.snapshot());
        }

        if !pending.is_empty() {
            tracing::debug!("request audit folded {} users", pending.len());
        }
    }
}

impl AuditTask for RequestAudit {
    fn name(&self) -> &str {
        "request-audit"
    }

    fn check(&self) {
        self.check_at(Utc::now());
    }
}
