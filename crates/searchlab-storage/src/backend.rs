//! Searchlab Backend - Storage Backend Abstraction
//!
//! Defines the byte-addressed storage contract the table store persists
//! through, plus in-memory and local filesystem implementations. Objects are
//! opaque byte blobs addressed by bucket-relative paths; modification times
//! drive the reload-if-changed logic of the audit tasks.
//!
//! Key Features:
//! - Blocking exists/read/write/remove/last-modified operations
//! - Atomic local writes through temp file and rename
//! - Operation statistics for diagnostics
//! - Read-only switch on the memory backend for failure testing
//!
//! @version 0.1.0
//! @author Searchlab Development Team

use crate::path::StoragePath;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use searchlab_common::{Result, SearchlabError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

// =============================================================================
// Storage Backend Trait
// =============================================================================

/// Pluggable storage backend interface.
pub trait StorageBackend: Send + Sync {
    /// Check if an object exists.
    fn exists(&self, path: &StoragePath) -> Result<bool>;

    /// Read the full content of an object.
    fn read(&self, path: &StoragePath) -> Result<Vec<u8>>;

    /// Create or replace an object.
    fn write(&self, path: &StoragePath, data: &[u8]) -> Result<()>;

    /// Delete an object. Removing a missing object is not an error.
    fn remove(&self, path: &StoragePath) -> Result<()>;

    /// Time of the last write to an object.
    fn last_modified(&self, path: &StoragePath) -> Result<DateTime<Utc>>;

    /// Get storage statistics.
    fn stats(&self) -> StorageStats;
}

// =============================================================================
// Storage Statistics
// =============================================================================

/// Statistics about storage usage and operations.
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    pub total_objects: u64,
    pub total_bytes: u64,
    pub read_ops: u64,
    pub write_ops: u64,
    pub delete_ops: u64,
}

// =============================================================================
// Memory Backend
// =============================================================================

struct MemoryObject {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

/// In-memory storage backend for testing and development.
pub struct MemoryBackend {
    objects: RwLock<HashMap<String, MemoryObject>>,
    stats: RwLock<StorageStats>,
    read_only: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            stats: RwLock::new(StorageStats::default()),
            read_only: AtomicBool::new(false),
        }
    }

    /// Reject all writes while set, simulating an unavailable store.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
    fn exists(&self, path: &StoragePath) -> Result<bool> {
        Ok(self.objects.read().contains_key(&path.to_string()))
    }

    fn read(&self, path: &StoragePath) -> Result<Vec<u8>> {
        let objects = self.objects.read();
        let data = objects
            .get(&path.to_string())
            .map(|object| object.data.clone())
            .ok_or_else(|| SearchlabError::NotFound(path.to_string()))?;

        self.stats.write().read_ops += 1;
        Ok(data)
    }

    fn write(&self, path: &StoragePath, data: &[u8]) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(SearchlabError::Storage(format!(
                "backend is read-only, cannot write {}",
                path
            )));
        }

        let mut objects = self.objects.write();
        let previous = objects.insert(
            path.to_string(),
            MemoryObject {
                data: data.to_vec(),
                modified: Utc::now(),
            },
        );

        let mut stats = self.stats.write();
        stats.write_ops += 1;
        match previous {
            Some(old) => {
                stats.total_bytes = stats.total_bytes - old.data.len() as u64 + data.len() as u64;
            }
            None => {
                stats.total_objects += 1;
                stats.total_bytes += data.len() as u64;
            }
        }
        Ok(())
    }

    fn remove(&self, path: &StoragePath) -> Result<()> {
        if let Some(old) = self.objects.write().remove(&path.to_string()) {
            let mut stats = self.stats.write();
            stats.delete_ops += 1;
            stats.total_objects -= 1;
            stats.total_bytes -= old.data.len() as u64;
        }
        Ok(())
    }

    fn last_modified(&self, path: &StoragePath) -> Result<DateTime<Utc>> {
        self.objects
            .read()
            .get(&path.to_string())
            .map(|object| object.modified)
            .ok_or_else(|| SearchlabError::NotFound(path.to_string()))
    }

    fn stats(&self) -> StorageStats {
        self.stats.read().clone()
    }
}

// =============================================================================
// Local Filesystem Backend
// =============================================================================

/// Local filesystem storage backend. Objects live at
/// `data_dir/bucket/segment/...`.
pub struct LocalBackend {
    data_dir: PathBuf,
    stats: RwLock<StorageStats>,
}

impl LocalBackend {
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir,
            stats: RwLock::new(StorageStats::default()),
        })
    }

    pub fn data_dir(&self) -> &std::path::Path {
        &self.data_dir
    }

    fn object_path(&self, path: &StoragePath) -> PathBuf {
        let mut file = self.data_dir.join(path.bucket());
        for segment in path.segments() {
            file.push(segment);
        }
        file
    }
}

impl StorageBackend for LocalBackend {
    fn exists(&self, path: &StoragePath) -> Result<bool> {
        Ok(self.object_path(path).is_file())
    }

    fn read(&self, path: &StoragePath) -> Result<Vec<u8>> {
        let file = self.object_path(path);
        let data = std::fs::read(&file).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SearchlabError::NotFound(path.to_string())
            } else {
                SearchlabError::Io(e)
            }
        })?;

        self.stats.write().read_ops += 1;
        Ok(data)
    }

    fn write(&self, path: &StoragePath, data: &[u8]) -> Result<()> {
        let start = Instant::now();
        let file = self.object_path(path);
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let is_new = !file.exists();

        // Write to a temporary file first, then rename for atomicity
        let mut temp_name = file.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp = PathBuf::from(temp_name);
        std::fs::write(&temp, data)?;
        std::fs::rename(&temp, &file)?;

        let mut stats = self.stats.write();
        stats.write_ops += 1;
        stats.total_bytes += data.len() as u64;
        if is_new {
            stats.total_objects += 1;
        }

        tracing::debug!(
            "wrote {} bytes to {} in {:?}",
            data.len(),
            path,
            start.elapsed()
        );
        Ok(())
    }

    fn remove(&self, path: &StoragePath) -> Result<()> {
        match std::fs::remove_file(self.object_path(path)) {
            Ok(()) => {
                let mut stats = self.stats.write();
                stats.delete_ops += 1;
                stats.total_objects = stats.total_objects.saturating_sub(1);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SearchlabError::Io(e)),
        }
    }

    fn last_modified(&self, path: &StoragePath) -> Result<DateTime<Utc>> {
        let metadata = std::fs::metadata(self.object_path(path)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SearchlabError::NotFound(path.to_string())
            } else {
                SearchlabError::Io(e)
            }
        })?;
        Ok(DateTime::<Utc>::from(metadata.modified()?))
    }

    fn stats(&self) -> StorageStats {
        self.stats.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_write_read() {
        let backend = MemoryBackend::new();
        let path = StoragePath::new("bucket", "a/b.csv");

        assert!(!backend.exists(&path).expect("exists should succeed"));
        backend.write(&path, b"test data").expect("write should succeed");
        assert!(backend.exists(&path).expect("exists should succeed"));

        let data = backend.read(&path).expect("read should succeed");
        assert_eq!(data, b"test data");

        let stats = backend.stats();
        assert_eq!(stats.total_objects, 1);
        assert_eq!(stats.total_bytes, 9);
    }

    #[test]
    fn test_memory_backend_overwrite_updates_modified() {
        let backend = MemoryBackend::new();
        let path = StoragePath::new("bucket", "t.csv");

        backend.write(&path, b"one").expect("write should succeed");
        let first = backend.last_modified(&path).expect("last_modified should succeed");
        std::thread::sleep(std::time::Duration::from_millis(5));
        backend.write(&path, b"three").expect("write should succeed");
        let second = backend.last_modified(&path).expect("last_modified should succeed");

        assert!(second > first);
        assert_eq!(backend.stats().total_bytes, 5);
        assert_eq!(backend.stats().total_objects, 1);
    }

    #[test]
    fn test_memory_backend_read_only() {
        let backend = MemoryBackend::new();
        let path = StoragePath::new("bucket", "t.csv");

        backend.set_read_only(true);
        assert!(matches!(
            backend.write(&path, b"x"),
            Err(SearchlabError::Storage(_))
        ));
        backend.set_read_only(false);
        backend.write(&path, b"x").expect("write should succeed");
    }

    #[test]
    fn test_memory_backend_missing() {
        let backend = MemoryBackend::new();
        let path = StoragePath::new("bucket", "missing");

        assert!(backend.read(&path).unwrap_err().is_not_found());
        assert!(backend.last_modified(&path).is_err());
        backend.remove(&path).expect("removing a missing object should succeed");
    }

    #[test]
    fn test_local_backend_write_read() {
        let temp_dir = tempfile::tempdir().expect("tempdir should be created");
        let backend =
            LocalBackend::new(temp_dir.path().to_path_buf()).expect("LocalBackend::new should succeed");
        let path = StoragePath::new("bucket", "audit/requests.csv");

        backend.write(&path, b"ts.time;ts.date\n").expect("write should succeed");
        assert!(temp_dir.path().join("bucket/audit/requests.csv").is_file());

        let data = backend.read(&path).expect("read should succeed");
        assert_eq!(data, b"ts.time;ts.date\n");
        assert!(backend.last_modified(&path).is_ok());

        backend.remove(&path).expect("remove should succeed");
        assert!(!backend.exists(&path).expect("exists should succeed"));
        assert!(backend.read(&path).unwrap_err().is_not_found());
    }
}
