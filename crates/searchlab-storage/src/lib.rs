//! Searchlab Storage - Byte-Addressed Object Storage
//!
//! Storage contract through which tables are persisted, with memory and
//! local filesystem backends. Objects are addressed by bucket-relative paths
//! and carry a modification time used for reload detection.
//!
//! Key Features:
//! - Pluggable blocking storage backend trait
//! - Bucket-relative storage paths with sibling suffixes
//! - In-memory backend for tests, local filesystem backend for deployments
//!
//! @version 0.1.0
//! @author Searchlab Development Team

pub mod backend;
pub mod path;

pub use backend::{LocalBackend, MemoryBackend, StorageBackend, StorageStats};
pub use path::StoragePath;
