//! Searchlab Common - Shared Types and Utilities
//!
//! Foundational error handling and configuration used across the Searchlab
//! table store components. Provides the abstractions that keep storage,
//! table, audit and CLI layers consistent.
//!
//! Key Features:
//! - Unified error type with retryable and data error detection
//! - Configuration structures for storage, audit and registry
//! - Legacy data hygiene constants
//!
//! @version 0.1.0
//! @author Searchlab Development Team

pub mod config;
pub mod error;

pub use config::{AuditConfig, LegacyConfig, RegistryConfig, SearchlabConfig, StorageConfig};
pub use error::{Result, SearchlabError};
