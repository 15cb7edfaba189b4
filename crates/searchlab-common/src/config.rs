//! Searchlab Config - Configuration Structures
//!
//! Configuration types for the table store and its audit harness. Supports
//! loading from TOML files and programmatic construction, with defaults that
//! match the historical on-disk layout.
//!
//! Key Features:
//! - Storage configuration (data directory, bucket)
//! - Audit configuration (cycle period, table paths)
//! - Registry configuration (remote table host, local table directory)
//! - Legacy data hygiene constants (year prefix, migration cutoff)
//!
//! @version 0.1.0
//! @author Searchlab Development Team

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Result, SearchlabError};

// =============================================================================
// Storage Configuration
// =============================================================================

/// Configuration for the byte-addressed storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("./data"),
            bucket: "searchlab".to_string(),
        }
    }
}

// =============================================================================
// Audit Configuration
// =============================================================================

/// Configuration for the periodic audit harness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub cycle_period_ms: u64,
    pub requests_path: String,
    pub visitors_path: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            cycle_period_ms: 10_000,
            requests_path: "audit/requests.csv".to_string(),
            visitors_path: "audit/visitors.csv".to_string(),
        }
    }
}

impl AuditConfig {
    /// Interval between two scheduler cycles.
    pub fn cycle_period(&self) -> Duration {
        Duration::from_millis(self.cycle_period_ms)
    }
}

// =============================================================================
// Registry Configuration
// =============================================================================

/// Configuration for the named table registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL of a remote table host, e.g. `http://host:8400/tables/`.
    pub remote_url: Option<String>,
    pub tables_path: String,
    pub request_timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            tables_path: "tables".to_string(),
            request_timeout_ms: 5_000,
        }
    }
}

impl RegistryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// =============================================================================
// Legacy Data Configuration
// =============================================================================

/// Constants used to repair legacy minute-table exports on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyConfig {
    /// Minute date strings not starting with this prefix are treated as corrupt.
    pub recent_year_prefix: String,
    /// Rows before this minute (`yyyy-MM-dd HH:mm`, UTC) are dropped after load.
    pub migration_cutoff: String,
    /// Year substituted for the `0000-` placeholder when a column has no valid year yet.
    pub placeholder_year: i32,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            recent_year_prefix: "202".to_string(),
            migration_cutoff: "2022-05-29 00:00".to_string(),
            placeholder_year: 2022,
        }
    }
}

impl LegacyConfig {
    /// Parse the migration cutoff as a UTC instant.
    pub fn migration_cutoff_instant(&self) -> Result<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.migration_cutoff, "%Y-%m-%d %H:%M")
            .map(|naive| naive.and_utc())
            .map_err(|e| {
                SearchlabError::Configuration(format!(
                    "invalid migration cutoff '{}': {}",
                    self.migration_cutoff, e
                ))
            })
    }
}

// =============================================================================
// Top-level Configuration
// =============================================================================

/// Top-level Searchlab configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SearchlabConfig {
    pub storage: StorageConfig,
    pub audit: AuditConfig,
    pub registry: RegistryConfig,
    pub legacy: LegacyConfig,
}

impl SearchlabConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Create configuration with development defaults.
    pub fn development() -> Self {
        Self {
            audit: AuditConfig {
                cycle_period_ms: 1_000,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Check values that serde cannot validate on its own.
    pub fn validate(&self) -> Result<()> {
        if self.audit.cycle_period_ms == 0 {
            return Err(SearchlabError::Configuration(
                "audit.cycle_period_ms must be positive".to_string(),
            ));
        }
        if self.storage.bucket.is_empty() {
            return Err(SearchlabError::Configuration(
                "storage.bucket must not be empty".to_string(),
            ));
        }
        self.legacy.migration_cutoff_instant()?;
        Ok(())
    }
}
