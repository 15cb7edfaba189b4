//! Searchlab Error - Unified Error Types
//!
//! Error handling shared by the storage, table, audit and CLI crates.
//! Errors are grouped by domain (storage, schema, codec, remote, config)
//! and classified so that callers can decide between retrying, recovering
//! locally with a fresh table, or surfacing the failure.
//!
//! Key Features:
//! - Domain-specific error variants for storage, tables and codecs
//! - Retryable error detection for transient storage and network failures
//! - Data error classification for malformed persisted input
//! - Seamless integration with std::io, csv, serde_json and toml errors
//!
//! @version 0.1.0
//! @author Searchlab Development Team

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Unified error type for all Searchlab operations.
#[derive(Error, Debug)]
pub enum SearchlabError {
    // Storage errors
    #[error("storage error: {0}")]
    Storage(String),

    #[error("object not found: {0}")]
    NotFound(String),

    // Schema and table errors
    #[error("schema error: {0}")]
    Schema(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    // Codec errors
    #[error("csv error: {0}")]
    Csv(String),

    #[error("unparsable date: {0}")]
    UnparsableDate(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    // Remote errors
    #[error("network error: {0}")]
    Network(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for Searchlab operations.
pub type Result<T> = std::result::Result<T, SearchlabError>;

// =============================================================================
// Conversions
// =============================================================================

impl From<csv::Error> for SearchlabError {
    fn from(err: csv::Error) -> Self {
        SearchlabError::Csv(err.to_string())
    }
}

impl From<serde_json::Error> for SearchlabError {
    fn from(err: serde_json::Error) -> Self {
        SearchlabError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for SearchlabError {
    fn from(err: toml::de::Error) -> Self {
        SearchlabError::Configuration(err.to_string())
    }
}

// =============================================================================
// Error Classification
// =============================================================================

impl SearchlabError {
    /// Returns true if the operation can be safely retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SearchlabError::Storage(_) | SearchlabError::Network(_) | SearchlabError::Io(_)
        )
    }

    /// Returns true if the error stems from malformed input data rather than
    /// from the environment. Such errors are recovered locally by skipping the
    /// offending row or starting from an empty table.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            SearchlabError::Csv(_)
                | SearchlabError::UnparsableDate(_)
                | SearchlabError::Serialization(_)
                | SearchlabError::TypeMismatch(_)
                | SearchlabError::InvalidValue(_)
        )
    }

    /// Returns true if a named object or table was not present.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SearchlabError::NotFound(_) | SearchlabError::TableNotFound(_)
        ) || matches!(self, SearchlabError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(SearchlabError::Network("refused".to_string()).is_retryable());
        assert!(!SearchlabError::Schema("bad prefix".to_string()).is_retryable());
        assert!(SearchlabError::UnparsableDate("x".to_string()).is_data_error());
        assert!(SearchlabError::TableNotFound("t".to_string()).is_not_found());

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(SearchlabError::from(io).is_not_found());
    }

    #[test]
    fn test_json_conversion() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let converted: SearchlabError = err.into();
        assert!(matches!(converted, SearchlabError::Serialization(_)));
    }
}
