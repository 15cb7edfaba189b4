//! Searchlab Storage Paths
//!
//! Bucket-relative object paths used to address persisted tables.
//!
//! @version 0.1.0
//! @author Searchlab Development Team

use searchlab_common::{Result, SearchlabError};
use std::fmt;

// =============================================================================
// Storage Path
// =============================================================================

/// Address of an object inside a storage bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoragePath {
    bucket: String,
    segments: Vec<String>,
}

impl StoragePath {
    /// Create a path from a bucket and a `/`-separated object key.
    pub fn new(bucket: impl Into<String>, key: &str) -> Self {
        Self {
            bucket: bucket.into(),
            segments: split_key(key),
        }
    }

    /// Parse `bucket/segment/segment` into a path.
    pub fn parse(text: &str) -> Result<Self> {
        let mut parts = split_key(text).into_iter();
        let bucket = parts
            .next()
            .ok_or_else(|| SearchlabError::InvalidValue(format!("empty storage path '{}'", text)))?;
        let segments: Vec<String> = parts.collect();
        if segments.is_empty() {
            return Err(SearchlabError::InvalidValue(format!(
                "storage path '{}' has no object key",
                text
            )));
        }
        Ok(Self { bucket, segments })
    }

    /// Append one or more `/`-separated segments.
    pub fn append(&self, key: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(split_key(key));
        Self {
            bucket: self.bucket.clone(),
            segments,
        }
    }

    /// Sibling path with `suffix` appended to the final segment.
    pub fn with_suffix(&self, suffix: &str) -> Self {
        let mut segments = self.segments.clone();
        match segments.last_mut() {
            Some(last) => last.push_str(suffix),
            None => segments.push(suffix.to_string()),
        }
        Self {
            bucket: self.bucket.clone(),
            segments,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Object key without the bucket.
    pub fn key(&self) -> String {
        self.segments.join("/")
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            write!(f, "{}", self.bucket)
        } else {
            write!(f, "{}/{}", self.bucket, self.key())
        }
    }
}

fn split_key(key: &str) -> Vec<String> {
    key.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_display() {
        let path = StoragePath::new("searchlab", "/audit//requests.csv");
        assert_eq!(path.bucket(), "searchlab");
        assert_eq!(path.key(), "audit/requests.csv");
        assert_eq!(path.to_string(), "searchlab/audit/requests.csv");
        assert_eq!(path.file_name(), Some("requests.csv"));
    }

    #[test]
    fn test_suffix_and_append() {
        let dir = StoragePath::new("searchlab", "tables");
        let table = dir.append("users.json");
        assert_eq!(table.to_string(), "searchlab/tables/users.json");

        let gz = StoragePath::new("b", "audit/requests.csv").with_suffix(".gz");
        assert_eq!(gz.key(), "audit/requests.csv.gz");
    }

    #[test]
    fn test_parse() {
        let path = StoragePath::parse("bucket/a/b.csv").expect("path should parse");
        assert_eq!(path.bucket(), "bucket");
        assert_eq!(path.segments(), &["a".to_string(), "b.csv".to_string()]);

        assert!(StoragePath::parse("bucket").is_err());
        assert!(StoragePath::parse("").is_err());
    }
}
