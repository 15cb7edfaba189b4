//! Searchlab CSV Codec
//!
//! Serializes tables to semicolon-separated text with a header row and
//! reads them back, coercing each column to a caller-resolved type. The
//! reader tolerates the corruption found in long-lived exports: gzip
//! siblings, placeholder years, decimal commas and ragged rows.
//!
//! Key Features:
//! - `;` separator, English-locale numbers, RFC 3339 instants
//! - Gzip sibling fallback when the primary object is absent
//! - `0000-` placeholder year repair before parsing
//! - Row-level recovery for malformed numbers and field counts
//! - Logged, non-failing stores for the audit write path
//!
//! @version 0.1.0
//! @author Searchlab Development Team

use crate::table::IndexedTable;
use crate::types::{ColumnDef, ColumnType, Schema, Value};
use flate2::read::GzDecoder;
use searchlab_common::{LegacyConfig, Result, SearchlabError};
use searchlab_storage::{StorageBackend, StoragePath};
use std::io::Read;
use std::time::Instant;

pub const SEPARATOR: u8 = b';';
pub const GZIP_SUFFIX: &str = ".gz";
pub const COMMENT_PREFIX: u8 = b'#';
const PLACEHOLDER_PREFIX: &str = "0000-";

// =============================================================================
// Decode Options
// =============================================================================

/// Options controlling legacy repair while decoding.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Year substituted for `0000-` when the column has no earlier valid year.
    pub placeholder_year: i32,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            placeholder_year: LegacyConfig::default().placeholder_year,
        }
    }
}

impl From<&LegacyConfig> for DecodeOptions {
    fn from(config: &LegacyConfig) -> Self {
        Self {
            placeholder_year: config.placeholder_year,
        }
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a table as `;`-separated text with a header row.
pub fn encode(table: &IndexedTable) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(SEPARATOR)
        .from_writer(Vec::new());
    writer.write_record(table.schema().names())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(Value::render))?;
    }
    writer
        .into_inner()
        .map_err(|e| SearchlabError::Csv(e.to_string()))
}

/// Encode and write a table in one storage write. Failures are logged and
/// reported as `false`; the caller keeps its in-memory state.
pub fn store(storage: &dyn StorageBackend, path: &StoragePath, table: &IndexedTable) -> bool {
    let start = Instant::now();
    let bytes = match encode(table) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("failed to encode table for {}: {}", path, e);
            return false;
        }
    };
    match storage.write(path, &bytes) {
        Ok(()) => {
            tracing::info!(
                "stored {} rows to {} in {:?}",
                table.size(),
                path,
                start.elapsed()
            );
            true
        }
        Err(e) => {
            tracing::warn!("failed to store table to {}: {}", path, e);
            false
        }
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Read an object, falling back to its gzip-compressed sibling.
pub fn read_bytes(storage: &dyn StorageBackend, path: &StoragePath) -> Result<Vec<u8>> {
    if storage.exists(path)? {
        return storage.read(path);
    }
    let compressed = path.with_suffix(GZIP_SUFFIX);
    if storage.exists(&compressed)? {
        let data = storage.read(&compressed)?;
        let mut decoded = Vec::new();
        GzDecoder::new(data.as_slice()).read_to_end(&mut decoded)?;
        tracing::debug!("read {} from gzip sibling", path);
        return Ok(decoded);
    }
    Err(SearchlabError::NotFound(path.to_string()))
}

/// Decode `;`-separated text, resolving each header name to a column type.
///
/// Lines starting with `#` are comments. Empty header cells are named
/// `C<i>` after their position. Rows with fewer fields than the header or
/// with an unparsable number are skipped with a warning; surplus fields are
/// ignored. An unparsable instant cell fails the whole decode with
/// [`SearchlabError::UnparsableDate`].
pub fn decode(
    bytes: &[u8],
    resolve: impl Fn(&str) -> ColumnType,
    options: &DecodeOptions,
) -> Result<IndexedTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(SEPARATOR)
        .has_headers(true)
        .comment(Some(COMMENT_PREFIX))
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| match h.trim() {
            "" => format!("C{}", i),
            name => name.to_string(),
        })
        .collect();
    let defs: Vec<ColumnDef> = headers
        .iter()
        .map(|name| ColumnDef::new(name.clone(), resolve(name)))
        .collect();
    let mut table = IndexedTable::new(Schema::new(defs)?);
    let types: Vec<ColumnType> = table
        .schema()
        .columns()
        .iter()
        .map(|c| c.column_type)
        .collect();
    let repaired: Vec<bool> = headers
        .iter()
        .zip(&types)
        .map(|(name, column_type)| *column_type == ColumnType::Instant || name.ends_with(".date"))
        .collect();
    let mut last_years: Vec<Option<String>> = vec![None; headers.len()];

    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("skipping unreadable csv row {}: {}", line + 2, e);
                continue;
            }
        };
        if record.len() < headers.len() {
            tracing::warn!(
                "skipping csv row {} with {} fields, expected {}",
                line + 2,
                record.len(),
                headers.len()
            );
            continue;
        }

        let mut row = Vec::with_capacity(headers.len());
        let mut malformed = None;
        for (i, cell) in record.iter().take(headers.len()).enumerate() {
            let cell = if repaired[i] {
                repair_placeholder(cell, &mut last_years[i], options.placeholder_year)
            } else {
                cell.to_string()
            };
            match Value::parse_as(types[i], &cell) {
                Ok(value) => row.push(value),
                Err(SearchlabError::UnparsableDate(text)) => {
                    return Err(SearchlabError::UnparsableDate(format!(
                        "column '{}' row {}: '{}'",
                        headers[i],
                        line + 2,
                        text
                    )));
                }
                Err(e) => {
                    malformed = Some(format!("column '{}': {}", headers[i], e));
                    break;
                }
            }
        }
        match malformed {
            Some(reason) => tracing::warn!("skipping csv row {}: {}", line + 2, reason),
            None => table.add_row(row)?,
        }
    }
    Ok(table)
}

/// Decode with the column types of `schema`; unknown columns are typed by
/// the naming rules.
pub fn decode_with_schema(
    bytes: &[u8],
    schema: &Schema,
    options: &DecodeOptions,
) -> Result<IndexedTable> {
    decode(
        bytes,
        |name| {
            schema
                .type_of(name)
                .or_else(|| ColumnType::infer_from_name(name))
                .unwrap_or(ColumnType::String)
        },
        options,
    )
}

/// Decode with column types inferred from the naming rules alone.
pub fn decode_inferred(bytes: &[u8], options: &DecodeOptions) -> Result<IndexedTable> {
    decode(
        bytes,
        |name| ColumnType::infer_from_name(name).unwrap_or(ColumnType::String),
        options,
    )
}

/// Read and decode a persisted table.
pub fn load(
    storage: &dyn StorageBackend,
    path: &StoragePath,
    resolve: impl Fn(&str) -> ColumnType,
    options: &DecodeOptions,
) -> Result<IndexedTable> {
    let bytes = read_bytes(storage, path)?;
    decode(&bytes, resolve, options)
}

/// Replace a leading `0000-` in a date column with the last valid year seen
/// in that column, and remember the year of well-formed date cells.
fn repair_placeholder(cell: &str, last_year: &mut Option<String>, placeholder_year: i32) -> String {
    if let Some(rest) = cell.strip_prefix(PLACEHOLDER_PREFIX) {
        let year = last_year
            .clone()
            .unwrap_or_else(|| format!("{:04}", placeholder_year));
        return format!("{}-{}", year, rest);
    }
    let bytes = cell.as_bytes();
    if bytes.len() >= 5 && bytes[..4].iter().all(u8::is_ascii_digit) && bytes[4] == b'-' {
        *last_year = Some(cell[..4].to_string());
    }
    cell.to_string()
}
