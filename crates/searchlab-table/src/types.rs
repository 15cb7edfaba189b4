//! Searchlab Table Types
//!
//! Cell values, column types and roles, and table schemas. Column roles are
//! derived from the name prefix (`view.`, `meta.`, `data.`, `unit.`), which is
//! the on-disk contract used to regroup columns after deserialization.
//!
//! @version 0.1.0
//! @author Searchlab Development Team

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use searchlab_common::{Result, SearchlabError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub const VIEW_PREFIX: &str = "view.";
pub const META_PREFIX: &str = "meta.";
pub const DATA_PREFIX: &str = "data.";
pub const UNIT_PREFIX: &str = "unit.";

// =============================================================================
// Column Type
// =============================================================================

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Int64,
    Float64,
    Instant,
}

impl ColumnType {
    /// Type implied by the column naming rules, if any.
    ///
    /// `view.`, `meta.` and `unit.` columns are strings, `data.` columns are
    /// doubles. The minute columns `ts.time` and `ts.date` hold an instant
    /// and its text rendering. Otherwise a `.date` suffix marks an instant
    /// and `.time`, `.year` or `.week` suffixes mark an integer.
    pub fn infer_from_name(name: &str) -> Option<ColumnType> {
        if name == "ts.time" {
            Some(ColumnType::Instant)
        } else if name == "ts.date" {
            Some(ColumnType::String)
        } else if name.starts_with(VIEW_PREFIX)
            || name.starts_with(META_PREFIX)
            || name.starts_with(UNIT_PREFIX)
        {
            Some(ColumnType::String)
        } else if name.starts_with(DATA_PREFIX) {
            Some(ColumnType::Float64)
        } else if name.ends_with(".date") {
            Some(ColumnType::Instant)
        } else if name.ends_with(".time") || name.ends_with(".year") || name.ends_with(".week") {
            Some(ColumnType::Int64)
        } else {
            None
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Int64 | ColumnType::Float64)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::String => write!(f, "string"),
            ColumnType::Int64 => write!(f, "int64"),
            ColumnType::Float64 => write!(f, "float64"),
            ColumnType::Instant => write!(f, "instant"),
        }
    }
}

// =============================================================================
// Column Role
// =============================================================================

/// Semantic role of a column within a series table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnRole {
    Time,
    View,
    Meta,
    Data,
    Unit,
}

impl ColumnRole {
    pub fn from_name(name: &str) -> ColumnRole {
        if name.starts_with(VIEW_PREFIX) {
            ColumnRole::View
        } else if name.starts_with(META_PREFIX) {
            ColumnRole::Meta
        } else if name.starts_with(DATA_PREFIX) {
            ColumnRole::Data
        } else if name.starts_with(UNIT_PREFIX) {
            ColumnRole::Unit
        } else {
            ColumnRole::Time
        }
    }

    /// Name prefix required for this role.
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            ColumnRole::Time => None,
            ColumnRole::View => Some(VIEW_PREFIX),
            ColumnRole::Meta => Some(META_PREFIX),
            ColumnRole::Data => Some(DATA_PREFIX),
            ColumnRole::Unit => Some(UNIT_PREFIX),
        }
    }
}

// =============================================================================
// Value
// =============================================================================

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int64(i64),
    Float64(f64),
    Instant(DateTime<Utc>),
}

impl Value {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::String(_) => ColumnType::String,
            Value::Int64(_) => ColumnType::Int64,
            Value::Float64(_) => ColumnType::Float64,
            Value::Instant(_) => ColumnType::Instant,
        }
    }

    /// Default value of a type: empty string, zero, or the epoch.
    pub fn zero(column_type: ColumnType) -> Value {
        match column_type {
            ColumnType::String => Value::String(String::new()),
            ColumnType::Int64 => Value::Int64(0),
            ColumnType::Float64 => Value::Float64(0.0),
            ColumnType::Instant => Value::Instant(DateTime::<Utc>::default()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of a numeric or instant value; doubles are truncated and
    /// instants yield epoch milliseconds.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            Value::Float64(v) if v.is_finite() => Some(*v as i64),
            Value::Instant(t) => Some(t.timestamp_millis()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Instant(t) => Some(*t),
            _ => None,
        }
    }

    /// True for empty strings and NaN doubles.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Canonical text form used by the CSV codec and equality selects.
    pub fn render(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Int64(v) => v.to_string(),
            Value::Float64(v) => format_float(*v),
            Value::Instant(t) => format_instant(t),
        }
    }

    /// JSON form; instants are exported as epoch milliseconds.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int64(v) => serde_json::Value::from(*v),
            Value::Float64(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Instant(t) => serde_json::Value::from(t.timestamp_millis()),
        }
    }

    /// Parse text into a value of the given type.
    ///
    /// Numbers accept an English decimal point and tolerate a decimal comma;
    /// an empty numeric cell is zero for integers and NaN for doubles.
    pub fn parse_as(column_type: ColumnType, text: &str) -> Result<Value> {
        let trimmed = text.trim();
        match column_type {
            ColumnType::String => Ok(Value::String(text.to_string())),
            ColumnType::Int64 => {
                if trimmed.is_empty() {
                    return Ok(Value::Int64(0));
                }
                if let Ok(v) = trimmed.parse::<i64>() {
                    return Ok(Value::Int64(v));
                }
                parse_float(trimmed)
                    .filter(|v| v.is_finite())
                    .map(|v| Value::Int64(v as i64))
                    .ok_or_else(|| {
                        SearchlabError::InvalidValue(format!("not an integer: '{}'", text))
                    })
            }
            ColumnType::Float64 => {
                if trimmed.is_empty() {
                    return Ok(Value::Float64(f64::NAN));
                }
                parse_float(trimmed)
                    .map(Value::Float64)
                    .ok_or_else(|| SearchlabError::InvalidValue(format!("not a number: '{}'", text)))
            }
            ColumnType::Instant => parse_instant(trimmed)
                .map(Value::Instant)
                .ok_or_else(|| SearchlabError::UnparsableDate(text.to_string())),
        }
    }

    /// Best-effort conversion of an existing value to another column type.
    pub fn coerce(self, column_type: ColumnType) -> Result<Value> {
        if self.column_type() == column_type {
            return Ok(self);
        }
        match (self, column_type) {
            (Value::Int64(v), ColumnType::Float64) => Ok(Value::Float64(v as f64)),
            (Value::Float64(v), ColumnType::Int64) if v.is_finite() => Ok(Value::Int64(v as i64)),
            (Value::Int64(v), ColumnType::Instant) => Utc
                .timestamp_millis_opt(v)
                .single()
                .map(Value::Instant)
                .ok_or_else(|| SearchlabError::UnparsableDate(v.to_string())),
            (Value::Instant(t), ColumnType::Int64) => Ok(Value::Int64(t.timestamp_millis())),
            (value, ColumnType::String) => Ok(Value::String(value.render())),
            (Value::String(s), target) => Value::parse_as(target, &s),
            (value, target) => Err(SearchlabError::TypeMismatch(format!(
                "cannot convert {} value '{}' to {}",
                value.column_type(),
                value.render(),
                target
            ))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Instant(v)
    }
}

// =============================================================================
// Text Formats
// =============================================================================

/// Render a double so that it always carries a decimal point.
pub fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}

/// Render an instant as RFC 3339 with millisecond precision.
pub fn format_instant(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_float(text: &str) -> Option<f64> {
    text.parse::<f64>()
        .ok()
        .or_else(|| text.replace(',', ".").parse::<f64>().ok())
}

/// Parse the instant forms found in persisted tables: RFC 3339,
/// `yyyy-MM-dd HH:mm[:ss]`, `yyyy-MM-dd` and epoch milliseconds. Zone-less
/// forms are read as UTC.
pub fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    for pattern in ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, pattern) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    text.parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
}

// =============================================================================
// Schema
// =============================================================================

/// Definition of a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub role: ColumnRole,
    pub column_type: ColumnType,
}

impl ColumnDef {
    /// Create a column; the role follows from the name prefix.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        let name = name.into();
        Self {
            role: ColumnRole::from_name(&name),
            name,
            column_type,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::String)
    }

    pub fn int64(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Int64)
    }

    pub fn float64(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Float64)
    }

    pub fn instant(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Instant)
    }
}

/// Ordered list of column definitions with unique names.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<ColumnDef>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnDef>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if column.name.is_empty() {
                return Err(SearchlabError::Schema("empty column name".to_string()));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(SearchlabError::Schema(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, index: usize) -> Option<&ColumnDef> {
        self.columns.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn type_of(&self, name: &str) -> Option<ColumnType> {
        self.index_of(name).map(|i| self.columns[i].column_type)
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Names of all columns with the given role, in schema order.
    pub fn names_with_role(&self, role: ColumnRole) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.role == role)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Same column names and types, in any order.
    pub fn is_compatible(&self, other: &Schema) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .all(|c| other.type_of(&c.name) == Some(c.column_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_prefix() {
        assert_eq!(ColumnRole::from_name("view.host"), ColumnRole::View);
        assert_eq!(ColumnRole::from_name("meta.ip"), ColumnRole::Meta);
        assert_eq!(ColumnRole::from_name("data.count"), ColumnRole::Data);
        assert_eq!(ColumnRole::from_name("unit.count"), ColumnRole::Unit);
        assert_eq!(ColumnRole::from_name("ts.time"), ColumnRole::Time);
        assert_eq!(ColumnRole::from_name("viewer"), ColumnRole::Time);
    }

    #[test]
    fn test_type_inference_from_name() {
        assert_eq!(ColumnType::infer_from_name("view.id"), Some(ColumnType::String));
        assert_eq!(ColumnType::infer_from_name("unit.x"), Some(ColumnType::String));
        assert_eq!(ColumnType::infer_from_name("data.x"), Some(ColumnType::Float64));
        assert_eq!(ColumnType::infer_from_name("tscw.date"), Some(ColumnType::Instant));
        assert_eq!(ColumnType::infer_from_name("tscw.time"), Some(ColumnType::Int64));
        assert_eq!(ColumnType::infer_from_name("tscw.year"), Some(ColumnType::Int64));
        assert_eq!(ColumnType::infer_from_name("tscw.week"), Some(ColumnType::Int64));
        assert_eq!(ColumnType::infer_from_name("tscw.prnt"), None);
        assert_eq!(ColumnType::infer_from_name("ts.time"), Some(ColumnType::Instant));
        assert_eq!(ColumnType::infer_from_name("ts.date"), Some(ColumnType::String));
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(Value::parse_as(ColumnType::Int64, "42").unwrap(), Value::Int64(42));
        assert_eq!(Value::parse_as(ColumnType::Int64, "42.9").unwrap(), Value::Int64(42));
        assert_eq!(Value::parse_as(ColumnType::Float64, "2,5").unwrap(), Value::Float64(2.5));
        assert!(Value::parse_as(ColumnType::Int64, "forty").is_err());
        assert!(Value::parse_as(ColumnType::Float64, "").unwrap().is_missing());
    }

    #[test]
    fn test_parse_instants() {
        let expected = Utc.with_ymd_and_hms(2022, 5, 29, 12, 34, 0).unwrap();
        assert_eq!(parse_instant("2022-05-29T12:34:00.000Z"), Some(expected));
        assert_eq!(parse_instant("2022-05-29 12:34"), Some(expected));
        assert_eq!(parse_instant(&expected.timestamp_millis().to_string()), Some(expected));
        assert_eq!(
            parse_instant("2022-05-29"),
            Some(Utc.with_ymd_and_hms(2022, 5, 29, 0, 0, 0).unwrap())
        );
        assert!(matches!(
            Value::parse_as(ColumnType::Instant, "yesterday noon"),
            Err(SearchlabError::UnparsableDate(_))
        ));
    }

    #[test]
    fn test_render() {
        assert_eq!(Value::Float64(5.0).render(), "5.0");
        assert_eq!(Value::Float64(2.25).render(), "2.25");
        let t = Utc.with_ymd_and_hms(2023, 3, 6, 0, 0, 0).unwrap();
        assert_eq!(Value::Instant(t).render(), "2023-03-06T00:00:00.000Z");
    }

    #[test]
    fn test_coerce() {
        let t = Utc.with_ymd_and_hms(2023, 3, 6, 0, 0, 0).unwrap();
        let millis = t.timestamp_millis();
        assert_eq!(Value::Int64(millis).coerce(ColumnType::Instant).unwrap(), Value::Instant(t));
        assert_eq!(Value::Int64(3).coerce(ColumnType::Float64).unwrap(), Value::Float64(3.0));
        assert_eq!(Value::Float64(3.0).coerce(ColumnType::String).unwrap(), Value::from("3.0"));
        assert!(Value::Instant(t).coerce(ColumnType::Float64).is_err());
    }

    #[test]
    fn test_schema_validation() {
        let schema = Schema::new(vec![ColumnDef::string("view.a"), ColumnDef::float64("data.b")])
            .expect("schema should be valid");
        assert_eq!(schema.index_of("data.b"), Some(1));
        assert_eq!(schema.names_with_role(ColumnRole::Data), vec!["data.b"]);

        assert!(Schema::new(vec![ColumnDef::string("view.a"), ColumnDef::string("view.a")]).is_err());

        let reordered =
            Schema::new(vec![ColumnDef::float64("data.b"), ColumnDef::string("view.a")]).unwrap();
        assert!(schema.is_compatible(&reordered));
    }
}
