use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, ErrorKind, Result};

/// Semantic type of a column. Every column stores exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,  // i64
    Float,    // f64
    Boolean,
    DateTime, // UTC, millisecond precision
    String,
}

impl ColumnType {
    /// Parse a type name as callers write it ("int", "string", "DateTime", ...).
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "int" | "int32" | "int64" | "long" | "short" | "byte" | "integer" => Ok(ColumnType::Integer),
            "double" | "float" | "single" | "decimal" => Ok(ColumnType::Float),
            "bool" | "boolean" => Ok(ColumnType::Boolean),
            "datetime" | "date" => Ok(ColumnType::DateTime),
            "string" | "text" | "html" => Ok(ColumnType::String),
            other => Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Unknown column type '{other}'"),
            )),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Integer => "long",
            ColumnType::Float => "double",
            ColumnType::Boolean => "bool",
            ColumnType::DateTime => "DateTime",
            ColumnType::String => "string",
        }
    }

    pub fn default_value(self) -> Value {
        match self {
            ColumnType::Integer => Value::Integer(0),
            ColumnType::Float => Value::Float(0.0),
            ColumnType::Boolean => Value::Boolean(false),
            ColumnType::DateTime => Value::DateTime(DateTime::<Utc>::UNIX_EPOCH),
            ColumnType::String => Value::Text(String::new()),
        }
    }

    /// Types that can identify a row.
    pub fn can_be_id(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::String | ColumnType::DateTime)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single cell value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(ColumnType::Integer),
            Value::Float(_) => Some(ColumnType::Float),
            Value::Boolean(_) => Some(ColumnType::Boolean),
            Value::DateTime(_) => Some(ColumnType::DateTime),
            Value::Text(_) => Some(ColumnType::String),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Convert to the given column type, parsing text when needed.
    pub fn coerce(&self, target: ColumnType) -> Result<Value> {
        let converted = match (self, target) {
            (Value::Null, _) => Some(Value::Null),
            (Value::Integer(_), ColumnType::Integer)
            | (Value::Float(_), ColumnType::Float)
            | (Value::Boolean(_), ColumnType::Boolean)
            | (Value::DateTime(_), ColumnType::DateTime)
            | (Value::Text(_), ColumnType::String) => Some(self.clone()),
            (Value::Integer(i), ColumnType::Float) => Some(Value::Float(*i as f64)),
            (Value::Float(f), ColumnType::Integer) if f.fract() == 0.0 => Some(Value::Integer(*f as i64)),
            (Value::Integer(i), ColumnType::Boolean) if *i == 0 || *i == 1 => Some(Value::Boolean(*i == 1)),
            (Value::Boolean(b), ColumnType::Integer) => Some(Value::Integer(*b as i64)),
            (_, ColumnType::String) => Some(Value::Text(self.to_string())),
            (Value::Text(s), ty) => parse_text(s, ty),
            _ => None,
        };

        converted.ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidArgument,
                format!("Value '{self}' cannot be converted to {target}"),
            )
        })
    }

    /// Total order used for sorting: Null first, then booleans, numbers,
    /// dates and text (case-insensitive, ties broken ordinally).
    pub fn cmp_total(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => {
                let folded = a.to_lowercase().cmp(&b.to_lowercase());
                folded.then_with(|| a.cmp(b))
            }
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => a.rank().cmp(&b.rank()),
            },
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Float(_) => 2,
            Value::DateTime(_) => 3,
            Value::Text(_) => 4,
        }
    }
}

fn parse_text(s: &str, target: ColumnType) -> Option<Value> {
    let trimmed = s.trim();
    match target {
        ColumnType::Integer => trimmed.parse::<i64>().ok().map(Value::Integer),
        ColumnType::Float => trimmed.parse::<f64>().ok().map(Value::Float),
        ColumnType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(Value::Boolean(true)),
            "false" | "0" | "no" => Some(Value::Boolean(false)),
            _ => None,
        },
        ColumnType::DateTime => parse_datetime(trimmed).map(Value::DateTime),
        ColumnType::String => Some(Value::Text(s.to_string())),
    }
}

/// Accepts RFC 3339, "YYYY-MM-DD HH:MM:SS", "YYYY-MM-DDTHH:MM:SS" and "YYYY-MM-DD".
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(s) {
        return Some(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::DateTime(d) => d.timestamp_millis().hash(state),
            Value::Text(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::DateTime(d) => f.write_str(&d.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

/// Columnar batch of rows, used for ingest and for query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataBlock {
    column_names: Vec<String>,
    row_count: usize,
    columns: Vec<Vec<Value>>, // column-major
}

impl DataBlock {
    /// Block of `row_count` null rows.
    pub fn new(column_names: Vec<String>, row_count: usize) -> Self {
        let columns = column_names.iter().map(|_| vec![Value::Null; row_count]).collect();
        DataBlock {
            column_names,
            row_count,
            columns,
        }
    }

    pub fn from_columns(column_names: Vec<String>, columns: Vec<Vec<Value>>) -> Result<Self> {
        if column_names.len() != columns.len() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("{} column names for {} columns", column_names.len(), columns.len()),
            ));
        }
        check_unique(&column_names)?;

        let row_count = columns.first().map(Vec::len).unwrap_or(0);
        if let Some((i, _)) = columns.iter().enumerate().find(|(_, c)| c.len() != row_count) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Column '{}' does not have {} rows", column_names[i], row_count),
            ));
        }

        Ok(DataBlock {
            column_names,
            row_count,
            columns,
        })
    }

    pub fn from_rows(column_names: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        check_unique(&column_names)?;
        let mut block = DataBlock::new(column_names, 0);
        for row in rows {
            block.push_row(row)?;
        }
        Ok(block)
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Row has {} values, block has {} columns", row.len(), self.columns.len()),
            ));
        }
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.push(value);
        }
        self.row_count += 1;
        Ok(())
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn column_count(&self) -> usize {
        self.column_names.len()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Case-insensitive column lookup.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn get(&self, row: usize, column: usize) -> &Value {
        &self.columns[column][row]
    }

    pub fn set(&mut self, row: usize, column: usize, value: Value) {
        self.columns[column][row] = value;
    }

    pub fn column(&self, column: usize) -> &[Value] {
        &self.columns[column]
    }

    pub fn row(&self, row: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c[row].clone()).collect()
    }
}

fn check_unique(names: &[String]) -> Result<()> {
    for (i, name) in names.iter().enumerate() {
        if names[..i].iter().any(|n| n.eq_ignore_ascii_case(name)) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Column '{name}' appears more than once"),
            ));
        }
    }
    Ok(())
}
