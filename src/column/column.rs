use std::cmp::Ordering;
use chrono::{DateTime, Utc};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use crate::column::string_block::StringBlock;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{ColumnType, Value};
use crate::query::types::CompareOperator;
use crate::schema::schema::ColumnDetails;

/// Native storage for one column slice. All variants hold `len` slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ColumnValues {
    Integer(Vec<i64>),
    Float(Vec<f64>),
    Boolean(Vec<bool>),
    DateTime(Vec<i64>), // Milliseconds since the Unix epoch, UTC
    String { block: StringBlock, ids: Vec<u32> },
}

impl ColumnValues {
    fn empty(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Integer => ColumnValues::Integer(Vec::new()),
            ColumnType::Float => ColumnValues::Float(Vec::new()),
            ColumnType::Boolean => ColumnValues::Boolean(Vec::new()),
            ColumnType::DateTime => ColumnValues::DateTime(Vec::new()),
            ColumnType::String => ColumnValues::String {
                block: StringBlock::new(),
                ids: Vec::new(),
            },
        }
    }

    fn len(&self) -> usize {
        match self {
            ColumnValues::Integer(v) => v.len(),
            ColumnValues::Float(v) => v.len(),
            ColumnValues::Boolean(v) => v.len(),
            ColumnValues::DateTime(v) => v.len(),
            ColumnValues::String { ids, .. } => ids.len(),
        }
    }

    fn column_type(&self) -> ColumnType {
        match self {
            ColumnValues::Integer(_) => ColumnType::Integer,
            ColumnValues::Float(_) => ColumnType::Float,
            ColumnValues::Boolean(_) => ColumnType::Boolean,
            ColumnValues::DateTime(_) => ColumnType::DateTime,
            ColumnValues::String { .. } => ColumnType::String,
        }
    }
}

/// Persisted form of a column slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    pub values: ColumnValues,
    pub nulls: Vec<u32>,
}

/// One column of one partition: typed values plus a null bitmap.
#[derive(Debug, Clone)]
pub struct Column {
    details: ColumnDetails,
    default: Value,
    values: ColumnValues,
    nulls: RoaringBitmap,
}

impl Column {
    pub fn new(details: ColumnDetails, len: usize) -> Result<Self> {
        details.validate()?;
        let default = details.default_value()?;
        let values = ColumnValues::empty(details.column_type);
        let mut column = Column {
            details,
            default,
            values,
            nulls: RoaringBitmap::new(),
        };
        column.grow(len)?;
        Ok(column)
    }

    pub fn from_snapshot(details: ColumnDetails, snapshot: ColumnSnapshot) -> Result<Self> {
        if snapshot.values.column_type() != details.column_type {
            return Err(Error::new(
                ErrorKind::Corrupted,
                format!(
                    "Column '{}' persisted as {} but declared {}",
                    details.name,
                    snapshot.values.column_type(),
                    details.column_type
                ),
            ));
        }
        let default = details.default_value()?;
        Ok(Column {
            details,
            default,
            values: snapshot.values,
            nulls: snapshot.nulls.into_iter().collect(),
        })
    }

    pub fn to_snapshot(&self) -> ColumnSnapshot {
        ColumnSnapshot {
            values: self.values.clone(),
            nulls: self.nulls.iter().collect(),
        }
    }

    pub fn details(&self) -> &ColumnDetails {
        &self.details
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn nulls(&self) -> &RoaringBitmap {
        &self.nulls
    }

    /// Extend to `new_len` slots filled with the default. Existing slots and
    /// null bits are kept.
    pub fn grow(&mut self, new_len: usize) -> Result<()> {
        let len = self.len();
        if new_len <= len {
            return Ok(());
        }
        match (&mut self.values, &self.default) {
            (ColumnValues::Integer(v), Value::Integer(d)) => v.resize(new_len, *d),
            (ColumnValues::Float(v), Value::Float(d)) => v.resize(new_len, *d),
            (ColumnValues::Boolean(v), Value::Boolean(d)) => v.resize(new_len, *d),
            (ColumnValues::DateTime(v), Value::DateTime(d)) => v.resize(new_len, d.timestamp_millis()),
            (ColumnValues::String { block, ids }, Value::Text(d)) => {
                let id = block.intern(d);
                ids.resize(new_len, id);
            }
            (_, default) => {
                return Err(Error::new(
                    ErrorKind::Internal,
                    format!("Default '{default}' does not fit column '{}'", self.details.name),
                ));
            }
        }
        Ok(())
    }

    /// Store `value` at `row`. Null stores the default; the null bit is only
    /// kept for nullable columns.
    pub fn set(&mut self, row: usize, value: &Value) -> Result<()> {
        let value = value.coerce(self.details.column_type)?;
        let row32 = row as u32;
        if value.is_null() {
            if self.details.nullable {
                self.nulls.insert(row32);
            } else {
                self.nulls.remove(row32);
            }
            let default = self.default.clone();
            return self.write(row, &default);
        }
        self.nulls.remove(row32);
        self.write(row, &value)
    }

    fn write(&mut self, row: usize, value: &Value) -> Result<()> {
        match (&mut self.values, value) {
            (ColumnValues::Integer(v), Value::Integer(x)) => v[row] = *x,
            (ColumnValues::Float(v), Value::Float(x)) => v[row] = *x,
            (ColumnValues::Boolean(v), Value::Boolean(x)) => v[row] = *x,
            (ColumnValues::DateTime(v), Value::DateTime(x)) => v[row] = x.timestamp_millis(),
            (ColumnValues::String { block, ids }, Value::Text(x)) => ids[row] = block.intern(x),
            (_, other) => {
                return Err(Error::new(
                    ErrorKind::Internal,
                    format!("Value '{other}' does not fit column '{}'", self.details.name),
                ));
            }
        }
        Ok(())
    }

    pub fn get(&self, row: usize) -> Value {
        if self.nulls.contains(row as u32) {
            return Value::Null;
        }
        match &self.values {
            ColumnValues::Integer(v) => Value::Integer(v[row]),
            ColumnValues::Float(v) => Value::Float(v[row]),
            ColumnValues::Boolean(v) => Value::Boolean(v[row]),
            ColumnValues::DateTime(v) => Value::DateTime(from_millis(v[row])),
            ColumnValues::String { block, ids } => Value::Text(block.get(ids[row]).to_string()),
        }
    }

    pub fn supports(&self, op: CompareOperator) -> bool {
        match self.details.column_type {
            ColumnType::String => true,
            ColumnType::Boolean => matches!(
                op,
                CompareOperator::Equals
                    | CompareOperator::NotEquals
                    | CompareOperator::Matches
                    | CompareOperator::MatchesExact
            ),
            _ => op != CompareOperator::StartsWith,
        }
    }

    /// Rows among `rows` whose value satisfies `op operand`. `operand` must
    /// already be coerced to this column's type. `None` when the operator is
    /// not supported for the type; the caller fails the query. Null rows
    /// never match.
    pub fn try_evaluate(
        &self,
        op: CompareOperator,
        operand: &Value,
        rows: &RoaringBitmap,
    ) -> Option<RoaringBitmap> {
        if !self.supports(op) {
            return None;
        }

        let candidates = rows - &self.nulls;
        let mut result = RoaringBitmap::new();
        let mut scan = |test: &dyn Fn(usize) -> bool| {
            for row in candidates.iter() {
                if test(row as usize) {
                    result.insert(row);
                }
            }
        };

        match (&self.values, operand) {
            (ColumnValues::Integer(v), Value::Integer(x)) => scan(&|r| ordering_matches(v[r].cmp(x), op)),
            (ColumnValues::Float(v), Value::Float(x)) => scan(&|r| ordering_matches(v[r].total_cmp(x), op)),
            (ColumnValues::Boolean(v), Value::Boolean(x)) => scan(&|r| ordering_matches(v[r].cmp(x), op)),
            (ColumnValues::DateTime(v), Value::DateTime(x)) => {
                let millis = x.timestamp_millis();
                scan(&|r| ordering_matches(v[r].cmp(&millis), op))
            }
            (ColumnValues::String { block, ids }, Value::Text(x)) => {
                let operand = x.to_lowercase();
                let matching = block.matching_ids(|s| text_matches(&s.to_lowercase(), op, &operand));
                scan(&|r| matching[ids[r] as usize])
            }
            _ => return None,
        }

        Some(result)
    }
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn ordering_matches(ordering: Ordering, op: CompareOperator) -> bool {
    match op {
        CompareOperator::Equals | CompareOperator::Matches | CompareOperator::MatchesExact => {
            ordering == Ordering::Equal
        }
        CompareOperator::NotEquals => ordering != Ordering::Equal,
        CompareOperator::LessThan => ordering == Ordering::Less,
        CompareOperator::LessThanOrEqual => ordering != Ordering::Greater,
        CompareOperator::GreaterThan => ordering == Ordering::Greater,
        CompareOperator::GreaterThanOrEqual => ordering != Ordering::Less,
        CompareOperator::StartsWith => false,
    }
}

// Both sides already lowercased.
fn text_matches(value: &str, op: CompareOperator, operand: &str) -> bool {
    match op {
        CompareOperator::Matches => value.contains(operand),
        CompareOperator::MatchesExact => {
            if operand.chars().all(char::is_alphanumeric) {
                value.split(|c: char| !c.is_alphanumeric()).any(|word| word == operand)
            } else {
                value.contains(operand)
            }
        }
        CompareOperator::StartsWith => value.starts_with(operand),
        other => ordering_matches(value.cmp(operand), other),
    }
}
