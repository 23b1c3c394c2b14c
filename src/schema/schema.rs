use serde::{Deserialize, Serialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{ColumnType, Value};

/// Column definition shared by a table and every one of its partitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDetails {
    pub name: String,
    pub column_type: ColumnType,
    pub default: Value,   // Null means the type's own default
    pub nullable: bool,
    pub is_primary_key: bool, // The row identity (ID) column
}

impl ColumnDetails {
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        ColumnDetails {
            name: name.to_string(),
            column_type,
            default: Value::Null,
            nullable: false,
            is_primary_key: false,
        }
    }

    /// Build from a type name as callers send it ("int", "string", ...).
    pub fn parse(name: &str, type_name: &str) -> Result<Self> {
        Ok(ColumnDetails::new(name, ColumnType::parse(type_name)?))
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    /// Value stored for rows that never set this column.
    pub fn default_value(&self) -> Result<Value> {
        match &self.default {
            Value::Null => Ok(self.column_type.default_value()),
            other => other.coerce(self.column_type),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::not_provided("name"));
        }
        if self.name.contains(|c: char| "[]\"".contains(c)) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Column name '{}' contains reserved characters", self.name),
            ));
        }
        if self.is_primary_key && !self.column_type.can_be_id() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Column '{}' of type {} cannot be the ID column", self.name, self.column_type),
            ));
        }
        self.default_value().map(|_| ())
    }
}

/// Ordered column list of a table, looked up case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnDetails>,
}

impl TableSchema {
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn get(&self, name: &str) -> Option<&ColumnDetails> {
        self.index_of(name).map(|i| &self.columns[i])
    }

    pub fn id_index(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.is_primary_key)
    }

    pub fn id_column(&self) -> Option<&ColumnDetails> {
        self.id_index().map(|i| &self.columns[i])
    }

    /// Resolve a column name, failing with `ColumnNotFound`.
    pub fn require(&self, name: &str) -> Result<usize> {
        self.index_of(name).ok_or_else(|| {
            Error::new(ErrorKind::ColumnNotFound, format!("Column '{name}' not found"))
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}
