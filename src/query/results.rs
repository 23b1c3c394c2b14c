use chrono::{DateTime, Utc};
use serde::Serialize;
use crate::core::details::ExecutionDetails;
use crate::core::types::DataBlock;
use crate::query::aggregate::AggregationQuery;
use crate::query::distinct::DistinctQuery;
use crate::query::select::SelectQuery;
use crate::schema::schema::ColumnDetails;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectResult {
    pub query: SelectQuery,
    pub values: DataBlock,
    pub total: u64,           // Matches across all partitions, before the limit
    pub count_returned: usize,
    pub details: ExecutionDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistinctResult {
    pub query: DistinctQuery,
    pub total: u64,           // Distinct values before truncation
    pub values: DataBlock,
    pub details: ExecutionDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub query: AggregationQuery,
    pub values: DataBlock,
    pub details: ExecutionDetails,
}

impl AggregationResult {
    /// The single aggregate of an undimensioned query.
    pub fn scalar(&self) -> Option<&crate::core::types::Value> {
        (self.values.row_count() == 1 && self.values.column_count() == 1).then(|| self.values.get(0, 0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteResult {
    pub count: u64,
    pub details: ExecutionDetails,
}

/// What a user may see about one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableInformation {
    pub name: String,
    pub partition_count: usize,
    pub row_count: u64,
    pub last_write_time_utc: Option<DateTime<Utc>>,
    pub can_write: bool,
    pub can_administer: bool,
    pub columns: Vec<ColumnDetails>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountResult {
    pub table_name: String,
    pub count: u64,
    pub allowed: bool,
    pub succeeded: bool,
}

impl CountResult {
    pub fn new(table_name: &str, count: u64, allowed: bool, succeeded: bool) -> Self {
        CountResult {
            table_name: table_name.to_string(),
            count,
            allowed,
            succeeded,
        }
    }
}

/// Match counts for one WHERE clause across every table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllCountResult {
    pub query: String,
    pub results_per_table: Vec<CountResult>,
}

impl AllCountResult {
    pub fn new(query: &str) -> Self {
        AllCountResult {
            query: query.to_string(),
            results_per_table: Vec::new(),
        }
    }

    pub fn add(&mut self, result: CountResult) {
        self.results_per_table.push(result);
    }

    /// Succeeded tables first, then by descending count.
    pub fn sort(&mut self) {
        self.results_per_table.sort_by(|a, b| {
            b.succeeded
                .cmp(&a.succeeded)
                .then_with(|| b.count.cmp(&a.count))
                .then_with(|| a.table_name.cmp(&b.table_name))
        });
    }
}
