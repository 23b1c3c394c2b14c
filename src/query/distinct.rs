use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use crate::core::details::ExecutionDetails;
use crate::core::types::{DataBlock, Value};
use crate::query::ast::Expression;
use crate::query::engine::{is_restricted, Query};
use crate::query::results::DistinctResult;
use crate::schema::schema::TableSchema;
use crate::table::partition::Partition;

pub const DEFAULT_DISTINCT_COUNT: usize = 500;

/// Most frequent values of one column among matching rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistinctQuery {
    pub table_name: String,
    pub column: String,
    pub where_clause: Expression,
    pub count: usize,
}

impl DistinctQuery {
    pub fn new(column: &str, where_clause: Expression) -> Self {
        DistinctQuery {
            table_name: String::new(),
            column: column.to_string(),
            where_clause,
            count: DEFAULT_DISTINCT_COUNT,
        }
    }
}

impl Query for DistinctQuery {
    type Partial = HashMap<Value, u64>;
    type Output = DistinctResult;

    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn set_table_name(&mut self, name: &str) {
        self.table_name = name.to_string();
    }

    fn where_clause(&self) -> &Expression {
        &self.where_clause
    }

    fn where_clause_mut(&mut self) -> &mut Expression {
        &mut self.where_clause
    }

    fn prepare(&self, schema: &TableSchema, details: &mut ExecutionDetails) {
        if schema.index_of(&self.column).is_none() {
            details.add_error(format!("Column '{}' does not exist.", self.column));
        }
    }

    fn compute(&self, schema: &TableSchema, partition: &Partition, details: &mut ExecutionDetails) -> Self::Partial {
        let mut counts = HashMap::new();
        let Some(column) = schema.index_of(&self.column) else {
            return counts;
        };
        for row in partition.evaluate(&self.where_clause, details).iter() {
            let value = partition.get(row, column);
            if !value.is_null() {
                *counts.entry(value).or_insert(0) += 1;
            }
        }
        counts
    }

    fn merge(&self, schema: &TableSchema, partials: Vec<Self::Partial>, details: ExecutionDetails) -> DistinctResult {
        let name = schema
            .get(&self.column)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| self.column.clone());
        let mut values = DataBlock::new(vec![name, "Count".to_string()], 0);

        if !details.succeeded() {
            return DistinctResult { query: self.clone(), total: 0, values, details };
        }

        let mut counts: HashMap<Value, u64> = HashMap::new();
        for partial in partials {
            for (value, count) in partial {
                *counts.entry(value).or_insert(0) += count;
            }
        }

        let total = counts.len() as u64;
        let mut ranked: Vec<(Value, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp_total(&b.0)));
        ranked.truncate(self.count);

        let mut details = details;
        for (value, count) in ranked {
            if let Err(e) = values.push_row(vec![value, Value::Integer(count as i64)]) {
                details.add_error(e.context);
                break;
            }
        }

        DistinctResult { query: self.clone(), total, values, details }
    }

    fn redact(&self, output: &mut DistinctResult, restricted: &[String]) {
        if is_restricted(restricted, &self.column) {
            output.total = 0;
            output.values = DataBlock::new(output.values.column_names().to_vec(), 0);
            output.details.add_error(format!("Column '{}' is restricted.", self.column));
        }
    }
}
