use std::collections::HashMap;
use std::fmt;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use crate::core::details::ExecutionDetails;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{ColumnType, DataBlock, Value};
use crate::correctors::Corrector;
use crate::query::ast::Expression;
use crate::query::engine::{is_restricted, Query};
use crate::query::parser::parse_where;
use crate::query::results::AggregationResult;
use crate::schema::schema::TableSchema;
use crate::table::partition::Partition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregator {
    Count,
    Sum,
    Min,
    Max,
    Average,
}

impl Aggregator {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "count" => Ok(Aggregator::Count),
            "sum" => Ok(Aggregator::Sum),
            "min" => Ok(Aggregator::Min),
            "max" => Ok(Aggregator::Max),
            "avg" | "average" | "mean" => Ok(Aggregator::Average),
            _ => Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Aggregator '{name}' not found. Use count, sum, min, max or avg."),
            )),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Aggregator::Count => "Count",
            Aggregator::Sum => "Sum",
            Aggregator::Min => "Min",
            Aggregator::Max => "Max",
            Aggregator::Average => "Average",
        }
    }

    fn needs_column(self) -> bool {
        self != Aggregator::Count
    }
}

impl fmt::Display for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One grouping axis of an aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Dimension {
    /// One bucket per distinct value of the column.
    DistinctValue { column: String },
    /// One bucket per expression; a row lands in every bucket it matches.
    Expressions { name: String, groups: Vec<(String, Expression)> },
}

impl Dimension {
    /// Build from a parameter set: a single `Column>` value groups by the
    /// column's values, anything else is a list of WHERE clauses.
    pub fn from_parts(parts: &[String]) -> Result<Self> {
        if let [single] = parts {
            if let Some(column) = single.trim().strip_suffix('>') {
                let column = column.trim().trim_start_matches('[').trim_end_matches(']');
                return Ok(Dimension::DistinctValue { column: column.to_string() });
            }
        }
        let groups = parts
            .iter()
            .map(|p| Ok((p.clone(), parse_where(p)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Dimension::Expressions { name: String::new(), groups })
    }

    fn label(&self, position: usize) -> String {
        match self {
            Dimension::DistinctValue { column } => column.clone(),
            Dimension::Expressions { name, .. } if !name.is_empty() => name.clone(),
            Dimension::Expressions { .. } => format!("Dimension{}", position + 1),
        }
    }
}

/// Count/sum/min/max/average over matching rows, optionally grouped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationQuery {
    pub table_name: String,
    pub aggregator: Aggregator,
    pub column: Option<String>,
    pub where_clause: Expression,
    pub dimensions: Vec<Dimension>,
}

impl AggregationQuery {
    pub fn new(aggregator: Aggregator, column: Option<&str>, where_clause: Expression) -> Self {
        AggregationQuery {
            table_name: String::new(),
            aggregator,
            column: column.map(str::to_string),
            where_clause,
            dimensions: Vec::new(),
        }
    }

    pub fn count(where_clause: Expression) -> Self {
        Self::new(Aggregator::Count, None, where_clause)
    }

    fn value_column(&self, schema: &TableSchema) -> Option<usize> {
        self.column.as_deref().and_then(|c| schema.index_of(c))
    }
}

/// Running state for one bucket.
#[derive(Debug, Clone, Default)]
pub struct AggregateState {
    count: u64,
    non_null: u64,
    sum: f64,
    int_sum: i128, // Exact sum of integer values
    min: Option<Value>,
    max: Option<Value>,
}

impl AggregateState {
    fn add(&mut self, value: Option<Value>) {
        self.count += 1;
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return;
        };
        self.non_null += 1;
        if let Value::Integer(i) = value {
            self.int_sum += i128::from(i);
        }
        if let Some(x) = value.as_f64() {
            self.sum += x;
        }
        if self.min.as_ref().is_none_or(|m| value.cmp_total(m).is_lt()) {
            self.min = Some(value.clone());
        }
        if self.max.as_ref().is_none_or(|m| value.cmp_total(m).is_gt()) {
            self.max = Some(value);
        }
    }

    fn merge(&mut self, other: AggregateState) {
        self.count += other.count;
        self.non_null += other.non_null;
        self.sum += other.sum;
        self.int_sum += other.int_sum;
        if let Some(min) = other.min {
            if self.min.as_ref().is_none_or(|m| min.cmp_total(m).is_lt()) {
                self.min = Some(min);
            }
        }
        if let Some(max) = other.max {
            if self.max.as_ref().is_none_or(|m| max.cmp_total(m).is_gt()) {
                self.max = Some(max);
            }
        }
    }

    fn result(&self, aggregator: Aggregator, integer_sum: bool) -> Result<Value> {
        Ok(match aggregator {
            Aggregator::Count => Value::Integer(self.count as i64),
            Aggregator::Sum if integer_sum => Value::Integer(i64::try_from(self.int_sum).map_err(|_| {
                Error::new(
                    ErrorKind::InvalidArgument,
                    format!("Sum {} does not fit in a 64-bit integer.", self.int_sum),
                )
            })?),
            Aggregator::Sum => Value::Float(self.sum),
            Aggregator::Min => self.min.clone().unwrap_or(Value::Null),
            Aggregator::Max => self.max.clone().unwrap_or(Value::Null),
            Aggregator::Average if self.non_null == 0 => Value::Null,
            Aggregator::Average if integer_sum => Value::Float(self.int_sum as f64 / self.non_null as f64),
            Aggregator::Average => Value::Float(self.sum / self.non_null as f64),
        })
    }
}

// Bucket key per dimension: the column value, or the expression's position.
enum Membership {
    Values(usize),
    Groups(Vec<RoaringBitmap>),
}

impl Query for AggregationQuery {
    type Partial = HashMap<Vec<Value>, AggregateState>;
    type Output = AggregationResult;

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

    fn correct(&mut self, corrector: &dyn Corrector) -> Result<()> {
        let original = std::mem::take(&mut self.where_clause);
        self.where_clause = corrector.correct(original)?;
        for dimension in &mut self.dimensions {
            if let Dimension::Expressions { groups, .. } = dimension {
                for (_, expression) in groups.iter_mut() {
                    let original = std::mem::take(expression);
                    *expression = corrector.correct(original)?;
                }
            }
        }
        Ok(())
    }

    fn prepare(&self, schema: &TableSchema, details: &mut ExecutionDetails) {
        match &self.column {
            Some(name) => match schema.get(name) {
                None => details.add_error(format!("Column '{name}' does not exist.")),
                Some(c) if matches!(self.aggregator, Aggregator::Sum | Aggregator::Average)
                    && !matches!(c.column_type, ColumnType::Integer | ColumnType::Float) =>
                {
                    details.add_error(format!(
                        "{} requires a numeric column; [{}] is {}.",
                        self.aggregator, c.name, c.column_type
                    ));
                }
                Some(_) => {}
            },
            None if self.aggregator.needs_column() => {
                details.add_error(format!("{} requires a column [col].", self.aggregator));
            }
            None => {}
        }

        for dimension in &self.dimensions {
            if let Dimension::DistinctValue { column } = dimension {
                if schema.index_of(column).is_none() {
                    details.add_error(format!("Dimension column '{column}' does not exist."));
                }
            }
        }
    }

    fn compute(&self, schema: &TableSchema, partition: &Partition, details: &mut ExecutionDetails) -> Self::Partial {
        let mut buckets: Self::Partial = HashMap::new();
        let matches = partition.evaluate(&self.where_clause, details);
        let value_column = self.value_column(schema);

        let mut memberships = Vec::with_capacity(self.dimensions.len());
        for dimension in &self.dimensions {
            match dimension {
                Dimension::DistinctValue { column } => match schema.index_of(column) {
                    Some(i) => memberships.push(Membership::Values(i)),
                    None => return buckets,
                },
                Dimension::Expressions { groups, .. } => memberships.push(Membership::Groups(
                    groups.iter().map(|(_, e)| partition.evaluate(e, details)).collect(),
                )),
            }
        }

        for row in matches.iter() {
            let mut keys: Vec<Vec<Value>> = vec![Vec::new()];
            for membership in &memberships {
                let choices: Vec<Value> = match membership {
                    Membership::Values(column) => vec![partition.get(row, *column)],
                    Membership::Groups(groups) => groups
                        .iter()
                        .enumerate()
                        .filter(|(_, rows)| rows.contains(row))
                        .map(|(i, _)| Value::Integer(i as i64))
                        .collect(),
                };
                let mut expanded = Vec::with_capacity(keys.len() * choices.len());
                for key in &keys {
                    for choice in &choices {
                        let mut next = key.clone();
                        next.push(choice.clone());
                        expanded.push(next);
                    }
                }
                keys = expanded;
            }

            let value = value_column.map(|c| partition.get(row, c));
            for key in keys {
                buckets.entry(key).or_default().add(value.clone());
            }
        }
        buckets
    }

    fn merge(&self, schema: &TableSchema, partials: Vec<Self::Partial>, details: ExecutionDetails) -> AggregationResult {
        let mut names: Vec<String> = self
            .dimensions
            .iter()
            .enumerate()
            .map(|(i, d)| match d {
                Dimension::DistinctValue { column } => {
                    schema.get(column).map(|c| c.name.clone()).unwrap_or_else(|| d.label(i))
                }
                _ => d.label(i),
            })
            .collect();
        names.push(self.aggregator.name().to_string());
        let mut values = DataBlock::new(names, 0);

        if !details.succeeded() {
            return AggregationResult { query: self.clone(), values, details };
        }

        let mut buckets: Self::Partial = HashMap::new();
        for partial in partials {
            for (key, state) in partial {
                buckets.entry(key).or_default().merge(state);
            }
        }
        if self.dimensions.is_empty() {
            buckets.entry(Vec::new()).or_default();
        }

        let integer_sum = self
            .value_column(schema)
            .is_some_and(|c| schema.columns[c].column_type == ColumnType::Integer);

        let mut rows: Vec<(Vec<Value>, AggregateState)> = buckets.into_iter().collect();
        rows.sort_by(|a, b| {
            a.0.iter()
                .zip(&b.0)
                .map(|(x, y)| x.cmp_total(y))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut details = details;
        for (key, state) in rows {
            let mut row = Vec::with_capacity(key.len() + 1);
            for (dimension, value) in self.dimensions.iter().zip(key) {
                row.push(match (dimension, value) {
                    (Dimension::Expressions { groups, .. }, Value::Integer(i)) => {
                        Value::Text(groups[i as usize].0.clone())
                    }
                    (_, value) => value,
                });
            }
            match state.result(self.aggregator, integer_sum) {
                Ok(value) => row.push(value),
                Err(e) => {
                    details.add_error(e.context);
                    values = DataBlock::new(values.column_names().to_vec(), 0);
                    break;
                }
            }
            if let Err(e) = values.push_row(row) {
                details.add_error(e.context);
                break;
            }
        }

        AggregationResult { query: self.clone(), values, details }
    }

    fn redact(&self, output: &mut AggregationResult, restricted: &[String]) {
        let mut touched: Vec<&str> = self.column.iter().map(String::as_str).collect();
        for dimension in &self.dimensions {
            if let Dimension::DistinctValue { column } = dimension {
                touched.push(column);
            }
        }

        if let Some(column) = touched.into_iter().find(|c| is_restricted(restricted, c)) {
            output.values = DataBlock::new(output.values.column_names().to_vec(), 0);
            output.details.add_error(format!("Column '{column}' is restricted."));
        }
    }
}
