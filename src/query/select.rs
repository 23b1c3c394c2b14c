use std::cmp::Ordering;
use std::collections::BinaryHeap;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use crate::core::details::ExecutionDetails;
use crate::core::types::{ColumnType, DataBlock, Value};
use crate::query::ast::Expression;
use crate::query::engine::{is_restricted, resolve_columns, Query};
use crate::query::results::SelectResult;
use crate::query::types::{CompareOperator, SortOrder};
use crate::schema::schema::TableSchema;
use crate::table::partition::Partition;

pub const DEFAULT_SELECT_COUNT: usize = 500;

/// Rows matching a WHERE clause, ordered and limited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    pub table_name: String,
    pub columns: Vec<String>,          // Empty selects the ID column
    pub where_clause: Expression,
    pub order_by: Option<String>,      // ID column when unset
    pub order: SortOrder,
    pub count: usize,
    pub highlighter: Option<Highlighter>,
}

impl SelectQuery {
    pub fn new(columns: Vec<String>, where_clause: Expression) -> Self {
        SelectQuery {
            columns,
            where_clause,
            ..SelectQuery::default()
        }
    }

    // Output columns, then the sort column
    fn plan(&self, schema: &TableSchema, details: &mut ExecutionDetails) -> Option<(Vec<usize>, usize)> {
        let columns = if self.columns.is_empty() {
            match schema.id_index() {
                Some(id) => vec![id],
                None => {
                    details.add_error("Table has no ID column to select.");
                    return None;
                }
            }
        } else {
            resolve_columns(schema, &self.columns, details)
        };

        let sort = match &self.order_by {
            Some(name) if !name.trim().is_empty() => match schema.index_of(name) {
                Some(i) => i,
                None => {
                    details.add_error(format!("Order by column '{name}' does not exist."));
                    return None;
                }
            },
            _ => match schema.id_index() {
                Some(id) => id,
                None => columns.first().copied().unwrap_or(0),
            },
        };
        Some((columns, sort))
    }
}

impl Default for SelectQuery {
    fn default() -> Self {
        SelectQuery {
            table_name: String::new(),
            columns: Vec::new(),
            where_clause: Expression::All,
            order_by: None,
            order: SortOrder::Asc,
            count: DEFAULT_SELECT_COUNT,
            highlighter: None,
        }
    }
}

/// Per-partition top rows plus the partition's match count.
pub struct SelectPartial {
    total: u64,
    rows: Vec<SortedRow>,
}

struct SortedRow {
    key: Value,
    id: Value,
    slot: u32,
    values: Vec<Value>,
    order: SortOrder,
}

impl PartialEq for SortedRow {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortedRow {}

impl PartialOrd for SortedRow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Earlier in the output sorts first; the ID breaks ties ascending.
impl Ord for SortedRow {
    fn cmp(&self, other: &Self) -> Ordering {
        let key = match self.order {
            SortOrder::Asc => self.key.cmp_total(&other.key),
            SortOrder::Desc => other.key.cmp_total(&self.key),
        };
        key.then_with(|| self.id.cmp_total(&other.id))
    }
}

/// Keeps the first `k` rows in output order.
struct TopKCollector {
    heap: BinaryHeap<SortedRow>, // Max-heap: the row to drop next is on top
    k: usize,
}

impl TopKCollector {
    fn new(k: usize) -> Self {
        TopKCollector {
            heap: BinaryHeap::with_capacity(k.min(4096) + 1),
            k,
        }
    }

    fn collect(&mut self, row: SortedRow) {
        if self.k == 0 {
            return;
        }
        if self.heap.len() < self.k {
            self.heap.push(row);
        } else if self.heap.peek().is_some_and(|worst| row < *worst) {
            self.heap.pop();
            self.heap.push(row);
        }
    }

    fn get_results(self) -> Vec<SortedRow> {
        self.heap.into_sorted_vec()
    }
}

impl Query for SelectQuery {
    type Partial = SelectPartial;
    type Output = SelectResult;

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
        self.plan(schema, details);
    }

    fn compute(&self, schema: &TableSchema, partition: &Partition, details: &mut ExecutionDetails) -> SelectPartial {
        let matches = partition.evaluate(&self.where_clause, details);
        let Some((columns, sort)) = self.plan(schema, &mut ExecutionDetails::new()) else {
            return SelectPartial { total: 0, rows: Vec::new() };
        };

        let mut collector = TopKCollector::new(self.count);
        for row in matches.iter() {
            collector.collect(SortedRow {
                key: partition.get(row, sort),
                id: partition.id_of(row).unwrap_or(Value::Null),
                slot: row,
                values: Vec::new(),
                order: self.order,
            });
        }

        // Materialize only the rows that made the cut
        let mut rows = collector.get_results();
        for sorted in &mut rows {
            sorted.values = columns.iter().map(|&c| partition.get(sorted.slot, c)).collect();
        }

        SelectPartial {
            total: matches.len(),
            rows,
        }
    }

    fn merge(&self, schema: &TableSchema, partials: Vec<SelectPartial>, mut details: ExecutionDetails) -> SelectResult {
        let columns = self
            .plan(schema, &mut ExecutionDetails::new())
            .map(|(c, _)| c)
            .unwrap_or_default();
        let names: Vec<String> = columns.iter().map(|&c| schema.columns[c].name.clone()).collect();

        let mut total = 0;
        let mut collector = TopKCollector::new(self.count);
        for partial in partials {
            total += partial.total;
            for row in partial.rows {
                collector.collect(row);
            }
        }

        let mut values = DataBlock::new(names, 0);
        if details.succeeded() {
            for row in collector.get_results() {
                if let Err(e) = values.push_row(row.values) {
                    details.add_error(e.context);
                    break;
                }
            }
            if let Some(highlighter) = &self.highlighter {
                highlighter.apply(&mut values, schema, &self.where_clause);
            }
        } else {
            total = 0;
        }

        let count_returned = values.row_count();
        SelectResult {
            query: self.clone(),
            values,
            total,
            count_returned,
            details,
        }
    }

    fn redact(&self, output: &mut SelectResult, restricted: &[String]) {
        let keep: Vec<usize> = (0..output.values.column_count())
            .filter(|&i| !is_restricted(restricted, &output.values.column_names()[i]))
            .collect();
        if keep.len() == output.values.column_count() {
            return;
        }

        let names = keep.iter().map(|&i| output.values.column_names()[i].clone()).collect();
        let columns = keep.iter().map(|&i| output.values.column(i).to_vec()).collect();
        match DataBlock::from_columns(names, columns) {
            Ok(block) => output.values = block,
            Err(e) => output.details.add_error(e.context),
        }
    }
}

/// Wraps occurrences of the query's values in returned text cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlighter {
    pub start: String,
    pub end: String,
}

impl Highlighter {
    pub fn new(start: &str, end: &str) -> Self {
        Highlighter {
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    pub fn highlight(&self, text: &str, pattern: &Regex) -> String {
        pattern
            .replace_all(text, |caps: &regex::Captures| format!("{}{}{}", self.start, &caps[0], self.end))
            .into_owned()
    }

    fn apply(&self, values: &mut DataBlock, schema: &TableSchema, where_clause: &Expression) {
        for column in 0..values.column_count() {
            let name = values.column_names()[column].clone();
            let is_text = schema.get(&name).is_some_and(|c| c.column_type == ColumnType::String);
            if !is_text {
                continue;
            }
            let Some(pattern) = term_pattern(where_clause, &name) else {
                continue;
            };
            for row in 0..values.row_count() {
                if let Value::Text(text) = values.get(row, column) {
                    let highlighted = self.highlight(text, &pattern);
                    values.set(row, column, Value::Text(highlighted));
                }
            }
        }
    }
}

// Case-insensitive alternation of the text terms that apply to `column`.
fn term_pattern(where_clause: &Expression, column: &str) -> Option<Regex> {
    let mut values: Vec<String> = where_clause
        .terms()
        .into_iter()
        .filter(|t| t.column.is_none() || t.is_on(column))
        .filter(|t| {
            matches!(
                t.op,
                CompareOperator::Equals
                    | CompareOperator::Matches
                    | CompareOperator::MatchesExact
                    | CompareOperator::StartsWith
            )
        })
        .filter(|t| !t.value.trim().is_empty())
        .map(|t| regex::escape(&t.value))
        .collect();
    if values.is_empty() {
        return None;
    }
    // Longest first so overlapping values highlight the longer match
    values.sort_by_key(|v| std::cmp::Reverse(v.len()));
    RegexBuilder::new(&values.join("|")).case_insensitive(true).build().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(key: i64, id: i64, order: SortOrder) -> SortedRow {
        SortedRow {
            key: Value::Integer(key),
            id: Value::Integer(id),
            slot: id as u32,
            values: vec![Value::Integer(id)],
            order,
        }
    }

    #[test]
    fn top_k_keeps_first_rows_in_order() {
        let mut collector = TopKCollector::new(3);
        for (key, id) in [(5, 1), (1, 2), (9, 3), (3, 4), (1, 5)] {
            collector.collect(row(key, id, SortOrder::Asc));
        }
        let ids: Vec<Value> = collector.get_results().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![Value::Integer(2), Value::Integer(5), Value::Integer(4)]);
    }

    #[test]
    fn descending_reverses_key_only() {
        let mut collector = TopKCollector::new(10);
        for (key, id) in [(1, 1), (7, 2), (7, 3)] {
            collector.collect(row(key, id, SortOrder::Desc));
        }
        let ids: Vec<Value> = collector.get_results().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![Value::Integer(2), Value::Integer(3), Value::Integer(1)]);
    }

    #[test]
    fn highlighter_wraps_matches_case_insensitively() {
        let where_clause = crate::query::parser::parse_where("Name:eric OR crash").unwrap();
        let pattern = term_pattern(&where_clause, "Name").unwrap();
        let highlighter = Highlighter::new("<b>", "</b>");
        assert_eq!(highlighter.highlight("Eric saw a CRASH", &pattern), "<b>Eric</b> saw a <b>CRASH</b>");
        assert!(term_pattern(&where_clause, "Title").is_some());
        assert!(term_pattern(&crate::query::parser::parse_where("ID > 3").unwrap(), "Name").is_none());
    }
}
