use serde::Serialize;
use crate::core::types::{ColumnType, Value};
use crate::query::parser::{position_after, Position, RESERVED};
use crate::query::types::CompareOperator;
use crate::schema::schema::ColumnDetails;

pub const MAX_SUGGESTIONS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum SuggestionCategory {
    BooleanOperator,
    ColumnName,
    CompareOperator,
    Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntelliSenseItem {
    pub category: SuggestionCategory,
    pub value: String, // Text to insert in place of the incomplete value
    pub hint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntelliSenseResult {
    pub query: String,
    pub incomplete_value: String,
    /// The query without its incomplete value; suggestions are appended to it.
    pub complete_query: String,
    pub suggestions: Vec<IntelliSenseItem>,
}

/// A column the caller may query, and the table it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestColumn {
    pub table: String,
    pub details: ColumnDetails,
}

const OPERATORS: [(CompareOperator, &str); 9] = [
    (CompareOperator::Equals, "equals"),
    (CompareOperator::NotEquals, "not equals"),
    (CompareOperator::LessThan, "less than"),
    (CompareOperator::LessThanOrEqual, "less than or equal"),
    (CompareOperator::GreaterThan, "greater than"),
    (CompareOperator::GreaterThanOrEqual, "greater than or equal"),
    (CompareOperator::Matches, "contains"),
    (CompareOperator::MatchesExact, "contains word"),
    (CompareOperator::StartsWith, "starts with"),
];

/// Suggests what may come next in a partly typed query.
///
/// The incomplete value is the trailing word (or the text after an open
/// `[` or `"`); the grammar position before it decides whether columns,
/// operators, values or AND/OR are offered. `values(column, prefix)`
/// supplies known values of a column starting with `prefix`.
pub fn suggest<F>(query: &str, columns: &[SuggestColumn], values: F) -> IntelliSenseResult
where
    F: Fn(&SuggestColumn, &str) -> Vec<Value>,
{
    let (complete, incomplete, open) = split_incomplete(query);
    let mut suggestions = Vec::new();

    match (open, position_after(complete)) {
        (_, Err(_)) => {}
        (Some('['), Ok(Position::TermStart)) => suggest_columns(&mut suggestions, columns, incomplete, false),
        (Some(_), Ok(_)) => {}
        (None, Ok(Position::TermStart)) => suggest_term(&mut suggestions, columns, incomplete, &values),
        (None, Ok(Position::AfterWord(word))) => match find_column(columns, &word) {
            Some(column) => suggest_operators(&mut suggestions, column.details.column_type, incomplete),
            None => suggest_after_term(&mut suggestions, columns, incomplete, &values),
        },
        (None, Ok(Position::AfterOperator(Some(column), _))) => {
            for column in columns.iter().filter(|c| c.details.name.eq_ignore_ascii_case(&column)) {
                suggest_values(&mut suggestions, column, incomplete, &values);
            }
        }
        (None, Ok(Position::AfterOperator(None, _))) => {}
        (None, Ok(Position::AfterTerm)) => suggest_after_term(&mut suggestions, columns, incomplete, &values),
    }

    suggestions.truncate(MAX_SUGGESTIONS);
    IntelliSenseResult {
        query: query.to_string(),
        incomplete_value: incomplete.to_string(),
        complete_query: complete.to_string(),
        suggestions,
    }
}

// (complete part, incomplete value, unclosed '[' or '"')
fn split_incomplete(query: &str) -> (&str, &str, Option<char>) {
    let quotes = query.matches('"').count();
    if quotes % 2 == 1 {
        if let Some(i) = query.rfind('"') {
            return (&query[..i], &query[i + 1..], Some('"'));
        }
    }
    if let Some(i) = query.rfind('[') {
        if !query[i..].contains(']') {
            return (&query[..i], &query[i + 1..], Some('['));
        }
    }
    let start = query
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace() || RESERVED.contains(*c))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    (&query[..start], &query[start..], None)
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.to_lowercase().starts_with(&prefix.to_lowercase())
}

fn find_column<'a>(columns: &'a [SuggestColumn], name: &str) -> Option<&'a SuggestColumn> {
    columns.iter().find(|c| c.details.name.eq_ignore_ascii_case(name))
}

fn needs_escaping(text: &str) -> bool {
    text.is_empty() || text.chars().any(|c| c.is_whitespace() || RESERVED.contains(c))
}

fn push(suggestions: &mut Vec<IntelliSenseItem>, category: SuggestionCategory, value: String, hint: String) {
    if !suggestions.iter().any(|s| s.category == category && s.value.eq_ignore_ascii_case(&value)) {
        suggestions.push(IntelliSenseItem { category, value, hint });
    }
}

fn suggest_columns(suggestions: &mut Vec<IntelliSenseItem>, columns: &[SuggestColumn], prefix: &str, bracket: bool) {
    let mut matching: Vec<&SuggestColumn> = columns
        .iter()
        .filter(|c| starts_with_ignore_case(&c.details.name, prefix))
        .collect();
    matching.sort_by_key(|c| c.details.name.to_lowercase());
    for column in matching {
        let name = &column.details.name;
        let value = if bracket && needs_escaping(name) { format!("[{name}]") } else { name.clone() };
        push(suggestions, SuggestionCategory::ColumnName, value, column.details.column_type.to_string());
    }
}

fn suggest_operators(suggestions: &mut Vec<IntelliSenseItem>, column_type: ColumnType, prefix: &str) {
    for (op, hint) in OPERATORS {
        let supported = match column_type {
            ColumnType::String => true,
            ColumnType::Boolean => matches!(
                op,
                CompareOperator::Equals | CompareOperator::NotEquals | CompareOperator::Matches | CompareOperator::MatchesExact
            ),
            _ => op != CompareOperator::StartsWith,
        };
        if supported && op.symbol().starts_with(prefix) {
            push(suggestions, SuggestionCategory::CompareOperator, op.symbol().to_string(), hint.to_string());
        }
    }
}

fn suggest_values<F>(suggestions: &mut Vec<IntelliSenseItem>, column: &SuggestColumn, prefix: &str, values: &F)
where
    F: Fn(&SuggestColumn, &str) -> Vec<Value>,
{
    for value in values(column, prefix) {
        let text = value.to_string();
        if value.is_null() || !starts_with_ignore_case(&text, prefix) {
            continue;
        }
        let text = if needs_escaping(&text) { format!("\"{}\"", text.replace('"', "\"\"")) } else { text };
        push(suggestions, SuggestionCategory::Value, text, column.details.name.clone());
    }
}

// Columns, NOT, and (once something is typed) text values in any column
fn suggest_term<F>(suggestions: &mut Vec<IntelliSenseItem>, columns: &[SuggestColumn], prefix: &str, values: &F)
where
    F: Fn(&SuggestColumn, &str) -> Vec<Value>,
{
    suggest_columns(suggestions, columns, prefix, true);
    if prefix.is_empty() {
        return;
    }
    if starts_with_ignore_case("NOT", prefix) {
        push(suggestions, SuggestionCategory::BooleanOperator, "NOT".to_string(), "negate the next term".to_string());
    }
    for column in columns.iter().filter(|c| c.details.column_type == ColumnType::String) {
        suggest_values(suggestions, column, prefix, values);
    }
}

fn suggest_after_term<F>(suggestions: &mut Vec<IntelliSenseItem>, columns: &[SuggestColumn], prefix: &str, values: &F)
where
    F: Fn(&SuggestColumn, &str) -> Vec<Value>,
{
    for (keyword, hint) in [("AND", "both terms match"), ("OR", "either term matches")] {
        if starts_with_ignore_case(keyword, prefix) {
            push(suggestions, SuggestionCategory::BooleanOperator, keyword.to_string(), hint.to_string());
        }
    }
    // Another term joins with an implicit AND
    if !prefix.is_empty() {
        suggest_term(suggestions, columns, prefix, values);
    }
}
