use std::collections::HashMap;
use parking_lot::Mutex;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Value;
use crate::correctors::Corrector;
use crate::query::ast::Expression;
use crate::query::engine::Query;
use crate::query::params::Parameters;
use crate::query::parser::parse_where;
use crate::query::types::CompareOperator;

/// Most rows a single join may contribute to the query it feeds.
pub const MAX_JOIN_ROWS: usize = 500;

/// A value of the form `#Q<n>.Column` or `#Q<n>[Column]`: the values of
/// `Column` in the rows matched by join `n` (numbered from 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinReference {
    pub join: usize,
    pub column: String,
}

impl JoinReference {
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix('#')?;
        let rest = rest.strip_prefix('Q').or_else(|| rest.strip_prefix('q'))?;
        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        let join: usize = rest[..digits].parse().ok().filter(|&n| n > 0)?;

        let column = match &rest[digits..] {
            tail if tail.starts_with('.') => &tail[1..],
            tail if tail.starts_with('[') && tail.ends_with(']') && tail.len() >= 2 => &tail[1..tail.len() - 1],
            _ => return None,
        };
        let column = column.trim();
        (!column.is_empty()).then(|| JoinReference { join, column: column.to_string() })
    }
}

/// One numbered join: rows of `table_name` matching `where_clause`.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table_name: String,
    pub where_clause: Expression,
}

/// Pairs `t1`/`q1`, `t2`/`q2` and so on, stopping at the shorter set.
pub fn joins_from_parameters(parameters: &Parameters) -> Result<Vec<Join>> {
    let queries = parameters.read_set("q");
    let tables = parameters.read_set("t");
    queries
        .iter()
        .zip(&tables)
        .map(|(query, table)| {
            Ok(Join {
                table_name: table.trim().to_string(),
                where_clause: parse_where(query)?,
            })
        })
        .collect()
}

// Records join references without changing the expression.
#[derive(Default)]
struct ReferenceCollector {
    found: Mutex<Vec<JoinReference>>,
}

impl Corrector for ReferenceCollector {
    fn correct(&self, expression: Expression) -> Result<Expression> {
        let mut found = self.found.lock();
        for term in expression.terms() {
            if let Some(reference) = JoinReference::parse(&term.value) {
                if !found.contains(&reference) {
                    found.push(reference);
                }
            }
        }
        Ok(expression)
    }
}

/// Every join reference in the expressions `query` carries.
pub fn references_in<Q: Query + Clone>(query: &Q) -> Result<Vec<JoinReference>> {
    let collector = ReferenceCollector::default();
    query.clone().correct(&collector)?;
    Ok(collector.found.into_inner())
}

/// Every join reference in `expression`.
pub fn references_in_expression(expression: &Expression) -> Vec<JoinReference> {
    let mut found: Vec<JoinReference> = Vec::new();
    for term in expression.terms() {
        if let Some(reference) = JoinReference::parse(&term.value) {
            if !found.contains(&reference) {
                found.push(reference);
            }
        }
    }
    found
}

/// Replaces `Column = #Q<n>.Other` with an OR of `Column = v` for each
/// value of `Other` in join `n`. `!=` negates the OR. A join without rows
/// matches nothing.
#[derive(Debug, Default)]
pub struct JoinCorrector {
    values: HashMap<(usize, String), Vec<Value>>,
}

impl JoinCorrector {
    pub fn insert(&mut self, join: usize, column: &str, values: Vec<Value>) {
        self.values.insert((join, column.to_lowercase()), values);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Corrector for JoinCorrector {
    fn correct(&self, expression: Expression) -> Result<Expression> {
        expression.map_terms(&mut |term| {
            let Some(reference) = JoinReference::parse(&term.value) else {
                return Ok(Expression::Term(term));
            };
            let column = term.column.as_deref().ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidArgument,
                    format!("Join value '{}' must be compared to a column", term.value),
                )
            })?;
            let negate = match term.op {
                CompareOperator::Equals | CompareOperator::MatchesExact | CompareOperator::Matches => false,
                CompareOperator::NotEquals => true,
                op => {
                    return Err(Error::new(
                        ErrorKind::InvalidArgument,
                        format!("Join value '{}' cannot be used with '{op}'", term.value),
                    ));
                }
            };
            let values = self
                .values
                .get(&(reference.join, reference.column.to_lowercase()))
                .ok_or_else(|| {
                    Error::new(
                        ErrorKind::InvalidArgument,
                        format!("Join #Q{} has no results for [{}]", reference.join, reference.column),
                    )
                })?;

            let matches = if values.is_empty() {
                Expression::not(Expression::All)
            } else {
                Expression::or(
                    values
                        .iter()
                        .map(|v| Expression::term(column, CompareOperator::Equals, &v.to_string()))
                        .collect(),
                )
            };
            Ok(if negate { Expression::not(matches) } else { matches })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::aggregate::{AggregationQuery, Dimension};

    #[test]
    fn reference_forms() {
        assert_eq!(
            JoinReference::parse("#Q1.ID"),
            Some(JoinReference { join: 1, column: "ID".into() })
        );
        assert_eq!(
            JoinReference::parse("#q12[Assigned To]"),
            Some(JoinReference { join: 12, column: "Assigned To".into() })
        );
        assert_eq!(JoinReference::parse("#Q0.ID"), None);
        assert_eq!(JoinReference::parse("#Q1"), None);
        assert_eq!(JoinReference::parse("#Q1[ID"), None);
        assert_eq!(JoinReference::parse("Q1.ID"), None);
    }

    #[test]
    fn pairs_stop_at_shorter_set() {
        let parameters: Parameters = [("q", "*"), ("q1", "Team = Core"), ("t1", "Owners"), ("q2", "x"), ("t3", "Other")]
            .into_iter()
            .collect();
        let joins = joins_from_parameters(&parameters).unwrap();
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0].table_name, "Owners");
        assert_eq!(joins[0].where_clause, Expression::term("Team", CompareOperator::Equals, "Core"));
    }

    #[test]
    fn references_in_dimensions_are_found() {
        let mut query = AggregationQuery::count(parse_where("ID = #Q1.ID").unwrap());
        query.dimensions.push(
            Dimension::from_parts(&["Owner = #Q2.Name".to_string(), "Owner != \"#Q2[Name]\"".to_string()]).unwrap(),
        );
        let references = references_in(&query).unwrap();
        assert_eq!(
            references,
            vec![
                JoinReference { join: 1, column: "ID".into() },
                JoinReference { join: 2, column: "Name".into() },
            ]
        );
    }

    #[test]
    fn replaces_references_with_values() {
        let mut joins = JoinCorrector::default();
        joins.insert(1, "Name", vec![Value::from("scott"), Value::from("louvau")]);
        joins.insert(2, "ID", Vec::new());

        let corrected = joins.correct(parse_where("Owner = #Q1.name AND Age > 3").unwrap()).unwrap();
        assert_eq!(corrected, parse_where("(Owner = scott OR Owner = louvau) AND Age > 3").unwrap());

        let excluded = joins.correct(parse_where("Owner != #Q1.Name").unwrap()).unwrap();
        assert!(matches!(excluded, Expression::Not(_)));

        let empty = joins.correct(parse_where("ID = #Q2.ID").unwrap()).unwrap();
        assert_eq!(empty, Expression::not(Expression::All));

        assert!(joins.correct(parse_where("#Q1.Name").unwrap()).is_err());
        assert!(joins.correct(parse_where("Age < #Q1.Name").unwrap()).is_err());
        assert!(joins.correct(parse_where("Owner = #Q3.Name").unwrap()).is_err());
    }
}
