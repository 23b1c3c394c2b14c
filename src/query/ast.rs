use std::fmt;
use serde::{Deserialize, Serialize};
use crate::core::error::Result;
use crate::query::types::CompareOperator;

/// WHERE clause tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    All,                    // Matches every row
    Term(TermExpression),   // column op value, or a value searched in every column
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),
}

/// Single comparison. `column: None` searches every column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermExpression {
    pub column: Option<String>,
    pub op: CompareOperator,
    pub value: String,
}

impl TermExpression {
    pub fn new(column: Option<&str>, op: CompareOperator, value: &str) -> Self {
        TermExpression {
            column: column.map(str::to_string),
            op,
            value: value.to_string(),
        }
    }

    /// True when this term targets `column` explicitly (case-insensitive).
    pub fn is_on(&self, column: &str) -> bool {
        self.column.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(column))
    }
}

impl Expression {
    pub fn term(column: &str, op: CompareOperator, value: &str) -> Self {
        Expression::Term(TermExpression::new(Some(column), op, value))
    }

    /// Value searched across all columns.
    pub fn any_column(value: &str) -> Self {
        Expression::Term(TermExpression::new(None, CompareOperator::Matches, value))
    }

    /// AND of `children`, flattening nested ANDs and collapsing single children.
    pub fn and(children: Vec<Expression>) -> Self {
        Self::combine(children, true)
    }

    pub fn or(children: Vec<Expression>) -> Self {
        Self::combine(children, false)
    }

    fn combine(children: Vec<Expression>, is_and: bool) -> Self {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Expression::And(inner) if is_and => flat.extend(inner),
                Expression::Or(inner) if !is_and => flat.extend(inner),
                Expression::All if is_and => {}
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Expression::All,
            1 => flat.remove(0),
            _ if is_and => Expression::And(flat),
            _ => Expression::Or(flat),
        }
    }

    pub fn not(inner: Expression) -> Self {
        Expression::Not(Box::new(inner))
    }

    /// Every term in the tree, left to right.
    pub fn terms(&self) -> Vec<&TermExpression> {
        let mut terms = Vec::new();
        self.collect_terms(&mut terms);
        terms
    }

    fn collect_terms<'a>(&'a self, terms: &mut Vec<&'a TermExpression>) {
        match self {
            Expression::Term(term) => terms.push(term),
            Expression::And(children) | Expression::Or(children) => {
                for child in children {
                    child.collect_terms(terms);
                }
            }
            Expression::Not(inner) => inner.collect_terms(terms),
            Expression::All => {}
        }
    }

    /// Rebuild the tree, replacing each term with what `rewrite` returns.
    pub fn map_terms<F>(self, rewrite: &mut F) -> Result<Expression>
    where
        F: FnMut(TermExpression) -> Result<Expression>,
    {
        Ok(match self {
            Expression::Term(term) => rewrite(term)?,
            Expression::And(children) => Expression::And(
                children
                    .into_iter()
                    .map(|c| c.map_terms(rewrite))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Expression::Or(children) => Expression::Or(
                children
                    .into_iter()
                    .map(|c| c.map_terms(rewrite))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Expression::Not(inner) => Expression::not(inner.map_terms(rewrite)?),
            Expression::All => Expression::All,
        })
    }
}

impl Default for Expression {
    fn default() -> Self {
        Expression::All
    }
}

/// Renders in the same syntax the parser reads.
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::All => f.write_str("*"),
            Expression::Term(term) => write!(f, "{term}"),
            Expression::And(children) => write_joined(f, children, " AND "),
            Expression::Or(children) => write_joined(f, children, " OR "),
            Expression::Not(inner) => write!(f, "NOT({inner})"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[Expression], separator: &str) -> fmt::Result {
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        match child {
            Expression::And(_) | Expression::Or(_) => write!(f, "({child})")?,
            _ => write!(f, "{child}")?,
        }
    }
    Ok(())
}

impl fmt::Display for TermExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(column) => write!(f, "{} {} {}", render_column(column), self.op, render_value(&self.value)),
            None if self.op == CompareOperator::Matches => f.write_str(&render_value(&self.value)),
            None => write!(f, "{} {}", self.op, render_value(&self.value)),
        }
    }
}

fn is_plain(text: &str) -> bool {
    !text.is_empty()
        && text.chars().all(|c| !c.is_whitespace() && !"()\"[]=!<>:|&".contains(c))
        && !["and", "or", "not", "*"].iter().any(|k| text.eq_ignore_ascii_case(k))
}

fn render_column(column: &str) -> String {
    if is_plain(column) {
        column.to_string()
    } else {
        format!("[{column}]")
    }
}

fn render_value(value: &str) -> String {
    if is_plain(value) {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('"', "\"\""))
    }
}
