use std::fmt;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::query::ast::Expression;

/// Sort order for query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortOrder {
    #[default]
    Asc,   // Ascending: 0 → 9, A → Z
    Desc,  // Descending: 9 → 0, Z → A
}

impl SortOrder {
    /// Parse the `so` parameter; empty means ascending.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("SortOrder [so] passed, '{value}' was not 'asc' or 'desc'."),
            )),
        }
    }
}

/// Comparison applied by a term between a column and a literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOperator {
    Equals,             // = or ==
    NotEquals,          // != or <>
    LessThan,           // <
    LessThanOrEqual,    // <=
    GreaterThan,        // >
    GreaterThanOrEqual, // >=
    Matches,            // :   contains (text), equals (other types)
    MatchesExact,       // ::  whole-word match (text), equals (other types)
    StartsWith,         // |>  text prefix
}

impl CompareOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOperator::Equals => "=",
            CompareOperator::NotEquals => "!=",
            CompareOperator::LessThan => "<",
            CompareOperator::LessThanOrEqual => "<=",
            CompareOperator::GreaterThan => ">",
            CompareOperator::GreaterThanOrEqual => ">=",
            CompareOperator::Matches => ":",
            CompareOperator::MatchesExact => "::",
            CompareOperator::StartsWith => "|>",
        }
    }
}

impl fmt::Display for CompareOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Query validation configuration
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub max_clauses: usize,
    pub max_query_depth: usize,
    pub max_nesting: usize, // Parentheses and NOTs the parser will descend through
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            max_clauses: 1024,
            max_query_depth: 32,
            max_nesting: 256,
        }
    }
}

/// Rejects WHERE clauses too large or too deeply nested to evaluate.
pub struct QueryValidator {
    config: ValidationConfig,
}

impl QueryValidator {
    pub fn new(config: ValidationConfig) -> Self {
        QueryValidator { config }
    }

    pub fn max_nesting(&self) -> usize {
        self.config.max_nesting
    }

    pub fn validate(&self, expression: &Expression) -> Result<()> {
        self.validate_depth(expression, 0)?;
        let terms = expression.terms().len();
        if terms > self.config.max_clauses {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Query has {} terms, max is {}", terms, self.config.max_clauses),
            ));
        }
        Ok(())
    }

    fn validate_depth(&self, expression: &Expression, depth: usize) -> Result<()> {
        if depth > self.config.max_query_depth {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Query depth {} exceeds maximum {}", depth, self.config.max_query_depth),
            ));
        }

        match expression {
            Expression::And(children) | Expression::Or(children) => {
                for child in children {
                    self.validate_depth(child, depth + 1)?;
                }
            }
            Expression::Not(inner) => self.validate_depth(inner, depth + 1)?,
            Expression::All | Expression::Term(_) => {}
        }
        Ok(())
    }
}

impl Default for QueryValidator {
    fn default() -> Self {
        QueryValidator::new(ValidationConfig::default())
    }
}
