use std::sync::Arc;
use tracing::debug;
use crate::auth::authorization::Authorizer;
use crate::auth::principal::Principal;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{ColumnType, Value};
use crate::correctors::{ComposedCorrector, MeCorrector};
use crate::query::aggregate::{AggregationQuery, Aggregator, Dimension};
use crate::query::distinct::DistinctQuery;
use crate::query::ast::Expression;
use crate::query::engine::{is_restricted, Query};
use crate::query::intellisense::{suggest, IntelliSenseResult, SuggestColumn, MAX_SUGGESTIONS};
use crate::query::join::{
    joins_from_parameters, references_in, references_in_expression, JoinCorrector, JoinReference, MAX_JOIN_ROWS,
};
use crate::query::params::Parameters;
use crate::query::parser::parse_where;
use crate::query::results::{AggregationResult, AllCountResult, CountResult, DistinctResult, SelectResult};
use crate::query::select::{Highlighter, SelectQuery, DEFAULT_SELECT_COUNT};
use crate::query::distinct::DEFAULT_DISTINCT_COUNT;
use crate::query::types::{CompareOperator, SortOrder};
use crate::security::identity::{PermissionScope, SecurityIdentity};
use crate::security::secure_database::SecureDatabase;
use crate::service::checks::{require_access, require_non_blank, require_table};

/// Read-side operations driven by request parameters.
pub struct QueryService {
    database: Arc<SecureDatabase>,
    authorizer: Arc<Authorizer>,
    correctors: Arc<ComposedCorrector>,
}

impl QueryService {
    pub fn new(database: Arc<SecureDatabase>, authorizer: Arc<Authorizer>, correctors: Arc<ComposedCorrector>) -> Self {
        QueryService { database, authorizer, correctors }
    }

    fn current_correctors(&self, user: &dyn Principal) -> ComposedCorrector {
        ComposedCorrector::new(vec![Box::new(MeCorrector::new(user.name())), Box::new(self.correctors.clone())])
    }

    /// Correct and run `query` against `table_name` for `user`, then redact
    /// the columns the caller may not see.
    pub fn query<Q: Query>(&self, table_name: &str, query: Q, user: &dyn Principal) -> Result<Q::Output> {
        self.run(table_name, query, None, user)
    }

    fn run<Q: Query>(
        &self,
        table_name: &str,
        mut query: Q,
        joins: Option<&JoinCorrector>,
        user: &dyn Principal,
    ) -> Result<Q::Output> {
        require_non_blank(table_name, "tableName")?;
        require_table(&self.database, table_name)?;
        require_access(
            self.authorizer.validate_table_access(table_name, user, PermissionScope::Reader)?,
            "Not authorized",
        )?;

        query.set_table_name(table_name);
        query.correct(&self.current_correctors(user))?;
        if let Some(joins) = joins {
            query.correct(joins)?;
        }
        debug!(table = %table_name, where_clause = %query.where_clause(), "corrected query");

        self.database
            .query(&query, |identity| self.authorizer.is_in_identity(user, identity))
    }

    pub fn select(&self, table_name: &str, parameters: &Parameters, user: &dyn Principal) -> Result<SelectResult> {
        require_non_blank(table_name, "tableName")?;
        if parameters.is_empty() {
            return Err(Error::not_provided("parameters"));
        }
        let table = require_table(&self.database, table_name)?;
        require_access(
            self.authorizer.validate_table_access(table_name, user, PermissionScope::Reader)?,
            "Not authorized",
        )?;

        let mut query = select_from_parameters(parameters)?;
        if query.columns.is_empty() {
            if let Some(id) = table.id_column()? {
                query.columns = vec![id.name];
            }
        }
        let joins = self.resolve_joins(parameters, references_in(&query)?, user)?;
        self.run(table_name, query, joins.as_ref(), user)
    }

    pub fn distinct(&self, table_name: &str, parameters: &Parameters, user: &dyn Principal) -> Result<DistinctResult> {
        require_non_blank(table_name, "tableName")?;
        if parameters.is_empty() {
            return Err(Error::not_provided("parameters"));
        }
        require_table(&self.database, table_name)?;
        require_access(
            self.authorizer.validate_table_access(table_name, user, PermissionScope::Reader)?,
            "Not authorized",
        )?;

        let query = distinct_from_parameters(parameters)?;
        let joins = self.resolve_joins(parameters, references_in(&query)?, user)?;
        self.run(table_name, query, joins.as_ref(), user)
    }

    pub fn aggregate(&self, table_name: &str, parameters: &Parameters, user: &dyn Principal) -> Result<AggregationResult> {
        require_non_blank(table_name, "tableName")?;
        require_table(&self.database, table_name)?;
        require_access(
            self.authorizer.validate_table_access(table_name, user, PermissionScope::Reader)?,
            "Not authorized",
        )?;

        let query = aggregate_from_parameters(parameters)?;
        let joins = self.resolve_joins(parameters, references_in(&query)?, user)?;
        self.run(table_name, query, joins.as_ref(), user)
    }

    /// Count matches of `q` in every table. Unreadable tables are listed as
    /// not allowed; tables where the count fails are listed as not succeeded.
    pub fn all_count(&self, parameters: &Parameters, user: &dyn Principal) -> Result<AllCountResult> {
        if parameters.is_empty() {
            return Err(Error::not_provided("parameters"));
        }
        require_access(
            self.authorizer.validate_database_access(user, PermissionScope::Reader),
            "Not authorized",
        )?;

        let query_text = parameters.get("q").unwrap_or("");
        let mut result = AllCountResult::new(query_text);
        let mut query = AggregationQuery::count(parse_where(query_text)?);
        let joins = self.resolve_joins(parameters, references_in(&query)?, user)?;
        query.correct(&self.current_correctors(user))?;
        if let Some(joins) = &joins {
            query.correct(joins)?;
        }
        debug!(where_clause = %query.where_clause(), "counting across tables");

        for name in self.database.table_names() {
            let allowed = self
                .authorizer
                .validate_table_access(&name, user, PermissionScope::Reader)
                .unwrap_or(false);
            if !allowed {
                result.add(CountResult::new(&name, 0, false, false));
                continue;
            }

            query.set_table_name(&name);
            let counted = self
                .database
                .query(&query, |identity| self.authorizer.is_in_identity(user, identity));
            let count = match counted {
                Ok(aggregation) if aggregation.details.succeeded() => match aggregation.scalar() {
                    Some(Value::Integer(n)) => Some(*n as u64),
                    _ => None,
                },
                _ => None,
            };
            result.add(match count {
                Some(n) => CountResult::new(&name, n, true, true),
                None => CountResult::new(&name, 0, true, false),
            });
        }

        result.sort();
        Ok(result)
    }

    /// Suggestions for the partly typed query `q`, drawn from every table the
    /// caller can read, or only table `t` when given.
    pub fn intellisense(&self, parameters: &Parameters, user: &dyn Principal) -> Result<IntelliSenseResult> {
        if parameters.is_empty() {
            return Err(Error::not_provided("parameters"));
        }
        require_access(
            self.authorizer.validate_database_access(user, PermissionScope::Reader),
            "Not authorized",
        )?;

        let query_text = parameters.get("q").unwrap_or("");
        let selected = parameters.get_non_empty("t");
        let is_member = |identity: &SecurityIdentity| self.authorizer.is_in_identity(user, identity);

        let mut columns = Vec::new();
        for name in self.database.table_names() {
            if selected.is_some_and(|t| !t.eq_ignore_ascii_case(&name)) {
                continue;
            }
            let allowed = self
                .authorizer
                .validate_table_access(&name, user, PermissionScope::Reader)
                .unwrap_or(false);
            if !allowed {
                continue;
            }
            let restricted = self.database.get_restricted_columns(&name, is_member);
            for details in self.database.table(&name)?.column_details()? {
                if !is_restricted(&restricted, &details.name) {
                    columns.push(SuggestColumn { table: name.clone(), details });
                }
            }
        }

        let values = |column: &SuggestColumn, prefix: &str| {
            let where_clause = if column.details.column_type == ColumnType::String && !prefix.is_empty() {
                Expression::term(&column.details.name, CompareOperator::StartsWith, prefix)
            } else {
                Expression::All
            };
            let mut distinct = DistinctQuery::new(&column.details.name, where_clause);
            distinct.set_table_name(&column.table);
            distinct.count = MAX_SUGGESTIONS;
            match self.database.query(&distinct, is_member) {
                Ok(result) if result.details.succeeded() => result.values.column(0).to_vec(),
                Ok(result) => {
                    debug!(table = %column.table, column = %column.details.name, errors = ?result.details.errors, "no value suggestions");
                    Vec::new()
                }
                Err(e) => {
                    debug!(table = %column.table, column = %column.details.name, error = %e, "no value suggestions");
                    Vec::new()
                }
            }
        };

        let result = suggest(query_text, &columns, values);
        debug!(query = %query_text, suggestions = result.suggestions.len(), "suggested");
        Ok(result)
    }

    // Runs each numbered join the request carries, in order, keeping the
    // referenced columns of its rows. Later joins may use earlier ones.
    fn resolve_joins(
        &self,
        parameters: &Parameters,
        mut references: Vec<JoinReference>,
        user: &dyn Principal,
    ) -> Result<Option<JoinCorrector>> {
        let joins = joins_from_parameters(parameters)?;
        if joins.is_empty() {
            return Ok(None);
        }
        for join in &joins {
            for reference in references_in_expression(&join.where_clause) {
                if !references.contains(&reference) {
                    references.push(reference);
                }
            }
        }

        let correctors = self.current_correctors(user);
        let mut resolved = JoinCorrector::default();
        for (index, join) in joins.into_iter().enumerate() {
            let number = index + 1;
            let mut columns: Vec<String> = Vec::new();
            for reference in references.iter().filter(|r| r.join == number) {
                if !columns.iter().any(|c| c.eq_ignore_ascii_case(&reference.column)) {
                    columns.push(reference.column.clone());
                }
            }
            if columns.is_empty() {
                continue;
            }

            require_non_blank(&join.table_name, "joinTableName")?;
            require_table(&self.database, &join.table_name)?;
            require_access(
                self.authorizer
                    .validate_table_access(&join.table_name, user, PermissionScope::Reader)?,
                "Not authorized",
            )?;

            let mut select = SelectQuery::new(columns.clone(), join.where_clause);
            select.set_table_name(&join.table_name);
            select.count = MAX_JOIN_ROWS;
            select.correct(&correctors)?;
            select.correct(&resolved)?;
            let result = self
                .database
                .query(&select, |identity| self.authorizer.is_in_identity(user, identity))?;

            if !result.details.succeeded() {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("Join #Q{number} on '{}' failed: {}", join.table_name, result.details.errors.join("; ")),
                ));
            }
            if result.total > MAX_JOIN_ROWS as u64 {
                return Err(Error::new(
                    ErrorKind::CapacityExceeded,
                    format!("Join #Q{number} matched {} rows; at most {MAX_JOIN_ROWS} can be joined", result.total),
                ));
            }
            for (i, column) in columns.iter().enumerate() {
                let mut values: Vec<Value> = Vec::new();
                for value in result.values.column(i) {
                    if !value.is_null() && !values.contains(value) {
                        values.push(value.clone());
                    }
                }
                resolved.insert(number, column, values);
            }
            debug!(join = number, table = %join.table_name, rows = result.count_returned, "resolved join");
        }
        Ok(Some(resolved))
    }
}

fn where_from_parameters(parameters: &Parameters) -> Result<Expression> {
    parse_where(parameters.get("q").unwrap_or(""))
}

/// `q`, `ob`, `so`, `t`, `c1..cN` or `cols`, `h` and `h2`.
pub fn select_from_parameters(parameters: &Parameters) -> Result<SelectQuery> {
    let mut query = SelectQuery::new(parameters.read_set_or_delimited("c", "cols"), where_from_parameters(parameters)?);
    query.order_by = parameters.get_non_empty("ob").map(str::to_string);
    query.order = SortOrder::parse(parameters.get("so").unwrap_or(""))?;
    query.count = parameters.take(DEFAULT_SELECT_COUNT)?;
    if let Some(start) = parameters.get_non_empty("h") {
        let end = parameters.get("h2").unwrap_or(start);
        query.highlighter = Some(Highlighter::new(start, end));
    }
    Ok(query)
}

/// `col` (required), `q` and `t`.
pub fn distinct_from_parameters(parameters: &Parameters) -> Result<DistinctQuery> {
    let column = parameters.get_non_empty("col").ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidArgument,
            "Distinct Column [col] must be passed.",
        )
    })?;
    let mut query = DistinctQuery::new(column, where_from_parameters(parameters)?);
    query.count = parameters.take(DEFAULT_DISTINCT_COUNT)?;
    Ok(query)
}

/// `a` (default count), `col`, `q`, and dimensions from the numbered sets
/// `d1..`, `e1..`, `f1..` and so on until a set is missing.
pub fn aggregate_from_parameters(parameters: &Parameters) -> Result<AggregationQuery> {
    let aggregator = Aggregator::parse(parameters.get("a").unwrap_or("count"))?;
    let mut query = AggregationQuery::new(aggregator, parameters.get_non_empty("col"), where_from_parameters(parameters)?);

    for prefix in 'd'..='z' {
        let parts = parameters.read_set(&prefix.to_string());
        if parts.is_empty() {
            break;
        }
        query.dimensions.push(Dimension::from_parts(&parts)?);
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_parameters() {
        let parameters: Parameters = [("q", "Name:eric"), ("cols", "ID,Name"), ("so", "DESC"), ("t", "10"), ("h", "**")]
            .into_iter()
            .collect();
        let query = select_from_parameters(&parameters).unwrap();
        assert_eq!(query.columns, vec!["ID", "Name"]);
        assert_eq!(query.order, SortOrder::Desc);
        assert_eq!(query.count, 10);
        assert_eq!(query.highlighter, Some(Highlighter::new("**", "**")));

        let bad: Parameters = [("so", "sideways")].into_iter().collect();
        assert_eq!(select_from_parameters(&bad).unwrap_err().kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn distinct_needs_column() {
        let err = distinct_from_parameters(&Parameters::new().with("q", "*")).unwrap_err();
        assert_eq!(err.context, "Distinct Column [col] must be passed.");

        let query = distinct_from_parameters(&Parameters::new().with("col", "Age")).unwrap();
        assert_eq!(query.where_clause, Expression::All);
    }

    #[test]
    fn aggregate_dimensions_by_prefix() {
        let parameters: Parameters = [
            ("a", "sum"),
            ("col", "Age"),
            ("d1", "[Team]>"),
            ("e1", "Age < 30"),
            ("e2", "Age >= 30"),
            ("g1", "ignored"),
        ]
        .into_iter()
        .collect();
        let query = aggregate_from_parameters(&parameters).unwrap();
        assert_eq!(query.aggregator, Aggregator::Sum);
        assert_eq!(query.dimensions.len(), 2);
        assert_eq!(query.dimensions[0], Dimension::DistinctValue { column: "Team".into() });
    }
}
