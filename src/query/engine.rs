use crate::core::details::ExecutionDetails;
use crate::core::error::Result;
use crate::correctors::Corrector;
use crate::query::ast::Expression;
use crate::schema::schema::TableSchema;
use crate::table::partition::Partition;

/// A query shape run by `Table::query`.
///
/// The table calls `prepare` once against its schema, `compute` once per
/// partition (possibly in parallel), then `merge` with every partial result.
/// `merge` must not depend on partition order.
pub trait Query: Send + Sync {
    type Partial: Send;
    type Output;

    fn table_name(&self) -> &str;
    fn set_table_name(&mut self, name: &str);

    fn where_clause(&self) -> &Expression;
    fn where_clause_mut(&mut self) -> &mut Expression;

    /// Rewrite the WHERE clause (and any other expressions the shape carries).
    fn correct(&mut self, corrector: &dyn Corrector) -> Result<()> {
        let original = std::mem::take(self.where_clause_mut());
        *self.where_clause_mut() = corrector.correct(original)?;
        Ok(())
    }

    /// Schema-level validation; errors land in `details` and skip execution.
    fn prepare(&self, _schema: &TableSchema, _details: &mut ExecutionDetails) {}

    fn compute(&self, schema: &TableSchema, partition: &Partition, details: &mut ExecutionDetails) -> Self::Partial;

    fn merge(&self, schema: &TableSchema, partials: Vec<Self::Partial>, details: ExecutionDetails) -> Self::Output;

    /// Remove `restricted` columns from a finished result.
    fn redact(&self, _output: &mut Self::Output, _restricted: &[String]) {}
}

/// Canonical schema name for each requested column; unknown names are
/// reported and skipped. "*" expands to every column.
pub(crate) fn resolve_columns(
    schema: &TableSchema,
    requested: &[String],
    details: &mut ExecutionDetails,
) -> Vec<usize> {
    let mut indices = Vec::with_capacity(requested.len());
    for name in requested {
        let name = name.trim();
        if name == "*" {
            indices.extend(0..schema.columns.len());
            continue;
        }
        match schema.index_of(name) {
            Some(i) => indices.push(i),
            None => details.add_error(format!("Column '{name}' does not exist.")),
        }
    }
    let mut seen = Vec::with_capacity(indices.len());
    indices.retain(|i| {
        let first = !seen.contains(i);
        seen.push(*i);
        first
    });
    indices
}

pub(crate) fn is_restricted(restricted: &[String], column: &str) -> bool {
    restricted.iter().any(|r| r.eq_ignore_ascii_case(column))
}
