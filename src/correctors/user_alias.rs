use std::sync::Arc;
use crate::core::error::Result;
use crate::core::types::Value;
use crate::correctors::Corrector;
use crate::query::ast::Expression;
use crate::query::select::SelectQuery;
use crate::query::types::CompareOperator;
use crate::table::table::Table;

/// Resolves aliases to canonical names through a lookup table.
///
/// A term on one of `target_columns` whose value is found in the lookup
/// table's `alias_column` gets the matching `name_column` value. Unknown
/// aliases pass through unchanged. Run it after `MeCorrector` so "me" is
/// already a real alias.
pub struct UserAliasCorrector {
    people: Arc<Table>,
    alias_column: String,
    name_column: String,
    target_columns: Vec<String>, // Empty targets every column-qualified term
}

impl UserAliasCorrector {
    pub fn new(people: Arc<Table>, alias_column: &str, name_column: &str, target_columns: Vec<String>) -> Self {
        UserAliasCorrector {
            people,
            alias_column: alias_column.to_string(),
            name_column: name_column.to_string(),
            target_columns,
        }
    }

    fn targets(&self, column: Option<&str>) -> bool {
        match column {
            None => false,
            Some(_) if self.target_columns.is_empty() => true,
            Some(column) => self.target_columns.iter().any(|t| t.eq_ignore_ascii_case(column)),
        }
    }

    fn resolve(&self, alias: &str) -> Result<Option<String>> {
        let mut lookup = SelectQuery::new(
            vec![self.name_column.clone()],
            Expression::term(&self.alias_column, CompareOperator::Equals, alias),
        );
        lookup.count = 1;
        let result = self.people.query(&lookup)?;
        if !result.details.succeeded() || result.values.row_count() == 0 {
            return Ok(None);
        }
        Ok(match result.values.get(0, 0) {
            Value::Null => None,
            Value::Text(name) if name.is_empty() => None,
            value => Some(value.to_string()),
        })
    }
}

impl Corrector for UserAliasCorrector {
    fn correct(&self, expression: Expression) -> Result<Expression> {
        expression.map_terms(&mut |mut term| {
            if self.targets(term.column.as_deref()) && !term.value.trim().is_empty() {
                if let Some(name) = self.resolve(term.value.trim())? {
                    term.value = name;
                }
            }
            Ok(Expression::Term(term))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ColumnType, DataBlock};
    use crate::correctors::{ComposedCorrector, MeCorrector};
    use crate::query::parser::parse_where;
    use crate::schema::schema::ColumnDetails;
    use crate::storage::layout::StorageLayout;
    use crate::table::table::{AddOrUpdateOptions, TableSettings};

    fn people(dir: &std::path::Path) -> Arc<Table> {
        let storage = Arc::new(StorageLayout::new(dir.to_path_buf()).unwrap());
        let table = Table::new("People", 100, storage, TableSettings::default()).unwrap();
        table
            .add_columns(vec![
                ColumnDetails::new("Alias", ColumnType::String).primary_key(),
                ColumnDetails::new("Display Name", ColumnType::String),
            ])
            .unwrap();
        let block = DataBlock::from_rows(
            vec!["Alias".into(), "Display Name".into()],
            vec![
                vec!["visouza".into(), "Vinicius Souza".into()],
                vec!["scott".into(), "Scott Louvau".into()],
            ],
        )
        .unwrap();
        table.add_or_update(&block, AddOrUpdateOptions::default()).unwrap();
        Arc::new(table)
    }

    #[test]
    fn resolves_only_target_columns() {
        let dir = tempfile::tempdir().unwrap();
        let corrector = UserAliasCorrector::new(people(dir.path()), "Alias", "Display Name", vec!["Assigned To".into()]);

        let corrected = corrector
            .correct(parse_where("[Assigned To]=scott AND Title=scott AND [Assigned To]=nobody").unwrap())
            .unwrap();
        let values: Vec<&str> = corrected.terms().iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, vec!["Scott Louvau", "scott", "nobody"]);
    }

    #[test]
    fn sees_me_already_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let chain = ComposedCorrector::new(vec![
            Box::new(MeCorrector::new("visouza")),
            Box::new(UserAliasCorrector::new(people(dir.path()), "Alias", "Display Name", Vec::new())),
        ]);
        let corrected = chain.correct(parse_where("[Assigned To] = me").unwrap()).unwrap();
        assert_eq!(corrected.terms()[0].value, "Vinicius Souza");
    }
}
