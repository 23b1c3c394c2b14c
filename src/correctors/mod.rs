use crate::core::error::Result;
use crate::query::ast::Expression;

pub mod me;
pub mod today;
pub mod user_alias;
pub mod composed;

pub use composed::ComposedCorrector;
pub use me::MeCorrector;
pub use today::TodayCorrector;
pub use user_alias::UserAliasCorrector;

/// Rewrites request-relative values in a WHERE clause before it runs.
pub trait Corrector: Send + Sync {
    fn correct(&self, expression: Expression) -> Result<Expression>;
}
