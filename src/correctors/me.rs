use crate::core::error::Result;
use crate::correctors::Corrector;
use crate::query::ast::Expression;

/// Replaces the value `me` with the caller's name.
#[derive(Debug, Clone)]
pub struct MeCorrector {
    user_name: String,
}

impl MeCorrector {
    pub fn new(user_name: &str) -> Self {
        MeCorrector { user_name: user_name.to_string() }
    }
}

impl Corrector for MeCorrector {
    fn correct(&self, expression: Expression) -> Result<Expression> {
        expression.map_terms(&mut |mut term| {
            if term.value.trim().eq_ignore_ascii_case("me") {
                term.value = self.user_name.clone();
            }
            Ok(Expression::Term(term))
        })
    }
}
