use crate::core::error::Result;
use crate::correctors::{Corrector, TodayCorrector};
use crate::query::ast::Expression;

/// Applies each corrector to the whole tree, in order.
#[derive(Default)]
pub struct ComposedCorrector {
    correctors: Vec<Box<dyn Corrector>>,
}

impl ComposedCorrector {
    pub fn new(correctors: Vec<Box<dyn Corrector>>) -> Self {
        ComposedCorrector { correctors }
    }

    /// Server-wide correctors when none are configured.
    pub fn server_default() -> Self {
        ComposedCorrector::new(vec![Box::new(TodayCorrector::new())])
    }

    pub fn push(&mut self, corrector: Box<dyn Corrector>) {
        self.correctors.push(corrector);
    }

    pub fn len(&self) -> usize {
        self.correctors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.correctors.is_empty()
    }
}

impl Corrector for ComposedCorrector {
    fn correct(&self, expression: Expression) -> Result<Expression> {
        self.correctors
            .iter()
            .try_fold(expression, |expression, corrector| corrector.correct(expression))
    }
}

impl<C: Corrector + ?Sized> Corrector for std::sync::Arc<C> {
    fn correct(&self, expression: Expression) -> Result<Expression> {
        (**self).correct(expression)
    }
}
