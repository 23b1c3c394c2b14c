use chrono::{Duration, NaiveDate, Utc};
use crate::core::error::Result;
use crate::correctors::Corrector;
use crate::query::ast::Expression;

/// Replaces `today`, `today-N` and `today+N` with a `YYYY-MM-DD` date.
///
/// The date is taken when `correct` runs, not when the corrector is built.
#[derive(Debug, Clone, Default)]
pub struct TodayCorrector {
    fixed: Option<NaiveDate>,
}

impl TodayCorrector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always resolve relative to `date`.
    pub fn fixed(date: NaiveDate) -> Self {
        TodayCorrector { fixed: Some(date) }
    }

    fn today(&self) -> NaiveDate {
        self.fixed.unwrap_or_else(|| Utc::now().date_naive())
    }
}

// Day offset for "today", "today-3", "Today + 7"; None for anything else.
fn relative_days(value: &str) -> Option<i64> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if !compact.get(..5)?.eq_ignore_ascii_case("today") {
        return None;
    }
    let rest = &compact[5..];
    if rest.is_empty() {
        return Some(0);
    }
    let (sign, digits) = match rest.as_bytes()[0] {
        b'+' => (1, &rest[1..]),
        b'-' => (-1, &rest[1..]),
        _ => return None,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<i64>().ok().map(|n| sign * n)
}

impl Corrector for TodayCorrector {
    fn correct(&self, expression: Expression) -> Result<Expression> {
        let today = self.today();
        expression.map_terms(&mut |mut term| {
            if let Some(days) = relative_days(&term.value) {
                if let Some(date) = Duration::try_days(days).and_then(|d| today.checked_add_signed(d)) {
                    term.value = date.format("%Y-%m-%d").to_string();
                }
            }
            Ok(Expression::Term(term))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse_where;

    #[test]
    fn offsets() {
        assert_eq!(relative_days("today"), Some(0));
        assert_eq!(relative_days("Today - 7"), Some(-7));
        assert_eq!(relative_days("TODAY+30"), Some(30));
        assert_eq!(relative_days("todays"), None);
        assert_eq!(relative_days("today-"), None);
        assert_eq!(relative_days("yesterday"), None);
    }

    #[test]
    fn resolves_against_fixed_date() {
        let corrector = TodayCorrector::fixed(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let corrected = corrector.correct(parse_where("Created > \"today-1\" AND Due < today+31").unwrap()).unwrap();
        let values: Vec<&str> = corrected.terms().iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, vec!["2024-02-29", "2024-04-01"]);
    }
}
