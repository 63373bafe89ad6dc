//! WHERE evaluation.

use std::cmp::Ordering;

use crate::sql::{Comparison, Condition, Predicate};
use crate::types::{Row, Value};

static NULL: Value = Value::Null;

/// Returns true if `row` satisfies `filter`. No filter matches every row.
#[must_use]
pub fn matches(filter: Option<&Predicate>, row: &Row) -> bool {
    filter.map_or(true, |p| {
        p.branches
            .iter()
            .any(|branch| branch.iter().all(|c| holds(c, row)))
    })
}

/// Evaluates one condition. A column missing from the row reads as null.
fn holds(condition: &Condition, row: &Row) -> bool {
    let value = row.get(&condition.column).unwrap_or(&NULL);

    match &condition.test {
        Comparison::IsNull => value.is_null(),
        Comparison::IsNotNull => !value.is_null(),
        Comparison::Eq(operand) => value.loose_eq(operand),
        Comparison::NotEq(operand) => {
            !value.is_null() && !operand.is_null() && !value.loose_eq(operand)
        }
        Comparison::Gt(operand) => value.compare(operand) == Some(Ordering::Greater),
        Comparison::Ge(operand) => matches!(
            value.compare(operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Comparison::Lt(operand) => value.compare(operand) == Some(Ordering::Less),
        Comparison::Le(operand) => matches!(
            value.compare(operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Comparison::Like(pattern) => {
            !value.is_null() && value.render().contains(&pattern.replace('%', ""))
        }
        Comparison::In(candidates) => candidates.iter().any(|c| value.loose_eq(c)),
    }
}
