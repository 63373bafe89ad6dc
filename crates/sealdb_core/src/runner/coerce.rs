//! Schema-driven value coercion.

use crate::error::{CoreError, CoreResult};
use crate::types::{Column, ColumnType, Value};

/// Converts `value` to the declared type of `column`.
///
/// Null passes through unchanged; the not-null check happens later, once
/// the whole row is known.
///
/// # Errors
///
/// Returns [`CoreError::Validation`] if the value has no sensible
/// representation in the column's type.
pub fn coerce(value: Value, column: &Column) -> CoreResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    let converted = match column.column_type {
        ColumnType::Integer => to_integer(&value).map(Value::Integer),
        ColumnType::Real => to_real(&value).map(Value::Real),
        ColumnType::Text => {
            return Ok(match value {
                Value::Text(text) => Value::Text(text),
                other => Value::Text(other.render()),
            })
        }
        ColumnType::Blob => return Ok(value),
    };

    converted.ok_or_else(|| {
        CoreError::validation(format!(
            "cannot store {} value {value} in {} column {}",
            value.type_name(),
            column.column_type,
            column.name
        ))
    })
}

fn to_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::Boolean(b) => Some(i64::from(*b)),
        Value::Real(f) => truncate(*f),
        Value::Text(text) => {
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(truncate))
        }
        Value::Null | Value::Blob(_) => None,
    }
}

fn to_real(value: &Value) -> Option<f64> {
    match value {
        Value::Blob(_) => None,
        other => other.as_f64().filter(|f| f.is_finite()),
    }
}

/// Truncates toward zero; out-of-range and non-finite floats have no integer.
fn truncate(f: f64) -> Option<i64> {
    let t = f.trunc();
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range.
    if t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64 {
        Some(t as i64)
    } else {
        None
    }
}
