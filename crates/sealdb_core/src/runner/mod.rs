//! Execution runner.
//!
//! Stateless evaluation of row-level statements against a single table:
//! predicate matching, ordering, limits, projection, coercion and key
//! constraints. Every mutation is computed in full before the table is
//! touched, so a failing statement leaves the table as it was.

mod coerce;
mod predicate;

pub use coerce::coerce;
pub use predicate::matches;

use std::cmp::Ordering;

use crate::error::{CoreError, CoreResult};
use crate::sql::{Delete, Insert, OrderKey, Projection, Select, Update};
use crate::types::{ColumnType, QueryResult, Row, Table, Value};

/// Runs a SELECT: WHERE, then ORDER BY, then LIMIT, then projection.
pub fn select(table: &Table, stmt: &Select) -> CoreResult<QueryResult> {
    let filtered: Vec<&Row> = table
        .rows
        .iter()
        .filter(|row| matches(stmt.filter.as_ref(), row))
        .collect();

    let mut ordered = order_rows(filtered, &stmt.order_by);

    if let Some(limit) = stmt.limit {
        ordered.truncate(limit);
    }

    let columns: Vec<String> = match &stmt.projection {
        Projection::All => table.column_names(),
        Projection::Columns(requested) => requested
            .iter()
            .filter(|name| table.column(name).is_some())
            .cloned()
            .collect(),
    };

    let rows = ordered
        .into_iter()
        .map(|row| {
            columns
                .iter()
                .map(|name| (name.clone(), row.get(name).cloned().unwrap_or(Value::Null)))
                .collect()
        })
        .collect();

    Ok(QueryResult::Rows { columns, rows })
}

/// Runs an INSERT. Without a column list, values map to every column in
/// declared order.
pub fn insert(table: &mut Table, stmt: &Insert) -> CoreResult<QueryResult> {
    let columns = match &stmt.columns {
        Some(columns) => columns.clone(),
        None => table.column_names(),
    };
    if columns.len() != stmt.values.len() {
        return Err(CoreError::validation(format!(
            "{} columns but {} values",
            columns.len(),
            stmt.values.len()
        )));
    }

    insert_row(table, columns.into_iter().zip(stmt.values.iter().cloned()).collect())
}

/// Appends one row built from `(column, value)` pairs.
///
/// Values are coerced to their column types; omitted columns take their
/// default (or null). A table whose primary key is a single INTEGER column
/// gets `max + 1` when the key is omitted or null, reported as the
/// generated id.
pub fn insert_row(table: &mut Table, values: Vec<(String, Value)>) -> CoreResult<QueryResult> {
    let mut row = Row::new();
    for (name, value) in values {
        let column = table.column(&name).ok_or_else(|| no_such_column(table, &name))?;
        let value = coerce(value, column)?;
        if row.insert(name.clone(), value).is_some() {
            return Err(CoreError::validation(format!("column {name} given more than once")));
        }
    }

    for column in &table.columns {
        if !row.contains_key(&column.name) {
            let value = match &column.default {
                Some(default) => coerce(default.clone(), column)?,
                None => Value::Null,
            };
            row.insert(column.name.clone(), value);
        }
    }

    let generated_id = generate_key(table, &mut row);
    check_not_null(table, &row)?;
    check_primary_key_uniqueness(table, &row)?;

    table.rows.push(row);
    Ok(QueryResult::Write {
        affected: 1,
        generated_id,
    })
}

/// Runs an UPDATE. All matching rows are rewritten together or not at all.
pub fn update(table: &mut Table, stmt: &Update) -> CoreResult<QueryResult> {
    let mut assignments = Vec::with_capacity(stmt.assignments.len());
    for assignment in &stmt.assignments {
        let column = table
            .column(&assignment.column)
            .ok_or_else(|| no_such_column(table, &assignment.column))?;
        assignments.push((column.name.clone(), coerce(assignment.value.clone(), column)?));
    }

    let mut staged = table.rows.clone();
    let mut touched = Vec::new();
    for (i, row) in staged.iter_mut().enumerate() {
        if matches(stmt.filter.as_ref(), row) {
            for (name, value) in &assignments {
                row.insert(name.clone(), value.clone());
            }
            touched.push(i);
        }
    }

    let key = key_columns(table);
    for &i in &touched {
        check_not_null(table, &staged[i])?;
        if has_duplicate(&staged, &key, &staged[i], Some(i)) {
            return Err(duplicate_key(table, &key));
        }
    }

    let affected = touched.len();
    table.rows = staged;
    Ok(QueryResult::affected(affected))
}

/// Runs a DELETE, keeping only non-matching rows.
pub fn delete(table: &mut Table, stmt: &Delete) -> CoreResult<QueryResult> {
    let before = table.rows.len();
    table
        .rows
        .retain(|row| !matches(stmt.filter.as_ref(), row));
    Ok(QueryResult::affected(before - table.rows.len()))
}

/// Rejects nulls in NOT NULL and primary-key columns.
pub fn check_not_null(table: &Table, row: &Row) -> CoreResult<()> {
    for column in table.columns.iter().filter(|c| c.rejects_null()) {
        if row.get(&column.name).map_or(true, Value::is_null) {
            return Err(CoreError::constraint(
                &table.name,
                vec![column.name.clone()],
                "null value in non-nullable column",
            ));
        }
    }
    Ok(())
}

/// Fails if an existing row already holds the same primary-key values as
/// `row`. Tables without a primary key accept anything.
pub fn check_primary_key_uniqueness(table: &Table, row: &Row) -> CoreResult<()> {
    let key = key_columns(table);
    if has_duplicate(&table.rows, &key, row, None) {
        return Err(duplicate_key(table, &key));
    }
    Ok(())
}

fn key_columns(table: &Table) -> Vec<String> {
    table.primary_key().into_iter().map(str::to_string).collect()
}

/// True if a row other than `skip` holds the same key values as `row`.
fn has_duplicate(rows: &[Row], key: &[String], row: &Row, skip: Option<usize>) -> bool {
    !key.is_empty()
        && rows
            .iter()
            .enumerate()
            .any(|(i, other)| Some(i) != skip && key.iter().all(|k| other.get(k) == row.get(k)))
}

fn duplicate_key(table: &Table, key: &[String]) -> CoreError {
    CoreError::constraint(&table.name, key.to_vec(), "duplicate primary key")
}

fn no_such_column(table: &Table, column: &str) -> CoreError {
    CoreError::schema(format!("table {} has no column {column}", table.name))
}

/// Fills an omitted single INTEGER key with `max + 1`.
fn generate_key(table: &Table, row: &mut Row) -> Option<i64> {
    let primary_key = table.primary_key();
    let &[key] = primary_key.as_slice() else {
        return None;
    };
    let column = table.column(key)?;
    if column.column_type != ColumnType::Integer || !row.get(key).map_or(true, Value::is_null) {
        return None;
    }

    let next = table
        .rows
        .iter()
        .filter_map(|r| match r.get(key) {
            Some(Value::Integer(i)) => Some(*i),
            _ => None,
        })
        .max()
        .map_or(Some(1), |max| max.checked_add(1))?;

    row.insert(key.to_string(), Value::Integer(next));
    Some(next)
}

/// Multi-key stable ordering, one pass per key from last to first.
///
/// Null neither precedes nor follows anything, so in each pass a row whose
/// key is null (or missing) keeps its slot, and the remaining rows are
/// sorted into the other slots. A row's position among nulls is therefore
/// decided by the later keys.
fn order_rows<'a>(mut rows: Vec<&'a Row>, keys: &[OrderKey]) -> Vec<&'a Row> {
    for key in keys.iter().rev() {
        rows = order_by_key(rows, key);
    }
    rows
}

fn order_by_key<'a>(rows: Vec<&'a Row>, key: &OrderKey) -> Vec<&'a Row> {
    let mut slots = Vec::with_capacity(rows.len());
    let mut sortable = Vec::new();
    for row in rows {
        match row.get(&key.column) {
            Some(value) if !value.is_null() => {
                sortable.push((row, value));
                slots.push(None);
            }
            _ => slots.push(Some(row)),
        }
    }

    let sorted = merge_sort(sortable, &|a: &(&Row, &Value), b: &(&Row, &Value)| {
        // Mixed-type pairs that cannot be compared tie.
        let ordering = a.1.compare(b.1).unwrap_or(Ordering::Equal);
        if key.descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
    let mut sorted = sorted.into_iter().map(|(row, _)| row);
    slots
        .into_iter()
        .filter_map(|slot| slot.or_else(|| sorted.next()))
        .collect()
}

/// Stable merge sort.
///
/// Mixed-type values tie, so the comparator is not always a total order, and
/// `slice::sort_by` may panic on inconsistent comparators.
fn merge_sort<T>(mut items: Vec<T>, cmp: &dyn Fn(&T, &T) -> Ordering) -> Vec<T> {
    if items.len() <= 1 {
        return items;
    }
    let right = items.split_off(items.len() / 2);
    let mut left = merge_sort(items, cmp).into_iter().peekable();
    let mut right = merge_sort(right, cmp).into_iter().peekable();

    let mut merged = Vec::with_capacity(left.len() + right.len());
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => cmp(r, l) == Ordering::Less,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        merged.extend(if take_right { right.next() } else { left.next() });
    }
    merged
}
