//! Exec command implementation.

use sealdb_core::{Config, QueryResult, Store};
use serde_json::json;

use super::value_to_json;

/// Runs one statement and prints its result.
pub fn run(
    config: Config,
    database: &str,
    sql: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open(config)?;
    let result = store.execute_statement(database, sql)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&to_json(&result))?),
        _ => print_text(&result),
    }
    Ok(())
}

fn to_json(result: &QueryResult) -> serde_json::Value {
    match result {
        QueryResult::Rows { columns, rows } => {
            let rows: Vec<_> = rows
                .iter()
                .map(|row| {
                    columns
                        .iter()
                        .map(|c| {
                            let cell = row.get(c).map_or(serde_json::Value::Null, value_to_json);
                            (c.clone(), cell)
                        })
                        .collect::<serde_json::Map<_, _>>()
                })
                .collect();
            json!({ "columns": columns, "rows": rows })
        }
        QueryResult::Write {
            affected,
            generated_id,
        } => json!({ "affected": affected, "generated_id": generated_id }),
    }
}

fn print_text(result: &QueryResult) {
    match result {
        QueryResult::Rows { columns, rows } => {
            println!("{}", columns.join(" | "));
            for row in rows {
                let cells: Vec<_> = columns
                    .iter()
                    .map(|c| row.get(c).map(|v| v.render()).unwrap_or_default())
                    .collect();
                println!("{}", cells.join(" | "));
            }
            println!("({} rows)", rows.len());
        }
        QueryResult::Write {
            affected,
            generated_id,
        } => {
            println!("✓ {affected} row(s) affected");
            if let Some(id) = generated_id {
                println!("  Generated id: {id}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealdb_core::{Row, Value};

    #[test]
    fn json_keeps_column_order_and_nulls() {
        let mut row = Row::new();
        row.insert("b".into(), Value::Integer(2));
        let result = QueryResult::Rows {
            columns: vec!["b".into(), "a".into()],
            rows: vec![row],
        };
        let json = to_json(&result);
        assert_eq!(json["columns"], json!(["b", "a"]));
        assert_eq!(json["rows"][0]["b"], json!(2));
        assert_eq!(json["rows"][0]["a"], json!(null));
    }

    #[test]
    fn json_write_result() {
        let json = to_json(&QueryResult::Write {
            affected: 1,
            generated_id: Some(4),
        });
        assert_eq!(json, json!({ "affected": 1, "generated_id": 4 }));
    }
}
