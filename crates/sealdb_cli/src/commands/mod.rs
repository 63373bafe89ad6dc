//! CLI command implementations.

pub mod backup;
pub mod database;
pub mod exec;

use sealdb_core::Value;

/// Renders a cell as plain JSON, without the type tag used on disk.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Real(f) => serde_json::Value::from(*f),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Blob(bytes) => serde_json::Value::from(bytes.as_slice()),
    }
}

/// Formats Unix milliseconds as seconds since the epoch.
pub fn format_timestamp(ms: u64) -> String {
    format!("{}.{:03}s since epoch", ms / 1000, ms % 1000)
}
