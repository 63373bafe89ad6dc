//! Core type definitions for SealDB.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current time as Unix milliseconds.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A single cell value.
///
/// The set of variants is closed; every value stored in a row is one of
/// these. Serialization is externally tagged so that a persisted database
/// reads back exactly as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// Finite 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl Value {
    /// Returns true for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the variant name, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Boolean(_) => "BOOLEAN",
            Value::Integer(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Text(_) => "TEXT",
            Value::Blob(_) => "BLOB",
        }
    }

    /// Returns the numeric view of this value, if it has one.
    ///
    /// Booleans count as 0/1 and text is parsed when it looks numeric.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            Value::Null | Value::Blob(_) => None,
        }
    }

    /// Renders the value as text, the way a TEXT column stores it.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Real(r) => r.to_string(),
            Value::Text(s) => s.clone(),
            Value::Blob(b) => hex::encode(b),
        }
    }

    /// Compares two values.
    ///
    /// Returns `None` when either side is null or the values have no
    /// meaningful order (e.g. a blob against a number). Integers compare
    /// exactly; mixed numeric kinds compare as floats. Text that parses as a
    /// number compares numerically against numbers.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Blob(_), _) | (_, Value::Blob(_)) => None,
            _ => {
                let a = self.as_f64()?;
                let b = other.as_f64()?;
                a.partial_cmp(&b)
            }
        }
    }

    /// Returns true if the values compare equal.
    ///
    /// Null is never equal to anything, including null.
    #[must_use]
    pub fn loose_eq(&self, other: &Value) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Blob(b) => write!(f, "x'{}'", hex::encode(b)),
            other => f.write_str(&other.render()),
        }
    }
}

/// A row: column name to value.
pub type Row = BTreeMap<String, Value>;

/// Declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    /// 64-bit integer.
    Integer,
    /// 64-bit float.
    Real,
    /// UTF-8 text.
    Text,
    /// Raw bytes.
    Blob,
}

impl ColumnType {
    /// Parses a declared type name, accepting common aliases.
    #[must_use]
    pub fn from_sql(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "INTEGER" | "INT" | "BIGINT" | "SMALLINT" | "BOOLEAN" | "BOOL" => Some(Self::Integer),
            "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" | "DECIMAL" => Some(Self::Real),
            "TEXT" | "VARCHAR" | "CHAR" | "STRING" => Some(Self::Text),
            "BLOB" | "BYTES" => Some(Self::Blob),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
        })
    }
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within its table.
    pub name: String,
    /// Declared type.
    pub column_type: ColumnType,
    /// Part of the primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Rejects nulls.
    #[serde(default)]
    pub not_null: bool,
    /// Value used when an INSERT omits the column.
    #[serde(default)]
    pub default: Option<Value>,
}

impl Column {
    /// Creates a nullable, non-key column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            not_null: false,
            default: None,
        }
    }

    /// Marks the column as part of the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Marks the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Returns true if nulls are rejected for this column.
    #[must_use]
    pub fn rejects_null(&self) -> bool {
        self.primary_key || self.not_null
    }
}

/// An index descriptor. Recorded, never consulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name, unique within its database.
    pub name: String,
    /// Indexed columns, in order.
    pub columns: Vec<String>,
    /// Declared UNIQUE.
    #[serde(default)]
    pub unique: bool,
}

/// A table: schema plus rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Column definitions in declared order.
    pub columns: Vec<Column>,
    /// Index descriptors.
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
    /// Rows in insertion order.
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl Table {
    /// Creates an empty table.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            indexes: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Looks up a column definition.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns the primary-key column names in declared order.
    #[must_use]
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Returns the column names in declared order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// A named database: a set of tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    /// Database name. Immutable after creation.
    pub name: String,
    /// Tables by name.
    #[serde(default)]
    pub tables: BTreeMap<String, Table>,
    /// Creation time (Unix ms).
    pub created_at: u64,
    /// Last modification time (Unix ms).
    pub updated_at: u64,
}

impl Database {
    /// Creates an empty database stamped with the current time.
    pub fn new(name: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            name: name.into(),
            tables: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Bumps the modification time.
    pub fn touch(&mut self) {
        self.updated_at = now_millis().max(self.updated_at);
    }

    /// Finds the table owning an index.
    #[must_use]
    pub fn index_owner(&self, index: &str) -> Option<&str> {
        self.tables
            .values()
            .find(|t| t.indexes.iter().any(|i| i.name == index))
            .map(|t| t.name.as_str())
    }
}

/// Outcome of a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Rows produced by a read.
    Rows {
        /// Projected column names, in output order.
        columns: Vec<String>,
        /// Projected rows.
        rows: Vec<Row>,
    },
    /// Outcome of a write.
    Write {
        /// Number of rows affected.
        affected: usize,
        /// Identifier generated by an INSERT, if any.
        generated_id: Option<i64>,
    },
}

impl QueryResult {
    /// A write result without a generated id.
    #[must_use]
    pub fn affected(affected: usize) -> Self {
        Self::Write {
            affected,
            generated_id: None,
        }
    }

    /// Returns the rows of a read, or an empty slice for a write.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        match self {
            Self::Rows { rows, .. } => rows,
            Self::Write { .. } => &[],
        }
    }

    /// Returns the affected count of a write, or `None` for a read.
    #[must_use]
    pub fn affected_rows(&self) -> Option<usize> {
        match self {
            Self::Write { affected, .. } => Some(*affected),
            Self::Rows { .. } => None,
        }
    }

    /// Returns the generated id of a write, if any.
    #[must_use]
    pub fn generated_id(&self) -> Option<i64> {
        match self {
            Self::Write { generated_id, .. } => *generated_id,
            Self::Rows { .. } => None,
        }
    }
}
