//! Error types for SealDB core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in SealDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage layer error (I/O, cipher, write contention).
    #[error("storage error: {0}")]
    Storage(#[from] sealdb_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Statement does not match the supported grammar.
    #[error("syntax error at position {position}: {message}")]
    Syntax {
        /// Description of the problem.
        message: String,
        /// Byte offset into the statement text.
        position: usize,
    },

    /// Unknown column or a schema-level mismatch.
    #[error("schema error: {message}")]
    Schema {
        /// Description of the problem.
        message: String,
    },

    /// Primary-key duplicate or not-null breach.
    #[error("constraint violation on {table}({}): {message}", columns.join(", "))]
    ConstraintViolation {
        /// Table the violation occurred in.
        table: String,
        /// Offending column(s).
        columns: Vec<String>,
        /// Description of the violation.
        message: String,
    },

    /// Create on a name that already exists.
    #[error("{kind} already exists: {name}")]
    Conflict {
        /// Kind of object (database, table, index).
        kind: &'static str,
        /// The conflicting name.
        name: String,
    },

    /// Operation on a name that does not exist.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Kind of object (database, table, index, backup).
        kind: &'static str,
        /// The missing name.
        name: String,
    },

    /// Statement keyword outside the supported surface.
    #[error("unsupported statement: {keyword}")]
    UnsupportedStatement {
        /// The leading keyword.
        keyword: String,
    },

    /// Statement is well-formed but its values are not acceptable.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },

    /// Serialized database would exceed the configured maximum.
    #[error("database {name} would be {size} bytes, limit is {limit}")]
    SizeLimitExceeded {
        /// Database name.
        name: String,
        /// Serialized size in bytes.
        size: u64,
        /// Configured limit in bytes.
        limit: u64,
    },

    /// Invalid file, archive, or manifest format.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },
}

impl CoreError {
    /// Creates a syntax error.
    pub fn syntax(message: impl Into<String>, position: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            position,
        }
    }

    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Creates a constraint violation error.
    pub fn constraint(
        table: impl Into<String>,
        columns: Vec<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ConstraintViolation {
            table: table.into(),
            columns,
            message: message.into(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(kind: &'static str, name: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            name: name.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Creates an unsupported statement error.
    pub fn unsupported(keyword: impl Into<String>) -> Self {
        Self::UnsupportedStatement {
            keyword: keyword.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Returns true if decryption failed its authentication check.
    ///
    /// This means the file is corrupted or the secret is wrong.
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_authentication())
    }
}
