//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The encrypted wrapper document could not be parsed or produced.
    #[error("wrapper format error: {0}")]
    Json(#[from] serde_json::Error),

    /// The authentication tag did not verify.
    ///
    /// Either the payload was tampered with or it was sealed under a
    /// different secret. This is never treated as an empty document.
    #[error("authentication failed: payload is corrupted or the secret is wrong")]
    Authentication,

    /// Encryption failed or the payload fields are malformed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Key derivation rejected its parameters.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// The stored file is corrupted beyond the cipher layer.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Another write to the same file has not finished yet.
    #[error("write already in progress for {}", path.display())]
    WriteInProgress {
        /// The contended path.
        path: PathBuf,
    },
}

impl StorageError {
    /// Returns true if this error signals a failed authentication tag.
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication)
    }
}
