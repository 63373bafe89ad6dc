//! # SealDB Storage
//!
//! Encrypted file storage for SealDB.
//!
//! This crate is the lowest layer of SealDB. It knows nothing about tables
//! or statements: it seals opaque byte documents and replaces files
//! atomically.
//!
//! ## Design Principles
//!
//! - Every document is sealed with AES-256-GCM under a passphrase-derived key
//! - A visible file is only ever replaced by a completed rename
//! - At most one write per file is in flight
//! - Tampering and wrong secrets surface as [`StorageError::Authentication`]
//!
//! ## Example
//!
//! ```rust
//! use sealdb_storage::{Cipher, KdfParams};
//!
//! let cipher = Cipher::new("passphrase", KdfParams::light());
//! let payload = cipher.encrypt(b"hello world").unwrap();
//! assert_eq!(cipher.decrypt(&payload).unwrap(), b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cipher;
mod error;
mod file;

pub use cipher::{
    derive_key, Cipher, DerivedKey, EncryptedPayload, KdfParams, KEY_SIZE, NONCE_SIZE, SALT_SIZE,
    TAG_SIZE,
};
pub use error::{StorageError, StorageResult};
pub use file::{temp_path_for, AtomicFileStore, TEMP_SUFFIX};
