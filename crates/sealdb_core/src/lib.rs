//! # SealDB Core
//!
//! Embeddable, encrypted, SQL-like store.
//!
//! This crate provides:
//! - A small SQL dialect (`CREATE`/`DROP TABLE`, `CREATE`/`DROP INDEX`,
//!   `SELECT`, `INSERT`, `UPDATE`, `DELETE`) over named databases
//! - One sealed file per database, written back after every mutation
//! - Backups as compressed archives with a checksummed manifest
//! - A sealed system registry of backups, one-time passwords and
//!   restorations
//!
//! ```rust
//! use sealdb_core::{Config, KdfParams, Store, Value};
//!
//! let dir = tempfile::tempdir()?;
//! let store = Store::open(
//!     Config::new(dir.path()).secret("passphrase").kdf(KdfParams::light()),
//! )?;
//! store.create_database("dragon")?;
//! store.execute_statement(
//!     "dragon",
//!     "CREATE TABLE fighters (id INTEGER PRIMARY KEY, nome TEXT NOT NULL, age INTEGER)",
//! )?;
//! store.execute_statement("dragon", "INSERT INTO fighters (nome, age) VALUES ('Goku', 30)")?;
//!
//! let result = store.execute_statement("dragon", "SELECT nome FROM fighters WHERE age > 20")?;
//! assert_eq!(result.rows()[0]["nome"], Value::Text("Goku".into()));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backup;
mod config;
mod engine;
mod error;
mod persistence;
pub mod registry;
mod runner;
pub mod sql;
mod store;
mod types;

pub use backup::{BackupInfo, BackupManifest, ManifestEntry, RestorationReport};
pub use config::{Config, DEFAULT_MAX_BACKUPS, DEFAULT_MAX_DATABASE_SIZE};
pub use engine::{validate_database_name, Engine, MAX_NAME_LEN};
pub use error::{CoreError, CoreResult};
pub use persistence::{Persistence, DATABASE_EXTENSION};
pub use registry::{BackupRecord, BackupStatus, BackupSummary, RestorationRecord, RestoreFailure};
pub use store::Store;
pub use types::{Column, ColumnType, Database, IndexDef, QueryResult, Row, Table, Value};

pub use sealdb_storage::KdfParams;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
