//! Persistence coordinator.
//!
//! Maps each database to one sealed file under the data directory and moves
//! it between disk and memory. The plaintext of `<name>.sdb` is the JSON
//! object `{ "<name>": Database }`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sealdb_storage::AtomicFileStore;
use tracing::debug;

use crate::engine::validate_database_name;
use crate::error::{CoreError, CoreResult};
use crate::types::Database;

/// Extension of database files.
pub const DATABASE_EXTENSION: &str = "sdb";

/// Loads and saves database files.
#[derive(Debug)]
pub struct Persistence {
    files: Arc<AtomicFileStore>,
    data_dir: PathBuf,
    max_size: u64,
}

impl Persistence {
    /// Creates a coordinator rooted at `data_dir`.
    ///
    /// `max_size` bounds the serialized size of a single database.
    pub fn new(files: Arc<AtomicFileStore>, data_dir: impl Into<PathBuf>, max_size: u64) -> Self {
        Self {
            files,
            data_dir: data_dir.into(),
            max_size,
        }
    }

    /// The underlying file store.
    #[must_use]
    pub fn files(&self) -> &Arc<AtomicFileStore> {
        &self.files
    }

    /// Directory holding database files.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the file for database `name`.
    #[must_use]
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.data_dir.join(file_name_for(name))
    }

    /// Returns true if a file for `name` exists.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.files.exists(&self.path_for(name))
    }

    /// Reads database `name` from disk.
    ///
    /// Returns `None` if there is no file for it.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Storage`] if the file cannot be decrypted
    /// - [`CoreError::InvalidFormat`] if the plaintext does not hold the
    ///   named database
    pub fn load(&self, name: &str) -> CoreResult<Option<Database>> {
        validate_database_name(name)?;
        let Some(plaintext) = self.files.read(&self.path_for(name))? else {
            return Ok(None);
        };

        let mut document: BTreeMap<String, Database> = serde_json::from_slice(&plaintext)?;
        let database = document.remove(name).ok_or_else(|| {
            CoreError::invalid_format(format!("file for {name} does not contain it"))
        })?;
        if database.name != name {
            return Err(CoreError::invalid_format(format!(
                "file for {name} holds database {}",
                database.name
            )));
        }

        debug!(database = name, tables = database.tables.len(), "loaded database");
        Ok(Some(database))
    }

    /// Serializes `database` and atomically replaces its file.
    ///
    /// Returns the serialized size.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SizeLimitExceeded`] without touching the file
    /// if the serialized form is larger than the configured maximum.
    pub fn save(&self, database: &Database) -> CoreResult<u64> {
        let mut document = BTreeMap::new();
        document.insert(database.name.as_str(), database);
        let plaintext = serde_json::to_vec(&document)?;

        let size = plaintext.len() as u64;
        if size > self.max_size {
            return Err(CoreError::SizeLimitExceeded {
                name: database.name.clone(),
                size,
                limit: self.max_size,
            });
        }

        self.files.write(&self.path_for(&database.name), &plaintext)?;
        debug!(database = %database.name, bytes = size, "saved database");
        Ok(size)
    }

    /// Deletes the file for `name`. A missing file is not an error.
    pub fn delete(&self, name: &str) -> CoreResult<()> {
        self.files.delete(&self.path_for(name))?;
        Ok(())
    }

    /// Names of all databases with a file in the data directory, sorted.
    pub fn list_databases_on_disk(&self) -> CoreResult<Vec<String>> {
        Ok(self
            .database_files()?
            .iter()
            .filter_map(|path| path.file_stem()?.to_str().map(str::to_string))
            .collect())
    }

    /// Paths of all database files, sorted by name.
    pub fn database_files(&self) -> CoreResult<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if is_database_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// File name for database `name`.
#[must_use]
pub fn file_name_for(name: &str) -> String {
    format!("{name}.{DATABASE_EXTENSION}")
}

/// Returns true for `<valid name>.sdb` regular files.
fn is_database_file(path: &Path) -> bool {
    path.is_file()
        && path.extension().is_some_and(|ext| ext == DATABASE_EXTENSION)
        && path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .is_some_and(|stem| validate_database_name(stem).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, ColumnType, Table, Value};
    use sealdb_storage::{Cipher, KdfParams};
    use tempfile::tempdir;

    fn persistence(dir: &Path, max_size: u64) -> Persistence {
        let files = Arc::new(AtomicFileStore::new(Cipher::new("secret", KdfParams::light())));
        Persistence::new(files, dir, max_size)
    }

    fn sample() -> Database {
        let mut db = Database::new("app");
        let mut table = Table::new(
            "users",
            vec![
                Column::new("id", ColumnType::Integer).primary_key(),
                Column::new("score", ColumnType::Real),
                Column::new("avatar", ColumnType::Blob),
            ],
        );
        table.rows.push(
            [
                ("id".to_string(), Value::Integer(1)),
                ("score".to_string(), Value::Real(0.1 + 0.2)),
                ("avatar".to_string(), Value::Blob(vec![0, 1, 2])),
            ]
            .into_iter()
            .collect(),
        );
        db.tables.insert("users".into(), table);
        db
    }

    #[test]
    fn save_then_load_is_exact() {
        let dir = tempdir().unwrap();
        let p = persistence(dir.path(), 1 << 20);
        let db = sample();
        p.save(&db).unwrap();
        assert!(p.exists("app"));
        assert_eq!(p.load("app").unwrap(), Some(db));
    }

    #[test]
    fn load_missing_is_none() {
        let dir = tempdir().unwrap();
        let p = persistence(dir.path(), 1 << 20);
        assert_eq!(p.load("nothing").unwrap(), None);
    }

    #[test]
    fn file_is_not_plaintext() {
        let dir = tempdir().unwrap();
        let p = persistence(dir.path(), 1 << 20);
        p.save(&sample()).unwrap();
        let raw = fs::read_to_string(p.path_for("app")).unwrap();
        assert!(raw.contains("ciphertext"));
        assert!(!raw.contains("users"));
    }

    #[test]
    fn size_limit_leaves_file_alone() {
        let dir = tempdir().unwrap();
        let p = persistence(dir.path(), 1 << 20);
        p.save(&Database::new("app")).unwrap();

        let tight = persistence(dir.path(), 64);
        let err = tight.save(&sample()).unwrap_err();
        assert!(matches!(err, CoreError::SizeLimitExceeded { limit: 64, .. }));
        assert!(tight.load("app").unwrap().unwrap().tables.is_empty());
    }

    #[test]
    fn listing_skips_foreign_files() {
        let dir = tempdir().unwrap();
        let p = persistence(dir.path(), 1 << 20);
        p.save(&Database::new("b")).unwrap();
        p.save(&Database::new("a")).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join("bad name.sdb"), "x").unwrap();
        fs::create_dir(dir.path().join("dir.sdb")).unwrap();

        assert_eq!(p.list_databases_on_disk().unwrap(), vec!["a", "b"]);
        p.delete("a").unwrap();
        p.delete("a").unwrap();
        assert_eq!(p.list_databases_on_disk().unwrap(), vec!["b"]);
    }

    #[test]
    fn missing_data_dir_lists_nothing() {
        let dir = tempdir().unwrap();
        let p = persistence(&dir.path().join("absent"), 1 << 20);
        assert!(p.list_databases_on_disk().unwrap().is_empty());
    }

    #[test]
    fn mismatched_file_is_invalid() {
        let dir = tempdir().unwrap();
        let p = persistence(dir.path(), 1 << 20);
        p.save(&Database::new("other")).unwrap();
        fs::rename(p.path_for("other"), p.path_for("app")).unwrap();
        assert!(matches!(p.load("app"), Err(CoreError::InvalidFormat { .. })));
    }

    #[test]
    fn wrong_secret_is_authentication_error() {
        let dir = tempdir().unwrap();
        persistence(dir.path(), 1 << 20).save(&sample()).unwrap();
        let files = Arc::new(AtomicFileStore::new(Cipher::new("other", KdfParams::light())));
        let err = Persistence::new(files, dir.path(), 1 << 20)
            .load("app")
            .unwrap_err();
        assert!(err.is_authentication());
    }
}
