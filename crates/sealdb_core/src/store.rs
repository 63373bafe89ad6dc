//! The store: engine context tying the engine, persistence, backups and
//! registry together.

use std::fs;
use std::sync::Arc;

use parking_lot::Mutex;
use sealdb_storage::{AtomicFileStore, Cipher};
use tracing::{debug, info, warn};

use crate::backup::{BackupInfo, BackupManager, RestorationReport};
use crate::config::Config;
use crate::engine::{validate_database_name, Engine};
use crate::error::{CoreError, CoreResult};
use crate::persistence::Persistence;
use crate::registry::{BackupSummary, Registry, RestorationRecord};
use crate::types::{Column, Database, QueryResult, Value};

/// An open SealDB data directory.
///
/// `Store` is the entry point for callers. Databases are loaded lazily on
/// first use and written back after every mutating call. Statement
/// execution is serialized behind a single lock, so a mutation is fully
/// applied (or fully rejected) before any other call observes it.
///
/// # Example
///
/// ```rust,no_run
/// use sealdb_core::{Config, Store};
///
/// let store = Store::open(Config::new("data").secret("passphrase"))?;
/// store.create_database("app")?;
/// store.execute_statement("app", "CREATE TABLE users (id INTEGER PRIMARY KEY, nome TEXT)")?;
/// store.execute_statement("app", "INSERT INTO users (nome) VALUES ('Goku')")?;
/// let result = store.execute_statement("app", "SELECT * FROM users WHERE nome = 'Goku'")?;
/// assert_eq!(result.rows().len(), 1);
/// # Ok::<(), sealdb_core::CoreError>(())
/// ```
///
/// # Recovery
///
/// If writing a database back fails (for example because it outgrew
/// `max_database_size`), the in-memory copy is discarded and the error
/// returned. The next call reloads the last state that reached disk.
pub struct Store {
    config: Config,
    persistence: Persistence,
    backups: BackupManager,
    engine: Mutex<Engine>,
    registry: Mutex<Registry>,
}

impl Store {
    /// Opens (or initializes) the data directory described by `config`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Validation`] if the configuration is unusable
    /// - [`CoreError::Storage`] if the registry exists but cannot be
    ///   decrypted with the configured secret
    pub fn open(config: Config) -> CoreResult<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let cipher = Cipher::new(config.secret_bytes(), config.kdf);
        let files = Arc::new(AtomicFileStore::new(cipher));

        let backup_dir = config.resolved_backup_dir();
        let backups = BackupManager::new(files.clone(), &config.data_dir, &backup_dir);
        let (registry, evicted) =
            Registry::open(files.clone(), config.registry_path(), config.max_backups)?;
        for record in evicted {
            if let Err(e) = files.delete(&backup_dir.join(&record.archive)) {
                warn!(backup_id = %record.backup_id, error = %e, "failed to delete evicted archive");
            }
        }

        let persistence = Persistence::new(files, &config.data_dir, config.max_database_size);

        info!(data_dir = %config.data_dir.display(), "opened store");
        Ok(Self {
            config,
            persistence,
            backups,
            engine: Mutex::new(Engine::new()),
            registry: Mutex::new(registry),
        })
    }

    /// The configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Parses and executes one statement against database `db_name`.
    ///
    /// Mutating statements are written back before returning.
    pub fn execute_statement(&self, db_name: &str, sql: &str) -> CoreResult<QueryResult> {
        let statement = crate::sql::parse(sql)?;
        let mut engine = self.engine.lock();
        self.ensure_loaded(&mut engine, db_name)?;

        if statement.is_mutating() {
            let result = engine.execute(db_name, statement)?;
            self.write_back(&mut engine, db_name)?;
            Ok(result)
        } else {
            engine.execute(db_name, statement)
        }
    }

    /// Creates an empty database and persists it immediately.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Conflict`] if the database is resident or has a
    /// file on disk.
    pub fn create_database(&self, name: &str) -> CoreResult<()> {
        validate_database_name(name)?;
        let mut engine = self.engine.lock();
        if engine.contains(name) || self.persistence.exists(name) {
            return Err(CoreError::conflict("database", name));
        }
        engine.create_database(name)?;
        self.write_back(&mut engine, name)
    }

    /// Deletes a database from memory and disk.
    pub fn delete_database(&self, name: &str) -> CoreResult<()> {
        validate_database_name(name)?;
        let mut engine = self.engine.lock();
        if !engine.contains(name) && !self.persistence.exists(name) {
            return Err(CoreError::not_found("database", name));
        }
        // The resident copy stays if the file cannot be removed.
        self.persistence.delete(name)?;
        engine.evict(name);
        info!(database = name, "deleted database");
        Ok(())
    }

    /// Runs a `CREATE TABLE` statement.
    pub fn create_table(&self, db_name: &str, sql: &str) -> CoreResult<QueryResult> {
        self.mutate(db_name, |engine| engine.create_table(db_name, sql))
    }

    /// Creates a table from column definitions.
    pub fn create_table_from_columns(
        &self,
        db_name: &str,
        table: &str,
        columns: Vec<Column>,
    ) -> CoreResult<QueryResult> {
        self.mutate(db_name, |engine| {
            engine.create_table_from_columns(db_name, table, columns)
        })
    }

    /// Drops a table.
    pub fn drop_table(&self, db_name: &str, table: &str) -> CoreResult<QueryResult> {
        self.mutate(db_name, |engine| engine.drop_table(db_name, table))
    }

    /// Inserts one row from `(column, value)` pairs.
    pub fn insert_row(
        &self,
        db_name: &str,
        table: &str,
        values: Vec<(String, Value)>,
    ) -> CoreResult<QueryResult> {
        self.mutate(db_name, |engine| engine.insert_row(db_name, table, values))
    }

    /// Returns a snapshot of a database.
    pub fn database(&self, name: &str) -> CoreResult<Database> {
        let mut engine = self.engine.lock();
        self.ensure_loaded(&mut engine, name)?;
        engine
            .database(name)
            .cloned()
            .ok_or_else(|| CoreError::not_found("database", name))
    }

    /// (Re)loads a database from disk, replacing any resident copy.
    pub fn load_database(&self, name: &str) -> CoreResult<()> {
        let database = self
            .persistence
            .load(name)?
            .ok_or_else(|| CoreError::not_found("database", name))?;
        self.engine.lock().install(database);
        Ok(())
    }

    /// Writes a resident database to disk.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the database is not resident.
    pub fn save_database(&self, name: &str) -> CoreResult<()> {
        let mut engine = self.engine.lock();
        if !engine.contains(name) {
            return Err(CoreError::not_found("database", name));
        }
        self.write_back(&mut engine, name)
    }

    /// Names of databases with a file in the data directory, sorted.
    pub fn list_databases_on_disk(&self) -> CoreResult<Vec<String>> {
        self.persistence.list_databases_on_disk()
    }

    /// Archives every database file.
    ///
    /// The returned [`BackupInfo`] carries the one-time password; it is not
    /// retrievable afterwards.
    pub fn create_backup(&self) -> CoreResult<BackupInfo> {
        // Hold the engine lock so no write-back lands mid-snapshot.
        let _engine = self.engine.lock();
        let files = self.persistence.database_files()?;
        let mut registry = self.registry.lock();
        self.backups.create_backup(&files, &mut registry)
    }

    /// Restores database files from archive bytes.
    ///
    /// Restored databases are dropped from memory so the next call reads
    /// the restored file.
    pub fn restore_backup(&self, archive: &[u8]) -> CoreResult<RestorationReport> {
        self.restore_with(|backups, registry| backups.restore_backup(archive, registry))
    }

    /// Restores a retained backup by identifier.
    pub fn restore_backup_by_id(&self, backup_id: &str) -> CoreResult<RestorationReport> {
        self.restore_with(|backups, registry| backups.restore_backup_by_id(backup_id, registry))
    }

    /// Retained backups, oldest first, without passwords.
    #[must_use]
    pub fn list_backups(&self) -> Vec<BackupSummary> {
        self.registry
            .lock()
            .backups()
            .iter()
            .map(|b| b.summary())
            .collect()
    }

    /// Restoration history, oldest first.
    #[must_use]
    pub fn list_restorations(&self) -> Vec<RestorationRecord> {
        self.registry.lock().restorations().to_vec()
    }

    /// Checks a backup's one-time password, consuming it on success.
    pub fn verify_backup_password(&self, backup_id: &str, password: &str) -> CoreResult<bool> {
        self.registry.lock().consume_password(backup_id, password)
    }

    /// Runs a restore and drops stale resident copies.
    ///
    /// On error, files may already have been replaced (for instance when
    /// only the registry write failed), so every resident database is
    /// dropped and reloaded from disk on next use.
    fn restore_with(
        &self,
        run: impl FnOnce(&BackupManager, &mut Registry) -> CoreResult<RestorationReport>,
    ) -> CoreResult<RestorationReport> {
        let mut engine = self.engine.lock();
        let result = {
            let mut registry = self.registry.lock();
            run(&self.backups, &mut *registry)
        };
        let stale = match &result {
            Ok(report) => report.restored_databases(),
            Err(_) => engine.database_names(),
        };
        for name in stale {
            if engine.evict(&name).is_some() {
                debug!(database = %name, "evicted restored database");
            }
        }
        result
    }

    /// Runs `op` against a loaded database and writes the result back.
    fn mutate<T>(
        &self,
        db_name: &str,
        op: impl FnOnce(&mut Engine) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut engine = self.engine.lock();
        self.ensure_loaded(&mut engine, db_name)?;
        let out = op(&mut engine)?;
        self.write_back(&mut engine, db_name)?;
        Ok(out)
    }

    fn ensure_loaded(&self, engine: &mut Engine, name: &str) -> CoreResult<()> {
        if engine.contains(name) {
            return Ok(());
        }
        match self.persistence.load(name)? {
            Some(database) => {
                engine.install(database);
                Ok(())
            }
            None => Err(CoreError::not_found("database", name)),
        }
    }

    /// Saves `name`, evicting it from memory if the save fails.
    fn write_back(&self, engine: &mut Engine, name: &str) -> CoreResult<()> {
        let Some(database) = engine.database(name) else {
            return Err(CoreError::not_found("database", name));
        };
        if let Err(e) = self.persistence.save(database) {
            warn!(database = name, error = %e, "write-back failed, discarding in-memory copy");
            engine.evict(name);
            return Err(e);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealdb_storage::KdfParams;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> Config {
        Config::new(dir).secret("test-secret").kdf(KdfParams::light())
    }

    #[test]
    fn open_rejects_bad_config() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Store::open(Config::new(dir.path())),
            Err(CoreError::Validation { .. })
        ));
    }

    #[test]
    fn create_database_conflicts_with_disk() {
        let dir = tempdir().unwrap();
        Store::open(config(dir.path())).unwrap().create_database("app").unwrap();

        let store = Store::open(config(dir.path())).unwrap();
        assert!(matches!(
            store.create_database("app"),
            Err(CoreError::Conflict { .. })
        ));
    }

    #[test]
    fn lazy_load_after_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = Store::open(config(dir.path())).unwrap();
            store.create_database("app").unwrap();
            store
                .execute_statement("app", "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)")
                .unwrap();
            store
                .execute_statement("app", "INSERT INTO t (v) VALUES ('x')")
                .unwrap();
        }
        let store = Store::open(config(dir.path())).unwrap();
        let result = store.execute_statement("app", "SELECT v FROM t").unwrap();
        assert_eq!(result.rows()[0]["v"], Value::Text("x".into()));
    }

    #[test]
    fn failed_save_discards_memory_copy() {
        let dir = tempdir().unwrap();
        let store = Store::open(config(dir.path()).max_database_size(1024)).unwrap();
        store.create_database("app").unwrap();
        store
            .execute_statement("app", "CREATE TABLE t (v TEXT)")
            .unwrap();

        let big = "x".repeat(2000);
        let err = store
            .execute_statement("app", &format!("INSERT INTO t (v) VALUES ('{big}')"))
            .unwrap_err();
        assert!(matches!(err, CoreError::SizeLimitExceeded { .. }));

        let result = store.execute_statement("app", "SELECT * FROM t").unwrap();
        assert!(result.rows().is_empty());
    }

    #[test]
    fn delete_database_removes_file() {
        let dir = tempdir().unwrap();
        let store = Store::open(config(dir.path())).unwrap();
        store.create_database("app").unwrap();
        assert_eq!(store.list_databases_on_disk().unwrap(), vec!["app"]);
        store.delete_database("app").unwrap();
        assert!(store.list_databases_on_disk().unwrap().is_empty());
        assert!(matches!(
            store.delete_database("app"),
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.execute_statement("app", "SELECT * FROM t"),
            Err(CoreError::NotFound { kind: "database", .. })
        ));
    }

    #[test]
    fn failed_delete_keeps_database() {
        let dir = tempdir().unwrap();
        let store = Store::open(config(dir.path())).unwrap();
        store.create_database("app").unwrap();
        store
            .execute_statement("app", "CREATE TABLE t (id INTEGER PRIMARY KEY)")
            .unwrap();

        // A non-empty directory in place of the file cannot be unlinked.
        let path = dir.path().join("app.sdb");
        fs::remove_file(&path).unwrap();
        fs::create_dir_all(path.join("pinned")).unwrap();

        assert!(store.delete_database("app").is_err());
        assert!(store.execute_statement("app", "SELECT * FROM t").is_ok());
    }

    #[test]
    fn load_database_discards_unsaved_state() {
        let dir = tempdir().unwrap();
        let store = Store::open(config(dir.path())).unwrap();
        store.create_database("app").unwrap();
        store.load_database("app").unwrap();
        assert!(matches!(
            store.load_database("ghost"),
            Err(CoreError::NotFound { .. })
        ));
        store.save_database("app").unwrap();
        assert!(matches!(
            store.save_database("ghost"),
            Err(CoreError::NotFound { .. })
        ));
    }
}
