//! Store configuration.

use std::fmt;
use std::path::PathBuf;

use sealdb_storage::KdfParams;
use zeroize::Zeroizing;

use crate::error::{CoreError, CoreResult};

/// Default cap on a serialized database: 10 MiB.
pub const DEFAULT_MAX_DATABASE_SIZE: u64 = 10 * 1024 * 1024;
/// Default number of retained backups.
pub const DEFAULT_MAX_BACKUPS: usize = 10;
/// Registry file name inside the system directory.
pub const REGISTRY_FILE: &str = "registry.json";

/// Configuration for opening a [`Store`](crate::Store).
#[derive(Clone)]
pub struct Config {
    /// Directory holding one file per database.
    pub data_dir: PathBuf,

    /// Directory for backup archives. Defaults to `<data_dir>/backups`.
    pub backup_dir: Option<PathBuf>,

    /// Directory for the system registry. Defaults to `<data_dir>/.system`.
    pub system_dir: Option<PathBuf>,

    /// Passphrase every file is sealed under.
    secret: Zeroizing<String>,

    /// Largest serialized database accepted on save, in bytes.
    pub max_database_size: u64,

    /// Backups retained before the oldest is evicted.
    pub max_backups: usize,

    /// Key-derivation cost. Files can only be read with the profile they
    /// were written with.
    pub kdf: KdfParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            backup_dir: None,
            system_dir: None,
            secret: Zeroizing::new(String::new()),
            max_database_size: DEFAULT_MAX_DATABASE_SIZE,
            max_backups: DEFAULT_MAX_BACKUPS,
            kdf: KdfParams::default(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("data_dir", &self.data_dir)
            .field("backup_dir", &self.backup_dir)
            .field("system_dir", &self.system_dir)
            .field("secret", &"[REDACTED]")
            .field("max_database_size", &self.max_database_size)
            .field("max_backups", &self.max_backups)
            .field("kdf", &self.kdf)
            .finish()
    }
}

impl Config {
    /// Creates a configuration rooted at `data_dir` with default limits.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the passphrase.
    #[must_use]
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Zeroizing::new(secret.into());
        self
    }

    /// Sets the backup directory.
    #[must_use]
    pub fn backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    /// Sets the system directory.
    #[must_use]
    pub fn system_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.system_dir = Some(dir.into());
        self
    }

    /// Sets the maximum serialized database size.
    #[must_use]
    pub fn max_database_size(mut self, bytes: u64) -> Self {
        self.max_database_size = bytes;
        self
    }

    /// Sets the number of retained backups.
    #[must_use]
    pub fn max_backups(mut self, count: usize) -> Self {
        self.max_backups = count;
        self
    }

    /// Sets the key-derivation profile.
    #[must_use]
    pub fn kdf(mut self, params: KdfParams) -> Self {
        self.kdf = params;
        self
    }

    /// The passphrase bytes.
    pub(crate) fn secret_bytes(&self) -> &[u8] {
        self.secret.as_bytes()
    }

    /// Backup directory after defaults.
    #[must_use]
    pub fn resolved_backup_dir(&self) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("backups"))
    }

    /// System directory after defaults.
    #[must_use]
    pub fn resolved_system_dir(&self) -> PathBuf {
        self.system_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join(".system"))
    }

    /// Location of the registry file.
    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        self.resolved_system_dir().join(REGISTRY_FILE)
    }

    /// Checks that the configuration can open a store.
    pub fn validate(&self) -> CoreResult<()> {
        if self.secret.is_empty() {
            return Err(CoreError::validation("secret must not be empty"));
        }
        if self.max_backups == 0 {
            return Err(CoreError::validation("max_backups must be at least 1"));
        }
        if self.max_database_size == 0 {
            return Err(CoreError::validation("max_database_size must be positive"));
        }
        Ok(())
    }
}
