//! System registry.
//!
//! A sealed record store holding backup metadata, one-time backup passwords
//! and restoration history. The file on disk is a JSON wrapper:
//!
//! ```text
//! { "format": "sealdb-registry", "version": 1, "encrypted": <hex>,
//!   "nonce": <hex>, "tag": <hex>, "salt": <hex> }
//! ```
//!
//! The decrypted body is [`RegistryData`]. Every change is written back
//! immediately through the atomic file store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sealdb_storage::{AtomicFileStore, EncryptedPayload};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::types::now_millis;

/// Format tag of the registry wrapper and body.
pub const REGISTRY_FORMAT: &str = "sealdb-registry";
/// Current registry format version.
pub const REGISTRY_VERSION: u32 = 1;
/// Restoration records kept; older ones are dropped.
pub const MAX_RESTORATIONS: usize = 100;

/// Outcome of a backup or restoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    /// Everything succeeded.
    Success,
    /// Some files failed, others succeeded.
    Partial,
    /// Nothing succeeded.
    Failed,
}

impl BackupStatus {
    /// Derives the status from success and failure counts.
    #[must_use]
    pub fn from_counts(succeeded: usize, failed: usize) -> Self {
        match (succeeded, failed) {
            (_, 0) => Self::Success,
            (0, _) => Self::Failed,
            _ => Self::Partial,
        }
    }
}

/// A retained backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Backup identifier.
    pub backup_id: String,
    /// Creation time (Unix ms).
    pub created_at: u64,
    /// Archive file name inside the backup directory.
    pub archive: String,
    /// One-time access password. Cleared once used.
    pub password: Option<String>,
    /// When the password was consumed (Unix ms).
    #[serde(default)]
    pub password_used_at: Option<u64>,
    /// Number of database files in the archive.
    pub file_count: usize,
    /// Total size of those files in bytes.
    pub total_size: u64,
    /// SHA-256 (hex) of each archived file, by name.
    pub checksums: BTreeMap<String, String>,
    /// Outcome.
    pub status: BackupStatus,
    /// Failure detail, if any.
    #[serde(default)]
    pub error: Option<String>,
}

impl BackupRecord {
    /// The record without its password.
    #[must_use]
    pub fn summary(&self) -> BackupSummary {
        BackupSummary {
            backup_id: self.backup_id.clone(),
            created_at: self.created_at,
            file_count: self.file_count,
            total_size: self.total_size,
            status: self.status,
            password_used: self.password.is_none(),
        }
    }
}

/// Listing view of a backup, safe to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupSummary {
    /// Backup identifier.
    pub backup_id: String,
    /// Creation time (Unix ms).
    pub created_at: u64,
    /// Number of database files archived.
    pub file_count: usize,
    /// Total size of those files in bytes.
    pub total_size: u64,
    /// Outcome.
    pub status: BackupStatus,
    /// The one-time password has been consumed.
    pub password_used: bool,
}

/// A file that could not be restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreFailure {
    /// File name from the manifest.
    pub file: String,
    /// Why it was skipped.
    pub reason: String,
}

/// A restoration attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestorationRecord {
    /// Restoration identifier.
    pub restoration_id: String,
    /// Backup the archive claims to be.
    pub backup_id: String,
    /// When the attempt finished (Unix ms).
    pub restored_at: u64,
    /// Outcome.
    pub status: BackupStatus,
    /// Files copied into the data directory.
    pub restored: Vec<String>,
    /// Files skipped, with reasons.
    pub failures: Vec<RestoreFailure>,
}

/// Decrypted registry body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryData {
    /// Always [`REGISTRY_FORMAT`].
    pub format: String,
    /// Retained backups, oldest first.
    pub backups: Vec<BackupRecord>,
    /// Restoration attempts, oldest first.
    pub restorations: Vec<RestorationRecord>,
    /// Retention limit for `backups`.
    pub max_backups: usize,
    /// Most recently registered backup.
    pub last_backup_id: Option<String>,
    /// Most recently recorded restoration.
    pub last_restoration_id: Option<String>,
}

impl RegistryData {
    fn empty(max_backups: usize) -> Self {
        Self {
            format: REGISTRY_FORMAT.to_string(),
            backups: Vec::new(),
            restorations: Vec::new(),
            max_backups,
            last_backup_id: None,
            last_restoration_id: None,
        }
    }

    /// Drops the oldest backups over the retention limit.
    fn evict_excess(&mut self) -> Vec<BackupRecord> {
        let excess = self.backups.len().saturating_sub(self.max_backups);
        self.backups.drain(..excess).collect()
    }
}

#[derive(Serialize, Deserialize)]
struct SealedRegistry {
    format: String,
    version: u32,
    encrypted: String,
    nonce: String,
    tag: String,
    salt: String,
}

/// The system registry.
#[derive(Debug)]
pub struct Registry {
    files: Arc<AtomicFileStore>,
    path: PathBuf,
    data: RegistryData,
}

impl Registry {
    /// Opens the registry at `path`, or starts an empty one.
    ///
    /// `max_backups` replaces the stored retention limit; if the stored
    /// records exceed it, the oldest are evicted and returned so their
    /// archives can be removed.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Validation`] if `max_backups` is zero
    /// - [`CoreError::InvalidFormat`] if the wrapper or body has the wrong
    ///   format tag or version
    /// - [`CoreError::Storage`] if the body cannot be decrypted
    pub fn open(
        files: Arc<AtomicFileStore>,
        path: impl Into<PathBuf>,
        max_backups: usize,
    ) -> CoreResult<(Self, Vec<BackupRecord>)> {
        if max_backups == 0 {
            return Err(CoreError::validation("max_backups must be at least 1"));
        }
        let path = path.into();

        let (data, fresh) = match files.read_bytes(&path)? {
            Some(raw) => (unseal(&files, &raw)?, false),
            None => (RegistryData::empty(max_backups), true),
        };

        let mut registry = Self { files, path, data };
        let mut next = registry.data.clone();
        let changed = next.max_backups != max_backups;
        next.max_backups = max_backups;
        let evicted = next.evict_excess();
        // Written on first open so a wrong secret is caught at the next one.
        if fresh || changed || !evicted.is_empty() {
            registry.commit(next)?;
        } else {
            registry.data = next;
        }
        for record in &evicted {
            warn!(backup_id = %record.backup_id, "evicted backup over retention limit");
        }

        debug!(
            path = %registry.path.display(),
            backups = registry.data.backups.len(),
            "opened registry"
        );
        Ok((registry, evicted))
    }

    /// Location of the registry file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The decrypted contents.
    #[must_use]
    pub fn data(&self) -> &RegistryData {
        &self.data
    }

    /// Retained backups, oldest first.
    #[must_use]
    pub fn backups(&self) -> &[BackupRecord] {
        &self.data.backups
    }

    /// Restoration attempts, oldest first.
    #[must_use]
    pub fn restorations(&self) -> &[RestorationRecord] {
        &self.data.restorations
    }

    /// Looks up a retained backup.
    #[must_use]
    pub fn backup(&self, backup_id: &str) -> Option<&BackupRecord> {
        self.data.backups.iter().find(|b| b.backup_id == backup_id)
    }

    /// Adds a backup record and persists.
    ///
    /// Returns the records evicted to stay within the retention limit,
    /// oldest first. If the write fails the registry is left unchanged and
    /// nothing is evicted.
    pub fn register_backup(&mut self, record: BackupRecord) -> CoreResult<Vec<BackupRecord>> {
        let mut next = self.data.clone();
        next.last_backup_id = Some(record.backup_id.clone());
        next.backups.push(record);
        let evicted = next.evict_excess();
        self.commit(next)?;
        for record in &evicted {
            warn!(backup_id = %record.backup_id, "evicted backup over retention limit");
        }
        Ok(evicted)
    }

    /// Appends a restoration record and persists.
    pub fn record_restoration(&mut self, record: RestorationRecord) -> CoreResult<()> {
        let mut next = self.data.clone();
        next.last_restoration_id = Some(record.restoration_id.clone());
        next.restorations.push(record);
        let excess = next.restorations.len().saturating_sub(MAX_RESTORATIONS);
        next.restorations.drain(..excess);
        self.commit(next)
    }

    /// Checks a backup's one-time password and consumes it on success.
    ///
    /// Returns `false` for a wrong or already used password.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the backup is not retained.
    pub fn consume_password(&mut self, backup_id: &str, password: &str) -> CoreResult<bool> {
        let mut next = self.data.clone();
        let record = next
            .backups
            .iter_mut()
            .find(|b| b.backup_id == backup_id)
            .ok_or_else(|| CoreError::not_found("backup", backup_id))?;

        let matches = record
            .password
            .as_deref()
            .is_some_and(|expected| bool::from(expected.as_bytes().ct_eq(password.as_bytes())));
        if !matches {
            return Ok(false);
        }

        record.password = None;
        record.password_used_at = Some(now_millis());
        self.commit(next)?;
        Ok(true)
    }

    /// Persists `next` and adopts it only once it is on disk.
    fn commit(&mut self, next: RegistryData) -> CoreResult<()> {
        self.persist(&next)?;
        self.data = next;
        Ok(())
    }

    fn persist(&self, data: &RegistryData) -> CoreResult<()> {
        let body = serde_json::to_vec(data)?;
        let payload = self.files.cipher().encrypt(&body)?;
        let sealed = SealedRegistry {
            format: REGISTRY_FORMAT.to_string(),
            version: REGISTRY_VERSION,
            encrypted: payload.ciphertext,
            nonce: payload.nonce,
            tag: payload.tag,
            salt: payload.salt,
        };
        self.files
            .write_bytes(&self.path, &serde_json::to_vec_pretty(&sealed)?)?;
        Ok(())
    }
}

fn unseal(files: &AtomicFileStore, raw: &[u8]) -> CoreResult<RegistryData> {
    let sealed: SealedRegistry = serde_json::from_slice(raw)?;
    if sealed.format != REGISTRY_FORMAT {
        return Err(CoreError::invalid_format(format!(
            "registry format {:?}",
            sealed.format
        )));
    }
    if sealed.version != REGISTRY_VERSION {
        return Err(CoreError::invalid_format(format!(
            "registry version {} is not supported",
            sealed.version
        )));
    }

    let body = files.cipher().decrypt(&EncryptedPayload {
        ciphertext: sealed.encrypted,
        nonce: sealed.nonce,
        tag: sealed.tag,
        salt: sealed.salt,
    })?;
    let data: RegistryData = serde_json::from_slice(&body)?;
    if data.format != REGISTRY_FORMAT {
        return Err(CoreError::invalid_format("registry body has the wrong format tag"));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealdb_storage::{Cipher, KdfParams};
    use std::fs;
    use tempfile::tempdir;

    fn files(secret: &str) -> Arc<AtomicFileStore> {
        Arc::new(AtomicFileStore::new(Cipher::new(secret, KdfParams::light())))
    }

    fn record(id: &str) -> BackupRecord {
        BackupRecord {
            backup_id: id.to_string(),
            created_at: now_millis(),
            archive: format!("{id}.sdbk"),
            password: Some(format!("pw-{id}")),
            password_used_at: None,
            file_count: 1,
            total_size: 10,
            checksums: BTreeMap::from([("app.sdb".to_string(), "00".to_string())]),
            status: BackupStatus::Success,
            error: None,
        }
    }

    #[test]
    fn status_from_counts() {
        assert_eq!(BackupStatus::from_counts(2, 0), BackupStatus::Success);
        assert_eq!(BackupStatus::from_counts(0, 0), BackupStatus::Success);
        assert_eq!(BackupStatus::from_counts(1, 1), BackupStatus::Partial);
        assert_eq!(BackupStatus::from_counts(0, 2), BackupStatus::Failed);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let (mut registry, _) = Registry::open(files("s"), &path, 3).unwrap();
        registry.register_backup(record("a")).unwrap();

        let (reopened, evicted) = Registry::open(files("s"), &path, 3).unwrap();
        assert!(evicted.is_empty());
        assert_eq!(reopened.backups(), registry.backups());
        assert_eq!(reopened.data().last_backup_id.as_deref(), Some("a"));
    }

    #[test]
    fn file_is_sealed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let (mut registry, _) = Registry::open(files("s"), &path, 3).unwrap();
        registry.register_backup(record("a")).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["format"], REGISTRY_FORMAT);
        assert_eq!(raw["version"], REGISTRY_VERSION);
        for field in ["encrypted", "nonce", "tag", "salt"] {
            assert!(raw[field].is_string(), "{field}");
        }
        assert!(!std::fs::read_to_string(&path).unwrap().contains("pw-a"));
    }

    #[test]
    fn evicts_oldest_first() {
        let dir = tempdir().unwrap();
        let (mut registry, _) =
            Registry::open(files("s"), dir.path().join("registry.json"), 2).unwrap();
        assert!(registry.register_backup(record("a")).unwrap().is_empty());
        assert!(registry.register_backup(record("b")).unwrap().is_empty());
        let evicted = registry.register_backup(record("c")).unwrap();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].backup_id, "a");
        let ids: Vec<_> = registry.backups().iter().map(|b| b.backup_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn lowering_limit_on_open_evicts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let (mut registry, _) = Registry::open(files("s"), &path, 5).unwrap();
        for id in ["a", "b", "c"] {
            registry.register_backup(record(id)).unwrap();
        }
        let (registry, evicted) = Registry::open(files("s"), &path, 1).unwrap();
        assert_eq!(evicted.len(), 2);
        assert_eq!(registry.backups()[0].backup_id, "c");
    }

    #[test]
    fn zero_limit_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Registry::open(files("s"), dir.path().join("r.json"), 0),
            Err(CoreError::Validation { .. })
        ));
    }

    #[test]
    fn password_is_one_time() {
        let dir = tempdir().unwrap();
        let (mut registry, _) =
            Registry::open(files("s"), dir.path().join("registry.json"), 3).unwrap();
        registry.register_backup(record("a")).unwrap();

        assert!(!registry.consume_password("a", "wrong").unwrap());
        assert!(registry.consume_password("a", "pw-a").unwrap());
        assert!(!registry.consume_password("a", "pw-a").unwrap());
        assert!(registry.backup("a").unwrap().password_used_at.is_some());
        assert!(matches!(
            registry.consume_password("zzz", "x"),
            Err(CoreError::NotFound { kind: "backup", .. })
        ));
    }

    #[test]
    fn failed_write_leaves_registry_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let (mut registry, _) = Registry::open(files("s"), &path, 1).unwrap();
        registry.register_backup(record("a")).unwrap();

        // A directory where the temp file goes makes every write fail.
        let blocker = sealdb_storage::temp_path_for(&path);
        fs::create_dir(&blocker).unwrap();

        assert!(registry.register_backup(record("b")).is_err());
        assert_eq!(registry.backups().len(), 1);
        assert_eq!(registry.backups()[0].backup_id, "a");
        assert_eq!(registry.data().last_backup_id.as_deref(), Some("a"));

        assert!(registry.consume_password("a", "pw-a").is_err());
        assert!(registry.backup("a").unwrap().password.is_some());

        let attempt = RestorationRecord {
            restoration_id: "r".into(),
            backup_id: "a".into(),
            restored_at: now_millis(),
            status: BackupStatus::Success,
            restored: vec![],
            failures: vec![],
        };
        assert!(registry.record_restoration(attempt.clone()).is_err());
        assert!(registry.restorations().is_empty());

        fs::remove_dir(&blocker).unwrap();
        registry.record_restoration(attempt).unwrap();
        let (reopened, _) = Registry::open(files("s"), &path, 1).unwrap();
        assert_eq!(reopened.data(), registry.data());
    }

    #[test]
    fn restorations_are_capped() {
        let dir = tempdir().unwrap();
        let (mut registry, _) =
            Registry::open(files("s"), dir.path().join("registry.json"), 3).unwrap();
        for i in 0..MAX_RESTORATIONS + 2 {
            registry
                .record_restoration(RestorationRecord {
                    restoration_id: i.to_string(),
                    backup_id: "a".into(),
                    restored_at: now_millis(),
                    status: BackupStatus::Success,
                    restored: vec![],
                    failures: vec![],
                })
                .unwrap();
        }
        assert_eq!(registry.restorations().len(), MAX_RESTORATIONS);
        assert_eq!(registry.restorations()[0].restoration_id, "2");
    }

    #[test]
    fn wrong_secret_fails_to_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let (mut registry, _) = Registry::open(files("s"), &path, 3).unwrap();
        registry.register_backup(record("a")).unwrap();
        let err = Registry::open(files("other"), &path, 3).unwrap_err();
        assert!(err.is_authentication());
    }
}
