//! Backup and restore.
//!
//! A backup snapshots every database file, byte for byte as it sits on disk
//! (still sealed), into a compressed [`BackupArchive`] together with a
//! [`BackupManifest`] of per-file SHA-256 hashes. Each backup gets a random
//! identifier and a one-time access password, both recorded in the
//! [`Registry`].
//!
//! Restoring never stops at the first bad file: every manifest entry is
//! checked on its own, and the attempt ends as success, partial or failed.
//!
//! ## Usage
//!
//! ```ignore
//! let manager = BackupManager::new(files, data_dir, backup_dir);
//! let info = manager.create_backup(&persistence.database_files()?, &mut registry)?;
//! let report = manager.restore_backup_by_id(&info.backup_id, &mut registry)?;
//! ```

mod archive;
mod manifest;

pub use archive::{validate_entry_name, ArchiveEntry, BackupArchive};
pub use manifest::{sha256_hex, BackupManifest, ManifestEntry, MANIFEST_FORMAT_VERSION, MANIFEST_NAME};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use sealdb_storage::AtomicFileStore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::validate_database_name;
use crate::error::{CoreError, CoreResult};
use crate::persistence::DATABASE_EXTENSION;
use crate::registry::{BackupRecord, BackupStatus, Registry, RestorationRecord, RestoreFailure};
use crate::types::now_millis;

/// Extension of archive files.
pub const ARCHIVE_EXTENSION: &str = "sdbk";
/// Length of generated backup passwords.
pub const PASSWORD_LEN: usize = 32;

/// Failure reason for a manifest entry with no archive entry.
pub const REASON_NOT_FOUND: &str = "not found in archive";
/// Failure reason for a file whose hash differs from the manifest.
pub const REASON_CHECKSUM: &str = "checksum mismatch";

/// A freshly created backup.
#[derive(Debug, Clone)]
pub struct BackupInfo {
    /// Backup identifier.
    pub backup_id: String,
    /// One-time access password. Only ever returned here.
    pub password: String,
    /// Where the archive was written.
    pub archive_path: PathBuf,
    /// What the archive contains.
    pub manifest: BackupManifest,
    /// Identifiers of older backups evicted to make room.
    pub evicted: Vec<String>,
}

/// Outcome of a restoration.
#[derive(Debug, Clone, PartialEq)]
pub struct RestorationReport {
    /// Restoration identifier.
    pub restoration_id: String,
    /// Backup the archive came from.
    pub backup_id: String,
    /// Overall status.
    pub status: BackupStatus,
    /// Files copied into the data directory.
    pub restored: Vec<String>,
    /// Files skipped, with reasons.
    pub failures: Vec<RestoreFailure>,
}

impl RestorationReport {
    /// Database names restored (file names without extension).
    #[must_use]
    pub fn restored_databases(&self) -> Vec<String> {
        self.restored
            .iter()
            .filter_map(|f| Path::new(f).file_stem()?.to_str().map(str::to_string))
            .collect()
    }
}

/// Creates and restores backup archives.
#[derive(Debug)]
pub struct BackupManager {
    files: Arc<AtomicFileStore>,
    data_dir: PathBuf,
    backup_dir: PathBuf,
}

impl BackupManager {
    /// Creates a manager restoring into `data_dir` and keeping archives in
    /// `backup_dir`.
    pub fn new(
        files: Arc<AtomicFileStore>,
        data_dir: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            files,
            data_dir: data_dir.into(),
            backup_dir: backup_dir.into(),
        }
    }

    /// Path of the archive for `backup_id`.
    #[must_use]
    pub fn archive_path(&self, backup_id: &str) -> PathBuf {
        self.backup_dir.join(format!("{backup_id}.{ARCHIVE_EXTENSION}"))
    }

    /// Archives `database_files` and registers the backup.
    ///
    /// Older backups beyond the registry's retention limit are evicted and
    /// their archives deleted.
    pub fn create_backup(
        &self,
        database_files: &[PathBuf],
        registry: &mut Registry,
    ) -> CoreResult<BackupInfo> {
        let backup_id = Uuid::new_v4().to_string();
        let created_at = now_millis();

        let mut archive = BackupArchive::new();
        let mut entries = Vec::with_capacity(database_files.len());
        for path in database_files {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    CoreError::invalid_format(format!("unusable file name: {}", path.display()))
                })?
                .to_string();
            let data = fs::read(path)?;
            entries.push(ManifestEntry::describe(&name, &data));
            archive.push(name, data)?;
        }

        let manifest = BackupManifest::new(&backup_id, created_at, entries);
        archive.push(MANIFEST_NAME, manifest.to_json()?)?;

        let archive_path = self.archive_path(&backup_id);
        self.files.write_bytes(&archive_path, &archive.encode()?)?;

        let password = generate_password();
        let record = BackupRecord {
            backup_id: backup_id.clone(),
            created_at,
            archive: format!("{backup_id}.{ARCHIVE_EXTENSION}"),
            password: Some(password.clone()),
            password_used_at: None,
            file_count: manifest.total_files,
            total_size: manifest.total_size,
            checksums: manifest
                .files
                .iter()
                .map(|f| (f.name.clone(), f.hash.clone()))
                .collect(),
            status: BackupStatus::Success,
            error: None,
        };

        let evicted = match registry.register_backup(record) {
            Ok(evicted) => evicted,
            Err(e) => {
                // An unregistered archive is unreachable; don't leave it behind.
                let _ = self.files.delete(&archive_path);
                return Err(e);
            }
        };
        let evicted = evicted
            .into_iter()
            .map(|old| {
                if let Err(e) = self.files.delete(&self.backup_dir.join(&old.archive)) {
                    warn!(backup_id = %old.backup_id, error = %e, "failed to delete evicted archive");
                }
                old.backup_id
            })
            .collect();

        info!(
            backup_id = %backup_id,
            files = manifest.total_files,
            bytes = manifest.total_size,
            "created backup"
        );
        Ok(BackupInfo {
            backup_id,
            password,
            archive_path,
            manifest,
            evicted,
        })
    }

    /// Restores the retained backup `backup_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the backup is not in the registry
    /// or its archive is missing.
    pub fn restore_backup_by_id(
        &self,
        backup_id: &str,
        registry: &mut Registry,
    ) -> CoreResult<RestorationReport> {
        let record = registry
            .backup(backup_id)
            .ok_or_else(|| CoreError::not_found("backup", backup_id))?;
        let path = self.backup_dir.join(&record.archive);
        let bytes = self
            .files
            .read_bytes(&path)?
            .ok_or_else(|| CoreError::not_found("backup archive", path.display().to_string()))?;
        self.restore_backup(&bytes, registry)
    }

    /// Restores database files from archive bytes.
    ///
    /// The archive is unpacked into a scratch directory; each manifest entry
    /// is then checked against its hash and copied into the data directory
    /// on a match. Individual failures are collected, never fatal. The
    /// attempt is recorded in the registry whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] if the archive framing or its
    /// manifest cannot be read, or an I/O error if the scratch directory
    /// cannot be prepared. The failed attempt is still recorded.
    pub fn restore_backup(
        &self,
        archive_bytes: &[u8],
        registry: &mut Registry,
    ) -> CoreResult<RestorationReport> {
        let restoration_id = Uuid::new_v4().to_string();

        let (archive, manifest) = match open_archive(archive_bytes) {
            Ok(opened) => opened,
            Err(e) => {
                warn!(restoration_id = %restoration_id, error = %e, "backup archive unreadable");
                record_failed(registry, restoration_id, String::new(), MANIFEST_NAME, &e)?;
                return Err(e);
            }
        };

        let scratch = match self.extract(&archive) {
            Ok(scratch) => scratch,
            Err(e) => {
                warn!(restoration_id = %restoration_id, error = %e, "backup extraction failed");
                let dir = self.backup_dir.display().to_string();
                record_failed(registry, restoration_id, manifest.backup_id, &dir, &e)?;
                return Err(e);
            }
        };

        let mut restored = Vec::new();
        let mut failures = Vec::new();
        for file in &manifest.files {
            match self.restore_file(scratch.path(), file) {
                Ok(()) => restored.push(file.name.clone()),
                Err(reason) => {
                    warn!(file = %file.name, reason = %reason, "skipped file during restore");
                    failures.push(RestoreFailure {
                        file: file.name.clone(),
                        reason,
                    });
                }
            }
        }

        let report = RestorationReport {
            restoration_id,
            backup_id: manifest.backup_id.clone(),
            status: BackupStatus::from_counts(restored.len(), failures.len()),
            restored,
            failures,
        };
        registry.record_restoration(RestorationRecord {
            restoration_id: report.restoration_id.clone(),
            backup_id: report.backup_id.clone(),
            restored_at: now_millis(),
            status: report.status,
            restored: report.restored.clone(),
            failures: report.failures.clone(),
        })?;

        info!(
            backup_id = %report.backup_id,
            status = ?report.status,
            restored = report.restored.len(),
            failed = report.failures.len(),
            "restored backup"
        );
        Ok(report)
    }

    /// Unpacks every non-manifest entry into a fresh scratch directory.
    fn extract(&self, archive: &BackupArchive) -> CoreResult<tempfile::TempDir> {
        fs::create_dir_all(&self.backup_dir)?;
        let scratch = tempfile::Builder::new()
            .prefix(".restore-")
            .tempdir_in(&self.backup_dir)?;
        for entry in &archive.entries {
            if entry.name != MANIFEST_NAME {
                fs::write(scratch.path().join(&entry.name), &entry.data)?;
            }
        }
        Ok(scratch)
    }

    /// Verifies and copies one extracted file. Errors are failure reasons.
    fn restore_file(&self, scratch: &Path, file: &ManifestEntry) -> Result<(), String> {
        if validate_entry_name(&file.name).is_err() || !is_database_file_name(&file.name) {
            return Err(format!("invalid file name {:?}", file.name));
        }

        let extracted = scratch.join(&file.name);
        let data = match fs::read(&extracted) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(REASON_NOT_FOUND.to_string())
            }
            Err(e) => return Err(e.to_string()),
        };
        if sha256_hex(&data) != file.hash {
            return Err(REASON_CHECKSUM.to_string());
        }

        self.files
            .copy_to(&extracted, &self.data_dir.join(&file.name))
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Decodes the container and its manifest.
///
/// A digest mismatch is only logged; the per-file hashes decide which
/// entries are usable.
fn open_archive(bytes: &[u8]) -> CoreResult<(BackupArchive, BackupManifest)> {
    let (archive, digest_ok) = BackupArchive::decode_lenient(bytes)?;
    let manifest_bytes = archive
        .get(MANIFEST_NAME)
        .ok_or_else(|| CoreError::invalid_format("archive has no manifest"))?;
    let manifest = BackupManifest::from_json(manifest_bytes)?;
    if !digest_ok {
        warn!(backup_id = %manifest.backup_id, "archive digest mismatch, checking files one by one");
    }
    Ok((archive, manifest))
}

fn record_failed(
    registry: &mut Registry,
    restoration_id: String,
    backup_id: String,
    file: &str,
    error: &CoreError,
) -> CoreResult<()> {
    registry.record_restoration(RestorationRecord {
        restoration_id,
        backup_id,
        restored_at: now_millis(),
        status: BackupStatus::Failed,
        restored: Vec::new(),
        failures: vec![RestoreFailure {
            file: file.to_string(),
            reason: error.to_string(),
        }],
    })
}

fn is_database_file_name(name: &str) -> bool {
    name.strip_suffix(DATABASE_EXTENSION)
        .and_then(|stem| stem.strip_suffix('.'))
        .is_some_and(|stem| validate_database_name(stem).is_ok())
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LEN)
        .map(char::from)
        .collect()
}
