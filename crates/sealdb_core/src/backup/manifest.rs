//! Backup manifest.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};

/// Name of the manifest entry inside an archive.
pub const MANIFEST_NAME: &str = "manifest.json";
/// Current manifest format version.
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// Hex-encoded SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// One archived file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// File name inside the data directory.
    pub name: String,
    /// SHA-256 of the file, hex.
    pub hash: String,
    /// File size in bytes.
    pub size: u64,
}

impl ManifestEntry {
    /// Describes `data` stored under `name`.
    pub fn describe(name: impl Into<String>, data: &[u8]) -> Self {
        Self {
            name: name.into(),
            hash: sha256_hex(data),
            size: data.len() as u64,
        }
    }
}

/// Contents listing of a backup archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    /// Backup identifier.
    pub backup_id: String,
    /// Creation time (Unix ms).
    pub created_at: u64,
    /// Manifest format version.
    pub format_version: u32,
    /// Archived files.
    pub files: Vec<ManifestEntry>,
    /// Number of files.
    pub total_files: usize,
    /// Sum of file sizes.
    pub total_size: u64,
}

impl BackupManifest {
    /// Builds a manifest, computing the totals.
    pub fn new(backup_id: impl Into<String>, created_at: u64, files: Vec<ManifestEntry>) -> Self {
        Self {
            backup_id: backup_id.into(),
            created_at,
            format_version: MANIFEST_FORMAT_VERSION,
            total_files: files.len(),
            total_size: files.iter().map(|f| f.size).sum(),
            files,
        }
    }

    /// Serializes to pretty JSON.
    pub fn to_json(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parses a manifest.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] if the JSON does not describe a
    /// manifest of a supported version.
    pub fn from_json(bytes: &[u8]) -> CoreResult<Self> {
        let manifest: Self = serde_json::from_slice(bytes)
            .map_err(|e| CoreError::invalid_format(format!("manifest is not valid: {e}")))?;
        if manifest.format_version != MANIFEST_FORMAT_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported manifest version: {}",
                manifest.format_version
            )));
        }
        Ok(manifest)
    }
}
