//! Encrypted single-file storage with atomic replacement.

use crate::cipher::{Cipher, EncryptedPayload};
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix appended to a file name for its in-flight temporary sibling.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Encrypted, atomically replaced files.
///
/// Every logical document is sealed by the [`Cipher`] and stored as a JSON
/// wrapper (`ciphertext`, `nonce`, `tag`, `salt`). Writes go to a sibling
/// `<name>.tmp` file which is then renamed over the target, so a reader
/// always sees either the previous or the new complete content.
///
/// # Thread Safety
///
/// At most one write per path may be in flight. A second concurrent write
/// to the same path fails with [`StorageError::WriteInProgress`] instead of
/// queueing behind the first.
///
/// # Example
///
/// ```no_run
/// use sealdb_storage::{AtomicFileStore, Cipher, KdfParams};
/// use std::path::Path;
///
/// let store = AtomicFileStore::new(Cipher::new("secret", KdfParams::default()));
/// store.write(Path::new("app.sdb"), b"{}").unwrap();
/// let data = store.read(Path::new("app.sdb")).unwrap();
/// assert_eq!(data.as_deref(), Some(&b"{}"[..]));
/// ```
#[derive(Debug)]
pub struct AtomicFileStore {
    cipher: Cipher,
    in_flight: Mutex<HashSet<PathBuf>>,
}

/// Releases a path's write slot when dropped.
struct WriteGuard<'a> {
    store: &'a AtomicFileStore,
    path: PathBuf,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.store.in_flight.lock().remove(&self.path);
    }
}

impl AtomicFileStore {
    /// Creates a store sealing files with `cipher`.
    #[must_use]
    pub fn new(cipher: Cipher) -> Self {
        Self {
            cipher,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Returns the cipher used by this store.
    #[must_use]
    pub fn cipher(&self) -> &Cipher {
        &self.cipher
    }

    /// Reads and decrypts the document at `path`.
    ///
    /// Returns `None` if the file does not exist.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Json`] if the wrapper is malformed
    /// - [`StorageError::Authentication`] if the content was tampered with
    ///   or sealed under another secret
    pub fn read(&self, path: &Path) -> StorageResult<Option<Vec<u8>>> {
        let Some(raw) = self.read_bytes(path)? else {
            return Ok(None);
        };
        let payload: EncryptedPayload = serde_json::from_slice(&raw)?;
        let plaintext = self.cipher.decrypt(&payload)?;
        debug!(path = %path.display(), bytes = plaintext.len(), "read sealed file");
        Ok(Some(plaintext))
    }

    /// Encrypts `plaintext` and atomically replaces the file at `path`.
    ///
    /// The original file is left untouched if any step fails.
    pub fn write(&self, path: &Path, plaintext: &[u8]) -> StorageResult<()> {
        let payload = self.cipher.encrypt(plaintext)?;
        let wrapper = serde_json::to_vec_pretty(&payload)?;
        self.write_bytes(path, &wrapper)?;
        debug!(path = %path.display(), bytes = plaintext.len(), "wrote sealed file");
        Ok(())
    }

    /// Reads raw bytes without decryption.
    ///
    /// Returns `None` if the file does not exist.
    pub fn read_bytes(&self, path: &Path) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically replaces the file at `path` with `data`, unencrypted.
    ///
    /// Uses write-then-rename for crash safety:
    /// 1. Write to `<name>.tmp`
    /// 2. Sync the temporary file to disk
    /// 3. Rename it over the target
    /// 4. Fsync the parent directory
    ///
    /// On failure the temporary file is removed and the error propagated.
    pub fn write_bytes(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        let _guard = self.begin_write(path)?;
        let temp_path = temp_path_for(path);

        let result = write_then_rename(&temp_path, path, data);
        if result.is_err() {
            // Only clean up a file we may have created.
            if temp_path.is_file() {
                let _ = fs::remove_file(&temp_path);
            }
        }
        result
    }

    /// Returns true if a file exists at `path`.
    #[must_use]
    pub fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Returns the on-disk size of the file at `path`.
    pub fn size(&self, path: &Path) -> StorageResult<u64> {
        Ok(fs::metadata(path)?.len())
    }

    /// Deletes the file at `path`. A missing file is not an error.
    pub fn delete(&self, path: &Path) -> StorageResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Copies the file at `from` to `to` byte for byte.
    ///
    /// The destination is replaced atomically.
    pub fn copy_to(&self, from: &Path, to: &Path) -> StorageResult<u64> {
        let data = fs::read(from)?;
        self.write_bytes(to, &data)?;
        Ok(data.len() as u64)
    }

    /// Claims the write slot for `path`.
    fn begin_write(&self, path: &Path) -> StorageResult<WriteGuard<'_>> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(path.to_path_buf()) {
            return Err(StorageError::WriteInProgress {
                path: path.to_path_buf(),
            });
        }
        Ok(WriteGuard {
            store: self,
            path: path.to_path_buf(),
        })
    }
}

/// Returns the temporary sibling path used while writing `path`.
#[must_use]
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("unnamed"));
    name.push(TEMP_SUFFIX);
    path.with_file_name(name)
}

fn write_then_rename(temp_path: &Path, path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = File::create(temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(temp_path, path)?;
    sync_parent(path)?;
    Ok(())
}

/// Fsyncs the directory containing `path` so the rename is durable.
#[cfg(unix)]
fn sync_parent(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            File::open(parent)?.sync_all()?;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> StorageResult<()> {
    // NTFS journaling covers rename durability
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::KdfParams;
    use tempfile::tempdir;

    fn store(secret: &str) -> AtomicFileStore {
        AtomicFileStore::new(Cipher::new(secret, KdfParams::light()))
    }

    #[test]
    fn read_missing_is_none() {
        let dir = tempdir().unwrap();
        let store = store("secret");
        assert!(store.read(&dir.path().join("absent.sdb")).unwrap().is_none());
    }

    #[test]
    fn write_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.sdb");
        let store = store("secret");

        store.write(&path, b"hello world").unwrap();
        assert_eq!(store.read(&path).unwrap().unwrap(), b"hello world");
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn file_is_a_hex_wrapper() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.sdb");
        let store = store("secret");
        store.write(&path, b"plaintext marker").unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("plaintext marker"));

        let wrapper: serde_json::Value = serde_json::from_str(&raw).unwrap();
        for field in ["ciphertext", "nonce", "tag", "salt"] {
            assert!(wrapper[field].is_string(), "missing {field}");
        }
    }

    #[test]
    fn overwrite_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.sdb");
        let store = store("secret");

        store.write(&path, b"first").unwrap();
        store.write(&path, b"second").unwrap();
        assert_eq!(store.read(&path).unwrap().unwrap(), b"second");
    }

    #[test]
    fn wrong_secret_is_not_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.sdb");
        store("one").write(&path, b"data").unwrap();

        let err = store("two").read(&path).unwrap_err();
        assert!(err.is_authentication());
    }

    #[test]
    fn failed_write_keeps_previous_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.sdb");
        let store = store("secret");
        store.write(&path, b"before").unwrap();

        // A directory squatting on the temp path makes the write fail midway.
        let blocker = temp_path_for(&path);
        fs::create_dir(&blocker).unwrap();

        assert!(store.write(&path, b"after").is_err());
        assert_eq!(store.read(&path).unwrap().unwrap(), b"before");
        assert!(blocker.is_dir());
    }

    #[test]
    fn failed_rename_removes_temp_file() {
        let dir = tempdir().unwrap();
        let store = store("secret");

        // Renaming a file over a non-empty directory fails after the temp
        // file has been fully written.
        let target = dir.path().join("occupied");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("child"), b"x").unwrap();

        assert!(store.write_bytes(&target, b"data").is_err());
        assert!(!temp_path_for(&target).exists());
        assert!(target.join("child").exists());
    }

    #[test]
    fn concurrent_write_fails_fast() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.sdb");
        let store = store("secret");

        let guard = store.begin_write(&path).unwrap();
        let result = store.write(&path, b"data");
        assert!(matches!(result, Err(StorageError::WriteInProgress { .. })));

        // Other paths are unaffected.
        store.write(&dir.path().join("other.sdb"), b"ok").unwrap();

        drop(guard);
        store.write(&path, b"data").unwrap();
    }

    #[test]
    fn exists_size_delete() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.sdb");
        let store = store("secret");

        assert!(!store.exists(&path));
        store.write_bytes(&path, b"12345").unwrap();
        assert!(store.exists(&path));
        assert_eq!(store.size(&path).unwrap(), 5);

        store.delete(&path).unwrap();
        assert!(!store.exists(&path));
        // Deleting again is a no-op.
        store.delete(&path).unwrap();
    }

    #[test]
    fn copy_to_is_byte_identical() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("a.sdb");
        let to = dir.path().join("nested").join("b.sdb");
        let store = store("secret");

        store.write(&from, b"payload").unwrap();
        let copied = store.copy_to(&from, &to).unwrap();

        assert_eq!(copied, store.size(&from).unwrap());
        assert_eq!(fs::read(&from).unwrap(), fs::read(&to).unwrap());
        assert_eq!(store.read(&to).unwrap().unwrap(), b"payload");
    }

    #[test]
    fn malformed_wrapper_is_json_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.sdb");
        fs::write(&path, b"not json").unwrap();

        let err = store("secret").read(&path).unwrap_err();
        assert!(matches!(err, StorageError::Json(_)));
    }
}
