//! Backup archive container.
//!
//! ## Format
//!
//! An archive is a zstd frame wrapping:
//!
//! ```text
//! | magic "SDBK" (4) | version (2) | entry_count (4) | entries... | sha256 (32) |
//! ```
//!
//! Each entry is:
//!
//! ```text
//! | name_len (2) | name (utf-8) | data_len (8) | data |
//! ```
//!
//! Integers are little-endian. The trailing digest covers everything before
//! it. [`BackupArchive::decode`] rejects a container whose digest does not
//! match; [`BackupArchive::decode_lenient`] only reports it, leaving damaged
//! entries to be caught by the per-file checksums in the manifest. Bad
//! magic, an unknown version or broken entry framing are fatal either way.

use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};

/// Magic bytes at the start of a decompressed archive.
const ARCHIVE_MAGIC: [u8; 4] = *b"SDBK";
/// Current container version.
const ARCHIVE_VERSION: u16 = 1;
/// magic + version + entry_count.
const HEADER_SIZE: usize = 4 + 2 + 4;
/// SHA-256 footer.
const DIGEST_SIZE: usize = 32;
/// zstd compression level.
const COMPRESSION_LEVEL: i32 = 3;

/// One named blob in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Bare file name.
    pub name: String,
    /// File contents.
    pub data: Vec<u8>,
}

/// An in-memory backup archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupArchive {
    /// Entries in insertion order.
    pub entries: Vec<ArchiveEntry>,
}

/// Rejects names that could escape the extraction directory.
pub fn validate_entry_name(name: &str) -> CoreResult<()> {
    if name.is_empty()
        || name.len() > usize::from(u16::MAX)
        || name.contains(['/', '\\', '\0'])
        || name == "."
        || name.contains("..")
    {
        return Err(CoreError::invalid_format(format!(
            "archive entry name {name:?} is not a bare file name"
        )));
    }
    Ok(())
}

impl BackupArchive {
    /// Creates an empty archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] if the name has path components
    /// or is already present.
    pub fn push(&mut self, name: impl Into<String>, data: Vec<u8>) -> CoreResult<()> {
        let name = name.into();
        validate_entry_name(&name)?;
        if self.get(&name).is_some() {
            return Err(CoreError::invalid_format(format!(
                "duplicate archive entry {name}"
            )));
        }
        self.entries.push(ArchiveEntry { name, data });
        Ok(())
    }

    /// Returns the data of entry `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.data.as_slice())
    }

    /// Serializes and compresses the archive.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let count = u32::try_from(self.entries.len())
            .map_err(|_| CoreError::invalid_format("too many archive entries"))?;

        let mut buf = Vec::new();
        buf.extend_from_slice(&ARCHIVE_MAGIC);
        buf.extend_from_slice(&ARCHIVE_VERSION.to_le_bytes());
        buf.extend_from_slice(&count.to_le_bytes());

        for entry in &self.entries {
            validate_entry_name(&entry.name)?;
            let name_len = u16::try_from(entry.name.len())
                .map_err(|_| CoreError::invalid_format("archive entry name too long"))?;
            buf.extend_from_slice(&name_len.to_le_bytes());
            buf.extend_from_slice(entry.name.as_bytes());
            buf.extend_from_slice(&(entry.data.len() as u64).to_le_bytes());
            buf.extend_from_slice(&entry.data);
        }

        let digest = Sha256::digest(&buf);
        buf.extend_from_slice(&digest);

        Ok(zstd::encode_all(buf.as_slice(), COMPRESSION_LEVEL)?)
    }

    /// Decompresses and parses an archive, requiring an intact digest.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] if the data is not a zstd frame,
    /// the magic or version is wrong, the digest does not match, or an
    /// entry is malformed.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let (archive, digest_ok) = Self::decode_lenient(bytes)?;
        if !digest_ok {
            return Err(CoreError::invalid_format("archive digest mismatch"));
        }
        Ok(archive)
    }

    /// Decompresses and parses an archive without rejecting a digest
    /// mismatch.
    ///
    /// Returns the archive and whether the trailing digest matched.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] if the data is not a zstd frame,
    /// the magic or version is wrong, or an entry is malformed.
    pub fn decode_lenient(bytes: &[u8]) -> CoreResult<(Self, bool)> {
        let buf = zstd::decode_all(bytes)
            .map_err(|e| CoreError::invalid_format(format!("archive is not readable: {e}")))?;

        if buf.len() < HEADER_SIZE + DIGEST_SIZE {
            return Err(CoreError::invalid_format("archive too short"));
        }
        let (body, digest) = buf.split_at(buf.len() - DIGEST_SIZE);
        let digest_ok = Sha256::digest(body).as_slice() == digest;

        if body[0..4] != ARCHIVE_MAGIC {
            return Err(CoreError::invalid_format("invalid archive magic"));
        }
        let version = u16::from_le_bytes([body[4], body[5]]);
        if version != ARCHIVE_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported archive version: {version}"
            )));
        }
        let count = u32::from_le_bytes([body[6], body[7], body[8], body[9]]);

        let mut reader = Reader {
            buf: body,
            pos: HEADER_SIZE,
        };
        let mut archive = Self::new();
        for _ in 0..count {
            let name_len = u16::from_le_bytes(reader.array::<2>()?);
            let name = String::from_utf8(reader.take(usize::from(name_len))?.to_vec())
                .map_err(|_| CoreError::invalid_format("archive entry name is not utf-8"))?;
            let data_len = usize::try_from(u64::from_le_bytes(reader.array::<8>()?))
                .map_err(|_| CoreError::invalid_format("archive entry too large"))?;
            let data = reader.take(data_len)?.to_vec();
            archive.push(name, data)?;
        }

        if reader.pos != body.len() {
            return Err(CoreError::invalid_format("trailing bytes after archive entries"));
        }
        Ok((archive, digest_ok))
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| CoreError::invalid_format("archive entry truncated"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> CoreResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BackupArchive {
        let mut archive = BackupArchive::new();
        archive.push("a.sdb", b"alpha".to_vec()).unwrap();
        archive.push("b.sdb", Vec::new()).unwrap();
        archive.push("manifest.json", b"{}".to_vec()).unwrap();
        archive
    }

    #[test]
    fn encode_decode() {
        let archive = sample();
        let bytes = archive.encode().unwrap();
        assert_eq!(BackupArchive::decode(&bytes).unwrap(), archive);
    }

    #[test]
    fn empty_archive() {
        let bytes = BackupArchive::new().encode().unwrap();
        assert!(BackupArchive::decode(&bytes).unwrap().entries.is_empty());
    }

    #[test]
    fn rejects_path_components() {
        let mut archive = BackupArchive::new();
        for name in ["../x.sdb", "dir/x.sdb", "dir\\x.sdb", "", ".", "..", "a..b"] {
            assert!(archive.push(name, vec![]).is_err(), "{name:?}");
        }
        assert!(archive.push("ok.sdb", vec![]).is_ok());
        assert!(archive.push("ok.sdb", vec![]).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            BackupArchive::decode(b"not an archive"),
            Err(CoreError::InvalidFormat { .. })
        ));
        let short = zstd::encode_all(&b"SDBK"[..], 0).unwrap();
        assert!(BackupArchive::decode(&short).is_err());
    }

    #[test]
    fn rejects_tampered_container() {
        let bytes = sample().encode().unwrap();
        let mut raw = zstd::decode_all(bytes.as_slice()).unwrap();
        raw[HEADER_SIZE + 4] ^= 0xff;
        let tampered = zstd::encode_all(raw.as_slice(), 0).unwrap();
        assert!(matches!(
            BackupArchive::decode(&tampered),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn lenient_decode_reports_damaged_entry() {
        let bytes = sample().encode().unwrap();
        let mut raw = zstd::decode_all(bytes.as_slice()).unwrap();
        // First entry: name_len (2) + "a.sdb" (5) + data_len (8), then "alpha".
        raw[HEADER_SIZE + 2 + 5 + 8] ^= 0xff;
        let tampered = zstd::encode_all(raw.as_slice(), 0).unwrap();

        let (archive, digest_ok) = BackupArchive::decode_lenient(&tampered).unwrap();
        assert!(!digest_ok);
        assert_ne!(archive.get("a.sdb").unwrap(), b"alpha");
        assert_eq!(archive.get("manifest.json").unwrap(), b"{}");

        let (_, digest_ok) = BackupArchive::decode_lenient(&bytes).unwrap();
        assert!(digest_ok);
    }

    #[test]
    fn lenient_decode_still_rejects_broken_framing() {
        let bytes = sample().encode().unwrap();
        let mut raw = zstd::decode_all(bytes.as_slice()).unwrap();
        // Inflate the first entry's data_len past the end of the buffer.
        raw[HEADER_SIZE + 2 + 5 + 7] = 0x7f;
        let tampered = zstd::encode_all(raw.as_slice(), 0).unwrap();
        assert!(BackupArchive::decode_lenient(&tampered).is_err());

        raw = zstd::decode_all(bytes.as_slice()).unwrap();
        raw[0] = b'X';
        let tampered = zstd::encode_all(raw.as_slice(), 0).unwrap();
        assert!(BackupArchive::decode_lenient(&tampered).is_err());
    }

    #[test]
    fn rejects_bad_magic_with_valid_digest() {
        let bytes = sample().encode().unwrap();
        let mut raw = zstd::decode_all(bytes.as_slice()).unwrap();
        raw.truncate(raw.len() - DIGEST_SIZE);
        raw[0] = b'X';
        let digest = Sha256::digest(&raw);
        raw.extend_from_slice(&digest);
        let tampered = zstd::encode_all(raw.as_slice(), 0).unwrap();
        assert!(BackupArchive::decode(&tampered).is_err());
    }
}
