//! Passphrase-based authenticated encryption.
//!
//! Every sealed blob gets its own random salt and nonce, so the same
//! plaintext never produces the same payload twice.
//!
//! ## Key Derivation
//!
//! The secret is run through Argon2id and then through scrypt over the same
//! secret and salt. The scrypt output is the AES key. The Argon2id pass only
//! adds memory-hard cost for anyone brute forcing the secret.
//!
//! ## Payload Layout
//!
//! A payload is four hex strings: `ciphertext`, `nonce` (16 bytes), `tag`
//! (16 bytes) and `salt` (32 bytes). The cipher is AES-256-GCM with a
//! 128-bit nonce and a detached 128-bit tag.

use crate::error::{StorageError, StorageResult};
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce, Tag};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Size of the derived AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the per-payload salt in bytes.
pub const SALT_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 16;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// AES-256-GCM with a 128-bit nonce.
type Aes256Gcm128 = AesGcm<Aes256, U16>;

/// Cost parameters for [`derive_key`].
///
/// Parameters are not recorded in payloads. Data sealed under one profile
/// can only be opened with the same profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Argon2id memory cost in KiB.
    pub argon2_memory_kib: u32,
    /// Argon2id pass count.
    pub argon2_iterations: u32,
    /// Argon2id parallelism.
    pub argon2_lanes: u32,
    /// scrypt cost as log2(N).
    pub scrypt_log_n: u8,
    /// scrypt block size.
    pub scrypt_r: u32,
    /// scrypt parallelism.
    pub scrypt_p: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            argon2_memory_kib: 64 * 1024, // 64 MiB
            argon2_iterations: 4,
            argon2_lanes: 1,
            scrypt_log_n: 14,
            scrypt_r: 8,
            scrypt_p: 1,
        }
    }
}

impl KdfParams {
    /// A cheap profile for tests and throwaway data.
    ///
    /// Offers almost no brute-force resistance.
    #[must_use]
    pub const fn light() -> Self {
        Self {
            argon2_memory_kib: 256,
            argon2_iterations: 1,
            argon2_lanes: 1,
            scrypt_log_n: 8,
            scrypt_r: 8,
            scrypt_p: 1,
        }
    }
}

/// A derived 256-bit key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    /// Returns the raw key bytes.
    ///
    /// # Security
    ///
    /// Don't log or serialize the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derives the encryption key for `secret` and `salt`.
///
/// # Errors
///
/// Returns [`StorageError::KeyDerivation`] if either KDF rejects `params`
/// or the salt.
pub fn derive_key(secret: &[u8], salt: &[u8], params: &KdfParams) -> StorageResult<DerivedKey> {
    let argon_params = Params::new(
        params.argon2_memory_kib,
        params.argon2_iterations,
        params.argon2_lanes,
        Some(KEY_SIZE),
    )
    .map_err(|e| StorageError::KeyDerivation(format!("argon2 params: {e}")))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut hardened = Zeroizing::new([0u8; KEY_SIZE]);
    argon
        .hash_password_into(secret, salt, &mut hardened[..])
        .map_err(|e| StorageError::KeyDerivation(format!("argon2: {e}")))?;

    let scrypt_params =
        scrypt::Params::new(params.scrypt_log_n, params.scrypt_r, params.scrypt_p, KEY_SIZE)
            .map_err(|e| StorageError::KeyDerivation(format!("scrypt params: {e}")))?;

    let mut bytes = [0u8; KEY_SIZE];
    scrypt::scrypt(secret, salt, &scrypt_params, &mut bytes)
        .map_err(|e| StorageError::KeyDerivation(format!("scrypt: {e}")))?;

    Ok(DerivedKey { bytes })
}

/// One sealed blob, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Hex-encoded ciphertext.
    pub ciphertext: String,
    /// Hex-encoded 128-bit nonce.
    pub nonce: String,
    /// Hex-encoded 128-bit authentication tag.
    pub tag: String,
    /// Hex-encoded 256-bit salt.
    pub salt: String,
}

/// Seals and opens payloads under a single secret.
pub struct Cipher {
    secret: Zeroizing<Vec<u8>>,
    params: KdfParams,
}

impl Cipher {
    /// Creates a cipher for `secret` with the given KDF profile.
    pub fn new(secret: impl AsRef<[u8]>, params: KdfParams) -> Self {
        Self {
            secret: Zeroizing::new(secret.as_ref().to_vec()),
            params,
        }
    }

    /// Returns the KDF profile in use.
    #[must_use]
    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    /// Derives the key for a stored salt.
    pub fn derive(&self, salt: &[u8]) -> StorageResult<DerivedKey> {
        derive_key(&self.secret, salt, &self.params)
    }

    /// Encrypts `plaintext` under a fresh salt and nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> StorageResult<EncryptedPayload> {
        let mut rng = rand::thread_rng();
        let mut salt = [0u8; SALT_SIZE];
        rng.fill_bytes(&mut salt);
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rng.fill_bytes(&mut nonce_bytes);

        let key = self.derive(&salt)?;
        let cipher = Aes256Gcm128::new_from_slice(key.as_bytes())
            .map_err(|_| StorageError::Encryption("invalid key length".to_string()))?;

        let mut buffer = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::<U16>::from_slice(&nonce_bytes), b"", &mut buffer)
            .map_err(|_| StorageError::Encryption("encryption error".to_string()))?;

        Ok(EncryptedPayload {
            ciphertext: hex::encode(&buffer),
            nonce: hex::encode(nonce_bytes),
            tag: hex::encode(tag),
            salt: hex::encode(salt),
        })
    }

    /// Decrypts a payload produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// - [`StorageError::Encryption`] if a field is not valid hex or has the
    ///   wrong length
    /// - [`StorageError::Authentication`] if the tag does not verify
    pub fn decrypt(&self, payload: &EncryptedPayload) -> StorageResult<Vec<u8>> {
        let salt = decode_field("salt", &payload.salt, Some(SALT_SIZE))?;
        let nonce_bytes = decode_field("nonce", &payload.nonce, Some(NONCE_SIZE))?;
        let tag_bytes = decode_field("tag", &payload.tag, Some(TAG_SIZE))?;
        let mut buffer = decode_field("ciphertext", &payload.ciphertext, None)?;

        let key = self.derive(&salt)?;
        let cipher = Aes256Gcm128::new_from_slice(key.as_bytes())
            .map_err(|_| StorageError::Encryption("invalid key length".to_string()))?;

        cipher
            .decrypt_in_place_detached(
                Nonce::<U16>::from_slice(&nonce_bytes),
                b"",
                &mut buffer,
                Tag::from_slice(&tag_bytes),
            )
            .map_err(|_| StorageError::Authentication)?;

        Ok(buffer)
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher")
            .field("secret", &"[REDACTED]")
            .field("params", &self.params)
            .finish()
    }
}

fn decode_field(name: &str, value: &str, expected_len: Option<usize>) -> StorageResult<Vec<u8>> {
    let bytes = hex::decode(value)
        .map_err(|e| StorageError::Encryption(format!("{name} is not valid hex: {e}")))?;
    if let Some(len) = expected_len {
        if bytes.len() != len {
            return Err(StorageError::Encryption(format!(
                "{name} must be {len} bytes, got {}",
                bytes.len()
            )));
        }
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cipher(secret: &str) -> Cipher {
        Cipher::new(secret, KdfParams::light())
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let cipher = cipher("correct horse");
        let payload = cipher.encrypt(b"Hello, SealDB!").unwrap();

        assert_eq!(payload.nonce.len(), NONCE_SIZE * 2);
        assert_eq!(payload.tag.len(), TAG_SIZE * 2);
        assert_eq!(payload.salt.len(), SALT_SIZE * 2);

        let decrypted = cipher.decrypt(&payload).unwrap();
        assert_eq!(decrypted, b"Hello, SealDB!");
    }

    #[test]
    fn encrypt_produces_different_payloads() {
        let cipher = cipher("secret");
        let p1 = cipher.encrypt(b"same data").unwrap();
        let p2 = cipher.encrypt(b"same data").unwrap();

        assert_ne!(p1.salt, p2.salt);
        assert_ne!(p1.nonce, p2.nonce);
        assert_ne!(p1.ciphertext, p2.ciphertext);
    }

    #[test]
    fn wrong_secret_is_authentication_error() {
        let payload = cipher("secret-one").encrypt(b"data").unwrap();
        let result = cipher("secret-two").decrypt(&payload);
        assert!(matches!(result, Err(StorageError::Authentication)));
    }

    #[test]
    fn tampered_ciphertext_is_authentication_error() {
        let cipher = cipher("secret");
        let mut payload = cipher.encrypt(b"important bytes").unwrap();

        let mut raw = hex::decode(&payload.ciphertext).unwrap();
        raw[0] ^= 0xFF;
        payload.ciphertext = hex::encode(raw);

        assert!(cipher.decrypt(&payload).unwrap_err().is_authentication());
    }

    #[test]
    fn tampered_tag_is_authentication_error() {
        let cipher = cipher("secret");
        let mut payload = cipher.encrypt(b"important bytes").unwrap();
        payload.tag = "00".repeat(TAG_SIZE);

        assert!(cipher.decrypt(&payload).unwrap_err().is_authentication());
    }

    #[test]
    fn malformed_fields_are_not_authentication_errors() {
        let cipher = cipher("secret");
        let mut payload = cipher.encrypt(b"x").unwrap();
        payload.nonce = "abcd".to_string();

        let err = cipher.decrypt(&payload).unwrap_err();
        assert!(matches!(err, StorageError::Encryption(_)));

        payload.nonce = "zz".repeat(NONCE_SIZE);
        let err = cipher.decrypt(&payload).unwrap_err();
        assert!(matches!(err, StorageError::Encryption(_)));
    }

    #[test]
    fn empty_plaintext() {
        let cipher = cipher("secret");
        let payload = cipher.encrypt(b"").unwrap();
        assert!(payload.ciphertext.is_empty());
        assert!(cipher.decrypt(&payload).unwrap().is_empty());
    }

    #[test]
    fn derive_is_deterministic_per_salt() {
        let params = KdfParams::light();
        let k1 = derive_key(b"pw", &[1u8; SALT_SIZE], &params).unwrap();
        let k2 = derive_key(b"pw", &[1u8; SALT_SIZE], &params).unwrap();
        let k3 = derive_key(b"pw", &[2u8; SALT_SIZE], &params).unwrap();

        assert_eq!(k1.as_bytes(), k2.as_bytes());
        assert_ne!(k1.as_bytes(), k3.as_bytes());
    }

    #[test]
    fn invalid_params_rejected() {
        let params = KdfParams {
            scrypt_r: 0,
            ..KdfParams::light()
        };
        let result = derive_key(b"pw", &[0u8; SALT_SIZE], &params);
        assert!(matches!(result, Err(StorageError::KeyDerivation(_))));
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", cipher("hunter2"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("REDACTED"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn roundtrip_any_plaintext(
            plaintext in proptest::collection::vec(any::<u8>(), 0..512),
            secret in "[a-zA-Z0-9]{1,24}",
        ) {
            let cipher = cipher(&secret);
            let payload = cipher.encrypt(&plaintext).unwrap();
            prop_assert_eq!(cipher.decrypt(&payload).unwrap(), plaintext);
        }
    }
}
