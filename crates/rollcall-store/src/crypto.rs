//! Embedding-at-rest encryption.
//!
//! Each embedding blob is sealed with AES-256-GCM under a per-deployment
//! key: `nonce (12 bytes) ‖ ciphertext+tag`. The key file is created on
//! first run and must stay private to the service user.

use std::path::Path;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use thiserror::Error;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("key file {path}: {source}")]
    KeyFile {
        path: String,
        source: std::io::Error,
    },
    #[error("key file {path} has {got} bytes, expected {expected}")]
    KeyLength {
        path: String,
        got: usize,
        expected: usize,
    },
    #[error("embedding blob failed authentication")]
    Open,
    #[error("embedding encryption failed")]
    Seal,
    #[error("embedding blob truncated ({0} bytes)")]
    Truncated(usize),
}

/// AES-256-GCM cipher for embedding blobs.
pub struct EmbeddingCipher {
    cipher: Aes256Gcm,
}

impl EmbeddingCipher {
    /// Load the key from `path`, generating a fresh random key on first run.
    ///
    /// On unix the new key file is chmod 0600 before the key is written.
    pub fn load_or_create(path: &Path) -> Result<Self, CryptoError> {
        let keyfile = |source| CryptoError::KeyFile {
            path: path.display().to_string(),
            source,
        };

        if path.exists() {
            let bytes = std::fs::read(path).map_err(keyfile)?;
            if bytes.len() != KEY_LEN {
                return Err(CryptoError::KeyLength {
                    path: path.display().to_string(),
                    got: bytes.len(),
                    expected: KEY_LEN,
                });
            }
            let mut key = [0u8; KEY_LEN];
            key.copy_from_slice(&bytes);
            return Ok(Self::from_key_bytes(&key));
        }

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(keyfile)?;
        }

        let mut key = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);

        std::fs::write(path, key).map_err(keyfile)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(keyfile)?;
        }

        tracing::info!(path = %path.display(), "generated new embedding key");
        Ok(Self::from_key_bytes(&key))
    }

    pub fn from_key_bytes(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Encrypt, prepending the fresh random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::Seal)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypt a `nonce ‖ ciphertext` blob.
    pub fn open(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if blob.len() <= NONCE_LEN {
            return Err(CryptoError::Truncated(blob.len()));
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> EmbeddingCipher {
        EmbeddingCipher::from_key_bytes(&[7u8; KEY_LEN])
    }

    #[test]
    fn test_seal_open_round_trip() {
        let cipher = test_cipher();
        let blob = cipher.seal(b"embedding bytes").unwrap();
        assert_eq!(cipher.open(&blob).unwrap(), b"embedding bytes");
    }

    #[test]
    fn test_nonces_are_unique_per_seal() {
        let cipher = test_cipher();
        let a = cipher.seal(b"same input").unwrap();
        let b = cipher.seal(b"same input").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_blob_fails_authentication() {
        let cipher = test_cipher();
        let mut blob = cipher.seal(b"embedding bytes").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(matches!(cipher.open(&blob), Err(CryptoError::Open)));
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let blob = test_cipher().seal(b"embedding bytes").unwrap();
        let other = EmbeddingCipher::from_key_bytes(&[8u8; KEY_LEN]);
        assert!(matches!(other.open(&blob), Err(CryptoError::Open)));
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let cipher = test_cipher();
        assert!(matches!(
            cipher.open(&[0u8; NONCE_LEN]),
            Err(CryptoError::Truncated(_))
        ));
    }
}
