//! Descriptor-at-rest encryption: AES-256-GCM with a file-backed key.

use std::path::Path;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Seals descriptor blobs before they reach the database file.
///
/// Sealed format: 12-byte random nonce followed by the GCM ciphertext.
/// Cloning shares nothing mutable; the cipher is stateless.
#[derive(Clone)]
pub struct DescriptorCipher {
    cipher: Aes256Gcm,
    key_id: String,
}

impl DescriptorCipher {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        Self { cipher, key_id: fingerprint(key) }
    }

    /// Load the key at `path`, generating and persisting a fresh one on
    /// first use. The key file is created with owner-only permissions.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let key = if path.exists() {
            let bytes = std::fs::read(path)?;
            let key: [u8; KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!(
                        "key file {} is {} bytes, expected {KEY_LEN}",
                        path.display(),
                        bytes.len()
                    ),
                ))
            })?;
            key
        } else {
            let mut key = [0u8; KEY_LEN];
            OsRng.fill_bytes(&mut key);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            write_key_file(path, &key)?;
            key
        };

        let cipher = Self::new(&key);
        tracing::info!(path = %path.display(), key_id = %cipher.key_id, "descriptor key loaded");
        Ok(cipher)
    }

    /// Short SHA-256 fingerprint of the key, safe to log.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| Error::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(Error::Decrypt);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Decrypt)
    }
}

fn fingerprint(key: &[u8; KEY_LEN]) -> String {
    let digest = Sha256::digest(key);
    digest[..4].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(unix)]
fn write_key_file(path: &Path, key: &[u8; KEY_LEN]) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(key)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_key_file(path: &Path, key: &[u8; KEY_LEN]) -> Result<()> {
    std::fs::write(path, key)?;
    Ok(())
}
