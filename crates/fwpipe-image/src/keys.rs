//! Signing and encryption key material.
//!
//! Signing keys are Ed25519 private keys. A key file may hold a PKCS#8 PEM
//! document, base64 text of a 32-byte seed (or 64-byte keypair), or the raw
//! 32-byte seed.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use ed25519_dalek::pkcs8::DecodePrivateKey;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey, SECRET_KEY_LENGTH};
use sha2::{Digest, Sha256};

use crate::error::{ImageError, ImageResult};

const PEM_PREFIX: &str = "-----BEGIN";

/// An Ed25519 private key used to sign image hashes.
#[derive(Clone)]
pub struct PrivSignKey {
    key: SigningKey,
    source: Option<PathBuf>,
}

impl PrivSignKey {
    /// Load a key from disk.
    pub fn from_file(path: &Path) -> ImageResult<Self> {
        let bytes = fs::read(path).map_err(|e| ImageError::KeyLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let key = decode_signing_key(&bytes).map_err(|reason| ImageError::KeyLoad {
            path: path.to_path_buf(),
            reason,
        })?;

        Ok(Self {
            key,
            source: Some(path.to_path_buf()),
        })
    }

    pub fn from_signing_key(key: SigningKey) -> Self {
        Self { key, source: None }
    }

    /// File the key was read from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    /// SHA-256 of the raw public key, stored in the KEYHASH TLV.
    pub fn key_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.key.verifying_key().as_bytes());
        hasher.finalize().into()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.key.sign(message).to_bytes()
    }
}

impl fmt::Debug for PrivSignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivSignKey")
            .field("source", &self.source)
            .field("key_hash", &hex::encode(self.key_hash()))
            .finish()
    }
}

fn decode_signing_key(bytes: &[u8]) -> Result<SigningKey, String> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        let text = text.trim();

        if text.starts_with(PEM_PREFIX) {
            return SigningKey::from_pkcs8_pem(text)
                .map_err(|e| format!("unsupported PEM key: {}", e));
        }

        if let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(text) {
            match decoded.len() {
                SECRET_KEY_LENGTH => return Ok(seed_key(&decoded)),
                64 => {
                    let mut pair = [0u8; 64];
                    pair.copy_from_slice(&decoded);
                    return SigningKey::from_keypair_bytes(&pair)
                        .map_err(|e| format!("inconsistent keypair: {}", e));
                }
                _ => {}
            }
        }
    }

    if bytes.len() == SECRET_KEY_LENGTH {
        return Ok(seed_key(bytes));
    }

    Err("not an Ed25519 private key (expected PKCS#8 PEM, base64 or raw seed)".to_string())
}

fn seed_key(bytes: &[u8]) -> SigningKey {
    let mut seed = [0u8; SECRET_KEY_LENGTH];
    seed.copy_from_slice(bytes);
    SigningKey::from_bytes(&seed)
}

/// Load every key in order; the first failure aborts the whole set.
pub fn read_priv_sign_keys<P: AsRef<Path>>(paths: &[P]) -> ImageResult<Vec<PrivSignKey>> {
    paths
        .iter()
        .map(|p| PrivSignKey::from_file(p.as_ref()))
        .collect()
}

/// Symmetric AES key used to encrypt the image body (or wrap the image key).
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    bytes: Vec<u8>,
}

impl EncryptionKey {
    /// Read a 16- or 32-byte AES key stored raw or as base64 text.
    pub fn from_file(path: &Path) -> ImageResult<Self> {
        let raw = fs::read(path).map_err(|e| ImageError::EncryptionKey {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let decoded = std::str::from_utf8(&raw)
            .ok()
            .and_then(|t| base64::engine::general_purpose::STANDARD.decode(t.trim()).ok())
            .filter(|d| is_aes_key_len(d.len()));

        let bytes = match decoded {
            Some(d) => d,
            None if is_aes_key_len(raw.len()) => raw,
            None => {
                return Err(ImageError::EncryptionKey {
                    path: path.to_path_buf(),
                    reason: "expected a 16 or 32 byte AES key".to_string(),
                })
            }
        };

        Ok(Self { bytes })
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        is_aes_key_len(bytes.len()).then(|| Self {
            bytes: bytes.to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey(AES-{})", self.bytes.len() * 8)
    }
}

fn is_aes_key_len(len: usize) -> bool {
    len == 16 || len == 32
}
