//! Signing key argument resolution
//!
//! The trailing positionals of `create-image` and `run` name signing key
//! files. Their meaning depends on the image format:
//!
//! - legacy: at most one key file, optionally followed by a numeric key id
//!   (0-255). Anything after the key id is ignored.
//! - current: every argument is a key file; there is no key id.

use std::path::PathBuf;

use fwpipe_image::{read_priv_sign_keys, ImageError, PrivSignKey};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ImageFormat;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Key ID must be between 0-255, got '{0}'")]
    InvalidKeyId(String),

    #[error(transparent)]
    Load(#[from] ImageError),
}

pub type KeyResult<T> = Result<T, KeyError>;

/// Key file names plus key id, before any file is read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyArguments {
    pub filenames: Vec<PathBuf>,
    pub key_id: u8,
}

impl KeyArguments {
    pub fn is_empty(&self) -> bool {
        self.filenames.is_empty()
    }

    /// Read every key file; any failure discards the whole set.
    pub fn load(&self) -> KeyResult<SigningKeySet> {
        let keys = read_priv_sign_keys(&self.filenames)?;
        debug!(count = keys.len(), key_id = self.key_id, "loaded signing keys");
        Ok(SigningKeySet {
            keys,
            key_id: self.key_id,
        })
    }
}

impl ImageFormat {
    /// Split trailing arguments into key file names and a key id.
    pub fn key_arguments(&self, args: &[String]) -> KeyResult<KeyArguments> {
        match (self, args) {
            (_, []) => Ok(KeyArguments::default()),
            (_, [file]) => Ok(KeyArguments {
                filenames: vec![PathBuf::from(file)],
                key_id: 0,
            }),
            (ImageFormat::Legacy, [file, id, rest @ ..]) => {
                let key_id = parse_key_id(id)?;
                if !rest.is_empty() {
                    warn!(ignored = rest.len(), "legacy format uses one key; extra arguments ignored");
                }
                Ok(KeyArguments {
                    filenames: vec![PathBuf::from(file)],
                    key_id,
                })
            }
            (ImageFormat::Current, _) => Ok(KeyArguments {
                filenames: args.iter().map(PathBuf::from).collect(),
                key_id: 0,
            }),
        }
    }
}

/// Plain decimal only; signs and whitespace are rejected.
fn parse_key_id(arg: &str) -> KeyResult<u8> {
    if arg.is_empty() || !arg.bytes().all(|b| b.is_ascii_digit()) {
        return Err(KeyError::InvalidKeyId(arg.to_string()));
    }
    arg.parse::<u8>()
        .map_err(|_| KeyError::InvalidKeyId(arg.to_string()))
}

/// Loaded private keys plus the key id recorded in legacy headers.
#[derive(Debug, Default)]
pub struct SigningKeySet {
    pub keys: Vec<PrivSignKey>,
    pub key_id: u8,
}

impl SigningKeySet {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}
