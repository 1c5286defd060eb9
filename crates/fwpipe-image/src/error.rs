//! Error types for image production.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while parsing versions, loading keys or encoding images.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("invalid image version \"{input}\": {reason}")]
    InvalidVersion { input: String, reason: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error reading key file {path}: {reason}")]
    KeyLoad { path: PathBuf, reason: String },

    #[error("invalid encryption key {path}: {reason}")]
    EncryptionKey { path: PathBuf, reason: String },

    #[error("legacy image format supports a single signing key, got {0}")]
    TooManyKeys(usize),

    #[error("legacy image format does not support TLV sections")]
    SectionsUnsupported,

    #[error("section \"{0}\" not found in ELF file")]
    SectionNotFound(String),

    #[error("ELF parse error in {path}: {reason}")]
    Elf { path: PathBuf, reason: String },

    #[error("{what} too large: {size} bytes (max {max})")]
    FieldOverflow {
        what: &'static str,
        size: usize,
        max: usize,
    },

    #[error("image size {size} exceeds flash area size {slot_size}")]
    FlashOverflow { size: usize, slot_size: usize },

    #[error("malformed image: {0}")]
    Malformed(String),

    #[error("manifest serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for image operations
pub type ImageResult<T> = Result<T, ImageError>;
