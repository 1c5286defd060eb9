//! JSON manifest written next to every produced image.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ImageError, ImageResult};
use crate::version::ImageVersion;

/// Schema version for the image manifest
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Describes a produced image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageManifest {
    pub schema_version: u32,

    /// Target the image was built for
    pub target: String,

    /// Application name
    pub name: String,

    pub version: ImageVersion,

    /// "v1" or "v2"
    pub format: String,

    /// Hex SHA-256 image hash
    pub image_hash: String,

    /// Path of the image file
    pub image: String,

    /// Total image size in bytes
    pub image_size: usize,

    /// Hex key hashes of the signing keys, in signing order
    #[serde(default)]
    pub key_hashes: Vec<String>,

    /// Legacy key identifier (absent for current-format images)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<u8>,

    pub encrypted: bool,

    #[serde(default)]
    pub sections: Vec<String>,

    pub build_time: DateTime<Utc>,
}

impl ImageManifest {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_to_file(&self, path: &Path) -> ImageResult<()> {
        let json = self.to_json()?;
        fs::write(path, json).map_err(|e| ImageError::Write {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn from_file(path: &Path) -> ImageResult<Self> {
        let json = fs::read_to_string(path).map_err(|e| ImageError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}
